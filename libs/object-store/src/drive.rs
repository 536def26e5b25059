use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::error::RemoteError;
use crate::store::{RemoteConnector, RemoteStore};
use crate::types::{escape_query_literal, FileOrder, FolderQuery, RemoteFile, RemoteFolder};
use crate::FOLDER_MIME_TYPE;

const PAGE_SIZE: u32 = 1_000;

#[derive(Clone)]
pub struct DriveConfig {
    pub api_base: String,
    pub upload_base: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub request_timeout: Duration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for DriveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveConfig")
            .field("api_base", &self.api_base)
            .field("upload_base", &self.upload_base)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl DriveConfig {
    pub fn build_http_client(&self) -> Result<Client, RemoteError> {
        Client::builder()
            .user_agent(concat!("ledgerbox/", env!("CARGO_PKG_VERSION")))
            .timeout(self.request_timeout)
            .build()
            .map_err(|err| RemoteError::Rejected(format!("http client: {err}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList<T> {
    #[serde(default = "Vec::new")]
    files: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Drive v3 files API, authorized with a bearer access token.
#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    api_base: String,
    upload_base: String,
    access_token: String,
}

impl DriveClient {
    pub fn new(http: Client, config: &DriveConfig, access_token: impl Into<String>) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.api_base)
    }

    async fn list_pages<T>(&self, q: &str, fields: &str, order: Option<&str>) -> Result<Vec<T>, RemoteError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut collected = Vec::new();
        let mut page_token: Option<String> = None;
        let page_size = PAGE_SIZE.to_string();

        loop {
            let mut params: Vec<(&str, &str)> = vec![
                ("q", q),
                ("fields", fields),
                ("spaces", "drive"),
                ("pageSize", page_size.as_str()),
            ];
            if let Some(order) = order {
                params.push(("orderBy", order));
            }
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let response = self
                .http
                .get(self.files_url())
                .bearer_auth(&self.access_token)
                .query(&params)
                .send()
                .await?;
            let page: FileList<T> = check(response).await?.json().await?;
            collected.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(collected)
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn list_folders(&self, query: &FolderQuery) -> Result<Vec<RemoteFolder>, RemoteError> {
        self.list_pages(
            &query.to_drive_query(),
            "nextPageToken,files(id,name)",
            None,
        )
        .await
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, RemoteError> {
        let parent = parent_id.unwrap_or(crate::ROOT_PARENT_ID);
        let response = self
            .http
            .post(self.files_url())
            .bearer_auth(&self.access_token)
            .query(&[("fields", "id")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": [parent],
            }))
            .send()
            .await?;
        let created: CreatedFile = check(response).await?.json().await?;
        debug!(folder = name, parent, id = %created.id, "created remote folder");
        Ok(created.id)
    }

    async fn upload_file(
        &self,
        name: &str,
        parent_id: &str,
        bytes: Vec<u8>,
    ) -> Result<String, RemoteError> {
        let boundary = format!("ledgerbox-{}", Uuid::new_v4().simple());
        let metadata = json!({ "name": name, "parents": [parent_id] });
        let body = multipart_related(&boundary, &metadata, content_type_for(name), &bytes)?;

        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await?;
        let created: CreatedFile = check(response).await?.json().await?;
        Ok(created.id)
    }

    async fn list_files(
        &self,
        parent_id: &str,
        order: FileOrder,
    ) -> Result<Vec<RemoteFile>, RemoteError> {
        let q = format!(
            "'{}' in parents and trashed = false and mimeType != '{}'",
            escape_query_literal(parent_id),
            FOLDER_MIME_TYPE
        );
        self.list_pages(
            &q,
            "nextPageToken,files(id,name,createdTime)",
            Some(order.as_query()),
        )
        .await
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), RemoteError> {
        let response = self
            .http
            .delete(format!("{}/{}", self.files_url(), file_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        match check(response).await {
            Ok(_) | Err(RemoteError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Exchanges refresh tokens at the OAuth token endpoint for [`DriveClient`]s.
#[derive(Clone)]
pub struct DriveConnector {
    http: Client,
    config: DriveConfig,
}

impl DriveConnector {
    pub fn new(config: DriveConfig) -> Result<Self, RemoteError> {
        let http = config.build_http_client()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl RemoteConnector for DriveConnector {
    async fn connect(
        &self,
        tenant_id: &str,
        refresh_token: &str,
    ) -> Result<Arc<dyn RemoteStore>, RemoteError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            // invalid_grant and friends come back as 400 and mean the
            // credential is no good. Throttling stays retryable.
            let body = response.text().await.unwrap_or_default();
            let error = RemoteError::from_status(status, &body);
            if error.is_retryable() {
                return Err(error);
            }
            return Err(RemoteError::Auth(format!("{status}: {}", body.trim())));
        }
        let token: TokenResponse = check(response).await?.json().await?;
        debug!(tenant_id, "exchanged refresh token for access token");

        Ok(Arc::new(DriveClient::new(
            self.http.clone(),
            &self.config,
            token.access_token,
        )))
    }
}

async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::from_status(status, &body))
}

fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

fn multipart_related(
    boundary: &str,
    metadata: &serde_json::Value,
    content_type: &str,
    bytes: &[u8],
) -> Result<Vec<u8>, RemoteError> {
    let metadata = serde_json::to_vec(metadata).map_err(|err| RemoteError::Decode(err.to_string()))?;
    let mut body = Vec::with_capacity(bytes.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(&metadata);
    body.extend_from_slice(format!("\r\n--{boundary}\r\nContent-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Ok(body)
}
