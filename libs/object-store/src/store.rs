use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::types::{FileOrder, FolderQuery, RemoteFile, RemoteFolder};

/// Folder/file operations the backup pipeline needs from a cloud drive.
///
/// Every call is safe to retry. A retried `create_folder` whose first
/// response was lost leaves a duplicate folder behind; callers tolerate that.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_folders(&self, query: &FolderQuery) -> Result<Vec<RemoteFolder>, RemoteError>;

    async fn create_folder(&self, name: &str, parent_id: Option<&str>)
        -> Result<String, RemoteError>;

    async fn upload_file(
        &self,
        name: &str,
        parent_id: &str,
        bytes: Vec<u8>,
    ) -> Result<String, RemoteError>;

    async fn list_files(
        &self,
        parent_id: &str,
        order: FileOrder,
    ) -> Result<Vec<RemoteFile>, RemoteError>;

    /// Deleting an id that no longer exists succeeds.
    async fn delete_file(&self, file_id: &str) -> Result<(), RemoteError>;
}

/// Turns a tenant's stored refresh credential into an authorized store.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(
        &self,
        tenant_id: &str,
        refresh_token: &str,
    ) -> Result<Arc<dyn RemoteStore>, RemoteError>;
}
