use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::{stream, StreamExt};
use ledgerbox_object_store::{FolderQuery, RemoteConnector, RemoteStore};
use serde::Serialize;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::storage::TenantPaths;
use crate::vault::{BackupCredentials, CredentialVault};

use super::error::BackupError;
use super::manifest::{table_file_name, BackupManifest, SetId, TableFailure};
use super::retention::{enforce_retention, PruneReport, RetentionMode, RetentionPolicy};
use super::retry::RetryPolicy;
use super::status::BackupStatus;
use super::{Cadence, DEFAULT_APP_FOLDER, DEFAULT_UPLOAD_CONCURRENCY};

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub app_folder: String,
    pub retention: RetentionPolicy,
    pub retention_mode: RetentionMode,
    pub upload_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            app_folder: DEFAULT_APP_FOLDER.to_string(),
            retention: RetentionPolicy::default(),
            retention_mode: RetentionMode::default(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

/// Remote ids of the application root and its cadence children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderIds {
    pub root: String,
    pub daily: String,
    pub weekly: String,
    pub monthly: String,
}

impl FolderIds {
    pub fn for_cadence(&self, cadence: Cadence) -> &str {
        match cadence {
            Cadence::Daily => &self.daily,
            Cadence::Weekly => &self.weekly,
            Cadence::Monthly => &self.monthly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedTable {
    pub table: String,
    pub file_name: String,
    pub file_id: String,
    pub bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupResult {
    pub backup_id: SetId,
    pub tenant_id: String,
    pub cadence: Cadence,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub uploaded: Vec<UploadedTable>,
    pub failed: Vec<TableFailure>,
    pub manifest_file_id: Option<String>,
    pub prune: PruneReport,
}

impl BackupResult {
    /// Some table or the manifest did not make it.
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty() || self.manifest_file_id.is_none()
    }

    pub(crate) fn partial_summary(&self) -> Option<String> {
        if !self.is_partial() {
            return None;
        }
        let mut parts: Vec<String> = self
            .failed
            .iter()
            .map(|failure| format!("{}: {}", failure.table, failure.error))
            .collect();
        if self.manifest_file_id.is_none() {
            parts.push("manifest not uploaded".to_string());
        }
        Some(format!("partial backup ({})", parts.join("; ")))
    }
}

/// Ships a tenant's table mirrors to the remote store and prunes old sets.
pub struct BackupOrchestrator {
    data_root: PathBuf,
    credentials: BackupCredentials,
    connector: Arc<dyn RemoteConnector>,
    config: BackupConfig,
    statuses: DashMap<String, BackupStatus>,
}

impl BackupOrchestrator {
    pub fn new(
        data_root: impl Into<PathBuf>,
        vault: Arc<dyn CredentialVault>,
        connector: Arc<dyn RemoteConnector>,
        config: BackupConfig,
    ) -> Self {
        Self {
            data_root: data_root.into(),
            credentials: BackupCredentials::new(vault),
            connector,
            config,
            statuses: DashMap::new(),
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub async fn run_backup(&self, tenant_id: &str) -> Result<BackupResult, BackupError> {
        self.run_backup_with_cadence(tenant_id, Cadence::Daily).await
    }

    pub async fn run_backup_with_cadence(
        &self,
        tenant_id: &str,
        cadence: Cadence,
    ) -> Result<BackupResult, BackupError> {
        let started_at = Utc::now();
        match self.execute(tenant_id, cadence, started_at).await {
            Ok(result) => {
                info!(
                    tenant_id,
                    backup_id = %result.backup_id,
                    cadence = %cadence,
                    uploaded = result.uploaded.len(),
                    failed = result.failed.len(),
                    pruned = result.prune.deleted.len(),
                    "backup finished"
                );
                self.statuses
                    .entry(tenant_id.to_string())
                    .or_default()
                    .record_success(&result);
                Ok(result)
            }
            Err(err) => {
                warn!(tenant_id, cadence = %cadence, error = %err, "backup failed");
                self.statuses
                    .entry(tenant_id.to_string())
                    .or_default()
                    .record_failure(started_at, err.to_string());
                Err(err)
            }
        }
    }

    pub fn status(&self, tenant_id: &str) -> BackupStatus {
        self.statuses
            .get(tenant_id)
            .map(|status| status.value().clone())
            .unwrap_or_default()
    }

    /// Finds or creates `<app folder>/{daily,weekly,monthly}`.
    ///
    /// Two concurrent runs can both miss the lookup and create the same
    /// folder twice. That is tolerated: lookups take the first match, and
    /// files in an unused duplicate are still reachable remotely.
    pub async fn ensure_folder_structure(
        &self,
        store: &dyn RemoteStore,
    ) -> Result<FolderIds, BackupError> {
        let root = self.find_or_create_folder(store, &self.config.app_folder, None).await?;
        let daily = self
            .find_or_create_folder(store, Cadence::Daily.folder_name(), Some(&root))
            .await?;
        let weekly = self
            .find_or_create_folder(store, Cadence::Weekly.folder_name(), Some(&root))
            .await?;
        let monthly = self
            .find_or_create_folder(store, Cadence::Monthly.folder_name(), Some(&root))
            .await?;
        Ok(FolderIds {
            root,
            daily,
            weekly,
            monthly,
        })
    }

    async fn find_or_create_folder(
        &self,
        store: &dyn RemoteStore,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, BackupError> {
        let retry = &self.config.retry;
        let query = FolderQuery::new(name, parent_id);
        let existing = retry.run("list_folders", || store.list_folders(&query)).await?;
        if let Some(folder) = existing.into_iter().next() {
            return Ok(folder.id);
        }

        let id = retry
            .run("create_folder", || store.create_folder(name, parent_id))
            .await?;
        info!(folder = name, parent = query.parent(), "created backup folder");
        Ok(id)
    }

    async fn connect(&self, tenant_id: &str) -> Result<Arc<dyn RemoteStore>, BackupError> {
        let token = self
            .credentials
            .load_refresh_token(tenant_id)?
            .map(Zeroizing::new)
            .ok_or_else(|| BackupError::AuthFailed("no backup credential stored".into()))?;

        let store = self
            .config
            .retry
            .run("connect", || self.connector.connect(tenant_id, &token))
            .await?;
        Ok(store)
    }

    async fn execute(
        &self,
        tenant_id: &str,
        cadence: Cadence,
        started_at: DateTime<Utc>,
    ) -> Result<BackupResult, BackupError> {
        let paths = TenantPaths::new(&self.data_root, tenant_id)?;
        let store = self.connect(tenant_id).await?;
        let folders = self.ensure_folder_structure(store.as_ref()).await?;
        let folder_id = folders.for_cadence(cadence);
        let set_id = SetId::from_datetime(started_at);

        let mirrors = paths.existing_mirrors()?;
        if mirrors.is_empty() {
            debug!(tenant_id, "no table mirrors on disk");
        }

        let (uploaded, failed) = self
            .upload_mirrors(tenant_id, store.as_ref(), folder_id, &set_id, mirrors)
            .await;

        let manifest = BackupManifest {
            backup_id: set_id.clone(),
            tenant_id: tenant_id.to_string(),
            created_at: started_at,
            cadence,
            tables: uploaded.iter().map(|upload| upload.table.clone()).collect(),
            failed_tables: failed.clone(),
        };
        let manifest_file_id = self
            .upload_manifest(tenant_id, store.as_ref(), folder_id, &manifest)
            .await;

        // A run that uploaded nothing must not push a good set out of retention.
        let prune = if uploaded.is_empty() {
            debug!(tenant_id, "skipping retention after empty backup");
            PruneReport::default()
        } else {
            self.prune(store.as_ref(), folder_id, cadence, &set_id).await
        };

        Ok(BackupResult {
            backup_id: set_id,
            tenant_id: tenant_id.to_string(),
            cadence,
            started_at,
            finished_at: Utc::now(),
            uploaded,
            failed,
            manifest_file_id,
            prune,
        })
    }

    async fn upload_mirrors(
        &self,
        tenant_id: &str,
        store: &dyn RemoteStore,
        folder_id: &str,
        set_id: &SetId,
        mirrors: Vec<(String, PathBuf)>,
    ) -> (Vec<UploadedTable>, Vec<TableFailure>) {
        let concurrency = self.config.upload_concurrency.max(1);
        let outcomes: Vec<(String, Result<UploadedTable, String>)> = stream::iter(mirrors)
            .map(|(table, path)| async move {
                let outcome = self.upload_table(store, folder_id, set_id, &table, &path).await;
                (table, outcome)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut uploaded = Vec::new();
        let mut failed = Vec::new();
        for (table, outcome) in outcomes {
            match outcome {
                Ok(upload) => uploaded.push(upload),
                Err(error) => {
                    warn!(tenant_id, table = %table, error = %error, "table upload failed");
                    failed.push(TableFailure { table, error });
                }
            }
        }
        uploaded.sort_by(|a, b| a.table.cmp(&b.table));
        failed.sort_by(|a, b| a.table.cmp(&b.table));
        (uploaded, failed)
    }

    async fn upload_table(
        &self,
        store: &dyn RemoteStore,
        folder_id: &str,
        set_id: &SetId,
        table: &str,
        path: &Path,
    ) -> Result<UploadedTable, String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| format!("read {}: {err}", path.display()))?;
        let file_name = table_file_name(table, set_id);
        let size = bytes.len();

        let file_id = self
            .config
            .retry
            .run("upload_file", || store.upload_file(&file_name, folder_id, bytes.clone()))
            .await
            .map_err(|err| err.to_string())?;

        debug!(table, file = %file_name, bytes = size, "uploaded table mirror");
        Ok(UploadedTable {
            table: table.to_string(),
            file_name,
            file_id,
            bytes: size,
        })
    }

    async fn upload_manifest(
        &self,
        tenant_id: &str,
        store: &dyn RemoteStore,
        folder_id: &str,
        manifest: &BackupManifest,
    ) -> Option<String> {
        let bytes = match manifest.to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(tenant_id, error = %err, "cannot encode backup manifest");
                return None;
            }
        };
        let file_name = manifest.file_name();
        match self
            .config
            .retry
            .run("upload_file", || store.upload_file(&file_name, folder_id, bytes.clone()))
            .await
        {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(tenant_id, file = %file_name, error = %err, "manifest upload failed");
                None
            }
        }
    }

    async fn prune(
        &self,
        store: &dyn RemoteStore,
        folder_id: &str,
        cadence: Cadence,
        set_id: &SetId,
    ) -> PruneReport {
        let max_sets = self.config.retention.max_sets(cadence);
        match enforce_retention(
            store,
            folder_id,
            max_sets,
            Some(set_id),
            self.config.retention_mode,
            &self.config.retry,
        )
        .await
        {
            Ok(report) => report,
            Err(err) => {
                warn!(folder_id, cadence = %cadence, error = %err, "retention pass skipped");
                PruneReport {
                    listing_error: Some(err.to_string()),
                    ..PruneReport::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::MemoryVault;
    use ledgerbox_object_store::{MemoryConnector, MemoryObjectStore};
    use tempfile::tempdir;

    fn orchestrator(remote: Arc<MemoryObjectStore>, vault: Arc<MemoryVault>) -> (tempfile::TempDir, BackupOrchestrator) {
        let root = tempdir().unwrap();
        let config = BackupConfig {
            retry: RetryPolicy::no_retry(std::time::Duration::from_secs(2)),
            ..BackupConfig::default()
        };
        let orchestrator = BackupOrchestrator::new(
            root.path(),
            vault,
            Arc::new(MemoryConnector::new(remote)),
            config,
        );
        (root, orchestrator)
    }

    #[tokio::test]
    async fn folder_structure_is_created_once() {
        let remote = Arc::new(MemoryObjectStore::new());
        let (_root, orchestrator) = orchestrator(remote.clone(), Arc::new(MemoryVault::new()));

        let first = orchestrator.ensure_folder_structure(remote.as_ref()).await.unwrap();
        let second = orchestrator.ensure_folder_structure(remote.as_ref()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(remote.create_folder_calls(), 4);
        assert_eq!(remote.folders_named(DEFAULT_APP_FOLDER).len(), 1);
        assert_eq!(remote.folders_named("daily").len(), 1);
    }

    #[tokio::test]
    async fn missing_credential_is_auth_failure_in_status() {
        let remote = Arc::new(MemoryObjectStore::new());
        let (_root, orchestrator) = orchestrator(remote.clone(), Arc::new(MemoryVault::new()));

        let err = orchestrator.run_backup("T1").await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(remote.upload_calls(), 0);

        let status = orchestrator.status("T1");
        assert!(status.last_run_at.is_some());
        assert!(status.last_success_at.is_none());
        assert!(status.last_error.unwrap().contains("no backup credential"));
    }

    #[test]
    fn partial_summary_names_failed_tables() {
        let result = BackupResult {
            backup_id: SetId::from_datetime(Utc::now()),
            tenant_id: "T1".into(),
            cadence: Cadence::Daily,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            uploaded: Vec::new(),
            failed: vec![TableFailure {
                table: "invoices".into(),
                error: "refused".into(),
            }],
            manifest_file_id: Some("m".into()),
            prune: PruneReport::default(),
        };
        assert!(result.is_partial());
        assert_eq!(result.partial_summary().unwrap(), "partial backup (invoices: refused)");
    }
}
