//! Off-site backups of tenant mirrors: upload, manifest, retention, scheduling.

pub mod cadence;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod retention;
pub mod retry;
pub mod scheduler;
pub mod status;

pub use cadence::Cadence;
pub use error::BackupError;
pub use manifest::{BackupManifest, SetId, TableFailure};
pub use orchestrator::{BackupConfig, BackupOrchestrator, BackupResult, FolderIds, UploadedTable};
pub use retention::{enforce_retention, PruneFailure, PruneReport, RetentionMode, RetentionPolicy};
pub use retry::RetryPolicy;
pub use scheduler::{BackupScheduler, PassSummary};
pub use status::BackupStatus;

pub const DEFAULT_APP_FOLDER: &str = "Ledgerbox Backups";
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;
pub const DEFAULT_BACKUP_INTERVAL_SECS: u64 = 86_400;
