//! Tenant-scoped encrypted business store.
//!
//! Each tenant gets a SQLCipher database keyed from the platform credential
//! vault ([`storage::TenantStore`]), JSON mirrors of its tables
//! ([`mirror::MirrorSync`]) and off-site backups of those mirrors
//! ([`backup::BackupOrchestrator`]).

pub mod backup;
pub mod config;
pub mod mirror;
pub mod storage;
pub mod vault;

pub use backup::{BackupError, BackupOrchestrator, BackupResult, BackupScheduler, BackupStatus, Cadence};
pub use config::{LedgerboxConfig, VaultBackend};
pub use mirror::{MirrorError, MirrorReport, MirrorSync};
pub use storage::{StoreError, TenantHandle, TenantStore};
pub use vault::{CredentialVault, KeyringVault, MemoryVault, TenantKeyVault, VaultError};
