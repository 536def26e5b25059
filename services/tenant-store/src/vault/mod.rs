//! Credential vault access: the per-tenant database key and the backup
//! refresh credential live in the platform secret store, never on disk.

pub mod credentials;
pub mod error;
pub mod keychain;
pub mod memory;
pub mod tenant_key;

pub use credentials::BackupCredentials;
pub use error::VaultError;
pub use keychain::KeyringVault;
pub use memory::MemoryVault;
pub use tenant_key::{TenantKey, TenantKeyVault};

pub const DATABASE_KEY_SERVICE: &str = "ledgerbox.database-key";
pub const BACKUP_REFRESH_SERVICE: &str = "ledgerbox.backup-refresh";

/// Minimal secret-store capability (`service` + `account` addressed strings).
pub trait CredentialVault: Send + Sync {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, VaultError>;

    fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), VaultError>;

    /// Removing a missing entry is not an error.
    fn delete(&self, service: &str, account: &str) -> Result<(), VaultError>;
}
