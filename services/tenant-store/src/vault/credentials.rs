use std::sync::Arc;

use tracing::info;

use super::{CredentialVault, VaultError, BACKUP_REFRESH_SERVICE};

/// Refresh credentials that authorize a tenant's off-site backups.
#[derive(Clone)]
pub struct BackupCredentials {
    vault: Arc<dyn CredentialVault>,
    service: String,
}

impl BackupCredentials {
    pub fn new(vault: Arc<dyn CredentialVault>) -> Self {
        Self {
            vault,
            service: BACKUP_REFRESH_SERVICE.to_string(),
        }
    }

    pub fn store_refresh_token(&self, tenant_id: &str, token: &str) -> Result<(), VaultError> {
        self.vault.set(&self.service, tenant_id, token)?;
        info!(tenant_id, "stored backup refresh credential");
        Ok(())
    }

    pub fn load_refresh_token(&self, tenant_id: &str) -> Result<Option<String>, VaultError> {
        Ok(self
            .vault
            .get(&self.service, tenant_id)?
            .filter(|token| !token.trim().is_empty()))
    }

    pub fn clear_refresh_token(&self, tenant_id: &str) -> Result<(), VaultError> {
        self.vault.delete(&self.service, tenant_id)
    }
}
