use keyring::Entry;

use super::{CredentialVault, VaultError};

/// OS keychain (Keychain, Credential Manager, Secret Service) via `keyring`.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringVault;

impl KeyringVault {
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, account: &str) -> Result<Entry, VaultError> {
        Entry::new(service, account).map_err(|e| VaultError::Unavailable(format!("keyring init: {e}")))
    }
}

impl CredentialVault for KeyringVault {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, VaultError> {
        match Self::entry(service, account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::Unavailable(format!("load secret: {e}"))),
        }
    }

    fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), VaultError> {
        Self::entry(service, account)?
            .set_password(secret)
            .map_err(|e| VaultError::Unavailable(format!("store secret: {e}")))
    }

    fn delete(&self, service: &str, account: &str) -> Result<(), VaultError> {
        match Self::entry(service, account)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(VaultError::Unavailable(format!("delete secret: {e}"))),
        }
    }
}
