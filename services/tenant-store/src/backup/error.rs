use std::io;

use ledgerbox_object_store::RemoteError;
use thiserror::Error;

use crate::storage::StoreError;
use crate::vault::VaultError;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup authorization failed: {0}")]
    AuthFailed(String),
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(RemoteError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RemoteError> for BackupError {
    fn from(error: RemoteError) -> Self {
        if error.is_auth() {
            BackupError::AuthFailed(error.to_string())
        } else {
            BackupError::RemoteUnavailable(error)
        }
    }
}

impl From<VaultError> for BackupError {
    fn from(error: VaultError) -> Self {
        BackupError::AuthFailed(format!("credential vault: {error}"))
    }
}

impl BackupError {
    pub fn is_auth(&self) -> bool {
        matches!(self, BackupError::AuthFailed(_))
    }
}
