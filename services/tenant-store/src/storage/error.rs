use std::io;

use thiserror::Error;

use crate::vault::VaultError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid tenant id: {0}")]
    InvalidTenantId(String),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("cannot open database for tenant {tenant_id}: {reason}")]
    OpenFailed { tenant_id: String, reason: String },
    #[error("schema migration {version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
    #[error("connection poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn open_failed(tenant_id: &str, reason: impl Into<String>) -> Self {
        StoreError::OpenFailed {
            tenant_id: tenant_id.to_string(),
            reason: reason.into(),
        }
    }
}
