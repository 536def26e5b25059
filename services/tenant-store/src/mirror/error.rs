use std::io;

use thiserror::Error;

use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("table name {0:?} is not a plain identifier")]
    InvalidTableName(String),
    #[error("no mirror written yet for table {0}")]
    NotMirrored(String),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for MirrorError {
    fn from(error: rusqlite::Error) -> Self {
        MirrorError::Store(StoreError::from(error))
    }
}
