use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FOLDER_MIME_TYPE, ROOT_PARENT_ID};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub created_time: DateTime<Utc>,
}

/// Folder lookup by exact name under a parent. `parent_id: None` means the
/// top level of the remote drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderQuery {
    pub name: String,
    pub parent_id: Option<String>,
}

impl FolderQuery {
    pub fn new(name: impl Into<String>, parent_id: Option<&str>) -> Self {
        Self {
            name: name.into(),
            parent_id: parent_id.map(str::to_string),
        }
    }

    pub fn parent(&self) -> &str {
        self.parent_id.as_deref().unwrap_or(ROOT_PARENT_ID)
    }

    /// Render as a Drive `q` search expression.
    pub fn to_drive_query(&self) -> String {
        format!(
            "name = '{}' and mimeType = '{}' and '{}' in parents and trashed = false",
            escape_query_literal(&self.name),
            FOLDER_MIME_TYPE,
            escape_query_literal(self.parent()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileOrder {
    /// Newest first.
    #[default]
    CreatedTimeDesc,
}

impl FileOrder {
    pub fn as_query(&self) -> &'static str {
        match self {
            FileOrder::CreatedTimeDesc => "createdTime desc",
        }
    }
}

pub(crate) fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
