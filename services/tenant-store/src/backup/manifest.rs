use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cadence;

const SET_ID_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";
const SET_ID_LEN: usize = 19;
const MANIFEST_PREFIX: &str = "manifest";
const FILE_EXTENSION: &str = ".json";

/// UTC stamp shared by every file of one backup set, e.g.
/// `20260301T020000123Z`. Sorts chronologically as a string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetId(String);

impl SetId {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format(SET_ID_FORMAT).to_string())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let bytes = raw.as_bytes();
        if bytes.len() != SET_ID_LEN || bytes[8] != b'T' || bytes[18] != b'Z' {
            return None;
        }
        let digits_ok = bytes[..8]
            .iter()
            .chain(&bytes[9..18])
            .all(u8::is_ascii_digit);
        digits_ok.then(|| Self(raw.to_string()))
    }

    /// Set id carried by `<table>-<set_id>.json` or `manifest-<set_id>.json`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(FILE_EXTENSION)?;
        let (_, suffix) = stem.rsplit_once('-')?;
        Self::parse(suffix)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn table_file_name(table: &str, set_id: &SetId) -> String {
    format!("{table}-{set_id}{FILE_EXTENSION}")
}

pub fn manifest_file_name(set_id: &SetId) -> String {
    format!("{MANIFEST_PREFIX}-{set_id}{FILE_EXTENSION}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

/// Index document uploaded last in every set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub backup_id: SetId,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    pub cadence: Cadence,
    pub tables: Vec<String>,
    pub failed_tables: Vec<TableFailure>,
}

impl BackupManifest {
    pub fn file_name(&self) -> String {
        manifest_file_name(&self.backup_id)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap() + chrono::Duration::milliseconds(123)
    }

    #[test]
    fn set_id_has_millisecond_precision() {
        let id = SetId::from_datetime(stamp());
        assert_eq!(id.as_str(), "20260301T020000123Z");
        assert_eq!(SetId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn set_id_is_recovered_from_file_names() {
        let id = SetId::from_datetime(stamp());
        assert_eq!(SetId::from_file_name(&table_file_name("products", &id)), Some(id.clone()));
        assert_eq!(SetId::from_file_name(&manifest_file_name(&id)), Some(id.clone()));
        assert_eq!(
            SetId::from_file_name(&table_file_name("line_items", &id)),
            Some(id)
        );
        assert_eq!(SetId::from_file_name("notes.json"), None);
        assert_eq!(SetId::from_file_name("products-2026.json"), None);
        assert_eq!(SetId::from_file_name("products-20260301T020000123Z.txt"), None);
    }

    #[test]
    fn set_ids_sort_chronologically() {
        let earlier = SetId::from_datetime(stamp());
        let later = SetId::from_datetime(stamp() + chrono::Duration::days(40));
        assert!(earlier < later);
    }

    #[test]
    fn manifest_serializes_expected_fields() {
        let manifest = BackupManifest {
            backup_id: SetId::from_datetime(stamp()),
            tenant_id: "T1".into(),
            created_at: stamp(),
            cadence: Cadence::Daily,
            tables: vec!["products".into()],
            failed_tables: vec![TableFailure {
                table: "invoices".into(),
                error: "refused".into(),
            }],
        };
        let value: serde_json::Value = serde_json::from_slice(&manifest.to_bytes().unwrap()).unwrap();
        assert_eq!(value["backup_id"], "20260301T020000123Z");
        assert_eq!(value["cadence"], "daily");
        assert_eq!(value["tables"][0], "products");
        assert_eq!(value["failed_tables"][0]["table"], "invoices");
        assert_eq!(manifest.file_name(), "manifest-20260301T020000123Z.json");
    }
}
