use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rusqlite::types::ValueRef;
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::storage::paths::ensure_dir;
use crate::storage::{StoreError, TenantHandle, BUSINESS_TABLES};

use super::{MirrorError, TEMP_SUFFIX};

/// Per-row hook applied before a row is written to the mirror.
pub type RowTransform = dyn Fn(Map<String, Value>) -> Value + Send + Sync;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    pub table: String,
    pub rows: usize,
    pub path: PathBuf,
}

/// Replaces the named TEXT columns with their parsed JSON when they hold an
/// object or array. Anything else is left untouched.
pub fn decode_json_columns(columns: &[&str]) -> Box<RowTransform> {
    let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    Box::new(move |mut row: Map<String, Value>| {
        for column in &columns {
            let decoded = match row.get(column) {
                Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
                    Ok(value @ (Value::Array(_) | Value::Object(_))) => Some(value),
                    _ => None,
                },
                _ => None,
            };
            if let Some(value) = decoded {
                row.insert(column.clone(), value);
            }
        }
        Value::Object(row)
    })
}

pub struct MirrorSync;

impl MirrorSync {
    /// Rewrites `data/<table>/<table>.json` from the current table contents.
    ///
    /// The file is replaced by rename, so readers see either the previous or
    /// the new document. An error here never affects the committed write that
    /// triggered the sync; the next successful sync brings the mirror back.
    pub fn sync(
        handle: &TenantHandle,
        table: &str,
        transform: Option<&RowTransform>,
    ) -> Result<MirrorReport, MirrorError> {
        check_identifier(table)?;
        if !handle.table_exists(table)? {
            return Err(MirrorError::UnknownTable(table.to_string()));
        }

        let lock = handle.mirror_lock(table);
        let _guard = lock.lock().map_err(|_| StoreError::Poisoned)?;

        let rows = read_rows(handle, table)?;
        let count = rows.len();
        let document: Vec<Value> = match transform {
            Some(transform) => rows.into_iter().map(transform).collect(),
            None => rows.into_iter().map(Value::Object).collect(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        let paths = handle.paths();
        let dir = paths.mirror_dir(table);
        ensure_dir(&dir)?;
        remove_orphaned_temp_files(&dir);

        let target = paths.mirror_file(table);
        write_atomic(&dir, &target, &bytes)?;

        debug!(
            tenant_id = handle.tenant_id(),
            table,
            rows = count,
            "mirrored table"
        );
        Ok(MirrorReport {
            table: table.to_string(),
            rows: count,
            path: target,
        })
    }

    /// Re-mirrors every business table. `invoices.items` is expanded to
    /// nested JSON. One table failing does not stop the others.
    pub fn sync_all(handle: &TenantHandle) -> Vec<(String, Result<MirrorReport, MirrorError>)> {
        let invoice_items = decode_json_columns(&["items"]);
        BUSINESS_TABLES
            .iter()
            .map(|table| {
                let transform = (*table == "invoices").then_some(invoice_items.as_ref());
                let outcome = Self::sync(handle, table, transform);
                if let Err(err) = &outcome {
                    warn!(
                        tenant_id = handle.tenant_id(),
                        table,
                        error = %err,
                        "mirror sync failed"
                    );
                }
                (table.to_string(), outcome)
            })
            .collect()
    }

    pub fn read_mirror(handle: &TenantHandle, table: &str) -> Result<Vec<Value>, MirrorError> {
        check_identifier(table)?;
        let path = handle.paths().mirror_file(table);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(MirrorError::NotMirrored(table.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }
}

fn check_identifier(table: &str) -> Result<(), MirrorError> {
    let valid = !table.is_empty()
        && table.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        && !table.starts_with(|ch: char| ch.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(MirrorError::InvalidTableName(table.to_string()))
    }
}

fn read_rows(handle: &TenantHandle, table: &str) -> Result<Vec<Map<String, Value>>, MirrorError> {
    let rows = handle.with_connection(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT * FROM \"{table}\" ORDER BY rowid"))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                object.insert(column.clone(), to_json(row.get_ref(idx)?));
            }
            out.push(object);
        }
        Ok(out)
    })?;
    Ok(rows)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Number(v.into()),
        ValueRef::Real(v) => Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(STANDARD.encode(bytes)),
    }
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), MirrorError> {
    let mut staged = tempfile::Builder::new()
        .prefix(".mirror-")
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(target).map_err(|err| MirrorError::Io(err.error))?;
    Ok(())
}

/// Leftovers from a process that died between staging and rename. Only
/// called with the table's mirror lock held.
fn remove_orphaned_temp_files(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_temp = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(TEMP_SUFFIX));
        if is_temp {
            if let Err(err) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %err, "cannot remove stale mirror temp file");
            }
        }
    }
}
