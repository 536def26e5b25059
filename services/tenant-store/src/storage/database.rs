use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use rusqlite::{Connection, OptionalExtension, Transaction};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::vault::TenantKey;

use super::error::StoreError;
use super::paths::TenantPaths;
use super::schema::apply_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open, unlocked, migrated database of one tenant.
pub struct TenantHandle {
    tenant_id: String,
    paths: TenantPaths,
    created: bool,
    conn: Mutex<Connection>,
    mirror_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for TenantHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantHandle")
            .field("tenant_id", &self.tenant_id)
            .field("database", &self.paths.database_file())
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

impl TenantHandle {
    pub(crate) fn open(
        tenant_id: &str,
        paths: TenantPaths,
        key: &TenantKey,
    ) -> Result<Self, StoreError> {
        let db_path = paths.database_file();
        let is_new = match fs::metadata(&db_path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let mut conn = Connection::open(&db_path)
            .map_err(|err| StoreError::open_failed(tenant_id, err.to_string()))?;

        // A build without SQLCipher silently ignores `PRAGMA key`.
        let cipher: Option<String> = conn
            .query_row("PRAGMA cipher_version", [], |row| row.get(0))
            .optional()?;
        if cipher.is_none() {
            return Err(StoreError::open_failed(
                tenant_id,
                "sqlite build has no encryption support",
            ));
        }

        let pragma = Zeroizing::new(format!("PRAGMA key = \"{}\";", key.sqlcipher_literal().as_str()));
        conn.execute_batch(&pragma)
            .map_err(|err| StoreError::open_failed(tenant_id, err.to_string()))?;

        // First read is where SQLCipher reports a key mismatch.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|err| {
                StoreError::open_failed(tenant_id, format!("wrong key or corrupted database: {err}"))
            })?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let applied = apply_migrations(&mut conn, tenant_id)?;

        if is_new {
            info!(tenant_id, path = %db_path.display(), "created tenant database");
        } else {
            debug!(tenant_id, migrations = applied, "opened tenant database");
        }

        Ok(Self {
            tenant_id: tenant_id.to_string(),
            paths,
            created: is_new,
            conn: Mutex::new(conn),
            mirror_locks: DashMap::new(),
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn paths(&self) -> &TenantPaths {
        &self.paths
    }

    /// True when this handle created the database file.
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// Serializes mirror writers of one table so a slower snapshot cannot
    /// land after a newer one.
    pub(crate) fn mirror_lock(&self, table: &str) -> Arc<Mutex<()>> {
        self.mirror_locks
            .entry(table.to_string())
            .or_default()
            .clone()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Runs `f` in a transaction; commits on `Ok`, rolls back otherwise.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        self.with_connection(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// User tables, sorted by name.
    pub fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }
}
