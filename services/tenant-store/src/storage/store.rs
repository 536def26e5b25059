use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::vault::{CredentialVault, TenantKeyVault};

use super::database::TenantHandle;
use super::error::StoreError;
use super::paths::{ensure_dir, TenantPaths};

/// Entry point for tenant databases. Caches one handle per tenant.
pub struct TenantStore {
    data_root: PathBuf,
    keys: TenantKeyVault,
    handles: DashMap<String, Arc<TenantHandle>>,
    open_lock: Mutex<()>,
}

impl TenantStore {
    pub fn new(data_root: impl Into<PathBuf>, vault: Arc<dyn CredentialVault>) -> Result<Self, StoreError> {
        let data_root = data_root.into();
        ensure_dir(&data_root)?;
        Ok(Self {
            data_root,
            keys: TenantKeyVault::new(vault),
            handles: DashMap::new(),
            open_lock: Mutex::new(()),
        })
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn paths_for(&self, tenant_id: &str) -> Result<TenantPaths, StoreError> {
        TenantPaths::new(&self.data_root, tenant_id)
    }

    pub fn open(&self, tenant_id: &str) -> Result<Arc<TenantHandle>, StoreError> {
        if let Some(handle) = self.handles.get(tenant_id) {
            return Ok(Arc::clone(handle.value()));
        }

        let _guard = self.open_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = self.handles.get(tenant_id) {
            return Ok(Arc::clone(handle.value()));
        }

        let paths = self.paths_for(tenant_id)?;
        paths.ensure_layout()?;

        // An existing file without a key in the vault is unrecoverable here;
        // minting a fresh key would only produce a second OpenFailed later.
        let db_file = paths.database_file();
        let has_data = db_file.metadata().map(|meta| meta.len() > 0).unwrap_or(false);
        if has_data && !self.keys.has_key(tenant_id)? {
            warn!(tenant_id, "database exists but no key is stored for it");
            return Err(StoreError::open_failed(
                tenant_id,
                "database exists but its key is missing from the credential vault",
            ));
        }

        let key = self.keys.get_or_create_key(tenant_id)?;
        let handle = Arc::new(TenantHandle::open(tenant_id, paths, &key)?);
        self.handles.insert(tenant_id.to_string(), Arc::clone(&handle));

        if handle.was_created() {
            info!(tenant_id, "provisioned tenant store");
        } else {
            debug!(tenant_id, "unlocked tenant store");
        }
        Ok(handle)
    }

    /// Drops the cached handle. The connection closes once the last clone goes.
    pub fn close(&self, tenant_id: &str) -> bool {
        self.handles.remove(tenant_id).is_some()
    }

    pub fn is_open(&self, tenant_id: &str) -> bool {
        self.handles.contains_key(tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{MemoryVault, VaultError, DATABASE_KEY_SERVICE};
    use tempfile::tempdir;

    #[test]
    fn open_twice_returns_cached_handle() {
        let root = tempdir().unwrap();
        let store = TenantStore::new(root.path(), Arc::new(MemoryVault::new())).unwrap();

        let first = store.open("T1").unwrap();
        let second = store.open("T1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.was_created());
        assert!(store.is_open("T1"));
    }

    #[test]
    fn reopen_after_close_sees_committed_rows() {
        let root = tempdir().unwrap();
        let vault = Arc::new(MemoryVault::new());
        let store = TenantStore::new(root.path(), vault.clone()).unwrap();

        let handle = store.open("T1").unwrap();
        handle
            .with_connection(|conn| {
                conn.execute("INSERT INTO settings (key, value) VALUES ('currency', 'EUR')", [])?;
                Ok(())
            })
            .unwrap();
        drop(handle);
        assert!(store.close("T1"));

        let store = TenantStore::new(root.path(), vault).unwrap();
        let handle = store.open("T1").unwrap();
        assert!(!handle.was_created());
        let currency: String = handle
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT value FROM settings WHERE key = 'currency'", [], |row| {
                    row.get(0)
                })?)
            })
            .unwrap();
        assert_eq!(currency, "EUR");
    }

    #[test]
    fn unavailable_vault_surfaces_as_vault_error() {
        let root = tempdir().unwrap();
        let vault = Arc::new(MemoryVault::new());
        vault.set_unavailable(true);
        let store = TenantStore::new(root.path(), vault).unwrap();

        let err = store.open("T1").unwrap_err();
        assert!(matches!(err, StoreError::Vault(VaultError::Unavailable(_))));
        assert!(!store.paths_for("T1").unwrap().database_file().exists());
    }

    #[test]
    fn lost_key_is_open_failed_not_a_new_database() {
        let root = tempdir().unwrap();
        let vault = Arc::new(MemoryVault::new());
        {
            let store = TenantStore::new(root.path(), vault.clone()).unwrap();
            store.open("T1").unwrap();
        }
        vault.delete(DATABASE_KEY_SERVICE, "T1").unwrap();

        let store = TenantStore::new(root.path(), vault.clone()).unwrap();
        let err = store.open("T1").unwrap_err();
        assert!(matches!(err, StoreError::OpenFailed { .. }));
        assert!(vault.get(DATABASE_KEY_SERVICE, "T1").unwrap().is_none());
    }

    #[test]
    fn tenants_are_isolated() {
        let root = tempdir().unwrap();
        let store = TenantStore::new(root.path(), Arc::new(MemoryVault::new())).unwrap();

        let a = store.open("auth0|alice").unwrap();
        let b = store.open("auth0|bob").unwrap();
        assert_ne!(a.paths().root(), b.paths().root());
        a.with_connection(|conn| {
            conn.execute("INSERT INTO products (id, name) VALUES ('p1', 'Pen')", [])?;
            Ok(())
        })
        .unwrap();

        let count: i64 = b
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn invalid_tenant_id_is_rejected() {
        let root = tempdir().unwrap();
        let store = TenantStore::new(root.path(), Arc::new(MemoryVault::new())).unwrap();
        assert!(matches!(store.open(""), Err(StoreError::InvalidTenantId(_))));
    }
}
