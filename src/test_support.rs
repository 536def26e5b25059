//! Fixtures shared by the end-to-end suite: a scratch data root, an
//! in-memory vault and remote drive, and helpers to write business rows.

use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use rusqlite::params;
use tempfile::TempDir;

pub use ledgerbox_object_store::{MemoryConnector, MemoryObjectStore};
pub use ledgerbox_tenant_store::backup::{BackupConfig, BackupOrchestrator, RetryPolicy};
pub use ledgerbox_tenant_store::mirror::MirrorSync;
pub use ledgerbox_tenant_store::storage::{TenantHandle, TenantStore};
pub use ledgerbox_tenant_store::vault::{BackupCredentials, MemoryVault};

static TRACING: Once = Once::new();

pub fn init_test_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn random_tenant_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    format!("{}-{}", prefix, rng.gen::<u32>())
}

/// Retries without real waiting so fault-injection tests stay fast.
pub fn fast_backup_config() -> BackupConfig {
    BackupConfig {
        retry: RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            call_timeout: Duration::from_secs(2),
        },
        ..BackupConfig::default()
    }
}

pub struct LedgerFixture {
    pub temp_dir: TempDir,
    pub vault: Arc<MemoryVault>,
    pub store: TenantStore,
    pub remote: Arc<MemoryObjectStore>,
}

impl LedgerFixture {
    pub fn new() -> Result<Self> {
        init_test_tracing();
        let temp_dir = TempDir::new().context("creating scratch data root")?;
        let vault = Arc::new(MemoryVault::new());
        let store = TenantStore::new(temp_dir.path(), vault.clone())?;
        Ok(Self {
            temp_dir,
            vault,
            store,
            remote: Arc::new(MemoryObjectStore::new()),
        })
    }

    pub fn data_root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Stores a refresh credential the fixture's connector will accept.
    pub fn grant_backup_access(&self, tenant_id: &str) -> Result<String> {
        let token = format!("refresh-{tenant_id}");
        BackupCredentials::new(self.vault.clone()).store_refresh_token(tenant_id, &token)?;
        Ok(token)
    }

    pub fn orchestrator(&self, config: BackupConfig) -> BackupOrchestrator {
        BackupOrchestrator::new(
            self.data_root(),
            self.vault.clone(),
            Arc::new(MemoryConnector::new(self.remote.clone())),
            config,
        )
    }

    /// Store sharing this fixture's vault and data root, as a restarted
    /// process would see it.
    pub fn reopen_store(&self) -> Result<TenantStore> {
        Ok(TenantStore::new(self.data_root(), self.vault.clone())?)
    }
}

pub fn insert_product(handle: &TenantHandle, id: &str, name: &str, stock: i64) -> Result<()> {
    handle.with_connection(|conn| {
        conn.execute(
            "INSERT INTO products (id, name, stock) VALUES (?1, ?2, ?3)",
            params![id, name, stock],
        )?;
        Ok(())
    })?;
    MirrorSync::sync(handle, "products", None)?;
    Ok(())
}

pub fn insert_customer(handle: &TenantHandle, id: &str, name: &str) -> Result<()> {
    handle.with_connection(|conn| {
        conn.execute(
            "INSERT INTO customers (id, name) VALUES (?1, ?2)",
            params![id, name],
        )?;
        Ok(())
    })?;
    MirrorSync::sync(handle, "customers", None)?;
    Ok(())
}

pub fn row_count(handle: &TenantHandle, table: &str) -> Result<i64> {
    let count = handle.with_connection(|conn| {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))?)
    })?;
    Ok(count)
}
