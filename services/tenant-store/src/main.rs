use std::sync::Arc;

use anyhow::{Context, Result};
use ledgerbox_object_store::DriveConnector;
use ledgerbox_tenant_store::backup::{BackupOrchestrator, BackupScheduler};
use ledgerbox_tenant_store::config::{LedgerboxConfig, VaultBackend};
use ledgerbox_tenant_store::vault::{CredentialVault, KeyringVault, MemoryVault};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    let config = LedgerboxConfig::from_env()?;
    init_tracing(&config.log_level)?;

    info!(
        data_dir = %config.data_dir.display(),
        tenants = config.backup_tenants.len(),
        interval_secs = config.backup_interval_secs,
        "starting ledgerbox backup daemon"
    );

    let vault: Arc<dyn CredentialVault> = match config.vault_backend {
        VaultBackend::Keyring => Arc::new(KeyringVault::new()),
        VaultBackend::Memory => {
            warn!("using in-memory credential vault; keys will not survive a restart");
            Arc::new(MemoryVault::new())
        }
    };
    let connector = DriveConnector::new(config.remote.clone())
        .context("unable to build remote drive client")?;

    let orchestrator = Arc::new(BackupOrchestrator::new(
        config.data_dir.clone(),
        vault,
        Arc::new(connector),
        config.backup_config(),
    ));
    let scheduler = BackupScheduler::new(
        orchestrator,
        config.backup_tenants.clone(),
        config.backup_interval(),
        config.promote_cadence,
    );

    if once {
        let summary = scheduler.run_once().await;
        info!(
            succeeded = summary.succeeded,
            partial = summary.partial,
            failed = summary.failed,
            "single backup pass complete"
        );
        if summary.failed > 0 {
            anyhow::bail!("{} tenant backup(s) failed", summary.failed);
        }
        return Ok(());
    }

    if config.backup_tenants.is_empty() {
        warn!("BACKUP_TENANTS is empty; scheduler will idle");
    }
    let task = scheduler.start();

    shutdown_signal().await;
    task.abort();
    info!("ledgerbox backup daemon shutting down");
    Ok(())
}

fn init_tracing(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
