use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use ledgerbox_object_store::DriveConfig;

use crate::backup::{
    BackupConfig, RetentionMode, RetentionPolicy, RetryPolicy, DEFAULT_APP_FOLDER,
    DEFAULT_BACKUP_INTERVAL_SECS, DEFAULT_UPLOAD_CONCURRENCY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultBackend {
    Keyring,
    /// Process-local secrets; every restart provisions new keys.
    Memory,
}

impl FromStr for VaultBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyring" => Ok(VaultBackend::Keyring),
            "memory" => Ok(VaultBackend::Memory),
            other => anyhow::bail!("unknown vault backend {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerboxConfig {
    pub data_dir: PathBuf,
    pub vault_backend: VaultBackend,
    pub backup_app_folder: String,
    pub backup_tenants: Vec<String>,
    pub backup_interval_secs: u64,
    pub promote_cadence: bool,
    pub retention: RetentionPolicy,
    pub retention_mode: RetentionMode,
    pub upload_concurrency: usize,
    pub remote: DriveConfig,
    pub remote_max_retries: u32,
    pub log_level: String,
}

const DEFAULT_FILES_PER_SET: usize = 6;

impl Default for LedgerboxConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            vault_backend: VaultBackend::Keyring,
            backup_app_folder: DEFAULT_APP_FOLDER.to_string(),
            backup_tenants: Vec::new(),
            backup_interval_secs: DEFAULT_BACKUP_INTERVAL_SECS,
            promote_cadence: true,
            retention: RetentionPolicy::default(),
            retention_mode: RetentionMode::BackupSets,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            remote: DriveConfig::default(),
            remote_max_retries: RetryPolicy::default().max_retries,
            log_level: "info".to_string(),
        }
    }
}

impl LedgerboxConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(dir) = lookup("LEDGERBOX_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup("LEDGERBOX_VAULT_BACKEND") {
            cfg.vault_backend = backend
                .parse()
                .context("LEDGERBOX_VAULT_BACKEND must be keyring or memory")?;
        }
        if let Some(folder) = lookup("BACKUP_APP_FOLDER") {
            cfg.backup_app_folder = folder;
        }
        if let Some(tenants) = lookup("BACKUP_TENANTS") {
            cfg.backup_tenants = tenants
                .split(',')
                .map(str::trim)
                .filter(|tenant| !tenant.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(interval) = lookup("BACKUP_INTERVAL_SECS") {
            cfg.backup_interval_secs = interval
                .parse()
                .context("BACKUP_INTERVAL_SECS must be a positive integer")?;
        }
        if let Some(flag) = lookup("BACKUP_PROMOTE_CADENCE") {
            cfg.promote_cadence = parse_bool(&flag)
                .with_context(|| format!("BACKUP_PROMOTE_CADENCE is invalid: {flag}"))?;
        }
        if let Some(count) = lookup("BACKUP_RETENTION_DAILY") {
            cfg.retention.daily = count
                .parse()
                .context("BACKUP_RETENTION_DAILY must be a positive integer")?;
        }
        if let Some(count) = lookup("BACKUP_RETENTION_WEEKLY") {
            cfg.retention.weekly = count
                .parse()
                .context("BACKUP_RETENTION_WEEKLY must be a positive integer")?;
        }
        if let Some(count) = lookup("BACKUP_RETENTION_MONTHLY") {
            cfg.retention.monthly = count
                .parse()
                .context("BACKUP_RETENTION_MONTHLY must be a positive integer")?;
        }

        let files_per_set = match lookup("BACKUP_FILES_PER_SET") {
            Some(value) => value
                .parse()
                .context("BACKUP_FILES_PER_SET must be a positive integer")?,
            None => DEFAULT_FILES_PER_SET,
        };
        if let Some(mode) = lookup("BACKUP_RETENTION_MODE") {
            cfg.retention_mode = match mode.trim().to_ascii_lowercase().as_str() {
                "sets" => RetentionMode::BackupSets,
                "files" => RetentionMode::FileCount { files_per_set },
                other => anyhow::bail!("BACKUP_RETENTION_MODE must be sets or files, got {other}"),
            };
        }

        if let Some(limit) = lookup("BACKUP_UPLOAD_CONCURRENCY") {
            cfg.upload_concurrency = limit
                .parse()
                .context("BACKUP_UPLOAD_CONCURRENCY must be a positive integer")?;
        }
        if let Some(base) = lookup("REMOTE_API_BASE") {
            cfg.remote.api_base = base;
        }
        if let Some(base) = lookup("REMOTE_UPLOAD_BASE") {
            cfg.remote.upload_base = base;
        }
        if let Some(url) = lookup("REMOTE_TOKEN_URL") {
            cfg.remote.token_url = url;
        }
        if let Some(id) = lookup("REMOTE_CLIENT_ID") {
            cfg.remote.client_id = id;
        }
        if let Some(secret) = lookup("REMOTE_CLIENT_SECRET") {
            cfg.remote.client_secret = secret;
        }
        if let Some(timeout) = lookup("REMOTE_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = timeout
                .parse()
                .context("REMOTE_REQUEST_TIMEOUT_SECS must be a positive integer")?;
            cfg.remote.request_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = lookup("REMOTE_MAX_RETRIES") {
            cfg.remote_max_retries = retries
                .parse()
                .context("REMOTE_MAX_RETRIES must be a non-negative integer")?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure_directory(&self.data_dir)?;

        if self.backup_app_folder.trim().is_empty() {
            anyhow::bail!("BACKUP_APP_FOLDER must not be empty");
        }
        if self.backup_interval_secs == 0 {
            anyhow::bail!("BACKUP_INTERVAL_SECS must be greater than zero");
        }
        if self.retention.daily == 0 || self.retention.weekly == 0 || self.retention.monthly == 0 {
            anyhow::bail!("backup retention counts must be greater than zero");
        }
        if let RetentionMode::FileCount { files_per_set: 0 } = self.retention_mode {
            anyhow::bail!("BACKUP_FILES_PER_SET must be greater than zero");
        }
        if self.upload_concurrency == 0 {
            anyhow::bail!("BACKUP_UPLOAD_CONCURRENCY must be greater than zero");
        }
        if self.remote.request_timeout.is_zero() {
            anyhow::bail!("REMOTE_REQUEST_TIMEOUT_SECS must be greater than zero");
        }
        if !self.backup_tenants.is_empty()
            && (self.remote.client_id.trim().is_empty() || self.remote.client_secret.trim().is_empty())
        {
            anyhow::bail!("REMOTE_CLIENT_ID and REMOTE_CLIENT_SECRET are required when BACKUP_TENANTS is set");
        }
        Ok(())
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs)
    }

    pub fn backup_config(&self) -> BackupConfig {
        BackupConfig {
            app_folder: self.backup_app_folder.clone(),
            retention: self.retention,
            retention_mode: self.retention_mode,
            upload_concurrency: self.upload_concurrency,
            retry: RetryPolicy {
                max_retries: self.remote_max_retries,
                call_timeout: self.remote.request_timeout,
                ..RetryPolicy::default()
            },
        }
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("dev", "ledgerbox", "ledgerbox")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data/ledgerbox"))
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("{} exists but is not a directory", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("unable to create data directory {}", path.display()))?;
    }
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => anyhow::bail!("invalid boolean value {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn load(vars: &[(&str, &str)]) -> Result<LedgerboxConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LedgerboxConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().into_owned();
        let cfg = load(&[("LEDGERBOX_DATA_DIR", data_dir.as_str())]).unwrap();

        assert_eq!(cfg.backup_app_folder, "Ledgerbox Backups");
        assert_eq!(cfg.retention, RetentionPolicy { daily: 7, weekly: 4, monthly: 12 });
        assert_eq!(cfg.retention_mode, RetentionMode::BackupSets);
        assert_eq!(cfg.upload_concurrency, 4);
        assert_eq!(cfg.backup_interval(), Duration::from_secs(86_400));
        assert!(cfg.promote_cadence);
        assert_eq!(cfg.vault_backend, VaultBackend::Keyring);
        assert!(cfg.backup_tenants.is_empty());
    }

    #[test]
    fn overrides_are_parsed() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("nested").to_string_lossy().into_owned();
        let cfg = load(&[
            ("LEDGERBOX_DATA_DIR", data_dir.as_str()),
            ("LEDGERBOX_VAULT_BACKEND", "memory"),
            ("BACKUP_TENANTS", " T1, auth0|x ,,"),
            ("BACKUP_RETENTION_MODE", "files"),
            ("BACKUP_FILES_PER_SET", "5"),
            ("BACKUP_PROMOTE_CADENCE", "no"),
            ("REMOTE_CLIENT_ID", "id"),
            ("REMOTE_CLIENT_SECRET", "secret"),
            ("REMOTE_REQUEST_TIMEOUT_SECS", "7"),
            ("REMOTE_MAX_RETRIES", "1"),
        ])
        .unwrap();

        assert!(dir.path().join("nested").is_dir());
        assert_eq!(cfg.vault_backend, VaultBackend::Memory);
        assert_eq!(cfg.backup_tenants, vec!["T1".to_string(), "auth0|x".to_string()]);
        assert_eq!(cfg.retention_mode, RetentionMode::FileCount { files_per_set: 5 });
        assert!(!cfg.promote_cadence);

        let backup = cfg.backup_config();
        assert_eq!(backup.retry.max_retries, 1);
        assert_eq!(backup.retry.call_timeout, Duration::from_secs(7));
    }

    #[test]
    fn scheduled_tenants_need_client_credentials() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().into_owned();
        let err = load(&[("LEDGERBOX_DATA_DIR", data_dir.as_str()), ("BACKUP_TENANTS", "T1")]).unwrap_err();
        assert!(err.to_string().contains("REMOTE_CLIENT_ID"));
    }

    #[test]
    fn zero_values_are_rejected() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().into_owned();
        assert!(load(&[("LEDGERBOX_DATA_DIR", data_dir.as_str()), ("BACKUP_RETENTION_DAILY", "0")]).is_err());
        assert!(load(&[("LEDGERBOX_DATA_DIR", data_dir.as_str()), ("BACKUP_UPLOAD_CONCURRENCY", "0")]).is_err());
        assert!(load(&[("LEDGERBOX_DATA_DIR", data_dir.as_str()), ("BACKUP_RETENTION_MODE", "weekly")]).is_err());
    }
}
