use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;

use super::{StoreError, DATA_DIRNAME, DB_DIRNAME, DB_EXTENSION, UPLOADS_DIRNAME};

const MAX_TENANT_ID_BYTES: usize = 256;
const MAX_VERBATIM_DIR_LEN: usize = 64;
const SANITIZED_PREFIX_LEN: usize = 48;
const HASH_SUFFIX_LEN: usize = 16;

pub fn validate_tenant_id(tenant_id: &str) -> Result<(), StoreError> {
    if tenant_id.trim().is_empty() || tenant_id.len() > MAX_TENANT_ID_BYTES {
        return Err(StoreError::InvalidTenantId(tenant_id.to_string()));
    }
    if tenant_id.chars().any(char::is_control) {
        return Err(StoreError::InvalidTenantId(tenant_id.escape_debug().to_string()));
    }
    Ok(())
}

fn is_dir_safe(ch: char) -> bool {
    ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_'
}

fn has_hash_suffix(name: &str) -> bool {
    name.rsplit_once('-').is_some_and(|(_, suffix)| {
        suffix.len() == HASH_SUFFIX_LEN && suffix.chars().all(|ch| ch.is_ascii_hexdigit())
    })
}

/// Deterministic directory name for an external account id.
///
/// Plain lowercase ids (`[a-z0-9_-]`, up to 64 chars) are used as-is. Anything
/// else (`T1`, `auth0|abc`, e-mail addresses, `..`) is sanitized and suffixed
/// with a SHA-256 prefix of the raw id, so ids that differ only in case still
/// get distinct directories on case-insensitive filesystems.
pub fn tenant_dir_name(tenant_id: &str) -> String {
    let verbatim = tenant_id.len() <= MAX_VERBATIM_DIR_LEN
        && tenant_id.chars().all(is_dir_safe)
        && !has_hash_suffix(tenant_id);
    if verbatim {
        return tenant_id.to_string();
    }

    let sanitized: String = tenant_id
        .chars()
        .map(|ch| {
            if is_dir_safe(ch) || ch.is_ascii_uppercase() {
                ch
            } else {
                '_'
            }
        })
        .take(SANITIZED_PREFIX_LEN)
        .collect();
    let digest = hex::encode(Sha256::digest(tenant_id.as_bytes()));
    format!("{}-{}", sanitized, &digest[..HASH_SUFFIX_LEN])
}

/// On-disk layout for one tenant:
///
/// ```text
/// <data_root>/<dir>/db/<dir>.db
/// <data_root>/<dir>/data/<table>/<table>.json
/// <data_root>/<dir>/uploads/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantPaths {
    root: PathBuf,
    dir_name: String,
}

impl TenantPaths {
    pub fn new(data_root: &Path, tenant_id: &str) -> Result<Self, StoreError> {
        validate_tenant_id(tenant_id)?;
        let dir_name = tenant_dir_name(tenant_id);
        Ok(Self {
            root: data_root.join(&dir_name),
            dir_name,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    pub fn db_dir(&self) -> PathBuf {
        self.root.join(DB_DIRNAME)
    }

    pub fn database_file(&self) -> PathBuf {
        self.db_dir()
            .join(format!("{}.{}", self.dir_name, DB_EXTENSION))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIRNAME)
    }

    pub fn mirror_dir(&self, table: &str) -> PathBuf {
        self.data_dir().join(table)
    }

    pub fn mirror_file(&self, table: &str) -> PathBuf {
        self.mirror_dir(table).join(format!("{table}.json"))
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIRNAME)
    }

    /// Create the tenant directories. Safe to race with another process:
    /// a directory that already exists is not an error.
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        for dir in [self.root.clone(), self.db_dir(), self.data_dir(), self.uploads_dir()] {
            ensure_dir(&dir)?;
        }
        restrict_dir_permissions(&self.root);
        Ok(())
    }

    /// Tables with a mirror file on disk, sorted by name.
    pub fn existing_mirrors(&self) -> Result<Vec<(String, PathBuf)>, StoreError> {
        let entries = match fs::read_dir(self.data_dir()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut mirrors = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(table) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let file = self.mirror_file(&table);
            if file.is_file() {
                mirrors.push((table, file));
            }
        }
        mirrors.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(mirrors)
    }
}

pub(crate) fn ensure_dir(path: &Path) -> Result<(), StoreError> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn restrict_dir_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o700)) {
            warn!("cannot restrict permissions on {}: {}", path.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
