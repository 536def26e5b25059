use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::{CredentialVault, VaultError, DATABASE_KEY_SERVICE};

pub const KEY_LEN: usize = 32;

/// 256-bit database key. Zeroed on drop, redacted in `Debug`.
#[derive(Clone)]
pub struct TenantKey(Zeroizing<[u8; KEY_LEN]>);

impl TenantKey {
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut bytes[..]);
        Self(bytes)
    }

    pub fn from_hex(encoded: &str) -> Option<Self> {
        let decoded = Zeroizing::new(hex::decode(encoded.trim()).ok()?);
        if decoded.len() != KEY_LEN {
            return None;
        }
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        bytes.copy_from_slice(&decoded);
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.0[..]))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Raw-key literal understood by `PRAGMA key`.
    pub(crate) fn sqlcipher_literal(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("x'{}'", self.to_hex().as_str()))
    }
}

impl fmt::Debug for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TenantKey(**redacted**)")
    }
}

/// Resolves or mints the per-tenant database key.
pub struct TenantKeyVault {
    vault: Arc<dyn CredentialVault>,
    service: String,
    // serializes get-or-create so two first opens cannot mint two keys
    create_lock: Mutex<()>,
}

impl TenantKeyVault {
    pub fn new(vault: Arc<dyn CredentialVault>) -> Self {
        Self::with_service(vault, DATABASE_KEY_SERVICE)
    }

    pub fn with_service(vault: Arc<dyn CredentialVault>, service: impl Into<String>) -> Self {
        Self {
            vault,
            service: service.into(),
            create_lock: Mutex::new(()),
        }
    }

    pub fn get_or_create_key(&self, tenant_id: &str) -> Result<TenantKey, VaultError> {
        let _guard = self.create_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(stored) = self.vault.get(&self.service, tenant_id)? {
            let stored = Zeroizing::new(stored);
            debug!(tenant_id, "loaded tenant database key");
            return TenantKey::from_hex(&stored).ok_or_else(|| self.corrupt(tenant_id));
        }

        let key = TenantKey::generate();
        self.vault.set(&self.service, tenant_id, &key.to_hex())?;

        // A vault that accepts writes but does not persist them would strand
        // the database on the next open.
        let persisted = self
            .vault
            .get(&self.service, tenant_id)?
            .map(Zeroizing::new)
            .and_then(|stored| TenantKey::from_hex(&stored));
        match persisted {
            Some(read_back) if read_back.as_bytes() == key.as_bytes() => {}
            _ => {
                return Err(VaultError::Unavailable(
                    "secret store did not persist the new key".into(),
                ))
            }
        }

        info!(tenant_id, "generated tenant database key");
        Ok(key)
    }

    pub fn has_key(&self, tenant_id: &str) -> Result<bool, VaultError> {
        Ok(self.vault.get(&self.service, tenant_id)?.is_some())
    }

    fn corrupt(&self, tenant_id: &str) -> VaultError {
        VaultError::CorruptSecret {
            service: self.service.clone(),
            account: tenant_id.to_string(),
        }
    }
}
