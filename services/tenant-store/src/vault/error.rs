use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("credential vault unavailable: {0}")]
    Unavailable(String),
    #[error("secret stored under {service}/{account} is malformed")]
    CorruptSecret { service: String, account: String },
}
