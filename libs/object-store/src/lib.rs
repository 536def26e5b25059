//! Remote object-store capability for Ledgerbox backups.
//!
//! The backup orchestrator only ever talks to a [`RemoteStore`]: a small set of
//! folder/file operations shaped after the Drive v3 files API. Two
//! implementations ship with the crate:
//!
//! - [`DriveClient`] / [`DriveConnector`]: REST over `reqwest`, authorized by
//!   exchanging a stored OAuth refresh token for an access token.
//! - [`MemoryObjectStore`] / [`MemoryConnector`]: an in-memory store with fault
//!   injection, used by tests and local dry runs.

pub mod drive;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use drive::{DriveClient, DriveConfig, DriveConnector};
pub use error::RemoteError;
pub use memory::{MemoryConnector, MemoryObjectStore};
pub use store::{RemoteConnector, RemoteStore};
pub use types::{FileOrder, FolderQuery, RemoteFile, RemoteFolder};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
pub const ROOT_PARENT_ID: &str = "root";
