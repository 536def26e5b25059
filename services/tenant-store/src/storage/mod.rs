pub mod database;
pub mod error;
pub mod paths;
pub mod schema;
pub mod store;

pub use database::TenantHandle;
pub use error::StoreError;
pub use paths::{tenant_dir_name, validate_tenant_id, TenantPaths};
pub use schema::{BUSINESS_TABLES, SCHEMA_VERSION};
pub use store::TenantStore;

pub const DB_DIRNAME: &str = "db";
pub const DATA_DIRNAME: &str = "data";
pub const UPLOADS_DIRNAME: &str = "uploads";
pub const DB_EXTENSION: &str = "db";
