use rusqlite::Connection;
use tracing::info;

use super::StoreError;

/// Tables owned by the business layer and mirrored to JSON.
pub const BUSINESS_TABLES: [&str; 5] = ["customers", "products", "invoices", "expenses", "settings"];

pub const CUSTOMERS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT,
    phone TEXT,
    address TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
"#;

pub const PRODUCTS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    stock INTEGER NOT NULL DEFAULT 0
);
"#;

pub const INVOICES_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS invoices (
    id TEXT PRIMARY KEY,
    customer_id TEXT REFERENCES customers(id),
    number TEXT NOT NULL,
    items TEXT NOT NULL DEFAULT '[]',
    total REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'draft',
    issued_at TEXT NOT NULL
);
"#;

pub const EXPENSES_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS expenses (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    amount REAL NOT NULL,
    description TEXT,
    incurred_at TEXT NOT NULL
);
"#;

pub const SETTINGS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub const BUSINESS_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_invoices_customer ON invoices(customer_id);
CREATE INDEX IF NOT EXISTS idx_expenses_incurred_at ON expenses(incurred_at);
"#;

pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

/// Ordered, append-only. Every statement is `IF NOT EXISTS` so re-running a
/// migration against a partially migrated file is harmless.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "business tables",
        statements: &[
            CUSTOMERS_TABLE_SCHEMA,
            PRODUCTS_TABLE_SCHEMA,
            INVOICES_TABLE_SCHEMA,
            EXPENSES_TABLE_SCHEMA,
            SETTINGS_TABLE_SCHEMA,
        ],
    },
    Migration {
        version: 2,
        description: "lookup indexes",
        statements: &[BUSINESS_INDEXES],
    },
];

pub const SCHEMA_VERSION: u32 = 2;

pub fn schema_version(conn: &Connection) -> Result<u32, StoreError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Apply every migration newer than `PRAGMA user_version`, one transaction
/// each. Returns how many ran.
pub fn apply_migrations(conn: &mut Connection, tenant_id: &str) -> Result<usize, StoreError> {
    let current = schema_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.transaction()?;
        for statement in migration.statements {
            tx.execute_batch(statement)
                .map_err(|source| StoreError::Migration {
                    version: migration.version,
                    source,
                })?;
        }
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;

        info!(
            tenant_id,
            version = migration.version,
            description = migration.description,
            "applied schema migration"
        );
        applied += 1;
    }

    Ok(applied)
}
