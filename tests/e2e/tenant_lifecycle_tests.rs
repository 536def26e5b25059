use anyhow::Result;
use ledgerbox::{insert_product, row_count, LedgerFixture, MirrorSync};
use ledgerbox_tenant_store::storage::{StoreError, BUSINESS_TABLES};
use ledgerbox_tenant_store::vault::{CredentialVault, DATABASE_KEY_SERVICE};
use serde_json::json;

#[test]
fn test_first_open_provisions_tenant() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    let handle = fixture.store.open("T1")?;

    assert!(handle.was_created());
    let paths = handle.paths();
    assert!(paths.database_file().is_file());
    assert!(paths.data_dir().is_dir());
    assert!(paths.uploads_dir().is_dir());
    for table in BUSINESS_TABLES {
        assert!(handle.table_exists(table)?, "missing {table}");
    }

    let key = fixture.vault.get(DATABASE_KEY_SERVICE, "T1")?;
    assert_eq!(key.map(|hex| hex.len()), Some(64));
    Ok(())
}

#[test]
fn test_restart_reuses_key_and_data() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    {
        let handle = fixture.store.open("T1")?;
        insert_product(&handle, "p1", "Pen", 10)?;
        fixture.store.close("T1");
    }
    let key_before = fixture.vault.get(DATABASE_KEY_SERVICE, "T1")?;

    let restarted = fixture.reopen_store()?;
    let handle = restarted.open("T1")?;
    assert!(!handle.was_created());
    assert_eq!(row_count(&handle, "products")?, 1);
    assert_eq!(fixture.vault.get(DATABASE_KEY_SERVICE, "T1")?, key_before);
    Ok(())
}

#[test]
fn test_database_file_is_not_plaintext() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    let handle = fixture.store.open("T1")?;
    insert_product(&handle, "p1", "UniqueMarkerProductName", 10)?;
    let db_file = handle.paths().database_file();
    fixture.store.close("T1");
    drop(handle);

    let raw = std::fs::read(db_file)?;
    assert!(!raw.starts_with(b"SQLite format 3"));
    let needle = b"UniqueMarkerProductName";
    assert!(!raw.windows(needle.len()).any(|window| window == needle));
    Ok(())
}

#[test]
fn test_swapped_key_is_rejected() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    fixture.store.open("T1")?;
    fixture.store.close("T1");

    let other_key = "11".repeat(32);
    fixture.vault.set(DATABASE_KEY_SERVICE, "T1", &other_key)?;

    let restarted = fixture.reopen_store()?;
    let err = restarted.open("T1").unwrap_err();
    assert!(matches!(err, StoreError::OpenFailed { .. }), "got {err:?}");
    Ok(())
}

#[test]
fn test_vault_outage_blocks_open() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    fixture.vault.set_unavailable(true);
    let err = fixture.store.open("T1").unwrap_err();
    assert!(matches!(err, StoreError::Vault(_)));
    Ok(())
}

#[test]
fn test_mirror_follows_every_write() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    let handle = fixture.store.open("T1")?;

    insert_product(&handle, "p1", "Pen", 10)?;
    assert_eq!(
        MirrorSync::read_mirror(&handle, "products")?,
        vec![json!({ "id": "p1", "name": "Pen", "stock": 10 })]
    );

    insert_product(&handle, "p2", "Ink", 4)?;
    handle.with_connection(|conn| {
        conn.execute("UPDATE products SET stock = stock - 1 WHERE id = 'p1'", [])?;
        Ok(())
    })?;
    MirrorSync::sync(&handle, "products", None)?;

    let rows = MirrorSync::read_mirror(&handle, "products")?;
    assert_eq!(
        rows,
        vec![
            json!({ "id": "p1", "name": "Pen", "stock": 9 }),
            json!({ "id": "p2", "name": "Ink", "stock": 4 }),
        ]
    );
    Ok(())
}

#[test]
fn test_failed_mirror_keeps_committed_write() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    let handle = fixture.store.open("T1")?;
    insert_product(&handle, "p1", "Pen", 10)?;

    // a directory where the mirror file should be makes the rename fail
    let mirror = handle.paths().mirror_file("products");
    std::fs::remove_file(&mirror)?;
    std::fs::create_dir(&mirror)?;

    handle.with_connection(|conn| {
        conn.execute("INSERT INTO products (id, name, stock) VALUES ('p2', 'Ink', 4)", [])?;
        Ok(())
    })?;
    assert!(MirrorSync::sync(&handle, "products", None).is_err());
    assert_eq!(row_count(&handle, "products")?, 2);

    std::fs::remove_dir(&mirror)?;
    MirrorSync::sync(&handle, "products", None)?;
    assert_eq!(MirrorSync::read_mirror(&handle, "products")?.len(), 2);
    Ok(())
}
