use anyhow::Result;
use ledgerbox::{
    fast_backup_config, insert_customer, insert_product, random_tenant_id, row_count,
    LedgerFixture, MirrorSync,
};
use ledgerbox_tenant_store::backup::SetId;

#[test]
fn test_tenants_get_separate_directories_and_keys() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    let tenant_a = random_tenant_id("auth0|tenant-a");
    let tenant_b = random_tenant_id("auth0|tenant-b");

    let a = fixture.store.open(&tenant_a)?;
    let b = fixture.store.open(&tenant_b)?;
    assert_ne!(a.paths().root(), b.paths().root());
    assert!(a.paths().root().starts_with(fixture.data_root()));
    assert!(!a.paths().dir_name().contains('|'));

    insert_product(&a, "p1", "Pen", 10)?;
    insert_customer(&b, "c1", "Acme")?;

    assert_eq!(row_count(&a, "products")?, 1);
    assert_eq!(row_count(&b, "products")?, 0);
    assert_eq!(row_count(&a, "customers")?, 0);
    assert!(MirrorSync::read_mirror(&b, "products").is_err());
    Ok(())
}

#[tokio::test]
async fn test_backups_only_ship_own_tenant_mirrors() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    let a = fixture.store.open("tenant-a")?;
    let b = fixture.store.open("tenant-b")?;
    insert_product(&a, "p1", "Pen", 10)?;
    insert_customer(&b, "c1", "Acme")?;
    fixture.grant_backup_access("tenant-a")?;

    let orchestrator = fixture.orchestrator(fast_backup_config());
    let result = orchestrator.run_backup("tenant-a").await?;
    let tables: Vec<_> = result.uploaded.iter().map(|upload| upload.table.as_str()).collect();
    assert_eq!(tables, vec!["products"]);
    assert!(SetId::from_file_name(&result.uploaded[0].file_name).is_some());

    let err = orchestrator.run_backup("tenant-b").await.unwrap_err();
    assert!(err.is_auth());
    Ok(())
}
