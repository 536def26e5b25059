use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ledgerbox::{fast_backup_config, insert_customer, insert_product, LedgerFixture, MirrorSync};
use ledgerbox_object_store::{FolderQuery, RemoteStore};
use ledgerbox_tenant_store::backup::{BackupScheduler, Cadence, RetentionMode, RetentionPolicy};

async fn cadence_folder(fixture: &LedgerFixture, cadence: Cadence) -> Result<String> {
    let root = fixture.remote.folders_named("Ledgerbox Backups");
    anyhow::ensure!(root.len() == 1, "expected one app folder, found {}", root.len());
    let folders = fixture
        .remote
        .list_folders(&FolderQuery::new(cadence.folder_name(), Some(&root[0].id)))
        .await?;
    folders
        .into_iter()
        .next()
        .map(|folder| folder.id)
        .ok_or_else(|| anyhow::anyhow!("{cadence} folder missing"))
}

#[tokio::test]
async fn test_full_backup_of_seeded_tenant() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    let handle = fixture.store.open("T1")?;
    insert_customer(&handle, "c1", "Acme")?;
    insert_product(&handle, "p1", "Pen", 10)?;
    for table in ["expenses", "settings"] {
        MirrorSync::sync(&handle, table, None)?;
    }
    fixture.grant_backup_access("T1")?;

    let result = fixture.orchestrator(fast_backup_config()).run_backup("T1").await?;

    assert_eq!(result.uploaded.len(), 4);
    let daily = cadence_folder(&fixture, Cadence::Daily).await?;
    let names: Vec<String> = fixture
        .remote
        .files_in(&daily)
        .into_iter()
        .map(|file| file.name)
        .collect();
    assert_eq!(names.len(), 5);
    assert!(names.contains(&format!("manifest-{}.json", result.backup_id)));
    assert!(names.contains(&format!("products-{}.json", result.backup_id)));
    Ok(())
}

#[tokio::test]
async fn test_file_count_retention_mode() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    let handle = fixture.store.open("T1")?;
    insert_product(&handle, "p1", "Pen", 10)?;
    fixture.grant_backup_access("T1")?;

    let mut config = fast_backup_config();
    config.retention = RetentionPolicy {
        daily: 2,
        weekly: 4,
        monthly: 12,
    };
    config.retention_mode = RetentionMode::FileCount { files_per_set: 2 };
    let orchestrator = fixture.orchestrator(config);

    for _ in 0..4 {
        orchestrator.run_backup("T1").await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let daily = cadence_folder(&fixture, Cadence::Daily).await?;
    assert_eq!(fixture.remote.files_in(&daily).len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_scheduler_pass_records_status() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    let handle = fixture.store.open("T1")?;
    insert_product(&handle, "p1", "Pen", 10)?;
    fixture.grant_backup_access("T1")?;

    let orchestrator = Arc::new(fixture.orchestrator(fast_backup_config()));
    let scheduler = BackupScheduler::new(
        Arc::clone(&orchestrator),
        vec!["T1".to_string(), "T-missing".to_string()],
        Duration::from_secs(3600),
        false,
    );

    let summary = scheduler.run_once().await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);

    let ok = orchestrator.status("T1");
    assert!(ok.has_ever_succeeded());
    assert_eq!(ok.last_result.map(|result| result.uploaded.len()), Some(1));

    let missing = orchestrator.status("T-missing");
    assert!(missing.last_error.is_some());
    assert!(!missing.has_ever_succeeded());
    Ok(())
}

#[tokio::test]
async fn test_background_scheduler_runs_first_pass_immediately() -> Result<()> {
    let fixture = LedgerFixture::new()?;
    let handle = fixture.store.open("T1")?;
    insert_product(&handle, "p1", "Pen", 10)?;
    fixture.grant_backup_access("T1")?;

    let orchestrator = Arc::new(fixture.orchestrator(fast_backup_config()));
    let task = BackupScheduler::new(
        Arc::clone(&orchestrator),
        vec!["T1".to_string()],
        Duration::from_secs(3600),
        true,
    )
    .start();

    let mut finished = false;
    for _ in 0..200 {
        if orchestrator.status("T1").last_run_at.is_some() {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    task.abort();

    assert!(finished, "scheduler never ran");
    assert!(orchestrator.status("T1").has_ever_succeeded());
    Ok(())
}
