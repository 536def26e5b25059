use std::collections::BTreeSet;

use ledgerbox_object_store::{FileOrder, RemoteError, RemoteFile, RemoteStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::manifest::SetId;
use super::retry::RetryPolicy;
use super::Cadence;

/// Backup sets kept per cadence folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub daily: usize,
    pub weekly: usize,
    pub monthly: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            daily: 7,
            weekly: 4,
            monthly: 12,
        }
    }
}

impl RetentionPolicy {
    pub fn max_sets(&self, cadence: Cadence) -> usize {
        match cadence {
            Cadence::Daily => self.daily,
            Cadence::Weekly => self.weekly,
            Cadence::Monthly => self.monthly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionMode {
    /// Keep the newest N sets, grouped by the set id in each file name.
    #[default]
    BackupSets,
    /// Keep the newest `N * files_per_set` files regardless of grouping.
    FileCount { files_per_set: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneFailure {
    pub file_id: String,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    pub failed: Vec<PruneFailure>,
    /// Set when the folder could not be listed and nothing was pruned.
    pub listing_error: Option<String>,
}

impl PruneReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.listing_error.is_none()
    }
}

fn select_expired<'a>(
    files: &'a [RemoteFile],
    max_sets: usize,
    current: Option<&SetId>,
    mode: RetentionMode,
) -> Vec<&'a RemoteFile> {
    let is_current = |file: &RemoteFile| {
        current.is_some_and(|current| SetId::from_file_name(&file.name).as_ref() == Some(current))
    };

    match mode {
        RetentionMode::FileCount { files_per_set } => files
            .iter()
            .skip(max_sets.saturating_mul(files_per_set))
            .filter(|file| !is_current(file))
            .collect(),
        RetentionMode::BackupSets => {
            // The current set always counts as kept, even when a skewed clock
            // gave older sets later stamps.
            let older: BTreeSet<SetId> = files
                .iter()
                .filter_map(|file| SetId::from_file_name(&file.name))
                .filter(|set| Some(set) != current)
                .collect();
            let budget = match current {
                Some(_) => max_sets.saturating_sub(1),
                None => max_sets,
            };
            let mut kept: BTreeSet<&SetId> = older.iter().rev().take(budget).collect();
            kept.extend(current);
            files
                .iter()
                .filter(|file| {
                    SetId::from_file_name(&file.name).is_some_and(|set| !kept.contains(&set))
                })
                .collect()
        }
    }
}

/// Deletes backups in `folder_id` beyond the newest `max_sets`. Files of
/// `current`, the set just uploaded, are never deleted.
///
/// Individual delete failures are collected in the report; only a failure to
/// list the folder is returned as an error.
pub async fn enforce_retention(
    store: &dyn RemoteStore,
    folder_id: &str,
    max_sets: usize,
    current: Option<&SetId>,
    mode: RetentionMode,
    retry: &RetryPolicy,
) -> Result<PruneReport, RemoteError> {
    let files = retry
        .run("list_files", || store.list_files(folder_id, FileOrder::CreatedTimeDesc))
        .await?;

    let expired = select_expired(&files, max_sets, current, mode);
    let mut report = PruneReport::default();
    if expired.is_empty() {
        debug!(folder_id, files = files.len(), "nothing to prune");
        return Ok(report);
    }

    for file in expired {
        match retry.run("delete_file", || store.delete_file(&file.id)).await {
            Ok(()) => report.deleted.push(file.name.clone()),
            Err(err) => {
                warn!(
                    folder_id,
                    file = %file.name,
                    error = %err,
                    "failed to delete expired backup file"
                );
                report.failed.push(PruneFailure {
                    file_id: file.id.clone(),
                    name: file.name.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        folder_id,
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "pruned expired backups"
    );
    Ok(report)
}
