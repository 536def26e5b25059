use chrono::{DateTime, Utc};
use serde::Serialize;

use super::orchestrator::BackupResult;

/// Outcome of the most recent backup attempts for one tenant.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupStatus {
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_result: Option<BackupResult>,
    pub last_error: Option<String>,
}

impl BackupStatus {
    pub(crate) fn record_success(&mut self, result: &BackupResult) {
        self.last_run_at = Some(result.started_at);
        self.last_success_at = Some(result.finished_at);
        self.last_result = Some(result.clone());
        self.last_error = result.partial_summary();
    }

    pub(crate) fn record_failure(&mut self, started_at: DateTime<Utc>, error: String) {
        self.last_run_at = Some(started_at);
        self.last_error = Some(error);
    }

    pub fn has_ever_succeeded(&self) -> bool {
        self.last_success_at.is_some()
    }
}
