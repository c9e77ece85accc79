//! Per-table sync state tracking.
//!
//! One record per replicated table, persisted in the target database so a
//! rerun can skip tables that already succeeded. The pure types live here;
//! persistence is in [`db`].

pub mod db;

pub use db::DbTracker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a table's most recent sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Succeeded => "succeeded",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "running" => Some(SyncStatus::Running),
            "succeeded" => Some(SyncStatus::Succeeded),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

/// Sync state for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSyncState {
    /// Table name (source casing).
    pub table: String,

    /// Current status.
    pub status: SyncStatus,

    /// Run that last touched the table.
    pub run_id: String,

    /// Source row count observed at extraction time.
    pub source_rows: i64,

    /// Rows loaded into the target.
    pub target_rows: i64,

    /// Cells coerced to NULL during conversion.
    pub null_coercions: i64,

    /// Chunk operations retried.
    pub retries: i64,

    /// When the current attempt started.
    pub started_at: DateTime<Utc>,

    /// When the attempt finished, success or failure.
    pub finished_at: Option<DateTime<Utc>>,

    /// Error message from the last failed attempt.
    pub error: Option<String>,
}

impl TableSyncState {
    /// A fresh attempt starting now.
    pub fn begin(table: impl Into<String>, run_id: impl Into<String>, source_rows: i64) -> Self {
        Self {
            table: table.into(),
            status: SyncStatus::Running,
            run_id: run_id.into(),
            source_rows,
            target_rows: 0,
            null_coercions: 0,
            retries: 0,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Mark the attempt succeeded.
    pub fn mark_succeeded(&mut self, target_rows: i64, null_coercions: i64, retries: i64) {
        self.status = SyncStatus::Succeeded;
        self.target_rows = target_rows;
        self.null_coercions = null_coercions;
        self.retries = retries;
        self.finished_at = Some(Utc::now());
        self.error = None;
    }

    /// Mark the attempt failed with an error message.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = SyncStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// Whether a rerun may skip this table.
    pub fn is_skippable(&self) -> bool {
        self.status == SyncStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Running,
            SyncStatus::Succeeded,
            SyncStatus::Failed,
        ] {
            assert_eq!(SyncStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SyncStatus::parse("bogus"), None);
    }

    #[test]
    fn test_begin_is_running() {
        let state = TableSyncState::begin("orders", "run-1", 100);
        assert_eq!(state.status, SyncStatus::Running);
        assert_eq!(state.source_rows, 100);
        assert!(state.finished_at.is_none());
        assert!(!state.is_skippable());
    }

    #[test]
    fn test_mark_succeeded() {
        let mut state = TableSyncState::begin("orders", "run-1", 100);
        state.mark_succeeded(100, 3, 1);
        assert_eq!(state.status, SyncStatus::Succeeded);
        assert_eq!(state.target_rows, 100);
        assert_eq!(state.null_coercions, 3);
        assert_eq!(state.retries, 1);
        assert!(state.finished_at.is_some());
        assert!(state.is_skippable());
    }

    #[test]
    fn test_mark_failed() {
        let mut state = TableSyncState::begin("orders", "run-1", 100);
        state.mark_failed("connection reset");
        assert_eq!(state.status, SyncStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("connection reset"));
        assert!(!state.is_skippable());
    }

    #[test]
    fn test_success_clears_prior_error() {
        let mut state = TableSyncState::begin("orders", "run-1", 100);
        state.mark_failed("first try");
        state.mark_succeeded(100, 0, 0);
        assert!(state.error.is_none());
    }
}
