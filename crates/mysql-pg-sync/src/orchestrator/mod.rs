//! Sync orchestrator - main workflow coordinator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::convert::ConversionReport;
use crate::error::Result;
use crate::schema::Table;
use crate::source::MysqlSource;
use crate::synth;
use crate::target::PgTarget;
use crate::tracker::{DbTracker, TableSyncState};
use crate::transfer::{RetryPolicy, TransferEngine};
use crate::typemap::{TableMapping, TypeMapper};
use crate::validate::{self, ValidationOutcome};

/// Options for a sync run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restrict the run to these tables (after include/exclude filtering).
    pub tables: Option<Vec<String>>,

    /// Re-sync tables already marked succeeded, dropping them first.
    pub force: bool,
}

/// Per-table outcome in a run summary.
#[derive(Debug, Clone, Serialize)]
pub struct TableOutcome {
    pub table: String,
    pub status: String,
    pub source_rows: i64,
    pub target_rows: i64,
    pub null_coercions: i64,
    pub retries: i64,
    pub error: Option<String>,
}

/// Result of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "succeeded", "failed", or "nothing_to_do".
    pub status: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    pub tables_total: usize,
    pub tables_succeeded: usize,
    pub tables_failed: usize,
    pub tables_skipped: usize,

    pub rows_transferred: u64,

    pub tables: Vec<TableOutcome>,

    /// Names of tables that failed.
    pub failed_tables: Vec<String>,
}

impl RunSummary {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Sync orchestrator.
pub struct Orchestrator {
    config: Config,
    source: MysqlSource,
    target: PgTarget,
    tracker: DbTracker,
}

impl Orchestrator {
    /// Connect both databases and prepare the tracker schema.
    ///
    /// A connection failure here is fatal; the run never starts with a
    /// half-reachable pair of databases.
    pub async fn new(config: Config) -> Result<Self> {
        let source =
            MysqlSource::connect(&config.source, config.sync.max_mysql_connections).await?;
        let target = PgTarget::connect(&config.target, config.sync.max_pg_connections).await?;

        let tracker = DbTracker::new(target.pool());
        tracker.init_schema().await?;

        Ok(Self {
            config,
            source,
            target,
            tracker,
        })
    }

    /// Run the sync: extract, map, create, transfer, validate, record.
    ///
    /// Tables are processed sequentially. A table failure is recorded and
    /// the run continues with the next table; the summary carries the
    /// aggregate outcome.
    pub async fn run(&self, options: RunOptions) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run_id = %run_id, "starting sync run");

        let all_tables = self.source.list_tables().await?;
        let selected = select_tables(
            &all_tables,
            &self.config.sync.include_tables,
            &self.config.sync.exclude_tables,
            options.tables.as_deref(),
        );
        info!(
            discovered = all_tables.len(),
            selected = selected.len(),
            "resolved table list"
        );
        if let Some(requested) = options.tables.as_deref() {
            for name in unmatched_requests(requested, &selected) {
                warn!(table = %name, "requested table not found in source or filtered out");
            }
        }

        let target_schema = self.config.target.schema.clone();
        self.target.create_schema(&target_schema).await?;

        let mapper = TypeMapper::new(self.config.sync.column_type_overrides.clone());
        let retry = RetryPolicy::new(
            self.config.sync.max_retries,
            Duration::from_millis(self.config.sync.retry_backoff_ms),
        );
        let engine = TransferEngine::new(
            &self.source,
            &self.target,
            self.config.sync.chunk_size,
            self.config.sync.sub_chunk_size,
            retry,
            self.config.sync.empty_strings_as_null,
        );

        let mut outcomes = Vec::with_capacity(selected.len());
        let mut skipped = 0usize;

        for table_name in &selected {
            if !options.force {
                if let Some(prior) = self.tracker.load(table_name).await? {
                    if prior.is_skippable() {
                        debug!(table = %table_name, "already succeeded, skipping");
                        skipped += 1;
                        continue;
                    }
                }
            }

            let outcome = self
                .sync_table(table_name, &mapper, &engine, &target_schema, &run_id, options.force)
                .await;
            match outcome {
                Ok(state) => outcomes.push(state),
                Err(e) => {
                    // Table-level failures are recorded and the run moves on.
                    error!(table = %table_name, error = %e, "table sync failed");
                    let mut state = TableSyncState::begin(table_name.clone(), run_id.clone(), 0);
                    state.mark_failed(e.to_string());
                    if let Err(save_err) = self.tracker.save(&state).await {
                        warn!(table = %table_name, error = %save_err, "failed to record failure");
                    }
                    outcomes.push(state);
                }
            }
        }

        let summary = build_summary(run_id, started_at, Utc::now(), outcomes, skipped);
        info!(
            status = %summary.status,
            tables = summary.tables_total,
            succeeded = summary.tables_succeeded,
            failed = summary.tables_failed,
            skipped = summary.tables_skipped,
            rows = summary.rows_transferred,
            duration_s = summary.duration_seconds,
            "sync run finished"
        );
        Ok(summary)
    }

    /// Sync one table end to end and persist its final tracker state.
    async fn sync_table(
        &self,
        table_name: &str,
        mapper: &TypeMapper,
        engine: &TransferEngine<'_>,
        target_schema: &str,
        run_id: &str,
        force: bool,
    ) -> Result<TableSyncState> {
        info!(table = %table_name, "syncing table");

        let table = self.source.load_table(table_name).await?;
        let mapping = mapper.map_table(&table);
        for col in &mapping.columns {
            if let Some(ref msg) = col.warning {
                warn!(table = %table_name, column = %col.name, "{}", msg);
            }
        }

        let mut state =
            TableSyncState::begin(table_name.to_string(), run_id.to_string(), table.row_count);
        self.tracker.save(&state).await?;

        for ddl in prepare_statements(&table, &mapping, target_schema, force) {
            debug!(table = %table_name, ddl = %ddl, "preparing target table");
            self.target.execute_ddl(&ddl).await?;
        }

        let result = engine.transfer_table(&table, &mapping, target_schema).await;
        match result {
            Ok(stats) => {
                let source_rows = self.source.get_row_count(table_name).await?;
                let target_rows = self.target.get_row_count(target_schema, table_name).await?;
                let validation = validate::validate_counts(
                    table_name,
                    source_rows,
                    target_rows,
                    self.config.sync.count_tolerance,
                    self.config.sync.small_table_threshold,
                );
                log_conversion(table_name, &stats.conversion);

                record_outcome(
                    &mut state,
                    target_rows,
                    stats.conversion.total_null_coercions() as i64,
                    stats.retries as i64,
                    &validation,
                );
                if !validation.passed {
                    warn!(table = %table_name, detail = %validation.detail, "validation failed");
                }
            }
            Err(e) => {
                state.mark_failed(e.to_string());
            }
        }

        self.tracker.save(&state).await?;
        Ok(state)
    }

    /// Compare row counts for all selected tables without moving data.
    pub async fn validate(&self) -> Result<Vec<ValidationOutcome>> {
        let all_tables = self.source.list_tables().await?;
        let selected = select_tables(
            &all_tables,
            &self.config.sync.include_tables,
            &self.config.sync.exclude_tables,
            None,
        );
        let target_schema = &self.config.target.schema;

        let mut results = Vec::with_capacity(selected.len());
        for table_name in &selected {
            let source_rows = self.source.get_row_count(table_name).await?;
            let target_rows = if self.target.table_exists(target_schema, table_name).await? {
                self.target.get_row_count(target_schema, table_name).await?
            } else {
                0
            };
            let outcome = validate::validate_counts(
                table_name,
                source_rows,
                target_rows,
                self.config.sync.count_tolerance,
                self.config.sync.small_table_threshold,
            );
            if outcome.passed {
                info!(table = %table_name, rows = source_rows, "counts match");
            } else {
                warn!(
                    table = %table_name,
                    source = source_rows,
                    target = target_rows,
                    "count mismatch"
                );
            }
            results.push(outcome);
        }
        Ok(results)
    }

    /// Probe both databases with a trivial query.
    pub async fn health_check(&self) -> Result<()> {
        self.source.test_connection().await?;
        self.target.test_connection().await?;
        info!("source and target both reachable");
        Ok(())
    }

    /// Load all tracker rows, most useful for inspecting a partial run.
    pub async fn sync_states(&self) -> Result<Vec<TableSyncState>> {
        self.tracker.load_all().await
    }

    pub async fn close(self) {
        self.source.close().await;
    }
}

fn log_conversion(table: &str, report: &ConversionReport) {
    let coerced = report.total_null_coercions();
    if coerced > 0 {
        for (column, count) in &report.null_coercions {
            warn!(table = %table, column = %column, count, "values coerced to NULL");
        }
    }
    if report.emptied_strings > 0 {
        debug!(table = %table, count = report.emptied_strings, "empty strings set to NULL");
    }
}

/// Apply include/exclude config plus an optional explicit request list.
fn select_tables(
    discovered: &[String],
    include: &[String],
    exclude: &[String],
    requested: Option<&[String]>,
) -> Vec<String> {
    discovered
        .iter()
        .filter(|t| include.is_empty() || include.iter().any(|i| i == *t))
        .filter(|t| !exclude.iter().any(|e| e == *t))
        .filter(|t| match requested {
            Some(req) => req.iter().any(|r| r == *t),
            None => true,
        })
        .cloned()
        .collect()
}

/// Explicitly requested tables that survived neither discovery nor the
/// include/exclude filters.
fn unmatched_requests(requested: &[String], selected: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|r| !selected.contains(r))
        .cloned()
        .collect()
}

/// DDL run before loading a table. A forced sync drops the old table first;
/// otherwise an existing table is truncated, since a prior failed attempt
/// may have left partial rows behind and the transfer restarts from row
/// zero.
fn prepare_statements(
    table: &Table,
    mapping: &TableMapping,
    target_schema: &str,
    force: bool,
) -> Vec<String> {
    let mut stmts = Vec::with_capacity(3);
    if force {
        stmts.push(synth::build_drop_table(target_schema, &table.name));
    }
    stmts.push(synth::build_create_table(table, mapping, target_schema));
    if !force {
        stmts.push(synth::build_truncate_table(target_schema, &table.name));
    }
    stmts
}

/// Fold transfer stats and the count check into the tracker state. Stats
/// are recorded either way so a failed table still shows what the attempt
/// did.
fn record_outcome(
    state: &mut TableSyncState,
    target_rows: i64,
    null_coercions: i64,
    retries: i64,
    validation: &ValidationOutcome,
) {
    if validation.passed {
        state.mark_succeeded(target_rows, null_coercions, retries);
    } else {
        state.target_rows = target_rows;
        state.null_coercions = null_coercions;
        state.retries = retries;
        state.mark_failed(validation.detail.clone());
    }
}

fn build_summary(
    run_id: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    outcomes: Vec<TableSyncState>,
    skipped: usize,
) -> RunSummary {
    let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut rows_transferred = 0u64;
    let mut failed_tables = Vec::new();
    let mut tables = Vec::with_capacity(outcomes.len());

    for state in &outcomes {
        match state.status {
            crate::tracker::SyncStatus::Succeeded => {
                succeeded += 1;
                rows_transferred += state.target_rows.max(0) as u64;
            }
            crate::tracker::SyncStatus::Failed => {
                failed += 1;
                failed_tables.push(state.table.clone());
            }
            _ => {}
        }
        tables.push(TableOutcome {
            table: state.table.clone(),
            status: state.status.as_str().to_string(),
            source_rows: state.source_rows,
            target_rows: state.target_rows,
            null_coercions: state.null_coercions,
            retries: state.retries,
            error: state.error.clone(),
        });
    }

    let status = if failed > 0 {
        "failed"
    } else if outcomes.is_empty() && skipped == 0 {
        "nothing_to_do"
    } else {
        "succeeded"
    };

    RunSummary {
        run_id,
        status: status.to_string(),
        started_at,
        completed_at,
        duration_seconds: duration,
        tables_total: outcomes.len() + skipped,
        tables_succeeded: succeeded,
        tables_failed: failed,
        tables_skipped: skipped,
        rows_transferred,
        tables,
        failed_tables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::SyncStatus;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_tables_no_filters() {
        let discovered = strings(&["orders", "users"]);
        let selected = select_tables(&discovered, &[], &[], None);
        assert_eq!(selected, strings(&["orders", "users"]));
    }

    #[test]
    fn test_select_tables_include_wins() {
        let discovered = strings(&["orders", "users", "audit_log"]);
        let include = strings(&["orders"]);
        let selected = select_tables(&discovered, &include, &[], None);
        assert_eq!(selected, strings(&["orders"]));
    }

    #[test]
    fn test_select_tables_exclude() {
        let discovered = strings(&["orders", "users", "audit_log"]);
        let exclude = strings(&["audit_log"]);
        let selected = select_tables(&discovered, &[], &exclude, None);
        assert_eq!(selected, strings(&["orders", "users"]));
    }

    #[test]
    fn test_select_tables_requested_intersects() {
        let discovered = strings(&["orders", "users", "audit_log"]);
        let exclude = strings(&["audit_log"]);
        let requested = strings(&["users", "audit_log", "missing"]);
        let selected = select_tables(&discovered, &[], &exclude, Some(&requested));
        assert_eq!(selected, strings(&["users"]));
    }

    fn state(table: &str, status: SyncStatus, target_rows: i64) -> TableSyncState {
        let mut s = TableSyncState::begin(table.to_string(), "run".to_string(), target_rows);
        match status {
            SyncStatus::Succeeded => s.mark_succeeded(target_rows, 0, 0),
            SyncStatus::Failed => s.mark_failed("boom".to_string()),
            _ => {}
        }
        s
    }

    #[test]
    fn test_summary_all_succeeded() {
        let outcomes = vec![
            state("orders", SyncStatus::Succeeded, 100),
            state("users", SyncStatus::Succeeded, 50),
        ];
        let now = Utc::now();
        let summary = build_summary("run".to_string(), now, now, outcomes, 1);
        assert_eq!(summary.status, "succeeded");
        assert_eq!(summary.tables_total, 3);
        assert_eq!(summary.tables_succeeded, 2);
        assert_eq!(summary.tables_skipped, 1);
        assert_eq!(summary.rows_transferred, 150);
        assert!(summary.failed_tables.is_empty());
    }

    #[test]
    fn test_summary_with_failure() {
        let outcomes = vec![
            state("orders", SyncStatus::Succeeded, 100),
            state("users", SyncStatus::Failed, 0),
        ];
        let now = Utc::now();
        let summary = build_summary("run".to_string(), now, now, outcomes, 0);
        assert_eq!(summary.status, "failed");
        assert_eq!(summary.tables_failed, 1);
        assert_eq!(summary.failed_tables, vec!["users".to_string()]);
    }

    #[test]
    fn test_summary_nothing_to_do() {
        let now = Utc::now();
        let summary = build_summary("run".to_string(), now, now, vec![], 0);
        assert_eq!(summary.status, "nothing_to_do");
    }

    #[test]
    fn test_unmatched_requests_reported() {
        let requested = strings(&["users", "ghost"]);
        let selected = strings(&["users"]);
        assert_eq!(unmatched_requests(&requested, &selected), strings(&["ghost"]));
        assert!(unmatched_requests(&selected, &selected).is_empty());
    }

    fn orders_table() -> (Table, TableMapping) {
        let table = Table {
            schema: "app".to_string(),
            name: "Orders".to_string(),
            columns: vec![crate::schema::Column {
                name: "id".to_string(),
                data_type: "int".to_string(),
                column_type: "int".to_string(),
                max_length: -1,
                precision: 10,
                scale: 0,
                is_nullable: false,
                ordinal_pos: 1,
            }],
            primary_key: vec!["id".to_string()],
            row_count: 0,
        };
        let mapping = TypeMapper::default().map_table(&table);
        (table, mapping)
    }

    #[test]
    fn test_rerun_without_force_truncates_stale_rows() {
        let (table, mapping) = orders_table();
        let stmts = prepare_statements(&table, &mapping, "raw", false);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE TABLE IF NOT EXISTS"));
        assert_eq!(stmts[1], "TRUNCATE TABLE \"raw\".\"orders\"");
    }

    #[test]
    fn test_forced_sync_drops_table_first() {
        let (table, mapping) = orders_table();
        let stmts = prepare_statements(&table, &mapping, "raw", true);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "DROP TABLE IF EXISTS \"raw\".\"orders\"");
        assert!(stmts[1].starts_with("CREATE TABLE IF NOT EXISTS"));
    }

    #[test]
    fn test_failed_validation_keeps_transfer_stats() {
        let mut state = TableSyncState::begin("orders".to_string(), "run".to_string(), 100);
        let validation = ValidationOutcome {
            table: "orders".to_string(),
            source_rows: 100,
            target_rows: 90,
            passed: false,
            detail: "row count mismatch".to_string(),
        };
        record_outcome(&mut state, 90, 4, 2, &validation);
        assert_eq!(state.status, SyncStatus::Failed);
        assert_eq!(state.target_rows, 90);
        assert_eq!(state.null_coercions, 4);
        assert_eq!(state.retries, 2);
        assert_eq!(state.error.as_deref(), Some("row count mismatch"));
    }

    #[test]
    fn test_passed_validation_marks_succeeded() {
        let mut state = TableSyncState::begin("orders".to_string(), "run".to_string(), 100);
        let validation = ValidationOutcome {
            table: "orders".to_string(),
            source_rows: 100,
            target_rows: 100,
            passed: true,
            detail: String::new(),
        };
        record_outcome(&mut state, 100, 1, 0, &validation);
        assert_eq!(state.status, SyncStatus::Succeeded);
        assert_eq!(state.null_coercions, 1);
    }

    #[test]
    fn test_summary_serializes() {
        let now = Utc::now();
        let summary = build_summary("run".to_string(), now, now, vec![], 2);
        let json = summary.to_json().unwrap();
        assert!(json.contains("\"run_id\""));
        assert!(json.contains("\"tables_skipped\": 2"));
    }
}
