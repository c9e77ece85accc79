//! Database-backed persistence for table sync state.
//!
//! State lives in the target PostgreSQL instance inside the
//! `_mysql_pg_sync` schema, one row per replicated table. Keeping state
//! next to the data means a rerun sees exactly what the target saw.

use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::tracker::{SyncStatus, TableSyncState};

const STATE_SCHEMA: &str = "_mysql_pg_sync";

/// Reads and writes [`TableSyncState`] rows in the target database.
pub struct DbTracker {
    pool: Pool,
}

impl DbTracker {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Initialize the state schema and table. Idempotent.
    pub async fn init_schema(&self) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "initializing tracker schema"))?;

        conn.execute(
            &format!("CREATE SCHEMA IF NOT EXISTS {}", STATE_SCHEMA),
            &[],
        )
        .await?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {}.table_sync_state (
                    table_name TEXT PRIMARY KEY,
                    status TEXT NOT NULL CHECK (status IN ('pending', 'running', 'succeeded', 'failed')),
                    run_id TEXT NOT NULL,
                    source_rows BIGINT NOT NULL DEFAULT 0,
                    target_rows BIGINT NOT NULL DEFAULT 0,
                    null_coercions BIGINT NOT NULL DEFAULT 0,
                    retries BIGINT NOT NULL DEFAULT 0,
                    started_at TIMESTAMPTZ NOT NULL,
                    finished_at TIMESTAMPTZ,
                    error TEXT,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
                STATE_SCHEMA
            ),
            &[],
        )
        .await?;

        Ok(())
    }

    /// Upsert one table's state.
    pub async fn save(&self, state: &TableSyncState) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "saving table sync state"))?;

        conn.execute(
            &format!(
                "INSERT INTO {}.table_sync_state
                 (table_name, status, run_id, source_rows, target_rows,
                  null_coercions, retries, started_at, finished_at, error, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
                 ON CONFLICT (table_name) DO UPDATE SET
                    status = EXCLUDED.status,
                    run_id = EXCLUDED.run_id,
                    source_rows = EXCLUDED.source_rows,
                    target_rows = EXCLUDED.target_rows,
                    null_coercions = EXCLUDED.null_coercions,
                    retries = EXCLUDED.retries,
                    started_at = EXCLUDED.started_at,
                    finished_at = EXCLUDED.finished_at,
                    error = EXCLUDED.error,
                    updated_at = NOW()",
                STATE_SCHEMA
            ),
            &[
                &state.table,
                &state.status.as_str(),
                &state.run_id,
                &state.source_rows,
                &state.target_rows,
                &state.null_coercions,
                &state.retries,
                &state.started_at,
                &state.finished_at,
                &state.error,
            ],
        )
        .await?;

        debug!(table = %state.table, status = state.status.as_str(), "saved sync state");
        Ok(())
    }

    /// Load one table's state, if any.
    pub async fn load(&self, table: &str) -> Result<Option<TableSyncState>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "loading table sync state"))?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT table_name, status, run_id, source_rows, target_rows,
                            null_coercions, retries, started_at, finished_at, error
                     FROM {}.table_sync_state
                     WHERE table_name = $1",
                    STATE_SCHEMA
                ),
                &[&table],
            )
            .await?;

        row.map(row_to_state).transpose()
    }

    /// Load state for every tracked table.
    pub async fn load_all(&self) -> Result<Vec<TableSyncState>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "loading sync states"))?;

        let rows = conn
            .query(
                &format!(
                    "SELECT table_name, status, run_id, source_rows, target_rows,
                            null_coercions, retries, started_at, finished_at, error
                     FROM {}.table_sync_state
                     ORDER BY table_name",
                    STATE_SCHEMA
                ),
                &[],
            )
            .await?;

        rows.into_iter().map(row_to_state).collect()
    }
}

fn row_to_state(row: Row) -> Result<TableSyncState> {
    let status_str: String = row.get(1);
    let status = SyncStatus::parse(&status_str)
        .ok_or_else(|| SyncError::Tracker(format!("unknown status '{}'", status_str)))?;
    let started_at: DateTime<Utc> = row.get(7);
    let finished_at: Option<DateTime<Utc>> = row.get(8);

    Ok(TableSyncState {
        table: row.get(0),
        status,
        run_id: row.get(2),
        source_rows: row.get(3),
        target_rows: row.get(4),
        null_coercions: row.get(5),
        retries: row.get(6),
        started_at,
        finished_at,
        error: row.get(9),
    })
}
