//! Chunked table transfer.
//!
//! A table moves in chunks of `chunk_size` rows read in stable order, each
//! converted in memory and loaded as COPY sub-chunks of `sub_chunk_size`
//! rows. Chunk operations retry with doubling backoff; loaded sub-chunks
//! are never rolled back, so a failed run leaves a prefix of the table in
//! place and the tracker records the failure.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::convert::{ChunkConverter, ConversionReport};
use crate::error::{Result, SyncError};
use crate::schema::Table;
use crate::source::MysqlSource;
use crate::target::PgTarget;
use crate::typemap::TableMapping;
use crate::value::SqlValue;

/// Retry behavior for chunk-level operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after the first failure.
    pub max_retries: u32,

    /// Backoff before the first retry; doubles on each subsequent one.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    /// Whether another attempt is allowed after `failures` failures.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures <= self.max_retries
    }

    /// Backoff before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        // Shift capped so pathological retry counts cannot overflow.
        self.base_backoff.saturating_mul(1u32 << retry.min(16))
    }
}

/// Phase a table transfer is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    NotStarted,
    Extracting,
    Converting,
    Loading,
    Retrying,
    Done,
}

impl TransferPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferPhase::NotStarted => "not_started",
            TransferPhase::Extracting => "extracting",
            TransferPhase::Converting => "converting",
            TransferPhase::Loading => "loading",
            TransferPhase::Retrying => "retrying",
            TransferPhase::Done => "done",
        }
    }

    /// Whether `next` is a legal successor phase. Retrying is reachable
    /// from the middle phases and returns to the phase it interrupted.
    pub fn can_transition(&self, next: TransferPhase) -> bool {
        use TransferPhase::*;
        matches!(
            (self, next),
            (NotStarted, Extracting)
                | (Extracting, Converting)
                | (Extracting, Retrying)
                | (Extracting, Done)
                | (Converting, Loading)
                | (Converting, Retrying)
                | (Loading, Extracting)
                | (Loading, Retrying)
                | (Loading, Done)
                | (Retrying, Extracting)
                | (Retrying, Converting)
                | (Retrying, Loading)
        )
    }
}

/// Totals for one table transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    pub rows_read: u64,
    pub rows_written: u64,
    pub chunks: u64,
    pub sub_chunks: u64,
    pub retries: u64,
    pub conversion: ConversionReport,
}

/// Moves one table's rows from source to target.
pub struct TransferEngine<'a> {
    source: &'a MysqlSource,
    target: &'a PgTarget,
    chunk_size: usize,
    sub_chunk_size: usize,
    retry: RetryPolicy,
    empty_strings_as_null: bool,
}

impl<'a> TransferEngine<'a> {
    pub fn new(
        source: &'a MysqlSource,
        target: &'a PgTarget,
        chunk_size: usize,
        sub_chunk_size: usize,
        retry: RetryPolicy,
        empty_strings_as_null: bool,
    ) -> Self {
        Self {
            source,
            target,
            chunk_size,
            sub_chunk_size,
            retry,
            empty_strings_as_null,
        }
    }

    /// Transfer all rows of a table into `target_schema`.
    ///
    /// Chunks are strictly sequential: chunk N is fully loaded before
    /// chunk N+1 is read.
    pub async fn transfer_table(
        &self,
        table: &Table,
        mapping: &TableMapping,
        target_schema: &str,
    ) -> Result<TransferStats> {
        let converter = ChunkConverter::new(mapping, self.empty_strings_as_null);
        let cols: Vec<String> = mapping.columns.iter().map(|c| c.name.clone()).collect();

        let mut stats = TransferStats::default();
        let mut phase = TransferPhase::NotStarted;
        let mut offset = 0u64;

        loop {
            self.enter(&mut phase, TransferPhase::Extracting, table);
            let mut rows = self
                .read_chunk_with_retry(table, offset, &mut phase, &mut stats)
                .await?;
            if rows.is_empty() {
                break;
            }
            let chunk_rows = rows.len();
            stats.rows_read += chunk_rows as u64;
            stats.chunks += 1;

            self.enter(&mut phase, TransferPhase::Converting, table);
            converter.convert_chunk(&mut rows, &mut stats.conversion)?;

            self.enter(&mut phase, TransferPhase::Loading, table);
            for sub in rows.chunks(self.sub_chunk_size) {
                let written = self
                    .load_sub_chunk_with_retry(table, target_schema, &cols, sub, &mut phase, &mut stats)
                    .await?;
                stats.rows_written += written;
                stats.sub_chunks += 1;
            }
            debug!(
                table = %table.name,
                chunk = stats.chunks,
                rows = chunk_rows,
                "chunk loaded"
            );

            offset += chunk_rows as u64;
            if chunk_rows < self.chunk_size {
                break;
            }
        }

        self.enter(&mut phase, TransferPhase::Done, table);
        info!(
            table = %table.name,
            rows_read = stats.rows_read,
            rows_written = stats.rows_written,
            null_coercions = stats.conversion.total_null_coercions(),
            retries = stats.retries,
            "table transfer complete"
        );
        Ok(stats)
    }

    fn enter(&self, phase: &mut TransferPhase, next: TransferPhase, table: &Table) {
        debug_assert!(phase.can_transition(next) || *phase == next);
        debug!(table = %table.name, phase = next.as_str(), "phase change");
        *phase = next;
    }

    async fn read_chunk_with_retry(
        &self,
        table: &Table,
        offset: u64,
        phase: &mut TransferPhase,
        stats: &mut TransferStats,
    ) -> Result<Vec<Vec<SqlValue>>> {
        let mut failures = 0u32;
        loop {
            match self.source.read_chunk(table, offset, self.chunk_size).await {
                Ok(rows) => return Ok(rows),
                Err(e) => {
                    failures += 1;
                    if !self.retry.should_retry(failures) {
                        return Err(SyncError::transfer(
                            table.name.clone(),
                            format!("chunk read at offset {} failed after {} attempts: {}", offset, failures, e),
                        ));
                    }
                    let wait = self.retry.backoff(failures - 1);
                    warn!(
                        table = %table.name,
                        offset,
                        attempt = failures,
                        backoff_ms = wait.as_millis() as u64,
                        error = %e,
                        "chunk read failed, retrying"
                    );
                    self.enter(phase, TransferPhase::Retrying, table);
                    stats.retries += 1;
                    tokio::time::sleep(wait).await;
                    self.enter(phase, TransferPhase::Extracting, table);
                }
            }
        }
    }

    async fn load_sub_chunk_with_retry(
        &self,
        table: &Table,
        target_schema: &str,
        cols: &[String],
        rows: &[Vec<SqlValue>],
        phase: &mut TransferPhase,
        stats: &mut TransferStats,
    ) -> Result<u64> {
        let mut failures = 0u32;
        loop {
            match self
                .target
                .copy_rows(target_schema, &table.name, cols, rows)
                .await
            {
                Ok(written) => return Ok(written),
                Err(e) => {
                    failures += 1;
                    if !self.retry.should_retry(failures) {
                        return Err(SyncError::transfer(
                            table.name.clone(),
                            format!("sub-chunk load failed after {} attempts: {}", failures, e),
                        ));
                    }
                    let wait = self.retry.backoff(failures - 1);
                    warn!(
                        table = %table.name,
                        attempt = failures,
                        backoff_ms = wait.as_millis() as u64,
                        error = %e,
                        "sub-chunk load failed, retrying"
                    );
                    self.enter(phase, TransferPhase::Retrying, table);
                    stats.retries += 1;
                    tokio::time::sleep(wait).await;
                    self.enter(phase, TransferPhase::Loading, table);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn test_no_retries_policy() {
        let policy = RetryPolicy::new(0, Duration::from_millis(500));
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_large_retry_does_not_overflow() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1));
        // Must not panic; exact value is irrelevant.
        let _ = policy.backoff(1000);
    }

    #[test]
    fn test_phase_happy_path() {
        use TransferPhase::*;
        let path = [NotStarted, Extracting, Converting, Loading, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_phase_retry_loops() {
        use TransferPhase::*;
        assert!(Extracting.can_transition(Retrying));
        assert!(Retrying.can_transition(Extracting));
        assert!(Converting.can_transition(Retrying));
        assert!(Retrying.can_transition(Converting));
        assert!(Loading.can_transition(Retrying));
        assert!(Retrying.can_transition(Loading));
    }

    #[test]
    fn test_phase_illegal_transitions() {
        use TransferPhase::*;
        assert!(!NotStarted.can_transition(Loading));
        assert!(!NotStarted.can_transition(Retrying));
        assert!(!Done.can_transition(Extracting));
        assert!(!Retrying.can_transition(Done));
    }

    #[test]
    fn test_loading_loops_back_to_extracting_for_next_chunk() {
        use TransferPhase::*;
        assert!(Loading.can_transition(Extracting));
    }
}
