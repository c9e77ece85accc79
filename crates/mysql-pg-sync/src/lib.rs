//! # mysql-pg-sync
//!
//! MySQL to PostgreSQL table replication library.
//!
//! This library extracts table definitions from a MySQL database, maps them
//! to PostgreSQL types, creates matching tables in a raw landing schema, and
//! moves the rows over in chunks:
//!
//! - **Type mapping** from MySQL column types to PostgreSQL equivalents
//! - **Value conversion** handling zero dates, tinyint(1) booleans, and
//!   other MySQL quirks, with NULL coercions counted per column
//! - **Bulk loading** via the PostgreSQL COPY protocol
//! - **Retrying chunk transfers** with doubling backoff
//! - **Sync state tracking** in the target database itself
//! - **Row-count validation** with a drift tolerance for large tables
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_pg_sync::{Config, Orchestrator, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> mysql_pg_sync::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let summary = orchestrator.run(RunOptions::default()).await?;
//!     println!("Transferred {} rows", summary.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod orchestrator;
pub mod schema;
pub mod source;
pub mod synth;
pub mod target;
pub mod tracker;
pub mod transfer;
pub mod typemap;
pub mod validate;
pub mod value;

// Re-exports for convenient access
pub use config::{Config, SourceConfig, SyncConfig, TargetConfig};
pub use error::{Result, SyncError};
pub use orchestrator::{Orchestrator, RunOptions, RunSummary};
pub use schema::{Column, Table};
pub use source::MysqlSource;
pub use target::PgTarget;
pub use tracker::{DbTracker, SyncStatus, TableSyncState};
pub use transfer::{RetryPolicy, TransferEngine, TransferStats};
pub use typemap::{ConversionStrategy, TableMapping, TypeMapper};
pub use validate::ValidationOutcome;
pub use value::SqlValue;
