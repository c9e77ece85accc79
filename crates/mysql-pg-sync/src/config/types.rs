//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Sync behavior configuration.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Source database (MySQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type (always "mysql" for now).
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name. Also the schema in MySQL terms.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,
}

/// Target database (PostgreSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "postgres" for now).
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Landing schema for replicated tables (default: "raw").
    #[serde(default = "default_raw_schema")]
    pub schema: String,

    /// SSL mode (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,
}

impl TargetConfig {
    /// Build a connection string for tokio-postgres.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={}",
            self.host, self.port, self.database, self.user, self.password, self.ssl_mode
        )
    }
}

/// Sync behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Rows per extraction chunk (default: 10,000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Rows per COPY sub-chunk within a chunk (default: 1,000).
    #[serde(default = "default_sub_chunk_size")]
    pub sub_chunk_size: usize,

    /// Retry attempts per chunk operation after the first failure (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial retry backoff in milliseconds, doubled per attempt (default: 500).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Relative row-count tolerance for large tables (default: 0.001).
    #[serde(default = "default_tolerance")]
    pub count_tolerance: f64,

    /// Row-count threshold below which validation demands an exact match
    /// (default: 10,000).
    #[serde(default = "default_small_table_threshold")]
    pub small_table_threshold: i64,

    /// Tables to include. Empty means all tables in the source database.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables to exclude.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Coerce strings that are empty after trimming to NULL when the
    /// column is nullable (default: false, keep empty strings).
    #[serde(default)]
    pub empty_strings_as_null: bool,

    /// Per-column target type overrides, keyed as "table.column".
    #[serde(default)]
    pub column_type_overrides: BTreeMap<String, String>,

    /// Maximum MySQL connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_mysql_connections: usize,

    /// Maximum PostgreSQL connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_pg_connections: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            sub_chunk_size: default_sub_chunk_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            count_tolerance: default_tolerance(),
            small_table_threshold: default_small_table_threshold(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            empty_strings_as_null: false,
            column_type_overrides: BTreeMap::new(),
            max_mysql_connections: default_max_connections(),
            max_pg_connections: default_max_connections(),
        }
    }
}

// Default value functions for serde
fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_pg_port() -> u16 {
    5432
}

fn default_raw_schema() -> String {
    "raw".to_string()
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_chunk_size() -> usize {
    10_000
}

fn default_sub_chunk_size() -> usize {
    1_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_tolerance() -> f64 {
    0.001
}

fn default_small_table_threshold() -> i64 {
    10_000
}

fn default_max_connections() -> usize {
    4
}
