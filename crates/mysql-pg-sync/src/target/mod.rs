//! PostgreSQL target database operations.
//!
//! Rows land via the COPY protocol in text format, one sub-chunk per COPY
//! statement. Each COPY is its own implicit transaction, so a retried
//! sub-chunk never half-applies.

use bytes::{BufMut, BytesMut};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use futures::SinkExt;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, info};

use crate::config::TargetConfig;
use crate::error::{Result, SyncError};
use crate::synth;
use crate::value::SqlValue;

/// PostgreSQL target pool.
pub struct PgTarget {
    pool: Pool,
}

impl PgTarget {
    /// Create a new target pool and verify connectivity.
    pub async fn connect(config: &TargetConfig, max_conns: usize) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(max_conns)
            .build()
            .map_err(|e| SyncError::pool(e.to_string(), "creating PostgreSQL target pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "testing PostgreSQL target connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { pool })
    }

    /// The underlying pool, shared with the sync tracker.
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }

    /// Test the database connection.
    pub async fn test_connection(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "testing PostgreSQL connection"))?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    /// Create the landing schema if missing.
    pub async fn create_schema(&self, schema: &str) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "creating schema"))?;
        client
            .execute(synth::build_create_schema(schema).as_str(), &[])
            .await?;
        debug!(schema, "ensured landing schema");
        Ok(())
    }

    /// Execute a DDL statement.
    pub async fn execute_ddl(&self, ddl: &str) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "executing DDL"))?;
        client.execute(ddl, &[]).await?;
        Ok(())
    }

    /// Check whether a table exists.
    pub async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "checking table existence"))?;

        let table = synth::target_ident(table);
        let row = client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = $1 AND table_name = $2
                )",
                &[&schema, &table],
            )
            .await?;
        Ok(row.get::<_, bool>(0))
    }

    /// Exact row count of a target table.
    pub async fn get_row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "getting target row count"))?;

        let query = format!(
            "SELECT COUNT(*) FROM {}",
            synth::qualify_table(schema, &synth::target_ident(table))
        );
        let row = client.query_one(&query, &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    /// Write one sub-chunk of rows with COPY in text format.
    ///
    /// Returns the number of rows PostgreSQL reports as copied.
    pub async fn copy_rows(
        &self,
        schema: &str,
        table: &str,
        cols: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "getting COPY connection"))?;

        let col_list: String = cols
            .iter()
            .map(|c| synth::quote_ident(&synth::target_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let copy_stmt = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
            synth::qualify_table(schema, &synth::target_ident(table)),
            col_list
        );

        let sink = client.copy_in(&copy_stmt).await?;
        futures::pin_mut!(sink);

        let mut buf = BytesMut::with_capacity(64 * 1024);
        for row in rows {
            for (j, value) in row.iter().enumerate() {
                if j > 0 {
                    buf.put_u8(b'\t');
                }
                buf.extend_from_slice(sql_value_to_copy_text(value).as_bytes());
            }
            buf.put_u8(b'\n');

            if buf.len() >= 64 * 1024 {
                sink.send(buf.split().freeze()).await.map_err(|e| {
                    SyncError::transfer(
                        format!("{}.{}", schema, table),
                        format!("COPY send failed: {}", e),
                    )
                })?;
            }
        }
        if !buf.is_empty() {
            sink.send(buf.split().freeze()).await.map_err(|e| {
                SyncError::transfer(
                    format!("{}.{}", schema, table),
                    format!("COPY send failed: {}", e),
                )
            })?;
        }

        let copied = sink.finish().await?;
        Ok(copied)
    }
}

/// Convert a SqlValue to COPY text format.
fn sql_value_to_copy_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Null(_) => "\\N".to_string(),
        SqlValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
        SqlValue::I16(n) => n.to_string(),
        SqlValue::I32(n) => n.to_string(),
        SqlValue::I64(n) => n.to_string(),
        SqlValue::F32(n) => n.to_string(),
        SqlValue::F64(n) => n.to_string(),
        SqlValue::Text(s) => escape_copy_text(s),
        SqlValue::Bytes(b) => format!("\\\\x{}", hex::encode(b)),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        SqlValue::Date(d) => d.to_string(),
        SqlValue::Time(t) => t.to_string(),
    }
}

/// Escape special characters for COPY text format.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SqlNullType;
    use chrono::NaiveDate;

    #[test]
    fn test_null_renders_as_copy_null() {
        assert_eq!(
            sql_value_to_copy_text(&SqlValue::Null(SqlNullType::String)),
            "\\N"
        );
    }

    #[test]
    fn test_bool_renders_t_f() {
        assert_eq!(sql_value_to_copy_text(&SqlValue::Bool(true)), "t");
        assert_eq!(sql_value_to_copy_text(&SqlValue::Bool(false)), "f");
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(
            sql_value_to_copy_text(&SqlValue::Text("a\tb\nc\\d".to_string())),
            "a\\tb\\nc\\\\d"
        );
    }

    #[test]
    fn test_bytes_render_as_hex() {
        assert_eq!(
            sql_value_to_copy_text(&SqlValue::Bytes(vec![0xde, 0xad])),
            "\\\\xdead"
        );
    }

    #[test]
    fn test_datetime_format() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(
            sql_value_to_copy_text(&SqlValue::DateTime(dt)),
            "2024-01-02 03:04:05.000000"
        );
    }

    #[test]
    fn test_date_format() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(sql_value_to_copy_text(&SqlValue::Date(d)), "2024-01-02");
    }
}
