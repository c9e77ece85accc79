//! MySQL source database operations.
//!
//! Uses SQLx for connection pooling and async query execution. Metadata
//! comes from information_schema; data is read in ordered offset windows so
//! chunk N always precedes chunk N+1.

use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Row, ValueRef};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::{Result, SyncError};
use crate::schema::{Column, Table};
use crate::value::{SqlNullType, SqlValue};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL source reader.
pub struct MysqlSource {
    pool: MySqlPool,
    database: String,
}

impl MysqlSource {
    /// Create a new source from configuration and verify connectivity.
    pub async fn connect(config: &SourceConfig, max_conns: usize) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(MySqlSslMode::Preferred);

        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "creating MySQL source pool"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "testing MySQL source connection"))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }

    /// Test the database connection.
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "testing MySQL connection"))?;
        Ok(())
    }

    /// List base table names in the source database.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        // CAST to CHAR to handle collation differences where information_schema
        // may return VARBINARY instead of VARCHAR
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::SchemaExtraction(format!("listing MySQL tables: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("TABLE_NAME"))
            .collect())
    }

    /// Load a table's full metadata: columns, primary key, and row count.
    pub async fn load_table(&self, name: &str) -> Result<Table> {
        let mut table = Table {
            schema: self.database.clone(),
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            row_count: 0,
        };

        self.load_columns(&mut table).await?;
        if table.columns.is_empty() {
            return Err(SyncError::SchemaExtraction(format!(
                "table '{}' not found in source database '{}'",
                name, self.database
            )));
        }
        self.load_primary_key(&mut table).await?;
        table.row_count = self.get_row_count(name).await?;

        debug!(
            table = name,
            columns = table.columns.len(),
            rows = table.row_count,
            "loaded source table metadata"
        );
        Ok(table)
    }

    async fn load_columns(&self, table: &mut Table) -> Result<()> {
        // CAST string columns to CHAR and numeric to SIGNED to handle
        // collation and type differences across MySQL versions
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
                CAST(COLUMN_TYPE AS CHAR(1024)) AS COLUMN_TYPE,
                CAST(COALESCE(CHARACTER_MAXIMUM_LENGTH, -1) AS SIGNED) AS max_length,
                CAST(COALESCE(NUMERIC_PRECISION, 0) AS SIGNED) AS num_precision,
                CAST(COALESCE(NUMERIC_SCALE, 0) AS SIGNED) AS num_scale,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::SchemaExtraction(format!("loading MySQL columns: {}", e)))?;

        for row in rows {
            table.columns.push(Column {
                name: row.get::<String, _>("COLUMN_NAME"),
                data_type: row.get::<String, _>("DATA_TYPE"),
                column_type: row.get::<String, _>("COLUMN_TYPE"),
                max_length: row.get::<i64, _>("max_length"),
                precision: row.get::<i64, _>("num_precision") as i32,
                scale: row.get::<i64, _>("num_scale") as i32,
                is_nullable: row.get::<i64, _>("is_nullable") == 1,
                ordinal_pos: row.get::<i64, _>("ORDINAL_POSITION") as i32,
            });
        }

        Ok(())
    }

    async fn load_primary_key(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::SchemaExtraction(format!("loading MySQL primary key: {}", e)))?;

        for row in rows {
            table.primary_key.push(row.get::<String, _>("COLUMN_NAME"));
        }

        Ok(())
    }

    /// Exact row count of a table.
    pub async fn get_row_count(&self, table: &str) -> Result<i64> {
        let query = format!(
            "SELECT COUNT(*) AS cnt FROM {}.{}",
            Self::quote_ident(&self.database),
            Self::quote_ident(table)
        );

        let row: MySqlRow = sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "getting MySQL row count"))?;

        Ok(row.get::<i64, _>("cnt"))
    }

    /// Read one chunk of rows as `[offset, offset + limit)` in stable order.
    pub async fn read_chunk(
        &self,
        table: &Table,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Vec<SqlValue>>> {
        let col_list = table
            .columns
            .iter()
            .map(Self::select_expr)
            .collect::<Vec<_>>()
            .join(", ");
        let order = table
            .order_columns()
            .iter()
            .map(|c| Self::quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let query = format!(
            "SELECT {} FROM {}.{} ORDER BY {} LIMIT {} OFFSET {}",
            col_list,
            Self::quote_ident(&table.schema),
            Self::quote_ident(&table.name),
            order,
            limit,
            offset
        );

        let rows: Vec<MySqlRow> = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::transfer(table.name.clone(), format!("reading rows: {}", e)))?;

        Ok(rows
            .iter()
            .map(|row| Self::row_to_values(row, &table.columns))
            .collect())
    }

    /// Quote a MySQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// SELECT expression for one column.
    ///
    /// Date and datetime columns are cast to CHAR server-side: the wire
    /// protocol would otherwise reject zero-date sentinels before the
    /// converter can see the literal and count the coercion.
    fn select_expr(col: &Column) -> String {
        let quoted = Self::quote_ident(&col.name);
        match col.data_type.to_lowercase().as_str() {
            "date" | "datetime" | "timestamp" => {
                format!("CAST({} AS CHAR) AS {}", quoted, quoted)
            }
            _ => quoted,
        }
    }

    /// Convert a MySQL row to a SqlValue vector, decoding per the declared
    /// column type.
    ///
    /// Date and datetime columns arrive as text (see `select_expr`) and are
    /// parsed downstream by the converter, which records zero-date and
    /// garbage literals as NULL coercions.
    fn row_to_values(row: &MySqlRow, columns: &[Column]) -> Vec<SqlValue> {
        columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let data_type = col.data_type.to_lowercase();

                let is_null: bool = row.try_get_raw(i).map(|r| r.is_null()).unwrap_or(true);
                if is_null {
                    return SqlValue::Null(Self::null_type_for(&data_type));
                }

                let unsigned = col.is_unsigned();
                match data_type.as_str() {
                    "tinyint" if unsigned => row
                        .try_get::<u8, _>(i)
                        .map(|v| SqlValue::I16(v as i16))
                        .unwrap_or(SqlValue::Null(SqlNullType::I16)),
                    "tinyint" => row
                        .try_get::<i8, _>(i)
                        .map(|v| SqlValue::I16(v as i16))
                        .unwrap_or(SqlValue::Null(SqlNullType::I16)),
                    "smallint" if unsigned => row
                        .try_get::<u16, _>(i)
                        .map(|v| SqlValue::I32(v as i32))
                        .unwrap_or(SqlValue::Null(SqlNullType::I32)),
                    "smallint" => row
                        .try_get::<i16, _>(i)
                        .map(SqlValue::I16)
                        .unwrap_or(SqlValue::Null(SqlNullType::I16)),
                    "year" => row
                        .try_get::<u16, _>(i)
                        .map(|v| SqlValue::I16(v as i16))
                        .or_else(|_| row.try_get::<i16, _>(i).map(SqlValue::I16))
                        .unwrap_or(SqlValue::Null(SqlNullType::I16)),
                    "mediumint" | "int" | "integer" if unsigned => row
                        .try_get::<u32, _>(i)
                        .map(|v| SqlValue::I64(v as i64))
                        .unwrap_or(SqlValue::Null(SqlNullType::I64)),
                    "mediumint" | "int" | "integer" => row
                        .try_get::<i32, _>(i)
                        .map(SqlValue::I32)
                        .unwrap_or(SqlValue::Null(SqlNullType::I32)),
                    "bigint" if unsigned => row
                        .try_get::<u64, _>(i)
                        .map(|v| SqlValue::Decimal(rust_decimal::Decimal::from(v)))
                        .unwrap_or(SqlValue::Null(SqlNullType::Decimal)),
                    "bigint" => row
                        .try_get::<i64, _>(i)
                        .map(SqlValue::I64)
                        .unwrap_or(SqlValue::Null(SqlNullType::I64)),

                    "float" => row
                        .try_get::<f32, _>(i)
                        .map(SqlValue::F32)
                        .unwrap_or(SqlValue::Null(SqlNullType::F32)),
                    "double" | "real" => row
                        .try_get::<f64, _>(i)
                        .map(SqlValue::F64)
                        .unwrap_or(SqlValue::Null(SqlNullType::F64)),

                    "decimal" | "numeric" => row
                        .try_get::<rust_decimal::Decimal, _>(i)
                        .map(SqlValue::Decimal)
                        .unwrap_or(SqlValue::Null(SqlNullType::Decimal)),

                    // bit(1) decodes as bool; wider bit fields become the
                    // big-endian bytes of their numeric value.
                    "bit" => row
                        .try_get::<bool, _>(i)
                        .map(SqlValue::Bool)
                        .or_else(|_| {
                            row.try_get::<u64, _>(i).map(|v| {
                                let bytes = v.to_be_bytes();
                                let start = bytes.iter().position(|b| *b != 0).unwrap_or(7);
                                SqlValue::Bytes(bytes[start..].to_vec())
                            })
                        })
                        .unwrap_or(SqlValue::Null(SqlNullType::Bool)),
                    "boolean" | "bool" => row
                        .try_get::<bool, _>(i)
                        .map(SqlValue::Bool)
                        .unwrap_or(SqlValue::Null(SqlNullType::Bool)),

                    // Enum and set decode as their label text.
                    "char" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext"
                    | "enum" | "set" | "json" => row
                        .try_get::<String, _>(i)
                        .map(SqlValue::Text)
                        .unwrap_or(SqlValue::Null(SqlNullType::String)),

                    "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
                        row.try_get::<Vec<u8>, _>(i)
                            .map(SqlValue::Bytes)
                            .unwrap_or(SqlValue::Null(SqlNullType::Bytes))
                    }

                    // Cast to CHAR in the SELECT, so the literal text decodes.
                    "date" => row
                        .try_get::<String, _>(i)
                        .map(SqlValue::Text)
                        .unwrap_or(SqlValue::Null(SqlNullType::Date)),
                    "time" => row
                        .try_get::<chrono::NaiveTime, _>(i)
                        .map(SqlValue::Time)
                        .unwrap_or(SqlValue::Null(SqlNullType::Time)),
                    "datetime" | "timestamp" => row
                        .try_get::<String, _>(i)
                        .map(SqlValue::Text)
                        .unwrap_or(SqlValue::Null(SqlNullType::DateTime)),

                    _ => row
                        .try_get::<String, _>(i)
                        .map(SqlValue::Text)
                        .unwrap_or(SqlValue::Null(SqlNullType::String)),
                }
            })
            .collect()
    }

    /// Get the appropriate null type hint for a MySQL data type.
    fn null_type_for(data_type: &str) -> SqlNullType {
        match data_type {
            "tinyint" | "smallint" | "year" => SqlNullType::I16,
            "mediumint" | "int" | "integer" => SqlNullType::I32,
            "bigint" => SqlNullType::I64,
            "float" => SqlNullType::F32,
            "double" | "real" => SqlNullType::F64,
            "decimal" | "numeric" => SqlNullType::Decimal,
            "bit" | "boolean" | "bool" => SqlNullType::Bool,
            "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
                SqlNullType::Bytes
            }
            "date" => SqlNullType::Date,
            "time" => SqlNullType::Time,
            "datetime" | "timestamp" => SqlNullType::DateTime,
            _ => SqlNullType::String,
        }
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
