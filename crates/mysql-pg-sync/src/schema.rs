//! Schema metadata types for source tables and columns.
//!
//! These types are an engine-agnostic snapshot of what the extractor reads
//! from MySQL's information_schema.

use serde::{Deserialize, Serialize};

/// Table metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Schema (database) name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key column names, in key order.
    pub primary_key: Vec<String>,

    /// Approximate row count from table statistics.
    pub row_count: i64,
}

impl Table {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Column names used to produce a stable read order: the primary key
    /// when present, otherwise the first column in ordinal position.
    pub fn order_columns(&self) -> Vec<String> {
        if self.has_pk() {
            self.primary_key.clone()
        } else {
            self.columns.first().map(|c| c.name.clone()).into_iter().collect()
        }
    }

    /// Check if a column is part of the primary key.
    pub fn is_pk_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|pk| pk == name)
    }
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Base data type (e.g. "int", "varchar", "datetime").
    pub data_type: String,

    /// Full column type including modifiers (e.g. "tinyint(1)",
    /// "int unsigned", "enum('a','b')").
    pub column_type: String,

    /// Maximum length in characters for string types (-1 when not applicable).
    pub max_length: i64,

    /// Numeric precision.
    pub precision: i32,

    /// Numeric scale.
    pub scale: i32,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

impl Column {
    /// Whether the full column type carries the `unsigned` modifier.
    pub fn is_unsigned(&self) -> bool {
        self.column_type.to_lowercase().contains("unsigned")
    }

    /// Display width for integer types, e.g. 1 for "tinyint(1)".
    pub fn display_width(&self) -> Option<u32> {
        let ty = &self.column_type;
        let open = ty.find('(')?;
        let close = ty[open..].find(')')? + open;
        ty[open + 1..close].parse().ok()
    }
}
