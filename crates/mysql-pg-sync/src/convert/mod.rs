//! Cell value conversion between MySQL and PostgreSQL semantics.
//!
//! Each cell passes through the strategy chosen by the type mapper and
//! yields an explicit outcome: kept as-is, rewritten, or coerced to NULL.
//! NULL coercions are counted per column so a run can report exactly which
//! values had no target representation.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Result, SyncError};
use crate::typemap::{ColumnTypeMapping, ConversionStrategy, TableMapping};
use crate::value::{SqlNullType, SqlValue};

/// What happened to a single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellOutcome {
    /// The value was already in target shape.
    Unchanged,
    /// The value was rewritten into target shape.
    Converted(SqlValue),
    /// The value has no target representation and became NULL.
    CoercedToNull,
}

/// Totals accumulated while converting chunks of one table.
#[derive(Debug, Clone, Default)]
pub struct ConversionReport {
    /// Rows processed.
    pub rows: u64,

    /// Cells rewritten into target shape.
    pub cells_converted: u64,

    /// NULL coercions keyed by column name.
    pub null_coercions: BTreeMap<String, u64>,

    /// Strings that were empty after whitespace trimming.
    pub emptied_strings: u64,
}

impl ConversionReport {
    /// Total NULL coercions across all columns.
    pub fn total_null_coercions(&self) -> u64 {
        self.null_coercions.values().sum()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: &ConversionReport) {
        self.rows += other.rows;
        self.cells_converted += other.cells_converted;
        self.emptied_strings += other.emptied_strings;
        for (col, n) in &other.null_coercions {
            *self.null_coercions.entry(col.clone()).or_insert(0) += n;
        }
    }
}

/// Converts extracted chunks in place according to a table mapping.
#[derive(Debug)]
pub struct ChunkConverter<'a> {
    mapping: &'a TableMapping,
    empty_strings_as_null: bool,
}

impl<'a> ChunkConverter<'a> {
    pub fn new(mapping: &'a TableMapping, empty_strings_as_null: bool) -> Self {
        Self {
            mapping,
            empty_strings_as_null,
        }
    }

    /// Convert every cell of every row in place, recording outcomes.
    ///
    /// A row whose arity does not match the mapping is a table-level error,
    /// not a cell-level coercion.
    pub fn convert_chunk(
        &self,
        rows: &mut [Vec<SqlValue>],
        report: &mut ConversionReport,
    ) -> Result<()> {
        for row in rows.iter_mut() {
            if row.len() != self.mapping.columns.len() {
                return Err(SyncError::transfer(
                    self.mapping.table.clone(),
                    format!(
                        "row has {} cells but table has {} mapped columns",
                        row.len(),
                        self.mapping.columns.len()
                    ),
                ));
            }

            for (cell, col) in row.iter_mut().zip(self.mapping.columns.iter()) {
                match convert_cell(cell, col, self.empty_strings_as_null) {
                    CellOutcome::Unchanged => {}
                    CellOutcome::Converted(v) => {
                        if matches!(&v, SqlValue::Text(s) if s.is_empty()) {
                            report.emptied_strings += 1;
                        }
                        *cell = v;
                        report.cells_converted += 1;
                    }
                    CellOutcome::CoercedToNull => {
                        *cell = SqlValue::Null(null_hint(col.strategy));
                        *report
                            .null_coercions
                            .entry(col.name.clone())
                            .or_insert(0) += 1;
                    }
                }
            }
            report.rows += 1;
        }
        Ok(())
    }
}

/// NULL type hint for a coerced cell, keyed off the strategy that failed.
fn null_hint(strategy: ConversionStrategy) -> SqlNullType {
    match strategy {
        ConversionStrategy::Boolean => SqlNullType::Bool,
        ConversionStrategy::IntegerCoercing => SqlNullType::I64,
        ConversionStrategy::DateCoercing => SqlNullType::DateTime,
        _ => SqlNullType::String,
    }
}

/// Convert one cell according to its column's strategy.
pub fn convert_cell(
    value: &SqlValue,
    col: &ColumnTypeMapping,
    empty_strings_as_null: bool,
) -> CellOutcome {
    if value.is_null() {
        return CellOutcome::Unchanged;
    }
    match col.strategy {
        ConversionStrategy::PassThrough => CellOutcome::Unchanged,
        ConversionStrategy::Boolean => to_boolean(value),
        ConversionStrategy::IntegerCoercing => to_integer(value),
        ConversionStrategy::DateCoercing => to_temporal(value, &col.target_type),
        ConversionStrategy::StringTrimming => {
            trim_string(value, col.is_nullable && empty_strings_as_null)
        }
        ConversionStrategy::TextFallback => to_text(value),
    }
}

/// MySQL boolean truthiness: any non-zero number is true.
fn to_boolean(value: &SqlValue) -> CellOutcome {
    match value {
        SqlValue::Bool(_) => CellOutcome::Unchanged,
        SqlValue::I16(v) => CellOutcome::Converted(SqlValue::Bool(*v != 0)),
        SqlValue::I32(v) => CellOutcome::Converted(SqlValue::Bool(*v != 0)),
        SqlValue::I64(v) => CellOutcome::Converted(SqlValue::Bool(*v != 0)),
        SqlValue::F32(v) => CellOutcome::Converted(SqlValue::Bool(*v != 0.0)),
        SqlValue::F64(v) => CellOutcome::Converted(SqlValue::Bool(*v != 0.0)),
        SqlValue::Decimal(v) => CellOutcome::Converted(SqlValue::Bool(!v.is_zero())),
        SqlValue::Text(s) => {
            let t = s.trim();
            if let Ok(n) = t.parse::<i64>() {
                return CellOutcome::Converted(SqlValue::Bool(n != 0));
            }
            match t.to_lowercase().as_str() {
                "t" | "true" | "y" | "yes" => CellOutcome::Converted(SqlValue::Bool(true)),
                "f" | "false" | "n" | "no" | "" => CellOutcome::Converted(SqlValue::Bool(false)),
                _ => CellOutcome::Converted(SqlValue::Bool(true)),
            }
        }
        _ => CellOutcome::CoercedToNull,
    }
}

fn to_integer(value: &SqlValue) -> CellOutcome {
    match value {
        SqlValue::I16(_) | SqlValue::I32(_) | SqlValue::I64(_) => CellOutcome::Unchanged,
        SqlValue::Bool(v) => CellOutcome::Converted(SqlValue::I64(i64::from(*v))),
        SqlValue::F32(v) => float_to_integer(f64::from(*v)),
        SqlValue::F64(v) => float_to_integer(*v),
        SqlValue::Decimal(v) => match i64::try_from(v.trunc()) {
            Ok(n) => CellOutcome::Converted(SqlValue::I64(n)),
            Err(_) => CellOutcome::CoercedToNull,
        },
        SqlValue::Text(s) => match s.trim().parse::<i64>() {
            Ok(n) => CellOutcome::Converted(SqlValue::I64(n)),
            Err(_) => CellOutcome::CoercedToNull,
        },
        _ => CellOutcome::CoercedToNull,
    }
}

fn float_to_integer(v: f64) -> CellOutcome {
    if v.is_finite() && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        CellOutcome::Converted(SqlValue::I64(v.trunc() as i64))
    } else {
        CellOutcome::CoercedToNull
    }
}

/// Zero-date sentinels MySQL permits but PostgreSQL rejects.
fn is_zero_date(s: &str) -> bool {
    s.starts_with("0000-00-00")
}

/// Temporal values that failed driver-side decoding arrive as their raw
/// text. Zero dates and unparseable literals become NULL.
fn to_temporal(value: &SqlValue, target_type: &str) -> CellOutcome {
    match value {
        SqlValue::Date(_) | SqlValue::DateTime(_) | SqlValue::Time(_) => CellOutcome::Unchanged,
        SqlValue::Text(s) => {
            let t = s.trim();
            if is_zero_date(t) {
                return CellOutcome::CoercedToNull;
            }
            if target_type == "date" {
                match NaiveDate::parse_from_str(t, "%Y-%m-%d") {
                    Ok(d) => CellOutcome::Converted(SqlValue::Date(d)),
                    Err(_) => CellOutcome::CoercedToNull,
                }
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S%.f") {
                CellOutcome::Converted(SqlValue::DateTime(dt))
            } else if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
                CellOutcome::Converted(SqlValue::DateTime(d.and_hms_opt(0, 0, 0).unwrap_or_default()))
            } else {
                CellOutcome::CoercedToNull
            }
        }
        _ => CellOutcome::CoercedToNull,
    }
}

fn trim_string(value: &SqlValue, empty_as_null: bool) -> CellOutcome {
    match value {
        SqlValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() && empty_as_null {
                return CellOutcome::CoercedToNull;
            }
            if trimmed.len() == s.len() {
                CellOutcome::Unchanged
            } else {
                CellOutcome::Converted(SqlValue::Text(trimmed.to_string()))
            }
        }
        // Other value shapes in a string column keep their text rendering.
        other => to_text(other),
    }
}

fn to_text(value: &SqlValue) -> CellOutcome {
    match value {
        SqlValue::Text(_) => CellOutcome::Unchanged,
        SqlValue::Bool(v) => CellOutcome::Converted(SqlValue::Text(v.to_string())),
        SqlValue::I16(v) => CellOutcome::Converted(SqlValue::Text(v.to_string())),
        SqlValue::I32(v) => CellOutcome::Converted(SqlValue::Text(v.to_string())),
        SqlValue::I64(v) => CellOutcome::Converted(SqlValue::Text(v.to_string())),
        SqlValue::F32(v) => CellOutcome::Converted(SqlValue::Text(v.to_string())),
        SqlValue::F64(v) => CellOutcome::Converted(SqlValue::Text(v.to_string())),
        SqlValue::Decimal(v) => CellOutcome::Converted(SqlValue::Text(v.to_string())),
        SqlValue::Date(v) => CellOutcome::Converted(SqlValue::Text(v.format("%Y-%m-%d").to_string())),
        SqlValue::DateTime(v) => {
            CellOutcome::Converted(SqlValue::Text(v.format("%Y-%m-%d %H:%M:%S").to_string()))
        }
        SqlValue::Time(v) => {
            CellOutcome::Converted(SqlValue::Text(v.format("%H:%M:%S").to_string()))
        }
        SqlValue::Bytes(v) => CellOutcome::Converted(SqlValue::Text(hex::encode(v))),
        SqlValue::Null(_) => CellOutcome::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemap::ConversionStrategy;

    fn mapping(strategy: ConversionStrategy, target: &str, nullable: bool) -> ColumnTypeMapping {
        ColumnTypeMapping {
            name: "c".to_string(),
            source_type: "x".to_string(),
            target_type: target.to_string(),
            strategy,
            is_nullable: nullable,
            warning: None,
        }
    }

    #[test]
    fn test_null_passes_every_strategy() {
        let v = SqlValue::Null(SqlNullType::I32);
        for strategy in [
            ConversionStrategy::PassThrough,
            ConversionStrategy::Boolean,
            ConversionStrategy::IntegerCoercing,
            ConversionStrategy::DateCoercing,
            ConversionStrategy::StringTrimming,
            ConversionStrategy::TextFallback,
        ] {
            let m = mapping(strategy, "text", true);
            assert_eq!(convert_cell(&v, &m, false), CellOutcome::Unchanged);
        }
    }

    #[test]
    fn test_boolean_from_tinyint() {
        let m = mapping(ConversionStrategy::Boolean, "boolean", true);
        assert_eq!(
            convert_cell(&SqlValue::I16(1), &m, false),
            CellOutcome::Converted(SqlValue::Bool(true))
        );
        assert_eq!(
            convert_cell(&SqlValue::I16(0), &m, false),
            CellOutcome::Converted(SqlValue::Bool(false))
        );
        assert_eq!(
            convert_cell(&SqlValue::I16(-3), &m, false),
            CellOutcome::Converted(SqlValue::Bool(true))
        );
    }

    #[test]
    fn test_boolean_from_text() {
        let m = mapping(ConversionStrategy::Boolean, "boolean", true);
        assert_eq!(
            convert_cell(&SqlValue::from("true"), &m, false),
            CellOutcome::Converted(SqlValue::Bool(true))
        );
        assert_eq!(
            convert_cell(&SqlValue::from("0"), &m, false),
            CellOutcome::Converted(SqlValue::Bool(false))
        );
    }

    #[test]
    fn test_integer_from_text() {
        let m = mapping(ConversionStrategy::IntegerCoercing, "bigint", true);
        assert_eq!(
            convert_cell(&SqlValue::from(" 42 "), &m, false),
            CellOutcome::Converted(SqlValue::I64(42))
        );
        assert_eq!(
            convert_cell(&SqlValue::from("not a number"), &m, false),
            CellOutcome::CoercedToNull
        );
    }

    #[test]
    fn test_integer_from_float_truncates() {
        let m = mapping(ConversionStrategy::IntegerCoercing, "bigint", true);
        assert_eq!(
            convert_cell(&SqlValue::F64(3.9), &m, false),
            CellOutcome::Converted(SqlValue::I64(3))
        );
        assert_eq!(
            convert_cell(&SqlValue::F64(f64::NAN), &m, false),
            CellOutcome::CoercedToNull
        );
    }

    #[test]
    fn test_zero_date_becomes_null() {
        let m = mapping(ConversionStrategy::DateCoercing, "timestamp", true);
        assert_eq!(
            convert_cell(&SqlValue::from("0000-00-00"), &m, false),
            CellOutcome::CoercedToNull
        );
        assert_eq!(
            convert_cell(&SqlValue::from("0000-00-00 00:00:00"), &m, false),
            CellOutcome::CoercedToNull
        );
    }

    #[test]
    fn test_valid_datetime_text_parses() {
        let m = mapping(ConversionStrategy::DateCoercing, "timestamp", true);
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(
            convert_cell(&SqlValue::from("2024-03-15 10:30:00"), &m, false),
            CellOutcome::Converted(SqlValue::DateTime(expected))
        );
    }

    #[test]
    fn test_valid_date_text_parses_for_date_column() {
        let m = mapping(ConversionStrategy::DateCoercing, "date", true);
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(
            convert_cell(&SqlValue::from("2024-03-15"), &m, false),
            CellOutcome::Converted(SqlValue::Date(expected))
        );
    }

    #[test]
    fn test_garbage_date_becomes_null() {
        let m = mapping(ConversionStrategy::DateCoercing, "timestamp", true);
        assert_eq!(
            convert_cell(&SqlValue::from("never"), &m, false),
            CellOutcome::CoercedToNull
        );
    }

    #[test]
    fn test_decoded_date_unchanged() {
        let m = mapping(ConversionStrategy::DateCoercing, "date", true);
        let d = SqlValue::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(convert_cell(&d, &m, false), CellOutcome::Unchanged);
    }

    #[test]
    fn test_surrounding_whitespace_trimmed() {
        let m = mapping(ConversionStrategy::StringTrimming, "varchar(10)", true);
        assert_eq!(
            convert_cell(&SqlValue::from("  abc   "), &m, false),
            CellOutcome::Converted(SqlValue::Text("abc".to_string()))
        );
        assert_eq!(
            convert_cell(&SqlValue::from("abc"), &m, false),
            CellOutcome::Unchanged
        );
    }

    #[test]
    fn test_empty_after_trim_kept_by_default() {
        let m = mapping(ConversionStrategy::StringTrimming, "varchar(10)", true);
        assert_eq!(
            convert_cell(&SqlValue::from("   "), &m, false),
            CellOutcome::Converted(SqlValue::Text(String::new()))
        );
    }

    #[test]
    fn test_empty_after_trim_nulled_when_requested() {
        let m = mapping(ConversionStrategy::StringTrimming, "varchar(10)", true);
        assert_eq!(
            convert_cell(&SqlValue::from("   "), &m, true),
            CellOutcome::CoercedToNull
        );
    }

    #[test]
    fn test_empty_after_trim_kept_for_not_null_column() {
        let m = mapping(ConversionStrategy::StringTrimming, "varchar(10)", false);
        assert_eq!(
            convert_cell(&SqlValue::from("   "), &m, true),
            CellOutcome::Converted(SqlValue::Text(String::new()))
        );
    }

    #[test]
    fn test_text_fallback_renders_scalars() {
        let m = mapping(ConversionStrategy::TextFallback, "text", true);
        assert_eq!(
            convert_cell(&SqlValue::I64(12), &m, false),
            CellOutcome::Converted(SqlValue::Text("12".to_string()))
        );
        assert_eq!(
            convert_cell(&SqlValue::from("already text"), &m, false),
            CellOutcome::Unchanged
        );
    }

    #[test]
    fn test_chunk_conversion_counts_per_column() {
        let mapping = TableMapping {
            table: "t".to_string(),
            columns: vec![
                ColumnTypeMapping {
                    name: "id".to_string(),
                    source_type: "int".to_string(),
                    target_type: "integer".to_string(),
                    strategy: ConversionStrategy::IntegerCoercing,
                    is_nullable: false,
                    warning: None,
                },
                ColumnTypeMapping {
                    name: "seen_at".to_string(),
                    source_type: "datetime".to_string(),
                    target_type: "timestamp".to_string(),
                    strategy: ConversionStrategy::DateCoercing,
                    is_nullable: true,
                    warning: None,
                },
            ],
        };
        let converter = ChunkConverter::new(&mapping, false);
        let mut rows = vec![
            vec![SqlValue::I32(1), SqlValue::from("0000-00-00 00:00:00")],
            vec![SqlValue::I32(2), SqlValue::from("2024-01-01 00:00:00")],
            vec![SqlValue::I32(3), SqlValue::from("0000-00-00 00:00:00")],
        ];
        let mut report = ConversionReport::default();
        converter.convert_chunk(&mut rows, &mut report).unwrap();

        assert_eq!(report.rows, 3);
        assert_eq!(report.null_coercions.get("seen_at"), Some(&2));
        assert!(report.null_coercions.get("id").is_none());
        assert!(rows[0][1].is_null());
        assert!(!rows[1][1].is_null());
    }

    #[test]
    fn test_chunk_conversion_rejects_bad_arity() {
        let mapping = TableMapping {
            table: "t".to_string(),
            columns: vec![ColumnTypeMapping {
                name: "id".to_string(),
                source_type: "int".to_string(),
                target_type: "integer".to_string(),
                strategy: ConversionStrategy::IntegerCoercing,
                is_nullable: false,
                warning: None,
            }],
        };
        let converter = ChunkConverter::new(&mapping, false);
        let mut rows = vec![vec![SqlValue::I32(1), SqlValue::I32(2)]];
        let mut report = ConversionReport::default();
        assert!(converter.convert_chunk(&mut rows, &mut report).is_err());
    }

    #[test]
    fn test_report_merge() {
        let mut a = ConversionReport {
            rows: 2,
            cells_converted: 1,
            emptied_strings: 0,
            null_coercions: [("x".to_string(), 1)].into_iter().collect(),
        };
        let b = ConversionReport {
            rows: 3,
            cells_converted: 2,
            emptied_strings: 1,
            null_coercions: [("x".to_string(), 2), ("y".to_string(), 1)]
                .into_iter()
                .collect(),
        };
        a.merge(&b);
        assert_eq!(a.rows, 5);
        assert_eq!(a.null_coercions.get("x"), Some(&3));
        assert_eq!(a.null_coercions.get("y"), Some(&1));
        assert_eq!(a.total_null_coercions(), 4);
    }
}
