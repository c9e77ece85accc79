//! MySQL to PostgreSQL type mapping.
//!
//! Mapping is driven by an ordered rule table: each rule pairs a predicate
//! over the source column with the PostgreSQL type and value-conversion
//! strategy to use. Rules are evaluated top to bottom and the final rule
//! accepts anything, so every column maps to something loadable.

use std::collections::BTreeMap;

use crate::schema::{Column, Table};

/// How cell values of a column are converted before loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStrategy {
    /// Value is already in target shape.
    PassThrough,
    /// Any non-null value becomes a logical true/false.
    Boolean,
    /// Value is coerced to an integer; non-parseable values become NULL.
    IntegerCoercing,
    /// Temporal values; zero-date sentinels and unparseable literals
    /// become NULL.
    DateCoercing,
    /// Strings with surrounding whitespace trimmed.
    StringTrimming,
    /// Anything renders as its text form.
    TextFallback,
}

/// The resolved mapping for a single column.
#[derive(Debug, Clone)]
pub struct ColumnTypeMapping {
    /// Source column name.
    pub name: String,

    /// Source base data type.
    pub source_type: String,

    /// PostgreSQL target type.
    pub target_type: String,

    /// Value conversion strategy.
    pub strategy: ConversionStrategy,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Warning for lossy mappings (enum, set, unknown types).
    pub warning: Option<String>,
}

/// The resolved mappings for a whole table, in column order.
#[derive(Debug, Clone)]
pub struct TableMapping {
    pub table: String,
    pub columns: Vec<ColumnTypeMapping>,
}

/// One entry in the rule table.
struct TypeRule {
    /// Does this rule apply to the column?
    applies: fn(&Column) -> bool,
    /// Target type, strategy, and optional lossiness warning.
    resolve: fn(&Column) -> (String, ConversionStrategy, Option<String>),
}

fn is_type(col: &Column, names: &[&str]) -> bool {
    let dt = col.data_type.to_lowercase();
    names.contains(&dt.as_str())
}

/// The 10 MB varchar bound PostgreSQL enforces on typmods.
const PG_MAX_VARCHAR: i64 = 10_485_760;

/// Declared length of a bounded character column, or 255 when the source
/// metadata is missing or out of range.
fn bounded_length(col: &Column) -> i64 {
    if col.max_length > 0 && col.max_length <= PG_MAX_VARCHAR {
        col.max_length
    } else {
        255
    }
}

/// Ordered mapping rules. The last rule matches unconditionally.
const RULES: &[TypeRule] = &[
    // MySQL's boolean idiom: tinyint with display width 1.
    TypeRule {
        applies: |c| is_type(c, &["tinyint"]) && c.display_width() == Some(1),
        resolve: |_| ("boolean".into(), ConversionStrategy::Boolean, None),
    },
    TypeRule {
        applies: |c| is_type(c, &["bool", "boolean"]),
        resolve: |_| ("boolean".into(), ConversionStrategy::Boolean, None),
    },
    // Integer family. Unsigned variants widen to the next size up.
    TypeRule {
        applies: |c| is_type(c, &["tinyint", "smallint"]),
        resolve: |c| {
            let target = if c.is_unsigned() && c.data_type.eq_ignore_ascii_case("smallint") {
                "integer"
            } else {
                "smallint"
            };
            (target.into(), ConversionStrategy::IntegerCoercing, None)
        },
    },
    TypeRule {
        applies: |c| is_type(c, &["mediumint", "int", "integer"]),
        resolve: |c| {
            let target = if c.is_unsigned() && !c.data_type.eq_ignore_ascii_case("mediumint") {
                "bigint"
            } else {
                "integer"
            };
            (target.into(), ConversionStrategy::IntegerCoercing, None)
        },
    },
    TypeRule {
        applies: |c| is_type(c, &["bigint"]),
        resolve: |c| {
            if c.is_unsigned() {
                ("numeric(20,0)".into(), ConversionStrategy::PassThrough, None)
            } else {
                ("bigint".into(), ConversionStrategy::IntegerCoercing, None)
            }
        },
    },
    TypeRule {
        applies: |c| is_type(c, &["year"]),
        resolve: |_| ("smallint".into(), ConversionStrategy::IntegerCoercing, None),
    },
    // Decimal/numeric.
    TypeRule {
        applies: |c| is_type(c, &["decimal", "numeric", "dec", "fixed"]),
        resolve: |c| {
            let target = if c.precision > 0 {
                format!("numeric({},{})", c.precision, c.scale)
            } else {
                "numeric".to_string()
            };
            (target, ConversionStrategy::PassThrough, None)
        },
    },
    // Floating point.
    TypeRule {
        applies: |c| is_type(c, &["float"]),
        resolve: |_| ("real".into(), ConversionStrategy::PassThrough, None),
    },
    TypeRule {
        applies: |c| is_type(c, &["double", "double precision", "real"]),
        resolve: |_| {
            ("double precision".into(), ConversionStrategy::PassThrough, None)
        },
    },
    // Temporal types. Zero-date sentinels are handled by the strategy.
    TypeRule {
        applies: |c| is_type(c, &["date"]),
        resolve: |_| ("date".into(), ConversionStrategy::DateCoercing, None),
    },
    TypeRule {
        applies: |c| is_type(c, &["datetime", "timestamp"]),
        resolve: |_| ("timestamp".into(), ConversionStrategy::DateCoercing, None),
    },
    TypeRule {
        applies: |c| is_type(c, &["time"]),
        resolve: |_| ("time".into(), ConversionStrategy::PassThrough, None),
    },
    // Character types. An unusable declared length falls back to 255
    // rather than failing the column.
    TypeRule {
        applies: |c| is_type(c, &["char"]),
        resolve: |c| {
            (
                format!("char({})", bounded_length(c)),
                ConversionStrategy::StringTrimming,
                None,
            )
        },
    },
    TypeRule {
        applies: |c| is_type(c, &["varchar"]),
        resolve: |c| {
            (
                format!("varchar({})", bounded_length(c)),
                ConversionStrategy::StringTrimming,
                None,
            )
        },
    },
    TypeRule {
        applies: |c| is_type(c, &["tinytext", "text", "mediumtext", "longtext"]),
        resolve: |_| ("text".into(), ConversionStrategy::StringTrimming, None),
    },
    // Binary types.
    TypeRule {
        applies: |c| {
            is_type(
                c,
                &["binary", "varbinary", "tinyblob", "blob", "mediumblob", "longblob"],
            )
        },
        resolve: |_| ("bytea".into(), ConversionStrategy::PassThrough, None),
    },
    // JSON.
    TypeRule {
        applies: |c| is_type(c, &["json"]),
        resolve: |_| ("jsonb".into(), ConversionStrategy::PassThrough, None),
    },
    // Enum and set land as their label text.
    TypeRule {
        applies: |c| is_type(c, &["enum"]),
        resolve: |_| {
            (
                "text".into(),
                ConversionStrategy::TextFallback,
                Some("MySQL ENUM stored as text".to_string()),
            )
        },
    },
    TypeRule {
        applies: |c| is_type(c, &["set"]),
        resolve: |_| {
            (
                "text".into(),
                ConversionStrategy::TextFallback,
                Some("MySQL SET stored as comma-joined text".to_string()),
            )
        },
    },
    // BIT width lives in NUMERIC_PRECISION, not CHARACTER_MAXIMUM_LENGTH.
    TypeRule {
        applies: |c| is_type(c, &["bit"]),
        resolve: |c| {
            if c.precision == 1 {
                ("boolean".into(), ConversionStrategy::Boolean, None)
            } else {
                ("bytea".into(), ConversionStrategy::PassThrough, None)
            }
        },
    },
    // Unconditional fallback: load as text rather than fail the table.
    TypeRule {
        applies: |_| true,
        resolve: |c| {
            (
                "text".into(),
                ConversionStrategy::TextFallback,
                Some(format!("unknown MySQL type '{}' stored as text", c.data_type)),
            )
        },
    },
];

/// Maps source columns to PostgreSQL types, honoring per-column overrides.
#[derive(Debug, Clone, Default)]
pub struct TypeMapper {
    /// Target type overrides keyed as "table.column".
    overrides: BTreeMap<String, String>,
}

impl TypeMapper {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Self { overrides }
    }

    /// Map every column of a table.
    pub fn map_table(&self, table: &Table) -> TableMapping {
        TableMapping {
            table: table.name.clone(),
            columns: table
                .columns
                .iter()
                .map(|col| self.map_column(table, col))
                .collect(),
        }
    }

    /// Map one column. Overrides win over the rule table; primary key
    /// columns are never given a lossy or null-coercing strategy.
    pub fn map_column(&self, table: &Table, col: &Column) -> ColumnTypeMapping {
        let override_key = format!("{}.{}", table.name, col.name);
        if let Some(target) = self.overrides.get(&override_key) {
            return ColumnTypeMapping {
                name: col.name.clone(),
                source_type: col.data_type.clone(),
                target_type: target.clone(),
                strategy: ConversionStrategy::PassThrough,
                is_nullable: col.is_nullable,
                warning: None,
            };
        }

        let rule = RULES
            .iter()
            .find(|r| (r.applies)(col))
            .unwrap_or(&RULES[RULES.len() - 1]);
        let (mut target_type, mut strategy, mut warning) = (rule.resolve)(col);

        // Key columns must keep their exact identity: a tinyint(1) key stays
        // an integer and a fallback-typed key loads verbatim as text.
        if table.is_pk_column(&col.name) {
            match strategy {
                ConversionStrategy::Boolean => {
                    target_type = "smallint".to_string();
                    strategy = ConversionStrategy::IntegerCoercing;
                }
                ConversionStrategy::TextFallback => {
                    target_type = "text".to_string();
                    strategy = ConversionStrategy::PassThrough;
                    warning = None;
                }
                _ => {}
            }
        }

        ColumnTypeMapping {
            name: col.name.clone(),
            source_type: col.data_type.clone(),
            target_type,
            strategy,
            is_nullable: col.is_nullable,
            warning,
        }
    }
}
