//! DDL synthesis for the raw landing schema.
//!
//! Pure string builders: connections stay out of this module so DDL can be
//! asserted on byte for byte. Only the table body and the primary key are
//! recreated; secondary indexes, foreign keys, and check constraints do not
//! belong in a landing layer.

use crate::schema::Table;
use crate::typemap::TableMapping;

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fully qualify a table name.
pub fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Target-side identifier: source names are lower-cased so downstream
/// consumers address stable names regardless of source casing.
pub fn target_ident(name: &str) -> String {
    name.to_lowercase()
}

/// Build the CREATE SCHEMA statement for the landing schema.
pub fn build_create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema))
}

/// Build the CREATE TABLE statement for a mapped table.
///
/// The primary key is declared inline when the source table has one.
pub fn build_create_table(table: &Table, mapping: &TableMapping, target_schema: &str) -> String {
    let mut ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n",
        qualify_table(target_schema, &target_ident(&table.name))
    );

    for col in &mapping.columns {
        let nullable = if col.is_nullable { "" } else { " NOT NULL" };
        ddl.push_str(&format!(
            "    {} {}{},\n",
            quote_ident(&target_ident(&col.name)),
            col.target_type,
            nullable
        ));
    }

    if table.has_pk() {
        let pk_cols: Vec<String> = table
            .primary_key
            .iter()
            .map(|c| quote_ident(&target_ident(c)))
            .collect();
        ddl.push_str(&format!("    PRIMARY KEY ({})\n", pk_cols.join(", ")));
    } else {
        // Strip the trailing comma left by the column list.
        ddl.truncate(ddl.len() - 2);
        ddl.push('\n');
    }

    ddl.push(')');
    ddl
}

/// Build the DROP TABLE statement used when a sync is forced.
pub fn build_drop_table(schema: &str, table: &str) -> String {
    format!(
        "DROP TABLE IF EXISTS {}",
        qualify_table(schema, &target_ident(table))
    )
}

/// Build the TRUNCATE statement that clears a table before a full reload.
pub fn build_truncate_table(schema: &str, table: &str) -> String {
    format!(
        "TRUNCATE TABLE {}",
        qualify_table(schema, &target_ident(table))
    )
}
