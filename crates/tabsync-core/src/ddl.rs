//! DDL rendering and catalog type helpers.

use crate::catalog::{ColumnSpec, QualifiedName, TableIdentity};
use crate::declared::EntityDef;

/// Canonical spelling of a catalog type, so aliases compare equal.
///
/// `int4`, `int` and `integer` all become `integer`; whitespace and case are
/// normalised. Unknown types pass through lower-cased.
pub fn canonical_type(column_type: &str) -> String {
    let collapsed = column_type
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .replace(" (", "(")
        .replace("( ", "(")
        .replace(" )", ")")
        .replace(", ", ",")
        .replace(" ,", ",");

    let mut base = collapsed.as_str();
    let mut array_suffix = String::new();
    while let Some(stripped) = base.strip_suffix("[]") {
        array_suffix.push_str("[]");
        base = stripped;
    }

    let (name, modifier) = match base.find('(') {
        Some(idx) => (&base[..idx], &base[idx..]),
        None => (base, ""),
    };

    let name = match name.trim() {
        "int" | "int4" | "integer" => "integer",
        "int2" | "smallint" => "smallint",
        "int8" | "bigint" => "bigint",
        "bool" | "boolean" => "boolean",
        "varchar" | "character varying" => "character varying",
        "char" | "character" | "bpchar" => "character",
        "float8" | "double precision" => "double precision",
        "float4" | "real" => "real",
        "decimal" | "numeric" => "numeric",
        "timestamp" | "timestamp without time zone" => "timestamp without time zone",
        "timestamptz" | "timestamp with time zone" => "timestamp with time zone",
        "time" | "time without time zone" => "time without time zone",
        "timetz" | "time with time zone" => "time with time zone",
        other => other,
    };

    format!("{}{}{}", name, modifier, array_suffix)
}

/// Whether two catalog type strings denote the same type.
pub fn same_type(left: &str, right: &str) -> bool {
    canonical_type(left) == canonical_type(right)
}

/// Expression used as `DEFAULT` for new columns and as the `USING` cast on type changes.
///
/// This resets values to a type-appropriate constant; existing data is not converted.
pub fn default_value_for(column_type: &str) -> &'static str {
    let canonical = canonical_type(column_type);
    if canonical.ends_with("[]") {
        return "'{}'";
    }
    let base = canonical
        .split('(')
        .next()
        .unwrap_or(canonical.as_str())
        .trim();
    match base {
        "smallint" | "integer" | "bigint" | "numeric" | "real" | "double precision"
        | "smallserial" | "serial" | "bigserial" | "money" => "0",
        "boolean" => "false",
        "character varying" | "character" | "text" | "citext" | "name" => "''",
        "date" => "CURRENT_DATE",
        "timestamp without time zone" | "timestamp with time zone" => "now()",
        "time without time zone" | "time with time zone" => "'00:00:00'",
        "interval" => "'0 seconds'",
        "uuid" => "'00000000-0000-0000-0000-000000000000'",
        "bytea" => "''",
        "json" | "jsonb" => "'{}'",
        _ => "NULL",
    }
}

/// `CREATE SCHEMA <schema>`
pub fn create_schema_statement(schema: &str) -> String {
    format!("CREATE SCHEMA {}", schema.to_lowercase())
}

/// `ALTER TABLE <table> <clause>`
pub fn alter_table_statement(table: &QualifiedName, clause: &str) -> String {
    format!("ALTER TABLE {} {}", table, clause)
}

/// `DROP TABLE <table>`
pub fn drop_table_statement(table: &QualifiedName) -> String {
    format!("DROP TABLE {}", table)
}

/// Column definition used inside `CREATE TABLE`.
pub fn column_definition(column: &ColumnSpec) -> String {
    let default = default_value_for(&column.column_type);
    if column.nullable_allowed {
        format!("{} {}", column.name, column.column_type)
    } else {
        format!(
            "{} {} NOT NULL DEFAULT {}",
            column.name, column.column_type, default
        )
    }
}

/// `CREATE TABLE` for one table of the pair.
pub fn create_table_statement(table: &TableIdentity, columns: &[ColumnSpec]) -> String {
    let body = columns
        .iter()
        .map(column_definition)
        .collect::<Vec<_>>()
        .join(", ");
    match table.parent() {
        Some(parent) => format!(
            "CREATE TABLE {} ({}) INHERITS ({})",
            table.name(),
            body,
            parent.name()
        ),
        None => format!("CREATE TABLE {} ({})", table.name(), body),
    }
}

/// `CREATE TABLE` statements for the primary table and its history twin.
pub fn create_table_statements(entity: &EntityDef) -> Vec<String> {
    vec![
        create_table_statement(&entity.identity, &entity.columns),
        create_table_statement(&entity.identity.history(), &entity.columns),
    ]
}
