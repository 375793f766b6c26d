//! Catalog queries.

pub const SCHEMA_EXISTS: &str = "\
SELECT EXISTS (
    SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1
)";

pub const RELATION_EXISTS: &str = "\
SELECT EXISTS (
    SELECT 1
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind::text = ANY($3::text[])
)";

/// Relation kinds counted as tables.
pub const TABLE_KINDS: &[&str] = &["r", "p"];

/// Relation kinds counted as views.
pub const VIEW_KINDS: &[&str] = &["v", "m"];

/// Own and inherited columns, in attribute order.
pub const COLUMN_DETAILS: &str = "\
SELECT a.attname::text, pg_catalog.format_type(a.atttypid, a.atttypmod)
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1 AND c.relname = $2 AND a.attnum > 0 AND NOT a.attisdropped
ORDER BY a.attnum";

pub const FOREIGN_KEYS: &str = "\
SELECT con.conname::text, pg_catalog.pg_get_constraintdef(con.oid)
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE con.contype = 'f' AND n.nspname = $1 AND c.relname = $2
ORDER BY con.conname";

/// Foreign keys on other tables that reference the given one.
pub const DEPENDENT_CONSTRAINTS: &str = "\
SELECT con.conname::text, pg_catalog.pg_get_constraintdef(con.oid)
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.confrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE con.contype = 'f' AND n.nspname = $1 AND c.relname = $2
  AND con.conrelid <> con.confrelid
ORDER BY con.conname";

pub const PARENT_TABLE: &str = "\
SELECT pn.nspname::text, p.relname::text
FROM pg_catalog.pg_inherits i
JOIN pg_catalog.pg_class c ON c.oid = i.inhrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_class p ON p.oid = i.inhparent
JOIN pg_catalog.pg_namespace pn ON pn.oid = p.relnamespace
WHERE n.nspname = $1 AND c.relname = $2
ORDER BY i.inhseqno
LIMIT 1";
