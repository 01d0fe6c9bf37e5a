//! Catalog queries.
//!
//! Every output column is cast to text so rows decode into
//! [`CatalogRow`](crate::core::CatalogRow) without per-driver type handling.
//! The single parameter `$1` is the schema namespace.

/// Base tables in a namespace.
pub const TABLES: &str = r#"
SELECT table_name::text
FROM information_schema.tables
WHERE table_schema = $1::text
  AND table_type = 'BASE TABLE'
ORDER BY table_name
"#;

/// Columns for every table in a namespace, in ordinal order per table.
///
/// Output: table, column, udt_name, data_type, is_nullable, ordinal,
/// default, max_length, precision, scale.
pub const COLUMNS: &str = r#"
SELECT
    table_name::text,
    column_name::text,
    udt_name::text,
    data_type::text,
    is_nullable::text,
    ordinal_position::text,
    column_default::text,
    character_maximum_length::text,
    numeric_precision::text,
    numeric_scale::text
FROM information_schema.columns
WHERE table_schema = $1::text
ORDER BY table_name, ordinal_position
"#;

/// Primary key columns in key order.
///
/// Output: table, column.
pub const PRIMARY_KEYS: &str = r#"
SELECT t.relname::text, a.attname::text
FROM pg_catalog.pg_constraint c
JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
CROSS JOIN LATERAL unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
WHERE n.nspname = $1::text
  AND c.contype = 'p'
ORDER BY t.relname, k.ord
"#;

/// Foreign key column pairs, one row per column in constraint order.
///
/// Output: table, constraint, column, ref_schema, ref_table, ref_column,
/// delete action code, update action code.
pub const FOREIGN_KEYS: &str = r#"
SELECT
    t.relname::text,
    c.conname::text,
    a.attname::text,
    rn.nspname::text,
    rt.relname::text,
    ra.attname::text,
    c.confdeltype::text,
    c.confupdtype::text
FROM pg_catalog.pg_constraint c
JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
JOIN pg_catalog.pg_namespace rn ON rn.oid = rt.relnamespace
CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(attnum, ref_attnum, ord)
JOIN pg_catalog.pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum
JOIN pg_catalog.pg_attribute ra ON ra.attrelid = c.confrelid AND ra.attnum = k.ref_attnum
WHERE n.nspname = $1::text
  AND c.contype = 'f'
ORDER BY t.relname, c.conname, k.ord
"#;

/// Translate a `pg_constraint` referential action code.
pub fn referential_action(code: &str) -> &'static str {
    match code {
        "a" => "NO ACTION",
        "r" => "RESTRICT",
        "c" => "CASCADE",
        "n" => "SET NULL",
        "d" => "SET DEFAULT",
        _ => "NO ACTION",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referential_action_codes() {
        assert_eq!(referential_action("c"), "CASCADE");
        assert_eq!(referential_action("n"), "SET NULL");
        assert_eq!(referential_action("a"), "NO ACTION");
        assert_eq!(referential_action("?"), "NO ACTION");
    }

    #[test]
    fn test_queries_take_namespace_parameter() {
        for q in [TABLES, COLUMNS, PRIMARY_KEYS, FOREIGN_KEYS] {
            assert!(q.contains("$1::text"));
            assert!(!q.contains("$2"));
        }
    }
}
