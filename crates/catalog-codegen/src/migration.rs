//! Best-effort `CREATE TABLE` script per namespace.
//!
//! Built from native catalog types, primary keys and foreign keys. Foreign
//! keys are added after every table exists so table order does not matter.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::core::{Column, Schema, Table};
use crate::error::{CodegenError, Result};
use crate::template::filters::snake_case;

/// Render the script for a schema.
pub fn render_script(schema: &Schema) -> String {
    let mut sql = format!(
        "-- Schema {} ({} table(s))\n\nCREATE SCHEMA IF NOT EXISTS {};\n",
        schema.namespace,
        schema.tables.len(),
        quote_ident(&schema.namespace)
    );

    for table in &schema.tables {
        sql.push('\n');
        sql.push_str(&generate_ddl(table));
        sql.push_str(";\n");
    }

    for table in &schema.tables {
        for fk in &table.foreign_keys {
            let cols: Vec<String> = fk.columns.iter().map(|c| quote_ident(c)).collect();
            let ref_cols: Vec<String> = fk.ref_columns.iter().map(|c| quote_ident(c)).collect();
            sql.push_str(&format!(
                "\nALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {};\n",
                qualify_table(&table.schema, &table.name),
                quote_ident(&fk.name),
                cols.join(", "),
                qualify_table(&fk.ref_schema, &fk.ref_table),
                ref_cols.join(", "),
                fk.on_delete,
                fk.on_update
            ));
        }
    }
    sql
}

/// Write `<dir>/<namespace>_schema.sql` and return its path.
pub fn write_script(schema: &Schema, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(format!("{}_schema.sql", snake_case(schema.namespace.clone())));
    let wrap = |source| CodegenError::FilesystemWrite {
        path: path.clone(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(wrap)?;
    let temp_path = path.with_extension("sql.tmp");
    std::fs::write(&temp_path, render_script(schema)).map_err(wrap)?;
    std::fs::rename(&temp_path, &path).map_err(wrap)?;

    info!(namespace = %schema.namespace, path = %path.display(), "Migration script written");
    Ok(path)
}

fn generate_ddl(table: &Table) -> String {
    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            let nullable = if col.is_nullable { "" } else { " NOT NULL" };
            let default = col
                .default
                .as_deref()
                .map(|d| format!(" DEFAULT {}", d))
                .unwrap_or_default();
            format!("    {} {}{}{}", quote_ident(&col.name), column_type(col), nullable, default)
        })
        .collect();

    if table.has_pk() {
        let pk: Vec<String> = table.primary_key.iter().map(|c| quote_ident(c)).collect();
        lines.push(format!("    PRIMARY KEY ({})", pk.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        qualify_table(&table.schema, &table.name),
        lines.join(",\n")
    )
}

/// Native type spelling with length or precision restored.
fn column_type(col: &Column) -> String {
    if let Some(element) = col.native_type.strip_prefix('_') {
        return format!("{}[]", element);
    }
    match (col.native_type.as_str(), col.max_length, col.precision, col.scale) {
        ("varchar" | "bpchar", Some(len), _, _) if len > 0 => {
            format!("{}({})", col.native_type, len)
        }
        ("numeric", _, Some(p), Some(s)) => format!("numeric({},{})", p, s),
        ("numeric", _, Some(p), None) => format!("numeric({})", p),
        _ => col.native_type.clone(),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ForeignKey;
    use crate::typemap::SemanticType;
    use tempfile::tempdir;

    fn col(name: &str, native: &str, nullable: bool) -> Column {
        Column {
            name: name.into(),
            native_type: native.into(),
            semantic_type: SemanticType::Opaque,
            is_nullable: nullable,
            is_primary_key: false,
            is_foreign_key: false,
            ordinal_pos: 1,
            default: None,
            max_length: None,
            precision: None,
            scale: None,
        }
    }

    fn schema() -> Schema {
        let mut total = col("total", "numeric", true);
        total.precision = Some(10);
        total.scale = Some(2);
        Schema {
            namespace: "public".into(),
            tables: vec![Table {
                schema: "public".into(),
                name: "orders".into(),
                columns: vec![col("id", "int4", false), col("user_id", "int4", false), total, col("tags", "_text", true)],
                primary_key: vec!["id".into()],
                foreign_keys: vec![ForeignKey {
                    name: "orders_user_id_fkey".into(),
                    columns: vec!["user_id".into()],
                    ref_schema: "public".into(),
                    ref_table: "users".into(),
                    ref_columns: vec!["id".into()],
                    on_delete: "CASCADE".into(),
                    on_update: "NO ACTION".into(),
                }],
            }],
            warnings: vec![],
        }
    }

    #[test]
    fn test_render_script() {
        let sql = render_script(&schema());
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"public\".\"orders\" (\n    \"id\" int4 NOT NULL,"));
        assert!(sql.contains("\"total\" numeric(10,2),"));
        assert!(sql.contains("\"tags\" text[],"));
        assert!(sql.contains("PRIMARY KEY (\"id\")"));
        assert!(sql.contains(
            "FOREIGN KEY (\"user_id\") REFERENCES \"public\".\"users\" (\"id\") ON DELETE CASCADE ON UPDATE NO ACTION"
        ));
    }

    #[test]
    fn test_write_script() {
        let dir = tempdir().unwrap();
        let path = write_script(&schema(), &dir.path().join("migrations")).unwrap();
        assert!(path.ends_with("public_schema.sql"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), render_script(&schema()));
    }
}
