//! Template context derived from a table.
//!
//! Everything a template needs is precomputed here so templates stay free of
//! string assembly: Rust identifiers with keywords escaped, SQL statements,
//! parameter lists and doc lines.

use serde::Serialize;

use crate::config::MockProvider;
use crate::core::{Column, ForeignKey, Table};
use crate::template::filters::{escape_ident, pascal_case, snake_case};

use super::job::ArtifactKind;

/// Root object handed to every template.
#[derive(Debug, Clone, Serialize)]
pub struct RenderContext {
    pub generator: &'static str,
    /// Header line marking the file as generated, when enabled.
    pub directive: Option<String>,
    pub namespace: String,
    pub artifact: &'static str,
    pub mock_provider: &'static str,
    pub table: TableView,
}

impl RenderContext {
    pub fn new(
        table: &Table,
        kind: ArtifactKind,
        mock_provider: MockProvider,
        emit_directive: bool,
    ) -> Self {
        let directive = emit_directive.then(|| {
            format!(
                "// @generated by catalog-codegen ({}) from {}. Do not edit.",
                kind.as_str(),
                table.full_name()
            )
        });

        Self {
            generator: "catalog-codegen",
            directive,
            namespace: table.schema.clone(),
            artifact: kind.as_str(),
            mock_provider: mock_provider.as_str(),
            table: TableView::from_table(table),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableView {
    pub name: String,
    pub full_name: String,
    pub snake_name: String,
    pub struct_name: String,
    pub trait_name: String,
    pub impl_name: String,
    pub mock_name: String,
    pub fake_name: String,
    pub columns: Vec<ColumnView>,
    pub pk_columns: Vec<ColumnView>,
    pub has_pk: bool,
    /// `id: i32, tenant: String`
    pub pk_params: String,
    /// `&id, &tenant`
    pub pk_args: String,
    /// `r.id == id && r.tenant == tenant`
    pub pk_match: String,
    /// `&row.id, &row.name`
    pub insert_args: String,
    pub foreign_keys: Vec<ForeignKeyView>,
    pub sql: SqlView,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnView {
    pub name: String,
    pub field: String,
    pub native_type: String,
    pub semantic_type: String,
    pub category: &'static str,
    pub base_rust_type: String,
    /// `base_rust_type`, wrapped in `Option<..>` when nullable.
    pub rust_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub default: Option<String>,
    pub ordinal: i32,
    pub doc: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForeignKeyView {
    pub name: String,
    pub columns: Vec<String>,
    pub ref_schema: String,
    pub ref_table: String,
    pub ref_struct: String,
    pub ref_columns: Vec<String>,
    pub on_delete: String,
    pub on_update: String,
    /// `find_by_user_id`
    pub finder: String,
    pub params: String,
    pub args: String,
    /// Predicate over `r` for in-memory fakes.
    pub matcher: String,
    pub select_sql: String,
    pub doc: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlView {
    pub select: String,
    pub select_by_pk: String,
    pub insert: String,
    pub delete_by_pk: String,
}

impl TableView {
    pub fn from_table(table: &Table) -> Self {
        let struct_name = pascal_case(table.name.clone());
        let columns: Vec<ColumnView> = table.columns.iter().map(ColumnView::from_column).collect();
        let pk_columns: Vec<ColumnView> = table
            .primary_key
            .iter()
            .filter_map(|pk| columns.iter().find(|c| &c.name == pk).cloned())
            .collect();

        let qualified = format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name));
        let column_list = table
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let select = format!("SELECT {} FROM {}", column_list, qualified);
        let pk_names: Vec<&str> = table.primary_key.iter().map(String::as_str).collect();
        let pk_where = where_clause(&pk_names);

        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            qualified,
            column_list,
            (1..=table.columns.len())
                .map(|i| format!("${}", i))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let foreign_keys = table
            .foreign_keys
            .iter()
            .map(|fk| ForeignKeyView::from_foreign_key(fk, &columns, &select))
            .collect();

        Self {
            name: table.name.clone(),
            full_name: table.full_name(),
            snake_name: snake_case(table.name.clone()),
            trait_name: format!("{}Repository", struct_name),
            impl_name: format!("Pg{}Repository", struct_name),
            mock_name: format!("{}Repo", struct_name),
            fake_name: format!("Fake{}Repository", struct_name),
            has_pk: table.has_pk(),
            pk_params: params(&pk_columns),
            pk_args: args(&pk_columns),
            pk_match: matcher(&pk_columns),
            insert_args: columns
                .iter()
                .map(|c| format!("&row.{}", c.field))
                .collect::<Vec<_>>()
                .join(", "),
            sql: SqlView {
                select_by_pk: format!("{} WHERE {}", select, pk_where),
                delete_by_pk: format!("DELETE FROM {} WHERE {}", qualified, pk_where),
                select,
                insert,
            },
            struct_name,
            columns,
            pk_columns,
            foreign_keys,
        }
    }
}

impl ColumnView {
    fn from_column(col: &Column) -> Self {
        let base = col.semantic_type.rust_type();
        let rust_type = if col.is_nullable {
            format!("Option<{}>", base)
        } else {
            base.clone()
        };

        let mut doc = format!(
            "`{}` {} ({})",
            col.name,
            col.native_type,
            col.semantic_type.name()
        );
        if col.is_primary_key {
            doc.push_str(", primary key");
        }
        if col.is_foreign_key {
            doc.push_str(", foreign key");
        }
        if col.is_nullable {
            doc.push_str(", nullable");
        }

        Self {
            name: col.name.clone(),
            field: escape_ident(&snake_case(col.name.clone())),
            native_type: col.native_type.clone(),
            semantic_type: col.semantic_type.name(),
            category: col.semantic_type.category(),
            base_rust_type: base,
            rust_type,
            nullable: col.is_nullable,
            is_primary_key: col.is_primary_key,
            is_foreign_key: col.is_foreign_key,
            default: col.default.clone(),
            ordinal: col.ordinal_pos,
            doc,
        }
    }
}

impl ForeignKeyView {
    fn from_foreign_key(fk: &ForeignKey, columns: &[ColumnView], select: &str) -> Self {
        let fk_columns: Vec<ColumnView> = fk
            .columns
            .iter()
            .filter_map(|name| columns.iter().find(|c| &c.name == name).cloned())
            .collect();
        let names: Vec<&str> = fk.columns.iter().map(String::as_str).collect();
        let ref_struct = pascal_case(fk.ref_table.clone());

        Self {
            name: fk.name.clone(),
            columns: fk.columns.clone(),
            ref_schema: fk.ref_schema.clone(),
            ref_table: fk.ref_table.clone(),
            ref_columns: fk.ref_columns.clone(),
            on_delete: fk.on_delete.clone(),
            on_update: fk.on_update.clone(),
            finder: format!(
                "find_by_{}",
                fk_columns
                    .iter()
                    .map(|c| c.field.trim_start_matches("r#").to_string())
                    .collect::<Vec<_>>()
                    .join("_and_")
            ),
            params: params(&fk_columns),
            args: args(&fk_columns),
            matcher: matcher(&fk_columns),
            select_sql: format!("{} WHERE {}", select, where_clause(&names)),
            doc: format!(
                "Rows whose ({}) reference `{}.{}` ({}) through `{}`.",
                fk.columns.join(", "),
                fk.ref_schema,
                fk.ref_table,
                fk.ref_columns.join(", "),
                fk.name
            ),
            ref_struct,
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn where_clause(columns: &[&str]) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", quote_ident(c), i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Key parameters take the non-null base type.
fn params(cols: &[ColumnView]) -> String {
    cols.iter()
        .map(|c| format!("{}: {}", c.field, c.base_rust_type))
        .collect::<Vec<_>>()
        .join(", ")
}

fn args(cols: &[ColumnView]) -> String {
    cols.iter()
        .map(|c| format!("&{}", c.field))
        .collect::<Vec<_>>()
        .join(", ")
}

fn matcher(cols: &[ColumnView]) -> String {
    if cols.is_empty() {
        return "false".to_string();
    }
    cols.iter()
        .map(|c| {
            if c.nullable {
                format!("r.{0}.as_ref() == Some(&{0})", c.field)
            } else {
                format!("r.{0} == {0}", c.field)
            }
        })
        .collect::<Vec<_>>()
        .join(" && ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemap::map_native;

    fn column(name: &str, udt: &str, nullable: bool, pk: bool, fk: bool) -> Column {
        Column {
            name: name.into(),
            native_type: udt.into(),
            semantic_type: map_native(udt, udt),
            is_nullable: nullable,
            is_primary_key: pk,
            is_foreign_key: fk,
            ordinal_pos: 1,
            default: None,
            max_length: None,
            precision: None,
            scale: None,
        }
    }

    fn orders() -> Table {
        Table {
            schema: "public".into(),
            name: "orders".into(),
            columns: vec![
                column("id", "int4", false, true, false),
                column("user_id", "int4", true, false, true),
                column("type", "text", false, false, false),
            ],
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
        }
    }

    #[test]
    fn test_table_view_names_and_sql() {
        let view = TableView::from_table(&orders());
        assert_eq!(view.struct_name, "Orders");
        assert_eq!(view.trait_name, "OrdersRepository");
        assert_eq!(view.pk_params, "id: i32");
        assert_eq!(view.pk_match, "r.id == id");
        assert_eq!(
            view.sql.select,
            r#"SELECT "id", "user_id", "type" FROM "public"."orders""#
        );
        assert_eq!(view.sql.select_by_pk, format!("{} WHERE \"id\" = $1", view.sql.select));
        assert!(view.sql.insert.ends_with("VALUES ($1, $2, $3)"));
        assert_eq!(view.insert_args, "&row.id, &row.user_id, &row.r#type");
    }

    #[test]
    fn test_column_views() {
        let view = TableView::from_table(&orders());
        let user_id = &view.columns[1];
        assert_eq!(user_id.rust_type, "Option<i32>");
        assert_eq!(user_id.base_rust_type, "i32");
        assert_eq!(user_id.semantic_type, "integer");
        assert!(user_id.doc.contains("foreign key"));
        assert_eq!(view.columns[2].field, "r#type");
    }

    #[test]
    fn test_foreign_key_view() {
        let view = TableView::from_table(&orders());
        let fk = &view.foreign_keys[0];
        assert_eq!(fk.finder, "find_by_user_id");
        assert_eq!(fk.ref_struct, "Users");
        assert_eq!(fk.params, "user_id: i32");
        assert_eq!(fk.matcher, "r.user_id.as_ref() == Some(&user_id)");
        assert!(fk.select_sql.ends_with(r#"WHERE "user_id" = $1"#));
        assert!(fk.doc.contains("`public.users`"));
    }

    #[test]
    fn test_directive_toggle() {
        let table = orders();
        let off = RenderContext::new(&table, ArtifactKind::Model, MockProvider::Mockall, false);
        assert!(off.directive.is_none());
        let on = RenderContext::new(&table, ArtifactKind::Model, MockProvider::Fake, true);
        assert!(on.directive.unwrap().contains("public.orders"));
        assert_eq!(on.mock_provider, "fake");
    }
}
