//! Catalog introspection.
//!
//! [`SchemaIntrospector`] turns catalog rows into a normalized [`Schema`]. It
//! is read-only and keeps no cache: two calls against an unchanged catalog
//! produce structurally equal schemas in the same order.

mod filter;
mod memory;
mod postgres;
pub mod queries;
pub mod tls;

pub use filter::TableFilter;
pub use memory::{MemoryCatalog, MemoryTable, QueryFault};
pub use postgres::PgConnector;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::{CatalogRow, Column, ForeignKey, MetadataConnector, Schema, Table};
use crate::error::{CodegenError, Result};
use crate::retry::with_timeout;
use crate::typemap::map_native;

/// Reads catalog metadata through a [`MetadataConnector`].
#[derive(Clone)]
pub struct SchemaIntrospector {
    connector: Arc<dyn MetadataConnector>,
    timeout: Duration,
}

impl SchemaIntrospector {
    pub fn new(connector: Arc<dyn MetadataConnector>, timeout: Duration) -> Self {
        Self { connector, timeout }
    }

    /// Table names in catalog order.
    pub async fn get_all_tables(&self, namespace: &str) -> Result<Vec<String>> {
        let rows = self.run(queries::TABLES, namespace, "list tables").await?;
        rows.iter()
            .map(|r| r.get_str(0).map(str::to_string))
            .collect()
    }

    /// Read every table passing `filter` into a [`Schema`].
    pub async fn introspect_schema(&self, namespace: &str, filter: &TableFilter) -> Result<Schema> {
        let started = Instant::now();
        let names = filter.apply(&self.get_all_tables(namespace).await?);
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();

        let mut tables: Vec<Table> = names
            .iter()
            .map(|name| Table {
                schema: namespace.to_string(),
                name: name.clone(),
                columns: Vec::new(),
                primary_key: Vec::new(),
                foreign_keys: Vec::new(),
            })
            .collect();
        let index: HashMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();

        let mut warnings = Vec::new();

        for row in self.run(queries::COLUMNS, namespace, "load columns").await? {
            let table_name = row.get_str(0)?;
            if !wanted.contains(table_name) {
                continue;
            }
            let column = column_from_row(&row)?;
            if column.semantic_type.is_opaque() {
                let msg = format!(
                    "{}.{}.{}: unrecognized type '{}' mapped to opaque",
                    namespace, table_name, column.name, column.native_type
                );
                warn!("{}", msg);
                warnings.push(msg);
            }
            tables[index[table_name]].columns.push(column);
        }

        for row in self.run(queries::PRIMARY_KEYS, namespace, "load primary keys").await? {
            let table_name = row.get_str(0)?;
            if !wanted.contains(table_name) {
                continue;
            }
            let table = &mut tables[index[table_name]];
            let col_name = row.get_str(1)?;
            let col = table
                .columns
                .iter_mut()
                .find(|c| c.name == col_name)
                .ok_or_else(|| {
                    CodegenError::SchemaIntrospection(format!(
                        "primary key of {}.{} names unknown column '{}'",
                        namespace, table_name, col_name
                    ))
                })?;
            col.is_primary_key = true;
            col.is_nullable = false;
            table.primary_key.push(col_name.to_string());
        }

        for row in self.run(queries::FOREIGN_KEYS, namespace, "load foreign keys").await? {
            let table_name = row.get_str(0)?;
            if !wanted.contains(table_name) {
                continue;
            }
            apply_foreign_key_row(&mut tables[index[table_name]], &row)?;
        }

        let schema = Schema {
            namespace: namespace.to_string(),
            tables,
            warnings,
        };

        info!(
            namespace,
            tables = schema.tables.len(),
            warnings = schema.warnings.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Schema introspected"
        );
        Ok(schema)
    }

    async fn run(&self, sql: &str, namespace: &str, what: &str) -> Result<Vec<CatalogRow>> {
        debug!(namespace, "Catalog query: {}", what);
        with_timeout(what, self.timeout, self.connector.query(sql, &[namespace])).await
    }
}

fn column_from_row(row: &CatalogRow) -> Result<Column> {
    let udt_name = row.get_str(2)?;
    let data_type = row.get_str(3)?;

    Ok(Column {
        name: row.get_str(1)?.to_string(),
        native_type: udt_name.to_string(),
        semantic_type: map_native(udt_name, data_type),
        is_nullable: row.get_bool(4)?,
        is_primary_key: false,
        is_foreign_key: false,
        ordinal_pos: row.get_i32(5)?.unwrap_or(0),
        default: row.get_opt(6).map(str::to_string),
        max_length: row.get_i32(7)?,
        precision: row.get_i32(8)?,
        scale: row.get_i32(9)?,
    })
}

/// Fold one (constraint, column pair) row into the table's foreign keys.
/// Rows of one constraint arrive contiguously in column order.
fn apply_foreign_key_row(table: &mut Table, row: &CatalogRow) -> Result<()> {
    let fk_name = row.get_str(1)?;
    let col_name = row.get_str(2)?;
    let ref_column = row.get_str(5)?.to_string();

    let col = table
        .columns
        .iter_mut()
        .find(|c| c.name == col_name)
        .ok_or_else(|| {
            CodegenError::SchemaIntrospection(format!(
                "foreign key {} on {} names unknown column '{}'",
                fk_name,
                table.name,
                col_name
            ))
        })?;
    col.is_foreign_key = true;

    match table.foreign_keys.iter_mut().find(|fk| fk.name == fk_name) {
        Some(fk) => {
            fk.columns.push(col_name.to_string());
            fk.ref_columns.push(ref_column);
        }
        None => table.foreign_keys.push(ForeignKey {
            name: fk_name.to_string(),
            columns: vec![col_name.to_string()],
            ref_schema: row.get_str(3)?.to_string(),
            ref_table: row.get_str(4)?.to_string(),
            ref_columns: vec![ref_column],
            on_delete: queries::referential_action(row.get_str(6)?).to_string(),
            on_update: queries::referential_action(row.get_str(7)?).to_string(),
        }),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemap::SemanticType;

    fn shop_catalog() -> Arc<MemoryCatalog> {
        Arc::new(
            MemoryCatalog::new()
                .with_table(
                    MemoryTable::new("public", "users")
                        .column("id", "int4", false)
                        .default_value("nextval('users_id_seq'::regclass)")
                        .column("name", "text", false)
                        .primary_key(&["id"]),
                )
                .with_table(
                    MemoryTable::new("public", "orders")
                        .column("id", "int4", false)
                        .column("user_id", "int4", false)
                        .column("total", "numeric", true)
                        .column("shape", "geometry", true)
                        .primary_key(&["id"])
                        .foreign_key("orders_user_id_fkey", &["user_id"], "users", &["id"])
                        .on_delete("c"),
                ),
        )
    }

    #[tokio::test]
    async fn test_introspect_maps_types_and_keys() {
        let introspector = SchemaIntrospector::new(shop_catalog(), Duration::from_secs(5));
        let schema = introspector
            .introspect_schema("public", &TableFilter::all())
            .await
            .unwrap();

        assert_eq!(schema.table_names(), vec!["users", "orders"]);

        let orders = schema.table("orders").unwrap();
        let names: Vec<&str> = orders.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "user_id", "total", "shape"]);
        assert_eq!(orders.columns[0].default, None);
        assert_eq!(
            schema.table("users").unwrap().columns[0].default.as_deref(),
            Some("nextval('users_id_seq'::regclass)")
        );
        assert_eq!(orders.primary_key, vec!["id"]);
        assert!(orders.columns[0].is_primary_key);
        assert!(orders.columns[1].is_foreign_key);
        assert_eq!(orders.columns[2].semantic_type, SemanticType::Numeric);
        assert!(orders.columns[2].is_nullable);

        let fk = &orders.foreign_keys[0];
        assert_eq!(fk.ref_table, "users");
        assert_eq!(fk.ref_columns, vec!["id"]);
        assert_eq!(fk.on_delete, "CASCADE");
        assert_eq!(fk.on_update, "NO ACTION");

        assert_eq!(orders.columns[3].semantic_type, SemanticType::Opaque);
        assert_eq!(schema.warnings.len(), 1);
        assert!(schema.warnings[0].contains("geometry"));
    }

    #[tokio::test]
    async fn test_introspect_is_idempotent() {
        let introspector = SchemaIntrospector::new(shop_catalog(), Duration::from_secs(5));
        let first = introspector
            .introspect_schema("public", &TableFilter::all())
            .await
            .unwrap();
        let second = introspector
            .introspect_schema("public", &TableFilter::all())
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_filter_applies_before_loading() {
        let introspector = SchemaIntrospector::new(shop_catalog(), Duration::from_secs(5));
        let filter = TableFilter::new(vec![], vec!["users".into()]);
        let schema = introspector.introspect_schema("public", &filter).await.unwrap();
        assert_eq!(schema.table_names(), vec!["orders"]);
    }

    #[tokio::test]
    async fn test_get_all_tables_unknown_namespace_is_empty() {
        let introspector = SchemaIntrospector::new(shop_catalog(), Duration::from_secs(5));
        assert!(introspector.get_all_tables("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inconsistent_catalog_is_fatal() {
        let catalog = Arc::new(MemoryCatalog::new().with_table(
            MemoryTable::new("public", "broken")
                .column("id", "int4", false)
                .primary_key(&["missing"]),
        ));
        let introspector = SchemaIntrospector::new(catalog, Duration::from_secs(5));
        let err = introspector
            .introspect_schema("public", &TableFilter::all())
            .await
            .unwrap_err();
        assert!(matches!(err, CodegenError::SchemaIntrospection(_)));
    }

    #[tokio::test]
    async fn test_closed_connector_surfaces_error() {
        let catalog = shop_catalog();
        catalog.close().await.unwrap();
        let introspector = SchemaIntrospector::new(catalog, Duration::from_secs(5));
        let err = introspector.get_all_tables("public").await.unwrap_err();
        assert!(matches!(err, CodegenError::Connectivity { .. }));
    }

    #[tokio::test]
    async fn test_lost_connection_is_connectivity_error() {
        let catalog = Arc::new(
            MemoryCatalog::new()
                .with_table(MemoryTable::new("public", "users").column("id", "int4", false))
                .with_query_fault(QueryFault::ConnectionLost),
        );
        let introspector = SchemaIntrospector::new(catalog, Duration::from_secs(5));
        let err = introspector
            .introspect_schema("public", &TableFilter::all())
            .await
            .unwrap_err();
        assert!(matches!(err, CodegenError::Connectivity { .. }), "got {err}");
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_rejected_query_is_query_error() {
        let catalog = Arc::new(
            MemoryCatalog::new()
                .with_table(MemoryTable::new("public", "users").column("id", "int4", false))
                .with_query_fault(QueryFault::Rejected),
        );
        let introspector = SchemaIntrospector::new(catalog, Duration::from_secs(5));
        let err = introspector.get_all_tables("public").await.unwrap_err();
        assert!(matches!(err, CodegenError::Query(_)), "got {err}");
        assert_eq!(err.exit_code(), 1);
    }
}
