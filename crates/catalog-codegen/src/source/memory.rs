//! In-memory catalog connector.
//!
//! Answers the introspector's catalog queries from tables registered in
//! code, so the whole pipeline runs without a database. Pings can be made
//! to fail a fixed number of times to exercise connection retry, and a
//! query fault can be armed to stand in for a dropped connection or a
//! rejected statement.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::queries;
use crate::core::{CatalogRow, MetadataConnector, PoolStats};
use crate::error::{CodegenError, Result};

/// A table as the catalog would describe it.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    schema: String,
    name: String,
    columns: Vec<MemoryColumn>,
    primary_key: Vec<String>,
    foreign_keys: Vec<MemoryForeignKey>,
}

#[derive(Debug, Clone)]
struct MemoryColumn {
    name: String,
    udt_name: String,
    nullable: bool,
    default: Option<String>,
}

#[derive(Debug, Clone)]
struct MemoryForeignKey {
    name: String,
    columns: Vec<String>,
    ref_schema: String,
    ref_table: String,
    ref_columns: Vec<String>,
    on_delete: String,
}

impl MemoryTable {
    pub fn new(schema: &str, name: &str) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Append a column; `udt_name` is the PostgreSQL internal type name.
    pub fn column(mut self, name: &str, udt_name: &str, nullable: bool) -> Self {
        self.columns.push(MemoryColumn {
            name: name.to_string(),
            udt_name: udt_name.to_string(),
            nullable,
            default: None,
        });
        self
    }

    /// Set the default expression of the last added column.
    pub fn default_value(mut self, expr: &str) -> Self {
        if let Some(col) = self.columns.last_mut() {
            col.default = Some(expr.to_string());
        }
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn foreign_key(
        mut self,
        name: &str,
        columns: &[&str],
        ref_table: &str,
        ref_columns: &[&str],
    ) -> Self {
        let ref_schema = self.schema.clone();
        self.foreign_keys.push(MemoryForeignKey {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ref_schema,
            ref_table: ref_table.to_string(),
            ref_columns: ref_columns.iter().map(|c| c.to_string()).collect(),
            on_delete: "a".to_string(),
        });
        self
    }

    /// Set ON DELETE of the last added foreign key (catalog action code).
    pub fn on_delete(mut self, code: &str) -> Self {
        if let Some(fk) = self.foreign_keys.last_mut() {
            fk.on_delete = code.to_string();
        }
        self
    }
}

/// Failure returned by the next catalog query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFault {
    /// The server went away mid-query.
    ConnectionLost,
    /// The server rejected the statement.
    Rejected,
}

/// Catalog connector over in-process table definitions.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: RwLock<Vec<MemoryTable>>,
    query_fault: Mutex<Option<QueryFault>>,
    ping_failures: AtomicU32,
    pings: AtomicU32,
    queries: AtomicU64,
    closed: AtomicBool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Registration order is catalog order.
    pub fn with_table(self, table: MemoryTable) -> Self {
        self.tables.write().push(table);
        self
    }

    /// Make the next `n` pings fail with a pool error.
    pub fn with_failing_pings(self, n: u32) -> Self {
        self.fail_pings(n);
        self
    }

    /// Make the next `n` pings fail, on a catalog already in use.
    pub fn fail_pings(&self, n: u32) {
        self.ping_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next query with `fault`.
    pub fn with_query_fault(self, fault: QueryFault) -> Self {
        *self.query_fault.lock() = Some(fault);
        self
    }

    /// Pings attempted so far.
    pub fn ping_count(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CodegenError::connection_lost("pool is closed", "memory catalog"));
        }
        Ok(())
    }

    fn rows_for(&self, sql: &str, namespace: &str) -> Result<Vec<CatalogRow>> {
        let tables = self.tables.read();
        let in_ns = tables.iter().filter(|t| t.schema == namespace);

        let rows = if sql == queries::TABLES {
            in_ns.map(|t| CatalogRow::from_strs(&[t.name.as_str()])).collect()
        } else if sql == queries::COLUMNS {
            in_ns
                .flat_map(|t| {
                    t.columns.iter().enumerate().map(move |(i, c)| {
                        let data_type = if c.udt_name.starts_with('_') {
                            "ARRAY".to_string()
                        } else {
                            c.udt_name.clone()
                        };
                        CatalogRow::new(vec![
                            Some(t.name.clone()),
                            Some(c.name.clone()),
                            Some(c.udt_name.clone()),
                            Some(data_type),
                            Some(if c.nullable { "YES" } else { "NO" }.to_string()),
                            Some((i + 1).to_string()),
                            c.default.clone(),
                            None,
                            None,
                            None,
                        ])
                    })
                })
                .collect()
        } else if sql == queries::PRIMARY_KEYS {
            in_ns
                .flat_map(|t| {
                    t.primary_key
                        .iter()
                        .map(move |c| CatalogRow::from_strs(&[t.name.as_str(), c.as_str()]))
                })
                .collect()
        } else if sql == queries::FOREIGN_KEYS {
            in_ns
                .flat_map(|t| {
                    t.foreign_keys.iter().flat_map(move |fk| {
                        fk.columns
                            .iter()
                            .zip(fk.ref_columns.iter())
                            .map(move |(col, ref_col)| {
                                CatalogRow::from_strs(&[
                                    t.name.as_str(),
                                    fk.name.as_str(),
                                    col.as_str(),
                                    fk.ref_schema.as_str(),
                                    fk.ref_table.as_str(),
                                    ref_col.as_str(),
                                    fk.on_delete.as_str(),
                                    "a",
                                ])
                            })
                    })
                })
                .collect()
        } else {
            return Err(CodegenError::Query(format!(
                "memory catalog cannot answer query: {}",
                sql.trim()
            )));
        };

        Ok(rows)
    }
}

#[async_trait]
impl MetadataConnector for MemoryCatalog {
    async fn ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;

        let remaining = self.ping_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.ping_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CodegenError::pool("connection refused", "ping"));
        }
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<CatalogRow>> {
        self.ensure_open()?;
        if let Some(fault) = self.query_fault.lock().take() {
            return Err(match fault {
                QueryFault::ConnectionLost => {
                    CodegenError::connection_lost("server closed the connection", "catalog query")
                }
                QueryFault::Rejected => {
                    CodegenError::Query("catalog query: SQLSTATE 42601: syntax error".into())
                }
            });
        }
        self.queries.fetch_add(1, Ordering::SeqCst);

        let namespace = params
            .first()
            .ok_or_else(|| CodegenError::Query("missing namespace parameter".into()))?;
        self.rows_for(sql, namespace)
    }

    fn stats(&self) -> PoolStats {
        let open = usize::from(!self.closed.load(Ordering::SeqCst));
        PoolStats {
            total: open,
            idle: open,
            acquired: 0,
            max_size: 1,
            acquire_count: self.queries.load(Ordering::SeqCst),
            avg_acquire_latency: Duration::ZERO,
        }
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_failures_then_success() {
        let catalog = MemoryCatalog::new().with_failing_pings(2);
        assert!(catalog.ping().await.is_err());
        assert!(catalog.ping().await.is_err());
        assert!(catalog.ping().await.is_ok());
        assert_eq!(catalog.ping_count(), 3);
    }

    #[tokio::test]
    async fn test_answers_catalog_queries() {
        let catalog = MemoryCatalog::new()
            .with_table(
                MemoryTable::new("public", "users")
                    .column("id", "int4", false)
                    .column("tags", "_text", true)
                    .primary_key(&["id"]),
            )
            .with_table(MemoryTable::new("other", "ignored").column("id", "int4", false));

        let tables = catalog.query(queries::TABLES, &["public"]).await.unwrap();
        assert_eq!(tables, vec![CatalogRow::from_strs(&["users"])]);

        let columns = catalog.query(queries::COLUMNS, &["public"]).await.unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[1].get_str(3).unwrap(), "ARRAY");
        assert_eq!(columns[1].get_str(5).unwrap(), "2");

        assert!(catalog.query("SELECT now()", &["public"]).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_catalog_rejects_calls() {
        let catalog = MemoryCatalog::new();
        catalog.close().await.unwrap();
        assert!(catalog.ping().await.is_err());
        assert_eq!(catalog.stats().total, 0);
    }

    #[tokio::test]
    async fn test_query_fault_fires_once() {
        let catalog = MemoryCatalog::new().with_query_fault(QueryFault::Rejected);
        assert!(matches!(
            catalog.query(queries::TABLES, &["public"]).await,
            Err(CodegenError::Query(_))
        ));
        assert!(catalog.query(queries::TABLES, &["public"]).await.is_ok());
    }
}
