//! Metadata connector abstraction.
//!
//! The introspector only needs to ping the catalog and run parametrized
//! read-only queries, so a connector is a small trait over whatever pool
//! backs it. Every catalog query casts its output columns to text, which
//! lets rows travel as [`CatalogRow`] regardless of the driver.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{CodegenError, Result};

/// A catalog result row with text-typed cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRow {
    pub values: Vec<Option<String>>,
}

impl CatalogRow {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    /// Build a row from non-null cells.
    pub fn from_strs(values: &[&str]) -> Self {
        Self {
            values: values.iter().map(|v| Some(v.to_string())).collect(),
        }
    }

    /// Nullable cell at `idx`.
    pub fn get_opt(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).and_then(|v| v.as_deref())
    }

    /// Required text cell at `idx`.
    pub fn get_str(&self, idx: usize) -> Result<&str> {
        self.get_opt(idx).ok_or_else(|| {
            CodegenError::Query(format!(
                "expected non-null text in column {} of catalog row",
                idx
            ))
        })
    }

    /// Boolean cell; accepts the spellings PostgreSQL produces for `::text` casts.
    pub fn get_bool(&self, idx: usize) -> Result<bool> {
        match self.get_str(idx)? {
            "t" | "true" | "YES" | "yes" | "1" => Ok(true),
            "f" | "false" | "NO" | "no" | "0" => Ok(false),
            other => Err(CodegenError::Query(format!(
                "column {} is not a boolean: '{}'",
                idx, other
            ))),
        }
    }

    /// Optional integer cell.
    pub fn get_i32(&self, idx: usize) -> Result<Option<i32>> {
        match self.get_opt(idx) {
            None => Ok(None),
            Some(s) => s.parse::<i32>().map(Some).map_err(|_| {
                CodegenError::Query(format!("column {} is not an integer: '{}'", idx, s))
            }),
        }
    }
}

/// Connection pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    /// Connections currently open.
    pub total: usize,
    /// Open connections not checked out.
    pub idle: usize,
    /// Connections checked out right now.
    pub acquired: usize,
    /// Pool capacity.
    pub max_size: usize,
    /// Acquisitions since the pool was created.
    pub acquire_count: u64,
    /// Mean time spent waiting for a connection.
    pub avg_acquire_latency: Duration,
}

/// Read-only access to a relational catalog.
#[async_trait]
pub trait MetadataConnector: Send + Sync {
    /// Round-trip probe.
    async fn ping(&self) -> Result<()>;

    /// Run a parametrized catalog query. Parameters bind as text.
    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<CatalogRow>>;

    /// Run a query expected to return at most one row.
    async fn query_row(&self, sql: &str, params: &[&str]) -> Result<Option<CatalogRow>> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    /// Pool statistics snapshot.
    fn stats(&self) -> PoolStats;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Close all connections.
    async fn close(&self) -> Result<()>;
}
