//! PostgreSQL metadata connector backed by deadpool-postgres.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use super::tls::catalog_connector;
use crate::config::SourceConfig;
use crate::core::{CatalogRow, MetadataConnector, PoolStats};
use crate::error::{CodegenError, Result};
use crate::retry::with_timeout;

/// Pooled PostgreSQL catalog connection.
pub struct PgConnector {
    pool: Pool,
    query_timeout: Duration,
    acquire_count: AtomicU64,
    acquire_nanos: AtomicU64,
}

impl PgConnector {
    /// Build the pool. No connection is opened until the first ping or query.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let mut pg_config: PgConfig = config
            .connection_string
            .parse()
            .map_err(|e| CodegenError::Config(format!("invalid connection_string: {}", e)))?;
        pg_config.connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        pg_config.application_name("catalog-codegen");

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let pool = match catalog_connector(config)? {
            None => {
                warn!("Catalog TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .build()
                    .map_err(|e| CodegenError::pool(e, "creating catalog pool"))?
            }
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .build()
                    .map_err(|e| CodegenError::pool(e, "creating catalog pool"))?
            }
        };

        info!(
            max_connections = config.max_connections,
            ssl_mode = %config.ssl_mode,
            "Catalog pool created"
        );

        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            acquire_count: AtomicU64::new(0),
            acquire_nanos: AtomicU64::new(0),
        })
    }

    async fn get_client(&self, context: &str) -> Result<Object> {
        let started = Instant::now();
        let client = with_timeout("acquire catalog connection", self.query_timeout, async {
            self.pool
                .get()
                .await
                .map_err(|e| CodegenError::connection_lost(e, context.to_string()))
        })
        .await?;

        self.acquire_count.fetch_add(1, Ordering::Relaxed);
        self.acquire_nanos
            .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);
        Ok(client)
    }
}

#[async_trait]
impl MetadataConnector for PgConnector {
    async fn ping(&self) -> Result<()> {
        let client = self.get_client("ping").await?;
        with_timeout("ping", self.query_timeout, async {
            client
                .simple_query("SELECT 1")
                .await
                .map_err(|e| driver_error(e, "ping"))?;
            Ok(())
        })
        .await
    }

    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<CatalogRow>> {
        let client = self.get_client("catalog query").await?;
        let bound: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = with_timeout("catalog query", self.query_timeout, async {
            client
                .query(sql, &bound)
                .await
                .map_err(|e| driver_error(e, "catalog query"))
        })
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(row.len());
            for idx in 0..row.len() {
                let value = row.try_get::<_, Option<String>>(idx).map_err(|e| {
                    CodegenError::Query(format!("catalog row column {}: {}", idx, e))
                })?;
                values.push(value);
            }
            out.push(CatalogRow::new(values));
        }

        debug!(rows = out.len(), "Catalog query returned");
        Ok(out)
    }

    fn stats(&self) -> PoolStats {
        let status = self.pool.status();
        let acquire_count = self.acquire_count.load(Ordering::Relaxed);
        let avg_nanos = self
            .acquire_nanos
            .load(Ordering::Relaxed)
            .checked_div(acquire_count)
            .unwrap_or(0);

        PoolStats {
            total: status.size,
            idle: status.available,
            acquired: status.size.saturating_sub(status.available),
            max_size: status.max_size,
            acquire_count,
            avg_acquire_latency: Duration::from_nanos(avg_nanos),
        }
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) -> Result<()> {
        self.pool.close();
        Ok(())
    }
}

/// Split driver failures into lost connections and rejected queries.
fn driver_error(err: tokio_postgres::Error, context: &str) -> CodegenError {
    if let Some(state) = err.code() {
        if is_connection_state(state.code()) {
            return CodegenError::connection_lost(err, context);
        }
        return CodegenError::Query(format!("{}: SQLSTATE {}: {}", context, state.code(), err));
    }

    let io_failure = std::error::Error::source(&err).is_some_and(|s| s.is::<std::io::Error>());
    if err.is_closed() || io_failure {
        CodegenError::connection_lost(err, context)
    } else {
        CodegenError::Query(format!("{}: {}", context, err))
    }
}

/// Class 08 (connection exception) and the 57P0x shutdown codes.
fn is_connection_state(sqlstate: &str) -> bool {
    sqlstate.starts_with("08") || matches!(sqlstate, "57P01" | "57P02" | "57P03")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_states() {
        assert!(is_connection_state("08006"));
        assert!(is_connection_state("08001"));
        assert!(is_connection_state("57P01"));
        assert!(!is_connection_state("42601"));
        assert!(!is_connection_state("42P01"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connectivity() {
        let config = SourceConfig {
            connection_string: "host=127.0.0.1 port=1 user=app dbname=shop".into(),
            ssl_mode: "disable".into(),
            connect_timeout_secs: 2,
            query_timeout_secs: 2,
            ..SourceConfig::default()
        };
        let connector = PgConnector::new(&config).unwrap();

        let err = connector.query("SELECT 1", &[]).await.unwrap_err();
        assert!(
            matches!(err, CodegenError::Connectivity { .. } | CodegenError::Timeout { .. }),
            "unexpected error: {err}"
        );
        assert_eq!(err.exit_code(), 3);
    }
}
