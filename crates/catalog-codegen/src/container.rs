//! Composition root.
//!
//! Builds the dependency graph once, in order: root span, metrics, catalog
//! connection (with bounded retry), introspector, template cache,
//! orchestrator. Nothing is global; every component receives what it needs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument, Span};

use crate::config::Config;
use crate::core::{MetadataConnector, PoolStats, Schema};
use crate::error::{CodegenError, Result};
use crate::metrics::{Metrics, MetricsSnapshot, Operation};
use crate::orchestrator::{GenerationReport, Orchestrator};
use crate::retry::{retry, with_timeout, RetryPolicy};
use crate::source::{PgConnector, SchemaIntrospector, TableFilter};
use crate::template::{CacheStats, TemplateCache, TemplateSet};

/// Health probe result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub run_id: String,
    pub db_type: String,
    pub latency_ms: u64,
    pub pool: PoolStats,
    pub cache: CacheStats,
    pub metrics: MetricsSnapshot,
}

/// Owns every long-lived component of a run.
pub struct Container {
    config: Arc<Config>,
    run_id: String,
    span: Span,
    metrics: Arc<Metrics>,
    connector: Mutex<Option<Arc<dyn MetadataConnector>>>,
    introspector: SchemaIntrospector,
    filter: TableFilter,
    cache: Arc<TemplateCache>,
    orchestrator: Orchestrator,
    cancel: CancellationToken,
}

impl Container {
    /// Build against PostgreSQL.
    pub async fn build(config: Config, cancel: CancellationToken) -> Result<Self> {
        Self::build_with(config, cancel, |config| {
            let connector: Arc<dyn MetadataConnector> = Arc::new(PgConnector::new(&config.source)?);
            Ok(connector)
        })
        .await
    }

    /// Build with a caller-supplied connector.
    pub async fn build_with<F>(config: Config, cancel: CancellationToken, connect: F) -> Result<Self>
    where
        F: FnOnce(&Config) -> Result<Arc<dyn MetadataConnector>>,
    {
        config.validate()?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("catalog_codegen", run_id = %run_id);
        let metrics = Arc::new(Metrics::new());
        let config = Arc::new(config);

        let connector = connect(&config)?;
        Self::connect(&config, &connector, &metrics, &cancel)
            .instrument(span.clone())
            .await?;

        let introspector = SchemaIntrospector::new(
            connector.clone(),
            Duration::from_secs(config.source.query_timeout_secs),
        );
        let filter = TableFilter::from(&config.tables);

        let cache = Arc::new(TemplateCache::new(config.generation.cache_capacity));
        let templates = match Self::load_templates(&config, &cache, &metrics)
            .instrument(span.clone())
            .await
        {
            Ok(templates) => templates,
            Err(e) => {
                release(connector.as_ref(), "template load failure").await;
                return Err(e);
            }
        };

        let orchestrator = Orchestrator::new(
            config.clone(),
            cache.clone(),
            templates,
            metrics.clone(),
        );

        span.in_scope(|| info!(db_type = connector.db_type(), "Container ready"));

        Ok(Self {
            config,
            run_id,
            span,
            metrics,
            connector: Mutex::new(Some(connector)),
            introspector,
            filter,
            cache,
            orchestrator,
            cancel,
        })
    }

    async fn load_templates(
        config: &Config,
        cache: &TemplateCache,
        metrics: &Metrics,
    ) -> Result<Arc<TemplateSet>> {
        let templates = Arc::new(TemplateSet::load(&config.output)?);
        if config.generation.optimize_templates {
            metrics
                .observe(Operation::Precompile, async {
                    cache.precompile_templates(templates.sources())
                })
                .await?;
        }
        Ok(templates)
    }

    /// Ping until the source answers or attempts run out.
    async fn connect(
        config: &Config,
        connector: &Arc<dyn MetadataConnector>,
        metrics: &Metrics,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let policy = RetryPolicy::fixed(
            config.source.connect_attempts,
            Duration::from_millis(config.source.connect_retry_delay_ms),
        )
        .with_attempt_timeout(Duration::from_secs(config.source.connect_timeout_secs));

        let mut attempts = 0;
        let result = metrics
            .observe(
                Operation::Connect,
                retry(&policy, "connect", cancel, |attempt| {
                    attempts = attempt;
                    let connector = connector.clone();
                    async move { connector.ping().await }
                }),
            )
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                release(connector.as_ref(), "connect failure").await;
                match e {
                    CodegenError::Cancelled | CodegenError::Config(_) => Err(e),
                    CodegenError::Connectivity { source, .. } => {
                        Err(CodegenError::Connectivity { attempts, source })
                    }
                    other => Err(CodegenError::Connectivity {
                        attempts,
                        source: Box::new(other),
                    }),
                }
            }
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Schema of every configured namespace, filtered.
    pub async fn introspect(&self) -> Result<Vec<Schema>> {
        let mut schemas = Vec::new();
        for namespace in self.config.namespaces() {
            let schema = self
                .metrics
                .observe(
                    Operation::Introspect,
                    self.introspector.introspect_schema(&namespace, &self.filter),
                )
                .instrument(self.span.clone())
                .await?;
            schemas.push(schema);
        }
        Ok(schemas)
    }

    /// Filtered table names of one namespace, in catalog order.
    pub async fn tables(&self, namespace: &str) -> Result<Vec<String>> {
        let names = self
            .introspector
            .get_all_tables(namespace)
            .instrument(self.span.clone())
            .await?;
        Ok(self.filter.apply(&names))
    }

    /// Introspect, then generate every artifact.
    ///
    /// Job failures are in the report (see [`GenerationReport::error`]);
    /// `Err` means the run could not start.
    pub async fn run(&self) -> Result<GenerationReport> {
        let started = Instant::now();
        let result = self.run_inner().instrument(self.span.clone()).await;

        match &result {
            Ok(report) if report.is_success() => {
                self.metrics.record_success(Operation::Generate, started.elapsed())
            }
            _ => self.metrics.record_failure(Operation::Generate, started.elapsed()),
        }
        result
    }

    async fn run_inner(&self) -> Result<GenerationReport> {
        if self.config.generation.cross_schema {
            return self
                .orchestrator
                .generate_all(
                    &self.introspector,
                    &self.config.namespaces(),
                    &self.filter,
                    &self.run_id,
                    &self.cancel,
                )
                .await;
        }

        let namespace = &self.config.source.schema;
        let schema = self
            .metrics
            .observe(
                Operation::Introspect,
                self.introspector.introspect_schema(namespace, &self.filter),
            )
            .await?;
        if self.cancel.is_cancelled() {
            return Err(CodegenError::Cancelled);
        }
        self.orchestrator
            .generate(Arc::new(schema), &self.run_id, &self.cancel)
            .await
    }

    /// Probe the catalog connection.
    pub async fn health(&self) -> Result<HealthReport> {
        let connector = self.connector.lock().clone();
        let timeout = Duration::from_secs(self.config.source.connect_timeout_secs);

        self.metrics
            .observe(Operation::HealthCheck, async move {
                let connector = connector.ok_or_else(|| {
                    CodegenError::ServiceUnavailable("connection pool is not initialized".into())
                })?;

                let started = Instant::now();
                with_timeout("health check", timeout, connector.ping())
                    .await
                    .map_err(|e| CodegenError::ServiceUnavailable(format!("probe failed: {}", e)))?;

                Ok(HealthReport {
                    status: "ok".to_string(),
                    run_id: self.run_id.clone(),
                    db_type: connector.db_type().to_string(),
                    latency_ms: started.elapsed().as_millis() as u64,
                    pool: connector.stats(),
                    cache: self.cache.stats(),
                    metrics: self.metrics.snapshot(),
                })
            })
            .instrument(self.span.clone())
            .await
    }

    /// Release everything. Errors from each step are collected, not
    /// short-circuited. A second call is a no-op.
    pub async fn close(&self) -> Result<()> {
        let connector = self.connector.lock().take();
        self.metrics
            .observe(Operation::Close, async move {
                let mut errors = Vec::new();
                if let Some(connector) = connector {
                    if let Err(e) = connector.close().await {
                        errors.push(e);
                    }
                }
                self.cache.clear_cache();
                CodegenError::aggregate("container teardown", errors)
            })
            .instrument(self.span.clone())
            .await
    }
}

async fn release(connector: &dyn MetadataConnector, after: &str) {
    if let Err(e) = connector.close().await {
        warn!(error = %e, "Failed to release connector after {}", after);
    }
}
