//! Generation orchestrator - turns a schema into files.
//!
//! Jobs are dispatched to a bounded pool of tokio tasks. Each finished job
//! sends its [`JobOutcome`] over a channel to a single aggregator task, which
//! is the only writer of the report and the incremental manifest.

mod report;

pub use report::{GenerationReport, JobOutcome, JobStatus, NamespaceFailure};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MockProvider};
use crate::core::Schema;
use crate::error::{CodegenError, Result};
use crate::metrics::{Metrics, Operation};
use crate::migration;
use crate::pipeline::{job_fingerprint, plan_jobs, GenerationJob, RenderContext};
use crate::source::{SchemaIntrospector, TableFilter};
use crate::state::{GenerationManifest, ManifestEntry};
use crate::template::{TemplateCache, TemplateSet};

/// Generation orchestrator.
pub struct Orchestrator {
    config: Arc<Config>,
    cache: Arc<TemplateCache>,
    templates: Arc<TemplateSet>,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        cache: Arc<TemplateCache>,
        templates: Arc<TemplateSet>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            cache,
            templates,
            metrics,
        }
    }

    /// Ordered job list for a schema.
    pub fn plan(&self, schema: &Schema, namespaced: bool) -> Result<Vec<GenerationJob>> {
        plan_jobs(
            schema,
            &self.config.generation.enabled_artifacts(),
            &self.config.output,
            namespaced,
        )
    }

    fn load_manifest(&self) -> GenerationManifest {
        let key = self.config.manifest_key();
        if self.config.generation.incremental {
            GenerationManifest::load_or_default(&self.config.generation.manifest_path, &key)
        } else {
            GenerationManifest::new(key)
        }
    }

    fn save_manifest(&self, manifest: &mut GenerationManifest, run_id: &str) {
        if let Err(e) = manifest.save(&self.config.generation.manifest_path, run_id) {
            warn!(
                path = %self.config.generation.manifest_path.display(),
                error = %e,
                "Failed to save manifest, next incremental run will regenerate everything"
            );
        }
    }

    /// Generate every artifact for one schema.
    ///
    /// Returns `Err` only when planning fails; job failures are recorded in
    /// the report.
    pub async fn generate(
        &self,
        schema: Arc<Schema>,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GenerationReport> {
        let previous = self.load_manifest();
        let namespace = schema.namespace.clone();
        let (mut report, mut manifest) = self
            .execute(schema, false, previous, run_id, cancel)
            .await?;

        manifest.retain_namespaces(&[namespace]);
        self.save_manifest(&mut manifest, run_id);
        self.finish(&mut report);
        Ok(report)
    }

    /// Introspect and generate each namespace in turn.
    ///
    /// A namespace that fails to introspect or plan is recorded and skipped;
    /// the others still run. Paths carry a namespace segment.
    pub async fn generate_all(
        &self,
        introspector: &SchemaIntrospector,
        namespaces: &[String],
        filter: &TableFilter,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GenerationReport> {
        let mut report = GenerationReport::new(run_id);
        let mut manifest = self.load_manifest();

        for namespace in namespaces {
            if cancel.is_cancelled() {
                info!("Cancellation requested, skipping remaining namespaces");
                report.cancelled = true;
                break;
            }
            report.namespaces.push(namespace.clone());

            let schema = match self
                .metrics
                .observe(
                    Operation::Introspect,
                    introspector.introspect_schema(namespace, filter),
                )
                .await
            {
                Ok(schema) => Arc::new(schema),
                Err(e) => {
                    error!(namespace = %namespace, error = %e, "Namespace introspection failed");
                    report.record_namespace_failure(namespace, &e);
                    continue;
                }
            };

            match self
                .execute(schema, true, manifest.clone(), run_id, cancel)
                .await
            {
                Ok((ns_report, ns_manifest)) => {
                    manifest = ns_manifest;
                    report.merge(ns_report);
                }
                Err(e) => {
                    error!(namespace = %namespace, error = %e, "Namespace planning failed");
                    report.record_namespace_failure(namespace, &e);
                }
            }
        }

        manifest.retain_namespaces(namespaces);
        self.save_manifest(&mut manifest, run_id);
        self.finish(&mut report);
        Ok(report)
    }

    fn finish(&self, report: &mut GenerationReport) {
        report.cache = self.cache.stats();
        self.metrics.record_cache(&report.cache);
        report.finish();

        info!(
            status = %report.status,
            written = report.files_written,
            skipped = report.files_skipped,
            failed = report.error_count,
            duration_seconds = report.duration_seconds,
            "Generation {}: {} written, {} skipped, {} failed",
            report.status,
            report.files_written,
            report.files_skipped,
            report.error_count
        );
    }

    /// Plan, dispatch and aggregate one schema. `manifest` is the state
    /// before this schema ran; the returned one includes its outcomes.
    async fn execute(
        &self,
        schema: Arc<Schema>,
        namespaced: bool,
        manifest: GenerationManifest,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(GenerationReport, GenerationManifest)> {
        let jobs = self.plan(&schema, namespaced)?;
        let planned: Vec<PathBuf> = jobs.iter().map(|j| j.output_path.clone()).collect();
        let workers = self.config.generation.get_workers();
        let semaphore = Arc::new(Semaphore::new(workers));

        let mut report = GenerationReport::new(run_id);
        report.namespaces.push(schema.namespace.clone());
        report.tables_processed = schema.tables.len();
        report.jobs_total = jobs.len();

        info!(
            namespace = %schema.namespace,
            tables = schema.tables.len(),
            jobs = jobs.len(),
            workers,
            "Dispatching generation jobs"
        );

        let worker = JobWorker {
            schema: schema.clone(),
            cache: self.cache.clone(),
            templates: self.templates.clone(),
            metrics: self.metrics.clone(),
            previous: Arc::new(manifest.clone()),
            mock_provider: self.config.output.mock_provider,
            emit_directive: self.config.generation.emit_generate_directives,
            skip_unchanged: self.config.generation.incremental && !self.config.generation.force,
        };

        let (tx, rx) = mpsc::channel::<JobOutcome>(workers * 2);
        let aggregator = tokio::spawn(aggregate(rx, report, manifest));

        let mut handles: Vec<(GenerationJob, JoinHandle<()>)> = Vec::with_capacity(jobs.len());
        let mut cancelled = false;

        for job in jobs {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let permit = tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => {
                        cancelled = true;
                        break;
                    }
                },
            };

            let worker = worker.clone();
            let tx = tx.clone();
            let spawned = job.clone();
            let handle = tokio::spawn(async move {
                let outcome = worker.run(spawned).await;
                drop(permit);
                // The receiver lives until every sender is dropped.
                let _ = tx.send(outcome).await;
            });
            handles.push((job, handle));
        }

        if cancelled {
            info!("Cancellation requested, waiting for started jobs");
        }

        for (job, handle) in handles {
            if let Err(e) = handle.await {
                error!(job = %job.label(), "Generation task panicked: {}", e);
                let outcome = failed_outcome(&job, format!("task panicked: {}", e));
                let _ = tx.send(outcome).await;
            }
        }
        drop(tx);

        let (mut report, mut manifest) = aggregator
            .await
            .map_err(|e| CodegenError::Internal(format!("result aggregator failed: {}", e)))?;
        report.cancelled = cancelled;

        let pruned = manifest.prune(&schema.namespace, &planned);
        if pruned > 0 {
            debug!(namespace = %schema.namespace, pruned, "Dropped stale manifest entries");
        }

        if self.config.generation.generate_migrations && !cancelled {
            match migration::write_script(&schema, &self.config.output.migrations_dir) {
                Ok(path) => report.migrations.push(path),
                Err(e) => warn!(
                    namespace = %schema.namespace,
                    error = %e,
                    "Migration script not written"
                ),
            }
        }

        Ok((report, manifest))
    }
}

/// Single writer for the report and manifest.
async fn aggregate(
    mut rx: mpsc::Receiver<JobOutcome>,
    mut report: GenerationReport,
    mut manifest: GenerationManifest,
) -> (GenerationReport, GenerationManifest) {
    while let Some(outcome) = rx.recv().await {
        match outcome.status {
            JobStatus::Written => {
                if let Some(fingerprint) = &outcome.fingerprint {
                    manifest.record(
                        &outcome.path,
                        ManifestEntry {
                            fingerprint: fingerprint.clone(),
                            namespace: outcome.namespace.clone(),
                            table: outcome.table.clone(),
                            artifact: outcome.artifact,
                            bytes: outcome.bytes,
                        },
                    );
                }
            }
            JobStatus::Skipped => {}
            JobStatus::Failed => manifest.forget(&outcome.path),
        }
        report.record(outcome);
    }
    (report, manifest)
}

fn failed_outcome(job: &GenerationJob, error: String) -> JobOutcome {
    JobOutcome {
        seq: job.seq,
        namespace: job.namespace.clone(),
        table: job.table.clone(),
        artifact: job.kind,
        path: job.output_path.clone(),
        status: JobStatus::Failed,
        bytes: 0,
        fingerprint: None,
        error: Some(error),
    }
}

/// Everything a spawned job needs, cheap to clone.
#[derive(Clone)]
struct JobWorker {
    schema: Arc<Schema>,
    cache: Arc<TemplateCache>,
    templates: Arc<TemplateSet>,
    metrics: Arc<Metrics>,
    previous: Arc<GenerationManifest>,
    mock_provider: MockProvider,
    emit_directive: bool,
    skip_unchanged: bool,
}

impl JobWorker {
    async fn run(&self, job: GenerationJob) -> JobOutcome {
        match self.try_run(&job).await {
            Ok((status, bytes, fingerprint)) => {
                debug!(job = %job.label(), ?status, bytes, "Job finished");
                JobOutcome {
                    seq: job.seq,
                    namespace: job.namespace,
                    table: job.table,
                    artifact: job.kind,
                    path: job.output_path,
                    status,
                    bytes,
                    fingerprint: Some(fingerprint),
                    error: None,
                }
            }
            Err(e) => {
                error!(job = %job.label(), error = %e, "Job failed");
                failed_outcome(&job, e.to_string())
            }
        }
    }

    async fn try_run(&self, job: &GenerationJob) -> Result<(JobStatus, u64, String)> {
        let table = self.schema.tables.get(job.table_index).ok_or_else(|| {
            CodegenError::render(job.kind.as_str(), format!("unknown table {}", job.table))
        })?;
        let source = self.templates.get(job.kind).ok_or_else(|| {
            CodegenError::render(job.kind.as_str(), "no template for artifact kind")
        })?;

        let started = Instant::now();
        let rendered = self.cache.get_template(&source.name, &source.content).and_then(|compiled| {
            let context =
                RenderContext::new(table, job.kind, self.mock_provider, self.emit_directive);
            let fingerprint = job_fingerprint(compiled.fingerprint(), &context)?;
            if self.skip_unchanged && self.previous.is_fresh(&job.output_path, &fingerprint) {
                return Ok((None, fingerprint));
            }
            let bytes = self.cache.execute_template(&compiled, &context)?;
            Ok((Some(bytes), fingerprint))
        });
        let (bytes, fingerprint) = match rendered {
            Ok(r) => {
                self.metrics.record_success(Operation::Render, started.elapsed());
                r
            }
            Err(e) => {
                self.metrics.record_failure(Operation::Render, started.elapsed());
                return Err(e);
            }
        };

        let Some(bytes) = bytes else {
            debug!(job = %job.label(), "Unchanged, skipping");
            return Ok((JobStatus::Skipped, 0, fingerprint));
        };

        let started = Instant::now();
        match write_atomic(&job.output_path, &bytes).await {
            Ok(()) => self.metrics.record_success(Operation::Write, started.elapsed()),
            Err(e) => {
                self.metrics.record_failure(Operation::Write, started.elapsed());
                return Err(e);
            }
        }
        Ok((JobStatus::Written, bytes.len() as u64, fingerprint))
    }
}

/// Write through a sibling temp file and rename, so readers never see a
/// partial artifact.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let wrap = |source| CodegenError::FilesystemWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(wrap)?;
    }
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    tokio::fs::write(&temp_path, bytes).await.map_err(wrap)?;
    tokio::fs::rename(&temp_path, path).await.map_err(wrap)?;
    Ok(())
}
