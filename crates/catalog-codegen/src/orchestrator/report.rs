//! Run report.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CodegenError, JobFailure, Result};
use crate::pipeline::ArtifactKind;
use crate::template::CacheStats;

/// Outcome of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Written,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub seq: usize,
    pub namespace: String,
    pub table: String,
    pub artifact: ArtifactKind,
    pub path: PathBuf,
    pub status: JobStatus,
    pub bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A namespace whose introspection or planning failed before any job ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceFailure {
    pub namespace: String,
    pub error: String,
}

/// Result of a generation run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// "completed", "partial", "failed" or "cancelled".
    pub status: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    pub namespaces: Vec<String>,
    pub tables_processed: usize,
    pub jobs_total: usize,
    pub files_written: usize,
    pub files_skipped: usize,
    pub bytes_written: u64,
    pub error_count: usize,

    /// Failing (table, artifact) pairs in plan order.
    pub failures: Vec<JobFailure>,
    pub namespace_failures: Vec<NamespaceFailure>,

    /// Per-job outcomes ordered by plan position.
    pub outcomes: Vec<JobOutcome>,

    /// Migration scripts written alongside the artifacts.
    pub migrations: Vec<PathBuf>,

    pub cache: CacheStats,
    pub cancelled: bool,
}

impl GenerationReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            status: "completed".to_string(),
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
            namespaces: Vec::new(),
            tables_processed: 0,
            jobs_total: 0,
            files_written: 0,
            files_skipped: 0,
            bytes_written: 0,
            error_count: 0,
            failures: Vec::new(),
            namespace_failures: Vec::new(),
            outcomes: Vec::new(),
            migrations: Vec::new(),
            cache: CacheStats::default(),
            cancelled: false,
        }
    }

    /// Add one job outcome to the totals.
    pub fn record(&mut self, outcome: JobOutcome) {
        match outcome.status {
            JobStatus::Written => {
                self.files_written += 1;
                self.bytes_written += outcome.bytes;
            }
            JobStatus::Skipped => self.files_skipped += 1,
            JobStatus::Failed => {
                self.error_count += 1;
                self.failures.push(JobFailure {
                    namespace: outcome.namespace.clone(),
                    table: outcome.table.clone(),
                    artifact: outcome.artifact.to_string(),
                    error: outcome.error.clone().unwrap_or_default(),
                });
            }
        }
        self.outcomes.push(outcome);
    }

    pub fn record_namespace_failure(&mut self, namespace: &str, error: &CodegenError) {
        self.error_count += 1;
        self.namespace_failures.push(NamespaceFailure {
            namespace: namespace.to_string(),
            error: error.to_string(),
        });
    }

    /// Order outcomes by namespace run order then plan position, and stamp
    /// timing and status.
    pub fn finish(&mut self) {
        let rank = |ns: &str| {
            self.namespaces
                .iter()
                .position(|n| n == ns)
                .unwrap_or(usize::MAX)
        };
        self.outcomes
            .sort_by_key(|o| (rank(&o.namespace), o.seq));
        self.failures = self
            .outcomes
            .iter()
            .filter(|o| o.status == JobStatus::Failed)
            .map(|o| JobFailure {
                namespace: o.namespace.clone(),
                table: o.table.clone(),
                artifact: o.artifact.to_string(),
                error: o.error.clone().unwrap_or_default(),
            })
            .collect();

        self.completed_at = Utc::now();
        self.duration_seconds =
            (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.status = if self.cancelled {
            "cancelled"
        } else if self.error_count == 0 {
            "completed"
        } else if self.files_written + self.files_skipped > 0 {
            "partial"
        } else {
            "failed"
        }
        .to_string();
    }

    /// Fold a per-namespace report into this one.
    pub fn merge(&mut self, other: GenerationReport) {
        if other.started_at < self.started_at {
            self.started_at = other.started_at;
        }
        for ns in other.namespaces {
            if !self.namespaces.contains(&ns) {
                self.namespaces.push(ns);
            }
        }
        self.tables_processed += other.tables_processed;
        self.jobs_total += other.jobs_total;
        self.files_written += other.files_written;
        self.files_skipped += other.files_skipped;
        self.bytes_written += other.bytes_written;
        self.error_count += other.error_count;
        self.failures.extend(other.failures);
        self.namespace_failures.extend(other.namespace_failures);
        self.outcomes.extend(other.outcomes);
        self.migrations.extend(other.migrations);
        self.cache = other.cache;
        self.cancelled |= other.cancelled;
    }

    pub fn is_success(&self) -> bool {
        self.error_count == 0 && !self.cancelled
    }

    /// Multi-error listing every failure, or `None` for a clean run.
    pub fn error(&self) -> Option<CodegenError> {
        if self.cancelled && self.error_count == 0 {
            return Some(CodegenError::Cancelled);
        }
        if self.error_count == 0 {
            return None;
        }
        let mut failures = self.failures.clone();
        failures.extend(self.namespace_failures.iter().map(|f| JobFailure {
            namespace: f.namespace.clone(),
            table: "*".to_string(),
            artifact: "introspection".to_string(),
            error: f.error.clone(),
        }));
        Some(CodegenError::Generation {
            failures,
            files_written: self.files_written,
        })
    }

    /// Convert into `Err` when anything failed.
    pub fn into_result(self) -> Result<Self> {
        match self.error() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(seq: usize, table: &str, status: JobStatus) -> JobOutcome {
        JobOutcome {
            seq,
            namespace: "public".into(),
            table: table.into(),
            artifact: ArtifactKind::Model,
            path: PathBuf::from(format!("out/{}.rs", table)),
            status,
            bytes: if status == JobStatus::Written { 10 } else { 0 },
            fingerprint: None,
            error: (status == JobStatus::Failed).then(|| "boom".to_string()),
        }
    }

    #[test]
    fn test_record_and_finish() {
        let mut report = GenerationReport::new("run");
        report.record(outcome(2, "orders", JobStatus::Failed));
        report.record(outcome(0, "users", JobStatus::Written));
        report.record(outcome(1, "tags", JobStatus::Skipped));
        report.finish();

        assert_eq!(report.status, "partial");
        assert_eq!(report.files_written, 1);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.bytes_written, 10);
        assert_eq!(report.error_count, 1);
        let seqs: Vec<usize> = report.outcomes.iter().map(|o| o.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);

        match report.error() {
            Some(CodegenError::Generation {
                failures,
                files_written,
            }) => {
                assert_eq!(files_written, 1);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].table, "orders");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_merge_and_json() {
        let mut a = GenerationReport::new("run");
        a.namespaces.push("sales".into());
        a.record(outcome(0, "users", JobStatus::Written));

        let mut b = GenerationReport::new("run");
        b.namespaces.push("billing".into());
        b.record_namespace_failure("billing", &CodegenError::Query("gone".into()));

        a.merge(b);
        a.finish();

        assert_eq!(a.namespaces, vec!["sales", "billing"]);
        assert_eq!(a.error_count, 1);
        assert_eq!(a.namespace_failures.len(), 1);
        assert!(a.into_result().is_err());

        let clean = GenerationReport::new("run");
        let json = clean.to_json().unwrap();
        assert!(json.contains("\"run_id\": \"run\""));
        assert!(clean.into_result().is_ok());
    }
}
