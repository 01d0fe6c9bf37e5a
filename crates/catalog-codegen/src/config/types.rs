//! Configuration type definitions with auto-tuning based on system resources.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

use crate::pipeline::ArtifactKind;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len().max(1);

        Self {
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Metadata source (catalog) configuration.
    pub source: SourceConfig,

    /// Table allow/deny lists.
    #[serde(default)]
    pub tables: TableFilterConfig,

    /// Output directories and template selection.
    #[serde(default)]
    pub output: OutputConfig,

    /// Generation feature toggles.
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.generation = self.generation.with_auto_tuning(&resources);
        self
    }

    /// Namespaces this run introspects, in configured order.
    pub fn namespaces(&self) -> Vec<String> {
        if self.generation.cross_schema && !self.source.schemas.is_empty() {
            self.source.schemas.clone()
        } else {
            vec![self.source.schema.clone()]
        }
    }
}

/// Metadata source configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type (only "postgres" for now).
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// libpq-style connection string or URL.
    pub connection_string: String,

    /// Target schema namespace (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// Namespaces introspected in cross-schema mode.
    #[serde(default)]
    pub schemas: Vec<String>,

    /// SSL mode: disable, require, verify-ca, verify-full (default: disable).
    #[serde(default = "default_disable")]
    pub ssl_mode: String,

    /// Extra PEM trust roots for verify-ca and verify-full.
    #[serde(default)]
    pub ssl_root_cert: Option<PathBuf>,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Timeout for one connect attempt in seconds (default: 30).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Connect attempts before giving up (default: 3).
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Fixed delay between connect attempts in milliseconds (default: 2000).
    #[serde(default = "default_connect_retry_delay")]
    pub connect_retry_delay_ms: u64,

    /// Timeout for one catalog query in seconds (default: 30).
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            r#type: default_postgres(),
            connection_string: String::new(),
            schema: default_public_schema(),
            schemas: Vec::new(),
            ssl_mode: default_disable(),
            ssl_root_cert: None,
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
            connect_attempts: default_connect_attempts(),
            connect_retry_delay_ms: default_connect_retry_delay(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("connection_string", &redact_connection_string(&self.connection_string))
            .field("schema", &self.schema)
            .field("schemas", &self.schemas)
            .field("ssl_mode", &self.ssl_mode)
            .field("ssl_root_cert", &self.ssl_root_cert)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("connect_attempts", &self.connect_attempts)
            .field("connect_retry_delay_ms", &self.connect_retry_delay_ms)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .finish()
    }
}

/// Replace the password in a URL (`user:pass@`) or key/value (`password=...`) connection string.
pub fn redact_connection_string(conn: &str) -> String {
    if let Some(scheme_end) = conn.find("://") {
        let rest = &conn[scheme_end + 3..];
        if let Some(at) = rest.find('@') {
            let userinfo = &rest[..at];
            if let Some(colon) = userinfo.find(':') {
                return format!(
                    "{}{}:[REDACTED]{}",
                    &conn[..scheme_end + 3],
                    &userinfo[..colon],
                    &rest[at..]
                );
            }
        }
        return conn.to_string();
    }

    conn.split_whitespace()
        .map(|pair| {
            if pair.to_lowercase().starts_with("password=") {
                "password=[REDACTED]".to_string()
            } else {
                pair.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Table allow/deny lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableFilterConfig {
    /// Tables to include (glob patterns). Empty means all.
    #[serde(default)]
    pub include: Vec<String>,

    /// Tables to exclude (glob patterns).
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Which test-double flavour the built-in templates emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockProvider {
    /// `mockall::mock!` based doubles.
    #[default]
    Mockall,
    /// Hand-written in-memory fakes.
    Fake,
}

impl MockProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            MockProvider::Mockall => "mockall",
            MockProvider::Fake => "fake",
        }
    }
}

/// Output directories and template selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    #[serde(default = "default_interface_dir")]
    pub interface_dir: PathBuf,

    #[serde(default = "default_implementation_dir")]
    pub implementation_dir: PathBuf,

    #[serde(default = "default_test_double_dir")]
    pub test_double_dir: PathBuf,

    #[serde(default = "default_test_dir")]
    pub test_dir: PathBuf,

    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,

    /// Directory whose `<kind>.j2` files override the built-in templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,

    /// Test-double flavour (default: mockall).
    #[serde(default)]
    pub mock_provider: MockProvider,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            interface_dir: default_interface_dir(),
            implementation_dir: default_implementation_dir(),
            test_double_dir: default_test_double_dir(),
            test_dir: default_test_dir(),
            migrations_dir: default_migrations_dir(),
            template_dir: None,
            mock_provider: MockProvider::default(),
        }
    }
}

impl OutputConfig {
    /// Output directory for an artifact kind.
    pub fn dir_for(&self, kind: ArtifactKind) -> &PathBuf {
        match kind {
            ArtifactKind::Model => &self.model_dir,
            ArtifactKind::Interface => &self.interface_dir,
            ArtifactKind::Implementation => &self.implementation_dir,
            ArtifactKind::TestDouble => &self.test_double_dir,
            ArtifactKind::Test => &self.test_dir,
        }
    }
}

/// Generation behavior configuration.
/// `workers` uses Option<T> to distinguish between "not set" (auto-tuned)
/// and "explicitly set".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Emit the test artifact kind (default: true).
    #[serde(default = "default_true")]
    pub with_tests: bool,

    /// Dispatch jobs to a worker pool; false runs strictly sequentially.
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Worker pool size. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Skip jobs whose fingerprint matches the previous successful run.
    #[serde(default)]
    pub incremental: bool,

    /// Rewrite every artifact even in incremental mode.
    #[serde(default)]
    pub force: bool,

    /// Write a best-effort CREATE TABLE script per namespace.
    #[serde(default)]
    pub generate_migrations: bool,

    /// Run the pipeline once per namespace in `source.schemas`.
    #[serde(default)]
    pub cross_schema: bool,

    /// Add a generator directive header to every artifact.
    #[serde(default)]
    pub emit_generate_directives: bool,

    /// Precompile every template at startup.
    #[serde(default = "default_true")]
    pub optimize_templates: bool,

    /// Enabled artifact kinds (default: all five).
    #[serde(default = "default_artifacts")]
    pub artifacts: Vec<ArtifactKind>,

    /// Compiled template cache capacity (default: 50).
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Incremental manifest location.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            with_tests: true,
            parallel: true,
            workers: None,
            incremental: false,
            force: false,
            generate_migrations: false,
            cross_schema: false,
            emit_generate_directives: false,
            optimize_templates: true,
            artifacts: default_artifacts(),
            cache_capacity: default_cache_capacity(),
            manifest_path: default_manifest_path(),
        }
    }
}

impl GenerationConfig {
    /// Apply auto-tuned defaults based on system resources.
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        if self.workers.is_none() {
            let workers = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(resources.cpu_cores)
                .max(1);
            self.workers = Some(workers);
        }

        info!(
            "Auto-tuned config: workers={}, parallel={}",
            self.get_workers(),
            self.parallel
        );

        self
    }

    /// Effective worker count; 1 when parallel dispatch is disabled.
    pub fn get_workers(&self) -> usize {
        if !self.parallel {
            return 1;
        }
        self.workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
            .max(1)
    }

    /// Enabled artifact kinds in canonical order, honoring `with_tests`.
    pub fn enabled_artifacts(&self) -> Vec<ArtifactKind> {
        ArtifactKind::ALL
            .iter()
            .copied()
            .filter(|k| self.artifacts.contains(k))
            .filter(|k| self.with_tests || *k != ArtifactKind::Test)
            .collect()
    }
}

// Default value functions for serde
fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_connect_retry_delay() -> u64 {
    2000
}

fn default_query_timeout() -> u64 {
    30
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("generated/models")
}

fn default_interface_dir() -> PathBuf {
    PathBuf::from("generated/repositories")
}

fn default_implementation_dir() -> PathBuf {
    PathBuf::from("generated/postgres")
}

fn default_test_double_dir() -> PathBuf {
    PathBuf::from("generated/mocks")
}

fn default_test_dir() -> PathBuf {
    PathBuf::from("generated/tests")
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("generated/migrations")
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from(".catalog-codegen/manifest.json")
}

fn default_cache_capacity() -> usize {
    50
}

fn default_artifacts() -> Vec<ArtifactKind> {
    ArtifactKind::ALL.to_vec()
}

fn default_true() -> bool {
    true
}
