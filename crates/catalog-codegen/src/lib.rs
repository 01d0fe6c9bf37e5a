//! # catalog-codegen
//!
//! Generates Rust data-access code from a PostgreSQL catalog.
//!
//! The library reads table, column, primary-key and foreign-key metadata
//! into a normalized [`Schema`], then renders one file per (table, artifact
//! kind) with:
//!
//! - **Five artifact kinds**: model, repository trait, PostgreSQL
//!   implementation, test double and test module
//! - **Parallel rendering** over a bounded worker pool with deterministic output
//! - **Compiled template cache** keyed by template content fingerprint
//! - **Incremental builds** via a signed JSON manifest
//! - **Cross-schema runs** with per-namespace failure isolation
//!
//! ## Example
//!
//! ```rust,no_run
//! use catalog_codegen::{Config, Container};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> catalog_codegen::Result<()> {
//!     let config = Config::load("codegen.yaml")?.with_auto_tuning();
//!     let container = Container::build(config, CancellationToken::new()).await?;
//!     let report = container.run().await?;
//!     println!("Wrote {} files", report.files_written);
//!     container.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod container;
pub mod core;
pub mod error;
pub mod metrics;
pub mod migration;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod state;
pub mod template;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, GenerationConfig, MockProvider, OutputConfig, SourceConfig};
pub use container::{Container, HealthReport};
pub use crate::core::{Column, ForeignKey, MetadataConnector, Schema, Table};
pub use error::{CodegenError, JobFailure, Result};
pub use metrics::{Metrics, MetricsSnapshot, Operation};
pub use orchestrator::{GenerationReport, JobOutcome, JobStatus, Orchestrator};
pub use pipeline::{ArtifactKind, GenerationJob, RenderContext};
pub use retry::{retry, Backoff, RetryPolicy};
pub use source::{
    MemoryCatalog, MemoryTable, PgConnector, QueryFault, SchemaIntrospector, TableFilter,
};
pub use state::GenerationManifest;
pub use template::{CacheStats, CompiledTemplate, TemplateCache, TemplateSet};
pub use typemap::SemanticType;
