//! Error types for the code generation library.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for code generation operations.
#[derive(Error, Debug)]
pub enum CodegenError {
    /// Configuration error (invalid YAML, missing fields, bad toggles).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metadata source could not be reached after every connect attempt.
    #[error("Metadata source unreachable after {attempts} attempt(s): {source}")]
    Connectivity {
        attempts: u32,
        #[source]
        source: Box<CodegenError>,
    },

    /// Connection pool error with context.
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Malformed catalog query or unexpected catalog row shape.
    #[error("Catalog query failed: {0}")]
    Query(String),

    /// Catalog metadata is inconsistent; the partial schema is discarded.
    #[error("Schema introspection failed: {0}")]
    SchemaIntrospection(String),

    /// Template source could not be parsed.
    #[error("Template '{name}' failed to parse{}: {message}", .line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    TemplateParse {
        name: String,
        line: Option<usize>,
        message: String,
    },

    /// Template execution hit an unresolved field or a failing filter.
    #[error("Render of template '{template}' failed: {detail}")]
    Render { template: String, detail: String },

    /// Writing a generated artifact failed.
    #[error("Failed to write {}: {source}", .path.display())]
    FilesystemWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Health probe failed or the pool has already been released.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// An I/O bound call exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Several independent failures collected into one error.
    #[error("{context}: {} error(s){}", .errors.len(), format_list(.errors))]
    Aggregate {
        context: String,
        errors: Vec<CodegenError>,
    },

    /// One or more generation jobs failed; other artifacts were still written.
    #[error("Generation failed for {} artifact(s) ({files_written} file(s) written){}", .failures.len(), format_failures(.failures))]
    Generation {
        failures: Vec<JobFailure>,
        files_written: usize,
    },

    /// A background task died unexpectedly.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Run was cancelled (SIGINT, deadline).
    #[error("Generation cancelled")]
    Cancelled,

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A failed (table, artifact-kind) pair and its cause.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JobFailure {
    pub namespace: String,
    pub table: String,
    pub artifact: String,
    pub error: String,
}

fn format_list(errors: &[CodegenError]) -> String {
    errors.iter().map(|e| format!("\n  - {}", e)).collect()
}

fn format_failures(failures: &[JobFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("\n  - {}.{} [{}]: {}", f.namespace, f.table, f.artifact, f.error))
        .collect()
}

impl CodegenError {
    /// Create a Pool error with context about where it occurred.
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        CodegenError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// The catalog connection dropped mid-call.
    pub fn connection_lost(message: impl ToString, context: impl Into<String>) -> Self {
        CodegenError::Connectivity {
            attempts: 1,
            source: Box::new(CodegenError::pool(message, context)),
        }
    }

    /// Create a Render error.
    pub fn render(template: impl Into<String>, detail: impl Into<String>) -> Self {
        CodegenError::Render {
            template: template.into(),
            detail: detail.into(),
        }
    }

    /// Collapse a list of errors: none is Ok, one is returned as-is, more are aggregated.
    pub fn aggregate(context: impl Into<String>, mut errors: Vec<CodegenError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(CodegenError::Aggregate {
                context: context.into(),
                errors,
            }),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            CodegenError::Config(_) | CodegenError::Yaml(_) => 2,
            CodegenError::Connectivity { .. }
            | CodegenError::Pool { .. }
            | CodegenError::ServiceUnavailable(_)
            | CodegenError::Timeout { .. } => 3,
            CodegenError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for code generation operations.
pub type Result<T> = std::result::Result<T, CodegenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_collapses() {
        assert!(CodegenError::aggregate("none", vec![]).is_ok());

        let single = CodegenError::aggregate("one", vec![CodegenError::Query("bad".into())]);
        assert!(matches!(single, Err(CodegenError::Query(_))));

        let many = CodegenError::aggregate(
            "teardown",
            vec![
                CodegenError::Query("first".into()),
                CodegenError::Config("second".into()),
            ],
        )
        .unwrap_err();
        let msg = many.to_string();
        assert!(msg.contains("teardown: 2 error(s)"));
        assert!(msg.contains("first"));
        assert!(msg.contains("second"));
    }

    #[test]
    fn test_connectivity_chain() {
        let err = CodegenError::Connectivity {
            attempts: 3,
            source: Box::new(CodegenError::pool("refused", "ping")),
        };
        let detailed = err.format_detailed();
        assert!(detailed.contains("3 attempt(s)"));
        assert!(detailed.contains("Caused by"));
        assert_eq!(err.exit_code(), 3);

        let lost = CodegenError::connection_lost("connection closed", "catalog query");
        assert!(matches!(lost, CodegenError::Connectivity { attempts: 1, .. }));
        assert_eq!(lost.exit_code(), 3);
        assert_eq!(CodegenError::Query("syntax error".into()).exit_code(), 1);
    }

    #[test]
    fn test_internal_failure_is_not_a_config_error() {
        let err = CodegenError::Internal("result aggregator failed: task panicked".into());
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().starts_with("Internal error"));
    }

    #[test]
    fn test_template_parse_display() {
        let err = CodegenError::TemplateParse {
            name: "model".into(),
            line: Some(4),
            message: "unexpected end of input".into(),
        };
        assert_eq!(
            err.to_string(),
            "Template 'model' failed to parse at line 4: unexpected end of input"
        );
    }

    #[test]
    fn test_generation_lists_failures() {
        let err = CodegenError::Generation {
            failures: vec![JobFailure {
                namespace: "public".into(),
                table: "users".into(),
                artifact: "model".into(),
                error: "undefined value".into(),
            }],
            files_written: 9,
        };
        let msg = err.to_string();
        assert!(msg.contains("9 file(s) written"));
        assert!(msg.contains("public.users [model]"));
        assert_eq!(err.exit_code(), 1);
    }
}
