//! Configuration validation.

use std::collections::HashSet;

use super::Config;
use crate::error::{CodegenError, Result};
use crate::source::tls::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.connection_string.trim().is_empty() {
        return Err(CodegenError::Config(
            "source.connection_string is required".into(),
        ));
    }
    if config.source.r#type != "postgres" {
        return Err(CodegenError::Config(format!(
            "source.type must be 'postgres', got '{}'",
            config.source.r#type
        )));
    }
    if config.source.schema.trim().is_empty() {
        return Err(CodegenError::Config("source.schema must not be empty".into()));
    }
    let ssl_mode = SslMode::parse(&config.source.ssl_mode)?;
    if config.source.ssl_root_cert.is_some()
        && !matches!(ssl_mode, SslMode::VerifyCa | SslMode::VerifyFull)
    {
        return Err(CodegenError::Config(format!(
            "source.ssl_root_cert is only used with verify-ca or verify-full, ssl_mode is '{}'",
            config.source.ssl_mode
        )));
    }

    if config.source.connect_attempts == 0 {
        return Err(CodegenError::Config(
            "source.connect_attempts must be at least 1".into(),
        ));
    }
    if config.source.max_connections == 0 {
        return Err(CodegenError::Config(
            "source.max_connections must be at least 1".into(),
        ));
    }
    if config.source.connect_timeout_secs == 0 || config.source.query_timeout_secs == 0 {
        return Err(CodegenError::Config(
            "source timeouts must be at least 1 second".into(),
        ));
    }

    // Cross-schema validation
    if config.generation.cross_schema {
        if config.source.schemas.is_empty() {
            return Err(CodegenError::Config(
                "generation.cross_schema requires source.schemas".into(),
            ));
        }
        let mut seen = HashSet::new();
        for ns in &config.source.schemas {
            if ns.trim().is_empty() {
                return Err(CodegenError::Config(
                    "source.schemas entries must not be empty".into(),
                ));
            }
            if !seen.insert(ns) {
                return Err(CodegenError::Config(format!(
                    "source.schemas lists '{}' more than once",
                    ns
                )));
            }
        }
    }

    // Generation validation - only check if explicitly set
    if let Some(0) = config.generation.workers {
        return Err(CodegenError::Config(
            "generation.workers must be at least 1".into(),
        ));
    }
    if config.generation.cache_capacity == 0 {
        return Err(CodegenError::Config(
            "generation.cache_capacity must be at least 1".into(),
        ));
    }
    if config.generation.enabled_artifacts().is_empty() {
        return Err(CodegenError::Config(
            "no artifact kinds enabled".into(),
        ));
    }

    if let Some(dir) = &config.output.template_dir {
        if !dir.is_dir() {
            return Err(CodegenError::Config(format!(
                "output.template_dir {:?} is not a directory",
                dir
            )));
        }
    }

    Ok(())
}
