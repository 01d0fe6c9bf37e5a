//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Signing key for the incremental manifest.
    ///
    /// Covers source, table filter and output sections but not generation
    /// toggles, so switching `force` or the worker count keeps the manifest.
    pub fn manifest_key(&self) -> String {
        let mut hasher = Sha256::new();
        for section in [
            serde_yaml::to_string(&self.source),
            serde_yaml::to_string(&self.tables),
            serde_yaml::to_string(&self.output),
        ] {
            hasher.update(section.unwrap_or_default().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ArtifactKind;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = Config::from_yaml(
            r#"
source:
  connection_string: "host=localhost user=app dbname=shop"
"#,
        )
        .unwrap();

        assert_eq!(config.source.schema, "public");
        assert_eq!(config.source.connect_attempts, 3);
        assert_eq!(config.source.connect_timeout_secs, 30);
        assert_eq!(config.generation.cache_capacity, 50);
        assert_eq!(config.generation.enabled_artifacts().len(), 5);
        assert!(config.generation.optimize_templates);
        assert!(!config.generation.incremental);
    }

    #[test]
    fn test_without_tests_drops_test_artifact() {
        let config = Config::from_yaml(
            r#"
source:
  connection_string: "postgres://app@localhost/shop"
generation:
  with_tests: false
"#,
        )
        .unwrap();

        let kinds = config.generation.enabled_artifacts();
        assert_eq!(kinds.len(), 4);
        assert!(!kinds.contains(&ArtifactKind::Test));
    }

    #[test]
    fn test_cross_schema_namespaces() {
        let config = Config::from_yaml(
            r#"
source:
  connection_string: "postgres://app@localhost/shop"
  schemas: [sales, billing]
generation:
  cross_schema: true
"#,
        )
        .unwrap();

        assert_eq!(config.namespaces(), vec!["sales", "billing"]);
    }

    #[test]
    fn test_sequential_forces_single_worker() {
        let config = Config::from_yaml(
            r#"
source:
  connection_string: "postgres://app@localhost/shop"
generation:
  parallel: false
  workers: 8
"#,
        )
        .unwrap();

        assert_eq!(config.generation.get_workers(), 1);
    }

    #[test]
    fn test_manifest_key_ignores_generation_toggles() {
        let a = Config::from_yaml("source:\n  connection_string: \"postgres://a@h/db\"\n").unwrap();
        let b = Config::from_yaml("source:\n  connection_string: \"postgres://b@h/db\"\n").unwrap();
        assert_ne!(a.manifest_key(), b.manifest_key());

        let mut forced = a.clone();
        forced.generation.force = true;
        forced.generation.workers = Some(2);
        assert_eq!(a.manifest_key(), forced.manifest_key());
    }
}
