//! Template sets: the built-in templates plus custom-directory overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{MockProvider, OutputConfig};
use crate::error::{CodegenError, Result};
use crate::pipeline::ArtifactKind;

const MODEL: &str = include_str!("../../templates/model.j2");
const INTERFACE: &str = include_str!("../../templates/interface.j2");
const IMPLEMENTATION: &str = include_str!("../../templates/implementation.j2");
const TEST_DOUBLE_MOCKALL: &str = include_str!("../../templates/test_double_mockall.j2");
const TEST_DOUBLE_FAKE: &str = include_str!("../../templates/test_double_fake.j2");
const TEST: &str = include_str!("../../templates/test.j2");

/// Where a template's source came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateOrigin {
    Builtin,
    Custom(PathBuf),
}

/// Template source for one artifact kind.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    pub name: String,
    pub content: String,
    pub origin: TemplateOrigin,
}

/// One template per artifact kind.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: BTreeMap<ArtifactKind, TemplateSource>,
}

impl TemplateSet {
    /// Built-in templates for the given test-double flavour.
    pub fn builtin(mock_provider: MockProvider) -> Self {
        let test_double = match mock_provider {
            MockProvider::Mockall => TEST_DOUBLE_MOCKALL,
            MockProvider::Fake => TEST_DOUBLE_FAKE,
        };

        let templates = ArtifactKind::ALL
            .iter()
            .map(|&kind| {
                let content = match kind {
                    ArtifactKind::Model => MODEL,
                    ArtifactKind::Interface => INTERFACE,
                    ArtifactKind::Implementation => IMPLEMENTATION,
                    ArtifactKind::TestDouble => test_double,
                    ArtifactKind::Test => TEST,
                };
                (
                    kind,
                    TemplateSource {
                        name: kind.as_str().to_string(),
                        content: content.to_string(),
                        origin: TemplateOrigin::Builtin,
                    },
                )
            })
            .collect();

        Self { templates }
    }

    /// Built-ins overridden by `<kind>.j2` files in `output.template_dir`.
    pub fn load(output: &OutputConfig) -> Result<Self> {
        let mut set = Self::builtin(output.mock_provider);
        if let Some(dir) = &output.template_dir {
            set.apply_overrides(dir)?;
        }
        Ok(set)
    }

    fn apply_overrides(&mut self, dir: &Path) -> Result<()> {
        for kind in ArtifactKind::ALL {
            let path = dir.join(format!("{}.j2", kind.as_str()));
            if !path.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| {
                CodegenError::Config(format!("cannot read template {}: {}", path.display(), e))
            })?;
            info!(template = kind.as_str(), path = %path.display(), "Using custom template");
            self.templates.insert(
                kind,
                TemplateSource {
                    name: kind.as_str().to_string(),
                    content,
                    origin: TemplateOrigin::Custom(path),
                },
            );
        }
        Ok(())
    }

    /// Replace one template in place.
    pub fn with_override(mut self, kind: ArtifactKind, content: impl Into<String>) -> Self {
        self.templates.insert(
            kind,
            TemplateSource {
                name: kind.as_str().to_string(),
                content: content.into(),
                origin: TemplateOrigin::Custom(PathBuf::new()),
            },
        );
        self
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&TemplateSource> {
        self.templates.get(&kind)
    }

    /// (name, content) pairs for precompilation.
    pub fn sources(&self) -> impl Iterator<Item = (&str, &str)> {
        self.templates
            .values()
            .map(|t| (t.name.as_str(), t.content.as_str()))
    }
}
