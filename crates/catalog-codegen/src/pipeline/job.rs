//! Generation jobs: one (table, artifact kind) pair with its output path.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::OutputConfig;
use crate::core::Schema;
use crate::error::{CodegenError, Result};
use crate::template::filters::snake_case;

/// Kind of artifact emitted per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Model,
    Interface,
    Implementation,
    TestDouble,
    Test,
}

impl ArtifactKind {
    /// Canonical job order within a table.
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Model,
        ArtifactKind::Interface,
        ArtifactKind::Implementation,
        ArtifactKind::TestDouble,
        ArtifactKind::Test,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Model => "model",
            ArtifactKind::Interface => "interface",
            ArtifactKind::Implementation => "implementation",
            ArtifactKind::TestDouble => "test_double",
            ArtifactKind::Test => "test",
        }
    }

    /// File name suffix appended to the table stem.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Model => ".rs",
            ArtifactKind::Interface => "_repository.rs",
            ArtifactKind::Implementation => "_pg.rs",
            ArtifactKind::TestDouble => "_mock.rs",
            ArtifactKind::Test => "_test.rs",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the output path of an artifact. Pure function of its inputs.
pub fn output_path(
    output: &OutputConfig,
    namespace: Option<&str>,
    table: &str,
    kind: ArtifactKind,
) -> PathBuf {
    let mut path = output.dir_for(kind).clone();
    if let Some(ns) = namespace {
        path.push(snake_case(ns.to_string()));
    }
    path.push(format!("{}{}", snake_case(table.to_string()), kind.file_suffix()));
    path
}

/// One unit of rendering work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationJob {
    /// Position in the plan; the report is ordered by it.
    pub seq: usize,
    pub namespace: String,
    pub table: String,
    /// Index of the table within the schema.
    pub table_index: usize,
    pub kind: ArtifactKind,
    pub output_path: PathBuf,
}

impl GenerationJob {
    pub fn label(&self) -> String {
        format!("{}.{} [{}]", self.namespace, self.table, self.kind)
    }
}

/// Build the ordered job list for a schema: tables in catalog order, kinds
/// in canonical order. Rejects plans where two jobs would share a path.
pub fn plan_jobs(
    schema: &Schema,
    kinds: &[ArtifactKind],
    output: &OutputConfig,
    namespaced: bool,
) -> Result<Vec<GenerationJob>> {
    let ns = namespaced.then_some(schema.namespace.as_str());
    let mut jobs = Vec::with_capacity(schema.tables.len() * kinds.len());
    let mut seen: HashMap<PathBuf, String> = HashMap::new();

    for (table_index, table) in schema.tables.iter().enumerate() {
        for &kind in kinds {
            let path = output_path(output, ns, &table.name, kind);
            if let Some(other) = seen.insert(path.clone(), table.name.clone()) {
                return Err(path_collision(&path, &other, &table.name));
            }
            jobs.push(GenerationJob {
                seq: jobs.len(),
                namespace: schema.namespace.clone(),
                table: table.name.clone(),
                table_index,
                kind,
                output_path: path,
            });
        }
    }
    Ok(jobs)
}

fn path_collision(path: &Path, first: &str, second: &str) -> CodegenError {
    CodegenError::Config(format!(
        "tables '{}' and '{}' both map to {}",
        first,
        second,
        path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Table;

    fn table(name: &str) -> Table {
        Table {
            schema: "public".into(),
            name: name.into(),
            columns: vec![],
            primary_key: vec![],
            foreign_keys: vec![],
        }
    }

    fn schema(names: &[&str]) -> Schema {
        Schema {
            namespace: "public".into(),
            tables: names.iter().map(|n| table(n)).collect(),
            warnings: vec![],
        }
    }

    #[test]
    fn test_output_path_is_pure() {
        let output = OutputConfig::default();
        let a = output_path(&output, None, "UserAccount", ArtifactKind::Interface);
        let b = output_path(&output, None, "UserAccount", ArtifactKind::Interface);
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("generated/repositories/user_account_repository.rs"));

        let ns = output_path(&output, Some("Sales"), "orders", ArtifactKind::Model);
        assert_eq!(ns, PathBuf::from("generated/models/sales/orders.rs"));
    }

    #[test]
    fn test_plan_order_is_table_then_kind() {
        let output = OutputConfig::default();
        let jobs = plan_jobs(&schema(&["users", "orders"]), &ArtifactKind::ALL, &output, false)
            .unwrap();
        assert_eq!(jobs.len(), 10);
        assert_eq!(jobs[0].table, "users");
        assert_eq!(jobs[0].kind, ArtifactKind::Model);
        assert_eq!(jobs[4].kind, ArtifactKind::Test);
        assert_eq!(jobs[5].table, "orders");
        assert_eq!(jobs[5].table_index, 1);
        assert!(jobs.iter().enumerate().all(|(i, j)| j.seq == i));
    }

    #[test]
    fn test_plan_rejects_colliding_paths() {
        let output = OutputConfig::default();
        let err = plan_jobs(
            &schema(&["UserAccount", "user_account"]),
            &[ArtifactKind::Model],
            &output,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, CodegenError::Config(_)));
        assert!(err.to_string().contains("user_account.rs"));
    }

    #[test]
    fn test_shared_output_dir_still_unique() {
        let output = OutputConfig {
            interface_dir: "out".into(),
            implementation_dir: "out".into(),
            ..OutputConfig::default()
        };
        let jobs = plan_jobs(
            &schema(&["users"]),
            &[ArtifactKind::Interface, ArtifactKind::Implementation],
            &output,
            false,
        )
        .unwrap();
        assert_ne!(jobs[0].output_path, jobs[1].output_path);
    }
}
