//! Generation planning.
//!
//! - [`GenerationJob`]: one (table, artifact kind) unit with its output path
//! - [`RenderContext`]: the serializable view of a table handed to templates
//! - [`job_fingerprint`]: incremental-build key for a rendered job

mod context;
mod job;

pub use context::{ColumnView, ForeignKeyView, RenderContext, SqlView, TableView};
pub use job::{output_path, plan_jobs, ArtifactKind, GenerationJob};

use sha2::{Digest, Sha256};

use crate::error::Result;

/// Fingerprint of (template fingerprint, rendered context).
///
/// The context already carries the table subset and every option that
/// changes output, so equal fingerprints imply byte-identical output.
pub fn job_fingerprint(template_fingerprint: &str, context: &RenderContext) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(template_fingerprint.as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(context)?);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockProvider;
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

    #[test]
    fn test_fingerprint_tracks_inputs() {
        let ctx = RenderContext::new(&table("users"), ArtifactKind::Model, MockProvider::Mockall, false);
        let same = RenderContext::new(&table("users"), ArtifactKind::Model, MockProvider::Mockall, false);
        let other = RenderContext::new(&table("orders"), ArtifactKind::Model, MockProvider::Mockall, false);
        let directive = RenderContext::new(&table("users"), ArtifactKind::Model, MockProvider::Mockall, true);

        let fp = job_fingerprint("t1", &ctx).unwrap();
        assert_eq!(fp, job_fingerprint("t1", &same).unwrap());
        assert_ne!(fp, job_fingerprint("t2", &ctx).unwrap());
        assert_ne!(fp, job_fingerprint("t1", &other).unwrap());
        assert_ne!(fp, job_fingerprint("t1", &directive).unwrap());
    }
}
