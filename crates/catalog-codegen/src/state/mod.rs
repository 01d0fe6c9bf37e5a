//! Incremental-build manifest.
//!
//! Records, per output path, the fingerprint of the job that last wrote it.
//! The file is signed with HMAC-SHA256 and written atomically.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::error::{CodegenError, Result};
use crate::pipeline::ArtifactKind;

type HmacSha256 = Hmac<Sha256>;

const MANIFEST_VERSION: u32 = 1;

/// Fingerprints of previously written artifacts, keyed by output path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationManifest {
    pub version: u32,

    /// Run that last saved the manifest.
    pub run_id: String,

    pub updated_at: DateTime<Utc>,

    pub entries: BTreeMap<String, ManifestEntry>,

    /// HMAC-SHA256 over the manifest with this field cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,

    #[serde(skip)]
    key: String,
}

/// One written artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub fingerprint: String,
    pub namespace: String,
    pub table: String,
    pub artifact: ArtifactKind,
    pub bytes: u64,
}

impl GenerationManifest {
    /// Empty manifest signed with `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            run_id: String::new(),
            updated_at: Utc::now(),
            entries: BTreeMap::new(),
            hmac: None,
            key: key.into(),
        }
    }

    fn compute_hmac(&self) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.hmac = None;
        let content = serde_json::to_string(&unsigned)?;

        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .map_err(|e| CodegenError::Config(format!("Failed to create HMAC: {}", e)))?;
        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Load and verify a manifest.
    pub fn load<P: AsRef<Path>>(path: P, key: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut manifest: Self = serde_json::from_str(&content)?;
        manifest.key = key.to_string();

        if manifest.version != MANIFEST_VERSION {
            return Err(CodegenError::Config(format!(
                "manifest version {} is not supported",
                manifest.version
            )));
        }
        match &manifest.hmac {
            Some(stored) if *stored == manifest.compute_hmac()? => Ok(manifest),
            _ => Err(CodegenError::Config(
                "manifest integrity check failed: HMAC mismatch".to_string(),
            )),
        }
    }

    /// Load a manifest, falling back to an empty one (full rebuild) when it
    /// is missing, unreadable or fails verification.
    pub fn load_or_default<P: AsRef<Path>>(path: P, key: &str) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No manifest, full build");
            return Self::new(key);
        }
        match Self::load(path, key) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Ignoring manifest, every artifact will be regenerated"
                );
                Self::new(key)
            }
        }
    }

    /// Whether `output_path` was last written with `fingerprint` and still exists.
    pub fn is_fresh(&self, output_path: &Path, fingerprint: &str) -> bool {
        self.entries
            .get(&path_key(output_path))
            .is_some_and(|e| e.fingerprint == fingerprint)
            && output_path.is_file()
    }

    pub fn record(&mut self, output_path: &Path, entry: ManifestEntry) {
        self.entries.insert(path_key(output_path), entry);
    }

    /// Forget a path, e.g. after its job failed.
    pub fn forget(&mut self, output_path: &Path) {
        self.entries.remove(&path_key(output_path));
    }

    /// Drop entries of `namespace` whose path is no longer planned, e.g.
    /// a table that was dropped or filtered out. Returns how many went.
    pub fn prune(&mut self, namespace: &str, planned: &[PathBuf]) -> usize {
        let keep: HashSet<String> = planned.iter().map(|p| path_key(p)).collect();
        let before = self.entries.len();
        self.entries
            .retain(|path, e| e.namespace != namespace || keep.contains(path));
        before - self.entries.len()
    }

    /// Drop entries of namespaces outside this run's namespace list.
    pub fn retain_namespaces(&mut self, namespaces: &[String]) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| namespaces.iter().any(|ns| *ns == e.namespace));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sign and save atomically (temp file, then rename).
    pub fn save<P: AsRef<Path>>(&mut self, path: P, run_id: &str) -> Result<()> {
        let path = path.as_ref();
        self.run_id = run_id.to_string();
        self.updated_at = Utc::now();
        self.hmac = Some(self.compute_hmac()?);

        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        debug!(path = %path.display(), entries = self.entries.len(), "Manifest saved");
        Ok(())
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(fp: &str) -> ManifestEntry {
        ManifestEntry {
            fingerprint: fp.to_string(),
            namespace: "public".to_string(),
            table: "users".to_string(),
            artifact: ArtifactKind::Model,
            bytes: 42,
        }
    }

    #[test]
    fn test_prune_drops_unplanned_paths_of_namespace() {
        let mut manifest = GenerationManifest::new("key");
        manifest.record(Path::new("out/users.rs"), entry("a"));
        manifest.record(Path::new("out/dropped.rs"), entry("b"));
        let mut other = entry("c");
        other.namespace = "billing".into();
        manifest.record(Path::new("out/billing/invoices.rs"), other);

        let pruned = manifest.prune("public", &[PathBuf::from("out/users.rs")]);
        assert_eq!(pruned, 1);
        assert!(manifest.entries.contains_key("out/users.rs"));
        assert!(manifest.entries.contains_key("out/billing/invoices.rs"));

        assert_eq!(manifest.retain_namespaces(&["public".to_string()]), 1);
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("manifest.json");

        let mut manifest = GenerationManifest::new("key-1");
        manifest.record(Path::new("out/users.rs"), entry("abc"));
        manifest.save(&path, "run-1").unwrap();

        let loaded = GenerationManifest::load(&path, "key-1").unwrap();
        assert_eq!(loaded.run_id, "run-1");
        assert_eq!(loaded.entries.get("out/users.rs"), Some(&entry("abc")));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_tampered_manifest_falls_back_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let mut manifest = GenerationManifest::new("key-1");
        manifest.record(Path::new("out/users.rs"), entry("abc"));
        manifest.save(&path, "run-1").unwrap();

        let content = std::fs::read_to_string(&path).unwrap().replace("abc", "xyz");
        std::fs::write(&path, content).unwrap();

        assert!(GenerationManifest::load(&path, "key-1").is_err());
        assert!(GenerationManifest::load_or_default(&path, "key-1").is_empty());
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut manifest = GenerationManifest::new("key-1");
        manifest.save(&path, "run-1").unwrap();

        assert!(GenerationManifest::load(&path, "key-2").is_err());
    }

    #[test]
    fn test_missing_manifest_is_empty() {
        let dir = tempdir().unwrap();
        let manifest = GenerationManifest::load_or_default(dir.path().join("none.json"), "k");
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_is_fresh_requires_matching_fingerprint_and_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("users.rs");
        let mut manifest = GenerationManifest::new("k");
        manifest.record(&file, entry("abc"));

        // recorded but not on disk
        assert!(!manifest.is_fresh(&file, "abc"));

        std::fs::write(&file, "struct Users;").unwrap();
        assert!(manifest.is_fresh(&file, "abc"));
        assert!(!manifest.is_fresh(&file, "def"));

        manifest.forget(&file);
        assert!(!manifest.is_fresh(&file, "abc"));
    }
}
