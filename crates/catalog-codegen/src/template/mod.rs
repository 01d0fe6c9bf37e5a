//! Template compilation, caching and the built-in template sets.

mod builtin;
mod cache;
pub mod filters;

pub use builtin::{TemplateOrigin, TemplateSet, TemplateSource};
pub use cache::{CacheStats, CompiledTemplate, TemplateCache};

use sha2::{Digest, Sha256};

/// Hex SHA-256 of `content`.
pub fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
