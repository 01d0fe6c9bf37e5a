//! Compiled template cache.
//!
//! Entries are keyed by (name, content fingerprint) and never mutated after
//! insertion. Compilation happens outside the lock, so a slow compile never
//! blocks lookups of other entries.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use minijinja::{Environment, UndefinedBehavior};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::{filters, fingerprint};
use crate::error::{CodegenError, Result};

/// A parsed, ready-to-execute template.
pub struct CompiledTemplate {
    name: String,
    fingerprint: String,
    env: Environment<'static>,
}

impl std::fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl CompiledTemplate {
    /// Parse `content` under `name`.
    pub fn compile(name: &str, content: &str) -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_filter("snake_case", filters::snake_case);
        env.add_filter("pascal_case", filters::pascal_case);
        env.add_filter("camel_case", filters::camel_case);

        env.add_template_owned(name.to_string(), content.to_string())
            .map_err(|e| CodegenError::TemplateParse {
                name: name.to_string(),
                line: e.line(),
                message: e
                    .detail()
                    .map(str::to_string)
                    .unwrap_or_else(|| e.kind().to_string()),
            })?;

        Ok(Self {
            name: name.to_string(),
            fingerprint: fingerprint(content),
            env,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// SHA-256 of the template source.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Render with `data` as the root context.
    pub fn render<S: Serialize>(&self, data: &S) -> Result<String> {
        let tmpl = self
            .env
            .get_template(&self.name)
            .map_err(|e| CodegenError::render(&self.name, e.to_string()))?;
        tmpl.render(data)
            .map_err(|e| CodegenError::render(&self.name, render_detail(&e)))
    }
}

/// Error text plus location, e.g. `undefined value (in model:4)`.
fn render_detail(err: &minijinja::Error) -> String {
    let mut detail = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        detail.push_str(&format!(": {}", cause));
        source = cause.source();
    }
    detail
}

/// (template name, content fingerprint)
type CacheKey = (String, String);

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

/// Bounded LRU cache of compiled templates, shared by all workers.
pub struct TemplateCache {
    entries: Mutex<LruCache<CacheKey, Arc<CompiledTemplate>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TemplateCache {
    /// Default capacity.
    pub const DEFAULT_CAPACITY: usize = 50;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity: capacity.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the compiled template for (name, content), compiling on miss.
    pub fn get_template(&self, name: &str, content: &str) -> Result<Arc<CompiledTemplate>> {
        let key: CacheKey = (name.to_string(), fingerprint(content));

        if let Some(compiled) = self.entries.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(compiled.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(CompiledTemplate::compile(name, content)?);

        let mut entries = self.entries.lock();
        // Another worker may have compiled the same key meanwhile.
        if let Some(existing) = entries.get(&key) {
            return Ok(existing.clone());
        }

        if let Some(((evicted, _), _)) = entries.push(key, compiled.clone()) {
            debug!(template = %evicted, "Evicting compiled template");
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        debug!(template = name, "Compiled template cached");
        Ok(compiled)
    }

    /// Render a compiled template to bytes.
    pub fn execute_template<S: Serialize>(
        &self,
        compiled: &CompiledTemplate,
        data: &S,
    ) -> Result<Vec<u8>> {
        compiled.render(data).map(String::into_bytes)
    }

    /// Compile every template, reporting all failures together.
    pub fn precompile_templates<'a, I>(&self, templates: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let errors: Vec<CodegenError> = templates
            .into_iter()
            .filter_map(|(name, content)| self.get_template(name, content).err())
            .collect();
        CodegenError::aggregate("template precompilation", errors)
    }

    /// Drop every compiled template. Counters are kept.
    pub fn clear_cache(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.entries.lock().len(),
            capacity: self.capacity,
        }
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
