//! Compiled-template caching.

use crate::template::CompiledTemplate;
use crate::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Trait for compiled-template caching strategies.
pub trait Cache: Send + Sync {
    /// Try to retrieve the compiled form of a template.
    fn get(&self, source: &str) -> Option<Arc<CompiledTemplate>>;

    /// Store a compiled template.
    fn set(&self, source: &str, template: Arc<CompiledTemplate>);

    /// Number of cached templates.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached template or compile and store it.
    ///
    /// Default implementation is a plain get-then-set; two callers racing on
    /// the same new source may both compile.
    fn get_or_compile(
        &self,
        source: &str,
        compile: &mut dyn FnMut() -> Result<Arc<CompiledTemplate>>,
    ) -> Result<Arc<CompiledTemplate>> {
        if let Some(template) = self.get(source) {
            return Ok(template);
        }
        let template = compile()?;
        self.set(source, Arc::clone(&template));
        Ok(template)
    }
}

/// An exact-match cache keyed by template source, without eviction.
#[derive(Default)]
pub struct ExactCache {
    storage: DashMap<String, Arc<CompiledTemplate>>,
}

impl ExactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.storage.clear();
    }
}

impl Cache for ExactCache {
    fn get(&self, source: &str) -> Option<Arc<CompiledTemplate>> {
        self.storage.get(source).map(|v| Arc::clone(v.value()))
    }

    fn set(&self, source: &str, template: Arc<CompiledTemplate>) {
        self.storage.insert(source.to_string(), template);
    }

    fn len(&self) -> usize {
        self.storage.len()
    }

    /// Compiles while holding the entry's shard lock, so the first compile
    /// of a source wins and concurrent callers reuse it.
    fn get_or_compile(
        &self,
        source: &str,
        compile: &mut dyn FnMut() -> Result<Arc<CompiledTemplate>>,
    ) -> Result<Arc<CompiledTemplate>> {
        if let Some(template) = self.get(source) {
            debug!("Template cache hit");
            return Ok(template);
        }
        match self.storage.entry(source.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                debug!("Template cache miss");
                let template = compile()?;
                entry.insert(Arc::clone(&template));
                Ok(template)
            }
        }
    }
}

/// A cache that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl Cache for NoCache {
    fn get(&self, _source: &str) -> Option<Arc<CompiledTemplate>> {
        None
    }

    fn set(&self, _source: &str, _template: Arc<CompiledTemplate>) {}

    fn len(&self) -> usize {
        0
    }
}
