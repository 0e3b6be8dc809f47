//! LRU cache in front of a compiler.
//!
//! Compiling is the most expensive step of an edit and rollback-heavy
//! histories recompile the same source repeatedly. The cache key covers
//! everything the output depends on: site, slug and the source hash.

use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{CompileContext, CompiledOutput, Compiler};
use crate::text::content_hash;
use crate::types::SiteId;

/// Configuration for the compile cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_entries: usize,
    /// Whether to enable the cache.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_024,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CompileCacheKey {
    site_id: SiteId,
    slug: String,
    source_hash: String,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that had to compile.
    pub misses: u64,
}

/// Compiler wrapper with an LRU cache.
pub struct CachingCompiler<C: Compiler> {
    inner: C,
    cache: Option<RwLock<LruCache<CompileCacheKey, CompiledOutput>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<C: Compiler> CachingCompiler<C> {
    /// Wrap a compiler.
    pub fn new(inner: C, config: CacheConfig) -> Self {
        let cache = if config.enabled {
            let size = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
            Some(RwLock::new(LruCache::new(size)))
        } else {
            None
        };

        Self {
            inner,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get cache statistics.
    ///
    /// Returns `None` if caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| {
            let cache = cache.read();
            CacheStats {
                len: cache.len(),
                cap: cache.cap().get(),
                hits: self.hits.load(Ordering::Relaxed),
                misses: self.misses.load(Ordering::Relaxed),
            }
        })
    }

    /// Drop every cached entry.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.write().clear();
        }
    }
}

impl<C: Compiler> Compiler for CachingCompiler<C> {
    fn compile(&self, ctx: &CompileContext, wikitext: &str) -> CompiledOutput {
        let Some(cache) = &self.cache else {
            return self.inner.compile(ctx, wikitext);
        };

        let key = CompileCacheKey {
            site_id: ctx.site_id,
            slug: ctx.slug.clone(),
            source_hash: content_hash(wikitext),
        };

        // `get` promotes the entry, so it needs the write guard.
        if let Some(output) = cache.write().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return output.clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let output = self.inner.compile(ctx, wikitext);
        cache.write().put(key, output.clone());
        output
    }

    fn generator(&self) -> &str {
        self.inner.generator()
    }
}
