//! Cache-manager seam for layout validity and duration queries.
//!
//! The schedule resolver never touches the content store directly. It asks an
//! implementation of [`LayoutCache`] whether a layout file and its dependents
//! are present and safe to play, and what duration a layout was last observed
//! to run for. The real implementation lives with the download/cache
//! subsystem; this module ships a permissive no-op used when no cache manager
//! is wired up, plus a scriptable in-memory implementation for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use thiserror::Error;

/// Errors reported by a cache manager.
///
/// Any error is treated by the resolver as "not valid": a layout the cache
/// cannot vouch for is quarantined rather than played.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache index could not be consulted.
    #[error("cache lookup failed for {path}: {reason}")]
    LookupFailed {
        /// File the lookup was for.
        path: String,
        /// Underlying failure description.
        reason: String,
    },
}

/// Cache abstraction consumed by the validity filter.
///
/// Enables the resolver to run against the real cache manager, a permissive
/// no-op, or a scripted test double interchangeably.
pub trait LayoutCache: Send + Sync {
    /// Whether the named file is fully downloaded and hash-valid.
    fn is_valid_path(&self, filename: &str) -> Result<bool, CacheError>;

    /// Whether the layout has been flagged unsafe to play (malformed content,
    /// failed prior render).
    fn is_unsafe_layout(&self, layout_id: i64) -> Result<bool, CacheError>;

    /// Last observed run duration for the layout in seconds, or `fallback`
    /// when the layout has never completed a run.
    fn layout_duration(&self, layout_id: i64, fallback: u32) -> u32;
}

/// Permissive cache used when no cache manager is wired up.
///
/// Everything is valid, nothing is unsafe, and no durations have been
/// observed.
#[derive(Debug, Clone, Default)]
pub struct NoOpLayoutCache;

impl LayoutCache for NoOpLayoutCache {
    fn is_valid_path(&self, _filename: &str) -> Result<bool, CacheError> {
        Ok(true)
    }

    fn is_unsafe_layout(&self, _layout_id: i64) -> Result<bool, CacheError> {
        Ok(false)
    }

    fn layout_duration(&self, _layout_id: i64, fallback: u32) -> u32 {
        fallback
    }
}

/// Scriptable in-memory cache for tests.
///
/// Files registered with [`add_file`](InMemoryLayoutCache::add_file) are
/// valid; everything else is not. Layouts can be flagged unsafe and given
/// observed durations.
#[derive(Debug, Default)]
pub struct InMemoryLayoutCache {
    inner: Mutex<InMemoryState>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    valid_files: HashSet<String>,
    unsafe_layouts: HashSet<i64>,
    durations: HashMap<i64, u32>,
}

impl InMemoryLayoutCache {
    /// Create an empty cache (no file is valid).
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a file as present and valid.
    pub fn add_file(&self, filename: impl Into<String>) {
        self.inner.lock().unwrap().valid_files.insert(filename.into());
    }

    /// Remove a previously valid file.
    pub fn remove_file(&self, filename: &str) {
        self.inner.lock().unwrap().valid_files.remove(filename);
    }

    /// Flag a layout as unsafe to play.
    pub fn mark_unsafe(&self, layout_id: i64) {
        self.inner.lock().unwrap().unsafe_layouts.insert(layout_id);
    }

    /// Record an observed run duration for a layout.
    pub fn set_duration(&self, layout_id: i64, seconds: u32) {
        self.inner.lock().unwrap().durations.insert(layout_id, seconds);
    }
}

impl LayoutCache for InMemoryLayoutCache {
    fn is_valid_path(&self, filename: &str) -> Result<bool, CacheError> {
        Ok(self.inner.lock().unwrap().valid_files.contains(filename))
    }

    fn is_unsafe_layout(&self, layout_id: i64) -> Result<bool, CacheError> {
        Ok(self.inner.lock().unwrap().unsafe_layouts.contains(&layout_id))
    }

    fn layout_duration(&self, layout_id: i64, fallback: u32) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .durations
            .get(&layout_id)
            .copied()
            .unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_cache_is_permissive() {
        let cache = NoOpLayoutCache;

        assert!(cache.is_valid_path("1.xlf").unwrap());
        assert!(!cache.is_unsafe_layout(1).unwrap());
        assert_eq!(cache.layout_duration(1, 60), 60);
    }

    #[test]
    fn test_in_memory_cache_validity() {
        let cache = InMemoryLayoutCache::new();
        assert!(!cache.is_valid_path("7.xlf").unwrap());

        cache.add_file("7.xlf");
        assert!(cache.is_valid_path("7.xlf").unwrap());

        cache.remove_file("7.xlf");
        assert!(!cache.is_valid_path("7.xlf").unwrap());
    }

    #[test]
    fn test_in_memory_cache_unsafe_and_durations() {
        let cache = InMemoryLayoutCache::new();

        cache.mark_unsafe(3);
        assert!(cache.is_unsafe_layout(3).unwrap());
        assert!(!cache.is_unsafe_layout(4).unwrap());

        cache.set_duration(3, 45);
        assert_eq!(cache.layout_duration(3, 60), 45);
        assert_eq!(cache.layout_duration(4, 60), 60);
    }

    #[test]
    fn test_cache_is_object_safe() {
        let cache: Box<dyn LayoutCache> = Box::new(NoOpLayoutCache);
        assert!(cache.is_valid_path("anything").unwrap());
    }
}
