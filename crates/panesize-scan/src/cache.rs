//! In-memory size cache shared by panes and scan jobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use panesize_core::{CacheKey, CacheRecord, ViewOptions};

/// Concurrent map of subtree sizes, scoped by view options.
///
/// Records live for the lifetime of the process. Cloning is cheap and
/// shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct SizeCache {
    records: Arc<DashMap<CacheKey, CacheRecord>>,
}

impl SizeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch lookup. The result has the same length and order as `paths`;
    /// `None` means the path has never been sized under these options.
    pub fn lookup(&self, paths: &[PathBuf], options: &ViewOptions) -> Vec<Option<CacheRecord>> {
        paths.iter().map(|p| self.get(p, options)).collect()
    }

    /// Look up a single path.
    pub fn get(&self, path: &Path, options: &ViewOptions) -> Option<CacheRecord> {
        self.records
            .get(&CacheKey::new(path, options))
            .map(|r| *r.value())
    }

    /// Store a best-known lower bound.
    ///
    /// Never lowers the stored byte count and never turns a completed record
    /// back into a partial one.
    pub fn record_partial(&self, path: &Path, options: &ViewOptions, bytes: u64, items: Option<u64>) {
        self.records
            .entry(CacheKey::new(path, options))
            .and_modify(|existing| {
                if !existing.completed && bytes >= existing.bytes {
                    *existing = CacheRecord::partial(bytes, items);
                }
            })
            .or_insert_with(|| CacheRecord::partial(bytes, items));
    }

    /// Store the result of a finished walk.
    pub fn record_complete(&self, path: &Path, options: &ViewOptions, bytes: u64, items: Option<u64>) {
        self.records
            .insert(CacheKey::new(path, options), CacheRecord::complete(bytes, items));
    }

    /// Drop every record at or below `path`, in every option scope.
    ///
    /// Ancestors are dropped too since their totals include the subtree.
    /// Returns the number of records removed.
    pub fn invalidate(&self, path: &Path) -> usize {
        let before = self.records.len();
        self.records
            .retain(|key, _| !(key.path.starts_with(path) || path.starts_with(&key.path)));
        before.saturating_sub(self.records.len())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the cache holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove all records.
    pub fn clear(&self) {
        self.records.clear();
    }
}
