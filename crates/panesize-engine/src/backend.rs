//! The seam between a pane and whatever computes directory sizes.

use std::path::{Path, PathBuf};

use tokio::sync::broadcast;

use panesize_core::{CacheRecord, ScanError, ScanId, SizeEvent, ViewOptions};
use panesize_scan::{JoinOutcome, ScanCoordinator};

/// Size source driven by a pane.
///
/// Implemented by [`ScanCoordinator`]; tests substitute a fake that records
/// calls and injects events.
pub trait SizeBackend: Send + Sync + 'static {
    /// Batch cache lookup, same order and length as `paths`.
    fn lookup_cached(&self, paths: &[PathBuf], options: &ViewOptions) -> Vec<Option<CacheRecord>>;

    /// Start or join the job for `scan_id`. Must not block.
    fn start_or_join(&self, root: &Path, scan_id: ScanId, options: &ViewOptions) -> Result<JoinOutcome, ScanError>;

    /// Start a fresh job for `scan_id`, replacing a running one, so nothing
    /// computed before a refresh is replayed.
    fn restart(&self, root: &Path, scan_id: ScanId, options: &ViewOptions) -> Result<JoinOutcome, ScanError> {
        self.cancel(scan_id);
        self.start_or_join(root, scan_id, options)
    }

    /// Subscribe to size events.
    fn subscribe(&self) -> broadcast::Receiver<SizeEvent>;

    /// Stop a job.
    fn cancel(&self, scan_id: ScanId) -> bool;

    /// Detach from a job this pane started or joined.
    fn release(&self, scan_id: ScanId) -> bool {
        self.cancel(scan_id)
    }

    /// Forget cached sizes around `path`.
    fn invalidate(&self, path: &Path) -> usize;
}

impl SizeBackend for ScanCoordinator {
    fn lookup_cached(&self, paths: &[PathBuf], options: &ViewOptions) -> Vec<Option<CacheRecord>> {
        ScanCoordinator::lookup_cached(self, paths, options)
    }

    fn start_or_join(&self, root: &Path, scan_id: ScanId, options: &ViewOptions) -> Result<JoinOutcome, ScanError> {
        ScanCoordinator::start_or_join(self, root, scan_id, options)
    }

    fn restart(&self, root: &Path, scan_id: ScanId, options: &ViewOptions) -> Result<JoinOutcome, ScanError> {
        ScanCoordinator::restart(self, root, scan_id, options)
    }

    fn subscribe(&self) -> broadcast::Receiver<SizeEvent> {
        ScanCoordinator::subscribe(self)
    }

    fn cancel(&self, scan_id: ScanId) -> bool {
        ScanCoordinator::cancel(self, scan_id)
    }

    fn release(&self, scan_id: ScanId) -> bool {
        ScanCoordinator::release(self, scan_id)
    }

    fn invalidate(&self, path: &Path) -> usize {
        ScanCoordinator::invalidate(self, path)
    }
}
