//! Background scan jobs keyed by scan identity.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use compact_str::CompactString;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use panesize_core::{CacheRecord, NameFilter, ScanError, ScanId, SizeEvent, ViewOptions};

use crate::cache::SizeCache;
use crate::config::CoordinatorConfig;
use crate::walk::{DirTotals, read_root, walk_subtree};

/// Result of [`ScanCoordinator::start_or_join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new job was spawned.
    Started,
    /// A job with the same identity was already running.
    Joined,
}

/// Finished children of a running job: name -> (bytes, items).
type FinishedChildren = Arc<DashMap<CompactString, (u64, Option<u64>)>>;

#[derive(Debug)]
struct JobHandle {
    generation: u64,
    attached: usize,
    cancel: CancellationToken,
    finished: FinishedChildren,
}

#[derive(Debug)]
struct Inner {
    config: CoordinatorConfig,
    cache: SizeCache,
    events: broadcast::Sender<SizeEvent>,
    jobs: DashMap<ScanId, JobHandle>,
    next_generation: AtomicU64,
}

impl Inner {
    fn emit(&self, event: SizeEvent) {
        if self.events.send(event).is_err() {
            trace!("size event dropped, no subscribers");
        }
    }

    /// Drop a job from the registry. `false` if it was already cancelled
    /// or replaced.
    fn finish(&self, scan_id: ScanId, generation: u64) -> bool {
        self.jobs
            .remove_if(&scan_id, |_, job| job.generation == generation)
            .is_some()
    }
}

/// Runs at most one recursive size job per scan identity and streams the
/// results over a shared broadcast channel.
///
/// Cloning is cheap; clones share jobs, cache and channel.
#[derive(Debug, Clone)]
pub struct ScanCoordinator {
    inner: Arc<Inner>,
}

impl Default for ScanCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl ScanCoordinator {
    /// Create a coordinator with its own empty cache.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_cache(config, SizeCache::new())
    }

    /// Create a coordinator that reads and writes `cache`.
    pub fn with_cache(config: CoordinatorConfig, cache: SizeCache) -> Self {
        let config = config.sanitized();
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                cache,
                events,
                jobs: DashMap::new(),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Coordinator configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// The shared size cache.
    pub fn cache(&self) -> &SizeCache {
        &self.inner.cache
    }

    /// Batch cache lookup, same order and length as `paths`.
    pub fn lookup_cached(&self, paths: &[PathBuf], options: &ViewOptions) -> Vec<Option<CacheRecord>> {
        self.inner.cache.lookup(paths, options)
    }

    /// Subscribe to the event stream of every job.
    ///
    /// Only events sent after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<SizeEvent> {
        self.inner.events.subscribe()
    }

    /// Start sizing the children of `root`, or join the running job with
    /// the same identity.
    ///
    /// Returns immediately; results arrive as [`SizeEvent`]s tagged with
    /// `scan_id`. Joining re-emits `ChildComplete` for children the job has
    /// already finished. Must be called from within a tokio runtime.
    pub fn start_or_join(
        &self,
        root: &Path,
        scan_id: ScanId,
        options: &ViewOptions,
    ) -> Result<JoinOutcome, ScanError> {
        let runtime = Handle::try_current().map_err(|e| ScanError::NoRuntime {
            message: e.to_string(),
        })?;
        let filter = NameFilter::new(options)?;

        match self.inner.jobs.entry(scan_id) {
            Entry::Occupied(mut occupied) => {
                let finished = {
                    let job = occupied.get_mut();
                    job.attached += 1;
                    job.finished.clone()
                };
                drop(occupied);

                debug!(scan_id = %scan_id, replayed = finished.len(), "joined running scan");
                for item in finished.iter() {
                    let (bytes, items) = *item.value();
                    self.inner.emit(SizeEvent::ChildComplete {
                        scan_id,
                        name: item.key().clone(),
                        bytes,
                        items,
                    });
                }
                Ok(JoinOutcome::Joined)
            }
            Entry::Vacant(vacant) => {
                let (handle, job) = self.new_job(root, scan_id, options, filter, 1);
                vacant.insert(handle);
                runtime.spawn(job.run());
                Ok(JoinOutcome::Started)
            }
        }
    }

    /// Start a fresh job for `scan_id`, replacing a running one.
    ///
    /// The replaced job is cancelled and stops writing to the cache. Its
    /// subscribers stay attached to the new job, which re-reads every child
    /// instead of replaying earlier results. Always returns
    /// [`JoinOutcome::Started`].
    pub fn restart(
        &self,
        root: &Path,
        scan_id: ScanId,
        options: &ViewOptions,
    ) -> Result<JoinOutcome, ScanError> {
        let runtime = Handle::try_current().map_err(|e| ScanError::NoRuntime {
            message: e.to_string(),
        })?;
        let filter = NameFilter::new(options)?;

        let job = match self.inner.jobs.entry(scan_id) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.get();
                previous.cancel.cancel();
                let attached = previous.attached + 1;
                debug!(scan_id = %scan_id, attached, "running scan replaced");
                let (handle, job) = self.new_job(root, scan_id, options, filter, attached);
                occupied.insert(handle);
                job
            }
            Entry::Vacant(vacant) => {
                let (handle, job) = self.new_job(root, scan_id, options, filter, 1);
                vacant.insert(handle);
                job
            }
        };
        runtime.spawn(job.run());
        Ok(JoinOutcome::Started)
    }

    fn new_job(
        &self,
        root: &Path,
        scan_id: ScanId,
        options: &ViewOptions,
        filter: NameFilter,
        attached: usize,
    ) -> (JobHandle, Arc<Job>) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let finished = FinishedChildren::default();
        let handle = JobHandle {
            generation,
            attached,
            cancel: cancel.clone(),
            finished: finished.clone(),
        };
        let job = Arc::new(Job {
            inner: self.inner.clone(),
            root: root.to_path_buf(),
            scan_id,
            generation,
            options: options.clone(),
            filter,
            cancel,
            finished,
        });
        (handle, job)
    }

    /// Detach one subscriber from a job; the job is cancelled once nobody
    /// is attached. Returns `true` if this call cancelled it.
    pub fn release(&self, scan_id: ScanId) -> bool {
        let released = self.inner.jobs.remove_if_mut(&scan_id, |_, job| {
            job.attached = job.attached.saturating_sub(1);
            job.attached == 0
        });
        match released {
            Some((_, job)) => {
                job.cancel.cancel();
                debug!(scan_id = %scan_id, "released scan job cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel a running job regardless of attachments.
    ///
    /// The job stops emitting; no `Summary` follows. Returns `false` if no
    /// job with this identity is running.
    pub fn cancel(&self, scan_id: ScanId) -> bool {
        match self.inner.jobs.remove(&scan_id) {
            Some((_, job)) => {
                job.cancel.cancel();
                debug!(scan_id = %scan_id, "scan job cancelled");
                true
            }
            None => false,
        }
    }

    /// Number of running jobs.
    pub fn active_jobs(&self) -> usize {
        self.inner.jobs.len()
    }

    /// Check if a job with this identity is running.
    pub fn is_running(&self, scan_id: ScanId) -> bool {
        self.inner.jobs.contains_key(&scan_id)
    }

    /// Forget cached sizes at, below and above `path`.
    pub fn invalidate(&self, path: &Path) -> usize {
        self.inner.cache.invalidate(path)
    }
}

/// State of one running job, shared by its child tasks.
struct Job {
    inner: Arc<Inner>,
    root: PathBuf,
    scan_id: ScanId,
    generation: u64,
    options: ViewOptions,
    filter: NameFilter,
    cancel: CancellationToken,
    finished: FinishedChildren,
}

impl Job {
    async fn run(self: Arc<Self>) {
        info!(scan_id = %self.scan_id, path = %self.root.display(), "scan job started");

        let listing = {
            let job = self.clone();
            tokio::task::spawn_blocking(move || read_root(&job.root, &job.filter)).await
        };
        let listing = match listing {
            Ok(Ok(listing)) => listing,
            Ok(Err(err)) => {
                warn!(scan_id = %self.scan_id, error = %err, "scan root unreadable");
                self.conclude(0, None);
                return;
            }
            Err(err) => {
                warn!(scan_id = %self.scan_id, error = %err, "scan root task failed");
                self.conclude(0, None);
                return;
            }
        };
        if self.cancel.is_cancelled() {
            self.inner.finish(self.scan_id, self.generation);
            return;
        }

        let mut total_bytes = listing.file_bytes;
        let mut total_items = listing.file_count;
        let mut to_walk = Vec::new();

        for name in listing.children {
            let child = self.root.join(name.as_str());
            match self.inner.cache.get(&child, &self.options) {
                Some(record) if record.completed => {
                    total_bytes = total_bytes.saturating_add(record.bytes);
                    total_items += record.items.unwrap_or(0);
                    self.complete_child(name, record.bytes, record.items);
                }
                Some(record) => {
                    if record.bytes > 0 {
                        self.inner.emit(SizeEvent::Progress {
                            scan_id: self.scan_id,
                            name: name.clone(),
                            bytes: record.bytes,
                        });
                    }
                    to_walk.push(name);
                }
                None => to_walk.push(name),
            }
        }

        debug!(
            scan_id = %self.scan_id,
            cached = self.finished.len(),
            walking = to_walk.len(),
            "scan job children resolved"
        );

        let semaphore = Arc::new(Semaphore::new(self.inner.config.max_concurrent_children));
        let mut children = JoinSet::new();
        for name in to_walk {
            children.spawn(self.clone().walk_child(name, semaphore.clone()));
        }

        let mut warnings = 0usize;
        while let Some(result) = children.join_next().await {
            match result {
                Ok(Some(totals)) => {
                    total_bytes = total_bytes.saturating_add(totals.bytes);
                    total_items += totals.files;
                    warnings += totals.warnings.len();
                }
                Ok(None) => {}
                Err(err) => warn!(scan_id = %self.scan_id, error = %err, "child walk task failed"),
            }
        }

        if self.cancel.is_cancelled() {
            debug!(scan_id = %self.scan_id, partial_bytes = total_bytes, "scan job stopped early");
            self.inner.finish(self.scan_id, self.generation);
            return;
        }

        self.inner.cache.record_complete(
            &self.root,
            &self.options,
            total_bytes,
            Some(total_items),
        );
        if self.conclude(total_bytes, Some(total_items)) {
            info!(
                scan_id = %self.scan_id,
                bytes = total_bytes,
                items = total_items,
                warnings,
                "scan job finished"
            );
        }
    }

    /// Leave the registry, then send the one `Summary` of this job.
    ///
    /// A caller that arrives after the registry entry is gone starts a new
    /// job instead of joining one whose `Summary` it would miss. Returns
    /// `false` if the job was cancelled or replaced and sent nothing.
    fn conclude(&self, bytes: u64, items: Option<u64>) -> bool {
        let current = self.inner.finish(self.scan_id, self.generation);
        if !current || self.cancel.is_cancelled() {
            return false;
        }
        self.inner.emit(SizeEvent::Summary {
            scan_id: self.scan_id,
            bytes,
            items,
        });
        true
    }

    /// No newer job for the same identity has taken over.
    fn owns_cache(&self) -> bool {
        self.inner
            .jobs
            .get(&self.scan_id)
            .is_none_or(|job| job.generation == self.generation)
    }

    /// Walk one child subtree; `None` if the job was cancelled first.
    async fn walk_child(
        self: Arc<Self>,
        name: CompactString,
        semaphore: Arc<Semaphore>,
    ) -> Option<DirTotals> {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return None,
            },
        };

        let child = self.root.join(name.as_str());
        let job = self.clone();
        let progress_name = name.clone();
        let walked = tokio::task::spawn_blocking(move || {
            let totals = walk_subtree(&child, &job.filter, &job.inner.config, &job.cancel, |bytes, files| {
                if job.cancel.is_cancelled() {
                    return;
                }
                job.inner
                    .cache
                    .record_partial(&child, &job.options, bytes, Some(files));
                job.inner.emit(SizeEvent::Progress {
                    scan_id: job.scan_id,
                    name: progress_name.clone(),
                    bytes,
                });
            });
            (child, totals)
        })
        .await;

        let (child, totals) = match walked {
            Ok(walked) => walked,
            Err(err) => {
                warn!(scan_id = %self.scan_id, child = %name, error = %err, "child walk panicked");
                return None;
            }
        };

        if totals.cancelled || self.cancel.is_cancelled() {
            if self.owns_cache() {
                self.inner
                    .cache
                    .record_partial(&child, &self.options, totals.bytes, Some(totals.files));
            }
            return None;
        }

        if !totals.warnings.is_empty() {
            debug!(
                scan_id = %self.scan_id,
                child = %name,
                warnings = totals.warnings.len(),
                "child walked with unreadable entries"
            );
        }
        self.inner
            .cache
            .record_complete(&child, &self.options, totals.bytes, Some(totals.files));
        self.complete_child(name, totals.bytes, Some(totals.files));
        Some(totals)
    }

    fn complete_child(&self, name: CompactString, bytes: u64, items: Option<u64>) {
        self.finished.insert(name.clone(), (bytes, items));
        self.inner.emit(SizeEvent::ChildComplete {
            scan_id: self.scan_id,
            name,
            bytes,
            items,
        });
    }
}
