//! Pane driver: navigation epochs, event loop and published views.

use std::future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use strum::Display;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace, warn};

use panesize_core::{
    CacheRecord, DirectoryEntry, ListError, NameFilter, ScanId, SizeEvent, ViewOptions, normalize_path,
};
use panesize_scan::{DirectoryLister, FsLister, JoinOutcome};

use crate::aggregator::{AggregatorState, ProgressOutcome};
use crate::backend::SizeBackend;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::projection::{Row, filter_entries, sort_entries};

/// Where the current navigation epoch is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochPhase {
    /// Nothing navigated yet.
    #[default]
    Idle,
    /// Reading the directory.
    Listing,
    /// Applying cached sizes.
    Prefilling,
    /// Settled from cache alone; no scan was requested.
    FastPath,
    /// Waiting for scan events.
    Scanning,
    /// Every size is final, or will not improve.
    Settled,
    /// The directory could not be listed.
    Failed,
}

impl EpochPhase {
    /// No further updates are expected for this epoch.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FastPath | Self::Settled | Self::Failed | Self::Idle)
    }
}

/// Snapshot published after every visible change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PaneView {
    pub path: Option<PathBuf>,
    pub scan_id: Option<ScanId>,
    /// Navigation counter; bumps once per navigate, refresh or option change.
    pub epoch: u64,
    pub phase: EpochPhase,
    pub rows: Vec<Row>,
    pub total_bytes: u64,
    pub item_count: Option<u64>,
    /// Children still waiting for a final size.
    pub scanning: usize,
    pub revision: u64,
    pub error: Option<String>,
}

struct Listing {
    entries: Vec<DirectoryEntry>,
    cached: Vec<Option<CacheRecord>>,
}

struct Loaded {
    token: u64,
    path: PathBuf,
    scan_id: ScanId,
    fresh: bool,
    result: std::result::Result<Listing, ListError>,
}

/// Everything a blocking listing needs, detached from the pane.
struct LoadRequest {
    token: u64,
    path: PathBuf,
    scan_id: ScanId,
    /// Replace a running job instead of joining it.
    fresh: bool,
    options: ViewOptions,
    filter: NameFilter,
    lister: Arc<dyn DirectoryLister>,
    backend: Arc<dyn SizeBackend>,
}

impl LoadRequest {
    fn run(self) -> Loaded {
        let result = self.list();
        Loaded {
            token: self.token,
            path: self.path,
            scan_id: self.scan_id,
            fresh: self.fresh,
            result,
        }
    }

    fn list(&self) -> std::result::Result<Listing, ListError> {
        let mut entries = self.lister.list(&self.path)?;
        filter_entries(&mut entries, &self.filter);
        sort_entries(&mut entries, &self.options.sort);

        let dir_paths: Vec<PathBuf> = entries
            .iter()
            .filter(|e| e.is_dir)
            .map(|e| self.path.join(e.name.as_str()))
            .collect();
        let mut found = self.backend.lookup_cached(&dir_paths, &self.options);
        if found.len() != dir_paths.len() {
            warn!(
                path = %self.path.display(),
                expected = dir_paths.len(),
                got = found.len(),
                "cache lookup misaligned, scanning every child"
            );
            found = vec![None; dir_paths.len()];
        }

        let mut found = found.into_iter();
        let cached = entries
            .iter()
            .map(|e| if e.is_dir { found.next().flatten() } else { None })
            .collect();

        Ok(Listing { entries, cached })
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

/// One browsing pane.
///
/// Owns the aggregation state of the current navigation and is driven by a
/// single task: either [`Pane::spawn`], or an embedder calling
/// [`Pane::navigate`] and [`Pane::next_update`] itself.
pub struct Pane {
    backend: Arc<dyn SizeBackend>,
    lister: Arc<dyn DirectoryLister>,
    config: EngineConfig,
    options: ViewOptions,
    filter: NameFilter,
    events: broadcast::Receiver<SizeEvent>,
    events_closed: bool,
    state: Option<AggregatorState>,
    path: Option<PathBuf>,
    scan_id: Option<ScanId>,
    phase: EpochPhase,
    error: Option<String>,
    token: u64,
    attached: Option<ScanId>,
    retiring: Option<ScanId>,
    flush_at: Option<Instant>,
    loads_tx: mpsc::UnboundedSender<Loaded>,
    loads_rx: mpsc::UnboundedReceiver<Loaded>,
    view_tx: watch::Sender<PaneView>,
    revision: u64,
}

impl Pane {
    /// Create a pane reading the real filesystem.
    ///
    /// The event subscription is taken here, before any navigation.
    pub fn new(backend: impl SizeBackend, options: ViewOptions, config: EngineConfig) -> Result<Self> {
        Self::with_lister(Arc::new(backend), Arc::new(FsLister::new()), options, config)
    }

    /// Create a pane with explicit backend and lister.
    pub fn with_lister(
        backend: Arc<dyn SizeBackend>,
        lister: Arc<dyn DirectoryLister>,
        options: ViewOptions,
        config: EngineConfig,
    ) -> Result<Self> {
        let filter = NameFilter::new(&options)?;
        let events = backend.subscribe();
        let (loads_tx, loads_rx) = mpsc::unbounded_channel();
        let (view_tx, _) = watch::channel(PaneView::default());

        Ok(Self {
            backend,
            lister,
            config,
            options,
            filter,
            events,
            events_closed: false,
            state: None,
            path: None,
            scan_id: None,
            phase: EpochPhase::Idle,
            error: None,
            token: 0,
            attached: None,
            retiring: None,
            flush_at: None,
            loads_tx,
            loads_rx,
            view_tx,
            revision: 0,
        })
    }

    /// Watch published views.
    pub fn view(&self) -> watch::Receiver<PaneView> {
        self.view_tx.subscribe()
    }

    /// Latest published view.
    pub fn current(&self) -> PaneView {
        self.view_tx.borrow().clone()
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn phase(&self) -> EpochPhase {
        self.phase
    }

    /// Aggregation state of the current epoch, once painted.
    pub fn state(&self) -> Option<&AggregatorState> {
        self.state.as_ref()
    }

    /// Navigate and wait for the first paint.
    ///
    /// Scan results keep arriving afterwards; drive them with
    /// [`Pane::next_update`].
    pub async fn navigate(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(EngineError::InvalidPath { path: path.to_path_buf() });
        }
        self.load(path, false).await
    }

    /// Re-read the current directory, forgetting its cached sizes.
    ///
    /// A scan still running for this directory is replaced, not joined.
    pub async fn refresh(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        self.backend.invalidate(&path);
        self.load(&path, true).await
    }

    async fn load(&mut self, path: &Path, fresh: bool) -> Result<()> {
        let request = self.begin(path, fresh);
        let token = request.token;
        let path = request.path.clone();
        let scan_id = request.scan_id;

        let loaded = tokio::task::spawn_blocking(move || request.run())
            .await
            .unwrap_or_else(|err| Loaded {
                token,
                path: path.clone(),
                scan_id,
                fresh,
                result: Err(ListError::io(&path, std::io::Error::other(err))),
            });
        self.apply_load(loaded)
    }

    /// Change view options and re-navigate the current directory.
    pub async fn set_options(&mut self, options: ViewOptions) -> Result<()> {
        self.filter = NameFilter::new(&options)?;
        self.options = options;
        match self.path.clone() {
            Some(path) => self.navigate(path).await,
            None => Ok(()),
        }
    }

    /// Wait for the next input and apply it.
    ///
    /// Returns `false` once the event stream has closed and nothing else
    /// can arrive.
    pub async fn next_update(&mut self) -> bool {
        if self.events_closed && self.flush_at.is_none() {
            return false;
        }
        let deadline = self.flush_at;
        let events_open = !self.events_closed;
        tokio::select! {
            biased;
            Some(loaded) = self.loads_rx.recv() => {
                if let Err(err) = self.apply_load(loaded) {
                    debug!(error = %err, "background navigation failed");
                }
            }
            received = self.events.recv(), if events_open => self.on_received(received),
            _ = sleep_until_opt(deadline) => self.flush_due(),
        }
        true
    }

    /// Move the pane onto its own task.
    pub fn spawn(self) -> PaneHandle {
        let (commands, rx) = mpsc::unbounded_channel();
        let view = self.view_tx.subscribe();
        let task = tokio::spawn(self.run(rx));
        PaneHandle {
            commands,
            view,
            epoch: Arc::new(AtomicU64::new(0)),
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let deadline = self.flush_at;
            let events_open = !self.events_closed;
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(loaded) = self.loads_rx.recv() => {
                    if let Err(err) = self.apply_load(loaded) {
                        debug!(error = %err, "navigation failed");
                    }
                }
                received = self.events.recv(), if events_open => self.on_received(received),
                _ = sleep_until_opt(deadline) => self.flush_due(),
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Navigate { path, reply } => {
                let request = self.begin(&path, false);
                let _ = reply.send(Ok(request.token));
                self.spawn_load(request);
            }
            Command::Refresh { reply } => {
                let Some(path) = self.path.clone() else {
                    let _ = reply.send(Ok(self.token));
                    return;
                };
                self.backend.invalidate(&path);
                let request = self.begin(&path, true);
                let _ = reply.send(Ok(request.token));
                self.spawn_load(request);
            }
            Command::SetOptions { options, reply } => {
                let filter = match NameFilter::new(&options) {
                    Ok(filter) => filter,
                    Err(err) => {
                        let _ = reply.send(Err(err.into()));
                        return;
                    }
                };
                self.filter = filter;
                self.options = *options;
                let Some(path) = self.path.clone() else {
                    let _ = reply.send(Ok(self.token));
                    return;
                };
                let request = self.begin(&path, false);
                let _ = reply.send(Ok(request.token));
                self.spawn_load(request);
            }
            Command::Shutdown => {}
        }
    }

    fn spawn_load(&self, request: LoadRequest) {
        let loads = self.loads_tx.clone();
        tokio::task::spawn_blocking(move || {
            // receiver gone means the pane shut down
            let _ = loads.send(request.run());
        });
    }

    /// Start a navigation epoch: supersede the old one and publish `Listing`.
    fn begin(&mut self, path: &Path, fresh: bool) -> LoadRequest {
        let path = normalize_path(path);
        let scan_id = ScanId::new(&path, &self.options);

        self.token += 1;
        if let Some(old) = self.attached.take()
            && let Some(previous) = self.retiring.replace(old)
        {
            self.backend.release(previous);
        }
        self.state = None;
        self.flush_at = None;
        self.path = Some(path.clone());
        self.scan_id = Some(scan_id);
        self.phase = EpochPhase::Listing;
        self.error = None;
        debug!(path = %path.display(), scan_id = %scan_id, epoch = self.token, "navigation started");
        self.publish();

        LoadRequest {
            token: self.token,
            path,
            scan_id,
            fresh,
            options: self.options.clone(),
            filter: self.filter.clone(),
            lister: self.lister.clone(),
            backend: self.backend.clone(),
        }
    }

    fn apply_load(&mut self, loaded: Loaded) -> Result<()> {
        if loaded.token != self.token {
            trace!(token = loaded.token, current = self.token, "stale listing dropped");
            return Ok(());
        }

        let listing = match loaded.result {
            Ok(listing) => listing,
            Err(err) => {
                warn!(path = %loaded.path.display(), error = %err, "directory listing failed");
                self.phase = EpochPhase::Failed;
                self.error = Some(err.to_string());
                self.release_retiring();
                self.publish();
                return Err(err.into());
            }
        };

        self.phase = EpochPhase::Prefilling;
        let mut state = AggregatorState::prefill(loaded.scan_id, &listing.entries, &listing.cached);

        if state.is_settled() {
            self.phase = EpochPhase::FastPath;
        } else {
            let same_identity = self.retiring == Some(loaded.scan_id);
            let requested = if loaded.fresh {
                // detach first so the replacement only counts live subscribers
                if same_identity {
                    self.release_retiring();
                }
                self.backend.restart(&loaded.path, loaded.scan_id, &self.options)
            } else {
                self.backend.start_or_join(&loaded.path, loaded.scan_id, &self.options)
            };
            match requested {
                Ok(outcome) => {
                    debug!(scan_id = %loaded.scan_id, ?outcome, pending = state.scanning_count(), "scan requested");
                    if outcome == JoinOutcome::Started && same_identity {
                        // the old attachment has no job left to release
                        self.retiring = None;
                    }
                    self.attached = Some(loaded.scan_id);
                    self.phase = EpochPhase::Scanning;
                }
                Err(err) => {
                    warn!(scan_id = %loaded.scan_id, error = %err, "scan could not start, keeping provisional sizes");
                    state.abandon_scan();
                    self.phase = EpochPhase::Settled;
                }
            }
        }

        self.state = Some(state);
        self.release_retiring();
        self.publish();
        Ok(())
    }

    fn release_retiring(&mut self) {
        if let Some(old) = self.retiring.take() {
            self.backend.release(old);
        }
    }

    fn on_received(&mut self, received: std::result::Result<SizeEvent, RecvError>) {
        match received {
            Ok(event) => self.on_event(event),
            Err(RecvError::Lagged(missed)) => {
                debug!(missed, "size events lagged, resyncing from cache");
                self.resync();
            }
            Err(RecvError::Closed) => {
                debug!("size event stream closed");
                self.events_closed = true;
            }
        }
    }

    fn on_event(&mut self, event: SizeEvent) {
        let Some(state) = self.state.as_mut() else {
            trace!(scan_id = %event.scan_id(), "event before paint dropped");
            return;
        };

        match event {
            SizeEvent::Progress { scan_id, name, bytes } => {
                match state.on_progress(scan_id, &name, bytes, self.config.burst_threshold) {
                    ProgressOutcome::Ignored => {}
                    ProgressOutcome::Buffered => {
                        if self.flush_at.is_none() {
                            self.flush_at = Some(Instant::now() + self.config.flush_interval());
                        }
                    }
                    ProgressOutcome::FlushNow => {
                        self.flush_at = None;
                        if state.flush() {
                            self.publish();
                        }
                    }
                }
            }
            SizeEvent::ChildComplete { scan_id, name, bytes, .. } => {
                if state.on_child_complete(scan_id, &name, bytes) {
                    if !state.has_pending() {
                        self.flush_at = None;
                    }
                    self.publish();
                }
            }
            SizeEvent::Summary { scan_id, bytes, items } => {
                if state.on_summary(scan_id, bytes, items) {
                    self.flush_at = None;
                    self.phase = EpochPhase::Settled;
                    // the job removed itself
                    self.attached = None;
                    self.publish();
                }
            }
        }
    }

    fn flush_due(&mut self) {
        self.flush_at = None;
        if let Some(state) = self.state.as_mut()
            && state.flush()
        {
            self.publish();
        }
    }

    fn resync(&mut self) {
        let (Some(state), Some(path)) = (self.state.as_mut(), self.path.as_ref()) else {
            return;
        };
        if state.is_summarized() {
            return;
        }

        let names = state.scanning_names();
        let mut paths: Vec<PathBuf> = names.iter().map(|n| path.join(n.as_str())).collect();
        paths.push(path.clone());
        let mut records = self.backend.lookup_cached(&paths, &self.options);
        records.resize(paths.len(), None);
        let root = records.pop().flatten();

        let mut changed = state.resync(&names, &records);
        if let Some(root) = root.filter(|r| r.completed) {
            changed |= state.on_summary(state.scan_id(), root.bytes, root.items);
            self.phase = EpochPhase::Settled;
            self.attached = None;
        }
        if changed {
            self.flush_at = None;
            self.publish();
        }
    }

    fn publish(&mut self) {
        self.revision += 1;
        let view = PaneView {
            path: self.path.clone(),
            scan_id: self.scan_id,
            epoch: self.token,
            phase: self.phase,
            rows: self.state.as_ref().map(|s| s.rows().to_vec()).unwrap_or_default(),
            total_bytes: self.state.as_ref().map_or(0, AggregatorState::running_total),
            item_count: self.state.as_ref().and_then(AggregatorState::item_count),
            scanning: self.state.as_ref().map_or(0, AggregatorState::scanning_count),
            revision: self.revision,
            error: self.error.clone(),
        };
        self.view_tx.send_replace(view);
    }

    fn teardown(&mut self) {
        self.flush_at = None;
        self.state = None;
        self.release_retiring();
        if let Some(scan_id) = self.attached.take() {
            self.backend.release(scan_id);
        }
        debug!(epoch = self.token, "pane shut down");
    }
}

impl Drop for Pane {
    fn drop(&mut self) {
        self.teardown();
    }
}

enum Command {
    Navigate {
        path: PathBuf,
        reply: oneshot::Sender<Result<u64>>,
    },
    Refresh {
        reply: oneshot::Sender<Result<u64>>,
    },
    SetOptions {
        options: Box<ViewOptions>,
        reply: oneshot::Sender<Result<u64>>,
    },
    Shutdown,
}

/// Handle to a pane running on its own task.
pub struct PaneHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<PaneView>,
    epoch: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl PaneHandle {
    async fn request(&self, make: impl FnOnce(oneshot::Sender<Result<u64>>) -> Command) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| EngineError::ChannelClosed)?;
        let epoch = rx.await.map_err(|_| EngineError::ChannelClosed)??;
        self.epoch.fetch_max(epoch, Ordering::AcqRel);
        Ok(epoch)
    }

    /// Navigate to `path`. Returns the new epoch number.
    pub async fn navigate(&self, path: impl Into<PathBuf>) -> Result<u64> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(EngineError::InvalidPath { path });
        }
        self.request(|reply| Command::Navigate { path, reply }).await
    }

    /// Rescan the current directory.
    pub async fn refresh(&self) -> Result<u64> {
        self.request(|reply| Command::Refresh { reply }).await
    }

    /// Replace the view options; the current directory is re-navigated.
    pub async fn set_options(&self, options: ViewOptions) -> Result<u64> {
        let options = Box::new(options);
        self.request(|reply| Command::SetOptions { options, reply }).await
    }

    /// Watch published views.
    pub fn view(&self) -> watch::Receiver<PaneView> {
        self.view.clone()
    }

    /// Latest published view.
    pub fn current(&self) -> PaneView {
        self.view.borrow().clone()
    }

    /// Wait until the latest requested epoch stops changing.
    pub async fn wait_settled(&self) -> Result<PaneView> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let mut view = self.view.clone();
        let settled = view
            .wait_for(|v| v.epoch >= epoch && v.phase.is_terminal())
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(settled.clone())
    }

    /// Stop the pane task and release its scan.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(err) = self.task.await {
            warn!(error = %err, "pane task ended abnormally");
        }
    }
}
