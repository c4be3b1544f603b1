use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use panesize_core::{
    CacheRecord, DirectoryEntry, ListError, ScanError, ScanId, SizeEvent, ViewOptions,
};
use panesize_engine::{EngineConfig, EpochPhase, Pane, PaneHandle, PaneView, SizeBackend};
use panesize_scan::{DirectoryLister, JoinOutcome, ScanCoordinator};
use tempfile::TempDir;
use tokio::sync::broadcast;

struct FakeInner {
    events: broadcast::Sender<SizeEvent>,
    cache: Mutex<HashMap<PathBuf, CacheRecord>>,
    starts: Mutex<Vec<(PathBuf, ScanId)>>,
    released: Mutex<Vec<ScanId>>,
    restarts: Mutex<Vec<ScanId>>,
    fail_start: AtomicBool,
}

/// Backend that records calls and lets the test inject events.
#[derive(Clone)]
struct FakeBackend {
    inner: Arc<FakeInner>,
}

impl FakeBackend {
    fn new() -> Self {
        Self::with_capacity(1024)
    }

    fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(FakeInner {
                events,
                cache: Mutex::new(HashMap::new()),
                starts: Mutex::new(Vec::new()),
                released: Mutex::new(Vec::new()),
                restarts: Mutex::new(Vec::new()),
                fail_start: AtomicBool::new(false),
            }),
        }
    }

    fn cache(&self, path: &str, record: CacheRecord) {
        self.inner
            .cache
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), record);
    }

    fn emit(&self, event: SizeEvent) {
        let _ = self.inner.events.send(event);
    }

    fn starts(&self) -> Vec<(PathBuf, ScanId)> {
        self.inner.starts.lock().unwrap().clone()
    }

    fn released(&self) -> Vec<ScanId> {
        self.inner.released.lock().unwrap().clone()
    }

    fn restarts(&self) -> Vec<ScanId> {
        self.inner.restarts.lock().unwrap().clone()
    }
}

impl SizeBackend for FakeBackend {
    fn lookup_cached(&self, paths: &[PathBuf], _options: &ViewOptions) -> Vec<Option<CacheRecord>> {
        let cache = self.inner.cache.lock().unwrap();
        paths.iter().map(|p| cache.get(p).copied()).collect()
    }

    fn start_or_join(&self, root: &Path, scan_id: ScanId, _options: &ViewOptions) -> Result<JoinOutcome, ScanError> {
        if self.inner.fail_start.load(Ordering::SeqCst) {
            return Err(ScanError::Other {
                message: "refused".to_string(),
            });
        }
        self.inner
            .starts
            .lock()
            .unwrap()
            .push((root.to_path_buf(), scan_id));
        Ok(JoinOutcome::Started)
    }

    fn restart(&self, root: &Path, scan_id: ScanId, options: &ViewOptions) -> Result<JoinOutcome, ScanError> {
        self.inner.restarts.lock().unwrap().push(scan_id);
        self.start_or_join(root, scan_id, options)
    }

    fn subscribe(&self) -> broadcast::Receiver<SizeEvent> {
        self.inner.events.subscribe()
    }

    fn cancel(&self, scan_id: ScanId) -> bool {
        self.inner.released.lock().unwrap().push(scan_id);
        true
    }

    fn invalidate(&self, path: &Path) -> usize {
        let mut cache = self.inner.cache.lock().unwrap();
        let before = cache.len();
        cache.retain(|p, _| !(p.starts_with(path) || path.starts_with(p)));
        before - cache.len()
    }
}

#[derive(Default)]
struct FakeLister {
    dirs: HashMap<PathBuf, Vec<DirectoryEntry>>,
}

impl FakeLister {
    fn with(mut self, path: &str, entries: Vec<DirectoryEntry>) -> Self {
        self.dirs.insert(PathBuf::from(path), entries);
        self
    }
}

impl DirectoryLister for FakeLister {
    fn list(&self, path: &Path) -> Result<Vec<DirectoryEntry>, ListError> {
        self.dirs.get(path).cloned().ok_or_else(|| ListError::NotFound {
            path: path.to_path_buf(),
        })
    }
}

const ROOT: &str = "/panesize-test/root";
const OTHER: &str = "/panesize-test/other";

/// Files a=100, b=200; X cached complete at 500; Y unknown.
fn scenario() -> (FakeBackend, FakeLister) {
    let backend = FakeBackend::new();
    backend.cache(&format!("{ROOT}/X"), CacheRecord::complete(500, Some(4)));
    let lister = FakeLister::default()
        .with(
            ROOT,
            vec![
                DirectoryEntry::file("a", 100, None),
                DirectoryEntry::directory("Y", None),
                DirectoryEntry::file("b", 200, None),
                DirectoryEntry::directory("X", None),
            ],
        )
        .with(
            OTHER,
            vec![DirectoryEntry::file("only", 1, None)],
        );
    (backend, lister)
}

fn spawn_pane(backend: &FakeBackend, lister: FakeLister) -> PaneHandle {
    Pane::with_lister(
        Arc::new(backend.clone()),
        Arc::new(lister),
        ViewOptions::default(),
        EngineConfig::default(),
    )
    .unwrap()
    .spawn()
}

async fn wait_view(handle: &PaneHandle, mut ready: impl FnMut(&PaneView) -> bool) -> PaneView {
    let mut view = handle.view();
    let found = tokio::time::timeout(Duration::from_secs(30), view.wait_for(|v| ready(v)))
        .await
        .expect("view never reached the expected state")
        .unwrap();
    found.clone()
}

fn label<'a>(view: &'a PaneView, name: &str) -> &'a str {
    view.rows
        .iter()
        .find(|r| r.name.as_str() == name)
        .map(|r| r.label.as_str())
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_scenario_progress_completion_summary() {
    let (backend, lister) = scenario();
    let handle = spawn_pane(&backend, lister);
    handle.navigate(ROOT).await.unwrap();

    let view = wait_view(&handle, |v| v.phase == EpochPhase::Scanning).await;
    assert_eq!(view.total_bytes, 800);
    assert_eq!(view.scanning, 1);
    assert_eq!(label(&view, "X"), "500B");
    assert_eq!(label(&view, "Y"), "0B (scanning…)");
    let names: Vec<_> = view.rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["..", "X", "Y", "a", "b"]);

    let scan_id = view.scan_id.unwrap();
    assert_eq!(backend.starts(), vec![(PathBuf::from(ROOT), scan_id)]);

    backend.emit(SizeEvent::Progress {
        scan_id,
        name: "Y".into(),
        bytes: 300,
    });
    let view = wait_view(&handle, |v| v.total_bytes == 1100).await;
    assert_eq!(label(&view, "Y"), "300B (scanning…)");

    backend.emit(SizeEvent::ChildComplete {
        scan_id,
        name: "Y".into(),
        bytes: 450,
        items: Some(2),
    });
    let view = wait_view(&handle, |v| v.total_bytes == 1250).await;
    assert_eq!(label(&view, "Y"), "450B");
    assert_eq!(view.scanning, 0);

    backend.emit(SizeEvent::Summary {
        scan_id,
        bytes: 1250,
        items: Some(8),
    });
    let view = wait_view(&handle, |v| v.phase == EpochPhase::Settled).await;
    assert_eq!(view.total_bytes, 1250);
    assert_eq!(view.item_count, Some(8));
    assert!(view.rows.iter().all(|r| !r.scanning && !r.label.contains("scanning")));

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_foreign_scan_id_has_no_effect() {
    let (backend, lister) = scenario();
    let handle = spawn_pane(&backend, lister);
    handle.navigate(ROOT).await.unwrap();
    let before = wait_view(&handle, |v| v.phase == EpochPhase::Scanning).await;

    let foreign = ScanId::from_key("/somewhere/else|false|");
    backend.emit(SizeEvent::Progress {
        scan_id: foreign,
        name: "Y".into(),
        bytes: 5000,
    });
    backend.emit(SizeEvent::ChildComplete {
        scan_id: foreign,
        name: "Y".into(),
        bytes: 5000,
        items: None,
    });
    backend.emit(SizeEvent::Summary {
        scan_id: foreign,
        bytes: 99_999,
        items: None,
    });
    tokio::time::sleep(Duration::from_millis(500)).await;

    let after = handle.current();
    assert_eq!(after.revision, before.revision);
    assert_eq!(after.total_bytes, 800);
    assert_eq!(after.phase, EpochPhase::Scanning);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_fast_path_never_starts_scan() {
    let (backend, lister) = scenario();
    backend.cache(&format!("{ROOT}/Y"), CacheRecord::complete(50, Some(1)));
    let handle = spawn_pane(&backend, lister);
    handle.navigate(ROOT).await.unwrap();

    let view = handle.wait_settled().await.unwrap();
    assert_eq!(view.phase, EpochPhase::FastPath);
    assert_eq!(view.total_bytes, 850);
    assert_eq!(view.item_count, Some(7));
    assert!(backend.starts().is_empty());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_keeps_provisional_rows() {
    let (backend, lister) = scenario();
    backend.cache(&format!("{ROOT}/Y"), CacheRecord::partial(30, None));
    backend.inner.fail_start.store(true, Ordering::SeqCst);
    let handle = spawn_pane(&backend, lister);
    handle.navigate(ROOT).await.unwrap();

    let view = handle.wait_settled().await.unwrap();
    assert_eq!(view.phase, EpochPhase::Settled);
    assert_eq!(view.scanning, 0);
    assert_eq!(view.total_bytes, 830);
    assert_eq!(label(&view, "Y"), "30B (scanning…)");
    assert!(view.error.is_none());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_listing_failure_fails_epoch() {
    let (backend, lister) = scenario();
    let handle = spawn_pane(&backend, lister);
    handle.navigate("/panesize-test/missing").await.unwrap();

    let view = handle.wait_settled().await.unwrap();
    assert_eq!(view.phase, EpochPhase::Failed);
    assert!(view.error.unwrap().contains("missing"));
    assert!(view.rows.is_empty());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_progress_bursts_are_batched() {
    let (backend, lister) = scenario();
    let handle = spawn_pane(&backend, lister);
    handle.navigate(ROOT).await.unwrap();
    let start = wait_view(&handle, |v| v.phase == EpochPhase::Scanning).await;
    let scan_id = start.scan_id.unwrap();

    let mut observed_max = 0;
    for i in 1..=200u64 {
        let bytes = i * 1000;
        observed_max = observed_max.max(bytes);
        backend.emit(SizeEvent::Progress {
            scan_id,
            name: "Y".into(),
            bytes,
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    let end = handle.current();
    assert!(end.revision - start.revision <= 3, "{} updates", end.revision - start.revision);
    assert!(end.revision > start.revision);
    assert_eq!(end.total_bytes, 800 + observed_max);
    assert_eq!(label(&end, "Y"), "195.31KiB (scanning…)");
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_burst_flushes_immediately() {
    let (backend, lister) = scenario();
    let handle = spawn_pane(&backend, lister);
    handle.navigate(ROOT).await.unwrap();
    let start = wait_view(&handle, |v| v.phase == EpochPhase::Scanning).await;

    backend.emit(SizeEvent::Progress {
        scan_id: start.scan_id.unwrap(),
        name: "Y".into(),
        bytes: 9 * 1024 * 1024,
    });
    let view = wait_view(&handle, |v| v.revision > start.revision).await;
    assert_eq!(view.total_bytes, 800 + 9 * 1024 * 1024);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_navigation_supersedes_previous_epoch() {
    let (backend, lister) = scenario();
    let handle = spawn_pane(&backend, lister);
    handle.navigate(ROOT).await.unwrap();
    let first = wait_view(&handle, |v| v.phase == EpochPhase::Scanning).await;
    let old_id = first.scan_id.unwrap();

    handle.navigate(OTHER).await.unwrap();
    let second = handle.wait_settled().await.unwrap();
    assert_eq!(second.phase, EpochPhase::FastPath);
    assert_eq!(second.total_bytes, 1);
    assert_eq!(backend.released(), vec![old_id]);

    backend.emit(SizeEvent::ChildComplete {
        scan_id: old_id,
        name: "only".into(),
        bytes: 10_000,
        items: None,
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.current().total_bytes, 1);
    assert_eq!(handle.current().revision, second.revision);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_lagged_receiver_resyncs_from_cache() {
    let (_, lister) = scenario();
    let backend = FakeBackend::with_capacity(4);
    backend.cache(&format!("{ROOT}/X"), CacheRecord::complete(500, Some(4)));
    let handle = spawn_pane(&backend, lister);
    handle.navigate(ROOT).await.unwrap();
    wait_view(&handle, |v| v.phase == EpochPhase::Scanning).await;

    backend.cache(&format!("{ROOT}/Y"), CacheRecord::complete(450, Some(2)));
    let noise = ScanId::from_key("noise");
    for bytes in 0..20 {
        backend.emit(SizeEvent::Progress {
            scan_id: noise,
            name: "Y".into(),
            bytes,
        });
    }

    let view = wait_view(&handle, |v| v.total_bytes == 1250).await;
    assert_eq!(label(&view, "Y"), "450B");
    assert_eq!(view.scanning, 0);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_scan() {
    let (backend, lister) = scenario();
    let handle = spawn_pane(&backend, lister);
    handle.navigate(ROOT).await.unwrap();
    let view = wait_view(&handle, |v| v.phase == EpochPhase::Scanning).await;

    handle.shutdown().await;
    assert_eq!(backend.released(), vec![view.scan_id.unwrap()]);
}

#[tokio::test(start_paused = true)]
async fn test_set_options_shows_hidden_and_rejects_bad_patterns() {
    let backend = FakeBackend::new();
    let lister = FakeLister::default().with(
        ROOT,
        vec![
            DirectoryEntry::file(".env", 5, None),
            DirectoryEntry::file("main.rs", 7, None),
        ],
    );
    let handle = spawn_pane(&backend, lister);
    handle.navigate(ROOT).await.unwrap();
    let plain = handle.wait_settled().await.unwrap();
    assert_eq!(plain.total_bytes, 7);

    let hidden = ViewOptions {
        show_hidden: true,
        ..ViewOptions::default()
    };
    handle.set_options(hidden).await.unwrap();
    let shown = handle.wait_settled().await.unwrap();
    assert_eq!(shown.total_bytes, 12);
    assert_ne!(shown.scan_id, plain.scan_id);

    let bad = ViewOptions {
        ignore_patterns: vec!["[oops".to_string()],
        ..ViewOptions::default()
    };
    assert!(handle.set_options(bad).await.is_err());
    handle.shutdown().await;
}

#[tokio::test]
async fn test_navigate_rejects_empty_path() {
    let (backend, lister) = scenario();
    let handle = spawn_pane(&backend, lister);
    assert!(handle.navigate("").await.is_err());
    handle.shutdown().await;
}

fn create_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("docs/deep")).unwrap();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("README"), vec![b'x'; 11]).unwrap();
    fs::write(root.join("docs/guide.md"), vec![b'x'; 100]).unwrap();
    fs::write(root.join("docs/deep/notes.txt"), vec![b'x'; 50]).unwrap();
    fs::write(root.join("src/main.rs"), vec![b'x'; 40]).unwrap();
    temp
}

#[tokio::test]
async fn test_real_coordinator_converges() {
    let temp = create_tree();
    let coordinator = ScanCoordinator::default();
    let mut pane = Pane::new(coordinator.clone(), ViewOptions::default(), EngineConfig::default()).unwrap();

    pane.navigate(temp.path()).await.unwrap();
    assert_eq!(pane.phase(), EpochPhase::Scanning);
    assert_eq!(pane.state().unwrap().running_total(), 11);

    let settle = async {
        while pane.phase() != EpochPhase::Settled {
            assert!(pane.next_update().await);
        }
    };
    tokio::time::timeout(Duration::from_secs(30), settle).await.unwrap();

    let view = pane.current();
    assert_eq!(view.total_bytes, 201);
    assert_eq!(view.item_count, Some(4));
    assert_eq!(label(&view, "docs"), "150B");
    assert_eq!(label(&view, "src"), "40B");

    // second visit is served from the cache
    pane.navigate(temp.path()).await.unwrap();
    assert_eq!(pane.phase(), EpochPhase::FastPath);
    assert_eq!(pane.current().total_bytes, 201);
}

#[tokio::test]
async fn test_two_panes_share_one_job() {
    let temp = create_tree();
    let coordinator = ScanCoordinator::default();
    let left = Pane::new(coordinator.clone(), ViewOptions::default(), EngineConfig::default())
        .unwrap()
        .spawn();
    let right = Pane::new(coordinator.clone(), ViewOptions::default(), EngineConfig::default())
        .unwrap()
        .spawn();

    left.navigate(temp.path()).await.unwrap();
    right.navigate(temp.path()).await.unwrap();

    let (l, r) = tokio::time::timeout(Duration::from_secs(30), async {
        (left.wait_settled().await.unwrap(), right.wait_settled().await.unwrap())
    })
    .await
    .unwrap();

    assert_eq!(l.total_bytes, 201);
    assert_eq!(r.total_bytes, 201);
    assert_eq!(l.scan_id, r.scan_id);
    assert!(l.rows.iter().chain(&r.rows).all(|row| !row.scanning));

    left.shutdown().await;
    right.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_refresh_during_scan_replaces_job() {
    let (backend, lister) = scenario();
    let handle = spawn_pane(&backend, lister);
    handle.navigate(ROOT).await.unwrap();
    let first = wait_view(&handle, |v| v.phase == EpochPhase::Scanning).await;
    let scan_id = first.scan_id.unwrap();
    assert_eq!(label(&first, "X"), "500B");

    let epoch = handle.refresh().await.unwrap();
    let view = wait_view(&handle, |v| v.epoch == epoch && v.phase == EpochPhase::Scanning).await;

    assert_eq!(backend.restarts(), vec![scan_id]);
    assert_eq!(backend.starts().len(), 2);
    assert_eq!(view.scan_id, Some(scan_id));
    assert_eq!(view.scanning, 2);
    assert_eq!(label(&view, "X"), "0B (scanning…)");
    assert_eq!(view.total_bytes, 300);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_vanished_root_settles() {
    const VANISHED: &str = "/panesize-test/vanished";
    let lister = FakeLister::default().with(
        VANISHED,
        vec![
            DirectoryEntry::file("left-behind", 9, None),
            DirectoryEntry::directory("child", None),
        ],
    );
    let coordinator = ScanCoordinator::default();
    let handle = Pane::with_lister(
        Arc::new(coordinator.clone()),
        Arc::new(lister),
        ViewOptions::default(),
        EngineConfig::default(),
    )
    .unwrap()
    .spawn();

    handle.navigate(VANISHED).await.unwrap();
    let view = tokio::time::timeout(Duration::from_secs(10), handle.wait_settled())
        .await
        .expect("pane never settled")
        .unwrap();

    assert_eq!(view.phase, EpochPhase::Settled);
    assert_eq!(view.scanning, 0);
    assert_eq!(view.total_bytes, 9);
    assert_eq!(label(&view, "child"), "0B");
    assert_eq!(coordinator.active_jobs(), 0);
    handle.shutdown().await;
}
