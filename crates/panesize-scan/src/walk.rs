//! Recursive subtree walks built on jwalk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use compact_str::CompactString;
use jwalk::{Parallelism, WalkDir};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use panesize_core::{NameFilter, ScanError, ScanWarning, ViewOptions, WarningKind};

use crate::config::CoordinatorConfig;
use crate::hardlink::{HardlinkFilter, device_of};
use crate::progress::ProgressThrottle;

/// Byte and file totals of a walked subtree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DirTotals {
    /// Sum of file sizes.
    pub bytes: u64,
    /// Number of files counted.
    pub files: u64,
    /// Entries that could not be read; their bytes are missing from `bytes`.
    pub warnings: Vec<ScanWarning>,
    /// The walk stopped early, so `bytes` is a lower bound.
    #[serde(skip)]
    pub cancelled: bool,
}

/// Files and child directories directly inside a job's root.
#[derive(Debug, Default)]
pub(crate) struct RootListing {
    pub file_bytes: u64,
    pub file_count: u64,
    pub children: Vec<CompactString>,
}

/// Read one level of `root`, summing file bytes and collecting directories.
pub(crate) fn read_root(root: &Path, filter: &NameFilter) -> Result<RootListing, ScanError> {
    let read_dir = fs::read_dir(root).map_err(|e| ScanError::io(root, e))?;
    let hardlinks = HardlinkFilter::new();
    let mut listing = RootListing::default();

    for entry in read_dir.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if filter.should_skip(&name) {
            continue;
        }
        match entry.metadata() {
            Ok(md) if md.is_dir() => listing.children.push(name.into()),
            Ok(md) if md.is_file() => {
                if hardlinks.should_count(&md) {
                    listing.file_bytes = listing.file_bytes.saturating_add(md.len());
                    listing.file_count += 1;
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(path = %entry.path().display(), error = %err, "root entry without metadata");
            }
        }
    }

    Ok(listing)
}

/// Walk `root` recursively, calling `on_progress(bytes, files)` as the
/// running total grows.
///
/// Unreadable entries become warnings and the walk continues, so the result
/// is always the best partial total that could be gathered. Progress values
/// are non-decreasing; the last call carries the final total unless the walk
/// was cancelled.
pub(crate) fn walk_subtree<F>(
    root: &Path,
    filter: &NameFilter,
    config: &CoordinatorConfig,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> DirTotals
where
    F: FnMut(u64, u64),
{
    let mut totals = DirTotals::default();
    let hardlinks = HardlinkFilter::new();
    let root_device = fs::metadata(root).ok().map(|m| device_of(&m));
    let mut throttle = ProgressThrottle::new(
        config.progress_interval(),
        config.progress_burst_bytes,
        config.progress_file_batch,
    );

    let parallelism = match config.threads {
        0 => Parallelism::RayonDefaultPool {
            busy_timeout: Duration::from_millis(100),
        },
        n => Parallelism::RayonNewPool(n),
    };

    let prune = filter.clone();
    let walker = WalkDir::new(root)
        .parallelism(parallelism)
        .skip_hidden(false)
        .follow_links(config.follow_symlinks)
        .process_read_dir(move |_depth, _path, _state, children| {
            children.retain(|child| {
                child
                    .as_ref()
                    .map(|e| !prune.should_skip(&e.file_name.to_string_lossy()))
                    .unwrap_or(true)
            });
        });

    for entry_result in walker {
        if cancel.is_cancelled() {
            totals.cancelled = true;
            break;
        }

        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                tracing::debug!(path = %path.display(), error = %err, "walk error");
                totals.warnings.push(warning(path, &err, WarningKind::ReadError));
                continue;
            }
        };

        if let Some(err) = &entry.read_children_error {
            totals
                .warnings
                .push(warning(entry.path(), err, WarningKind::ReadError));
        }

        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                totals
                    .warnings
                    .push(warning(entry.path(), &err, WarningKind::MetadataError));
                continue;
            }
        };

        if !config.cross_filesystems && root_device.is_some_and(|dev| device_of(&metadata) != dev) {
            continue;
        }
        if !hardlinks.should_count(&metadata) {
            continue;
        }

        totals.bytes = totals.bytes.saturating_add(metadata.len());
        totals.files += 1;

        if throttle.on_file(totals.bytes) {
            on_progress(totals.bytes, totals.files);
            throttle.mark_emitted(totals.bytes);
        }
    }

    if !totals.cancelled && throttle.lags(totals.bytes) {
        on_progress(totals.bytes, totals.files);
    }

    totals
}

/// Classify a walk error, preferring the underlying I/O error kind.
fn warning(path: PathBuf, err: &jwalk::Error, fallback: WarningKind) -> ScanWarning {
    match err.io_error() {
        Some(io) if io.kind() == std::io::ErrorKind::PermissionDenied => ScanWarning::from_io(path, io),
        _ => ScanWarning::new(path, err.to_string(), fallback),
    }
}

/// Compute the recursive size of `path` in one blocking call.
///
/// Counts files directly in `path` and everything below it, applying the
/// hidden flag and ignore patterns of `options`.
pub fn dir_size(
    path: impl AsRef<Path>,
    options: &ViewOptions,
    config: &CoordinatorConfig,
) -> Result<DirTotals, ScanError> {
    let path: PathBuf = panesize_core::normalize_path(path);
    let metadata = fs::metadata(&path).map_err(|e| ScanError::io(&path, e))?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory { path });
    }

    let filter = NameFilter::new(options)?;
    let never = CancellationToken::new();
    Ok(walk_subtree(&path, &filter, config, &never, |_, _| {}))
}
