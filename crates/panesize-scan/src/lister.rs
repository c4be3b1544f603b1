//! Single-level directory listing.

use std::fs;
use std::path::Path;

use panesize_core::{DirectoryEntry, ListError};

use crate::hardlink::HardlinkFilter;

/// Reads exactly one level of a directory.
pub trait DirectoryLister: Send + Sync + 'static {
    /// List the entries of `path`, in no particular order.
    fn list(&self, path: &Path) -> Result<Vec<DirectoryEntry>, ListError>;
}

/// Lister backed by `std::fs::read_dir`.
///
/// Symlinks are not followed: a link to a directory is listed as a
/// zero-byte non-directory, matching what the scan walk counts. Files
/// hard-linked more than once at this level are marked as repeat links
/// after the first, the same way a job's root read counts them.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLister;

impl FsLister {
    /// Create a new lister.
    pub fn new() -> Self {
        Self
    }
}

impl DirectoryLister for FsLister {
    fn list(&self, path: &Path) -> Result<Vec<DirectoryEntry>, ListError> {
        let metadata = fs::metadata(path).map_err(|e| ListError::io(path, e))?;
        if !metadata.is_dir() {
            return Err(ListError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        let read_dir = fs::read_dir(path).map_err(|e| ListError::io(path, e))?;
        let links = HardlinkFilter::new();
        let mut entries = Vec::new();

        for entry in read_dir {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();

            // DirEntry::metadata does not traverse symlinks
            let md = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    tracing::debug!(path = %entry.path().display(), error = %err, "skipping entry without metadata");
                    continue;
                }
            };
            let modified = md.modified().ok();

            if md.is_dir() {
                entries.push(DirectoryEntry::directory(name, modified));
            } else if md.file_type().is_symlink() {
                entries.push(DirectoryEntry::file(name, 0, modified));
            } else {
                let file = DirectoryEntry::file(name, md.len(), modified);
                if md.is_file() && !links.should_count(&md) {
                    entries.push(file.as_repeat_link());
                } else {
                    entries.push(file);
                }
            }
        }

        Ok(entries)
    }
}
