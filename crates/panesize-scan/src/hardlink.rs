//! Hard-link tracking so a multiply-linked file is counted once per walk.

use std::fs::Metadata;

use dashmap::DashSet;

/// (inode, device) pair identifying a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeKey {
    pub inode: u64,
    pub device: u64,
}

/// Tracks inodes of multiply-linked files seen during one walk.
///
/// Files with a single link are never recorded, which keeps the set small.
#[derive(Debug, Default)]
pub struct HardlinkFilter {
    seen: DashSet<InodeKey>,
}

impl HardlinkFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this file's bytes should be counted.
    ///
    /// Returns `false` for the second and later links to the same inode.
    pub fn should_count(&self, metadata: &Metadata) -> bool {
        match link_key(metadata) {
            Some(key) => self.seen.insert(key),
            None => true,
        }
    }

    /// Number of multiply-linked inodes recorded.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(unix)]
fn link_key(metadata: &Metadata) -> Option<InodeKey> {
    use std::os::unix::fs::MetadataExt;
    (metadata.nlink() > 1).then(|| InodeKey {
        inode: metadata.ino(),
        device: metadata.dev(),
    })
}

#[cfg(not(unix))]
fn link_key(_metadata: &Metadata) -> Option<InodeKey> {
    None
}

/// Device id of a path's filesystem, used to stay on one filesystem.
#[cfg(unix)]
pub(crate) fn device_of(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.dev()
}

#[cfg(not(unix))]
pub(crate) fn device_of(_metadata: &Metadata) -> u64 {
    0
}
