//! One-level directory listing entries.

use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// A single entry of a one-level directory read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry name (not full path).
    pub name: CompactString,

    /// Whether the entry is a directory. Symlinks are never directories here.
    pub is_dir: bool,

    /// Size in bytes for non-directories, `None` for directories.
    pub size: Option<u64>,

    /// Last modification time, if the platform reports one.
    pub modified: Option<SystemTime>,

    /// Another link to a file already listed at this level. Shown with its
    /// size, but its bytes are only counted once.
    #[serde(default)]
    pub repeat_link: bool,
}

impl DirectoryEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<CompactString>, size: u64, modified: Option<SystemTime>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size: Some(size),
            modified,
            repeat_link: false,
        }
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<CompactString>, modified: Option<SystemTime>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size: None,
            modified,
            repeat_link: false,
        }
    }

    /// Mark as a repeated hard link.
    pub fn as_repeat_link(mut self) -> Self {
        self.repeat_link = true;
        self
    }

    /// Bytes this entry contributes at its own level (0 for directories and
    /// repeated links).
    pub fn file_bytes(&self) -> u64 {
        if self.is_dir || self.repeat_link {
            0
        } else {
            self.size.unwrap_or(0)
        }
    }

    /// Whether the name starts with a dot.
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    /// Lowercased extension, empty for directories, dotfiles and bare names.
    pub fn extension(&self) -> CompactString {
        if self.is_dir {
            return CompactString::default();
        }
        match self.name.rfind('.') {
            Some(0) | None => CompactString::default(),
            Some(idx) => CompactString::new(self.name[idx + 1..].to_lowercase()),
        }
    }
}
