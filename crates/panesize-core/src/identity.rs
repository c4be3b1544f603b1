//! Scan identities and cache keys.

use std::fmt;
use std::path::{Path, PathBuf};

use compact_str::CompactString;
use serde::{Serialize, Serializer};

use crate::config::ViewOptions;

/// Canonicalize a path, falling back to the path as given.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Deterministic fingerprint of (root path, hidden flag, ignore set).
///
/// Correlates a navigation epoch with its background job. Events carrying a
/// different identity than the active one are stale.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanId(pub [u8; 32]);

impl ScanId {
    /// Compute the identity for scanning `path` under `options`.
    ///
    /// `path` is used as given; callers pass a normalized path.
    pub fn new(path: &Path, options: &ViewOptions) -> Self {
        Self::from_key(&Self::key_string(path, options))
    }

    /// Hash an already-built key string.
    pub fn from_key(key: &str) -> Self {
        Self(*blake3::hash(key.as_bytes()).as_bytes())
    }

    /// Readable key string the fingerprint is computed from.
    pub fn key_string(path: &Path, options: &ViewOptions) -> String {
        format!(
            "{}|{}|{}",
            path.to_string_lossy(),
            options.show_hidden,
            options.ignore_signature()
        )
    }

    /// Full hex form.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScanId({self})")
    }
}

impl Serialize for ScanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.to_hex())
    }
}

/// Key of a size cache record: the path plus the options that scope it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: PathBuf,
    pub show_hidden: bool,
    pub ignores_sig: CompactString,
}

impl CacheKey {
    /// Build a key; `path` is used as given.
    pub fn new(path: impl Into<PathBuf>, options: &ViewOptions) -> Self {
        Self {
            path: path.into(),
            show_hidden: options.show_hidden,
            ignores_sig: options.ignore_signature().into(),
        }
    }
}
