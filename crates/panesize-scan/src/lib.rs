//! Directory listing, size caching and background size scans for panesize.
//!
//! The [`ScanCoordinator`] runs one job per scan identity. A job reads the
//! root one level, answers children already in the [`SizeCache`] straight
//! away, and walks the rest with jwalk, streaming throttled `Progress`, one
//! `ChildComplete` per child and a final `Summary`.
//!
//! # Example
//!
//! ```no_run
//! use panesize_scan::{dir_size, CoordinatorConfig};
//! use panesize_core::ViewOptions;
//!
//! let totals = dir_size("/path/to/scan", &ViewOptions::default(), &CoordinatorConfig::default())?;
//! println!("{} bytes in {} files", totals.bytes, totals.files);
//! # Ok::<(), panesize_core::ScanError>(())
//! ```

mod cache;
mod config;
mod coordinator;
mod hardlink;
mod lister;
mod progress;
mod walk;

pub use cache::SizeCache;
pub use config::{CoordinatorConfig, CoordinatorConfigBuilder};
pub use coordinator::{JoinOutcome, ScanCoordinator};
pub use hardlink::{HardlinkFilter, InodeKey};
pub use lister::{DirectoryLister, FsLister};
pub use walk::{DirTotals, dir_size};

// Re-export core types for convenience
pub use panesize_core::{
    CacheRecord, DirectoryEntry, ListError, NameFilter, ScanError, ScanId, ScanWarning, SizeEvent,
    ViewOptions,
};
