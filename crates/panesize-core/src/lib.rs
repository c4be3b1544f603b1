//! Core types for panesize.
//!
//! This crate provides the data model shared by the scan coordinator and the
//! aggregation engine: scan identities, one-level directory listings, cached
//! size records, the three-event size stream, and view options.

mod config;
mod entry;
mod error;
mod event;
mod filter;
mod identity;
mod record;

pub use config::{SortDirection, SortKey, SortSpec, ViewOptions, ViewOptionsBuilder};
pub use entry::DirectoryEntry;
pub use error::{ListError, ScanError, ScanWarning, WarningKind};
pub use event::SizeEvent;
pub use filter::NameFilter;
pub use identity::{CacheKey, ScanId, normalize_path};
pub use record::CacheRecord;
