//! Engine error types.

use std::path::PathBuf;

use panesize_core::{ListError, ScanError};
use thiserror::Error;

/// Errors surfaced by a pane.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The directory could not be listed; the epoch failed.
    #[error("Cannot list directory: {0}")]
    Listing(#[from] ListError),

    /// The pane task is gone.
    #[error("Pane is shut down")]
    ChannelClosed,

    /// View options were rejected, e.g. an invalid ignore pattern.
    #[error("Invalid view options: {0}")]
    InvalidOptions(#[from] ScanError),

    /// Path cannot be navigated to.
    #[error("Invalid path: {path}")]
    InvalidPath { path: PathBuf },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
