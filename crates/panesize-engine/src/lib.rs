//! Incremental directory-size aggregation for panesize panes.
//!
//! A [`Pane`] lists a directory, paints rows from the size cache at once,
//! asks a [`SizeBackend`] to scan whatever is unknown, and merges the
//! streamed results into monotonic row labels and a running total. Updates
//! are published as [`PaneView`] snapshots over a watch channel.
//!
//! # Example
//!
//! ```no_run
//! use panesize_engine::{EngineConfig, Pane};
//! use panesize_scan::{ScanCoordinator, ViewOptions};
//!
//! # async fn run() -> panesize_engine::Result<()> {
//! let coordinator = ScanCoordinator::default();
//! let pane = Pane::new(coordinator, ViewOptions::default(), EngineConfig::default())?;
//! let handle = pane.spawn();
//! handle.navigate("/home").await?;
//! let view = handle.wait_settled().await?;
//! println!("{} bytes", view.total_bytes);
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod aggregator;
mod backend;
mod config;
mod error;
mod format;
mod pane;
mod projection;
mod settings;

pub use aggregator::{AggregatorState, ProgressOutcome};
pub use backend::SizeBackend;
pub use config::{EngineConfig, EngineConfigBuilder};
pub use error::{EngineError, Result};
pub use format::{SCANNING_MARKER, format_bytes, size_label};
pub use pane::{EpochPhase, Pane, PaneHandle, PaneView};
pub use projection::{PARENT_ROW, Row, compare_entries, filter_entries, name_to_row, sort_entries};
pub use settings::Settings;
