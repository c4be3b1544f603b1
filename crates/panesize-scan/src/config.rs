//! Scan coordinator configuration.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Tunables for the scan coordinator and its tree walks.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Child subtrees walked at the same time within one job.
    #[builder(default = "4")]
    pub max_concurrent_children: usize,

    /// Threads per walk (0 = shared rayon pool).
    #[builder(default = "0")]
    pub threads: usize,

    /// Minimum time between progress events for one child, in milliseconds.
    #[builder(default = "100")]
    pub progress_interval_ms: u64,

    /// A jump of this many bytes since the last progress event emits at once.
    #[builder(default = "8 * 1024 * 1024")]
    pub progress_burst_bytes: u64,

    /// Emit after this many counted files regardless of time.
    #[builder(default = "200")]
    pub progress_file_batch: u32,

    /// Follow symbolic links while walking.
    #[builder(default = "false")]
    pub follow_symlinks: bool,

    /// Count files on other filesystems mounted below a child.
    #[builder(default = "false")]
    pub cross_filesystems: bool,

    /// Capacity of the shared event channel.
    #[builder(default = "4096")]
    pub event_capacity: usize,
}

impl CoordinatorConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_children == Some(0) {
            return Err("max_concurrent_children must be at least 1".to_string());
        }
        if self.event_capacity == Some(0) {
            return Err("event_capacity must be at least 1".to_string());
        }
        if self.progress_file_batch == Some(0) {
            return Err("progress_file_batch must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_children: 4,
            threads: 0,
            progress_interval_ms: 100,
            progress_burst_bytes: 8 * 1024 * 1024,
            progress_file_batch: 200,
            follow_symlinks: false,
            cross_filesystems: false,
            event_capacity: 4096,
        }
    }
}

impl CoordinatorConfig {
    /// Create a new config builder.
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }

    /// Progress interval as a duration.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Clamp values that would stall the coordinator.
    ///
    /// Used for configs that bypass the builder, e.g. deserialized settings.
    pub fn sanitized(mut self) -> Self {
        self.max_concurrent_children = self.max_concurrent_children.max(1);
        self.event_capacity = self.event_capacity.max(1);
        self.progress_file_batch = self.progress_file_batch.max(1);
        self
    }
}
