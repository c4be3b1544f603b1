//! Engine tunables.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Throttling of published pane updates.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct EngineConfig {
    /// Debounce window for batched progress, in milliseconds.
    #[builder(default = "100")]
    pub flush_interval_ms: u64,

    /// Pending growth that flushes at once instead of waiting.
    #[builder(default = "8 * 1024 * 1024")]
    pub burst_threshold: u64,
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.flush_interval_ms == Some(0) {
            return Err("flush_interval_ms must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 100,
            burst_threshold: 8 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// Create a new config builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Flush debounce as a duration.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }
}
