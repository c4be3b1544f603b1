//! Persisted user settings.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use panesize_core::ViewOptions;
use panesize_scan::CoordinatorConfig;

use crate::config::EngineConfig;

/// View defaults and tunables stored as TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default view options for new panes.
    pub view: ViewOptions,
    /// Scan coordinator tunables.
    pub scan: CoordinatorConfig,
    /// Pane update throttling.
    pub engine: EngineConfig,
}

impl Settings {
    /// Get the config file path.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("panesize").join("settings.toml"))
    }

    /// Load settings from disk, or return defaults.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from `path`; a missing file yields defaults and an
    /// unparsable one is reported and replaced by defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str::<Self>(&content) {
            Ok(settings) => settings.sanitized(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable settings");
                Self::default()
            }
        }
    }

    /// Save settings to disk.
    pub fn save(&self) -> io::Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "No config directory"))?;
        self.save_to(&path)
    }

    /// Save settings to `path`, creating its directory.
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        std::fs::write(path, content)
    }

    fn sanitized(mut self) -> Self {
        self.scan = self.scan.sanitized();
        self.engine.flush_interval_ms = self.engine.flush_interval_ms.max(1);
        self
    }
}
