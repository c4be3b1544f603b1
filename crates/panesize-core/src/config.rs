//! View configuration types.

use derive_builder::Builder;
use globset::Glob;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Column a listing is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    #[strum(to_string = "Name")]
    Name,
    #[strum(to_string = "Size")]
    Size,
    #[strum(to_string = "Date")]
    Modified,
    /// Extension first, then name.
    #[strum(to_string = "Type")]
    Extension,
}

/// Sort direction, applied after the key comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[strum(to_string = "↑")]
    Ascending,
    #[strum(to_string = "↓")]
    Descending,
}

/// Active sort order for a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
    /// Partition directories ahead of files regardless of direction.
    pub directories_first: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            key: SortKey::Name,
            direction: SortDirection::Ascending,
            directories_first: true,
        }
    }
}

impl SortSpec {
    /// Short label for status lines, e.g. `NM↑`.
    pub fn short_label(&self) -> String {
        let key = match self.key {
            SortKey::Name => "NM",
            SortKey::Size => "SZ",
            SortKey::Modified => "DT",
            SortKey::Extension => "TY",
        };
        format!("{key}{}", self.direction)
    }
}

/// Options that scope both what a pane shows and what a scan counts.
///
/// The hidden flag and the ignore set are part of the scan identity and of
/// every cache key; the sort order only affects the row projection.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ViewOptions {
    /// Include names starting with `.`.
    #[builder(default = "false")]
    #[serde(default)]
    pub show_hidden: bool,

    /// Glob patterns matched against entry names.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Row ordering.
    #[builder(default)]
    #[serde(default)]
    pub sort: SortSpec,
}

impl ViewOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref patterns) = self.ignore_patterns {
            for pattern in patterns {
                if pattern.trim().is_empty() {
                    return Err("Ignore pattern cannot be empty".to_string());
                }
                Glob::new(pattern).map_err(|e| format!("Invalid ignore pattern {pattern:?}: {e}"))?;
            }
        }
        Ok(())
    }
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            show_hidden: false,
            ignore_patterns: Vec::new(),
            sort: SortSpec::default(),
        }
    }
}

impl ViewOptions {
    /// Create a new options builder.
    pub fn builder() -> ViewOptionsBuilder {
        ViewOptionsBuilder::default()
    }

    /// Ignore patterns sorted, de-duplicated and comma-joined.
    ///
    /// Two option sets with the same patterns in a different order share a
    /// signature, and therefore a scan identity and cache scope.
    pub fn ignore_signature(&self) -> String {
        self.ignore_patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .sorted()
            .dedup()
            .join(",")
    }
}
