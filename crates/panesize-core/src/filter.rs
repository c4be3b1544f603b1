//! Name filtering shared by listings and walks.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::ViewOptions;
use crate::error::ScanError;

/// Decides which names are skipped under a set of view options.
///
/// The same filter is applied to pane rows and inside scan walks, so the
/// bytes a pane shows and the bytes a job counts cover the same entries.
#[derive(Debug, Clone)]
pub struct NameFilter {
    show_hidden: bool,
    ignores: GlobSet,
}

impl NameFilter {
    /// Compile the filter for `options`.
    pub fn new(options: &ViewOptions) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &options.ignore_patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            let glob = Glob::new(&glob_source(pattern)).map_err(|e| ScanError::InvalidConfig {
                message: format!("invalid ignore pattern {pattern:?}: {e}"),
            })?;
            builder.add(glob);
        }
        let ignores = builder.build().map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })?;
        Ok(Self {
            show_hidden: options.show_hidden,
            ignores,
        })
    }

    /// A filter that only applies the hidden flag.
    pub fn hidden_only(show_hidden: bool) -> Self {
        Self {
            show_hidden,
            ignores: GlobSet::empty(),
        }
    }

    /// Whether hidden names pass.
    pub fn show_hidden(&self) -> bool {
        self.show_hidden
    }

    /// Check if a name should be skipped.
    ///
    /// Hidden names are dotfiles. A plain ignore pattern skips every name
    /// containing it; a pattern with glob syntax must match the whole name.
    pub fn should_skip(&self, name: &str) -> bool {
        if !self.show_hidden && name.starts_with('.') {
            return true;
        }
        self.ignores.is_match(name)
    }
}

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}', '\\'];

/// Glob text for an ignore pattern; plain text becomes a substring match.
fn glob_source(pattern: &str) -> String {
    if pattern.contains(GLOB_META) {
        pattern.to_string()
    } else {
        format!("*{pattern}*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_names() {
        let filter = NameFilter::hidden_only(false);
        assert!(filter.should_skip(".git"));
        assert!(!filter.should_skip("src"));

        let filter = NameFilter::hidden_only(true);
        assert!(!filter.should_skip(".git"));
    }

    #[test]
    fn test_ignore_patterns() {
        let options = ViewOptions {
            ignore_patterns: vec!["node_modules".to_string(), "*.log".to_string()],
            ..ViewOptions::default()
        };
        let filter = NameFilter::new(&options).unwrap();

        assert!(filter.should_skip("node_modules"));
        assert!(filter.should_skip("build.log"));
        assert!(filter.should_skip("node_modules_backup"));
        assert!(!filter.should_skip("build.log.old"));
        assert!(!filter.should_skip("src"));
    }

    #[test]
    fn test_plain_pattern_matches_substring() {
        let options = ViewOptions {
            ignore_patterns: vec!["node".to_string(), "cache".to_string()],
            ..ViewOptions::default()
        };
        let filter = NameFilter::new(&options).unwrap();

        assert!(filter.should_skip("node_modules"));
        assert!(filter.should_skip("my-node"));
        assert!(filter.should_skip(".cache"));
        assert!(filter.should_skip("cache"));
        assert!(!filter.should_skip("nod"));
        assert!(!filter.should_skip("Node"));
    }

    #[test]
    fn test_invalid_pattern() {
        let options = ViewOptions {
            ignore_patterns: vec!["[oops".to_string()],
            ..ViewOptions::default()
        };
        assert!(matches!(
            NameFilter::new(&options),
            Err(ScanError::InvalidConfig { .. })
        ));
    }
}
