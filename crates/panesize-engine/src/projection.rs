//! Row projection: the ordered rows a pane renders.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::SystemTime;

use compact_str::CompactString;
use serde::Serialize;

use panesize_core::{DirectoryEntry, NameFilter, SortDirection, SortKey, SortSpec};

use crate::format::{format_bytes, size_label};

/// Name of the synthetic parent row.
pub const PARENT_ROW: &str = "..";

/// One rendered row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub name: CompactString,
    pub is_dir: bool,
    /// The synthetic `..` row.
    pub is_parent: bool,
    /// Best-known bytes; `None` for the parent row.
    pub bytes: Option<u64>,
    pub label: String,
    /// Size is provisional.
    pub scanning: bool,
    #[serde(skip)]
    pub modified: Option<SystemTime>,
}

impl Row {
    pub fn parent() -> Self {
        Self {
            name: PARENT_ROW.into(),
            is_dir: true,
            is_parent: true,
            bytes: None,
            label: String::new(),
            scanning: false,
            modified: None,
        }
    }

    pub fn file(entry: &DirectoryEntry) -> Self {
        let bytes = entry.size.unwrap_or(0);
        Self {
            name: entry.name.clone(),
            is_dir: false,
            is_parent: false,
            bytes: Some(bytes),
            label: format_bytes(bytes),
            scanning: false,
            modified: entry.modified,
        }
    }

    pub fn directory(entry: &DirectoryEntry, bytes: u64, scanning: bool) -> Self {
        Self {
            name: entry.name.clone(),
            is_dir: true,
            is_parent: false,
            bytes: Some(bytes),
            label: size_label(bytes, scanning),
            scanning,
            modified: entry.modified,
        }
    }

    /// Update a directory row's size and label.
    pub fn set_size(&mut self, bytes: u64, scanning: bool) {
        self.bytes = Some(bytes);
        self.scanning = scanning;
        self.label = size_label(bytes, scanning);
    }
}

/// Drop entries hidden or ignored under `filter`.
pub fn filter_entries(entries: &mut Vec<DirectoryEntry>, filter: &NameFilter) {
    entries.retain(|e| !filter.should_skip(&e.name));
}

/// Sort entries in place.
///
/// Directories-first is the primary key and is not inverted by the
/// direction. Ties fall back to the case-insensitive name.
pub fn sort_entries(entries: &mut [DirectoryEntry], sort: &SortSpec) {
    entries.sort_by(|a, b| compare_entries(a, b, sort));
}

/// Ordering used by [`sort_entries`].
pub fn compare_entries(a: &DirectoryEntry, b: &DirectoryEntry, sort: &SortSpec) -> Ordering {
    if sort.directories_first {
        match b.is_dir.cmp(&a.is_dir) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    let by_key = match sort.key {
        SortKey::Name => caseless_cmp(&a.name, &b.name),
        SortKey::Size => a.size.unwrap_or(0).cmp(&b.size.unwrap_or(0)),
        SortKey::Modified => a.modified.cmp(&b.modified),
        SortKey::Extension => a
            .extension()
            .cmp(&b.extension())
            .then_with(|| caseless_cmp(&a.name, &b.name)),
    };
    let by_key = match sort.direction {
        SortDirection::Ascending => by_key,
        SortDirection::Descending => by_key.reverse(),
    };

    by_key
        .then_with(|| caseless_cmp(&a.name, &b.name))
        .then_with(|| a.name.cmp(&b.name))
}

fn caseless_cmp(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Index from entry name to row position; the parent row is never indexed.
pub fn name_to_row(rows: &[Row]) -> HashMap<CompactString, usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| !row.is_parent)
        .map(|(idx, row)| (row.name.clone(), idx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn names(entries: &[DirectoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    fn sample() -> Vec<DirectoryEntry> {
        let t = |s| Some(SystemTime::UNIX_EPOCH + Duration::from_secs(s));
        vec![
            DirectoryEntry::file("b.txt", 300, t(3)),
            DirectoryEntry::directory("Zeta", t(1)),
            DirectoryEntry::file("A.md", 100, t(2)),
            DirectoryEntry::directory("alpha", t(4)),
            DirectoryEntry::file("c.rs", 200, t(1)),
        ]
    }

    #[test]
    fn test_name_sort_directories_first() {
        let mut entries = sample();
        sort_entries(&mut entries, &SortSpec::default());
        assert_eq!(names(&entries), vec!["alpha", "Zeta", "A.md", "b.txt", "c.rs"]);
    }

    #[test]
    fn test_descending_keeps_partition() {
        let mut entries = sample();
        let sort = SortSpec {
            direction: SortDirection::Descending,
            ..SortSpec::default()
        };
        sort_entries(&mut entries, &sort);
        assert_eq!(names(&entries), vec!["Zeta", "alpha", "c.rs", "b.txt", "A.md"]);
    }

    #[test]
    fn test_size_sort_without_partition() {
        let mut entries = sample();
        let sort = SortSpec {
            key: SortKey::Size,
            direction: SortDirection::Descending,
            directories_first: false,
        };
        sort_entries(&mut entries, &sort);
        // directories have no size at listing time; tie-break by name
        assert_eq!(names(&entries), vec!["b.txt", "c.rs", "A.md", "alpha", "Zeta"]);
    }

    #[test]
    fn test_extension_sort() {
        let mut entries = sample();
        let sort = SortSpec {
            key: SortKey::Extension,
            ..SortSpec::default()
        };
        sort_entries(&mut entries, &sort);
        assert_eq!(names(&entries), vec!["alpha", "Zeta", "A.md", "c.rs", "b.txt"]);
    }

    #[test]
    fn test_modified_sort() {
        let mut entries = sample();
        let sort = SortSpec {
            key: SortKey::Modified,
            ..SortSpec::default()
        };
        sort_entries(&mut entries, &sort);
        assert_eq!(names(&entries), vec!["Zeta", "alpha", "c.rs", "A.md", "b.txt"]);
    }

    #[test]
    fn test_name_to_row_skips_parent() {
        let entries = sample();
        let mut rows = vec![Row::parent()];
        rows.extend(entries.iter().map(Row::file));
        let index = name_to_row(&rows);
        assert_eq!(index.len(), 5);
        assert_eq!(index["b.txt"], 1);
        assert!(!index.contains_key(PARENT_ROW));
    }

    #[test]
    fn test_filter_entries() {
        let mut entries = vec![
            DirectoryEntry::directory(".git", None),
            DirectoryEntry::directory("src", None),
        ];
        filter_entries(&mut entries, &NameFilter::hidden_only(false));
        assert_eq!(names(&entries), vec!["src"]);
    }
}
