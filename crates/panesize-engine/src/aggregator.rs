//! Per-epoch merge of cached sizes and streamed scan events.
//!
//! An [`AggregatorState`] is created when a navigation paints its first
//! rows and discarded when the next navigation begins. Every handler takes
//! `&mut self` and is only ever called from the owning pane's task.
//!
//! Two guarantees hold for the lifetime of a state:
//!
//! - the running total and every child's known byte count never decrease;
//! - events carrying a scan identity other than the state's own are ignored.

use std::collections::{HashMap, HashSet};

use compact_str::CompactString;
use tracing::trace;

use panesize_core::{CacheRecord, DirectoryEntry, ScanId};

use crate::projection::{Row, name_to_row};

/// What a `Progress` event did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOutcome {
    /// Stale, unknown, already final, or not larger than what is known.
    Ignored,
    /// Stored as pending; flush on the next timer tick.
    Buffered,
    /// Pending growth crossed the burst threshold; flush now.
    FlushNow,
}

/// Aggregation state of one navigation epoch.
#[derive(Debug, Clone)]
pub struct AggregatorState {
    scan_id: ScanId,
    file_bytes: u64,
    running_total: u64,
    known_bytes: HashMap<CompactString, u64>,
    scanning: HashSet<CompactString>,
    pending: HashMap<CompactString, u64>,
    rows: Vec<Row>,
    name_to_row: HashMap<CompactString, usize>,
    item_count: Option<u64>,
    summarized: bool,
}

impl AggregatorState {
    /// Paint the initial rows from a sorted listing and its cache results.
    ///
    /// `cached` is aligned with `entries`; slots for files are ignored and a
    /// missing slot counts as a cache miss.
    pub fn prefill(scan_id: ScanId, entries: &[DirectoryEntry], cached: &[Option<CacheRecord>]) -> Self {
        let mut rows = Vec::with_capacity(entries.len() + 1);
        rows.push(Row::parent());

        let mut file_bytes = 0u64;
        let mut file_count = 0u64;
        let mut cached_items = Some(0u64);
        let mut known_bytes = HashMap::new();
        let mut scanning = HashSet::new();

        for (idx, entry) in entries.iter().enumerate() {
            if !entry.is_dir {
                file_bytes = file_bytes.saturating_add(entry.file_bytes());
                if !entry.repeat_link {
                    file_count += 1;
                }
                rows.push(Row::file(entry));
                continue;
            }

            let record = cached.get(idx).copied().flatten();
            let bytes = record.map(|r| r.bytes).unwrap_or(0);
            let completed = record.is_some_and(|r| r.completed);

            cached_items = match (cached_items, record.filter(|r| r.completed).and_then(|r| r.items)) {
                (Some(sum), Some(items)) => Some(sum + items),
                _ => None,
            };
            known_bytes.insert(entry.name.clone(), bytes);
            if !completed {
                scanning.insert(entry.name.clone());
            }
            rows.push(Row::directory(entry, bytes, !completed));
        }

        let running_total = known_bytes
            .values()
            .fold(file_bytes, |acc, b| acc.saturating_add(*b));
        let index = name_to_row(&rows);

        Self {
            scan_id,
            file_bytes,
            running_total,
            known_bytes,
            scanning,
            pending: HashMap::new(),
            rows,
            name_to_row: index,
            item_count: cached_items.map(|items| items + file_count),
            summarized: false,
        }
    }

    /// Buffer a partial total for one child.
    pub fn on_progress(
        &mut self,
        scan_id: ScanId,
        name: &str,
        bytes: u64,
        burst_threshold: u64,
    ) -> ProgressOutcome {
        if scan_id != self.scan_id {
            trace!(scan_id = %scan_id, "stale progress dropped");
            return ProgressOutcome::Ignored;
        }
        if !self.scanning.contains(name) {
            return ProgressOutcome::Ignored;
        }

        let known = self.known_bytes.get(name).copied().unwrap_or(0);
        let pending = self.pending.get(name).copied().unwrap_or(0);
        if bytes <= known.max(pending) {
            return ProgressOutcome::Ignored;
        }
        self.pending.insert(name.into(), bytes);

        if self.pending_gain() > burst_threshold {
            ProgressOutcome::FlushNow
        } else {
            ProgressOutcome::Buffered
        }
    }

    /// Growth the pending values would add to the running total.
    pub fn pending_gain(&self) -> u64 {
        self.pending
            .iter()
            .map(|(name, bytes)| {
                let known = self.known_bytes.get(name).copied().unwrap_or(0);
                bytes.saturating_sub(known)
            })
            .fold(0u64, u64::saturating_add)
    }

    /// Apply all pending values in one batch. Returns `true` if anything
    /// visible changed.
    pub fn flush(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }

        let mut delta = 0u64;
        for (name, bytes) in std::mem::take(&mut self.pending) {
            let known = self.known_bytes.entry(name.clone()).or_insert(0);
            if bytes <= *known {
                continue;
            }
            delta = delta.saturating_add(bytes - *known);
            *known = bytes;
            if let Some(&idx) = self.name_to_row.get(&name) {
                self.rows[idx].set_size(bytes, true);
            }
        }

        if delta == 0 {
            return false;
        }
        self.running_total = self.running_total.saturating_add(delta);
        true
    }

    /// Finalize one child. Returns `true` if anything visible changed.
    pub fn on_child_complete(&mut self, scan_id: ScanId, name: &str, bytes: u64) -> bool {
        if scan_id != self.scan_id {
            trace!(scan_id = %scan_id, "stale completion dropped");
            return false;
        }
        let Some(&idx) = self.name_to_row.get(name) else {
            return false;
        };
        if !self.rows[idx].is_dir {
            return false;
        }

        self.pending.remove(name);
        let was_scanning = self.scanning.remove(name);
        let prior = self.known_bytes.get(name).copied().unwrap_or(0);
        let next = prior.max(bytes);
        if !was_scanning && next == prior {
            return false;
        }

        self.known_bytes.insert(name.into(), next);
        self.running_total = self.running_total.saturating_add(next - prior);
        self.rows[idx].set_size(next, false);
        true
    }

    /// End of the epoch's scan.
    pub fn on_summary(&mut self, scan_id: ScanId, bytes: u64, items: Option<u64>) -> bool {
        if scan_id != self.scan_id {
            trace!(scan_id = %scan_id, "stale summary dropped");
            return false;
        }

        self.running_total = self.running_total.max(bytes);
        self.scanning.clear();
        self.pending.clear();
        for row in self.rows.iter_mut().filter(|r| r.scanning) {
            let bytes = row.bytes.unwrap_or(0);
            row.set_size(bytes, false);
        }
        if items.is_some() {
            self.item_count = items;
        }
        self.summarized = true;
        true
    }

    /// The scan could not be started: stop waiting but keep provisional rows.
    pub fn abandon_scan(&mut self) {
        self.scanning.clear();
        self.pending.clear();
    }

    /// Merge cache records after missed events.
    ///
    /// `records` is aligned with `names`. Completed records finalize their
    /// child; partial ones are treated as progress and flushed.
    pub fn resync(&mut self, names: &[CompactString], records: &[Option<CacheRecord>]) -> bool {
        let mut changed = false;
        for (name, record) in names.iter().zip(records) {
            let Some(record) = record else { continue };
            if record.completed {
                changed |= self.on_child_complete(self.scan_id, name, record.bytes);
            } else {
                self.on_progress(self.scan_id, name, record.bytes, u64::MAX);
            }
        }
        self.flush() || changed
    }

    pub fn scan_id(&self) -> ScanId {
        self.scan_id
    }

    /// Bytes of plain files at this level.
    pub fn file_bytes(&self) -> u64 {
        self.file_bytes
    }

    pub fn running_total(&self) -> u64 {
        self.running_total
    }

    pub fn known_bytes(&self, name: &str) -> Option<u64> {
        self.known_bytes.get(name).copied()
    }

    pub fn is_scanning(&self, name: &str) -> bool {
        self.scanning.contains(name)
    }

    /// Children still waiting for a final size, sorted by name.
    pub fn scanning_names(&self) -> Vec<CompactString> {
        let mut names: Vec<_> = self.scanning.iter().cloned().collect();
        names.sort();
        names
    }

    pub fn scanning_count(&self) -> usize {
        self.scanning.len()
    }

    /// No child is waiting for a final size.
    pub fn is_settled(&self) -> bool {
        self.scanning.is_empty()
    }

    /// A `Summary` was accepted.
    pub fn is_summarized(&self) -> bool {
        self.summarized
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Row for a child name.
    pub fn row(&self, name: &str) -> Option<&Row> {
        self.name_to_row.get(name).map(|&idx| &self.rows[idx])
    }

    /// Files counted below this level, when known.
    pub fn item_count(&self) -> Option<u64> {
        self.item_count
    }
}
