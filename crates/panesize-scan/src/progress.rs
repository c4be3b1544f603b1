//! Source-side throttling of per-child progress events.

use std::time::{Duration, Instant};

/// Decides when a walk should publish its running total.
///
/// A walk reports when enough time has passed, when the total jumped by a
/// large amount, or after a batch of files, whichever comes first.
#[derive(Debug)]
pub(crate) struct ProgressThrottle {
    interval: Duration,
    burst_bytes: u64,
    file_batch: u32,
    last_emit_at: Option<Instant>,
    last_emitted_bytes: u64,
    files_since_emit: u32,
}

impl ProgressThrottle {
    pub fn new(interval: Duration, burst_bytes: u64, file_batch: u32) -> Self {
        Self {
            interval,
            burst_bytes,
            file_batch,
            last_emit_at: None,
            last_emitted_bytes: 0,
            files_since_emit: 0,
        }
    }

    /// Record one counted file; returns `true` if `bytes` should be emitted now.
    pub fn on_file(&mut self, bytes: u64) -> bool {
        self.files_since_emit = self.files_since_emit.saturating_add(1);

        let due_time = self
            .last_emit_at
            .is_none_or(|at| at.elapsed() >= self.interval);
        let big_jump = bytes.saturating_sub(self.last_emitted_bytes) >= self.burst_bytes;
        let many_files = self.files_since_emit >= self.file_batch;

        due_time || big_jump || many_files
    }

    /// Note that `bytes` was emitted.
    pub fn mark_emitted(&mut self, bytes: u64) {
        self.last_emit_at = Some(Instant::now());
        self.last_emitted_bytes = bytes;
        self.files_since_emit = 0;
    }

    /// Whether the final total still needs a progress event.
    pub fn lags(&self, bytes: u64) -> bool {
        bytes != self.last_emitted_bytes
    }
}
