//! Size events streamed by the scan coordinator.

use compact_str::CompactString;
use serde::Serialize;

use crate::identity::ScanId;

/// One event of a scan job's stream.
///
/// Per job: zero or more `Progress` per child (non-decreasing bytes), exactly
/// one `ChildComplete` per child, and one `Summary` once the whole root is
/// done. Every payload carries the job's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizeEvent {
    /// Best-known partial total for one immediate child.
    Progress {
        scan_id: ScanId,
        name: CompactString,
        bytes: u64,
    },
    /// Final total for one immediate child.
    ChildComplete {
        scan_id: ScanId,
        name: CompactString,
        bytes: u64,
        items: Option<u64>,
    },
    /// Final total for the root: files at this level plus every child.
    Summary {
        scan_id: ScanId,
        bytes: u64,
        items: Option<u64>,
    },
}

impl SizeEvent {
    /// Identity of the job that produced this event.
    pub fn scan_id(&self) -> ScanId {
        match self {
            Self::Progress { scan_id, .. }
            | Self::ChildComplete { scan_id, .. }
            | Self::Summary { scan_id, .. } => *scan_id,
        }
    }

    /// Child name, for per-child events.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Progress { name, .. } | Self::ChildComplete { name, .. } => Some(name.as_str()),
            Self::Summary { .. } => None,
        }
    }

    /// Reported byte count.
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Progress { bytes, .. }
            | Self::ChildComplete { bytes, .. }
            | Self::Summary { bytes, .. } => *bytes,
        }
    }
}
