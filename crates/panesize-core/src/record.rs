//! Size cache records.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Previously computed size of a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Total bytes of all files in the subtree.
    pub bytes: u64,
    /// Number of files counted, when known.
    pub items: Option<u64>,
    /// `false` means `bytes` is only a lower bound from an unfinished walk.
    pub completed: bool,
    /// When the record was last written.
    pub updated_at: SystemTime,
}

impl CacheRecord {
    /// A lower-bound record from an interrupted or running walk.
    pub fn partial(bytes: u64, items: Option<u64>) -> Self {
        Self {
            bytes,
            items,
            completed: false,
            updated_at: SystemTime::now(),
        }
    }

    /// A record from a finished walk.
    pub fn complete(bytes: u64, items: Option<u64>) -> Self {
        Self {
            bytes,
            items,
            completed: true,
            updated_at: SystemTime::now(),
        }
    }
}
