//! Editor configuration.

use serde::{Deserialize, Serialize};

/// Per-editor settings.
///
/// Limits are enforced after every committed action by trimming the oldest
/// history, exactly as [`Tracked::trim_history`](crate::core::tracker::Tracked::trim_history)
/// and [`Tracked::trim_history_to_size`](crate::core::tracker::Tracked::trim_history_to_size)
/// would.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Keep at most this many undoable action entries.
    pub max_actions: Option<usize>,
    /// Keep at most this many bytes of encoded events.
    pub max_history_bytes: Option<usize>,
    /// Queue journal records for [`Tracked::drain_journal`](crate::core::tracker::Tracked::drain_journal).
    pub journal: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_actions: None,
            max_history_bytes: None,
            journal: false,
        }
    }
}

impl TrackerConfig {
    /// Default limits with journaling switched on.
    pub fn journaled() -> Self {
        Self {
            journal: true,
            ..Self::default()
        }
    }
}
