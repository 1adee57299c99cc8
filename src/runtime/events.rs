//! Runtime event stream payloads.

use crate::types::{ActionIndex, JournalSeq};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedEvent {
    /// An edit committed a new action.
    ActionCommitted {
        /// Action list position.
        action: ActionIndex,
    },
    /// One action was undone.
    UndoApplied {
        /// Undone action.
        action: ActionIndex,
    },
    /// One action was redone.
    RedoApplied {
        /// Redone action.
        action: ActionIndex,
    },
    /// History before `trim_point` was discarded on request.
    HistoryTrimmed {
        /// Trim point actually used.
        trim_point: ActionIndex,
    },
    /// Persistence has reached at least this journal sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        seq: JournalSeq,
    },
}
