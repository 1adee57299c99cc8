//! Event model recorded in the event log, plus journal record types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ActionIndex, JournalSeq, Path};

/// Version number for serialized [`JournalEnvelope`] payloads.
pub const JOURNAL_FORMAT_VERSION: u16 = 1;

/// Capacity-only change to a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapacityChange {
    /// Reserve room for this many more elements.
    Reserve(usize),
    /// Release unused capacity.
    ShrinkToFit,
}

/// One field-level mutation, replayable in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Whole-value assignment. An empty path re-initializes the aggregate.
    Set {
        /// Assigned field.
        path: Path,
        /// Value before the assignment.
        old: Value,
        /// Value after the assignment.
        new: Value,
    },
    /// Contiguous insertion into a sequence.
    Insert {
        /// Sequence field.
        path: Path,
        /// Index of the first inserted element.
        at: usize,
        /// Inserted elements.
        values: Vec<Value>,
    },
    /// Removal of elements from a sequence.
    Remove {
        /// Sequence field.
        path: Path,
        /// Removed elements by their original index, ascending.
        removed: Vec<(usize, Value)>,
    },
    /// Permutation of an indexed field; `order[i]` is the old index now at `i`.
    Reorder {
        /// Indexed field.
        path: Path,
        /// New arrangement in terms of old indices.
        order: Vec<usize>,
    },
    /// Capacity change. Undoing it leaves the capacity alone.
    Capacity {
        /// Sequence field.
        path: Path,
        /// Requested change.
        change: CapacityChange,
    },
    /// Selection change on an indexed field.
    Select {
        /// Indexed field.
        path: Path,
        /// Selection before the change.
        old: Vec<usize>,
        /// Selection after the change.
        new: Vec<usize>,
    },
}

impl Event {
    /// Field the event applies to.
    pub fn path(&self) -> &Path {
        match self {
            Self::Set { path, .. }
            | Self::Insert { path, .. }
            | Self::Remove { path, .. }
            | Self::Reorder { path, .. }
            | Self::Capacity { path, .. }
            | Self::Select { path, .. } => path,
        }
    }

    /// Short operation label for history rendering.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Set { path, .. } if path.is_root() => "reinit",
            Self::Set { .. } => "set",
            Self::Insert { .. } => "insert",
            Self::Remove { .. } => "remove",
            Self::Reorder { .. } => "reorder",
            Self::Capacity {
                change: CapacityChange::Reserve(_),
                ..
            } => "reserve",
            Self::Capacity {
                change: CapacityChange::ShrinkToFit,
                ..
            } => "shrink",
            Self::Select { .. } => "select",
        }
    }
}

/// Journal entry describing one change to the editor's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalEntry<U> {
    /// An action was committed.
    ActionCommitted {
        /// Action list position.
        action: ActionIndex,
        /// Caller-supplied annotation.
        user_data: Option<U>,
        /// Events of the action, in order.
        events: Vec<Event>,
    },
    /// An action was undone.
    Undone {
        /// Action list position.
        action: ActionIndex,
    },
    /// An action was redone.
    Redone {
        /// Action list position.
        action: ActionIndex,
    },
    /// Actions before `trim_point` were discarded.
    Trimmed {
        /// Number of action entries removed from the front.
        trim_point: ActionIndex,
        /// True when the redo window was discarded too.
        dropped_redos: bool,
    },
    /// All history was discarded.
    HistoryCleared,
    /// The aggregate was replaced without recording.
    DataReset {
        /// New aggregate value.
        data: Value,
    },
}

impl<U> JournalEntry<U> {
    /// Stable numeric kind used by persistence indexes.
    pub fn kind_code(&self) -> i64 {
        match self {
            Self::ActionCommitted { .. } => 1,
            Self::Undone { .. } => 2,
            Self::Redone { .. } => 3,
            Self::Trimmed { .. } => 4,
            Self::HistoryCleared => 5,
            Self::DataReset { .. } => 6,
        }
    }

    /// Action the entry refers to, if any.
    pub fn action(&self) -> Option<ActionIndex> {
        match self {
            Self::ActionCommitted { action, .. }
            | Self::Undone { action }
            | Self::Redone { action } => Some(*action),
            _ => None,
        }
    }
}

/// Journal row metadata plus entry payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord<U> {
    /// Monotonic record sequence.
    pub seq: JournalSeq,
    /// Record timestamp in milliseconds.
    pub ts_ms: u64,
    /// Record body.
    pub entry: JournalEntry<U>,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEnvelope<U> {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped record.
    pub record: JournalRecord<U>,
}

impl<U> JournalEnvelope<U> {
    /// Constructs an envelope using [`JOURNAL_FORMAT_VERSION`].
    pub fn new(record: JournalRecord<U>) -> Self {
        Self {
            format_version: JOURNAL_FORMAT_VERSION,
            record,
        }
    }
}
