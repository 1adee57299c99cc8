//! Action boundary tracking, the cursor/redo window, and trim points.
//!
//! The action list holds two kinds of entries. A live [`ActionEntry::Action`]
//! records where its first event sits in the log; its span runs to the next
//! action's first event (or the log end). An [`ActionEntry::ElidedRedos`]
//! marker is pushed when a new action is opened while undone actions are still
//! redoable: it covers the `count` entries immediately before it, which stay
//! in the list (and their events in the log) but drop out of the undo/redo
//! chain.
//!
//! ```text
//! a a u a      entries: [A0, A1, E(1), A2]   encoded: [0, 1, F|1, 2]
//!                              ^^^^^ covers A1
//! ```
//!
//! `cursor = entries.len() - redo_size`. Entries before the cursor are the
//! undoable past; the cursor never rests inside an elided range.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::types::{ActionIndex, EventIndex};

/// Bit set in [`ActionEntry::encoded`] for elided-redo markers.
pub const FLAG_ELIDED_REDOS: u64 = 1 << 63;

/// One entry of the action list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionEntry {
    /// A recorded action starting at `first_event`.
    Action {
        /// Log index of the action's first event.
        first_event: EventIndex,
    },
    /// Marker covering the `count` entries before it.
    ElidedRedos {
        /// Number of covered entries.
        count: usize,
    },
}

impl ActionEntry {
    /// Packed form: the first event index, or [`FLAG_ELIDED_REDOS`] | count.
    pub fn encoded(&self) -> u64 {
        match self {
            Self::Action { first_event } => *first_event as u64,
            Self::ElidedRedos { count } => FLAG_ELIDED_REDOS | *count as u64,
        }
    }

    /// Returns true for [`ActionEntry::ElidedRedos`].
    pub fn is_elided_marker(&self) -> bool {
        matches!(self, Self::ElidedRedos { .. })
    }
}

/// Whether an action is being recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionState<U> {
    /// No action open; the next event opens one without annotation.
    NoPendingAction,
    /// `create_action` was called; the entry is pushed with the first event.
    Armed(Option<U>),
    /// Events are being appended to the last entry.
    PendingAction,
}

/// Action list plus the redo window and the recording state.
#[derive(Debug, Clone)]
pub struct History<U> {
    entries: Vec<ActionEntry>,
    user_data: Vec<Option<U>>,
    redo_count: usize,
    redo_size: usize,
    state: ActionState<U>,
}

impl<U> Default for History<U> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            user_data: Vec::new(),
            redo_count: 0,
            redo_size: 0,
            state: ActionState::NoPendingAction,
        }
    }
}

impl<U> History<U> {
    /// Empty history with no open action.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a history from its stored parts. Returns `None` when the
    /// parts are inconsistent with each other or with a log of `log_len`
    /// events.
    pub fn from_parts(
        entries: Vec<ActionEntry>,
        user_data: Vec<Option<U>>,
        redo_count: usize,
        redo_size: usize,
        log_len: EventIndex,
    ) -> Option<Self> {
        if entries.len() != user_data.len() || redo_size > entries.len() || redo_count > redo_size {
            return None;
        }
        let mut previous = 0;
        for (index, entry) in entries.iter().enumerate() {
            match *entry {
                ActionEntry::Action { first_event } => {
                    if first_event < previous || first_event >= log_len {
                        return None;
                    }
                    previous = first_event;
                }
                ActionEntry::ElidedRedos { count } => {
                    if count > index {
                        return None;
                    }
                }
            }
        }
        Some(Self {
            entries,
            user_data,
            redo_count,
            redo_size,
            state: ActionState::NoPendingAction,
        })
    }

    /// Every entry, live actions and markers alike.
    pub fn entries(&self) -> &[ActionEntry] {
        &self.entries
    }

    /// Number of entries, markers included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of undone actions that can be redone.
    pub fn redo_count(&self) -> usize {
        self.redo_count
    }

    /// Entries after the cursor, markers included.
    pub fn redo_size(&self) -> usize {
        self.redo_size
    }

    /// Index one past the last undoable entry.
    pub fn cursor(&self) -> ActionIndex {
        self.entries.len() - self.redo_size
    }

    /// Current recording state.
    pub fn state(&self) -> &ActionState<U> {
        &self.state
    }

    /// Annotation slot of every entry.
    pub fn user_data_slots(&self) -> &[Option<U>] {
        &self.user_data
    }

    /// Annotation of entry `index`, if any.
    pub fn user_data(&self, index: ActionIndex) -> Option<&U> {
        self.user_data.get(index).and_then(Option::as_ref)
    }

    /// Returns true while an action is open.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, ActionState::PendingAction)
    }

    /// Arms a new action carrying `user_data`.
    pub fn arm(&mut self, user_data: Option<U>) {
        self.state = ActionState::Armed(user_data);
    }

    /// Called before each event is appended at log index `next_event`.
    /// Returns the index of a freshly opened action, if one was opened.
    pub fn before_event(&mut self, next_event: EventIndex) -> Option<ActionIndex> {
        let user_data = match std::mem::replace(&mut self.state, ActionState::PendingAction) {
            ActionState::PendingAction => return None,
            ActionState::Armed(user_data) => user_data,
            ActionState::NoPendingAction => None,
        };

        if self.redo_size > 0 {
            self.entries.push(ActionEntry::ElidedRedos {
                count: self.redo_size,
            });
            self.user_data.push(None);
            self.redo_count = 0;
            self.redo_size = 0;
        }

        self.entries.push(ActionEntry::Action {
            first_event: next_event,
        });
        self.user_data.push(user_data);
        Some(self.entries.len() - 1)
    }

    /// Closes the open action. Returns its index if one was recorded.
    pub fn commit(&mut self) -> Option<ActionIndex> {
        let was_pending = self.is_pending();
        self.state = ActionState::NoPendingAction;
        was_pending.then(|| self.entries.len() - 1)
    }

    /// Events of action `index`, given the current log length.
    pub fn event_range(&self, index: ActionIndex, log_len: EventIndex) -> Option<Range<EventIndex>> {
        let ActionEntry::Action { first_event } = *self.entries.get(index)? else {
            return None;
        };
        Some(first_event..self.first_event_from(index + 1, log_len))
    }

    /// First event of the first live entry at or after `index`.
    pub fn first_event_from(&self, index: ActionIndex, log_len: EventIndex) -> EventIndex {
        self.entries
            .get(index..)
            .unwrap_or(&[])
            .iter()
            .find_map(|entry| match entry {
                ActionEntry::Action { first_event } => Some(*first_event),
                ActionEntry::ElidedRedos { .. } => None,
            })
            .unwrap_or(log_len)
    }

    /// Action an undo would reverse: walks back from the cursor, stepping
    /// over elided ranges.
    pub fn undo_target(&self) -> Option<ActionIndex> {
        let mut i = self.cursor();
        while i > 0 {
            match self.entries[i - 1] {
                ActionEntry::Action { .. } => return Some(i - 1),
                ActionEntry::ElidedRedos { count } => i = (i - 1).saturating_sub(count),
            }
        }
        None
    }

    /// Action a redo would replay: the first live entry at or after the cursor.
    pub fn redo_target(&self) -> Option<ActionIndex> {
        let cursor = self.cursor();
        let mut i = self.entries.len();
        let mut target = None;
        while i > cursor {
            match self.entries[i - 1] {
                ActionEntry::Action { .. } => {
                    target = Some(i - 1);
                    i -= 1;
                }
                ActionEntry::ElidedRedos { count } => i = (i - 1).saturating_sub(count),
            }
        }
        target
    }

    /// Moves the cursor back to `index` after it was undone.
    pub fn mark_undone(&mut self, index: ActionIndex) {
        self.redo_size = self.entries.len() - index;
        self.redo_count += 1;
    }

    /// Moves the cursor past `index` after it was redone.
    pub fn mark_redone(&mut self, index: ActionIndex) {
        self.redo_size = self.entries.len() - (index + 1);
        self.redo_count = self.redo_count.saturating_sub(1);
    }

    /// `valid[t]` for every `t` in `0..=len`: trimming before `t` leaves no
    /// marker covering a removed entry.
    fn trim_boundaries(&self) -> Vec<bool> {
        let len = self.entries.len();
        let mut valid = vec![true; len + 1];
        let mut lowest_covered = usize::MAX;
        for t in (0..len).rev() {
            if let ActionEntry::ElidedRedos { count } = self.entries[t] {
                lowest_covered = lowest_covered.min(t.saturating_sub(count));
            }
            valid[t] = t <= lowest_covered;
        }
        valid
    }

    /// Largest valid trim point at or below `requested`, never past the cursor.
    pub fn snap_trim_point(&self, requested: ActionIndex) -> ActionIndex {
        let valid = self.trim_boundaries();
        let mut t = requested.min(self.cursor());
        while t > 0 && !valid[t] {
            t -= 1;
        }
        t
    }

    /// Valid trim points in ascending order, up to the cursor.
    pub fn trim_points(&self) -> Vec<ActionIndex> {
        let cursor = self.cursor();
        self.trim_boundaries()
            .into_iter()
            .enumerate()
            .take(cursor + 1)
            .filter_map(|(t, valid)| valid.then_some(t))
            .collect()
    }

    /// Drops entries before `trim_point` (already snapped) and rebases the
    /// remaining first-event indices by `dropped_events`.
    pub fn drain_front(&mut self, trim_point: ActionIndex, dropped_events: usize) {
        debug_assert!(
            self.trim_boundaries().get(trim_point).copied().unwrap_or(false),
            "trim point {trim_point} splits an elided range"
        );
        self.entries.drain(..trim_point);
        self.user_data.drain(..trim_point);
        for entry in &mut self.entries {
            if let ActionEntry::Action { first_event } = entry {
                *first_event -= dropped_events;
            }
        }
    }

    /// Drops the whole redo window.
    pub fn drop_redos(&mut self) {
        let cursor = self.cursor();
        self.entries.truncate(cursor);
        self.user_data.truncate(cursor);
        self.redo_count = 0;
        self.redo_size = 0;
    }

    /// Forgets every entry and closes any open action.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.user_data.clear();
        self.redo_count = 0;
        self.redo_size = 0;
        self.state = ActionState::NoPendingAction;
    }
}
