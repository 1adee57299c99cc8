//! The editor: owns a tracked aggregate, its event log and its history.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{
    config::TrackerConfig,
    op::{Event, JournalEntry, JournalRecord},
    reflect::{FieldKind, Member, ReflectError, Value, resolve},
    types::{ActionIndex, EventIndex, JournalSeq, Path, now_ms},
};

use super::{
    apply::{Direction, apply_event},
    edit::Edit,
    element::TrackedElement,
    history::{ActionEntry, History},
    log::EventLog,
    selection::SelectionOverlay,
};

/// Errors reported by the editor and its edit views.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    /// Value conversion or path parsing failed.
    #[error(transparent)]
    Reflect(#[from] ReflectError),
    /// An event could not be encoded or decoded.
    #[error("event codec failed: {0}")]
    Codec(#[from] serde_json::Error),
    /// Nothing lives at the given path.
    #[error("no field at `{0}`")]
    UnknownPath(String),
    /// The field has no named children.
    #[error("`{0}` is not an aggregate")]
    NotAggregate(String),
    /// The field is neither a fixed array nor a sequence.
    #[error("`{0}` is not an array or sequence")]
    NotIndexed(String),
    /// The field is not a dynamically sized sequence.
    #[error("`{0}` is not a sequence")]
    NotSequence(String),
    /// A structural index was past the end of its field.
    #[error("index {index} out of range for `{path}` of length {len}")]
    IndexOutOfRange {
        /// Field path.
        path: String,
        /// Requested index.
        index: usize,
        /// Current length.
        len: usize,
    },
    /// The aggregate cannot be re-initialized while actions are recorded.
    #[error("history already exists; clear it before re-initializing")]
    HistoryExists,
    /// No action list entry at this index.
    #[error("no action at index {0}")]
    UnknownAction(ActionIndex),
    /// A snapshot could not be turned back into an editor.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
    /// Replaying a journal record did not reproduce the recorded outcome.
    #[error("journal record {seq} does not match the editor state")]
    JournalDiverged {
        /// Sequence of the offending record.
        seq: JournalSeq,
    },
    /// A recorded event failed to replay.
    #[error("replay of event {index} failed: {source}")]
    Replay {
        /// Log index of the failing event.
        index: EventIndex,
        /// Underlying failure.
        source: Box<TrackError>,
    },
}

/// How [`Tracked::init_data`] treats the replaced aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitMode {
    /// Replace without recording; the new data becomes the baseline.
    Baseline,
    /// Record the replacement as an undoable action.
    Record,
}

/// One event of a rendered action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedEvent {
    /// Operation label such as `set` or `reorder`.
    pub label: &'static str,
    /// Field path with field names.
    pub path: String,
    /// The decoded event.
    pub event: Event,
}

/// Inspection view of one action list entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedAction<U> {
    /// Position in the action list.
    pub index: ActionIndex,
    /// The entry itself.
    pub entry: ActionEntry,
    /// Decoded events; empty for elided-redo markers.
    pub events: Vec<RenderedEvent>,
    /// Caller annotation.
    pub user_data: Option<U>,
    /// Encoded size of the action's events.
    pub byte_count: usize,
    /// True when the entry sits in the redo window.
    pub undone: bool,
}

/// Full editor state at a journal position: the aggregate, the event log,
/// the action list and the selections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSnapshot<U> {
    /// Newest journal record reflected in the snapshot.
    pub last_seq: JournalSeq,
    /// The aggregate.
    pub data: Value,
    /// Every logged event, oldest first.
    pub events: Vec<Event>,
    /// The action list.
    pub entries: Vec<ActionEntry>,
    /// Annotation per action list entry.
    pub user_data: Vec<Option<U>>,
    /// Live redoable actions.
    pub redo_count: usize,
    /// Entries in the redo window.
    pub redo_size: usize,
    /// Non-empty selections.
    pub selections: Vec<(Path, Vec<usize>)>,
}

/// Undo/redo editor over a reflected aggregate `T`.
///
/// All mutation goes through [`Edit`] views obtained from
/// [`create_action`](Self::create_action); each view records one action.
/// `U` is optional per-action annotation data.
#[derive(Debug, Clone)]
pub struct Tracked<T, U = ()> {
    data: T,
    kind: Arc<FieldKind>,
    log: EventLog,
    history: History<U>,
    selections: SelectionOverlay,
    config: TrackerConfig,
    open_events: Vec<Event>,
    journal: Vec<JournalRecord<U>>,
    next_seq: JournalSeq,
}

impl<T: Member + Default, U: Clone> Default for Tracked<T, U> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Member, U: Clone> Tracked<T, U> {
    /// Wraps `data` with the default limits.
    pub fn new(data: T) -> Self {
        Self::with_config(data, TrackerConfig::default())
    }

    /// Wraps `data` with explicit limits.
    pub fn with_config(data: T, config: TrackerConfig) -> Self {
        Self {
            data,
            kind: Arc::new(T::kind()),
            log: EventLog::new(),
            history: History::new(),
            selections: SelectionOverlay::new(),
            config,
            open_events: Vec::new(),
            journal: Vec::new(),
            next_seq: 1,
        }
    }

    /// Rebuilds an editor from [`export_snapshot`](Self::export_snapshot)
    /// output. Journal numbering resumes after the snapshot.
    pub fn from_snapshot(snapshot: TrackedSnapshot<U>, config: TrackerConfig) -> Result<Self, TrackError>
    where
        T: Default,
    {
        let mut data = T::default();
        data.assign_value(snapshot.data)?;
        let log = EventLog::from_events(&snapshot.events)?;
        let history = History::from_parts(
            snapshot.entries,
            snapshot.user_data,
            snapshot.redo_count,
            snapshot.redo_size,
            log.len(),
        )
        .ok_or_else(|| TrackError::CorruptSnapshot("inconsistent action list".to_string()))?;

        let mut tracked = Self::with_config(data, config);
        for (path, selection) in snapshot.selections {
            tracked.selections.set(&path, selection);
        }
        tracked.log = log;
        tracked.history = history;
        tracked.next_seq = snapshot.last_seq + 1;
        debug!(
            last_seq = snapshot.last_seq,
            actions = tracked.history.len(),
            events = tracked.log.len(),
            "editor restored from snapshot"
        );
        Ok(tracked)
    }

    /// Captures the full editor state.
    pub fn export_snapshot(&self) -> Result<TrackedSnapshot<U>, TrackError> {
        Ok(TrackedSnapshot {
            last_seq: self.latest_journal_seq(),
            data: self.data.to_value()?,
            events: self.log.decode_range(0..self.log.len())?,
            entries: self.history.entries().to_vec(),
            user_data: self.history.user_data_slots().to_vec(),
            redo_count: self.history.redo_count(),
            redo_size: self.history.redo_size(),
            selections: self
                .selections
                .iter()
                .map(|(path, selection)| (path.clone(), selection.to_vec()))
                .collect(),
        })
    }

    /// Re-applies one journal record produced by an editor in the same
    /// state. Limits are not enforced while replaying; trims arrive as their
    /// own records.
    pub fn apply_journal(&mut self, record: JournalRecord<U>) -> Result<(), TrackError> {
        let queued = self.journal.len();
        let outcome = self.replay_journal_entry(record.seq, record.entry);
        self.journal.truncate(queued);
        outcome?;
        self.next_seq = self.next_seq.max(record.seq + 1);
        Ok(())
    }

    /// Limits in effect.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The live aggregate.
    pub fn read(&self) -> &T {
        &self.data
    }

    /// Unwraps the aggregate, dropping history.
    pub fn into_inner(self) -> T {
        self.data
    }

    /// Descriptor of `T`.
    pub fn kind(&self) -> &Arc<FieldKind> {
        &self.kind
    }

    /// Renders `path` with field names.
    pub fn describe(&self, path: &Path) -> String {
        self.kind.describe(path)
    }

    /// Starts a new action. Every mutation made through the returned view is
    /// recorded into it; the action closes when the view is committed or
    /// dropped. An action that records nothing leaves no trace.
    pub fn create_action(&mut self) -> Edit<'_, T, U> {
        self.arm_action(None);
        let kind = Arc::clone(&self.kind);
        Edit::new(self, Path::root(), kind)
    }

    /// Like [`create_action`](Self::create_action), annotating the action
    /// with `user_data`.
    pub fn create_action_with(&mut self, user_data: U) -> Edit<'_, T, U> {
        self.arm_action(Some(user_data));
        let kind = Arc::clone(&self.kind);
        Edit::new(self, Path::root(), kind)
    }

    /// Records the current state as action 0, reachable by undo as a
    /// transition from `T::default()`.
    pub fn record_init(&mut self) -> Result<Option<ActionIndex>, TrackError>
    where
        T: Default,
    {
        if !self.history.is_empty() {
            return Err(TrackError::HistoryExists);
        }
        let event = Event::Set {
            path: Path::root(),
            old: T::default().to_value()?,
            new: self.data.to_value()?,
        };
        self.record(vec![event])
    }

    /// Replaces the whole aggregate. Fails once any action is recorded.
    pub fn init_data(&mut self, data: T, mode: InitMode) -> Result<Option<ActionIndex>, TrackError> {
        if !self.history.is_empty() {
            return Err(TrackError::HistoryExists);
        }

        match mode {
            InitMode::Baseline => {
                if self.config.journal {
                    match data.to_value() {
                        Ok(value) => self.journal(JournalEntry::DataReset { data: value }),
                        Err(err) => warn!(%err, "journal cannot capture re-baselined data"),
                    }
                }
                self.close_pending();
                self.data = data;
                self.selections.clear();
                self.log.clear();
                debug!("aggregate re-baselined");
                Ok(None)
            }
            InitMode::Record => {
                let root = Path::root();
                let mut events = vec![Event::Set {
                    path: root.clone(),
                    old: self.data.to_value()?,
                    new: data.to_value()?,
                }];
                events.extend(self.clearing_selections(&root));
                self.record(events)
            }
        }
    }

    /// Forgets every action and event. Data and selections are kept.
    pub fn clear_history(&mut self) {
        self.close_pending();
        let dropped = self.history.len();
        self.log.clear();
        self.history.clear();
        self.open_events.clear();
        self.journal(JournalEntry::HistoryCleared);
        debug!(dropped, "history cleared");
    }

    /// Reverses the newest undoable action. Returns `None` when there is
    /// nothing to undo.
    pub fn undo_action(&mut self) -> Result<Option<ActionIndex>, TrackError> {
        self.close_pending();
        let Some(target) = self.history.undo_target() else {
            trace!("nothing to undo");
            return Ok(None);
        };
        self.replay(target, Direction::Backward)?;
        self.history.mark_undone(target);
        self.journal(JournalEntry::Undone { action: target });
        debug!(
            action = target,
            redo_count = self.history.redo_count(),
            redo_size = self.history.redo_size(),
            "action undone"
        );
        Ok(Some(target))
    }

    /// Replays the next redoable action. Returns `None` when there is nothing
    /// to redo.
    pub fn redo_action(&mut self) -> Result<Option<ActionIndex>, TrackError> {
        self.close_pending();
        let Some(target) = self.history.redo_target() else {
            trace!("nothing to redo");
            return Ok(None);
        };
        self.replay(target, Direction::Forward)?;
        self.history.mark_redone(target);
        self.journal(JournalEntry::Redone { action: target });
        debug!(
            action = target,
            redo_count = self.history.redo_count(),
            redo_size = self.history.redo_size(),
            "action redone"
        );
        Ok(Some(target))
    }

    /// Returns true when an action can be undone.
    pub fn can_undo(&self) -> bool {
        self.history.undo_target().is_some()
    }

    /// Returns true when an action can be redone.
    pub fn can_redo(&self) -> bool {
        self.history.redo_target().is_some()
    }

    /// Entries in the action list, elided markers included.
    pub fn total_actions(&self) -> usize {
        self.history.len()
    }

    /// Entries before the cursor form the undoable past.
    pub fn cursor_index(&self) -> ActionIndex {
        self.history.cursor()
    }

    /// Live actions available to redo.
    pub fn redo_count(&self) -> usize {
        self.history.redo_count()
    }

    /// Action list entries in the redo window.
    pub fn redo_size(&self) -> usize {
        self.history.redo_size()
    }

    /// Action list entries, elided markers included.
    pub fn actions(&self) -> &[ActionEntry] {
        self.history.entries()
    }

    /// Packed form of every action list entry.
    pub fn encoded_actions(&self) -> Vec<u64> {
        self.history.entries().iter().map(ActionEntry::encoded).collect()
    }

    /// Annotation of action `index`.
    pub fn user_data(&self, index: ActionIndex) -> Option<&U> {
        self.history.user_data(index)
    }

    /// Events in the log.
    pub fn event_count(&self) -> usize {
        self.log.len()
    }

    /// Encoded size of the event log.
    pub fn history_bytes(&self) -> usize {
        self.log.byte_len()
    }

    /// Encoded size of action `index`; zero for markers.
    pub fn action_bytes(&self, index: ActionIndex) -> usize {
        self.history
            .event_range(index, self.log.len())
            .map(|range| self.log.bytes_in(range))
            .unwrap_or(0)
    }

    /// Discards history before `keep_from`, snapped down to the nearest
    /// point that leaves every remaining entry intact. Never trims past the
    /// cursor. Returns the trim point actually used.
    pub fn trim_history(&mut self, keep_from: ActionIndex) -> ActionIndex {
        self.close_pending();
        let trim_point = self.history.snap_trim_point(keep_from);
        if trim_point > 0 {
            self.trim_front(trim_point, false);
        }
        trim_point
    }

    /// Discards the fewest oldest actions that bring the log to `budget`
    /// bytes or less. When even trimming up to the cursor is not enough, the
    /// redo window is dropped as well, leaving an empty log.
    pub fn trim_history_to_size(&mut self, budget: usize) -> ActionIndex {
        self.close_pending();
        let total = self.log.byte_len();
        let log_len = self.log.len();

        let found = self.history.trim_points().into_iter().find(|&t| {
            let kept_from = self.history.first_event_from(t, log_len);
            total - self.log.byte_offset(kept_from) <= budget
        });

        if let Some(trim_point) = found {
            if trim_point > 0 {
                self.trim_front(trim_point, false);
            }
            return trim_point;
        }

        self.drop_redos_and_trim()
    }

    /// Renders one action list entry.
    pub fn render_action(&self, index: ActionIndex) -> Result<RenderedAction<U>, TrackError> {
        let entry = *self
            .history
            .entries()
            .get(index)
            .ok_or(TrackError::UnknownAction(index))?;

        let (events, byte_count) = match self.history.event_range(index, self.log.len()) {
            Some(range) => {
                let byte_count = self.log.bytes_in(range.clone());
                let events = self
                    .log
                    .decode_range(range)?
                    .into_iter()
                    .map(|event| RenderedEvent {
                        label: event.label(),
                        path: self.describe(event.path()),
                        event,
                    })
                    .collect();
                (events, byte_count)
            }
            None => (Vec::new(), 0),
        };

        Ok(RenderedAction {
            index,
            entry,
            events,
            user_data: self.history.user_data(index).cloned(),
            byte_count,
            undone: index >= self.history.cursor(),
        })
    }

    /// Renders the whole action list.
    pub fn render_change_history(&self) -> Result<Vec<RenderedAction<U>>, TrackError> {
        (0..self.history.len())
            .map(|index| self.render_action(index))
            .collect()
    }

    /// Selected indices of the indexed field at `expr`.
    pub fn selection(&self, expr: &str) -> Result<&[usize], TrackError> {
        let (path, kind) = self.kind.resolve(expr)?;
        if !kind.is_indexed() {
            return Err(TrackError::NotIndexed(expr.to_string()));
        }
        Ok(self.selections.get(&path))
    }

    /// Selected indices of the field at `path`.
    pub fn selection_at(&self, path: &Path) -> &[usize] {
        self.selections.get(path)
    }

    /// Every non-empty selection.
    pub fn selections(&self) -> impl Iterator<Item = (&Path, &[usize])> {
        self.selections.iter()
    }

    pub(crate) fn overlay(&self) -> &SelectionOverlay {
        &self.selections
    }

    /// Editor scoped to the field or element at `expr`.
    pub fn element(&mut self, expr: &str) -> Result<TrackedElement<'_, T, U>, TrackError> {
        let (path, kind) = self.kind.resolve(expr)?;
        if self.member(&path).is_none() {
            return Err(TrackError::UnknownPath(expr.to_string()));
        }
        Ok(TrackedElement::new(self, path, kind))
    }

    /// Field or element at `path`.
    pub fn member(&self, path: &Path) -> Option<&dyn Member> {
        resolve(&self.data, path.steps())
    }

    /// Hands out queued journal records, oldest first.
    pub fn drain_journal(&mut self) -> Vec<JournalRecord<U>> {
        std::mem::take(&mut self.journal)
    }

    /// Sequence of the newest journal record produced so far.
    pub fn latest_journal_seq(&self) -> JournalSeq {
        self.next_seq.saturating_sub(1)
    }

    /// Applies and records `events` into the open action, opening one if
    /// needed. Stops at the first event that fails to apply; events before it
    /// stay recorded.
    pub(crate) fn submit(&mut self, events: Vec<Event>) -> Result<(), TrackError> {
        for event in events {
            let encoded = EventLog::encode(&event)?;
            apply_event(&mut self.data, &mut self.selections, &event, Direction::Forward)?;
            if let Some(action) = self.history.before_event(self.log.len()) {
                trace!(action, "action opened");
            }
            let index = self.log.push_encoded(&encoded);
            trace!(index, label = event.label(), path = %event.path(), "event recorded");
            if self.config.journal {
                self.open_events.push(event);
            }
        }
        Ok(())
    }

    /// Closes the open action, applying configured limits.
    pub(crate) fn commit_action(&mut self) -> Option<ActionIndex> {
        self.close_action(true)
    }

    fn close_action(&mut self, enforce_limits: bool) -> Option<ActionIndex> {
        let committed = self.history.commit();
        let Some(action) = committed else {
            return None;
        };

        let events = self
            .history
            .event_range(action, self.log.len())
            .map(|range| range.len())
            .unwrap_or(0);
        debug!(action, events, "action committed");

        if self.config.journal {
            let entry = JournalEntry::ActionCommitted {
                action,
                user_data: self.history.user_data(action).cloned(),
                events: std::mem::take(&mut self.open_events),
            };
            self.journal(entry);
        }

        if enforce_limits {
            self.enforce_limits();
        }
        committed
    }

    /// `Select` events clearing the selection at `path` and every selection
    /// below it.
    pub(crate) fn clearing_selections(&self, path: &Path) -> Vec<Event> {
        let own = self.selections.get(path);
        let own = (!own.is_empty()).then(|| Event::Select {
            path: path.clone(),
            old: own.to_vec(),
            new: Vec::new(),
        });
        own.into_iter()
            .chain(self.selections.clear_below(path).into_iter().map(Event::from))
            .collect()
    }

    pub(crate) fn arm_action(&mut self, user_data: Option<U>) {
        self.close_pending();
        self.history.arm(user_data);
    }

    fn record(&mut self, events: Vec<Event>) -> Result<Option<ActionIndex>, TrackError> {
        self.arm_action(None);
        let submitted = self.submit(events);
        let action = self.commit_action();
        submitted?;
        Ok(action)
    }

    fn replay_journal_entry(&mut self, seq: JournalSeq, entry: JournalEntry<U>) -> Result<(), TrackError> {
        let diverged = TrackError::JournalDiverged { seq };
        match entry {
            JournalEntry::ActionCommitted {
                action,
                user_data,
                events,
            } => {
                self.arm_action(user_data);
                let submitted = self.submit(events);
                let committed = self.close_action(false);
                submitted?;
                if committed != Some(action) {
                    return Err(diverged);
                }
            }
            JournalEntry::Undone { action } => {
                if self.undo_action()? != Some(action) {
                    return Err(diverged);
                }
            }
            JournalEntry::Redone { action } => {
                if self.redo_action()? != Some(action) {
                    return Err(diverged);
                }
            }
            JournalEntry::Trimmed {
                trim_point,
                dropped_redos: true,
            } => {
                if trim_point != self.history.cursor() {
                    return Err(diverged);
                }
                self.drop_redos_and_trim();
            }
            JournalEntry::Trimmed {
                trim_point,
                dropped_redos: false,
            } => {
                if self.history.snap_trim_point(trim_point) != trim_point {
                    return Err(diverged);
                }
                if trim_point > 0 {
                    self.trim_front(trim_point, false);
                }
            }
            JournalEntry::HistoryCleared => self.clear_history(),
            JournalEntry::DataReset { data } => {
                if !self.history.is_empty() {
                    return Err(diverged);
                }
                self.data.assign_value(data)?;
                self.selections.clear();
            }
        }
        Ok(())
    }

    fn close_pending(&mut self) {
        if self.history.is_pending() {
            self.commit_action();
        }
    }

    fn replay(&mut self, action: ActionIndex, direction: Direction) -> Result<(), TrackError> {
        let range = self
            .history
            .event_range(action, self.log.len())
            .ok_or(TrackError::UnknownAction(action))?;
        let first = range.start;
        let events = self.log.decode_range(range)?;

        let mut offsets: Vec<usize> = (0..events.len()).collect();
        if direction == Direction::Backward {
            offsets.reverse();
        }
        for offset in offsets {
            apply_event(&mut self.data, &mut self.selections, &events[offset], direction).map_err(
                |source| TrackError::Replay {
                    index: first + offset,
                    source: Box::new(source),
                },
            )?;
        }
        Ok(())
    }

    fn trim_front(&mut self, trim_point: ActionIndex, dropped_redos: bool) {
        let dropped_events = self.history.first_event_from(trim_point, self.log.len());
        let dropped_bytes = self.log.byte_offset(dropped_events);
        self.log.truncate_front(dropped_events);
        self.history.drain_front(trim_point, dropped_events);
        self.journal(JournalEntry::Trimmed {
            trim_point,
            dropped_redos,
        });
        debug!(
            trim_point,
            dropped_events,
            dropped_bytes,
            dropped_redos,
            remaining_bytes = self.log.byte_len(),
            "history trimmed"
        );
    }

    /// Drops the redo window, then everything before the cursor.
    fn drop_redos_and_trim(&mut self) -> ActionIndex {
        let cursor = self.history.cursor();
        let log_len = self.log.len();
        let kept_events = self.history.first_event_from(cursor, log_len);
        self.log.truncate_back(log_len - kept_events);
        self.history.drop_redos();
        self.trim_front(cursor, true);
        cursor
    }

    fn enforce_limits(&mut self) {
        if let Some(max_actions) = self.config.max_actions {
            let cursor = self.history.cursor();
            if cursor > max_actions {
                self.trim_history(cursor - max_actions);
            }
        }
        if let Some(budget) = self.config.max_history_bytes {
            if self.log.byte_len() > budget {
                self.trim_history_to_size(budget);
            }
        }
    }

    fn journal(&mut self, entry: JournalEntry<U>) {
        if !self.config.journal {
            return;
        }
        let record = JournalRecord {
            seq: self.next_seq,
            ts_ms: now_ms(),
            entry,
        };
        self.next_seq += 1;
        self.journal.push(record);
    }
}

