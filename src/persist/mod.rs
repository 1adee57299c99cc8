/// SQLite journal sink.
pub mod sqlite;

use crate::{
    core::tracker::{TrackError, TrackedSnapshot},
    op::JournalRecord,
    types::JournalSeq,
};

/// Persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Database error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Payload encoding or decoding error.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Anything else, already rendered.
    #[error("{0}")]
    Message(String),
}

impl From<TrackError> for PersistError {
    fn from(value: TrackError) -> Self {
        Self::Message(format!("editor error: {value}"))
    }
}

/// Result alias for persistence calls.
pub type PersistResult<T> = Result<T, PersistError>;

/// Destination for journal records drained from an editor.
pub trait JournalSink<U>: Send {
    /// Appends records in order and returns the highest stored sequence.
    fn append_records(&mut self, records: &[JournalRecord<U>]) -> PersistResult<JournalSeq>;
    /// Forces buffered writes to durable storage.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
    /// Stores a full editor snapshot.
    fn write_snapshot(&mut self, _snapshot: &TrackedSnapshot<U>) -> PersistResult<()> {
        Ok(())
    }
    /// Deletes records covered by a snapshot; returns how many went.
    fn compact_through(&mut self, _seq: JournalSeq) -> PersistResult<usize> {
        Ok(0)
    }
}
