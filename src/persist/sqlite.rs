//! SQLite-backed append-only journal sink.

use std::marker::PhantomData;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    config::TrackerConfig,
    core::tracker::{Tracked, TrackedSnapshot},
    op::{JOURNAL_FORMAT_VERSION, JournalEnvelope, JournalRecord},
    reflect::Member,
    types::{JournalSeq, now_ms},
};

use super::{JournalSink, PersistError, PersistResult};

const SNAPSHOT_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope<U> {
    format_version: u16,
    snapshot: TrackedSnapshot<U>,
}

/// SQLite implementation of [`JournalSink`]. `U` is the editor's per-action
/// annotation type.
pub struct SqliteJournal<U> {
    conn: Connection,
    _user_data: PhantomData<fn() -> U>,
}

impl<U> SqliteJournal<U> {
    /// Opens or creates a journal at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory journal.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn,
            _user_data: PhantomData,
        })
    }

    /// Deletes records up to and including `seq`.
    pub fn compact_through(&mut self, seq: JournalSeq) -> PersistResult<usize> {
        let count = self
            .conn
            .execute("DELETE FROM journal WHERE seq <= ?1", params![seq as i64])?;
        debug!(seq, count, "journal compacted");
        Ok(count)
    }

    /// Returns the latest sequence persisted in the journal table.
    pub fn latest_seq(&self) -> PersistResult<JournalSeq> {
        let seq: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM journal", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(seq.unwrap_or(0) as JournalSeq)
    }

    /// Number of stored journal records.
    pub fn record_count(&self) -> PersistResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM journal", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl<U: Serialize + DeserializeOwned + Clone> SqliteJournal<U> {
    /// Rebuilds an editor from the latest snapshot plus the records after it.
    pub fn load_tracked<T: Member + Default>(&self, config: TrackerConfig) -> PersistResult<Tracked<T, U>> {
        let (mut tracked, start_seq) = match self.load_latest_snapshot()? {
            Some(snapshot) => {
                let last_seq = snapshot.last_seq;
                (Tracked::from_snapshot(snapshot, config)?, last_seq)
            }
            None => (Tracked::with_config(T::default(), config), 0),
        };

        let records = self.load_records_after(start_seq)?;
        let replayed = records.len();
        for record in records {
            tracked.apply_journal(record)?;
        }
        debug!(start_seq, replayed, "editor loaded from journal");
        Ok(tracked)
    }

    /// Loads records strictly after `seq`.
    pub fn load_records_after(&self, seq: JournalSeq) -> PersistResult<Vec<JournalRecord<U>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, ts_ms, payload FROM journal WHERE seq > ?1 ORDER BY seq ASC")?;

        let rows = stmt.query_map(params![seq as i64], |row| {
            let seq: i64 = row.get(0)?;
            let ts_ms: i64 = row.get(1)?;
            let payload: Vec<u8> = row.get(2)?;
            let mut record = decode_record_payload::<U>(&payload).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    payload.len(),
                    rusqlite::types::Type::Blob,
                    Box::new(std::io::Error::other(err)),
                )
            })?;
            record.seq = seq as JournalSeq;
            record.ts_ms = ts_ms as u64;
            Ok(record)
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Writes a snapshot covering `snapshot.last_seq`.
    pub fn write_snapshot(&mut self, snapshot: &TrackedSnapshot<U>) -> PersistResult<()> {
        let env = SnapshotEnvelope {
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot: snapshot.clone(),
        };
        let payload = serde_json::to_vec(&env)?;
        let ts_ms = now_ms();
        self.conn.execute(
            "INSERT INTO snapshots(last_seq, ts_ms, payload) VALUES (?1, ?2, ?3)",
            params![snapshot.last_seq as i64, ts_ms as i64, payload],
        )?;
        debug!(last_seq = snapshot.last_seq, "snapshot written");
        Ok(())
    }

    /// Loads the newest snapshot, if any.
    pub fn load_latest_snapshot(&self) -> PersistResult<Option<TrackedSnapshot<U>>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM snapshots ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        let env: SnapshotEnvelope<U> = serde_json::from_slice(&payload)?;
        if env.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistError::Message(
                "unsupported snapshot format".to_string(),
            ));
        }
        Ok(Some(env.snapshot))
    }
}

impl<U: Serialize + DeserializeOwned + Clone> JournalSink<U> for SqliteJournal<U> {
    fn append_records(&mut self, records: &[JournalRecord<U>]) -> PersistResult<JournalSeq> {
        if records.is_empty() {
            return self.latest_seq();
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO journal(seq, ts_ms, kind, action, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                let payload = serde_json::to_vec(&JournalEnvelope::new(record.clone()))?;
                stmt.execute(params![
                    record.seq as i64,
                    record.ts_ms as i64,
                    record.entry.kind_code(),
                    record.entry.action().map(|v| v as i64),
                    payload,
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.last().map(|r| r.seq).unwrap_or(0))
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &TrackedSnapshot<U>) -> PersistResult<()> {
        SqliteJournal::write_snapshot(self, snapshot)
    }

    fn compact_through(&mut self, seq: JournalSeq) -> PersistResult<usize> {
        SqliteJournal::compact_through(self, seq)
    }
}


fn decode_record_payload<U: DeserializeOwned>(payload: &[u8]) -> Result<JournalRecord<U>, String> {
    let envelope = serde_json::from_slice::<JournalEnvelope<U>>(payload)
        .map_err(|e| format!("journal payload decode failed: {e}"))?;
    if envelope.format_version != JOURNAL_FORMAT_VERSION {
        return Err(format!(
            "unsupported journal format version: {}",
            envelope.format_version
        ));
    }
    Ok(envelope.record)
}
