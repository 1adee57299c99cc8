use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use tracked::{
    config::TrackerConfig,
    core::tracker::Tracked,
    op::{Event, JournalEntry, JournalRecord},
    persist::{JournalSink, sqlite::SqliteJournal},
    types::{Path, PathStep},
};

tracked::reflect! {
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Doc {
        pub title: String,
        pub items: Vec<i32>,
        pub weights: Vec<f64>,
    }
}

fn edit_session(tracked: &mut Tracked<Doc, String>) {
    for i in 0..5i32 {
        let mut edit = tracked.create_action_with(format!("step {i}"));
        edit.field("items").expect("items").push(i).expect("push");
        edit.field("weights")
            .expect("weights")
            .push(f64::from(i) * 0.1)
            .expect("push");
    }
    tracked
        .create_action()
        .field("items")
        .expect("items")
        .select_n(&[1, 3])
        .expect("select");
    tracked.undo_action().expect("undo");
    tracked.undo_action().expect("undo");
    tracked
        .create_action()
        .field("title")
        .expect("title")
        .set("branched")
        .expect("set");
    tracked.trim_history(1);
    tracked.undo_action().expect("undo");
}

fn assert_same_editor(left: &Tracked<Doc, String>, right: &Tracked<Doc, String>) {
    assert_eq!(left.read(), right.read());
    assert_eq!(left.encoded_actions(), right.encoded_actions());
    assert_eq!(left.redo_count(), right.redo_count());
    assert_eq!(left.redo_size(), right.redo_size());
    assert_eq!(left.history_bytes(), right.history_bytes());
    assert_eq!(
        left.selections().collect::<Vec<_>>(),
        right.selections().collect::<Vec<_>>()
    );
    for index in 0..left.total_actions() {
        assert_eq!(left.user_data(index), right.user_data(index));
    }
}

#[test]
fn journal_round_trips_through_sqlite() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("journal.db");

    let mut tracked = Tracked::<Doc, String>::with_config(Doc::default(), TrackerConfig::journaled());
    let mut sink = SqliteJournal::<String>::open(&db_path).expect("open sqlite");

    edit_session(&mut tracked);
    let records = tracked.drain_journal();
    assert!(records
        .iter()
        .any(|r| matches!(r.entry, JournalEntry::Trimmed { trim_point: 1, dropped_redos: false })));
    let last = sink.append_records(&records).expect("append");
    assert_eq!(last, tracked.latest_journal_seq());
    sink.flush().expect("flush");
    drop(sink);

    let sink = SqliteJournal::<String>::open(&db_path).expect("reopen");
    assert_eq!(sink.record_count().expect("count"), records.len());
    assert_eq!(sink.latest_seq().expect("latest"), last);

    let mut replayed: Tracked<Doc, String> = sink
        .load_tracked(TrackerConfig::journaled())
        .expect("replay");
    assert_same_editor(&tracked, &replayed);
    assert_eq!(replayed.latest_journal_seq(), last);

    // Both editors keep going in lockstep.
    assert_eq!(tracked.redo_action().expect("redo"), replayed.redo_action().expect("redo"));
    assert_same_editor(&tracked, &replayed);
}

#[test]
fn snapshot_and_compaction_preserve_replay() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("snap.db");

    let mut tracked = Tracked::<Doc, String>::with_config(Doc::default(), TrackerConfig::journaled());
    let mut sink = SqliteJournal::<String>::open(&db_path).expect("open sqlite");

    edit_session(&mut tracked);
    sink.append_records(&tracked.drain_journal()).expect("append");

    let snapshot = tracked.export_snapshot().expect("snapshot");
    let last_seq = snapshot.last_seq;
    sink.write_snapshot(&snapshot).expect("snapshot");
    let removed = sink.compact_through(last_seq).expect("compact");
    assert!(removed > 0);
    assert_eq!(sink.record_count().expect("count"), 0);

    tracked
        .create_action_with("after snapshot".to_string())
        .field("items")
        .expect("items")
        .remove(0)
        .expect("remove");
    tracked.undo_action().expect("undo");
    tracked.redo_action().expect("redo");
    sink.append_records(&tracked.drain_journal()).expect("append");
    assert_eq!(sink.record_count().expect("count"), 3);
    drop(sink);

    let sink = SqliteJournal::<String>::open(&db_path).expect("reopen");
    let restored = sink
        .load_latest_snapshot()
        .expect("load snapshot")
        .expect("snapshot present");
    assert_eq!(restored.last_seq, last_seq);

    let mut replayed: Tracked<Doc, String> = sink
        .load_tracked(TrackerConfig::journaled())
        .expect("replay");
    assert_same_editor(&tracked, &replayed);

    while tracked.undo_action().expect("undo").is_some() {
        assert!(replayed.undo_action().expect("undo").is_some());
        assert_eq!(tracked.read(), replayed.read());
    }
    assert!(!replayed.can_undo());
}

#[test]
fn empty_journal_loads_default_editor() {
    let sink = SqliteJournal::<String>::open_in_memory().expect("open");
    assert_eq!(sink.latest_seq().expect("latest"), 0);
    assert!(sink.load_latest_snapshot().expect("snapshot").is_none());
    let tracked: Tracked<Doc, String> = sink.load_tracked(TrackerConfig::default()).expect("load");
    assert_eq!(tracked.read(), &Doc::default());
    assert_eq!(tracked.total_actions(), 0);
}

#[test]
fn diverging_journal_is_rejected() {
    let mut source = Tracked::<Doc, String>::with_config(Doc::default(), TrackerConfig::journaled());
    source
        .create_action()
        .field("items")
        .expect("items")
        .push(1)
        .expect("push");
    source.undo_action().expect("undo");
    let records = source.drain_journal();

    let mut sink = SqliteJournal::<String>::open_in_memory().expect("open");
    // Only the undo record: the target editor has nothing to undo.
    sink.append_records(&records[1..]).expect("append");
    let loaded = sink.load_tracked::<Doc>(TrackerConfig::journaled());
    assert!(loaded.is_err());
}

#[test]
fn malformed_reorders_are_rejected_without_touching_data() {
    let mut tracked = Tracked::<Doc, String>::with_config(Doc::default(), TrackerConfig::journaled());
    tracked
        .create_action()
        .field("items")
        .expect("items")
        .append([1, 2])
        .expect("append");
    let items = Path::root().child(PathStep::Field(1));

    for order in [vec![5, 0], vec![0, 0], vec![1]] {
        let record = JournalRecord {
            seq: tracked.latest_journal_seq() + 1,
            ts_ms: 0,
            entry: JournalEntry::ActionCommitted {
                action: 1,
                user_data: None,
                events: vec![Event::Reorder {
                    path: items.clone(),
                    order: order.clone(),
                }],
            },
        };
        assert!(tracked.apply_journal(record).is_err(), "order {order:?} accepted");
        assert_eq!(tracked.read().items, vec![1, 2]);
        assert_eq!(tracked.total_actions(), 1);
    }

    tracked
        .create_action()
        .field("items")
        .expect("items")
        .swap(0, 1)
        .expect("swap");
    let mut snapshot = tracked.export_snapshot().expect("snapshot");
    for event in &mut snapshot.events {
        if let Event::Reorder { order, .. } = event {
            *order = vec![0, 0];
        }
    }
    let mut restored =
        Tracked::<Doc, String>::from_snapshot(snapshot, TrackerConfig::default()).expect("restore");
    assert_eq!(restored.read().items, vec![2, 1]);
    assert!(restored.undo_action().is_err());
    assert_eq!(restored.read().items, vec![2, 1]);
}
