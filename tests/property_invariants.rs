use proptest::prelude::*;
use serde::{Deserialize, Serialize};

use tracked::{
    config::TrackerConfig,
    core::tracker::{TrackError, Tracked},
};

tracked::reflect! {
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Doc {
        pub items: Vec<i32>,
        pub tags: Vec<String>,
    }
}

#[derive(Debug, Clone)]
enum Step {
    Push(i32),
    Insert { at: u8, value: i32 },
    Remove { at: u8 },
    Sort { descending: bool },
    Select { at: u8 },
    MoveUp { at: u8 },
    Tag(u8),
    Undo,
    Redo,
    Trim { keep_from: u8 },
    TrimToSize { percent: u8 },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (-50i32..50).prop_map(Step::Push),
        2 => (0u8..16, -50i32..50).prop_map(|(at, value)| Step::Insert { at, value }),
        2 => (0u8..16).prop_map(|at| Step::Remove { at }),
        1 => any::<bool>().prop_map(|descending| Step::Sort { descending }),
        2 => (0u8..16).prop_map(|at| Step::Select { at }),
        1 => (0u8..16).prop_map(|at| Step::MoveUp { at }),
        1 => (0u8..4).prop_map(Step::Tag),
        3 => Just(Step::Undo),
        2 => Just(Step::Redo),
        1 => (0u8..12).prop_map(|keep_from| Step::Trim { keep_from }),
        1 => (0u8..=100).prop_map(|percent| Step::TrimToSize { percent }),
    ]
}

fn apply(tracked: &mut Tracked<Doc>, step: &Step) -> Result<(), TrackError> {
    let len = tracked.read().items.len();
    let mut edit = tracked.create_action();
    let mut items = edit.field("items")?;
    match *step {
        Step::Push(value) => items.push(value)?,
        Step::Insert { at, value } => items.insert(usize::from(at) % (len + 1), value)?,
        Step::Remove { at } if len > 0 => items.remove(usize::from(at) % len)?,
        Step::Sort { descending } => {
            if descending {
                items.sort_desc()?
            } else {
                items.sort()?
            }
        }
        Step::Select { at } if len > 0 => items.toggle_selected(usize::from(at) % len)?,
        Step::MoveUp { at } if len > 0 => items.move_up(usize::from(at) % len)?,
        Step::Tag(n) => {
            drop(items);
            edit.field("tags")?.push(format!("tag{n}"))?;
        }
        Step::Undo => {
            drop(items);
            drop(edit);
            tracked.undo_action()?;
        }
        Step::Redo => {
            drop(items);
            drop(edit);
            tracked.redo_action()?;
        }
        Step::Trim { keep_from } => {
            drop(items);
            drop(edit);
            tracked.trim_history(usize::from(keep_from));
        }
        Step::TrimToSize { percent } => {
            drop(items);
            drop(edit);
            let budget = tracked.history_bytes() * usize::from(percent) / 100;
            tracked.trim_history_to_size(budget);
        }
        _ => {}
    }
    Ok(())
}

fn assert_bookkeeping(tracked: &Tracked<Doc>) {
    assert_eq!(tracked.cursor_index() + tracked.redo_size(), tracked.total_actions());
    assert!(tracked.redo_count() <= tracked.redo_size());
    assert_eq!(tracked.can_redo(), tracked.redo_count() > 0);
    for (_, selection) in tracked.selections() {
        let len = tracked.read().items.len();
        assert!(selection.iter().all(|&index| index < len));
    }
}

proptest! {
    #[test]
    fn undo_all_then_redo_all_returns_to_current_state(
        steps in prop::collection::vec(step_strategy(), 1..60)
    ) {
        let mut tracked = Tracked::<Doc>::new(Doc::default());
        for step in &steps {
            apply(&mut tracked, step).expect("step");
            assert_bookkeeping(&tracked);
        }

        let current = tracked.read().clone();
        let selection = tracked.selection("items").expect("sel").to_vec();
        let mut forward = tracked.clone();
        while forward.redo_action().expect("redo").is_some() {}
        let tip = forward.read().clone();

        let mut undone = 0;
        while tracked.undo_action().expect("undo").is_some() {
            undone += 1;
            assert_bookkeeping(&tracked);
        }
        for _ in 0..undone {
            prop_assert!(tracked.redo_action().expect("redo").is_some());
        }
        prop_assert_eq!(tracked.read(), &current);
        prop_assert_eq!(tracked.selection("items").expect("sel"), selection.as_slice());

        while tracked.redo_action().expect("redo").is_some() {}
        prop_assert_eq!(tracked.read(), &tip);
    }

    #[test]
    fn single_undo_redo_is_identity(
        steps in prop::collection::vec(step_strategy(), 1..40)
    ) {
        let mut tracked = Tracked::<Doc>::new(Doc::default());
        for step in &steps {
            apply(&mut tracked, step).expect("step");
            let before = tracked.clone();
            if tracked.undo_action().expect("undo").is_some() {
                tracked.redo_action().expect("redo");
                prop_assert_eq!(tracked.read(), before.read());
                prop_assert_eq!(tracked.encoded_actions(), before.encoded_actions());
                prop_assert_eq!(tracked.redo_count(), before.redo_count());
            }
        }
    }

    #[test]
    fn snapshot_restores_state_and_history(
        steps in prop::collection::vec(step_strategy(), 1..40)
    ) {
        let mut tracked = Tracked::<Doc>::new(Doc::default());
        for step in &steps {
            apply(&mut tracked, step).expect("step");
        }

        let snapshot = tracked.export_snapshot().expect("snapshot");
        let mut restored = Tracked::<Doc>::from_snapshot(snapshot, TrackerConfig::default())
            .expect("restore");
        prop_assert_eq!(restored.read(), tracked.read());
        prop_assert_eq!(restored.encoded_actions(), tracked.encoded_actions());
        prop_assert_eq!(restored.redo_count(), tracked.redo_count());
        prop_assert_eq!(restored.history_bytes(), tracked.history_bytes());

        loop {
            let a = tracked.undo_action().expect("undo");
            let b = restored.undo_action().expect("undo");
            prop_assert_eq!(a, b);
            prop_assert_eq!(restored.read(), tracked.read());
            if a.is_none() {
                break;
            }
        }
    }

    #[test]
    fn journal_replay_reproduces_the_editor(
        steps in prop::collection::vec(step_strategy(), 1..50),
        max_actions in prop::option::of(2usize..8)
    ) {
        let config = TrackerConfig {
            max_actions,
            ..TrackerConfig::journaled()
        };
        let mut tracked = Tracked::<Doc>::with_config(Doc::default(), config.clone());
        let mut replica = Tracked::<Doc>::with_config(Doc::default(), config);

        for step in &steps {
            apply(&mut tracked, step).expect("step");
            for record in tracked.drain_journal() {
                replica.apply_journal(record).expect("replay");
            }
            prop_assert!(replica.drain_journal().is_empty());
            prop_assert_eq!(replica.read(), tracked.read());
            prop_assert_eq!(replica.encoded_actions(), tracked.encoded_actions());
            prop_assert_eq!(replica.redo_count(), tracked.redo_count());
            prop_assert_eq!(replica.redo_size(), tracked.redo_size());
            prop_assert_eq!(
                replica.selections().collect::<Vec<_>>(),
                tracked.selections().collect::<Vec<_>>()
            );
        }
        prop_assert_eq!(replica.latest_journal_seq(), tracked.latest_journal_seq());
    }
}
