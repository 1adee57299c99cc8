use serde::{Deserialize, Serialize};

use tracked::{
    config::TrackerConfig,
    core::{
        history::FLAG_ELIDED_REDOS,
        tracker::{InitMode, Tracked},
    },
};

tracked::reflect! {
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Doc {
        pub items: Vec<i32>,
        pub label: String,
    }
}

const F: u64 = FLAG_ELIDED_REDOS;

/// `a` pushes one item, `b` pushes three and relabels, `u` undoes, `r` redoes.
fn run_with(script: &str, config: TrackerConfig) -> Tracked<Doc> {
    let mut tracked = Tracked::<Doc>::with_config(Doc::default(), config);
    drive(&mut tracked, script, 0);
    tracked
}

/// Continues `script` on `tracked`; `next` is the step count already played.
fn drive(tracked: &mut Tracked<Doc>, script: &str, mut next: i32) {
    for step in script.chars() {
        next += 1;
        match step {
            'a' => tracked
                .create_action()
                .field("items")
                .expect("items")
                .push(next)
                .expect("push"),
            'b' => {
                let mut edit = tracked.create_action();
                edit.field("items")
                    .expect("items")
                    .append([next, next + 1, next + 2])
                    .expect("append");
                edit.field("label")
                    .expect("label")
                    .set(format!("step {next}"))
                    .expect("set");
            }
            'u' => {
                tracked.undo_action().expect("undo");
            }
            'r' => {
                tracked.redo_action().expect("redo");
            }
            other => panic!("unknown step {other}"),
        }
    }
}

fn run(script: &str) -> Tracked<Doc> {
    run_with(script, TrackerConfig::default())
}

/// Data after each successive undo, until nothing is left to undo.
fn undo_trail(mut tracked: Tracked<Doc>) -> Vec<Doc> {
    let mut trail = vec![tracked.read().clone()];
    while tracked.undo_action().expect("undo").is_some() {
        trail.push(tracked.read().clone());
    }
    trail
}

#[test]
fn trim_snaps_down_to_marker_boundaries() {
    let tracked = run("aauaua");
    assert_eq!(tracked.encoded_actions(), vec![0, 1, F | 1, 2, F | 1, 3]);

    for (requested, used) in [(0, 0), (1, 1), (2, 1), (3, 3), (4, 3), (5, 5), (6, 6), (9, 6)] {
        let mut trimmed = tracked.clone();
        assert_eq!(trimmed.trim_history(requested), used, "requested {requested}");
        assert_eq!(trimmed.total_actions(), 6 - used);
    }
}

#[test]
fn trimmed_history_rebases_and_keeps_undo_working() {
    let mut tracked = run("aauaua");
    let before = tracked.read().clone();
    assert_eq!(tracked.trim_history(3), 3);
    assert_eq!(tracked.encoded_actions(), vec![0, F | 1, 1]);
    assert_eq!(tracked.event_count(), 2);
    assert_eq!(tracked.read(), &before);

    assert_eq!(tracked.undo_action().expect("undo"), Some(2));
    assert_eq!(tracked.read().items, vec![1]);
    assert_eq!(tracked.undo_action().expect("undo"), None);
    assert_eq!(tracked.redo_action().expect("redo"), Some(2));
    assert_eq!(tracked.read(), &before);
}

#[test]
fn trim_never_passes_the_cursor() {
    let mut tracked = run("aau");
    assert_eq!(tracked.trim_history(5), 1);
    assert_eq!(tracked.total_actions(), 1);
    assert_eq!(tracked.redo_size(), 1);
    assert_eq!(tracked.redo_action().expect("redo"), Some(0));
    assert_eq!(tracked.read().items, vec![1, 2]);
}

#[test]
fn trimming_preserves_the_undo_trail_it_keeps() {
    for script in ["abab", "abuba", "aabuuab", "abauurba", "bbbuuaua"] {
        let tracked = run(script);
        let full = undo_trail(tracked.clone());
        for keep_from in 0..=tracked.total_actions() {
            let mut trimmed = tracked.clone();
            trimmed.trim_history(keep_from);
            let trail = undo_trail(trimmed);
            assert!(trail.len() <= full.len(), "{script} trimmed at {keep_from}");
            assert_eq!(trail, full[..trail.len()], "{script} trimmed at {keep_from}");
        }
    }
}

#[test]
fn size_trim_picks_the_smallest_sufficient_trim_point() {
    for script in ["abab", "ababua", "aabuuab", "abauurba", "bbbuuaua", "ababuu"] {
        let tracked = run(script);
        let total = tracked.history_bytes();
        for budget in 0..=total + 1 {
            let mut trimmed = tracked.clone();
            let used = trimmed.trim_history_to_size(budget);
            assert!(trimmed.history_bytes() <= budget, "{script} budget {budget}");
            assert_eq!(trimmed.read(), tracked.read());

            if trimmed.total_actions() == 0 && tracked.total_actions() > 0 && used == tracked.cursor_index() {
                let mut to_cursor = tracked.clone();
                to_cursor.trim_history(tracked.cursor_index());
                if to_cursor.history_bytes() > budget {
                    assert!(!trimmed.can_redo());
                    continue;
                }
            }

            for smaller in 0..used {
                let mut candidate = tracked.clone();
                candidate.trim_history(smaller);
                assert!(
                    candidate.history_bytes() > budget,
                    "{script} budget {budget}: {smaller} would have fit before {used}"
                );
            }
        }
    }
}

#[test]
fn size_trim_drops_redos_when_nothing_else_fits() {
    let mut tracked = run("abbu");
    assert!(tracked.can_redo());
    let used = tracked.trim_history_to_size(0);
    assert_eq!(used, 2);
    assert_eq!(tracked.total_actions(), 0);
    assert_eq!(tracked.event_count(), 0);
    assert!(!tracked.can_undo());
    assert!(!tracked.can_redo());
    assert_eq!(tracked.read().items, vec![1, 2, 3, 4]);
}

#[test]
fn action_count_limit_trims_on_commit() {
    let config = TrackerConfig {
        max_actions: Some(3),
        ..TrackerConfig::default()
    };
    let tracked = run_with("aaaaa", config);
    assert_eq!(tracked.total_actions(), 3);
    assert_eq!(undo_trail(tracked).len(), 4);
}

#[test]
fn byte_limit_trims_on_commit() {
    let unlimited = run("bbbb");
    let budget = unlimited.history_bytes() / 2;
    let config = TrackerConfig {
        max_history_bytes: Some(budget),
        ..TrackerConfig::default()
    };
    let limited = run_with("bbbb", config);
    assert!(limited.history_bytes() <= budget);
    assert!(limited.total_actions() < 4);
    assert_eq!(limited.read(), unlimited.read());
}

#[test]
fn action_bytes_sum_to_history_bytes() {
    let tracked = run("abuab");
    let sum: usize = (0..tracked.total_actions())
        .map(|index| tracked.action_bytes(index))
        .sum();
    assert_eq!(sum, tracked.history_bytes());

    let rendered = tracked.render_change_history().expect("render");
    let rendered_sum: usize = rendered.iter().map(|action| action.byte_count).sum();
    assert_eq!(rendered_sum, sum);
    assert!(rendered.iter().all(|action| !action.undone));
}

#[test]
fn trimmed_editor_behaves_like_a_fresh_baseline() {
    for (prefix, suffix) in [("ab", "ab"), ("abba", "b"), ("aab", "ba")] {
        let script = format!("{prefix}{suffix}");
        let keep_from = prefix.len();
        let played = i32::try_from(script.len()).expect("len");

        let mut trimmed = run(&script);
        assert_eq!(trimmed.trim_history(keep_from), keep_from, "{script}");

        let mut fresh = Tracked::<Doc>::new(Doc::default());
        fresh
            .init_data(run(prefix).read().clone(), InitMode::Baseline)
            .expect("baseline");
        drive(&mut fresh, suffix, i32::try_from(prefix.len()).expect("len"));
        assert_eq!(fresh.read(), trimmed.read(), "{script}");

        for continuation in ["uu", "uuua", "ubr", "uurra", "abuuu"] {
            let mut left = trimmed.clone();
            let mut right = fresh.clone();
            drive(&mut left, continuation, played);
            drive(&mut right, continuation, played);
            assert_eq!(left.read(), right.read(), "{script} then {continuation}");
            assert_eq!(undo_trail(left), undo_trail(right), "{script} then {continuation}");
        }
    }
}
