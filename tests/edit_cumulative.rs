use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use tracked::core::tracker::{InitMode, TrackError, Tracked};

tracked::reflect! {
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Bar {
        pub integer: i32,
        pub decimal: f64,
        pub ints: Vec<i32>,
    }
}

tracked::reflect! {
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Trig {
        pub angle: i32,
        pub points: [i32; 3],
    }
}

tracked::reflect! {
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Foo {
        pub a: i32,
        pub b: String,
        pub c: Vec<i32>,
        pub bar: Bar,
        pub bar_vec: Vec<Bar>,
        pub int_ray: [i32; 5],
        pub md_int_ray: [[i32; 3]; 2],
        pub trigs: Vec<Trig>,
    }
}

fn expected() -> Value {
    json!({
        "a": 12,
        "b": "qwerty",
        "c": [5, 6, 7],
        "bar": {"integer": 1, "decimal": 2.2, "ints": []},
        "bar_vec": [
            {"integer": 0, "decimal": 0.0, "ints": [1, 2]},
            {"integer": 0, "decimal": 0.0, "ints": [3]}
        ],
        "int_ray": [0, 6, 6, 0, 6],
        "md_int_ray": [[0, 0, 0], [0, 0, 23]],
        "trigs": [
            {"angle": 45, "points": [0, 0, 0]},
            {"angle": 0, "points": [9, 0, 9]}
        ]
    })
}

fn snapshot(tracked: &Tracked<Foo>) -> Value {
    serde_json::to_value(tracked.read()).expect("serialize")
}

/// Records the edits that build [`expected`], one action per group.
fn build(tracked: &mut Tracked<Foo>) -> Result<(), TrackError> {
    {
        let mut edit = tracked.create_action();
        edit.field("a")?.set(12)?;
        edit.field("b")?.set("qwerty")?;
        edit.field("c")?.append([5, 6, 7])?;
        edit.at("bar.decimal")?.set(2.2)?;
        edit.at("bar.integer")?.set(1)?;
    }
    tracked.create_action().field("bar_vec")?.push(Bar::default())?;
    tracked.create_action().field("bar_vec")?.push(Bar::default())?;
    {
        let mut edit = tracked.create_action();
        edit.at("bar_vec[0].ints")?.append([1, 2])?;
        edit.at("bar_vec[1].ints")?.push(3)?;
    }
    {
        let mut edit = tracked.create_action();
        let mut ray = edit.field("int_ray")?;
        ray.index(2)?.set(5)?;
        ray.select_n(&[1, 2, 4])?;
        ray.set_selected(6)?;
    }
    tracked
        .create_action()
        .at("md_int_ray[1][2]")?
        .set(23)?;
    {
        let mut edit = tracked.create_action();
        let mut trigs = edit.field("trigs")?;
        trigs.append([Trig::default(), Trig::default()])?;
        trigs.select(0)?;
        trigs.set_selected_at("angle", 45)?;
        let mut points = edit.at("trigs[1].points")?;
        points.select_n(&[0, 2])?;
        points.set_selected(9)?;
    }
    Ok(())
}

#[test]
fn cumulative_edits_produce_expected_state() {
    let mut tracked = Tracked::<Foo>::new(Foo::default());
    build(&mut tracked).expect("build");
    assert_eq!(snapshot(&tracked), expected());
    assert_eq!(tracked.total_actions(), 7);
    assert_eq!(tracked.selection("int_ray").expect("sel"), &[1, 2, 4]);
    assert_eq!(tracked.selection("trigs").expect("sel"), &[0]);
    assert_eq!(tracked.selection("trigs[1].points").expect("sel"), &[0, 2]);
}

#[test]
fn undo_all_then_redo_all_round_trips() {
    let mut tracked = Tracked::<Foo>::new(Foo::default());
    let initial = snapshot(&tracked);
    build(&mut tracked).expect("build");

    let mut undone = 0;
    while tracked.undo_action().expect("undo").is_some() {
        undone += 1;
    }
    assert_eq!(undone, 7);
    assert_eq!(snapshot(&tracked), initial);
    assert_eq!(tracked.selections().count(), 0);

    while tracked.redo_action().expect("redo").is_some() {}
    assert_eq!(snapshot(&tracked), expected());
    assert_eq!(tracked.selection("trigs[1].points").expect("sel"), &[0, 2]);
}

#[test]
fn each_undo_reverses_exactly_one_action() {
    let mut tracked = Tracked::<Foo>::new(Foo::default());
    build(&mut tracked).expect("build");

    tracked.undo_action().expect("undo");
    assert!(tracked.read().trigs.is_empty());
    assert!(tracked.selection("trigs").expect("sel").is_empty());
    assert_eq!(tracked.read().md_int_ray[1][2], 23);

    tracked.undo_action().expect("undo");
    assert_eq!(tracked.read().md_int_ray, [[0; 3]; 2]);
    assert_eq!(tracked.read().int_ray, [0, 6, 6, 0, 6]);

    tracked.undo_action().expect("undo");
    assert_eq!(tracked.read().int_ray, [0; 5]);
    assert!(tracked.selection("int_ray").expect("sel").is_empty());
    assert_eq!(tracked.read().bar_vec[1].ints, vec![3]);

    tracked.undo_action().expect("undo");
    assert_eq!(tracked.read().bar_vec, vec![Bar::default(), Bar::default()]);

    tracked.undo_action().expect("undo");
    assert_eq!(tracked.read().bar_vec.len(), 1);

    tracked.undo_action().expect("undo");
    assert!(tracked.read().bar_vec.is_empty());
    assert_eq!(tracked.read().bar.decimal, 2.2);
    assert_eq!(tracked.read().c, vec![5, 6, 7]);
}

#[test]
fn selection_assignment_reaches_each_selected_slot() {
    let mut tracked = Tracked::<Foo>::new(Foo::default());
    {
        let mut edit = tracked.create_action();
        let mut c = edit.field("c").expect("c");
        c.append([1, 2, 3, 4]).expect("append");
        c.select_n(&[3, 0]).expect("select");
    }
    let before = tracked.read().clone();

    // Nothing selected: nothing recorded.
    tracked
        .create_action()
        .field("int_ray")
        .expect("ray")
        .set_selected(1)
        .expect("empty selection");
    assert_eq!(tracked.total_actions(), 1);

    tracked
        .create_action()
        .field("c")
        .expect("c")
        .set_selected(0)
        .expect("assign");
    assert_eq!(tracked.read().c, vec![0, 2, 3, 0]);
    assert_eq!(tracked.selection("c").expect("sel"), &[3, 0]);
    let rendered = tracked.render_action(1).expect("render");
    assert_eq!(rendered.events.len(), 2);

    tracked.undo_action().expect("undo");
    assert_eq!(tracked.read(), &before);

    let mut edit = tracked.create_action();
    let mut bars = edit.field("bar_vec").expect("bar_vec");
    assert!(matches!(bars.set_selected_at("nope", 1), Err(TrackError::Reflect(_))));
    assert!(matches!(
        edit.field("a").expect("a").set_selected(1),
        Err(TrackError::NotIndexed(_))
    ));
}

#[test]
fn sequence_resizing_and_capacity_edits_reverse() {
    let mut tracked = Tracked::<Foo>::new(Foo::default());
    {
        let mut edit = tracked.create_action();
        let mut ints = edit.at("bar.ints").expect("ints");
        ints.push(9).expect("push");
        ints.reserve(16).expect("reserve");
        ints.resize(3).expect("grow");
        ints.insert_n(1, 2, 4).expect("insert");
        ints.remove_n(0, 2).expect("remove");
        ints.shrink_to_fit().expect("shrink");
    }
    assert_eq!(tracked.read().bar.ints, vec![4, 0, 0]);

    tracked
        .create_action()
        .at("bar.ints")
        .expect("ints")
        .resize(1)
        .expect("shrink");
    assert_eq!(tracked.read().bar.ints, vec![4]);

    tracked.undo_action().expect("undo");
    assert_eq!(tracked.read().bar.ints, vec![4, 0, 0]);
    tracked.undo_action().expect("undo");
    assert!(tracked.read().bar.ints.is_empty());
}

#[test]
fn failed_step_keeps_earlier_events_of_the_action() {
    let mut tracked = Tracked::<Foo>::new(Foo::default());
    let result = (|| -> Result<(), TrackError> {
        let mut edit = tracked.create_action();
        edit.field("a")?.set(5)?;
        edit.field("c")?.remove(3)?;
        Ok(())
    })();
    assert!(matches!(result, Err(TrackError::IndexOutOfRange { .. })));
    assert_eq!(tracked.read().a, 5);
    assert_eq!(tracked.total_actions(), 1);

    tracked.undo_action().expect("undo");
    assert_eq!(tracked.read().a, 0);
}

#[test]
fn bad_paths_are_reported() {
    let mut tracked = Tracked::<Foo>::new(Foo::default());
    let mut edit = tracked.create_action();
    assert!(matches!(edit.field("nope"), Err(TrackError::UnknownPath(_))));
    assert!(edit.at("bar_vec[0].ints").is_err());
    assert!(matches!(
        edit.field("a").expect("a").push(1),
        Err(TrackError::NotSequence(_))
    ));
    assert!(matches!(
        edit.field("int_ray").expect("ray").push(1),
        Err(TrackError::NotSequence(_))
    ));
    assert!(matches!(
        edit.field("b").expect("b").field("x"),
        Err(TrackError::NotAggregate(_))
    ));
}

#[test]
fn record_init_is_undoable_and_init_data_guards_history() {
    let seeded = Foo {
        a: 3,
        c: vec![1],
        ..Foo::default()
    };

    let mut tracked = Tracked::<Foo>::new(seeded.clone());
    assert_eq!(tracked.record_init().expect("init"), Some(0));
    assert_eq!(tracked.render_action(0).expect("render").events[0].label, "reinit");
    assert!(matches!(tracked.record_init(), Err(TrackError::HistoryExists)));
    assert!(matches!(
        tracked.init_data(Foo::default(), InitMode::Baseline),
        Err(TrackError::HistoryExists)
    ));

    tracked.undo_action().expect("undo");
    assert_eq!(tracked.read(), &Foo::default());
    tracked.redo_action().expect("redo");
    assert_eq!(tracked.read(), &seeded);

    tracked.clear_history();
    assert_eq!(tracked.total_actions(), 0);
    assert_eq!(tracked.event_count(), 0);
    assert_eq!(tracked.read(), &seeded);

    tracked
        .init_data(Foo::default(), InitMode::Baseline)
        .expect("baseline");
    assert_eq!(tracked.total_actions(), 0);
    assert_eq!(tracked.read(), &Foo::default());

    assert_eq!(tracked.init_data(seeded.clone(), InitMode::Record).expect("record"), Some(0));
    tracked.undo_action().expect("undo");
    assert_eq!(tracked.read(), &Foo::default());
}

#[test]
fn move_family_rearranges_and_reverses() {
    let mut tracked = Tracked::<Foo>::new(Foo::default());
    tracked
        .create_action()
        .field("c")
        .expect("c")
        .append([0, 1, 2, 3, 4, 5])
        .expect("append");

    let steps: [(&str, Vec<i32>); 5] = [
        ("up", vec![0, 2, 1, 3, 4, 5]),
        ("down", vec![0, 2, 3, 1, 4, 5]),
        ("top", vec![4, 0, 2, 3, 1, 5]),
        ("bottom", vec![4, 2, 3, 1, 5, 0]),
        ("to", vec![4, 3, 2, 1, 5, 0]),
    ];
    let mut history = vec![tracked.read().c.clone()];
    for (op, want) in steps {
        {
            let mut edit = tracked.create_action();
            let mut c = edit.field("c").expect("c");
            let moved = match op {
                "up" => c.move_up(2),
                "down" => c.move_down(2),
                "top" => c.move_top(4),
                "bottom" => c.move_bottom(1),
                _ => c.move_to_n(&[1, 3], 2),
            };
            moved.expect("move");
        }
        assert_eq!(tracked.read().c, want, "after {op}");
        history.push(want);
    }

    history.pop();
    while let Some(previous) = history.pop() {
        tracked.undo_action().expect("undo");
        assert_eq!(tracked.read().c, previous);
    }
}
