//! Lifecycle event stream: content, ordering, trimming.

use super::*;

#[test]
fn test_round_trip_event_order() {
    let engine = setup();

    let id = engine.add("test", &job(json!({})), 0).unwrap();
    let _ = pull(&engine, "test", 10);
    complete(&engine, "test", &id, 20);

    assert_eq!(event_log(&engine, "test"), vec!["added", "waiting", "active", "completed"]);
}

#[test]
fn test_event_entries_carry_job_fields() {
    let engine = setup();

    let id = engine.add("test", &job(json!({})), 0).unwrap();
    let _ = pull(&engine, "test", 10);
    complete(&engine, "test", &id, 20);

    let events = engine.events("test");
    let added = &events[0];
    assert_eq!(added.field("jobId"), Some(id.as_str()));
    assert_eq!(added.field("name"), Some("default"));

    let active = events.iter().find(|e| e.field("event") == Some("active")).unwrap();
    assert_eq!(active.field("prev"), Some("waiting"));

    let completed = events.last().unwrap();
    assert_eq!(completed.field("returnvalue"), Some("\"ok\""));
}

#[test]
fn test_delayed_event_carries_fire_time() {
    let engine = setup();

    engine
        .add(
            "test",
            &job_with(
                json!({}),
                JobOptions {
                    delay: 500,
                    ..Default::default()
                },
            ),
            1_000,
        )
        .unwrap();

    let events = engine.events("test");
    let delayed = events.iter().find(|e| e.field("event") == Some("delayed")).unwrap();
    assert_eq!(delayed.field("delay"), Some("1500"));
}

#[test]
fn test_stream_is_capped_by_meta_option() {
    let engine = setup();
    let keys = engine.keys("test");

    engine.set_max_events("test", 5);
    for i in 0..10 {
        engine.add("test", &job(json!({"i": i})), i).unwrap();
    }

    engine.store().run(|kv| assert_eq!(kv.xlen(&keys.events), 5));
    // Oldest entries were dropped; the newest survive.
    let events = engine.events("test");
    assert_eq!(events.last().unwrap().field("jobId"), Some("10"));
}

#[test]
fn test_stream_ids_are_strictly_increasing() {
    let engine = setup();

    // Same clock value for every transition.
    for _ in 0..3 {
        engine.add("test", &job(json!({})), 42).unwrap();
    }

    let events = engine.events("test");
    for pair in events.windows(2) {
        assert!(pair[0].id < pair[1].id);
    }
}
