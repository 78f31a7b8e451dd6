//! Priority index, markers, and reprioritization.

use super::*;

fn prioritized(priority: u64) -> JobOptions {
    JobOptions {
        priority,
        ..Default::default()
    }
}

#[test]
fn test_lower_priority_number_wins() {
    let engine = setup();

    let p2 = engine.add("test", &job_with(json!({}), prioritized(2)), 0).unwrap();
    let p1 = engine.add("test", &job_with(json!({}), prioritized(1)), 1).unwrap();
    let p3 = engine.add("test", &job_with(json!({}), prioritized(3)), 2).unwrap();

    assert_eq!(pull(&engine, "test", 10).id, p1);
    assert_eq!(pull(&engine, "test", 11).id, p2);
    assert_eq!(pull(&engine, "test", 12).id, p3);
}

#[test]
fn test_same_priority_is_fifo() {
    let engine = setup();

    let a = engine.add("test", &job_with(json!({}), prioritized(5)), 0).unwrap();
    let b = engine.add("test", &job_with(json!({}), prioritized(5)), 1).unwrap();
    let c = engine.add("test", &job_with(json!({}), prioritized(5)), 2).unwrap();

    assert_eq!(pull(&engine, "test", 10).id, a);
    assert_eq!(pull(&engine, "test", 11).id, b);
    assert_eq!(pull(&engine, "test", 12).id, c);
}

#[test]
fn test_wait_list_is_served_before_prioritized() {
    let engine = setup();

    // Priority 0 routes through the list and wins over the ordered set.
    let plain = engine.add("test", &job(json!({})), 0).unwrap();
    let urgent = engine.add("test", &job_with(json!({}), prioritized(1)), 1).unwrap();

    assert_eq!(pull(&engine, "test", 10).id, plain);
    assert_eq!(pull(&engine, "test", 11).id, urgent);
}

#[test]
fn test_priority_marker_wakes_empty_queue() {
    let engine = setup();
    let keys = engine.keys("test");

    engine.add("test", &job_with(json!({}), prioritized(1)), 0).unwrap();
    engine
        .store()
        .run(|kv| assert_eq!(kv.lhead(&keys.wait).as_deref(), Some("0:0")));

    // The marker is consumed by the dequeue, never served.
    let acquired = pull(&engine, "test", 10);
    assert_eq!(acquired.field("priority"), Some("1"));
    engine.store().run(|kv| {
        assert_eq!(kv.llen(&keys.wait), 0);
        assert_eq!(kv.llen(&keys.active), 1);
    });
}

#[test]
fn test_marker_rearms_while_prioritized_jobs_remain() {
    let engine = setup();
    let keys = engine.keys("test");

    // First add pushes the marker (wait was empty); the second sees a
    // nonempty wait list and skips it.
    let first = engine.add("test", &job_with(json!({}), prioritized(1)), 0).unwrap();
    let second = engine.add("test", &job_with(json!({}), prioritized(2)), 1).unwrap();

    // The pull consumes the marker; with a job still in the priority
    // index it must be re-armed or blocked workers starve.
    assert_eq!(pull(&engine, "test", 10).id, first);
    engine
        .store()
        .run(|kv| assert_eq!(kv.lhead(&keys.wait).as_deref(), Some("0:0")));

    assert_eq!(pull(&engine, "test", 20).id, second);
    engine.store().run(|kv| {
        assert_eq!(kv.llen(&keys.wait), 0);
        assert!(!kv.exists(&keys.pc));
    });
}

#[test]
fn test_no_marker_when_wait_has_jobs() {
    let engine = setup();
    let keys = engine.keys("test");

    let plain = engine.add("test", &job(json!({})), 0).unwrap();
    engine.add("test", &job_with(json!({}), prioritized(1)), 1).unwrap();

    engine
        .store()
        .run(|kv| assert_eq!(kv.lhead(&keys.wait).as_deref(), Some(plain.as_str())));
}

#[test]
fn test_priority_counter_resets_when_set_drains() {
    let engine = setup();
    let keys = engine.keys("test");

    let a = engine.add("test", &job_with(json!({}), prioritized(1)), 0).unwrap();
    let _ = pull(&engine, "test", 10);

    // Set drained: the pc counter is deleted and numbering restarts.
    engine.store().run(|kv| assert!(!kv.exists(&keys.pc)));

    let b = engine.add("test", &job_with(json!({}), prioritized(1)), 20).unwrap();
    assert_ne!(a, b);
    engine.store().run(|kv| {
        let score = kv.zscore(&keys.prioritized, &b).unwrap();
        assert_eq!(score, (1u64 << 32) | 1, "fresh counter starts at 1");
    });
}

#[test]
fn test_change_priority_rescopes_prioritized_job() {
    let engine = setup();
    let keys = engine.keys("test");

    let id = engine.add("test", &job_with(json!({}), prioritized(2)), 0).unwrap();
    engine.change_priority("test", &id, 5, false, 10).unwrap();

    engine.store().run(|kv| {
        let score = kv.zscore(&keys.prioritized, &id).unwrap();
        assert_eq!(score >> 32, 5);
    });
    assert_eq!(engine.get_job("test", &id).unwrap().priority, 5);
}

#[test]
fn test_change_priority_moves_between_lanes() {
    let engine = setup();

    // wait -> prioritized
    let a = engine.add("test", &job(json!({})), 0).unwrap();
    engine.change_priority("test", &a, 3, false, 10).unwrap();
    assert_eq!(engine.job_state("test", &a), Some(JobState::Prioritized));

    // prioritized -> wait
    engine.change_priority("test", &a, 0, false, 20).unwrap();
    assert_eq!(engine.job_state("test", &a), Some(JobState::Waiting));
    assert_eq!(engine.get_job("test", &a).unwrap().priority, 0);
}

#[test]
fn test_change_priority_missing_job() {
    let engine = setup();

    let err = engine.change_priority("test", "ghost", 1, false, 0).unwrap_err();
    assert_eq!(err, TransitionError::MissingJob);
    assert_eq!(err.code(), Some(-1));
}

#[test]
fn test_change_priority_on_delayed_job_only_updates_hash() {
    let engine = setup();

    let id = engine
        .add(
            "test",
            &job_with(
                json!({}),
                JobOptions {
                    delay: 1_000,
                    ..Default::default()
                },
            ),
            0,
        )
        .unwrap();
    engine.change_priority("test", &id, 4, false, 10).unwrap();

    assert_eq!(engine.job_state("test", &id), Some(JobState::Delayed));
    assert_eq!(engine.get_job("test", &id).unwrap().priority, 4);

    // Promotion honours the updated priority.
    let acquired = pull(&engine, "test", 2_000);
    assert_eq!(acquired.id, id);
    assert_eq!(acquired.field("priority"), Some("4"));
}
