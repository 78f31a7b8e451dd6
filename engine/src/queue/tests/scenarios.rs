//! End-to-end scenarios with literal inputs.

use super::*;

#[test]
fn scenario_plain_round_trip() {
    let engine = setup();
    let keys = engine.keys("s");

    let opts = JobOptions {
        job_id: Some("A".into()),
        ..Default::default()
    };
    engine.add("s", &job_with(json!({}), opts), 1_000).unwrap();
    engine
        .store()
        .run(|kv| assert_eq!(kv.lhead(&keys.wait).as_deref(), Some("A")));

    let worker_opts = WorkerOpts {
        token: "t1".into(),
        lock_duration_ms: 5_000,
        limiter: None,
    };
    let acquired = engine
        .move_to_active("s", 1_100, &worker_opts, None)
        .into_job()
        .expect("job A");
    assert_eq!(acquired.id, "A");
    engine
        .store()
        .run(|kv| assert_eq!(kv.get(&keys.lock("A"), 1_100).as_deref(), Some("t1")));

    engine
        .move_to_finished(
            "s",
            "A",
            FinishTarget::Completed {
                returnvalue: "r".to_string(),
            },
            &finisher("t1"),
            1_200,
        )
        .unwrap();

    assert_eq!(engine.job_state("s", "A"), Some(JobState::Completed));
    assert_eq!(
        event_log(&engine, "s"),
        vec!["added", "waiting", "active", "completed"]
    );
}

#[test]
fn scenario_delayed_add_and_promotion() {
    let engine = setup();
    let keys = engine.keys("s");

    let opts = JobOptions {
        delay: 1_000,
        ..Default::default()
    };
    let b = engine.add("s", &job_with(json!({}), opts), 1_000).unwrap();
    assert_eq!(b, "1");

    engine.store().run(|kv| {
        assert_eq!(kv.zscore(&keys.delayed, "1"), Some(2_000 * 4_096 + 1));
        assert_eq!(kv.lhead(&keys.wait).as_deref(), Some("0:2000"));
    });

    match engine.move_to_active("s", 1_500, &worker("t1"), None) {
        PullOutcome::Empty { next_ready_at } => assert_eq!(next_ready_at, 2_000),
        other => panic!("expected empty, got {other:?}"),
    }

    let acquired = engine
        .move_to_active("s", 2_000, &worker("t1"), None)
        .into_job()
        .expect("job B");
    assert_eq!(acquired.id, b);

    let events = engine.events("s");
    let promoted = events
        .iter()
        .find(|e| e.field("event") == Some("waiting"))
        .unwrap();
    assert_eq!(promoted.field("prev"), Some("delayed"));
}

#[test]
fn scenario_priority_selection_order() {
    let engine = setup();
    let keys = engine.keys("s");

    let p = engine
        .add(
            "s",
            &job_with(
                json!({}),
                JobOptions {
                    priority: 2,
                    ..Default::default()
                },
            ),
            0,
        )
        .unwrap();
    let q = engine
        .add(
            "s",
            &job_with(
                json!({}),
                JobOptions {
                    priority: 1,
                    ..Default::default()
                },
            ),
            1,
        )
        .unwrap();

    // Lower priority number sorts first despite insertion order.
    engine.store().run(|kv| {
        let (best, _) = kv.zpeekmin(&keys.prioritized).unwrap();
        assert_eq!(best, q);
        assert_eq!(kv.lhead(&keys.wait).as_deref(), Some("0:0"));
    });

    assert_eq!(pull(&engine, "s", 10).id, q);
    // The dequeue consumed the marker and re-armed it for the job still
    // waiting in the priority index.
    engine
        .store()
        .run(|kv| assert_eq!(kv.lhead(&keys.wait).as_deref(), Some("0:0")));
    assert_eq!(pull(&engine, "s", 11).id, p);
    // Set drained: no marker left behind.
    engine.store().run(|kv| assert_eq!(kv.llen(&keys.wait), 0));
}

#[test]
fn scenario_rate_limited_queue() {
    let engine = setup();
    let keys = engine.keys("s");
    let opts = WorkerOpts {
        token: "t1".into(),
        lock_duration_ms: 5_000,
        limiter: Some(RateLimit {
            max: 1,
            duration_ms: 1_000,
        }),
    };

    let x = engine.add("s", &job(json!({})), 0).unwrap();
    let y = engine.add("s", &job(json!({})), 0).unwrap();

    let first = engine.move_to_active("s", 0, &opts, None);
    assert_eq!(first.into_job().expect("job").id, x);
    engine.store().run(|kv| {
        assert_eq!(kv.get(&keys.limiter, 0).as_deref(), Some("1"));
        assert_eq!(kv.pttl(&keys.limiter, 0), 1_000);
    });

    match engine.move_to_active("s", 100, &opts, None) {
        PullOutcome::RateLimited { expire_in_ms } => assert_eq!(expire_in_ms, 900),
        other => panic!("expected rate limited, got {other:?}"),
    }
    assert_eq!(engine.counts("s").waiting, 1);

    let third = engine.move_to_active("s", 1_100, &opts, None);
    assert_eq!(third.into_job().expect("job").id, y);
}

#[test]
fn scenario_fail_parent_on_failure_across_queues() {
    let engine = setup();

    let p = engine
        .add(
            "q1",
            &job_with(
                json!({}),
                JobOptions {
                    wait_children: true,
                    ..Default::default()
                },
            ),
            0,
        )
        .unwrap();

    let parent_ref = ParentRef {
        fpof: true,
        ..ParentRef::new(&p, "emberq:q1")
    };
    let c1 = engine
        .add(
            "q2",
            &job_with(
                json!({}),
                JobOptions {
                    parent: Some(parent_ref.clone()),
                    ..Default::default()
                },
            ),
            1,
        )
        .unwrap();
    let c2 = engine
        .add(
            "q2",
            &job_with(
                json!({}),
                JobOptions {
                    parent: Some(parent_ref),
                    ..Default::default()
                },
            ),
            2,
        )
        .unwrap();

    // First child completes: the parent keeps waiting.
    let first = pull(&engine, "q2", 10);
    assert_eq!(first.id, c1);
    complete(&engine, "q2", &c1, 20);
    assert_eq!(engine.job_state("q1", &p), Some(JobState::WaitingChildren));

    // Second child fails: the parent fails in its own queue.
    let second = pull(&engine, "q2", 30);
    assert_eq!(second.id, c2);
    fail(&engine, "q2", &c2, "boom", 40);

    assert_eq!(engine.job_state("q1", &p), Some(JobState::Failed));
    assert_eq!(
        engine.get_job("q1", &p).unwrap().failed_reason.as_deref(),
        Some(format!("child emberq:q2:{c2} failed").as_str())
    );
    let failed_event = engine
        .events("q1")
        .into_iter()
        .find(|e| e.field("event") == Some("failed"))
        .unwrap();
    assert_eq!(failed_event.field("prev"), Some("waiting-children"));
}

#[test]
fn scenario_change_priority_in_place() {
    let engine = setup();
    let keys = engine.keys("s");

    let a = engine
        .add(
            "s",
            &job_with(
                json!({}),
                JobOptions {
                    priority: 2,
                    ..Default::default()
                },
            ),
            0,
        )
        .unwrap();

    engine.change_priority("s", &a, 5, false, 10).unwrap();

    engine.store().run(|kv| {
        let score = kv.zscore(&keys.prioritized, &a).unwrap();
        assert_eq!(score >> 32, 5);
        assert_eq!(score & 0xFFFF_FFFF, 2, "fresh tiebreak counter");
    });
    assert_eq!(
        engine.get_job("s", &a).unwrap().priority,
        5,
        "priority persisted in the job hash"
    );
}
