//! Queue core tests.
//!
//! Every transition takes an explicit clock, so the whole suite runs on
//! simulated time with no sleeps.

mod events;
mod priority;
mod scenarios;

use compact_str::CompactString;
use serde_json::json;

use crate::protocol::{
    ActiveJob, FinishOpts, FinishTarget, JobInput, JobOptions, JobState, KeepJobs, ParentRef,
    PullOutcome, RateLimit, TransitionError, WorkerOpts,
};
use crate::queue::QueueEngine;
use crate::store::AtomicStore;

fn setup() -> QueueEngine {
    QueueEngine::new()
}

fn job(data: serde_json::Value) -> JobInput {
    JobInput {
        name: "default".into(),
        data: data.to_string(),
        opts: JobOptions::default(),
    }
}

fn job_with(data: serde_json::Value, opts: JobOptions) -> JobInput {
    JobInput {
        name: "default".into(),
        data: data.to_string(),
        opts,
    }
}

fn worker(token: &str) -> WorkerOpts {
    WorkerOpts {
        token: token.into(),
        lock_duration_ms: 5_000,
        limiter: None,
    }
}

fn finisher(token: &str) -> FinishOpts {
    FinishOpts::new(token)
}

/// Dequeue one job or panic; the common happy path of these tests.
fn pull(engine: &QueueEngine, queue: &str, now: u64) -> ActiveJob {
    match engine.move_to_active(queue, now, &worker("t1"), None) {
        PullOutcome::Job(acquired) => *acquired,
        other => panic!("expected a job, got {other:?}"),
    }
}

fn complete(engine: &QueueEngine, queue: &str, job_id: &str, now: u64) {
    engine
        .move_to_finished(
            queue,
            job_id,
            FinishTarget::Completed {
                returnvalue: "\"ok\"".to_string(),
            },
            &finisher("t1"),
            now,
        )
        .unwrap();
}

fn fail(engine: &QueueEngine, queue: &str, job_id: &str, reason: &str, now: u64) {
    engine
        .move_to_finished(
            queue,
            job_id,
            FinishTarget::Failed {
                reason: reason.to_string(),
            },
            &finisher("t1"),
            now,
        )
        .unwrap();
}

/// Ordered event names of a queue's stream.
fn event_log(engine: &QueueEngine, queue: &str) -> Vec<String> {
    engine
        .events(queue)
        .iter()
        .filter_map(|entry| entry.field("event").map(str::to_string))
        .collect()
}
