//! Worker dequeue: the move-to-active transition.

use compact_str::CompactString;
use rustc_hash::FxHashMap;

use crate::protocol::{ActiveJob, PullOutcome, WorkerOpts};
use crate::store::{AtomicStore, Kv};

use super::keys::QueueKeys;
use super::manager::{target_list, QueueEngine};
use super::{delayed, events, markers, priority, rate_limit};

impl<S: AtomicStore> QueueEngine<S> {
    /// Acquire the next ready job for a worker.
    ///
    /// `preselected` is a job id the worker already moved into `active`
    /// through a blocking list pop; a marker id is discarded and normal
    /// selection runs instead.
    pub fn move_to_active(
        &self,
        queue: &str,
        now_ms: u64,
        opts: &WorkerOpts,
        preselected: Option<&str>,
    ) -> PullOutcome {
        let keys = self.keys(queue);
        self.store()
            .run(|kv| fetch_job(kv, &keys, now_ms, opts, preselected))
    }
}

/// One dequeue attempt; shared with the finish transition's fetch-next.
pub(crate) fn fetch_job(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    now_ms: u64,
    opts: &WorkerOpts,
    preselected: Option<&str>,
) -> PullOutcome {
    delayed::promote_delayed_jobs(kv, keys, now_ms);

    let expire_in_ms = rate_limit::rate_limit_ttl(kv, keys, opts.limiter.as_ref(), now_ms);

    let mut job_id: Option<CompactString> = preselected.map(CompactString::from);
    if let Some(id) = &job_id {
        if markers::is_marker(id) {
            // Stale marker carried over from the blocking pop.
            kv.lrem(&keys.active, id);
            job_id = None;
        }
    }

    if expire_in_ms > 0 {
        if let Some(id) = &job_id {
            // The job was optimistically moved to active; roll it back so
            // it is the next candidate when the limiter clears.
            rate_limit::push_back_job(kv, keys, id);
        }
        return PullOutcome::RateLimited { expire_in_ms };
    }

    let (target, paused) = target_list(kv, keys);
    if paused {
        return PullOutcome::Empty { next_ready_at: 0 };
    }

    if job_id.is_none() {
        job_id = pop_ready_job(kv, keys, target);
    }

    match job_id {
        Some(id) => PullOutcome::Job(Box::new(activate(kv, keys, &id, now_ms, opts))),
        None => PullOutcome::Empty {
            next_ready_at: delayed::next_delayed_fire(kv, keys).unwrap_or(0),
        },
    }
}

/// Pop from the target tail into the active head; one marker is consumed
/// and the pop retried once, then selection falls to the priority index.
fn pop_ready_job(kv: &mut dyn Kv, keys: &QueueKeys, target: &str) -> Option<CompactString> {
    let mut marker_seen = false;
    loop {
        match kv.rpop(target) {
            Some(entry) if markers::is_marker(&entry) => {
                if marker_seen {
                    break;
                }
                marker_seen = true;
            }
            Some(entry) => {
                kv.lpush(&keys.active, &entry);
                return Some(CompactString::from(entry));
            }
            None => break,
        }
    }
    priority::move_job_from_priority_to_active(kv, keys, target)
}

/// Lease bookkeeping for an acquired job.
fn activate(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    job_id: &str,
    now_ms: u64,
    opts: &WorkerOpts,
) -> ActiveJob {
    rate_limit::record_start(kv, keys, opts.limiter.as_ref(), now_ms);
    if opts.token != "0" {
        kv.set_px(&keys.lock(job_id), &opts.token, opts.lock_duration_ms, now_ms);
    }
    // Stalled detection inserts stale ids externally; acquisition clears
    // ours.
    kv.srem(&keys.stalled, job_id);
    events::emit(
        kv,
        keys,
        now_ms,
        "active",
        &[("jobId", job_id), ("prev", "waiting")],
    );
    let job_key = keys.job(job_id);
    kv.hset(&job_key, &[("processedOn", now_ms.to_string().as_str())]);
    kv.hincrby(&job_key, "attemptsMade", 1);

    let fields: FxHashMap<CompactString, String> = kv.hgetall(&job_key).into_iter().collect();
    ActiveJob {
        id: CompactString::from(job_id),
        fields,
    }
}
