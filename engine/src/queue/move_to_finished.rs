//! Terminal transitions: completion and failure.

use serde_json::from_str;
use tracing::debug;

use crate::protocol::{
    FinishOpts, FinishTarget, ParentRef, PullOutcome, TransitionError, WorkerOpts,
};
use crate::store::{AtomicStore, Kv};

use super::keys::QueueKeys;
use super::manager::{real_jobs, validate_and_release_lock, QueueEngine};
use super::{events, metrics, move_to_active, parent};

/// Finished-set pruning touches at most this many jobs per transition.
const REMOVE_BATCH: usize = 7000;

impl<S: AtomicStore> QueueEngine<S> {
    /// Finish an active job into the completed or failed set, cascading to
    /// its parent and applying retention. With `fetch_next` the same
    /// transition returns the worker's next job.
    pub fn move_to_finished(
        &self,
        queue: &str,
        job_id: &str,
        target: FinishTarget,
        opts: &FinishOpts,
        now_ms: u64,
    ) -> Result<Option<PullOutcome>, TransitionError> {
        let keys = self.keys(queue);
        self.store().run(|kv| {
            let job_key = keys.job(job_id);
            if !kv.exists(&job_key) {
                return Err(TransitionError::MissingJob);
            }
            validate_and_release_lock(kv, &keys, job_id, &opts.token, now_ms)?;
            if kv.scard(&QueueKeys::deps_of(&job_key)) > 0 {
                return Err(TransitionError::PendingDependencies);
            }
            if kv.lrem(&keys.active, job_id) == 0 {
                return Err(TransitionError::NotInState);
            }

            // Bound the stream before this transition's own emissions.
            events::trim_events(kv, &keys);

            let attempts_made = kv
                .hget(&job_key, "attemptsMade")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(0);
            let parent_ref = kv
                .hget(&job_key, "parent")
                .and_then(|raw| from_str::<ParentRef>(&raw).ok());

            let (set_key, event, field_name, field_value) = match &target {
                FinishTarget::Completed { returnvalue } => {
                    (&keys.completed, "completed", "returnvalue", returnvalue.as_str())
                }
                FinishTarget::Failed { reason } => {
                    (&keys.failed, "failed", "failedReason", reason.as_str())
                }
            };

            // Cascade to the parent before retention can drop this hash.
            if let Some(parent_ref) = &parent_ref {
                match &target {
                    FinishTarget::Completed { returnvalue } => {
                        parent::settle_child_completed(kv, &job_key, parent_ref, returnvalue, now_ms);
                    }
                    FinishTarget::Failed { .. } => {
                        parent::settle_child_failed(kv, &job_key, parent_ref, now_ms);
                    }
                }
            }

            if opts.keep_jobs.count == Some(0) {
                // No retention: drop the job and leave no dangling parent
                // reference behind.
                remove_job_keys(kv, &keys, job_id);
                if let Some(parent_ref) = &parent_ref {
                    parent::detach_from_parent(kv, &job_key, parent_ref, now_ms);
                }
            } else {
                kv.zadd(set_key, now_ms, job_id);
                kv.hset(
                    &job_key,
                    &[
                        (field_name, field_value),
                        ("finishedOn", now_ms.to_string().as_str()),
                    ],
                );
                if let Some(age_secs) = opts.keep_jobs.age_secs {
                    remove_jobs_by_max_age(
                        kv,
                        &keys,
                        set_key,
                        now_ms.saturating_sub(age_secs * 1000),
                        now_ms,
                    );
                }
                if let Some(count) = opts.keep_jobs.count {
                    remove_jobs_by_max_count(kv, &keys, set_key, count as usize, now_ms);
                }
            }

            events::emit(
                kv,
                &keys,
                now_ms,
                event,
                &[("jobId", job_id), (field_name, field_value)],
            );
            if matches!(target, FinishTarget::Failed { .. }) && attempts_made >= opts.max_attempts {
                events::emit(
                    kv,
                    &keys,
                    now_ms,
                    "retries-exhausted",
                    &[
                        ("jobId", job_id),
                        ("attemptsMade", attempts_made.to_string().as_str()),
                    ],
                );
            }

            if let Some(max_metrics) = opts.max_metrics {
                metrics::collect(kv, &keys, event, max_metrics, now_ms);
            }

            debug!(queue = %keys.base, job_id, event, "job finished");

            if opts.fetch_next {
                let worker = WorkerOpts {
                    token: opts.token.clone(),
                    lock_duration_ms: opts.lock_duration_ms,
                    limiter: opts.limiter,
                };
                let outcome = move_to_active::fetch_job(kv, &keys, now_ms, &worker, None);
                if matches!(outcome, PullOutcome::Empty { .. }) && queue_drained(kv, &keys) {
                    events::emit(kv, &keys, now_ms, "drained", &[]);
                }
                Ok(Some(outcome))
            } else {
                Ok(None)
            }
        })
    }
}

/// Everything ready-or-running is empty: nothing waiting, active or
/// prioritized.
fn queue_drained(kv: &dyn Kv, keys: &QueueKeys) -> bool {
    real_jobs(kv, &keys.wait) == 0
        && kv.llen(&keys.active) == 0
        && kv.zcard(&keys.prioritized) == 0
}

/// Delete a job hash and its companion keys.
pub(crate) fn remove_job_keys(kv: &mut dyn Kv, keys: &QueueKeys, job_id: &str) {
    let job_key = keys.job(job_id);
    kv.del(&job_key);
    kv.del(&keys.lock(job_id));
    kv.del(&QueueKeys::deps_of(&job_key));
    kv.del(&QueueKeys::processed_of(&job_key));
}

/// Prune finished jobs older than `cutoff_ms`, cascading parent
/// detachment so no dangling references remain.
fn remove_jobs_by_max_age(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    set_key: &str,
    cutoff_ms: u64,
    now_ms: u64,
) {
    for (job_id, _) in kv.zpop_below(set_key, cutoff_ms, REMOVE_BATCH) {
        cleanup_removed(kv, keys, &job_id, now_ms);
    }
}

/// Keep only the most recent `keep` finished jobs.
fn remove_jobs_by_max_count(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    set_key: &str,
    keep: usize,
    now_ms: u64,
) {
    let mut removed = 0;
    while kv.zcard(set_key) > keep && removed < REMOVE_BATCH {
        let Some((job_id, _)) = kv.zpopmin(set_key) else {
            break;
        };
        cleanup_removed(kv, keys, &job_id, now_ms);
        removed += 1;
    }
}

fn cleanup_removed(kv: &mut dyn Kv, keys: &QueueKeys, job_id: &str, now_ms: u64) {
    let job_key = keys.job(job_id);
    let parent_ref = kv
        .hget(&job_key, "parent")
        .and_then(|raw| from_str::<ParentRef>(&raw).ok());
    if let Some(parent_ref) = &parent_ref {
        parent::detach_from_parent(kv, &job_key, parent_ref, now_ms);
    }
    remove_job_keys(kv, keys, job_id);
}
