//! Re-enqueue a failed-but-retryable active job.

use crate::protocol::TransitionError;
use crate::store::AtomicStore;

use super::manager::{target_list, validate_and_release_lock, QueueEngine};
use super::{delayed, events, priority};

impl<S: AtomicStore> QueueEngine<S> {
    /// Put an active job back into its ready lane for another attempt.
    /// `lifo` selects the tail (served next) over the head of the line.
    pub fn retry_job(
        &self,
        queue: &str,
        job_id: &str,
        lifo: bool,
        token: &str,
        now_ms: u64,
    ) -> Result<(), TransitionError> {
        let keys = self.keys(queue);
        self.store().run(|kv| {
            delayed::promote_delayed_jobs(kv, &keys, now_ms);
            if !kv.exists(&keys.job(job_id)) {
                return Err(TransitionError::MissingJob);
            }
            validate_and_release_lock(kv, &keys, job_id, token, now_ms)?;
            kv.lrem(&keys.active, job_id);

            let job_priority = kv
                .hget(&keys.job(job_id), "priority")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            let (target, paused) = target_list(kv, &keys);
            if job_priority > 0 {
                priority::add_job_with_priority(
                    kv, &keys, target, paused, job_id, job_priority, now_ms,
                );
            } else if lifo {
                kv.rpush(target, job_id);
            } else {
                kv.lpush(target, job_id);
            }
            events::emit(
                kv,
                &keys,
                now_ms,
                "waiting",
                &[("jobId", job_id), ("prev", "failed")],
            );
            Ok(())
        })
    }
}
