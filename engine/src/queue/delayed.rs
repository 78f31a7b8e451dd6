//! Delayed index: scheduling, promotion, and the delayed transitions.

use tracing::trace;

use crate::protocol::TransitionError;
use crate::store::{AtomicStore, Kv};

use super::keys::QueueKeys;
use super::manager::{target_list, validate_and_release_lock, QueueEngine};
use super::{events, markers, priority, scores};

/// At most this many due jobs promote per call, bounding procedure time.
pub(crate) const PROMOTE_BATCH: usize = 1000;

/// Earliest scheduled fire time, decoded from the minimum score.
pub(crate) fn next_delayed_fire(kv: &dyn Kv, keys: &QueueKeys) -> Option<u64> {
    kv.zpeekmin(&keys.delayed)
        .map(|(_, score)| scores::delayed_fire_time(score))
}

/// Move every due delayed job into its ready lane.
pub(crate) fn promote_delayed_jobs(kv: &mut dyn Kv, keys: &QueueKeys, now_ms: u64) {
    let due = kv.zpop_below(
        &keys.delayed,
        scores::delayed_score(now_ms + 1, 0),
        PROMOTE_BATCH,
    );
    if due.is_empty() {
        return;
    }
    trace!(queue = %keys.base, count = due.len(), "promoting due delayed jobs");
    let (target, paused) = target_list(kv, keys);
    for (job_id, _) in due {
        let job_key = keys.job(&job_id);
        let job_priority = kv
            .hget(&job_key, "priority")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        if job_priority > 0 {
            priority::add_job_with_priority(kv, keys, target, paused, &job_id, job_priority, now_ms);
        } else {
            kv.lpush(target, &job_id);
        }
        kv.hset(&job_key, &[("delay", "0")]);
        events::emit(
            kv,
            keys,
            now_ms,
            "waiting",
            &[("jobId", job_id.as_str()), ("prev", "delayed")],
        );
    }
}

impl<S: AtomicStore> QueueEngine<S> {
    /// Park an active job until `fire_at_ms`.
    pub fn move_to_delayed(
        &self,
        queue: &str,
        job_id: &str,
        fire_at_ms: u64,
        token: &str,
        now_ms: u64,
    ) -> Result<(), TransitionError> {
        let keys = self.keys(queue);
        self.store().run(|kv| {
            if !kv.exists(&keys.job(job_id)) {
                return Err(TransitionError::MissingJob);
            }
            validate_and_release_lock(kv, &keys, job_id, token, now_ms)?;
            if kv.lrem(&keys.active, job_id) == 0 {
                return Err(TransitionError::NotInState);
            }
            kv.zadd(
                &keys.delayed,
                scores::delayed_score(fire_at_ms, scores::job_counter(job_id)),
                job_id,
            );
            events::emit(
                kv,
                &keys,
                now_ms,
                "delayed",
                &[("jobId", job_id), ("delay", fire_at_ms.to_string().as_str())],
            );
            let (target, _) = target_list(kv, &keys);
            let next_fire = next_delayed_fire(kv, &keys);
            markers::refresh_delay_marker(kv, target, next_fire);
            Ok(())
        })
    }

    /// Make a delayed job ready immediately.
    pub fn promote(
        &self,
        queue: &str,
        job_id: &str,
        now_ms: u64,
    ) -> Result<(), TransitionError> {
        let keys = self.keys(queue);
        self.store().run(|kv| {
            if !kv.zrem(&keys.delayed, job_id) {
                return Err(TransitionError::NotInState);
            }
            let job_key = keys.job(job_id);
            let job_priority = kv
                .hget(&job_key, "priority")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            let (target, paused) = target_list(kv, &keys);
            markers::strip_leading_marker(kv, target);
            if job_priority > 0 {
                priority::add_job_with_priority(
                    kv, &keys, target, paused, job_id, job_priority, now_ms,
                );
            } else {
                kv.lpush(target, job_id);
            }
            kv.hset(&job_key, &[("delay", "0")]);
            events::emit(
                kv,
                &keys,
                now_ms,
                "waiting",
                &[("jobId", job_id), ("prev", "delayed")],
            );
            Ok(())
        })
    }

    /// Earliest scheduled fire time of the queue, if any.
    pub fn next_delayed_timestamp(&self, queue: &str) -> Option<u64> {
        let keys = self.keys(queue);
        self.store().run(|kv| next_delayed_fire(kv, &keys))
    }
}
