//! Reprioritize a ready job.

use crate::protocol::TransitionError;
use crate::store::AtomicStore;

use super::manager::{target_list, QueueEngine};
use super::{markers, priority};

impl<S: AtomicStore> QueueEngine<S> {
    /// Change a job's priority, relocating it between the target list and
    /// the priority index as needed. The new priority is persisted in the
    /// job hash regardless of where the job currently sits.
    pub fn change_priority(
        &self,
        queue: &str,
        job_id: &str,
        new_priority: u64,
        lifo: bool,
        now_ms: u64,
    ) -> Result<(), TransitionError> {
        let keys = self.keys(queue);
        self.store().run(|kv| {
            if !kv.exists(&keys.job(job_id)) {
                return Err(TransitionError::MissingJob);
            }

            let (target, paused) = target_list(kv, &keys);
            let was_prioritized = kv.zrem(&keys.prioritized, job_id);
            if was_prioritized
                && kv.zcard(&keys.prioritized) == 0
                && kv.lhead(target).as_deref() == Some(markers::PRIORITY_MARKER)
            {
                // The priority marker must not outlive the set it signals.
                kv.lpop(target);
            }
            if was_prioritized || kv.lrem(target, job_id) > 0 {
                if new_priority > 0 {
                    priority::add_job_with_priority(
                        kv,
                        &keys,
                        target,
                        paused,
                        job_id,
                        new_priority,
                        now_ms,
                    );
                } else if lifo {
                    kv.rpush(target, job_id);
                } else {
                    kv.lpush(target, job_id);
                }
            }
            // Jobs sitting elsewhere (delayed, waiting-children) pick the
            // new priority up when they are next routed.
            kv.hset(
                &keys.job(job_id),
                &[("priority", new_priority.to_string().as_str())],
            );
            Ok(())
        })
    }
}
