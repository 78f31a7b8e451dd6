//! Stalled-job recovery.
//!
//! External heartbeat monitors insert suspect active-job ids into the
//! `stalled` set; this transition consumes the set. Jobs whose lease is
//! still live are skipped, the rest return to the ready lanes or fail
//! outright once they stalled too often.

use compact_str::CompactString;
use serde_json::from_str;
use tracing::warn;

use crate::protocol::ParentRef;
use crate::store::AtomicStore;

use super::manager::{target_list, QueueEngine};
use super::{events, parent, priority};

pub(crate) const STALLED_REASON: &str = "job stalled more than allowable limit";

impl<S: AtomicStore> QueueEngine<S> {
    /// Move every stalled job back to the target list, failing jobs that
    /// exceeded `max_stalled_count`. Returns `(failed, restored)` ids.
    pub fn move_stalled_to_wait(
        &self,
        queue: &str,
        max_stalled_count: u32,
        now_ms: u64,
    ) -> (Vec<CompactString>, Vec<CompactString>) {
        let keys = self.keys(queue);
        self.store().run(|kv| {
            let mut failed = Vec::new();
            let mut restored = Vec::new();
            for job_id in kv.smembers(&keys.stalled) {
                kv.srem(&keys.stalled, &job_id);
                // A live lease means the worker is merely slow.
                if kv.get(&keys.lock(&job_id), now_ms).is_some() {
                    continue;
                }
                if kv.lrem(&keys.active, &job_id) == 0 {
                    continue;
                }
                let job_key = keys.job(&job_id);
                if !kv.exists(&job_key) {
                    continue;
                }

                let stalled_count = kv.hincrby(&job_key, "stalledCounter", 1);
                if stalled_count > i64::from(max_stalled_count) {
                    kv.zadd(&keys.failed, now_ms, &job_id);
                    kv.hset(
                        &job_key,
                        &[
                            ("failedReason", STALLED_REASON),
                            ("finishedOn", now_ms.to_string().as_str()),
                        ],
                    );
                    events::emit(
                        kv,
                        &keys,
                        now_ms,
                        "failed",
                        &[
                            ("jobId", job_id.as_str()),
                            ("failedReason", STALLED_REASON),
                            ("prev", "active"),
                        ],
                    );
                    let parent_ref = kv
                        .hget(&job_key, "parent")
                        .and_then(|raw| from_str::<ParentRef>(&raw).ok());
                    if let Some(parent_ref) = &parent_ref {
                        parent::settle_child_failed(kv, &job_key, parent_ref, now_ms);
                    }
                    warn!(queue, job_id = %job_id, stalled_count, "stalled job failed");
                    failed.push(job_id);
                } else {
                    let job_priority = kv
                        .hget(&job_key, "priority")
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(0);
                    let (target, paused) = target_list(kv, &keys);
                    if job_priority > 0 {
                        priority::add_job_with_priority(
                            kv,
                            &keys,
                            target,
                            paused,
                            &job_id,
                            job_priority,
                            now_ms,
                        );
                    } else {
                        // Tail insert: a stalled job does not rejoin the
                        // back of the line.
                        kv.rpush(target, &job_id);
                    }
                    events::emit(
                        kv,
                        &keys,
                        now_ms,
                        "waiting",
                        &[("jobId", job_id.as_str()), ("prev", "active")],
                    );
                    warn!(queue, job_id = %job_id, "stalled job returned to wait");
                    restored.push(job_id);
                }
            }
            (failed, restored)
        })
    }
}
