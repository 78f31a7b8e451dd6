//! Job creation.

use compact_str::CompactString;
use tracing::debug;

use crate::protocol::{JobInput, TransitionError};
use crate::store::AtomicStore;

use super::keys::QueueKeys;
use super::manager::{target_list, QueueEngine};
use super::{delayed, events, markers, parent, priority, scores};

impl<S: AtomicStore> QueueEngine<S> {
    /// Create a job and route it to its initial state: waiting-children,
    /// delayed, prioritized, or the target list.
    ///
    /// A re-`add` with an explicit id resolves idempotently through the
    /// `duplicated` branch, so callers may retry on storage errors.
    pub fn add(
        &self,
        queue: &str,
        input: &JobInput,
        now_ms: u64,
    ) -> Result<CompactString, TransitionError> {
        let keys = self.keys(queue);
        let opts = &input.opts;
        if let Some(custom) = &opts.job_id {
            // The `0:` id namespace belongs to the wake-up markers.
            if markers::is_marker(custom) {
                return Err(TransitionError::ReservedJobId(custom.clone()));
            }
        }

        self.store().run(|kv| {
            if let Some(custom) = &opts.job_id {
                if kv.exists(&keys.job(custom)) {
                    if let Some(parent_ref) = &opts.parent {
                        parent::link_existing_child(kv, &keys, custom, parent_ref, now_ms);
                    }
                    events::emit(
                        kv,
                        &keys,
                        now_ms,
                        "duplicated",
                        &[("jobId", custom.as_str())],
                    );
                    return Ok(custom.clone());
                }
            }

            let parent_key = opts.parent.as_ref().map(|p| p.job_key());
            if let Some(parent_key) = &parent_key {
                if !kv.exists(parent_key) {
                    return Err(TransitionError::MissingParent);
                }
            }

            let job_id: CompactString = match &opts.job_id {
                Some(custom) => custom.clone(),
                None => CompactString::from(kv.incr(&keys.id, now_ms).to_string()),
            };
            let job_key = keys.job(&job_id);

            let opts_json = serde_json::to_string(opts).unwrap_or_default();
            let timestamp = now_ms.to_string();
            let delay = opts.delay.to_string();
            let job_priority = opts.priority.to_string();
            let parent_json = opts
                .parent
                .as_ref()
                .map(|p| serde_json::to_string(p).unwrap_or_default());

            let mut fields: Vec<(&str, &str)> = vec![
                ("name", input.name.as_str()),
                ("data", input.data.as_str()),
                ("opts", opts_json.as_str()),
                ("timestamp", timestamp.as_str()),
                ("delay", delay.as_str()),
                ("priority", job_priority.as_str()),
                ("attemptsMade", "0"),
            ];
            if let (Some(parent_key), Some(parent_json)) = (&parent_key, &parent_json) {
                fields.push(("parentKey", parent_key.as_str()));
                fields.push(("parent", parent_json.as_str()));
            }
            if let Some(rjk) = &opts.repeat_job_key {
                fields.push(("rjk", rjk.as_str()));
            }
            kv.hset(&job_key, &fields);

            events::emit(
                kv,
                &keys,
                now_ms,
                "added",
                &[("jobId", job_id.as_str()), ("name", input.name.as_str())],
            );

            if opts.wait_children {
                kv.zadd(&keys.waiting_children, now_ms, &job_id);
                events::emit(
                    kv,
                    &keys,
                    now_ms,
                    "waiting-children",
                    &[("jobId", job_id.as_str())],
                );
            } else if opts.delay > 0 {
                let fire_at = now_ms + opts.delay;
                kv.zadd(
                    &keys.delayed,
                    scores::delayed_score(fire_at, scores::job_counter(&job_id)),
                    &job_id,
                );
                events::emit(
                    kv,
                    &keys,
                    now_ms,
                    "delayed",
                    &[
                        ("jobId", job_id.as_str()),
                        ("delay", fire_at.to_string().as_str()),
                    ],
                );
                let (target, _) = target_list(kv, &keys);
                let next_fire = delayed::next_delayed_fire(kv, &keys);
                markers::refresh_delay_marker(kv, target, next_fire);
            } else if opts.priority > 0 {
                let (target, paused) = target_list(kv, &keys);
                priority::add_job_with_priority(
                    kv,
                    &keys,
                    target,
                    paused,
                    &job_id,
                    opts.priority,
                    now_ms,
                );
                events::emit(kv, &keys, now_ms, "waiting", &[("jobId", job_id.as_str())]);
            } else {
                let (target, _) = target_list(kv, &keys);
                if opts.lifo {
                    kv.rpush(target, &job_id);
                } else {
                    kv.lpush(target, &job_id);
                }
                events::emit(kv, &keys, now_ms, "waiting", &[("jobId", job_id.as_str())]);
            }

            if let Some(parent_key) = &parent_key {
                kv.sadd(&QueueKeys::deps_of(parent_key), &job_key);
            }

            debug!(queue, job_id = %job_id, "job added");
            Ok(job_id)
        })
    }
}
