//! Cross-queue parent/dependency propagation.
//!
//! A child carries a structured parent reference (`id`, `queue_key`,
//! per-child `fpof`/`rdof` policies). Parents live in a possibly different
//! queue namespace, reached through `QueueKeys::from_base`. When both
//! policies are present, fail-parent wins.

use serde_json::from_str;
use tracing::debug;

use crate::protocol::ParentRef;
use crate::store::Kv;

use super::keys::QueueKeys;
use super::manager::target_list;
use super::{delayed, events, markers, priority, scores};

/// On child completion: clear the dependency, record the return value and
/// move the parent onward when its last child finished.
pub(crate) fn settle_child_completed(
    kv: &mut dyn Kv,
    child_key: &str,
    parent: &ParentRef,
    returnvalue: &str,
    now_ms: u64,
) {
    let parent_key = parent.job_key();
    let deps_key = QueueKeys::deps_of(&parent_key);
    kv.srem(&deps_key, child_key);
    kv.hset(
        &QueueKeys::processed_of(&parent_key),
        &[(child_key, returnvalue)],
    );
    if kv.scard(&deps_key) == 0 {
        move_parent_if_waiting(kv, parent, now_ms);
    }
}

/// On terminal child failure: apply the child's parent policy.
pub(crate) fn settle_child_failed(
    kv: &mut dyn Kv,
    child_key: &str,
    parent: &ParentRef,
    now_ms: u64,
) {
    if parent.fpof {
        fail_parent_chain(kv, child_key.to_string(), parent.clone(), now_ms);
    } else if parent.rdof {
        let deps_key = QueueKeys::deps_of(&parent.job_key());
        kv.srem(&deps_key, child_key);
        if kv.scard(&deps_key) == 0 {
            move_parent_if_waiting(kv, parent, now_ms);
        }
    }
}

/// Route a parent out of waiting-children into its own queue's ready
/// lanes, honoring the parent's stored delay and priority. No-op when the
/// parent is not in waiting-children.
pub(crate) fn move_parent_if_waiting(kv: &mut dyn Kv, parent: &ParentRef, now_ms: u64) {
    let pkeys = QueueKeys::from_base(parent.queue_key.clone());
    if !kv.zrem(&pkeys.waiting_children, &parent.id) {
        return;
    }
    let parent_key = pkeys.job(&parent.id);
    let delay = kv
        .hget(&parent_key, "delay")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    if delay > 0 {
        let fire_at = now_ms + delay;
        kv.zadd(
            &pkeys.delayed,
            scores::delayed_score(fire_at, scores::job_counter(&parent.id)),
            &parent.id,
        );
        events::emit(
            kv,
            &pkeys,
            now_ms,
            "delayed",
            &[
                ("jobId", parent.id.as_str()),
                ("delay", fire_at.to_string().as_str()),
            ],
        );
    } else {
        let job_priority = kv
            .hget(&parent_key, "priority")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let (target, paused) = target_list(kv, &pkeys);
        if job_priority > 0 {
            priority::add_job_with_priority(
                kv, &pkeys, target, paused, &parent.id, job_priority, now_ms,
            );
        } else {
            kv.lpush(target, &parent.id);
        }
        events::emit(
            kv,
            &pkeys,
            now_ms,
            "waiting",
            &[("jobId", parent.id.as_str()), ("prev", "waiting-children")],
        );
    }
    let (target, _) = target_list(kv, &pkeys);
    let next_fire = delayed::next_delayed_fire(kv, &pkeys);
    markers::refresh_delay_marker(kv, target, next_fire);
    debug!(parent = %parent.id, queue = %parent.queue_key, "parent left waiting-children");
}

/// Fail a parent because a child failed, walking fail-parent chains
/// iteratively; ancestor depth is unbounded in adversarial inputs.
fn fail_parent_chain(kv: &mut dyn Kv, mut child_key: String, mut parent: ParentRef, now_ms: u64) {
    loop {
        let pkeys = QueueKeys::from_base(parent.queue_key.clone());
        // A parent that already moved on (active, finished) is left alone.
        if !kv.zrem(&pkeys.waiting_children, &parent.id) {
            return;
        }
        let parent_key = pkeys.job(&parent.id);
        let reason = format!("child {child_key} failed");
        kv.hset(
            &parent_key,
            &[
                ("failedReason", reason.as_str()),
                ("finishedOn", now_ms.to_string().as_str()),
            ],
        );
        kv.zadd(&pkeys.failed, now_ms, &parent.id);
        events::emit(
            kv,
            &pkeys,
            now_ms,
            "failed",
            &[
                ("jobId", parent.id.as_str()),
                ("failedReason", reason.as_str()),
                ("prev", "waiting-children"),
            ],
        );

        let grand = kv
            .hget(&parent_key, "parent")
            .and_then(|raw| from_str::<ParentRef>(&raw).ok());
        match grand {
            Some(grand) if grand.fpof => {
                child_key = parent_key;
                parent = grand;
            }
            Some(grand) if grand.rdof => {
                let deps_key = QueueKeys::deps_of(&grand.job_key());
                kv.srem(&deps_key, &parent_key);
                if kv.scard(&deps_key) == 0 {
                    move_parent_if_waiting(kv, &grand, now_ms);
                }
                return;
            }
            _ => return,
        }
    }
}

/// Wire an already-existing job into a parent reference: completed
/// children settle immediately with their stored return value, anything
/// else registers as a pending dependency.
pub(crate) fn link_existing_child(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    job_id: &str,
    parent: &ParentRef,
    now_ms: u64,
) {
    let child_key = keys.job(job_id);
    if kv.zscore(&keys.completed, job_id).is_some() {
        let returnvalue = kv.hget(&child_key, "returnvalue").unwrap_or_default();
        settle_child_completed(kv, &child_key, parent, &returnvalue, now_ms);
    } else {
        kv.sadd(&QueueKeys::deps_of(&parent.job_key()), &child_key);
    }
}

/// Remove a child from its parent's dependency set (job removal path);
/// an emptied set releases the parent.
pub(crate) fn detach_from_parent(
    kv: &mut dyn Kv,
    child_key: &str,
    parent: &ParentRef,
    now_ms: u64,
) {
    let deps_key = QueueKeys::deps_of(&parent.job_key());
    kv.srem(&deps_key, child_key);
    if kv.scard(&deps_key) == 0 {
        move_parent_if_waiting(kv, parent, now_ms);
    }
}
