//! Priority index maintenance.
//!
//! Jobs with nonzero priority live in the `prioritized` ordered set,
//! scored by the packed (priority, counter) value; lower scores are served
//! first, ties in insertion order via the `pc` counter.

use compact_str::CompactString;

use crate::store::Kv;

use super::keys::QueueKeys;
use super::{markers, scores};

/// Insert a job with a fresh tiebreak counter; wakes blocked workers via
/// the priority marker unless the queue is paused.
pub(crate) fn add_job_with_priority(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    target: &str,
    paused: bool,
    job_id: &str,
    priority: u64,
    now_ms: u64,
) {
    let counter = kv.incr(&keys.pc, now_ms) as u64;
    kv.zadd(
        &keys.prioritized,
        scores::priority_score(priority, counter),
        job_id,
    );
    if !paused {
        markers::add_priority_marker(kv, target);
    }
}

/// Re-insert with a counter-less score, ahead of every same-priority peer.
/// Used only by the rate-limit rollback.
pub(crate) fn push_back_job_with_priority(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    job_id: &str,
    priority: u64,
) {
    kv.zadd(&keys.prioritized, scores::push_back_score(priority), job_id);
}

/// Pop the best prioritized job into the head of `active`. Deletes the
/// `pc` counter when the set drains so numbering restarts; otherwise the
/// priority marker is re-armed, because the caller reaches this path only
/// after emptying the target list and blocked workers would never learn
/// about the remaining prioritized jobs.
pub(crate) fn move_job_from_priority_to_active(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    target: &str,
) -> Option<CompactString> {
    let (job_id, _) = kv.zpopmin(&keys.prioritized)?;
    if kv.zcard(&keys.prioritized) == 0 {
        kv.del(&keys.pc);
    } else {
        kv.lpush(target, markers::PRIORITY_MARKER);
    }
    kv.lpush(&keys.active, &job_id);
    Some(job_id)
}
