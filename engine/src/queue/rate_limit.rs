//! Rate limiter: a TTL'd counter with push-back.
//!
//! State is one counter under the queue's `limiter` key, expiring after
//! the configured window. Saturation defers the dequeue; a job that was
//! already optimistically moved to active is rolled back so it becomes
//! the next candidate once the window clears.

use tracing::trace;

use crate::protocol::RateLimit;
use crate::store::Kv;

use super::keys::QueueKeys;
use super::manager::target_list;
use super::priority;

/// Remaining window in milliseconds when the limiter is saturated, else 0.
/// A dead counter left behind by an elapsed window is deleted on sight.
pub(crate) fn rate_limit_ttl(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    limiter: Option<&RateLimit>,
    now_ms: u64,
) -> u64 {
    let Some(limit) = limiter else { return 0 };
    if limit.max == 0 {
        return 0;
    }
    let count = kv
        .get(&keys.limiter, now_ms)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    if count < limit.max {
        return 0;
    }
    let ttl = kv.pttl(&keys.limiter, now_ms);
    if ttl <= 0 {
        kv.del(&keys.limiter);
        0
    } else {
        ttl as u64
    }
}

/// Count a successful dequeue against the window; the first hit opens it.
pub(crate) fn record_start(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    limiter: Option<&RateLimit>,
    now_ms: u64,
) {
    let Some(limit) = limiter else { return };
    if kv.incr(&keys.limiter, now_ms) == 1 {
        kv.pexpire(&keys.limiter, limit.duration_ms, now_ms);
    }
}

/// Roll back an optimistic dequeue: out of `active`, back to the front of
/// the line (target tail for priority 0, counter-less score otherwise).
pub(crate) fn push_back_job(kv: &mut dyn Kv, keys: &QueueKeys, job_id: &str) {
    kv.lrem(&keys.active, job_id);
    let priority = kv
        .hget(&keys.job(job_id), "priority")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    if priority > 0 {
        priority::push_back_job_with_priority(kv, keys, job_id, priority);
    } else {
        let (target, _) = target_list(kv, keys);
        kv.rpush(target, job_id);
    }
    trace!(job_id, queue = %keys.base, "rate limited, pushed job back");
}
