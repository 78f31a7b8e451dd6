//! Packed ordered-set scores.
//!
//! A packed score couples a logical key (priority or fire time) with a
//! monotonic tiebreak counter in a single exact u64:
//!
//! - prioritized: `priority * 2^32 + (counter & 0xFFFF_FFFF_FFFF)`
//! - delayed:     `fire_ms * 2^12 + (counter & 0xFFF)`
//!
//! The tiebreak widths bound throughput: the priority counter bleeds into
//! the priority bits after 2^32 inserts at one priority level, and the
//! delayed tiebreak loses strict FIFO beyond 4096 jobs created within one
//! millisecond.

pub const PRIORITY_COUNTER_MASK: u64 = 0xFFFF_FFFF_FFFF;
pub const DELAY_COUNTER_MASK: u64 = 0xFFF;

const PRIORITY_SHIFT: u64 = 1 << 32;
const DELAY_SHIFT: u64 = 1 << 12;

#[inline]
pub fn priority_score(priority: u64, counter: u64) -> u64 {
    priority * PRIORITY_SHIFT + (counter & PRIORITY_COUNTER_MASK)
}

/// Counter-less score: sorts ahead of every same-priority peer. Used only
/// by the rate-limit rollback.
#[inline]
pub fn push_back_score(priority: u64) -> u64 {
    priority * PRIORITY_SHIFT
}

#[inline]
pub fn delayed_score(fire_at_ms: u64, counter: u64) -> u64 {
    fire_at_ms * DELAY_SHIFT + (counter & DELAY_COUNTER_MASK)
}

/// Fire time encoded in a delayed score.
#[inline]
pub fn delayed_fire_time(score: u64) -> u64 {
    score / DELAY_SHIFT
}

/// Creation-counter tiebreak recovered from a job id. Auto-generated ids
/// are the `id` counter value; non-numeric custom ids fall back to 0.
#[inline]
pub fn job_counter(job_id: &str) -> u64 {
    job_id.parse().unwrap_or(0)
}
