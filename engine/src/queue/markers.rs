//! Sentinel markers in the target list.
//!
//! Workers block on a plain list pop; markers are the only mechanism that
//! wakes them for arrivals the list itself cannot show. Entries beginning
//! with `0:` are reserved: `0:0` signals a prioritized arrival, `0:<ms>`
//! the next delayed fire time. A reader popping a marker discards it and
//! retries (or sleeps until the stated time).

use crate::store::Kv;

pub const MARKER_PREFIX: &str = "0:";
pub const PRIORITY_MARKER: &str = "0:0";

#[inline]
pub fn is_marker(entry: &str) -> bool {
    entry.starts_with(MARKER_PREFIX)
}

/// After a prioritized insert: wake blocked workers when the target list
/// would otherwise stay silent.
pub(crate) fn add_priority_marker(kv: &mut dyn Kv, target: &str) {
    if kv.llen(target) == 0 {
        kv.lpush(target, PRIORITY_MARKER);
    }
}

/// Keep the delay marker at the target head consistent with the delayed
/// set: present iff the list holds no real jobs and something is
/// scheduled, always carrying the earliest fire time.
pub(crate) fn refresh_delay_marker(kv: &mut dyn Kv, target: &str, next_fire_ms: Option<u64>) {
    let head = kv.lhead(target);
    match next_fire_ms {
        Some(next) => match head {
            None => kv.lpush(target, &format!("0:{next}")),
            Some(head) if is_marker(&head) && head != PRIORITY_MARKER => {
                let stale = head[MARKER_PREFIX.len()..]
                    .parse::<u64>()
                    .map_or(true, |at| at > next);
                if stale {
                    kv.lpop(target);
                    kv.lpush(target, &format!("0:{next}"));
                }
            }
            // A real job (or priority marker) at the head already wakes
            // the worker.
            Some(_) => {}
        },
        None => {
            // Nothing scheduled: a leftover delay marker would put the
            // worker to sleep for no reason.
            if let Some(head) = head {
                if is_marker(&head) && head != PRIORITY_MARKER {
                    kv.lpop(target);
                }
            }
        }
    }
}

/// Drop a leading sentinel ahead of pushing a real job.
pub(crate) fn strip_leading_marker(kv: &mut dyn Kv, target: &str) {
    if let Some(head) = kv.lhead(target) {
        if is_marker(&head) {
            kv.lpop(target);
        }
    }
}
