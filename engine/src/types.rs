//! Shared type aliases and time utilities.

use std::hash::BuildHasherDefault;
use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHasher;

/// DashMap with FxHash, used for lock-free per-queue caches.
pub type FxDashMap<K, V> = dashmap::DashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Current wall-clock timestamp in milliseconds.
///
/// The transition procedures never read the clock themselves: callers pass
/// an explicit `now_ms`, which keeps every transition deterministic under
/// test and lets embedders drive simulated time.
#[inline(always)]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
