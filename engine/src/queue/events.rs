//! Event stream emission and trimming.
//!
//! Every transition appends to the queue's `events` stream. The stream is
//! capped by `meta.opts.maxLenEvents` (default 10000) with trimming
//! applied on every append.

use compact_str::CompactString;

use crate::store::Kv;

use super::keys::QueueKeys;

pub(crate) const DEFAULT_MAX_EVENTS: usize = 10_000;

pub(crate) fn max_events(kv: &dyn Kv, keys: &QueueKeys) -> usize {
    kv.hget(&keys.meta, "opts.maxLenEvents")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_EVENTS)
}

/// Append one lifecycle event: `event` plus optional extras.
pub(crate) fn emit(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    now_ms: u64,
    event: &str,
    extras: &[(&str, &str)],
) {
    let max = max_events(kv, keys);
    let mut fields: Vec<(CompactString, String)> = Vec::with_capacity(extras.len() + 1);
    fields.push((CompactString::const_new("event"), event.to_string()));
    for (name, value) in extras {
        fields.push((CompactString::from(*name), (*value).to_string()));
    }
    kv.xadd(&keys.events, now_ms, fields, max);
}

/// Explicit trim pass, run before a burst of finish-path emissions.
pub(crate) fn trim_events(kv: &mut dyn Kv, keys: &QueueKeys) {
    let max = max_events(kv, keys);
    kv.xtrim(&keys.events, max);
}
