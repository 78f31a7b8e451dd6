//! Minute-granularity throughput series for finished jobs.
//!
//! Per target (`completed`/`failed`) a metrics hash keeps `prevTS`,
//! `prevCount` and `count`; the companion `:data` list holds one delta per
//! whole minute, newest first, capped at the configured size.

use crate::store::Kv;

use super::keys::QueueKeys;

const MINUTE_MS: u64 = 60_000;

pub(crate) fn collect(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    target: &str,
    max_size: usize,
    now_ms: u64,
) {
    let metrics_key = keys.metrics(target);
    let data_key = keys.metrics_data(target);

    let count = kv.hincrby(&metrics_key, "count", 1);
    let Some(prev_ts) = kv
        .hget(&metrics_key, "prevTS")
        .and_then(|v| v.parse::<u64>().ok())
    else {
        // First finish opens the series.
        kv.hset(
            &metrics_key,
            &[("prevTS", now_ms.to_string().as_str()), ("prevCount", "0")],
        );
        return;
    };

    let elapsed = now_ms.saturating_sub(prev_ts);
    if elapsed < MINUTE_MS {
        return;
    }

    let prev_count = kv
        .hget(&metrics_key, "prevCount")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    let delta = count - prev_count;
    kv.lpush(&data_key, &delta.to_string());
    let minutes = elapsed / MINUTE_MS;
    // Zero-fill the minutes in which nothing finished.
    for _ in 1..minutes {
        kv.lpush(&data_key, "0");
    }
    kv.ltrim(&data_key, max_size);
    kv.hset(
        &metrics_key,
        &[
            ("prevTS", (prev_ts + minutes * MINUTE_MS).to_string().as_str()),
            ("prevCount", count.to_string().as_str()),
        ],
    );
}
