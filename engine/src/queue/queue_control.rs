//! Pause and resume.
//!
//! The `paused` meta field uses presence semantics: set (any value) means
//! paused, absent means running. It is cleared with a field delete, never
//! written as `false`.

use tracing::debug;

use crate::store::AtomicStore;

use super::manager::QueueEngine;
use super::{delayed, events, markers};

impl<S: AtomicStore> QueueEngine<S> {
    /// Stop handing out jobs: the wait backlog moves wholesale to the
    /// paused list (markers are dropped, order preserved).
    pub fn pause(&self, queue: &str, now_ms: u64) {
        let keys = self.keys(queue);
        self.store().run(|kv| {
            if kv.hexists(&keys.meta, "paused") {
                return;
            }
            for entry in kv.lrange(&keys.wait) {
                if !markers::is_marker(&entry) {
                    kv.rpush(&keys.paused, &entry);
                }
            }
            kv.del(&keys.wait);
            kv.hset(&keys.meta, &[("paused", "1")]);
            events::emit(kv, &keys, now_ms, "paused", &[]);
            debug!(queue, "queue paused");
        });
    }

    /// Reopen the queue: the paused backlog returns to the wait list and
    /// the marker discipline is re-established.
    pub fn resume(&self, queue: &str, now_ms: u64) {
        let keys = self.keys(queue);
        self.store().run(|kv| {
            if !kv.hexists(&keys.meta, "paused") {
                return;
            }
            for entry in kv.lrange(&keys.paused) {
                if !markers::is_marker(&entry) {
                    kv.rpush(&keys.wait, &entry);
                }
            }
            kv.del(&keys.paused);
            kv.hdel(&keys.meta, "paused");
            if kv.zcard(&keys.prioritized) > 0 {
                markers::add_priority_marker(kv, &keys.wait);
            }
            let next_fire = delayed::next_delayed_fire(kv, &keys);
            markers::refresh_delay_marker(kv, &keys.wait, next_fire);
            events::emit(kv, &keys, now_ms, "resumed", &[]);
            debug!(queue, "queue resumed");
        });
    }

    pub fn is_paused(&self, queue: &str) -> bool {
        let keys = self.keys(queue);
        self.store().run(|kv| kv.hexists(&keys.meta, "paused"))
    }
}
