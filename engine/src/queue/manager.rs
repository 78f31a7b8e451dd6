//! Core QueueEngine struct, constructors and introspection.

use std::sync::Arc;

use compact_str::CompactString;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::protocol::{Job, JobState, QueueCounts, TransitionError};
use crate::store::{AtomicStore, Kv, MemoryStore, StreamEntry};
use crate::types::FxDashMap;

use super::keys::QueueKeys;
use super::markers;

pub const DEFAULT_PREFIX: &str = "emberq";

/// Entry point to the transition procedures of a store.
///
/// One engine serves every queue of a namespace prefix; queues are
/// addressed by name per call. All state lives in the store - the engine
/// itself only caches key layouts.
pub struct QueueEngine<S: AtomicStore = MemoryStore> {
    store: Arc<S>,
    prefix: CompactString,
    keys: FxDashMap<CompactString, Arc<QueueKeys>>,
}

impl QueueEngine<MemoryStore> {
    /// In-process engine over a fresh memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::default()), DEFAULT_PREFIX)
    }
}

impl Default for QueueEngine<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: AtomicStore> QueueEngine<S> {
    pub fn with_store(store: Arc<S>, prefix: &str) -> Self {
        debug!(prefix, "queue engine created");
        Self {
            store,
            prefix: CompactString::from(prefix),
            keys: FxDashMap::default(),
        }
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Cached key layout of a queue.
    pub(crate) fn keys(&self, queue: &str) -> Arc<QueueKeys> {
        let name = CompactString::from(queue);
        if let Some(keys) = self.keys.get(&name) {
            return Arc::clone(&keys);
        }
        let keys = Arc::new(QueueKeys::new(&self.prefix, queue));
        self.keys.insert(name, Arc::clone(&keys));
        keys
    }

    // ============== Introspection ==============

    /// Typed view of a job hash, if the job exists.
    pub fn get_job(&self, queue: &str, job_id: &str) -> Option<Job> {
        let keys = self.keys(queue);
        self.store.run(|kv| {
            let fields: FxHashMap<CompactString, String> =
                kv.hgetall(&keys.job(job_id)).into_iter().collect();
            if fields.is_empty() {
                None
            } else {
                Some(Job::from_fields(job_id, &fields))
            }
        })
    }

    /// Which of the mutually-exclusive states holds the job right now.
    pub fn job_state(&self, queue: &str, job_id: &str) -> Option<JobState> {
        let keys = self.keys(queue);
        self.store.run(|kv| {
            if kv.zscore(&keys.completed, job_id).is_some() {
                Some(JobState::Completed)
            } else if kv.zscore(&keys.failed, job_id).is_some() {
                Some(JobState::Failed)
            } else if kv.zscore(&keys.delayed, job_id).is_some() {
                Some(JobState::Delayed)
            } else if kv.zscore(&keys.prioritized, job_id).is_some() {
                Some(JobState::Prioritized)
            } else if kv.zscore(&keys.waiting_children, job_id).is_some() {
                Some(JobState::WaitingChildren)
            } else if kv.lrange(&keys.active).iter().any(|e| e == job_id) {
                Some(JobState::Active)
            } else if kv.lrange(&keys.wait).iter().any(|e| e == job_id) {
                Some(JobState::Waiting)
            } else if kv.lrange(&keys.paused).iter().any(|e| e == job_id) {
                Some(JobState::Paused)
            } else {
                None
            }
        })
    }

    /// Per-state population; markers are not counted.
    pub fn counts(&self, queue: &str) -> QueueCounts {
        let keys = self.keys(queue);
        self.store.run(|kv| QueueCounts {
            waiting: real_jobs(kv, &keys.wait),
            paused: real_jobs(kv, &keys.paused),
            prioritized: kv.zcard(&keys.prioritized),
            delayed: kv.zcard(&keys.delayed),
            active: kv.llen(&keys.active),
            waiting_children: kv.zcard(&keys.waiting_children),
            completed: kv.zcard(&keys.completed),
            failed: kv.zcard(&keys.failed),
        })
    }

    /// Snapshot of the queue's event stream, oldest first.
    pub fn events(&self, queue: &str) -> Vec<StreamEntry> {
        let keys = self.keys(queue);
        self.store.run(|kv| kv.xrange(&keys.events))
    }

    /// Cap the event stream length (`meta.opts.maxLenEvents`).
    pub fn set_max_events(&self, queue: &str, max_len: usize) {
        let keys = self.keys(queue);
        self.store.run(|kv| {
            kv.hset(
                &keys.meta,
                &[("opts.maxLenEvents", max_len.to_string().as_str())],
            );
        });
    }
}

/// Current enqueue/dequeue list of the queue: the paused list iff the
/// `paused` meta field is present (any value), else the wait list. The
/// absent/empty distinction matters; the flag is never written as `false`.
pub(crate) fn target_list<'k>(kv: &dyn Kv, keys: &'k QueueKeys) -> (&'k str, bool) {
    if kv.hexists(&keys.meta, "paused") {
        (&keys.paused, true)
    } else {
        (&keys.wait, false)
    }
}

/// Non-marker population of a list.
pub(crate) fn real_jobs(kv: &dyn Kv, key: &str) -> usize {
    kv.lrange(key)
        .iter()
        .filter(|entry| !markers::is_marker(entry))
        .count()
}

/// Shared lock ladder of the privileged transitions: with a real token the
/// lock must exist (-2) and match (-6); on success the lock is released
/// and the job leaves the stalled set.
pub(crate) fn validate_and_release_lock(
    kv: &mut dyn Kv,
    keys: &QueueKeys,
    job_id: &str,
    token: &str,
    now_ms: u64,
) -> Result<(), TransitionError> {
    if token == "0" {
        return Ok(());
    }
    match kv.get(&keys.lock(job_id), now_ms) {
        None => Err(TransitionError::MissingLock),
        Some(held) if held != token => Err(TransitionError::LockMismatch),
        Some(_) => {
            kv.del(&keys.lock(job_id));
            kv.srem(&keys.stalled, job_id);
            Ok(())
        }
    }
}
