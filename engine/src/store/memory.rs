//! In-process store implementation.
//!
//! One keyspace behind a `parking_lot::RwLock`; `run` takes the write lock
//! for the whole closure, which is exactly the serialization model of the
//! original server-side scripts: one procedure at a time per store.

use std::collections::VecDeque;

use compact_str::CompactString;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use super::stream::{Stream, StreamEntry, StreamId};
use super::zset::ZSet;
use super::{AtomicStore, Kv};

#[derive(Debug)]
struct Scalar {
    value: String,
    expires_at: Option<u64>,
}

impl Scalar {
    #[inline]
    fn live(&self, now_ms: u64) -> bool {
        self.expires_at.map_or(true, |at| now_ms < at)
    }
}

#[derive(Debug)]
enum Value {
    Hash(FxHashMap<CompactString, String>),
    List(VecDeque<String>),
    Sorted(ZSet),
    Set(FxHashSet<CompactString>),
    Scalar(Scalar),
    Stream(Stream),
}

#[derive(Default)]
struct Keyspace {
    entries: FxHashMap<String, Value>,
}

macro_rules! typed_mut {
    ($name:ident, $variant:ident, $ty:ty, $new:expr) => {
        fn $name(&mut self, key: &str) -> &mut $ty {
            let slot = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| Value::$variant($new));
            if !matches!(slot, Value::$variant(_)) {
                *slot = Value::$variant($new);
            }
            match slot {
                Value::$variant(v) => v,
                _ => unreachable!(),
            }
        }
    };
}

macro_rules! typed_ref {
    ($name:ident, $variant:ident, $ty:ty) => {
        fn $name(&self, key: &str) -> Option<&$ty> {
            match self.entries.get(key) {
                Some(Value::$variant(v)) => Some(v),
                _ => None,
            }
        }
    };
}

impl Keyspace {
    typed_mut!(hash_mut, Hash, FxHashMap<CompactString, String>, FxHashMap::default());
    typed_mut!(list_mut, List, VecDeque<String>, VecDeque::new());
    typed_mut!(zset_mut, Sorted, ZSet, ZSet::default());
    typed_mut!(set_mut, Set, FxHashSet<CompactString>, FxHashSet::default());
    typed_mut!(stream_mut, Stream, Stream, Stream::default());

    typed_ref!(hash_ref, Hash, FxHashMap<CompactString, String>);
    typed_ref!(list_ref, List, VecDeque<String>);
    typed_ref!(zset_ref, Sorted, ZSet);
    typed_ref!(set_ref, Set, FxHashSet<CompactString>);
    typed_ref!(stream_ref, Stream, Stream);

    fn scalar_ref(&self, key: &str, now_ms: u64) -> Option<&Scalar> {
        match self.entries.get(key) {
            Some(Value::Scalar(s)) if s.live(now_ms) => Some(s),
            _ => None,
        }
    }
}

impl Kv for Keyspace {
    fn hset(&mut self, key: &str, fields: &[(&str, &str)]) {
        let hash = self.hash_mut(key);
        for (field, value) in fields {
            hash.insert(CompactString::from(*field), (*value).to_string());
        }
    }

    fn hget(&self, key: &str, field: &str) -> Option<String> {
        self.hash_ref(key).and_then(|h| h.get(field).cloned())
    }

    fn hgetall(&self, key: &str) -> Vec<(CompactString, String)> {
        self.hash_ref(key)
            .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> i64 {
        let hash = self.hash_mut(key);
        let current = hash
            .get(field)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + delta;
        hash.insert(CompactString::from(field), next.to_string());
        next
    }

    fn hdel(&mut self, key: &str, field: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(Value::Hash(h)) => h.remove(field).is_some(),
            _ => false,
        }
    }

    fn hexists(&self, key: &str, field: &str) -> bool {
        self.hash_ref(key).is_some_and(|h| h.contains_key(field))
    }

    fn lpush(&mut self, key: &str, value: &str) {
        self.list_mut(key).push_front(value.to_string());
    }

    fn rpush(&mut self, key: &str, value: &str) {
        self.list_mut(key).push_back(value.to_string());
    }

    fn lpop(&mut self, key: &str) -> Option<String> {
        match self.entries.get_mut(key) {
            Some(Value::List(l)) => l.pop_front(),
            _ => None,
        }
    }

    fn rpop(&mut self, key: &str) -> Option<String> {
        match self.entries.get_mut(key) {
            Some(Value::List(l)) => l.pop_back(),
            _ => None,
        }
    }

    fn lrem(&mut self, key: &str, value: &str) -> usize {
        match self.entries.get_mut(key) {
            Some(Value::List(l)) => {
                let before = l.len();
                l.retain(|v| v != value);
                before - l.len()
            }
            _ => 0,
        }
    }

    fn llen(&self, key: &str) -> usize {
        self.list_ref(key).map_or(0, |l| l.len())
    }

    fn lhead(&self, key: &str) -> Option<String> {
        self.list_ref(key).and_then(|l| l.front().cloned())
    }

    fn lrange(&self, key: &str) -> Vec<String> {
        self.list_ref(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn ltrim(&mut self, key: &str, max_len: usize) {
        if let Some(Value::List(l)) = self.entries.get_mut(key) {
            l.truncate(max_len);
        }
    }

    fn zadd(&mut self, key: &str, score: u64, member: &str) {
        self.zset_mut(key).insert(member, score);
    }

    fn zscore(&self, key: &str, member: &str) -> Option<u64> {
        self.zset_ref(key).and_then(|z| z.score(member))
    }

    fn zrem(&mut self, key: &str, member: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(Value::Sorted(z)) => z.remove(member),
            _ => false,
        }
    }

    fn zpopmin(&mut self, key: &str) -> Option<(CompactString, u64)> {
        match self.entries.get_mut(key) {
            Some(Value::Sorted(z)) => z.pop_min(),
            _ => None,
        }
    }

    fn zpeekmin(&self, key: &str) -> Option<(CompactString, u64)> {
        self.zset_ref(key).and_then(|z| z.peek_min())
    }

    fn zpop_below(
        &mut self,
        key: &str,
        max_score: u64,
        limit: usize,
    ) -> Vec<(CompactString, u64)> {
        match self.entries.get_mut(key) {
            Some(Value::Sorted(z)) => z.pop_below(max_score, limit),
            _ => Vec::new(),
        }
    }

    fn zcard(&self, key: &str) -> usize {
        self.zset_ref(key).map_or(0, |z| z.len())
    }

    fn zrange(&self, key: &str) -> Vec<(CompactString, u64)> {
        self.zset_ref(key)
            .map(|z| z.iter().map(|(m, s)| (m.clone(), s)).collect())
            .unwrap_or_default()
    }

    fn sadd(&mut self, key: &str, member: &str) -> bool {
        self.set_mut(key).insert(CompactString::from(member))
    }

    fn srem(&mut self, key: &str, member: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(Value::Set(s)) => s.remove(member),
            _ => false,
        }
    }

    fn scard(&self, key: &str) -> usize {
        self.set_ref(key).map_or(0, |s| s.len())
    }

    fn smembers(&self, key: &str) -> Vec<CompactString> {
        self.set_ref(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn get(&self, key: &str, now_ms: u64) -> Option<String> {
        self.scalar_ref(key, now_ms).map(|s| s.value.clone())
    }

    fn set_px(&mut self, key: &str, value: &str, ttl_ms: u64, now_ms: u64) {
        self.entries.insert(
            key.to_string(),
            Value::Scalar(Scalar {
                value: value.to_string(),
                expires_at: Some(now_ms + ttl_ms),
            }),
        );
    }

    fn incr(&mut self, key: &str, now_ms: u64) -> i64 {
        let (next, expires_at) = match self.entries.get(key) {
            Some(Value::Scalar(s)) if s.live(now_ms) => {
                (s.value.parse::<i64>().unwrap_or(0) + 1, s.expires_at)
            }
            _ => (1, None),
        };
        self.entries.insert(
            key.to_string(),
            Value::Scalar(Scalar {
                value: next.to_string(),
                expires_at,
            }),
        );
        next
    }

    fn pttl(&self, key: &str, now_ms: u64) -> i64 {
        match self.scalar_ref(key, now_ms) {
            Some(Scalar {
                expires_at: Some(at),
                ..
            }) => (*at - now_ms) as i64,
            Some(_) => -1,
            None => -2,
        }
    }

    fn pexpire(&mut self, key: &str, ttl_ms: u64, now_ms: u64) -> bool {
        match self.entries.get_mut(key) {
            Some(Value::Scalar(s)) if s.live(now_ms) => {
                s.expires_at = Some(now_ms + ttl_ms);
                true
            }
            _ => false,
        }
    }

    fn del(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn xadd(
        &mut self,
        key: &str,
        now_ms: u64,
        fields: Vec<(CompactString, String)>,
        max_len: usize,
    ) -> StreamId {
        let stream = self.stream_mut(key);
        let id = stream.append(now_ms, fields);
        stream.trim_to(max_len);
        id
    }

    fn xtrim(&mut self, key: &str, max_len: usize) -> usize {
        match self.entries.get_mut(key) {
            Some(Value::Stream(s)) => s.trim_to(max_len),
            _ => 0,
        }
    }

    fn xlen(&self, key: &str) -> usize {
        self.stream_ref(key).map_or(0, |s| s.len())
    }

    fn xrange(&self, key: &str) -> Vec<StreamEntry> {
        self.stream_ref(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Store shared by every producer and worker of a process.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Keyspace>,
}

impl AtomicStore for MemoryStore {
    fn run<R>(&self, f: impl FnOnce(&mut dyn Kv) -> R) -> R {
        let mut guard = self.inner.write();
        f(&mut *guard)
    }
}
