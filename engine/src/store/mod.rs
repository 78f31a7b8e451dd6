//! Transactional key/value store abstraction.
//!
//! The transition procedures assume a store with redis-shaped primitives -
//! hashes, lists, ordered sets, plain sets, expiring scalars and bounded
//! streams - where each compound operation executes atomically.
//!
//! - [`Kv`] exposes the primitives over one keyspace.
//! - [`AtomicStore`] is the atomicity boundary: `run` executes a closure as
//!   one indivisible unit. Every transition procedure performs exactly one
//!   `run` call; a procedure either completes or aborts wholesale.
//! - [`MemoryStore`] is the in-process implementation used by tests and
//!   embedded deployments, serializing procedures behind a single writer.
//!
//! Expiry is lazy and caller-driven: operations that touch expirable keys
//! take `now_ms`, so the store itself never reads the clock.

mod memory;
mod stream;
mod zset;

pub use memory::MemoryStore;
pub use stream::{StreamEntry, StreamId};

use compact_str::CompactString;

/// Primitive operations of the backing store.
///
/// Keys are untyped at this level; the procedures never address one key
/// with two different shapes. An access with the wrong shape behaves as if
/// the key were absent (reads) or overwrites it (writes).
pub trait Kv {
    // ============== Hashes ==============

    fn hset(&mut self, key: &str, fields: &[(&str, &str)]);
    fn hget(&self, key: &str, field: &str) -> Option<String>;
    fn hgetall(&self, key: &str) -> Vec<(CompactString, String)>;
    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> i64;
    fn hdel(&mut self, key: &str, field: &str) -> bool;
    fn hexists(&self, key: &str, field: &str) -> bool;

    // ============== Lists ==============

    fn lpush(&mut self, key: &str, value: &str);
    fn rpush(&mut self, key: &str, value: &str);
    fn lpop(&mut self, key: &str) -> Option<String>;
    fn rpop(&mut self, key: &str) -> Option<String>;
    /// Remove every occurrence of `value`; returns how many were removed.
    fn lrem(&mut self, key: &str, value: &str) -> usize;
    fn llen(&self, key: &str) -> usize;
    /// Head element (the side `lpush` inserts at).
    fn lhead(&self, key: &str) -> Option<String>;
    fn lrange(&self, key: &str) -> Vec<String>;
    /// Keep at most `max_len` elements counted from the head.
    fn ltrim(&mut self, key: &str, max_len: usize);

    // ============== Ordered sets ==============

    fn zadd(&mut self, key: &str, score: u64, member: &str);
    fn zscore(&self, key: &str, member: &str) -> Option<u64>;
    fn zrem(&mut self, key: &str, member: &str) -> bool;
    fn zpopmin(&mut self, key: &str) -> Option<(CompactString, u64)>;
    fn zpeekmin(&self, key: &str) -> Option<(CompactString, u64)>;
    /// Remove and return up to `limit` members scored <= `max_score`.
    fn zpop_below(&mut self, key: &str, max_score: u64, limit: usize)
        -> Vec<(CompactString, u64)>;
    fn zcard(&self, key: &str) -> usize;
    fn zrange(&self, key: &str) -> Vec<(CompactString, u64)>;

    // ============== Sets ==============

    fn sadd(&mut self, key: &str, member: &str) -> bool;
    fn srem(&mut self, key: &str, member: &str) -> bool;
    fn scard(&self, key: &str) -> usize;
    fn smembers(&self, key: &str) -> Vec<CompactString>;

    // ============== Scalars ==============

    fn get(&self, key: &str, now_ms: u64) -> Option<String>;
    fn set_px(&mut self, key: &str, value: &str, ttl_ms: u64, now_ms: u64);
    /// Integer increment; a missing or expired key restarts from zero with
    /// no expiry, an existing key keeps its deadline.
    fn incr(&mut self, key: &str, now_ms: u64) -> i64;
    /// Remaining lifetime in ms: -2 when the key is absent or expired,
    /// -1 when it has no deadline.
    fn pttl(&self, key: &str, now_ms: u64) -> i64;
    fn pexpire(&mut self, key: &str, ttl_ms: u64, now_ms: u64) -> bool;

    // ============== Keys ==============

    fn del(&mut self, key: &str) -> bool;
    fn exists(&self, key: &str) -> bool;

    // ============== Streams ==============

    fn xadd(
        &mut self,
        key: &str,
        now_ms: u64,
        fields: Vec<(CompactString, String)>,
        max_len: usize,
    ) -> StreamId;
    fn xtrim(&mut self, key: &str, max_len: usize) -> usize;
    fn xlen(&self, key: &str) -> usize;
    fn xrange(&self, key: &str) -> Vec<StreamEntry>;
}

/// Atomic execution boundary of a store.
pub trait AtomicStore: Send + Sync {
    /// Run `f` as one indivisible compound operation. No other procedure
    /// observes intermediate state.
    fn run<R>(&self, f: impl FnOnce(&mut dyn Kv) -> R) -> R;
}
