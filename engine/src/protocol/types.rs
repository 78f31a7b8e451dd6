//! Core protocol types.
//!
//! Contains job inputs and options, worker options, transition outcomes
//! and the error contract of the transition procedures.

use std::fmt;

use compact_str::CompactString;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Reference from a child job to its parent, possibly in a different queue
/// namespace. `queue_key` is the opaque namespace prefix of the parent's
/// queue (e.g. `emberq:billing`), never derived by string arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    pub id: CompactString,
    pub queue_key: String,
    /// Fail the parent when this child fails terminally.
    #[serde(default)]
    pub fpof: bool,
    /// Drop this child from the parent's dependencies when it fails.
    #[serde(default)]
    pub rdof: bool,
}

impl ParentRef {
    pub fn new(id: &str, queue_key: &str) -> Self {
        Self {
            id: CompactString::from(id),
            queue_key: queue_key.to_string(),
            fpof: false,
            rdof: false,
        }
    }

    /// Full key of the parent job hash.
    #[inline]
    pub fn job_key(&self) -> String {
        format!("{}:{}", self.queue_key, self.id)
    }
}

/// Options attached to a job at creation time; stored verbatim in the job
/// hash under `opts`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOptions {
    /// Custom job id. Ids beginning with `0:` are reserved for markers.
    pub job_id: Option<CompactString>,
    pub priority: u64,
    /// Milliseconds to wait before the job becomes ready.
    pub delay: u64,
    /// Tail insert: the job is served before older waiting jobs.
    pub lifo: bool,
    /// Park the job in waiting-children until its dependencies resolve.
    pub wait_children: bool,
    pub parent: Option<ParentRef>,
    /// Repeat job key (`rjk`), opaque to the core.
    pub repeat_job_key: Option<CompactString>,
}

/// A job to be added: name, pre-serialized payload, options.
///
/// Payload serialization is the caller's concern; the core treats `data`
/// as an opaque string.
#[derive(Debug, Clone, Default)]
pub struct JobInput {
    pub name: CompactString,
    pub data: String,
    pub opts: JobOptions,
}

/// Rate limiter configuration: at most `max` dequeues per `duration_ms`
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max: u64,
    pub duration_ms: u64,
}

/// Worker-side options for acquiring jobs.
#[derive(Debug, Clone)]
pub struct WorkerOpts {
    /// Lease token; the literal `"0"` disables locking.
    pub token: CompactString,
    pub lock_duration_ms: u64,
    pub limiter: Option<RateLimit>,
}

impl WorkerOpts {
    pub fn new(token: &str) -> Self {
        Self {
            token: CompactString::from(token),
            lock_duration_ms: 30_000,
            limiter: None,
        }
    }
}

/// Retention policy for finished jobs.
///
/// `count: Some(0)` removes the job immediately, `None` keeps all;
/// `age_secs` prunes entries older than the given age.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepJobs {
    pub age_secs: Option<u64>,
    pub count: Option<u64>,
}

impl KeepJobs {
    /// Remove the job as soon as it finishes.
    pub fn none() -> Self {
        Self {
            age_secs: None,
            count: Some(0),
        }
    }

    pub fn last(count: u64) -> Self {
        Self {
            age_secs: None,
            count: Some(count),
        }
    }
}

/// Options for the finishing transition.
#[derive(Debug, Clone)]
pub struct FinishOpts {
    pub token: CompactString,
    pub lock_duration_ms: u64,
    pub keep_jobs: KeepJobs,
    /// Configured attempt limit; reaching it on failure emits
    /// `retries-exhausted`.
    pub max_attempts: u32,
    /// Metrics series cap; `None` disables metrics collection.
    pub max_metrics: Option<usize>,
    pub limiter: Option<RateLimit>,
    /// Atomically fetch the next ready job in the same transition.
    pub fetch_next: bool,
}

impl FinishOpts {
    pub fn new(token: &str) -> Self {
        Self {
            token: CompactString::from(token),
            lock_duration_ms: 30_000,
            keep_jobs: KeepJobs::default(),
            max_attempts: 1,
            max_metrics: None,
            limiter: None,
            fetch_next: false,
        }
    }
}

/// Terminal outcome of a finishing transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishTarget {
    Completed { returnvalue: String },
    Failed { reason: String },
}

/// Raw snapshot of an acquired job: its id and the full job hash.
#[derive(Debug, Clone)]
pub struct ActiveJob {
    pub id: CompactString,
    pub fields: FxHashMap<CompactString, String>,
}

impl ActiveJob {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Result of a dequeue attempt - the wire tuple
/// `(jobHash, jobId, rateLimitTtl, nextDelayFireTime)` as an enum.
#[derive(Debug, Clone)]
pub enum PullOutcome {
    /// A job was moved to active and leased.
    Job(Box<ActiveJob>),
    /// The rate limiter is saturated for another `expire_in_ms`.
    RateLimited { expire_in_ms: u64 },
    /// Nothing ready; `next_ready_at` is the next delayed fire time in ms,
    /// 0 when no delayed job is scheduled.
    Empty { next_ready_at: u64 },
}

impl PullOutcome {
    /// The acquired job, if any. Convenience for workers and tests.
    pub fn into_job(self) -> Option<ActiveJob> {
        match self {
            PullOutcome::Job(job) => Some(*job),
            _ => None,
        }
    }
}

/// Logical state of a job inside its queue namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Waiting,
    Paused,
    Prioritized,
    Delayed,
    Active,
    WaitingChildren,
    Completed,
    Failed,
}

/// Per-state population of a queue. Markers are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub waiting: usize,
    pub paused: usize,
    pub prioritized: usize,
    pub delayed: usize,
    pub active: usize,
    pub waiting_children: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.waiting
            + self.paused
            + self.prioritized
            + self.delayed
            + self.active
            + self.waiting_children
            + self.completed
            + self.failed
    }
}

/// Typed view of a job hash.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: CompactString,
    pub name: CompactString,
    pub data: String,
    pub opts: JobOptions,
    pub timestamp: u64,
    pub delay: u64,
    pub priority: u64,
    pub attempts_made: u32,
    pub processed_on: Option<u64>,
    pub finished_on: Option<u64>,
    pub returnvalue: Option<String>,
    pub failed_reason: Option<String>,
    pub parent: Option<ParentRef>,
}

impl Job {
    /// Rebuild the typed view from raw hash fields. Absent numeric fields
    /// default to zero; malformed optional JSON is dropped.
    pub fn from_fields(id: &str, fields: &FxHashMap<CompactString, String>) -> Self {
        fn num<T: std::str::FromStr + Default>(
            fields: &FxHashMap<CompactString, String>,
            name: &str,
        ) -> T {
            fields
                .get(name)
                .and_then(|v| v.parse().ok())
                .unwrap_or_default()
        }

        Self {
            id: CompactString::from(id),
            name: fields
                .get("name")
                .map(|v| CompactString::from(v.as_str()))
                .unwrap_or_default(),
            data: fields.get("data").cloned().unwrap_or_default(),
            opts: fields
                .get("opts")
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_default(),
            timestamp: num(fields, "timestamp"),
            delay: num(fields, "delay"),
            priority: num(fields, "priority"),
            attempts_made: num(fields, "attemptsMade"),
            processed_on: fields.get("processedOn").and_then(|v| v.parse().ok()),
            finished_on: fields.get("finishedOn").and_then(|v| v.parse().ok()),
            returnvalue: fields.get("returnvalue").cloned(),
            failed_reason: fields.get("failedReason").cloned(),
            parent: fields
                .get("parent")
                .and_then(|raw| serde_json::from_str(raw).ok()),
        }
    }
}

/// Error kinds of the transition procedures. The numeric codes reflect the
/// external contract and are never retried inside a procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Job hash absent on a transition that requires it (-1).
    MissingJob,
    /// A token was supplied but no lock exists (-2).
    MissingLock,
    /// Job not in the state the transition moves it out of (-3).
    NotInState,
    /// Finish requested while dependencies remain (-4).
    PendingDependencies,
    /// Referenced parent job does not exist (-5).
    MissingParent,
    /// Supplied token does not own the lock (-6).
    LockMismatch,
    /// User-supplied id collides with the marker namespace (`0:` prefix).
    ReservedJobId(CompactString),
}

impl TransitionError {
    /// External status code, where one exists.
    pub fn code(&self) -> Option<i32> {
        match self {
            TransitionError::MissingJob => Some(-1),
            TransitionError::MissingLock => Some(-2),
            TransitionError::NotInState => Some(-3),
            TransitionError::PendingDependencies => Some(-4),
            TransitionError::MissingParent => Some(-5),
            TransitionError::LockMismatch => Some(-6),
            TransitionError::ReservedJobId(_) => None,
        }
    }
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::MissingJob => write!(f, "missing job"),
            TransitionError::MissingLock => write!(f, "missing lock"),
            TransitionError::NotInState => write!(f, "job not in expected state"),
            TransitionError::PendingDependencies => write!(f, "job has pending dependencies"),
            TransitionError::MissingParent => write!(f, "missing parent job"),
            TransitionError::LockMismatch => write!(f, "lock is held by another token"),
            TransitionError::ReservedJobId(id) => {
                write!(f, "job id '{}' is reserved for markers", id)
            }
        }
    }
}

impl std::error::Error for TransitionError {}
