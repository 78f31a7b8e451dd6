//! External contract of the queue core.
//!
//! Inputs, outcomes, events and error codes exchanged with producers and
//! workers. Everything here is store-independent.

mod types;

pub use types::{
    ActiveJob, FinishOpts, FinishTarget, Job, JobInput, JobOptions, JobState, KeepJobs,
    ParentRef, PullOutcome, QueueCounts, RateLimit, TransitionError, WorkerOpts,
};
