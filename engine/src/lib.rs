//! emberq - core state machine of a distributed job queue.
//!
//! This library implements the atomic transitions that move jobs between
//! waiting, paused, prioritized, delayed, active, waiting-children,
//! completed and failed, executed against a transactional key/value store
//! abstraction. Worker loops, schedulers and network surfaces live outside
//! this crate; their only contract with the core is that they mutate the
//! same store structures under the same invariants.

pub mod protocol;
pub mod queue;
pub mod store;
pub mod types;
