//! bulklane: a cancelable, pausable, single-lane engine for long-running
//! bulk operations (batched deletions, imports, rate-limited outbound
//! campaigns).
//!
//! A [`RunController`] owns one sequential execution lane. Callers hand it a
//! list of [`WorkItem`]s, an async per-item operation, and [`RunOptions`]
//! (throttle policy, cache hook wiring, subject domain); the run then
//! executes in the background, outliving the caller, while observers follow
//! it through snapshots or the broadcast event stream. Pause, resume, and
//! stop are cooperative: flags polled at every suspension point, including
//! inside long jittered throttle waits.
//!
//! The [`dedup`] module is a pure record-reconciliation scorer used to
//! classify candidates as duplicate/similar/new before they are enqueued.

pub mod cache;
pub mod cli;
pub mod controller;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod model;

pub use cache::{CacheReconciler, MemoryCache, NoopCache};
pub use controller::RunController;
pub use engine::throttle::ThrottlePolicy;
pub use error::EngineError;
pub use model::{
    CacheEffect, ItemStatus, LogEntry, LogOutcome, RunEvent, RunOptions, RunSnapshot, RunStatus,
    WorkItem,
};
