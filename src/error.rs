//! Typed errors for the engine API surface.
//!
//! Per-item operation failures are plain [`anyhow::Error`]s and never reach
//! this enum; these are the errors the controller itself can report.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `start` was called with no items.
    #[error("cannot start a run with an empty item list")]
    EmptyQueue,

    /// `start` or `dismiss` was called while a run is still active.
    #[error("a run is already active; stop it or wait for it to finish")]
    RunActive,

    /// A jittered throttle was configured with an inverted or empty range.
    #[error("invalid throttle bounds: min {min:?} > max {max:?}")]
    InvalidThrottle { min: Duration, max: Duration },

    /// The shared run state lock was poisoned by a panic; the lane aborts.
    #[error("run state lock poisoned")]
    StatePoisoned,

    /// The lane task itself panicked or was aborted before finishing.
    #[error("lane task failed: {0}")]
    LaneFailed(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
