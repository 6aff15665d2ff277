//! Inter-item throttle policies and the interruptible wait that applies them.
//!
//! Long waits are composed of short sleeps, never one opaque timer, so a stop
//! or pause issued mid-wait is honored within about a second.

use crate::engine::ControlFlags;
use crate::error::EngineError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Granularity of interruptible waits.
const WAIT_TICK: Duration = Duration::from_secs(1);

/// Strategy determining how long the lane waits between items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ThrottlePolicy {
    /// No inter-item delay.
    None,
    /// A fixed small delay; keeps internal bulk mutations from saturating the
    /// downstream store.
    Fixed {
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    /// A delay drawn uniformly from `[min, max]` per item; spreads out sends
    /// on abuse-sensitive external channels so they do not look bursty.
    Jittered {
        #[serde(with = "humantime_serde")]
        min: Duration,
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
}

impl ThrottlePolicy {
    /// Default policy for internal bulk mutations.
    pub fn fixed_default() -> Self {
        ThrottlePolicy::Fixed {
            delay: Duration::from_millis(100),
        }
    }

    /// Default policy for abuse-sensitive external sends.
    pub fn jittered_default() -> Self {
        ThrottlePolicy::Jittered {
            min: Duration::from_secs(15),
            max: Duration::from_secs(40),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            // A zero max would silently disable throttling on a channel that
            // was explicitly configured for jitter.
            ThrottlePolicy::Jittered { min, max } if min > max || max.is_zero() => {
                Err(EngineError::InvalidThrottle {
                    min: *min,
                    max: *max,
                })
            }
            _ => Ok(()),
        }
    }

    /// Draw the next inter-item delay. Pure given the configured bounds.
    pub fn next_delay(&self) -> Duration {
        match self {
            ThrottlePolicy::None => Duration::ZERO,
            ThrottlePolicy::Fixed { delay } => *delay,
            ThrottlePolicy::Jittered { min, max } => {
                if min >= max {
                    *min
                } else {
                    rand::thread_rng().gen_range(*min..=*max)
                }
            }
        }
    }
}

/// Why an interruptible wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Elapsed,
    Stopped,
    /// A pause arrived mid-wait; the remaining delay is forfeited and the
    /// lane's pause checkpoint takes over.
    Paused,
}

/// Sleep for `total`, checking the control flags every tick.
pub(crate) async fn interruptible_wait(total: Duration, flags: &ControlFlags) -> WaitOutcome {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if flags.is_stopped() {
            return WaitOutcome::Stopped;
        }
        if flags.is_paused() {
            return WaitOutcome::Paused;
        }
        let step = remaining.min(WAIT_TICK);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
    if flags.is_stopped() {
        WaitOutcome::Stopped
    } else {
        WaitOutcome::Elapsed
    }
}
