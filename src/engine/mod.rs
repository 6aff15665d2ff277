//! The execution lane: a single sequential worker that consumes the run's
//! items in input order, applying the per-item operation between cooperative
//! pause/stop checkpoints.

pub mod throttle;

use crate::cache::CacheReconciler;
use crate::error::EngineError;
use crate::model::{
    CacheEffect, ItemStatus, LogEntry, LogOutcome, RunEvent, RunOptions, RunState, RunStatus,
    WorkItem,
};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use throttle::interruptible_wait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// How often the lane re-checks the flags while paused.
const PAUSE_POLL: Duration = Duration::from_millis(500);

/// Event channel capacity; slow subscribers past this lag lose old events.
const EVENT_CAPACITY: usize = 256;

/// Per-item operation invoked by the lane. The future may suspend on
/// arbitrary I/O; the lane awaits it to completion before moving on.
pub type ItemOperation =
    Arc<dyn Fn(WorkItem) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Process-wide control cells written by controller actions and polled live
/// by the lane at every checkpoint. Never captured by value.
#[derive(Debug, Default)]
pub struct ControlFlags {
    paused: AtomicBool,
    stopped: AtomicBool,
}

impl ControlFlags {
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn set_stopped(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.paused.store(false, Ordering::Relaxed);
        self.stopped.store(false, Ordering::Relaxed);
    }
}

/// State shared between the controller, the lane task, and observers.
pub(crate) struct Shared {
    pub state: Mutex<RunState>,
    pub flags: ControlFlags,
    pub events: broadcast::Sender<RunEvent>,
    pub visible: AtomicBool,
    /// Bumped once per `start`; deferred work spawned for one run (the
    /// auto-hide timer) checks it before touching state a later run owns.
    pub generation: AtomicU64,
}

impl Shared {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(RunState::idle()),
            flags: ControlFlags::default(),
            events,
            visible: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub fn emit(&self, event: RunEvent) {
        // No receivers is fine; observers are optional.
        let _ = self.events.send(event);
    }

    /// Lock for controller/observer paths: a poisoning panic elsewhere must
    /// not take down command handling, so recover the guard.
    pub fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Lock for the lane: poisoning here is a driving-loop fault and aborts
    /// the run as fatal.
    pub fn try_state(&self) -> Result<MutexGuard<'_, RunState>, EngineError> {
        self.state.lock().map_err(|_| EngineError::StatePoisoned)
    }
}

/// Drive one run to a terminal status.
///
/// Checkpoint order per item: stop, pause poll, process, throttle wait. A
/// per-item failure is recorded and the run continues; only a driving-loop
/// error (`Err` here) aborts the run.
pub(crate) async fn run_lane(
    shared: Arc<Shared>,
    operation: ItemOperation,
    cache: Arc<dyn CacheReconciler>,
    options: RunOptions,
) -> Result<RunStatus, EngineError> {
    let total = shared.try_state()?.total;
    let generation = shared.generation.load(Ordering::Relaxed);
    let mut stopped_early = false;

    for index in 0..total {
        if shared.flags.is_stopped() {
            stopped_early = true;
            break;
        }
        if shared.flags.is_paused() {
            debug!(index, "lane paused, polling");
            while shared.flags.is_paused() && !shared.flags.is_stopped() {
                tokio::time::sleep(PAUSE_POLL).await;
            }
            if shared.flags.is_stopped() {
                stopped_early = true;
                break;
            }
        }

        let item = {
            let mut state = shared.try_state()?;
            state.items[index].status = ItemStatus::Processing;
            state.current_label = Some(state.items[index].label.clone());
            state.items[index].clone()
        };
        shared.emit(RunEvent::ItemStarted {
            index,
            label: item.label.clone(),
        });

        match (operation)(item.clone()).await {
            Ok(()) => {
                {
                    let mut state = shared.try_state()?;
                    state.items[index].status = ItemStatus::Success;
                    state.progress += 1;
                    state
                        .log
                        .push(LogEntry::new(&item.label, LogOutcome::Success, "done"));
                }
                match &options.cache_effect {
                    CacheEffect::None => {}
                    CacheEffect::Remove => {
                        cache.optimistic_remove(&options.subject_domain, &item.id)
                    }
                    CacheEffect::Patch(patch) => {
                        cache.optimistic_patch(&options.subject_domain, &item.id, patch)
                    }
                }
                shared.emit(RunEvent::ItemFinished {
                    index,
                    label: item.label.clone(),
                    outcome: LogOutcome::Success,
                    detail: None,
                });
            }
            Err(e) => {
                let detail = format!("{e:#}");
                warn!(index, label = %item.label, error = %detail, "item failed");
                {
                    let mut state = shared.try_state()?;
                    state.items[index].status = ItemStatus::Error;
                    state.items[index].error_detail = Some(detail.clone());
                    state.progress += 1;
                    state
                        .log
                        .push(LogEntry::new(&item.label, LogOutcome::Error, &detail));
                }
                shared.emit(RunEvent::ItemFinished {
                    index,
                    label: item.label.clone(),
                    outcome: LogOutcome::Error,
                    detail: Some(detail),
                });
            }
        }

        if index + 1 < total && !shared.flags.is_stopped() {
            let delay = options.throttle.next_delay();
            if !delay.is_zero() {
                // Stop and pause are both picked up at the top of the next
                // iteration; the wait only needs to return promptly.
                let _ = interruptible_wait(delay, &shared.flags).await;
            }
        }
    }

    let status = {
        let mut state = shared.try_state()?;
        let status = if stopped_early {
            RunStatus::Stopped
        } else if state.items.iter().all(|i| i.status == ItemStatus::Error) {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        state.status = status;
        state.current_label = None;
        let message = match status {
            RunStatus::Stopped => "run stopped by user",
            RunStatus::Failed => "run finished: every item failed",
            _ => "run completed",
        };
        state.log.push(LogEntry::new("run", LogOutcome::Info, message));
        status
    };

    cache.invalidate(&options.subject_domain);
    for dependent in &options.dependents {
        cache.invalidate(dependent);
    }

    info!(
        kind = %options.kind,
        subject_domain = %options.subject_domain,
        ?status,
        "run finished"
    );
    shared.emit(RunEvent::RunFinished { status });

    if status == RunStatus::Completed {
        if let Some(delay) = options.auto_hide_after {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                // A dismiss or a newer run in the meantime owns the
                // visibility flag; only hide if we are still that run.
                if shared.generation.load(Ordering::Relaxed) == generation
                    && shared.state().status == RunStatus::Completed
                {
                    shared.visible.store(false, Ordering::Relaxed);
                }
            });
        }
    }

    Ok(status)
}
