//! Run lifecycle controller.
//!
//! Owns the run state, control flags, and event channel for one execution
//! lane. The controller is a long-lived service: callers that launch a run
//! may go away while the run keeps executing and reporting progress, and any
//! observer can re-attach later via [`RunController::snapshot`] or
//! [`RunController::subscribe`].

use crate::cache::{CacheReconciler, NoopCache};
use crate::engine::{run_lane, ItemOperation, Shared};
use crate::error::EngineError;
use crate::model::{LogEntry, LogOutcome, RunEvent, RunOptions, RunSnapshot, RunStatus, WorkItem};
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

type LaneHandle = JoinHandle<Result<RunStatus, EngineError>>;

/// Controller for a single execution lane. One run at a time; concurrent
/// domains get independent controllers, never interleaved runs on one.
pub struct RunController {
    shared: Arc<Shared>,
    cache: Arc<dyn CacheReconciler>,
    handle: Mutex<Option<LaneHandle>>,
}

impl Default for RunController {
    fn default() -> Self {
        Self::new()
    }
}

impl RunController {
    /// Controller with no cache wired; the engine is correct without one.
    pub fn new() -> Self {
        Self::with_cache(Arc::new(NoopCache))
    }

    pub fn with_cache(cache: Arc<dyn CacheReconciler>) -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            cache,
            handle: Mutex::new(None),
        }
    }

    /// Start a run over `items`, applying `operation` to each in order.
    ///
    /// Returns without blocking once the lane task is spawned; the run then
    /// outlives the caller. Fails synchronously with [`EngineError::EmptyQueue`]
    /// on an empty list and with [`EngineError::RunActive`] while a previous
    /// run is still `Running` or `Paused`; a live run is never reset out
    /// from under its lane.
    ///
    /// Must be called within a tokio runtime.
    pub fn start<F, Fut>(
        &self,
        items: Vec<WorkItem>,
        operation: F,
        options: RunOptions,
    ) -> Result<(), EngineError>
    where
        F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if items.is_empty() {
            return Err(EngineError::EmptyQueue);
        }
        options.throttle.validate()?;

        let total = items.len();
        {
            let mut state = self.shared.state();
            if state.status.is_active() {
                return Err(EngineError::RunActive);
            }
            self.shared.flags.reset();
            self.shared.generation.fetch_add(1, Ordering::Relaxed);
            state.begin(options.kind.clone(), options.subject_domain.clone(), items);
        }
        self.shared.visible.store(true, Ordering::Relaxed);

        info!(
            kind = %options.kind,
            subject_domain = %options.subject_domain,
            total,
            "run started"
        );
        self.shared.emit(RunEvent::RunStarted {
            kind: options.kind.clone(),
            subject_domain: options.subject_domain.clone(),
            total,
        });

        let operation: ItemOperation = Arc::new(move |item| operation(item).boxed());
        let shared = Arc::clone(&self.shared);
        let cache = Arc::clone(&self.cache);
        let handle = tokio::spawn(async move {
            match run_lane(Arc::clone(&shared), operation, cache, options).await {
                Ok(status) => Ok(status),
                Err(e) => {
                    // Driving-loop fault: items not yet reached stay Pending.
                    error!(error = %e, "lane aborted");
                    let message = format!("fatal: {e}");
                    {
                        let mut state = shared.state();
                        state.status = RunStatus::Failed;
                        state.current_label = None;
                        state
                            .log
                            .push(LogEntry::new("run", LogOutcome::Error, &message));
                    }
                    shared.emit(RunEvent::Fatal { message });
                    Err(e)
                }
            }
        });
        *self.handle.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        Ok(())
    }

    /// Pause the run at its next checkpoint. Effective only from `Running`;
    /// returns whether anything changed.
    pub fn pause(&self) -> bool {
        let mut state = self.shared.state();
        if state.status != RunStatus::Running {
            return false;
        }
        state.status = RunStatus::Paused;
        self.shared.flags.set_paused(true);
        drop(state);
        info!("run paused");
        self.shared.emit(RunEvent::Paused);
        true
    }

    /// Resume a paused run. Effective only from `Paused`.
    pub fn resume(&self) -> bool {
        let mut state = self.shared.state();
        if state.status != RunStatus::Paused {
            return false;
        }
        state.status = RunStatus::Running;
        self.shared.flags.set_paused(false);
        drop(state);
        info!("run resumed");
        self.shared.emit(RunEvent::Resumed);
        true
    }

    /// Request a stop. Honored at the lane's next checkpoint, including
    /// mid-throttle-wait and mid-pause-poll; the in-flight item is allowed
    /// to finish. Returns whether a run was active to stop.
    pub fn stop(&self) -> bool {
        let state = self.shared.state();
        if !state.status.is_active() {
            return false;
        }
        drop(state);
        info!("stop requested");
        self.shared.flags.set_stopped();
        true
    }

    /// Clear a terminal (or idle) run back to `Idle`, discarding items and
    /// log. Rejected while a run is active.
    pub fn dismiss(&self) -> Result<(), EngineError> {
        let mut state = self.shared.state();
        if state.status.is_active() {
            return Err(EngineError::RunActive);
        }
        *state = crate::model::RunState::idle();
        drop(state);
        self.shared.flags.reset();
        self.shared.visible.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Flip the progress-indicator visibility flag; returns the new value.
    pub fn toggle_visibility(&self) -> bool {
        let previous = self.shared.visible.fetch_xor(true, Ordering::Relaxed);
        !previous
    }

    pub fn is_visible(&self) -> bool {
        self.shared.visible.load(Ordering::Relaxed)
    }

    /// Pull-style observation: a consistent copy of the current run state.
    pub fn snapshot(&self) -> RunSnapshot {
        let state = self.shared.state();
        RunSnapshot {
            kind: state.kind.clone(),
            subject_domain: state.subject_domain.clone(),
            status: state.status,
            items: state.items.clone(),
            progress: state.progress,
            total: state.total,
            current_label: state.current_label.clone(),
            log: state.log.clone(),
            visible: self.shared.visible.load(Ordering::Relaxed),
        }
    }

    pub fn status(&self) -> RunStatus {
        self.shared.state().status
    }

    /// Push-style observation: live run events. Receivers that fall behind
    /// the channel capacity miss the oldest events but can always resync
    /// from a snapshot.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.shared.events.subscribe()
    }

    /// Await the current lane, surfacing a fatal driving-loop error to the
    /// caller's side. Resolves immediately with the current status when no
    /// lane is in flight.
    pub async fn join(&self) -> Result<RunStatus, EngineError> {
        let handle = self.handle.lock().unwrap_or_else(|p| p.into_inner()).take();
        match handle {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(EngineError::LaneFailed(e.to_string())),
            },
            None => Ok(self.shared.state().status),
        }
    }
}
