//! Core data model: work items, run state, log entries, and the event stream
//! emitted to observers.

use crate::engine::throttle::ThrottlePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-item lifecycle status. Items move `Pending → Processing → Success|Error`
/// and never leave a terminal status within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    Pending,
    Processing,
    Success,
    Error,
}

/// One queued unit of work (a record to delete, import, or send to).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique within a run; used to key optimistic cache updates.
    pub id: String,
    /// Human-readable label surfaced in progress and log output.
    pub label: String,
    pub status: ItemStatus,
    pub error_detail: Option<String>,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            status: ItemStatus::Pending,
            error_detail: None,
        }
    }
}

/// Run lifecycle status. `Completed`, `Stopped` and `Failed` are terminal;
/// only `dismiss` returns the controller to `Idle` from a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Stopped | RunStatus::Failed
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Paused)
    }
}

/// Outcome tag on a log entry. `Info` marks system entries (run started,
/// stopped by user, finished) as opposed to per-item outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOutcome {
    Success,
    Error,
    Info,
}

/// Append-only, timestamped run log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp captured at append time.
    pub timestamp: String,
    pub subject_label: String,
    pub outcome: LogOutcome,
    pub message: String,
}

impl LogEntry {
    pub fn new(
        subject_label: impl Into<String>,
        outcome: LogOutcome,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            subject_label: subject_label.into(),
            outcome,
            message: message.into(),
        }
    }
}

/// What to do to the read cache when an item succeeds.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEffect {
    /// Leave the cache alone.
    None,
    /// Remove the record keyed by (subject domain, item id).
    Remove,
    /// Merge this patch into the record keyed by (subject domain, item id).
    Patch(serde_json::Value),
}

/// Per-run configuration supplied to `start`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Kind of run, e.g. "bulk-delete", "import", "dispatch".
    pub kind: String,
    /// Logical entity category the run operates on; scopes cache invalidation.
    pub subject_domain: String,
    pub throttle: ThrottlePolicy,
    pub cache_effect: CacheEffect,
    /// Additional cache domains invalidated when the run reaches a terminal
    /// status (e.g. a dashboard aggregate derived from the subject domain).
    pub dependents: Vec<String>,
    /// On a clean `Completed` only, clear the visibility flag after this
    /// delay. `None` keeps the indicator up until dismissed.
    pub auto_hide_after: Option<Duration>,
}

impl RunOptions {
    pub fn new(kind: impl Into<String>, subject_domain: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            subject_domain: subject_domain.into(),
            throttle: ThrottlePolicy::fixed_default(),
            cache_effect: CacheEffect::None,
            dependents: Vec::new(),
            auto_hide_after: Some(Duration::from_secs(2)),
        }
    }

    pub fn throttle(mut self, throttle: ThrottlePolicy) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn cache_effect(mut self, effect: CacheEffect) -> Self {
        self.cache_effect = effect;
        self
    }

    pub fn dependents(mut self, dependents: Vec<String>) -> Self {
        self.dependents = dependents;
        self
    }

    pub fn auto_hide_after(mut self, delay: Option<Duration>) -> Self {
        self.auto_hide_after = delay;
        self
    }
}

/// Mutable run state owned by the controller and written by the lane.
/// Observers only ever see copies of it via [`RunSnapshot`].
#[derive(Debug, Clone)]
pub(crate) struct RunState {
    pub kind: String,
    pub subject_domain: String,
    pub items: Vec<WorkItem>,
    /// Count of items that reached a terminal status (`Success` or `Error`).
    pub progress: usize,
    pub total: usize,
    pub current_label: Option<String>,
    pub status: RunStatus,
    pub log: Vec<LogEntry>,
}

impl RunState {
    pub fn idle() -> Self {
        Self {
            kind: String::new(),
            subject_domain: String::new(),
            items: Vec::new(),
            progress: 0,
            total: 0,
            current_label: None,
            status: RunStatus::Idle,
            log: Vec::new(),
        }
    }

    /// Reinitialize for a new run: all items pending, log cleared.
    pub fn begin(&mut self, kind: String, subject_domain: String, mut items: Vec<WorkItem>) {
        for item in &mut items {
            item.status = ItemStatus::Pending;
            item.error_detail = None;
        }
        self.kind = kind;
        self.subject_domain = subject_domain;
        self.total = items.len();
        self.items = items;
        self.progress = 0;
        self.current_label = None;
        self.status = RunStatus::Running;
        self.log.clear();
    }
}

/// Read-only view of a run handed to observers.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub kind: String,
    pub subject_domain: String,
    pub status: RunStatus,
    pub items: Vec<WorkItem>,
    pub progress: usize,
    pub total: usize,
    pub current_label: Option<String>,
    pub log: Vec<LogEntry>,
    pub visible: bool,
}

/// Events broadcast to push-style observers as a run progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    RunStarted {
        kind: String,
        subject_domain: String,
        total: usize,
    },
    ItemStarted {
        index: usize,
        label: String,
    },
    ItemFinished {
        index: usize,
        label: String,
        outcome: LogOutcome,
        detail: Option<String>,
    },
    Paused,
    Resumed,
    RunFinished {
        status: RunStatus,
    },
    /// A driving-loop error, distinct from any per-item failure.
    Fatal {
        message: String,
    },
}
