//! Sync pipeline models and cadence constants.

use serde::{Deserialize, Serialize};

/// Events and completions upload in flat batches of this size.
pub const EVENT_PUSH_BATCH_SIZE: usize = 50;

/// See [`EVENT_PUSH_BATCH_SIZE`].
pub const COMPLETION_PUSH_BATCH_SIZE: usize = 50;

/// Awards run inside a document transaction and cost more per write.
pub const AWARD_PUSH_BATCH_SIZE: usize = 10;

/// Debounce delay coalescing bursts of local mutations into one cycle.
pub const SYNC_DEBOUNCE_DELAY_MS: u64 = 1_000;

/// Periodic background cadence per authenticated user, in seconds.
pub const SYNC_PERIODIC_INTERVAL_SECS: u64 = 5 * 60;

/// Maximum jitter (seconds) added to periodic cycle intervals.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 5;

/// Completions and events pull a bounded recent window of monthly buckets.
pub const PULL_WINDOW_MONTHS: u32 = 3;

/// Trigger source for sync cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCycleTrigger {
    Startup,
    Debounce,
    Periodic,
    Manual,
}

/// Aggregate sync state exposed to the UI layer. Sync failures are silent
/// to the end user except through this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SyncStatus {
    Synced,
    Syncing,
    Pending { count: usize },
    Error { message: String },
}

/// Counts reported by one push call. Partial failures are counted, never
/// thrown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    pub synced: usize,
    pub already_synced: usize,
    pub failed: usize,
    pub first_error: Option<String>,
    /// True when a concurrent call held the single-flight guard and this
    /// call was a no-op.
    pub skipped_in_flight: bool,
}

impl PushOutcome {
    pub fn skipped_in_flight() -> Self {
        Self {
            skipped_in_flight: true,
            ..Self::default()
        }
    }

    /// Record a batch failure, keeping the first error encountered.
    pub fn record_failure(&mut self, records: usize, error: impl Into<String>) {
        self.failed += records;
        if self.first_error.is_none() {
            self.first_error = Some(error.into());
        }
    }
}

/// Per-step counts and aggregated errors from one pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullSummary {
    pub habits_pulled: usize,
    pub completions_pulled: usize,
    pub awards_pulled: usize,
    pub events_pulled: usize,
    pub errors: Vec<String>,
}

impl PullSummary {
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

/// Overall outcome of one full cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Ok,
    CompletedWithErrors,
    SkippedGuest,
    SkippedInFlight,
}

/// Report produced by the full-cycle orchestrator: pull first, then the
/// three push phases, with per-step error isolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCycleReport {
    pub status: CycleStatus,
    pub trigger: SyncCycleTrigger,
    pub pull: PullSummary,
    pub events: PushOutcome,
    pub completions: PushOutcome,
    pub awards: PushOutcome,
    pub duration_ms: i64,
    /// First underlying error of the cycle, when any step recorded one.
    pub first_error: Option<String>,
}

impl SyncCycleReport {
    pub fn skipped(status: CycleStatus, trigger: SyncCycleTrigger) -> Self {
        Self {
            status,
            trigger,
            pull: PullSummary::default(),
            events: PushOutcome::default(),
            completions: PushOutcome::default(),
            awards: PushOutcome::default(),
            duration_ms: 0,
            first_error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status, CycleStatus::Ok)
    }
}
