//! Engine container and full-cycle orchestrator.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use habitloop_core::events::{SyncEngineEvent, SyncEventSink};
use habitloop_core::identity::{is_guest_id, IdentityProvider};
use habitloop_core::metrics::{MetricsSink, SyncOpKind};
use habitloop_core::sync::{
    watermark_key, CycleStatus, PullSummary, PushOutcome, SyncCycleReport, SyncCycleTrigger,
    SyncStatus,
};
use habitloop_core::xp::XpService;
use habitloop_core::Result;

use crate::deleted::RecentlyDeletedGuard;
use crate::single_flight::SingleFlight;
use crate::store::{LocalStore, RemoteStore, SettingsStore};

/// Collaborators injected into the engine. All externally owned.
pub struct EngineDeps {
    pub local: Arc<dyn LocalStore>,
    pub remote: Arc<dyn RemoteStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub xp: Arc<dyn XpService>,
    pub events: Arc<dyn SyncEventSink>,
    pub metrics: Arc<dyn MetricsSink>,
    pub deleted_guard: Arc<RecentlyDeletedGuard>,
}

/// The sync engine. One instance per process; every public entry point is
/// safe to call concurrently and from any task.
pub struct SyncEngine {
    pub(crate) local: Arc<dyn LocalStore>,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) settings: Arc<dyn SettingsStore>,
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) xp: Arc<dyn XpService>,
    pub(crate) events: Arc<dyn SyncEventSink>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    pub(crate) deleted_guard: Arc<RecentlyDeletedGuard>,
    pub(crate) in_flight: SingleFlight,
    last_error: Mutex<Option<String>>,
}

impl SyncEngine {
    pub fn new(deps: EngineDeps) -> Self {
        Self {
            local: deps.local,
            remote: deps.remote,
            settings: deps.settings,
            identity: deps.identity,
            xp: deps.xp,
            events: deps.events,
            metrics: deps.metrics,
            deleted_guard: deps.deleted_guard,
            in_flight: SingleFlight::new(),
            last_error: Mutex::new(None),
        }
    }

    /// Current signed-in user, or `None` for the guest sentinel.
    pub(crate) fn current_user(&self) -> Option<String> {
        let user_id = self.identity.current_user_id();
        if is_guest_id(&user_id) {
            None
        } else {
            Some(user_id)
        }
    }

    /// Run one logical cycle: Pull → Push(events) → Push(completions) →
    /// Push(awards), each step error-isolated. Guest users and concurrent
    /// callers get a skipped report, never an error.
    pub async fn run_full_cycle(&self, trigger: SyncCycleTrigger) -> Result<SyncCycleReport> {
        let Some(user_id) = self.current_user() else {
            debug!("[HabitSync] Guest user, cycle skipped");
            return Ok(SyncCycleReport::skipped(CycleStatus::SkippedGuest, trigger));
        };
        let Some(_permit) = self.in_flight.try_acquire() else {
            debug!("[HabitSync] Cycle already in flight, trigger dropped");
            return Ok(SyncCycleReport::skipped(
                CycleStatus::SkippedInFlight,
                trigger,
            ));
        };

        self.events.emit(SyncEngineEvent::Started { trigger });
        let started = Instant::now();

        // Pull completes (or is attempted) before any push, so freshly
        // pulled remote state is visible to the conflict checks made
        // during this cycle's pushes.
        let pull = self.pull_for_user(&user_id).await;
        let events = self.outcome_or_failure(self.push_events_for_user(&user_id).await);
        let completions = self.outcome_or_failure(self.push_completions_for_user(&user_id).await);
        let awards = self.outcome_or_failure(self.push_awards_for_user(&user_id).await);

        let first_error = pull
            .first_error()
            .map(str::to_string)
            .or_else(|| events.first_error.clone())
            .or_else(|| completions.first_error.clone())
            .or_else(|| awards.first_error.clone());
        let status = if first_error.is_none() {
            CycleStatus::Ok
        } else {
            CycleStatus::CompletedWithErrors
        };

        let report = SyncCycleReport {
            status,
            trigger,
            pull,
            events,
            completions,
            awards,
            duration_ms: started.elapsed().as_millis() as i64,
            first_error: first_error.clone(),
        };

        self.metrics.record_operation(
            SyncOpKind::FullCycle,
            report.duration_ms,
            report.succeeded(),
        );
        self.set_last_error(first_error.clone());
        match first_error {
            None => self.events.emit(SyncEngineEvent::Completed {
                report: report.clone(),
            }),
            Some(message) => {
                warn!("[HabitSync] Cycle completed with errors: {}", message);
                self.events.emit(SyncEngineEvent::Failed { message });
            }
        }

        Ok(report)
    }

    /// Upload locally-unsynced progress events. No-op for guests and
    /// while another sync call is in flight.
    pub async fn push_events(&self) -> Result<PushOutcome> {
        let Some(user_id) = self.current_user() else {
            return Ok(PushOutcome::default());
        };
        let Some(_permit) = self.in_flight.try_acquire() else {
            return Ok(PushOutcome::skipped_in_flight());
        };
        self.push_events_for_user(&user_id).await
    }

    /// Upload locally-unsynced completion records.
    pub async fn push_completions(&self) -> Result<PushOutcome> {
        let Some(user_id) = self.current_user() else {
            return Ok(PushOutcome::default());
        };
        let Some(_permit) = self.in_flight.try_acquire() else {
            return Ok(PushOutcome::skipped_in_flight());
        };
        self.push_completions_for_user(&user_id).await
    }

    /// Upload locally-unsynced daily awards.
    pub async fn push_awards(&self) -> Result<PushOutcome> {
        let Some(user_id) = self.current_user() else {
            return Ok(PushOutcome::default());
        };
        let Some(_permit) = self.in_flight.try_acquire() else {
            return Ok(PushOutcome::skipped_in_flight());
        };
        self.push_awards_for_user(&user_id).await
    }

    /// Fetch remote changes since the watermark and merge them in.
    pub async fn pull(&self) -> Result<PullSummary> {
        let Some(user_id) = self.current_user() else {
            return Ok(PullSummary::default());
        };
        let Some(_permit) = self.in_flight.try_acquire() else {
            return Ok(PullSummary::default());
        };
        Ok(self.pull_for_user(&user_id).await)
    }

    /// Aggregate sync state for the UI.
    pub async fn status(&self) -> SyncStatus {
        let Some(user_id) = self.current_user() else {
            return SyncStatus::Synced;
        };
        if self.in_flight.is_busy() {
            return SyncStatus::Syncing;
        }
        match self.pending_count(&user_id).await {
            Ok(0) => match self.last_cycle_error() {
                Some(message) => SyncStatus::Error { message },
                None => SyncStatus::Synced,
            },
            Ok(count) => SyncStatus::Pending { count },
            Err(err) => SyncStatus::Error {
                message: err.to_string(),
            },
        }
    }

    /// Number of locally-unsynced records awaiting upload.
    pub async fn pending_count(&self, user_id: &str) -> Result<usize> {
        let events = self.local.unsynced_events(user_id).await?.len();
        let completions = self.local.unsynced_completions(user_id).await?.len();
        let awards = self.local.unsynced_awards(user_id).await?.len();
        Ok(events + completions + awards)
    }

    fn outcome_or_failure(&self, result: Result<PushOutcome>) -> PushOutcome {
        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("[HabitSync] Push step failed before batching: {}", err);
                let mut outcome = PushOutcome::default();
                outcome.record_failure(0, err.to_string());
                outcome
            }
        }
    }

    fn set_last_error(&self, error: Option<String>) {
        let mut guard = self
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = error;
    }

    fn last_cycle_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Last successful pull time for `user_id`; the distant-past sentinel
    /// when the user has never pulled on this device.
    pub(crate) async fn watermark(&self, user_id: &str) -> DateTime<Utc> {
        match self.settings.get(&watermark_key(user_id)).await {
            Ok(Some(raw)) => DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            Ok(None) => DateTime::<Utc>::UNIX_EPOCH,
            Err(err) => {
                warn!("[HabitSync] Failed to read watermark: {}", err);
                DateTime::<Utc>::UNIX_EPOCH
            }
        }
    }

    pub(crate) async fn advance_watermark(&self, user_id: &str, to: DateTime<Utc>) {
        if let Err(err) = self
            .settings
            .set(&watermark_key(user_id), &to.to_rfc3339())
            .await
        {
            warn!("[HabitSync] Failed to persist watermark: {}", err);
        }
    }
}
