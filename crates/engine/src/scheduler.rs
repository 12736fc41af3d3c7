//! Debounce and periodic scheduling for sync cycles.
//!
//! At most one cycle runs at a time system-wide; that is the engine's
//! single-flight guard, not the scheduler's job. The scheduler's job is
//! when to trigger: coalescing bursts of local mutations into one remote
//! round-trip, and keeping a background loop alive per authenticated
//! user until sign-out.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use habitloop_core::identity::is_guest_id;
use habitloop_core::sync::{
    SyncCycleTrigger, SYNC_DEBOUNCE_DELAY_MS, SYNC_INTERVAL_JITTER_SECS,
    SYNC_PERIODIC_INTERVAL_SECS,
};

use crate::engine::SyncEngine;

/// Timing knobs for the scheduler. Production uses the defaults; tests
/// shrink them.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerCadence {
    pub debounce: Duration,
    pub periodic_interval: Duration,
    pub max_jitter: Duration,
}

impl Default for SchedulerCadence {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(SYNC_DEBOUNCE_DELAY_MS),
            periodic_interval: Duration::from_secs(SYNC_PERIODIC_INTERVAL_SECS),
            max_jitter: Duration::from_secs(SYNC_INTERVAL_JITTER_SECS),
        }
    }
}

/// Cooperative cancellation: the loop checks the flag between the sleep
/// and the next cycle, so an in-flight remote call always completes
/// rather than being severed mid-batch.
#[derive(Default)]
struct CancelSignal {
    cancelled: AtomicBool,
    wake: Notify,
}

impl CancelSignal {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.wake.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

struct PeriodicLoop {
    user_id: String,
    handle: JoinHandle<()>,
    cancel: Arc<CancelSignal>,
}

/// Serializes sync triggers: debounced on-demand syncs plus one periodic
/// background loop per authenticated user, cancelable on sign-out.
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    cadence: SchedulerCadence,
    debounce_generation: Arc<AtomicU64>,
    periodic: Mutex<Option<PeriodicLoop>>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self::with_cadence(engine, SchedulerCadence::default())
    }

    pub fn with_cadence(engine: Arc<SyncEngine>, cadence: SchedulerCadence) -> Self {
        Self {
            engine,
            cadence,
            debounce_generation: Arc::new(AtomicU64::new(0)),
            periodic: Mutex::new(None),
        }
    }

    /// Request a sync after a short delay, superseding any pending
    /// request. A burst of rapid local mutations collapses into one
    /// cycle.
    pub fn request_sync(&self) {
        if self.engine.current_user().is_none() {
            return;
        }
        let generation = self.debounce_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let latest = Arc::clone(&self.debounce_generation);
        let engine = Arc::clone(&self.engine);
        let delay = self.cadence.debounce;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A newer request owns the timer now.
            if latest.load(Ordering::Acquire) != generation {
                return;
            }
            if let Err(err) = engine.run_full_cycle(SyncCycleTrigger::Debounce).await {
                warn!("[HabitSync] Debounced cycle failed: {}", err);
            }
        });
    }

    /// Start the background loop for `user_id`: one cycle immediately,
    /// then sleep → re-check identity → cycle, until cancelled.
    /// Idempotent for the same user; a different user replaces the loop.
    pub async fn start_periodic(&self, user_id: &str) {
        if is_guest_id(user_id) {
            return;
        }
        let mut slot = self.periodic.lock().await;
        if let Some(running) = slot.as_ref() {
            if running.user_id == user_id && !running.handle.is_finished() {
                debug!("[HabitSync] Periodic loop already running for {}", user_id);
                return;
            }
        }
        if let Some(previous) = slot.take() {
            previous.cancel.cancel();
        }

        let cancel = Arc::new(CancelSignal::default());
        let loop_cancel = Arc::clone(&cancel);
        let engine = Arc::clone(&self.engine);
        let cadence = self.cadence;
        let loop_user = user_id.to_string();

        let handle = tokio::spawn(async move {
            if let Err(err) = engine.run_full_cycle(SyncCycleTrigger::Startup).await {
                warn!("[HabitSync] Startup cycle failed: {}", err);
            }
            loop {
                let delay = cadence.periodic_interval + jitter(cadence.max_jitter);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = loop_cancel.wake.notified() => {}
                }
                if loop_cancel.is_cancelled() {
                    break;
                }
                // Covers sign-out mid-loop.
                match engine.current_user() {
                    Some(current) if current == loop_user => {}
                    _ => {
                        info!("[HabitSync] User changed, stopping periodic loop");
                        break;
                    }
                }
                if let Err(err) = engine.run_full_cycle(SyncCycleTrigger::Periodic).await {
                    warn!("[HabitSync] Periodic cycle failed: {}", err);
                }
            }
            debug!("[HabitSync] Periodic loop for {} exited", loop_user);
        });

        *slot = Some(PeriodicLoop {
            user_id: user_id.to_string(),
            handle,
            cancel,
        });
    }

    /// Cancel the background loop. Called on sign-out or when the
    /// effective user becomes a guest. An in-flight cycle completes; the
    /// loop observes the flag before starting another.
    pub async fn stop_periodic(&self) {
        let mut slot = self.periodic.lock().await;
        if let Some(running) = slot.take() {
            running.cancel.cancel();
            info!("[HabitSync] Periodic loop for {} cancelled", running.user_id);
        }
    }

    pub async fn is_periodic_running(&self) -> bool {
        let slot = self.periodic.lock().await;
        slot.as_ref().is_some_and(|running| !running.handle.is_finished())
    }
}

fn jitter(max: Duration) -> Duration {
    let bound = max.as_millis() as u64;
    if bound == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=bound))
}
