//! Typed engine-to-UI signals.
//!
//! The engine emits these through an injected sink; the UI facade
//! subscribes to the sink it provided. No global notification bus.

use serde::Serialize;

use crate::sync::{SyncCycleReport, SyncCycleTrigger};

/// Lifecycle and invalidation signals produced by the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SyncEngineEvent {
    Started { trigger: SyncCycleTrigger },
    Completed { report: SyncCycleReport },
    Failed { message: String },
    /// A habit was deleted on another device and removed locally; any
    /// in-memory UI cache must reload so a stale reference cannot
    /// recreate it.
    HabitsInvalidated,
}

/// Sink for engine events, implemented by the UI facade.
pub trait SyncEventSink: Send + Sync {
    fn emit(&self, event: SyncEngineEvent);
}

/// Discards every event. Default for embeddings without a UI.
pub struct NoopEventSink;

impl SyncEventSink for NoopEventSink {
    fn emit(&self, _event: SyncEngineEvent) {}
}
