//! Health counters emitted by the engine, consumed by an external
//! monitor.

use serde::Serialize;

/// Operation kinds the engine reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOpKind {
    Events,
    Completions,
    Awards,
    Pull,
    FullCycle,
}

/// Counter sink. Implementations must be cheap; the engine calls these on
/// its hot path.
pub trait MetricsSink: Send + Sync {
    /// Number of locally-unsynced records observed at the start of a push.
    fn record_queue_depth(&self, kind: SyncOpKind, depth: usize);

    /// Duration and outcome of one operation.
    fn record_operation(&self, kind: SyncOpKind, duration_ms: i64, success: bool);
}

/// Discards every counter.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_queue_depth(&self, _kind: SyncOpKind, _depth: usize) {}
    fn record_operation(&self, _kind: SyncOpKind, _duration_ms: i64, _success: bool) {}
}
