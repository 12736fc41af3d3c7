//! Conflict resolution for pulled completion records.

use chrono::{DateTime, Utc};

use crate::habits::CompletionRecord;

/// Remote and local clocks may quantize timestamps differently, so strict
/// wall-clock equality is unreliable for near-simultaneous edits. Two
/// timestamps within this window compare equal and fall through to the
/// field-value tie-break.
pub const TIMESTAMP_EQUALITY_TOLERANCE_MS: i64 = 1;

/// Effective remote timestamp: `updated_at`, falling back to
/// `created_at`, falling back to the distant-past sentinel when both are
/// missing or invalid. A sentinel-stamped document loses every comparison
/// against real local state.
pub fn remote_timestamp(
    updated_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    updated_at
        .or(created_at)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Remote field values that participate in the merge comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteCompletionFields {
    pub is_completed: bool,
    pub progress: i32,
}

/// What the pull pipeline should do with one remote completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// No local record exists; create it from remote fields.
    CreateLocal,
    /// Remote is newer (or tied with differing fields); overwrite local.
    OverwriteLocal,
    /// Local is newer; keep it untouched.
    KeepLocal,
    /// Timestamps tied and fields equal; nothing to do.
    Noop,
}

/// Last-write-wins comparison between a local completion record and the
/// remote document's effective timestamp and fields.
///
/// Rule:
/// 1. remote newer than local `updated_at` → overwrite local
/// 2. remote older → keep local
/// 3. equal (within tolerance) → remote wins if field values differ,
///    otherwise no-op
///
/// The equal-and-different case is a deliberate deterministic tie-break,
/// documented rather than silently ambiguous.
pub fn decide_completion_merge(
    local: Option<&CompletionRecord>,
    remote_updated_at: DateTime<Utc>,
    remote: RemoteCompletionFields,
) -> MergeDecision {
    let Some(local) = local else {
        return MergeDecision::CreateLocal;
    };

    let delta_ms = (remote_updated_at - local.updated_at).num_milliseconds();
    if delta_ms > TIMESTAMP_EQUALITY_TOLERANCE_MS {
        return MergeDecision::OverwriteLocal;
    }
    if delta_ms < -TIMESTAMP_EQUALITY_TOLERANCE_MS {
        return MergeDecision::KeepLocal;
    }

    if local.is_completed != remote.is_completed || local.progress != remote.progress {
        MergeDecision::OverwriteLocal
    } else {
        MergeDecision::Noop
    }
}
