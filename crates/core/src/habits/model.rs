//! Record models shared by the local store, the sync engine, and the UI
//! facade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Habit definition, unique per `(user_id, id)`. The remote copy is the
/// long-term source of truth; `updated_at` / `last_synced_at` drive merge
/// ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitData {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Daily progress target; a day counts as completed at or above it.
    pub daily_goal: i32,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Materialized daily state, unique per `(user_id, habit_id, date_key)`.
/// This is the row the UI and streak logic read; it is derived from and
/// kept consistent with the event log and the remote equivalent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub user_id: String,
    pub habit_id: String,
    /// Calendar day in `yyyy-MM-dd` form.
    pub date_key: String,
    pub is_completed: bool,
    pub progress: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Engine-owned: true once the remote copy is confirmed current.
    /// Cleared by the local mutation path.
    pub synced: bool,
}

/// One user action in the append-only outbox. Created by the UI mutation
/// path; the engine only ever flips `synced`, never un-syncs, and never
/// physically deletes an unsynced row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub id: String,
    pub user_id: String,
    pub habit_id: String,
    pub date_key: String,
    /// Client-generated idempotency token, globally unique per logical
    /// action. Doubles as the remote document id.
    pub operation_id: String,
    /// Progress delta the action applied (negative for undo).
    pub amount: i32,
    pub synced: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ProgressEvent {
    /// Record a new user action with a fresh operation id.
    pub fn record(
        user_id: impl Into<String>,
        habit_id: impl Into<String>,
        date_key: impl Into<String>,
        amount: i32,
    ) -> Self {
        let operation_id = Uuid::new_v4().to_string();
        Self {
            id: operation_id.clone(),
            user_id: user_id.into(),
            habit_id: habit_id.into(),
            date_key: date_key.into(),
            operation_id,
            amount,
            synced: false,
            deleted_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Ledger entry that makes "all habits done today" idempotent and
/// auditable, unique per `(user_id, date_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAward {
    pub user_id: String,
    pub date_key: String,
    pub xp_granted: i32,
    pub all_habits_completed: bool,
    pub created_at: DateTime<Utc>,
    /// Engine-owned, same discipline as [`CompletionRecord::synced`].
    pub synced: bool,
}

/// Snapshot of the shared XP document. The engine publishes this alongside
/// award writes and never computes it independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpState {
    pub total_xp: i64,
    pub level: i32,
    pub current_level_xp: i64,
    pub last_updated: DateTime<Utc>,
}
