//! Schema-versioned remote document codecs.
//!
//! Remote payloads are explicit tagged records, not loose dictionaries.
//! Encoding happens only here; decoding validates required identity
//! fields and rejects malformed documents so the pipelines can skip them
//! instead of crashing. Timestamps are lenient on read: an unparsable
//! value decodes as absent and degrades to the merge sentinel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use habitloop_core::habits::{CompletionRecord, DailyAward, HabitData, ProgressEvent, XpState};
use habitloop_core::sync::{completion_doc_id, award_doc_id, is_valid_date_key, sanitize_timestamp};
use habitloop_core::{Result, SyncError};

/// Current wire schema. Bump on breaking payload changes.
pub const DOC_SCHEMA_VERSION: i32 = 1;

fn default_schema_version() -> i32 {
    DOC_SCHEMA_VERSION
}

fn lenient_datetime<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

/// `users/{userId}/habits/{habitId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitDoc {
    #[serde(default = "default_schema_version")]
    pub schema_version: i32,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub daily_goal: i32,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl HabitDoc {
    pub fn from_habit(habit: &HabitData) -> Self {
        Self {
            schema_version: DOC_SCHEMA_VERSION,
            id: habit.id.clone(),
            name: habit.name.clone(),
            daily_goal: habit.daily_goal,
            archived: habit.archived,
            created_at: Some(sanitize_timestamp(habit.created_at)),
            updated_at: Some(sanitize_timestamp(habit.updated_at)),
        }
    }

    pub fn decode(value: &serde_json::Value) -> Result<Self> {
        let doc: Self = serde_json::from_value(value.clone())?;
        if doc.id.is_empty() {
            return Err(SyncError::invalid_data("habit document without id"));
        }
        Ok(doc)
    }
}

/// `users/{userId}/completions/{yyyy-MM}/completions/{comp_...}`
///
/// Carries its composite deterministic id verbatim so a reader can detect
/// replay without external state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionDoc {
    #[serde(default = "default_schema_version")]
    pub schema_version: i32,
    pub id: String,
    pub user_id: String,
    pub habit_id: String,
    pub date_key: String,
    pub is_completed: bool,
    #[serde(default)]
    pub progress: i32,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CompletionDoc {
    pub fn from_record(record: &CompletionRecord) -> Self {
        Self {
            schema_version: DOC_SCHEMA_VERSION,
            id: completion_doc_id(&record.habit_id, &record.date_key),
            user_id: record.user_id.clone(),
            habit_id: record.habit_id.clone(),
            date_key: record.date_key.clone(),
            is_completed: record.is_completed,
            progress: record.progress,
            created_at: Some(sanitize_timestamp(record.created_at)),
            updated_at: Some(sanitize_timestamp(record.updated_at)),
        }
    }

    pub fn decode(value: &serde_json::Value) -> Result<Self> {
        let doc: Self = serde_json::from_value(value.clone())?;
        if doc.habit_id.is_empty() || !is_valid_date_key(&doc.date_key) {
            return Err(SyncError::invalid_data(
                "completion document without habit id or valid date key",
            ));
        }
        Ok(doc)
    }

    /// True when `record` would write the same logical state this
    /// document already holds.
    pub fn matches(&self, record: &CompletionRecord) -> bool {
        self.is_completed == record.is_completed && self.progress == record.progress
    }
}

/// `users/{userId}/events/{yyyy-MM}/events/{operationId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDoc {
    #[serde(default = "default_schema_version")]
    pub schema_version: i32,
    pub operation_id: String,
    pub user_id: String,
    pub habit_id: String,
    pub date_key: String,
    #[serde(default)]
    pub amount: i32,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

impl EventDoc {
    pub fn from_event(event: &ProgressEvent) -> Self {
        Self {
            schema_version: DOC_SCHEMA_VERSION,
            operation_id: event.operation_id.clone(),
            user_id: event.user_id.clone(),
            habit_id: event.habit_id.clone(),
            date_key: event.date_key.clone(),
            amount: event.amount,
            deleted_at: event.deleted_at.map(sanitize_timestamp),
            created_at: Some(sanitize_timestamp(event.created_at)),
        }
    }

    pub fn decode(value: &serde_json::Value) -> Result<Self> {
        let doc: Self = serde_json::from_value(value.clone())?;
        if doc.operation_id.is_empty() || doc.habit_id.is_empty() || !is_valid_date_key(&doc.date_key)
        {
            return Err(SyncError::invalid_data(
                "event document without operation id, habit id, or valid date key",
            ));
        }
        Ok(doc)
    }
}

/// `users/{userId}/daily_awards/{userId#dateKey}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardDoc {
    #[serde(default = "default_schema_version")]
    pub schema_version: i32,
    pub id: String,
    pub user_id: String,
    pub date_key: String,
    pub xp_granted: i32,
    #[serde(default)]
    pub all_habits_completed: bool,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AwardDoc {
    pub fn from_award(award: &DailyAward) -> Self {
        Self {
            schema_version: DOC_SCHEMA_VERSION,
            id: award_doc_id(&award.user_id, &award.date_key),
            user_id: award.user_id.clone(),
            date_key: award.date_key.clone(),
            xp_granted: award.xp_granted,
            all_habits_completed: award.all_habits_completed,
            created_at: Some(sanitize_timestamp(award.created_at)),
        }
    }

    pub fn decode(value: &serde_json::Value) -> Result<Self> {
        let doc: Self = serde_json::from_value(value.clone())?;
        if doc.user_id.is_empty() || !is_valid_date_key(&doc.date_key) {
            return Err(SyncError::invalid_data(
                "award document without user id or valid date key",
            ));
        }
        Ok(doc)
    }
}

/// `users/{userId}/xp/state` — single document, merge-updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpStateDoc {
    #[serde(default = "default_schema_version")]
    pub schema_version: i32,
    pub total_xp: i64,
    pub level: i32,
    pub current_level_xp: i64,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl XpStateDoc {
    pub fn from_state(state: &XpState) -> Self {
        Self {
            schema_version: DOC_SCHEMA_VERSION,
            total_xp: state.total_xp,
            level: state.level,
            current_level_xp: state.current_level_xp,
            last_updated: Some(sanitize_timestamp(state.last_updated)),
        }
    }
}

/// `users/{userId}/xp_ledger/{auto-id}` — append-only parallel record of
/// award grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpLedgerEntryDoc {
    #[serde(default = "default_schema_version")]
    pub schema_version: i32,
    pub user_id: String,
    pub date_key: String,
    pub xp_granted: i32,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub recorded_at: Option<DateTime<Utc>>,
}

pub fn encode<T: Serialize>(doc: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_rejects_documents_missing_identity_fields() {
        let missing_habit = json!({
            "id": "comp_h1_2025-03-04",
            "userId": "u1",
            "habitId": "",
            "dateKey": "2025-03-04",
            "isCompleted": true,
        });
        assert!(CompletionDoc::decode(&missing_habit).is_err());

        let bad_date = json!({
            "id": "comp_h1_x",
            "userId": "u1",
            "habitId": "h1",
            "dateKey": "03/04/2025",
            "isCompleted": true,
        });
        assert!(CompletionDoc::decode(&bad_date).is_err());
    }

    #[test]
    fn decode_tolerates_unparsable_timestamps() {
        let doc = CompletionDoc::decode(&json!({
            "id": "comp_h1_2025-03-04",
            "userId": "u1",
            "habitId": "h1",
            "dateKey": "2025-03-04",
            "isCompleted": true,
            "progress": 2,
            "updatedAt": "not-a-timestamp",
        }))
        .expect("decode completion");
        assert_eq!(doc.updated_at, None);
        assert_eq!(doc.progress, 2);
    }

    #[test]
    fn decode_defaults_schema_version_for_legacy_documents() {
        let doc = HabitDoc::decode(&json!({"id": "h1", "name": "Read"})).expect("decode habit");
        assert_eq!(doc.schema_version, DOC_SCHEMA_VERSION);
        assert!(!doc.archived);
    }

    #[test]
    fn encoded_completion_carries_its_idempotency_id() {
        let record = CompletionRecord {
            user_id: "u1".to_string(),
            habit_id: "H1".to_string(),
            date_key: "2025-03-04".to_string(),
            is_completed: true,
            progress: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            synced: false,
        };
        let value = encode(&CompletionDoc::from_record(&record)).expect("encode");
        assert_eq!(value["id"], "comp_H1_2025-03-04");
        assert_eq!(value["schemaVersion"], DOC_SCHEMA_VERSION);
    }
}
