//! Idempotency key scheme and remote document layout.
//!
//! These pure functions are the single source of truth for "same logical
//! write": every idempotency check in the push and pull pipelines calls
//! them, never re-derives ids ad hoc. The path builders spell the wire
//! contract compatibility partners must match:
//!
//! ```text
//! users/{userId}/habits/{habitId}
//! users/{userId}/completions/{yyyy-MM}/completions/comp_{habitId}_{dateKey}
//! users/{userId}/events/{yyyy-MM}/events/{operationId}
//! users/{userId}/daily_awards/{userId#dateKey}
//! users/{userId}/xp/state
//! users/{userId}/xp_ledger/{auto-id}
//! ```

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Deterministic remote id for a completion document.
pub fn completion_doc_id(habit_id: &str, date_key: &str) -> String {
    format!("comp_{}_{}", habit_id, date_key)
}

/// Deterministic remote id for a daily award document.
pub fn award_doc_id(user_id: &str, date_key: &str) -> String {
    format!("{}#{}", user_id, date_key)
}

/// Monthly collection bucket (`yyyy-MM`) for a `yyyy-MM-dd` date key.
pub fn month_bucket(date_key: &str) -> Option<&str> {
    if !is_valid_date_key(date_key) {
        return None;
    }
    date_key.get(0..7)
}

/// Settings key holding the per-user pull watermark.
pub fn watermark_key(user_id: &str) -> String {
    format!("last_sync_timestamp_{}", user_id)
}

pub fn habits_collection(user_id: &str) -> String {
    format!("users/{}/habits/", user_id)
}

pub fn habit_doc_path(user_id: &str, habit_id: &str) -> String {
    format!("users/{}/habits/{}", user_id, habit_id)
}

pub fn completions_root(user_id: &str) -> String {
    format!("users/{}/completions/", user_id)
}

pub fn completions_month_collection(user_id: &str, month: &str) -> String {
    format!("users/{}/completions/{}/completions/", user_id, month)
}

pub fn completion_doc_path(user_id: &str, month: &str, habit_id: &str, date_key: &str) -> String {
    format!(
        "users/{}/completions/{}/completions/{}",
        user_id,
        month,
        completion_doc_id(habit_id, date_key)
    )
}

pub fn events_root(user_id: &str) -> String {
    format!("users/{}/events/", user_id)
}

pub fn events_month_collection(user_id: &str, month: &str) -> String {
    format!("users/{}/events/{}/events/", user_id, month)
}

pub fn event_doc_path(user_id: &str, month: &str, operation_id: &str) -> String {
    format!("users/{}/events/{}/events/{}", user_id, month, operation_id)
}

pub fn awards_collection(user_id: &str) -> String {
    format!("users/{}/daily_awards/", user_id)
}

pub fn award_doc_path(user_id: &str, date_key: &str) -> String {
    format!(
        "users/{}/daily_awards/{}",
        user_id,
        award_doc_id(user_id, date_key)
    )
}

pub fn xp_state_doc_path(user_id: &str) -> String {
    format!("users/{}/xp/state", user_id)
}

pub fn xp_ledger_doc_path(user_id: &str, entry_id: &str) -> String {
    format!("users/{}/xp_ledger/{}", user_id, entry_id)
}

/// True when `date_key` is a real calendar day in `yyyy-MM-dd` form.
pub fn is_valid_date_key(date_key: &str) -> bool {
    date_key.len() == 10 && NaiveDate::parse_from_str(date_key, "%Y-%m-%d").is_ok()
}

/// Range check for embedded timestamps: year 1 through 9999 survives every
/// wire encoding in the layout above.
pub fn timestamp_in_range(ts: DateTime<Utc>) -> bool {
    (1..=9999).contains(&ts.year())
}

/// Substitute "now" for an out-of-range timestamp (e.g. a sentinel
/// "distant past" value) so one malformed value cannot abort an otherwise
/// valid batch.
pub fn sanitize_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    if timestamp_in_range(ts) {
        ts
    } else {
        Utc::now()
    }
}

/// The `yyyy-MM` buckets covering the most recent `months` calendar
/// months, newest first, ending at `today`.
pub fn recent_month_buckets(today: NaiveDate, months: u32) -> Vec<String> {
    (0..months)
        .filter_map(|back| today.checked_sub_months(chrono::Months::new(back)))
        .map(|date| date.format("%Y-%m").to_string())
        .collect()
}
