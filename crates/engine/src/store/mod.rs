//! Store adapter contracts owned by the application shell.
//!
//! The engine only issues the calls below; it never sees a connection,
//! a file, or a network socket. `memory` provides the in-memory
//! reference adapters used by tests and guest-mode embedding.

mod docs;
mod memory;

pub use docs::*;
pub use memory::{MemoryLocalStore, MemoryRemoteStore, MemorySettings};

use async_trait::async_trait;
use habitloop_core::habits::{CompletionRecord, DailyAward, HabitData, ProgressEvent};
use habitloop_core::Result;

/// One element of an atomic remote write.
#[derive(Debug, Clone)]
pub enum RemoteWrite {
    /// Set-with-merge the document at `path`: fields present in `doc`
    /// overwrite, absent fields survive. Replaying the same write is a
    /// no-op beyond the first application.
    Set {
        path: String,
        doc: serde_json::Value,
    },
    /// Delete the document at `path`. Deleting an absent document is not
    /// an error.
    Delete { path: String },
}

impl RemoteWrite {
    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. } => path,
            Self::Delete { path } => path,
        }
    }
}

/// Transactional local store: typed CRUD and predicate queries over the
/// four record kinds. Implementations serialize access on their own
/// context; every call is awaited when crossing from the engine.
#[async_trait]
pub trait LocalStore: Send + Sync {
    // Habits
    async fn habits_for_user(&self, user_id: &str) -> Result<Vec<HabitData>>;
    async fn habit(&self, user_id: &str, habit_id: &str) -> Result<Option<HabitData>>;
    async fn upsert_habit(&self, habit: HabitData) -> Result<()>;
    async fn delete_habit(&self, user_id: &str, habit_id: &str) -> Result<()>;

    // Completions
    async fn completion(
        &self,
        user_id: &str,
        habit_id: &str,
        date_key: &str,
    ) -> Result<Option<CompletionRecord>>;
    async fn completions_for_date(&self, user_id: &str, date_key: &str)
        -> Result<Vec<CompletionRecord>>;
    async fn unsynced_completions(&self, user_id: &str) -> Result<Vec<CompletionRecord>>;
    async fn upsert_completion(&self, record: CompletionRecord) -> Result<()>;
    async fn delete_completions_for_habit(&self, user_id: &str, habit_id: &str) -> Result<()>;
    /// Flip `synced` on the listed `(habit_id, date_key)` pairs.
    async fn mark_completions_synced(
        &self,
        user_id: &str,
        keys: &[(String, String)],
    ) -> Result<()>;

    // Progress events (the outbox)
    async fn unsynced_events(&self, user_id: &str) -> Result<Vec<ProgressEvent>>;
    async fn unsynced_events_for(
        &self,
        user_id: &str,
        habit_id: &str,
        date_key: &str,
    ) -> Result<Vec<ProgressEvent>>;
    async fn event_by_operation_id(
        &self,
        user_id: &str,
        operation_id: &str,
    ) -> Result<Option<ProgressEvent>>;
    async fn insert_event(&self, event: ProgressEvent) -> Result<()>;
    /// Flip `synced` on the listed operation ids. Never un-syncs.
    async fn mark_events_synced(&self, user_id: &str, operation_ids: &[String]) -> Result<()>;

    // Daily awards
    async fn award(&self, user_id: &str, date_key: &str) -> Result<Option<DailyAward>>;
    async fn unsynced_awards(&self, user_id: &str) -> Result<Vec<DailyAward>>;
    async fn upsert_award(&self, award: DailyAward) -> Result<()>;
    async fn mark_awards_synced(&self, user_id: &str, date_keys: &[String]) -> Result<()>;
}

/// Hierarchical remote document store, path-keyed per the layout in
/// [`habitloop_core::sync`] key builders.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch one document; `Ok(None)` when absent.
    async fn get(&self, path: &str) -> Result<Option<serde_json::Value>>;

    /// Set-with-merge a single document.
    async fn set_merge(&self, path: &str, doc: serde_json::Value) -> Result<()>;

    /// Delete one document.
    async fn delete(&self, path: &str) -> Result<()>;

    /// List `(path, doc)` pairs for every document under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>>;

    /// Apply a multi-document batch atomically.
    async fn commit_batch(&self, writes: Vec<RemoteWrite>) -> Result<()>;

    /// Apply a batch inside a transaction. Same atomicity as
    /// [`RemoteStore::commit_batch`] plus read-isolation on the touched
    /// documents; award writes use this so the shared XP-state document
    /// updates in the same atomic unit.
    async fn commit_transaction(&self, writes: Vec<RemoteWrite>) -> Result<()>;
}

/// Simple durable key-value settings storage. Holds the per-user pull
/// watermark; deliberately not the transactional store.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}
