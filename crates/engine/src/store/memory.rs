//! In-memory reference stores.
//!
//! Back tests and guest-mode embedding. The remote store applies batches
//! atomically under one lock and supports injected read and write
//! failures for failure-isolation tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use habitloop_core::habits::{CompletionRecord, DailyAward, HabitData, ProgressEvent};
use habitloop_core::{Result, SyncError};

use super::{LocalStore, RemoteStore, RemoteWrite, SettingsStore};

fn lock<'a, T>(mutex: &'a Mutex<T>) -> Result<std::sync::MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| SyncError::fetch_failed("poisoned lock"))
}

#[derive(Default)]
struct LocalState {
    // (user_id, habit_id)
    habits: BTreeMap<(String, String), HabitData>,
    // (user_id, habit_id, date_key)
    completions: BTreeMap<(String, String, String), CompletionRecord>,
    // (user_id, event id)
    events: BTreeMap<(String, String), ProgressEvent>,
    // (user_id, date_key)
    awards: BTreeMap<(String, String), DailyAward>,
}

/// Transactional object store kept entirely in memory.
#[derive(Default)]
pub struct MemoryLocalStore {
    state: Mutex<LocalState>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn habits_for_user(&self, user_id: &str) -> Result<Vec<HabitData>> {
        let state = lock(&self.state)?;
        Ok(state
            .habits
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn habit(&self, user_id: &str, habit_id: &str) -> Result<Option<HabitData>> {
        let state = lock(&self.state)?;
        Ok(state
            .habits
            .get(&(user_id.to_string(), habit_id.to_string()))
            .cloned())
    }

    async fn upsert_habit(&self, habit: HabitData) -> Result<()> {
        let mut state = lock(&self.state)?;
        state
            .habits
            .insert((habit.user_id.clone(), habit.id.clone()), habit);
        Ok(())
    }

    async fn delete_habit(&self, user_id: &str, habit_id: &str) -> Result<()> {
        let mut state = lock(&self.state)?;
        state
            .habits
            .remove(&(user_id.to_string(), habit_id.to_string()));
        Ok(())
    }

    async fn completion(
        &self,
        user_id: &str,
        habit_id: &str,
        date_key: &str,
    ) -> Result<Option<CompletionRecord>> {
        let state = lock(&self.state)?;
        Ok(state
            .completions
            .get(&(
                user_id.to_string(),
                habit_id.to_string(),
                date_key.to_string(),
            ))
            .cloned())
    }

    async fn completions_for_date(
        &self,
        user_id: &str,
        date_key: &str,
    ) -> Result<Vec<CompletionRecord>> {
        let state = lock(&self.state)?;
        Ok(state
            .completions
            .values()
            .filter(|c| c.user_id == user_id && c.date_key == date_key)
            .cloned()
            .collect())
    }

    async fn unsynced_completions(&self, user_id: &str) -> Result<Vec<CompletionRecord>> {
        let state = lock(&self.state)?;
        Ok(state
            .completions
            .values()
            .filter(|c| c.user_id == user_id && !c.synced)
            .cloned()
            .collect())
    }

    async fn upsert_completion(&self, record: CompletionRecord) -> Result<()> {
        let mut state = lock(&self.state)?;
        state.completions.insert(
            (
                record.user_id.clone(),
                record.habit_id.clone(),
                record.date_key.clone(),
            ),
            record,
        );
        Ok(())
    }

    async fn delete_completions_for_habit(&self, user_id: &str, habit_id: &str) -> Result<()> {
        let mut state = lock(&self.state)?;
        state
            .completions
            .retain(|_, c| !(c.user_id == user_id && c.habit_id == habit_id));
        Ok(())
    }

    async fn mark_completions_synced(
        &self,
        user_id: &str,
        keys: &[(String, String)],
    ) -> Result<()> {
        let mut state = lock(&self.state)?;
        for (habit_id, date_key) in keys {
            if let Some(record) = state.completions.get_mut(&(
                user_id.to_string(),
                habit_id.clone(),
                date_key.clone(),
            )) {
                record.synced = true;
            }
        }
        Ok(())
    }

    async fn unsynced_events(&self, user_id: &str) -> Result<Vec<ProgressEvent>> {
        let state = lock(&self.state)?;
        Ok(state
            .events
            .values()
            .filter(|e| e.user_id == user_id && !e.synced)
            .cloned()
            .collect())
    }

    async fn unsynced_events_for(
        &self,
        user_id: &str,
        habit_id: &str,
        date_key: &str,
    ) -> Result<Vec<ProgressEvent>> {
        let state = lock(&self.state)?;
        Ok(state
            .events
            .values()
            .filter(|e| {
                e.user_id == user_id
                    && e.habit_id == habit_id
                    && e.date_key == date_key
                    && !e.synced
            })
            .cloned()
            .collect())
    }

    async fn event_by_operation_id(
        &self,
        user_id: &str,
        operation_id: &str,
    ) -> Result<Option<ProgressEvent>> {
        let state = lock(&self.state)?;
        Ok(state
            .events
            .values()
            .find(|e| e.user_id == user_id && e.operation_id == operation_id)
            .cloned())
    }

    async fn insert_event(&self, event: ProgressEvent) -> Result<()> {
        let mut state = lock(&self.state)?;
        state
            .events
            .insert((event.user_id.clone(), event.id.clone()), event);
        Ok(())
    }

    async fn mark_events_synced(&self, user_id: &str, operation_ids: &[String]) -> Result<()> {
        let mut state = lock(&self.state)?;
        for event in state.events.values_mut() {
            if event.user_id == user_id && operation_ids.contains(&event.operation_id) {
                event.synced = true;
            }
        }
        Ok(())
    }

    async fn award(&self, user_id: &str, date_key: &str) -> Result<Option<DailyAward>> {
        let state = lock(&self.state)?;
        Ok(state
            .awards
            .get(&(user_id.to_string(), date_key.to_string()))
            .cloned())
    }

    async fn unsynced_awards(&self, user_id: &str) -> Result<Vec<DailyAward>> {
        let state = lock(&self.state)?;
        Ok(state
            .awards
            .values()
            .filter(|a| a.user_id == user_id && !a.synced)
            .cloned()
            .collect())
    }

    async fn upsert_award(&self, award: DailyAward) -> Result<()> {
        let mut state = lock(&self.state)?;
        state
            .awards
            .insert((award.user_id.clone(), award.date_key.clone()), award);
        Ok(())
    }

    async fn mark_awards_synced(&self, user_id: &str, date_keys: &[String]) -> Result<()> {
        let mut state = lock(&self.state)?;
        for date_key in date_keys {
            if let Some(award) = state
                .awards
                .get_mut(&(user_id.to_string(), date_key.clone()))
            {
                award.synced = true;
            }
        }
        Ok(())
    }
}

/// Hierarchical document store kept in memory, path-keyed.
#[derive(Default)]
pub struct MemoryRemoteStore {
    docs: Mutex<BTreeMap<String, serde_json::Value>>,
    fail_prefix: Mutex<Option<String>>,
    fail_read_prefix: Mutex<Option<String>>,
    fail_next_commits: AtomicU64,
    writes_applied: AtomicU64,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write whose path starts with `prefix` fail until
    /// [`MemoryRemoteStore::clear_failures`].
    pub fn fail_writes_under(&self, prefix: impl Into<String>) {
        if let Ok(mut guard) = self.fail_prefix.lock() {
            *guard = Some(prefix.into());
        }
    }

    /// Make every get/list whose path starts with `prefix` fail until
    /// [`MemoryRemoteStore::clear_failures`].
    pub fn fail_reads_under(&self, prefix: impl Into<String>) {
        if let Ok(mut guard) = self.fail_read_prefix.lock() {
            *guard = Some(prefix.into());
        }
    }

    /// Make the next `n` batch/transaction commits fail.
    pub fn fail_next_commits(&self, n: u64) {
        self.fail_next_commits.store(n, Ordering::SeqCst);
    }

    pub fn clear_failures(&self) {
        if let Ok(mut guard) = self.fail_prefix.lock() {
            *guard = None;
        }
        if let Ok(mut guard) = self.fail_read_prefix.lock() {
            *guard = None;
        }
        self.fail_next_commits.store(0, Ordering::SeqCst);
    }

    /// Total individual document writes applied so far.
    pub fn writes_applied(&self) -> u64 {
        self.writes_applied.load(Ordering::SeqCst)
    }

    pub fn doc_count(&self) -> usize {
        self.docs.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    fn check_write_allowed(&self, path: &str) -> Result<()> {
        let guard = lock(&self.fail_prefix)?;
        if let Some(prefix) = guard.as_deref() {
            if path.starts_with(prefix) {
                return Err(SyncError::write_failed(format!(
                    "injected failure under {}",
                    prefix
                )));
            }
        }
        Ok(())
    }

    fn check_read_allowed(&self, path: &str) -> Result<()> {
        let guard = lock(&self.fail_read_prefix)?;
        if let Some(prefix) = guard.as_deref() {
            if path.starts_with(prefix) {
                return Err(SyncError::fetch_failed(format!(
                    "injected read failure under {}",
                    prefix
                )));
            }
        }
        Ok(())
    }

    fn consume_commit_failure(&self) -> Result<()> {
        let remaining = self.fail_next_commits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_commits.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::write_failed("injected commit failure"));
        }
        Ok(())
    }

    fn apply(docs: &mut BTreeMap<String, serde_json::Value>, write: RemoteWrite) {
        match write {
            RemoteWrite::Set { path, doc } => {
                match (docs.get_mut(&path), doc) {
                    // Merge semantics: incoming fields overwrite, absent
                    // fields survive.
                    (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(new)) => {
                        for (key, value) in new {
                            existing.insert(key, value);
                        }
                    }
                    (_, doc) => {
                        docs.insert(path, doc);
                    }
                }
            }
            RemoteWrite::Delete { path } => {
                docs.remove(&path);
            }
        }
    }

    fn commit(&self, writes: Vec<RemoteWrite>) -> Result<()> {
        self.consume_commit_failure()?;
        for write in &writes {
            self.check_write_allowed(write.path())?;
        }
        let mut docs = lock(&self.docs)?;
        let count = writes.len() as u64;
        for write in writes {
            Self::apply(&mut docs, write);
        }
        self.writes_applied.fetch_add(count, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, path: &str) -> Result<Option<serde_json::Value>> {
        self.check_read_allowed(path)?;
        let docs = lock(&self.docs)?;
        Ok(docs.get(path).cloned())
    }

    async fn set_merge(&self, path: &str, doc: serde_json::Value) -> Result<()> {
        self.commit(vec![RemoteWrite::Set {
            path: path.to_string(),
            doc,
        }])
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.commit(vec![RemoteWrite::Delete {
            path: path.to_string(),
        }])
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>> {
        self.check_read_allowed(prefix)?;
        let docs = lock(&self.docs)?;
        Ok(docs
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect())
    }

    async fn commit_batch(&self, writes: Vec<RemoteWrite>) -> Result<()> {
        self.commit(writes)
    }

    async fn commit_transaction(&self, writes: Vec<RemoteWrite>) -> Result<()> {
        self.commit(writes)
    }
}

/// Durable key-value settings storage kept in memory.
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = lock(&self.values)?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = lock(&self.values)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
