//! Pull pipeline: fetch remote changes since the watermark, merge them
//! into the local store, and reconcile deletions.
//!
//! Steps run in order — habits, deletion reconciliation, completions,
//! awards, events — each independently error-isolated: a failing step
//! appends to the summary's errors and the pipeline proceeds. The
//! watermark advances after a pull attempt completes even partially,
//! never on total failure.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};

use habitloop_core::events::SyncEngineEvent;
use habitloop_core::habits::{CompletionRecord, DailyAward, HabitData, ProgressEvent};
use habitloop_core::metrics::SyncOpKind;
use habitloop_core::sync::{
    award_doc_path, awards_collection, completions_month_collection, completions_root,
    decide_completion_merge, events_month_collection, habit_doc_path, habits_collection,
    recent_month_buckets, remote_timestamp, MergeDecision, PullSummary, RemoteCompletionFields,
    PULL_WINDOW_MONTHS,
};
use habitloop_core::Result;

use crate::engine::SyncEngine;
use crate::store::{AwardDoc, CompletionDoc, EventDoc, HabitDoc, RemoteWrite};

/// Habits, completions, awards, events.
const PULL_STEP_COUNT: usize = 4;

impl SyncEngine {
    pub(crate) async fn pull_for_user(&self, user_id: &str) -> PullSummary {
        let started = Instant::now();
        let pull_started_at = Utc::now();
        let mut summary = PullSummary::default();
        let mut failed_steps = 0usize;

        let mut watermark = self.watermark(user_id).await;
        match self.local.habits_for_user(user_id).await {
            Ok(local_habits) if local_habits.is_empty() => {
                // Fresh install: pull everything instead of trusting a
                // possibly-stale per-device watermark.
                watermark = DateTime::<Utc>::UNIX_EPOCH;
            }
            Ok(_) => {}
            Err(err) => {
                warn!("[HabitSync] First-sync check failed: {}", err);
                summary.errors.push(format!("first-sync check: {}", err));
            }
        }

        match self.pull_habits(user_id, watermark, &mut summary).await {
            Ok(remote_ids) => {
                if let Err(err) = self
                    .reconcile_deletions(user_id, &remote_ids, &mut summary)
                    .await
                {
                    warn!("[HabitSync] Deletion reconciliation failed: {}", err);
                    summary.errors.push(format!("reconciliation: {}", err));
                }
            }
            Err(err) => {
                warn!("[HabitSync] Habit pull failed: {}", err);
                summary.errors.push(format!("habits: {}", err));
                failed_steps += 1;
            }
        }

        if let Err(err) = self.pull_completions(user_id, &mut summary).await {
            warn!("[HabitSync] Completion pull failed: {}", err);
            summary.errors.push(format!("completions: {}", err));
            failed_steps += 1;
        }

        if let Err(err) = self.pull_awards(user_id, watermark, &mut summary).await {
            warn!("[HabitSync] Award pull failed: {}", err);
            summary.errors.push(format!("awards: {}", err));
            failed_steps += 1;
        }

        if let Err(err) = self.pull_events(user_id, &mut summary).await {
            warn!("[HabitSync] Event pull failed: {}", err);
            summary.errors.push(format!("events: {}", err));
            failed_steps += 1;
        }

        if failed_steps < PULL_STEP_COUNT {
            self.advance_watermark(user_id, pull_started_at).await;
        }

        debug!(
            "[HabitSync] pull habits={} completions={} awards={} events={} errors={}",
            summary.habits_pulled,
            summary.completions_pulled,
            summary.awards_pulled,
            summary.events_pulled,
            summary.errors.len()
        );
        self.metrics.record_operation(
            SyncOpKind::Pull,
            started.elapsed().as_millis() as i64,
            summary.errors.is_empty(),
        );
        summary
    }

    /// Fetch the full remote habit set and merge the documents updated
    /// after the watermark. Returns every remote habit id — the deletion
    /// reconciliation needs the full set, not the time-filtered subset.
    async fn pull_habits(
        &self,
        user_id: &str,
        watermark: DateTime<Utc>,
        summary: &mut PullSummary,
    ) -> Result<HashSet<String>> {
        let listed = self.remote.list(&habits_collection(user_id)).await?;
        let mut remote_ids = HashSet::with_capacity(listed.len());

        for (path, value) in listed {
            if let Some(id) = path.rsplit('/').next().filter(|id| !id.is_empty()) {
                remote_ids.insert(id.to_string());
            }
            let doc = match HabitDoc::decode(&value) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!("[HabitSync] Skipping malformed habit at {}: {}", path, err);
                    summary.errors.push(format!("habit {}: {}", path, err));
                    continue;
                }
            };
            let remote_ts = remote_timestamp(doc.updated_at, doc.created_at);
            if remote_ts <= watermark {
                continue;
            }
            if self.deleted_guard.contains(&doc.id) {
                continue;
            }

            match self.local.habit(user_id, &doc.id).await? {
                None => {
                    self.local
                        .upsert_habit(HabitData {
                            id: doc.id.clone(),
                            user_id: user_id.to_string(),
                            name: doc.name.clone(),
                            daily_goal: doc.daily_goal,
                            archived: doc.archived,
                            created_at: doc.created_at.unwrap_or(remote_ts),
                            updated_at: remote_ts,
                            last_synced_at: Some(Utc::now()),
                        })
                        .await?;
                    summary.habits_pulled += 1;
                }
                Some(local) if remote_ts > local.updated_at => {
                    self.local
                        .upsert_habit(HabitData {
                            name: doc.name.clone(),
                            daily_goal: doc.daily_goal,
                            archived: doc.archived,
                            updated_at: remote_ts,
                            last_synced_at: Some(Utc::now()),
                            ..local
                        })
                        .await?;
                    summary.habits_pulled += 1;
                }
                Some(_) => {}
            }
        }

        Ok(remote_ids)
    }

    /// Bidirectional deletion reconciliation over the full remote id set.
    ///
    /// A habit present remotely but not locally was deleted on this
    /// device and the remote delete never completed; one present locally
    /// but not remotely was deleted on another device. Each side runs
    /// under mark → work → clear on the recently-deleted guard, so a
    /// concurrent pull cannot resurrect a habit mid-cleanup. A failed
    /// cleanup leaves the mark in place; the next pull retries it.
    async fn reconcile_deletions(
        &self,
        user_id: &str,
        remote_ids: &HashSet<String>,
        summary: &mut PullSummary,
    ) -> Result<()> {
        let local_habits = self.local.habits_for_user(user_id).await?;
        let local_ids: HashSet<String> = local_habits
            .iter()
            .map(|habit| habit.id.clone())
            .collect();

        for habit_id in remote_ids.difference(&local_ids) {
            self.deleted_guard.mark(habit_id);
            match self.finish_remote_delete(user_id, habit_id).await {
                Ok(()) => {
                    info!("[HabitSync] Completed interrupted remote delete of {}", habit_id);
                    self.deleted_guard.clear(habit_id);
                }
                Err(err) => {
                    warn!("[HabitSync] Remote delete of {} failed: {}", habit_id, err);
                    summary.errors.push(format!("remote delete {}: {}", habit_id, err));
                }
            }
        }

        let mut any_removed_locally = false;
        for habit in &local_habits {
            if remote_ids.contains(&habit.id) {
                continue;
            }
            // A habit that has never reached the remote is awaiting its
            // first upload, not deleted elsewhere.
            if habit.last_synced_at.is_none() {
                continue;
            }
            let habit_id = &habit.id;
            self.deleted_guard.mark(habit_id);
            match self.finish_local_delete(user_id, habit_id).await {
                Ok(()) => {
                    info!("[HabitSync] Applied cross-device delete of {}", habit_id);
                    self.deleted_guard.clear(habit_id);
                    any_removed_locally = true;
                }
                Err(err) => {
                    warn!("[HabitSync] Local delete of {} failed: {}", habit_id, err);
                    summary.errors.push(format!("local delete {}: {}", habit_id, err));
                }
            }
        }

        if any_removed_locally {
            // A stale in-memory reference must not recreate the habit.
            self.events.emit(SyncEngineEvent::HabitsInvalidated);
        }
        Ok(())
    }

    async fn finish_remote_delete(&self, user_id: &str, habit_id: &str) -> Result<()> {
        let mut writes = self.remote_completion_deletes(user_id, habit_id).await?;
        writes.push(RemoteWrite::Delete {
            path: habit_doc_path(user_id, habit_id),
        });
        self.remote.commit_batch(writes).await
    }

    async fn finish_local_delete(&self, user_id: &str, habit_id: &str) -> Result<()> {
        self.local.delete_habit(user_id, habit_id).await?;
        self.local
            .delete_completions_for_habit(user_id, habit_id)
            .await?;
        let writes = self.remote_completion_deletes(user_id, habit_id).await?;
        if !writes.is_empty() {
            self.remote.commit_batch(writes).await?;
        }
        Ok(())
    }

    /// Deletes for every remote completion document belonging to `habit_id`.
    async fn remote_completion_deletes(
        &self,
        user_id: &str,
        habit_id: &str,
    ) -> Result<Vec<RemoteWrite>> {
        let listed = self.remote.list(&completions_root(user_id)).await?;
        Ok(listed
            .into_iter()
            .filter(|(_, value)| {
                CompletionDoc::decode(value).is_ok_and(|doc| doc.habit_id == habit_id)
            })
            .map(|(path, _)| RemoteWrite::Delete { path })
            .collect())
    }

    /// Merge remote completions from the recent window, falling back to
    /// full history when the window is empty (a device offline longer
    /// than the window).
    async fn pull_completions(&self, user_id: &str, summary: &mut PullSummary) -> Result<()> {
        let mut listed = Vec::new();
        for month in recent_month_buckets(Utc::now().date_naive(), PULL_WINDOW_MONTHS) {
            listed.extend(
                self.remote
                    .list(&completions_month_collection(user_id, &month))
                    .await?,
            );
        }
        if listed.is_empty() {
            listed = self.remote.list(&completions_root(user_id)).await?;
        }

        for (path, value) in listed {
            let doc = match CompletionDoc::decode(&value) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!("[HabitSync] Skipping malformed completion at {}: {}", path, err);
                    summary.errors.push(format!("completion {}: {}", path, err));
                    continue;
                }
            };

            // Local in-flight intent always wins over a remote snapshot.
            let in_flight = self
                .local
                .unsynced_events_for(user_id, &doc.habit_id, &doc.date_key)
                .await?;
            if !in_flight.is_empty() {
                continue;
            }
            if self.deleted_guard.contains(&doc.habit_id) {
                continue;
            }
            // Orphan prevention: no habit, no completion.
            if self.local.habit(user_id, &doc.habit_id).await?.is_none() {
                continue;
            }

            let existing = self
                .local
                .completion(user_id, &doc.habit_id, &doc.date_key)
                .await?;
            let remote_ts = remote_timestamp(doc.updated_at, doc.created_at);
            let fields = RemoteCompletionFields {
                is_completed: doc.is_completed,
                progress: doc.progress,
            };

            match decide_completion_merge(existing.as_ref(), remote_ts, fields) {
                MergeDecision::CreateLocal => {
                    self.local
                        .upsert_completion(CompletionRecord {
                            user_id: user_id.to_string(),
                            habit_id: doc.habit_id.clone(),
                            date_key: doc.date_key.clone(),
                            is_completed: doc.is_completed,
                            progress: doc.progress,
                            created_at: doc.created_at.unwrap_or(remote_ts),
                            updated_at: remote_ts,
                            synced: true,
                        })
                        .await?;
                    summary.completions_pulled += 1;
                }
                MergeDecision::OverwriteLocal => {
                    if let Some(mut record) = existing {
                        record.is_completed = doc.is_completed;
                        record.progress = doc.progress;
                        if let Some(created_at) = doc.created_at {
                            record.created_at = created_at;
                        }
                        record.updated_at = remote_ts;
                        record.synced = true;
                        self.local.upsert_completion(record).await?;
                        summary.completions_pulled += 1;
                    }
                }
                MergeDecision::KeepLocal | MergeDecision::Noop => {}
            }
        }

        Ok(())
    }

    /// Idempotent create-if-absent by deterministic id, gated by a local
    /// recomputation of "were all habits due that day actually completed
    /// here". An award that fails the gate is deleted from the remote
    /// store — self-healing against any historical bug that produced an
    /// invalid grant. A successful import triggers one XP resync per pull
    /// so multi-device XP never diverges.
    async fn pull_awards(
        &self,
        user_id: &str,
        watermark: DateTime<Utc>,
        summary: &mut PullSummary,
    ) -> Result<()> {
        let listed = self.remote.list(&awards_collection(user_id)).await?;
        let mut docs = Vec::with_capacity(listed.len());
        for (path, value) in listed {
            match AwardDoc::decode(&value) {
                Ok(doc) => docs.push(doc),
                Err(err) => {
                    warn!("[HabitSync] Skipping malformed award at {}: {}", path, err);
                    summary.errors.push(format!("award {}: {}", path, err));
                }
            }
        }

        let recent: Vec<&AwardDoc> = docs
            .iter()
            .filter(|doc| remote_timestamp(None, doc.created_at) > watermark)
            .collect();
        let candidates: Vec<&AwardDoc> = if recent.is_empty() {
            docs.iter().collect()
        } else {
            recent
        };

        let mut imported_any = false;
        for doc in candidates {
            if self.local.award(user_id, &doc.date_key).await?.is_some() {
                continue;
            }

            if !self.award_earned_locally(user_id, &doc.date_key).await? {
                warn!(
                    "[HabitSync] Rejecting award {} not backed by local completions",
                    doc.date_key
                );
                self.remote
                    .delete(&award_doc_path(user_id, &doc.date_key))
                    .await?;
                continue;
            }

            self.local
                .upsert_award(DailyAward {
                    user_id: user_id.to_string(),
                    date_key: doc.date_key.clone(),
                    xp_granted: doc.xp_granted,
                    all_habits_completed: doc.all_habits_completed,
                    created_at: doc.created_at.unwrap_or_else(Utc::now),
                    synced: true,
                })
                .await?;
            summary.awards_pulled += 1;
            imported_any = true;
        }

        if imported_any {
            if let Err(err) = self.xp.resync(user_id).await {
                warn!("[HabitSync] XP resync after award import failed: {}", err);
                summary.errors.push(format!("xp resync: {}", err));
            }
        }
        Ok(())
    }

    /// Validation gate for imported awards: every non-archived habit
    /// created on or before the award date must hold a completed
    /// completion for that date, and at least one such habit must exist.
    async fn award_earned_locally(&self, user_id: &str, date_key: &str) -> Result<bool> {
        let Ok(award_date) = NaiveDate::parse_from_str(date_key, "%Y-%m-%d") else {
            return Ok(false);
        };
        let habits = self.local.habits_for_user(user_id).await?;
        let completions = self.local.completions_for_date(user_id, date_key).await?;

        let due: Vec<&HabitData> = habits
            .iter()
            .filter(|habit| !habit.archived && habit.created_at.date_naive() <= award_date)
            .collect();
        if due.is_empty() {
            return Ok(false);
        }
        Ok(due.iter().all(|habit| {
            completions
                .iter()
                .any(|completion| completion.habit_id == habit.id && completion.is_completed)
        }))
    }

    /// Events are immutable facts: pure insert-if-absent by operation id,
    /// no conflict resolution. Imported rows arrive already synced.
    async fn pull_events(&self, user_id: &str, summary: &mut PullSummary) -> Result<()> {
        let mut listed = Vec::new();
        for month in recent_month_buckets(Utc::now().date_naive(), PULL_WINDOW_MONTHS) {
            listed.extend(
                self.remote
                    .list(&events_month_collection(user_id, &month))
                    .await?,
            );
        }

        for (path, value) in listed {
            let doc = match EventDoc::decode(&value) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!("[HabitSync] Skipping malformed event at {}: {}", path, err);
                    summary.errors.push(format!("event {}: {}", path, err));
                    continue;
                }
            };

            if self
                .local
                .event_by_operation_id(user_id, &doc.operation_id)
                .await?
                .is_some()
            {
                continue;
            }

            self.local
                .insert_event(ProgressEvent {
                    id: doc.operation_id.clone(),
                    user_id: user_id.to_string(),
                    habit_id: doc.habit_id.clone(),
                    date_key: doc.date_key.clone(),
                    operation_id: doc.operation_id.clone(),
                    amount: doc.amount,
                    synced: true,
                    deleted_at: doc.deleted_at,
                    created_at: doc.created_at.unwrap_or_else(Utc::now),
                })
                .await?;
            summary.events_pulled += 1;
        }

        Ok(())
    }
}
