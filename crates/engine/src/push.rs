//! Push pipeline: upload locally-unsynced records in bounded batches.
//!
//! Every batch is one atomic multi-document write (events, completions)
//! or one transaction (awards, which must update the shared XP-state
//! document in the same atomic unit). A failing batch is logged and
//! counted; the rest of the queue still uploads.

use std::time::Instant;

use log::{debug, warn};
use uuid::Uuid;

use habitloop_core::habits::{CompletionRecord, DailyAward, ProgressEvent};
use habitloop_core::metrics::SyncOpKind;
use habitloop_core::sync::{
    award_doc_path, completion_doc_path, event_doc_path, month_bucket, sanitize_timestamp,
    xp_ledger_doc_path, xp_state_doc_path, PushOutcome, AWARD_PUSH_BATCH_SIZE,
    COMPLETION_PUSH_BATCH_SIZE, EVENT_PUSH_BATCH_SIZE,
};
use habitloop_core::Result;

use crate::engine::SyncEngine;
use crate::store::{
    encode, AwardDoc, CompletionDoc, EventDoc, RemoteWrite, XpLedgerEntryDoc, XpStateDoc,
};

/// Per-batch tallies folded into the overall [`PushOutcome`].
#[derive(Default)]
struct BatchResult {
    written: usize,
    already: usize,
    invalid: usize,
    first_error: Option<String>,
}

impl BatchResult {
    fn record_invalid(&mut self, error: impl Into<String>) {
        self.invalid += 1;
        if self.first_error.is_none() {
            self.first_error = Some(error.into());
        }
    }
}

fn fold(outcome: &mut PushOutcome, batch: BatchResult) {
    outcome.synced += batch.written;
    outcome.already_synced += batch.already;
    if batch.invalid > 0 {
        outcome.record_failure(
            batch.invalid,
            batch
                .first_error
                .unwrap_or_else(|| "invalid record".to_string()),
        );
    }
}

impl SyncEngine {
    pub(crate) async fn push_events_for_user(&self, user_id: &str) -> Result<PushOutcome> {
        let started = Instant::now();
        let pending = self.local.unsynced_events(user_id).await?;
        self.metrics
            .record_queue_depth(SyncOpKind::Events, pending.len());

        let mut outcome = PushOutcome::default();
        for batch in pending.chunks(EVENT_PUSH_BATCH_SIZE) {
            match self.push_event_batch(user_id, batch).await {
                Ok(result) => fold(&mut outcome, result),
                Err(err) => {
                    warn!("[HabitSync] Event batch failed: {}", err);
                    outcome.record_failure(batch.len(), err.to_string());
                }
            }
        }

        debug!(
            "[HabitSync] push_events synced={} already={} failed={}",
            outcome.synced, outcome.already_synced, outcome.failed
        );
        self.metrics.record_operation(
            SyncOpKind::Events,
            started.elapsed().as_millis() as i64,
            outcome.failed == 0,
        );
        Ok(outcome)
    }

    async fn push_event_batch(
        &self,
        user_id: &str,
        batch: &[ProgressEvent],
    ) -> Result<BatchResult> {
        let mut result = BatchResult::default();
        let mut writes = Vec::new();
        let mut confirmed_ids = Vec::with_capacity(batch.len());
        let mut written_ids = Vec::new();

        for event in batch {
            let Some(month) = month_bucket(&event.date_key) else {
                result.record_invalid(format!("invalid date key '{}'", event.date_key));
                continue;
            };
            let path = event_doc_path(user_id, month, &event.operation_id);
            let duplicate = self
                .remote
                .get(&path)
                .await?
                .as_ref()
                .and_then(|value| EventDoc::decode(value).ok())
                .is_some_and(|doc| doc.operation_id == event.operation_id);

            if duplicate {
                result.already += 1;
                confirmed_ids.push(event.operation_id.clone());
            } else {
                writes.push(RemoteWrite::Set {
                    path,
                    doc: encode(&EventDoc::from_event(event))?,
                });
                written_ids.push(event.operation_id.clone());
            }
        }

        // An all-already-synced batch short-circuits to a pure local
        // mark-synced pass.
        if !writes.is_empty() {
            self.remote.commit_batch(writes).await?;
            result.written = written_ids.len();
            confirmed_ids.extend(written_ids);
        }
        if !confirmed_ids.is_empty() {
            self.local.mark_events_synced(user_id, &confirmed_ids).await?;
        }
        Ok(result)
    }

    pub(crate) async fn push_completions_for_user(&self, user_id: &str) -> Result<PushOutcome> {
        let started = Instant::now();
        let pending = self.local.unsynced_completions(user_id).await?;
        self.metrics
            .record_queue_depth(SyncOpKind::Completions, pending.len());

        let mut outcome = PushOutcome::default();
        for batch in pending.chunks(COMPLETION_PUSH_BATCH_SIZE) {
            match self.push_completion_batch(user_id, batch).await {
                Ok(result) => fold(&mut outcome, result),
                Err(err) => {
                    warn!("[HabitSync] Completion batch failed: {}", err);
                    outcome.record_failure(batch.len(), err.to_string());
                }
            }
        }

        debug!(
            "[HabitSync] push_completions synced={} already={} failed={}",
            outcome.synced, outcome.already_synced, outcome.failed
        );
        self.metrics.record_operation(
            SyncOpKind::Completions,
            started.elapsed().as_millis() as i64,
            outcome.failed == 0,
        );
        Ok(outcome)
    }

    async fn push_completion_batch(
        &self,
        user_id: &str,
        batch: &[CompletionRecord],
    ) -> Result<BatchResult> {
        let mut result = BatchResult::default();
        let mut writes = Vec::new();
        let mut confirmed_keys = Vec::with_capacity(batch.len());
        let mut written_keys = Vec::new();

        for record in batch {
            let Some(month) = month_bucket(&record.date_key) else {
                result.record_invalid(format!("invalid date key '{}'", record.date_key));
                continue;
            };
            let path = completion_doc_path(user_id, month, &record.habit_id, &record.date_key);
            let key = (record.habit_id.clone(), record.date_key.clone());
            let up_to_date = self
                .remote
                .get(&path)
                .await?
                .as_ref()
                .and_then(|value| CompletionDoc::decode(value).ok())
                .is_some_and(|doc| doc.matches(record));

            if up_to_date {
                result.already += 1;
                confirmed_keys.push(key);
            } else {
                writes.push(RemoteWrite::Set {
                    path,
                    doc: encode(&CompletionDoc::from_record(record))?,
                });
                written_keys.push(key);
            }
        }

        if !writes.is_empty() {
            self.remote.commit_batch(writes).await?;
            result.written = written_keys.len();
            confirmed_keys.extend(written_keys);
        }
        if !confirmed_keys.is_empty() {
            self.local
                .mark_completions_synced(user_id, &confirmed_keys)
                .await?;
        }
        Ok(result)
    }

    pub(crate) async fn push_awards_for_user(&self, user_id: &str) -> Result<PushOutcome> {
        let started = Instant::now();
        let pending = self.local.unsynced_awards(user_id).await?;
        self.metrics
            .record_queue_depth(SyncOpKind::Awards, pending.len());

        let mut outcome = PushOutcome::default();
        for batch in pending.chunks(AWARD_PUSH_BATCH_SIZE) {
            match self.push_award_batch(user_id, batch).await {
                Ok(result) => fold(&mut outcome, result),
                Err(err) => {
                    warn!("[HabitSync] Award batch failed: {}", err);
                    outcome.record_failure(batch.len(), err.to_string());
                }
            }
        }

        debug!(
            "[HabitSync] push_awards synced={} already={} failed={}",
            outcome.synced, outcome.already_synced, outcome.failed
        );
        self.metrics.record_operation(
            SyncOpKind::Awards,
            started.elapsed().as_millis() as i64,
            outcome.failed == 0,
        );
        Ok(outcome)
    }

    async fn push_award_batch(&self, user_id: &str, batch: &[DailyAward]) -> Result<BatchResult> {
        let mut result = BatchResult::default();
        let mut writes = Vec::new();
        let mut confirmed_keys = Vec::with_capacity(batch.len());
        let mut written_keys = Vec::new();

        for award in batch {
            if !habitloop_core::sync::is_valid_date_key(&award.date_key) {
                result.record_invalid(format!("invalid date key '{}'", award.date_key));
                continue;
            }
            let path = award_doc_path(user_id, &award.date_key);
            let granted = self
                .remote
                .get(&path)
                .await?
                .as_ref()
                .and_then(|value| AwardDoc::decode(value).ok())
                .is_some();

            if granted {
                result.already += 1;
                confirmed_keys.push(award.date_key.clone());
            } else {
                writes.push(RemoteWrite::Set {
                    path,
                    doc: encode(&AwardDoc::from_award(award))?,
                });
                writes.push(RemoteWrite::Set {
                    path: xp_ledger_doc_path(user_id, &Uuid::new_v4().to_string()),
                    doc: encode(&XpLedgerEntryDoc {
                        schema_version: crate::store::DOC_SCHEMA_VERSION,
                        user_id: award.user_id.clone(),
                        date_key: award.date_key.clone(),
                        xp_granted: award.xp_granted,
                        recorded_at: Some(sanitize_timestamp(chrono::Utc::now())),
                    })?,
                });
                written_keys.push(award.date_key.clone());
            }
        }

        if !writes.is_empty() {
            // The XP-state snapshot ships in the same transaction so an
            // award can never land without the shared XP document moving
            // with it.
            let xp = self.xp.snapshot(user_id).await?;
            writes.push(RemoteWrite::Set {
                path: xp_state_doc_path(user_id),
                doc: encode(&XpStateDoc::from_state(&xp))?,
            });
            self.remote.commit_transaction(writes).await?;
            result.written = written_keys.len();
            confirmed_keys.extend(written_keys);
        }
        if !confirmed_keys.is_empty() {
            self.local
                .mark_awards_synced(user_id, &confirmed_keys)
                .await?;
        }
        Ok(result)
    }
}
