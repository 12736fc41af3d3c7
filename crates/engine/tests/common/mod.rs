//! Shared harness for engine integration tests: an engine wired to the
//! in-memory stores, with recording XP and event sinks.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use habitloop_core::events::{SyncEngineEvent, SyncEventSink};
use habitloop_core::habits::{CompletionRecord, DailyAward, HabitData, ProgressEvent, XpState};
use habitloop_core::identity::SharedIdentity;
use habitloop_core::metrics::NoopMetrics;
use habitloop_core::sync::{
    award_doc_path, completion_doc_path, event_doc_path, habit_doc_path, month_bucket,
};
use habitloop_core::xp::XpService;
use habitloop_core::Result;
use habitloop_engine::store::{
    encode, AwardDoc, CompletionDoc, EventDoc, HabitDoc, MemoryLocalStore, MemoryRemoteStore,
    MemorySettings, RemoteStore,
};
use habitloop_engine::{EngineDeps, RecentlyDeletedGuard, SyncEngine};

/// XP collaborator that counts resync requests.
#[derive(Default)]
pub struct RecordingXp {
    pub resyncs: AtomicUsize,
}

impl RecordingXp {
    pub fn resync_count(&self) -> usize {
        self.resyncs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl XpService for RecordingXp {
    async fn snapshot(&self, _user_id: &str) -> Result<XpState> {
        Ok(XpState {
            total_xp: 120,
            level: 2,
            current_level_xp: 20,
            last_updated: Utc::now(),
        })
    }

    async fn resync(&self, _user_id: &str) -> Result<()> {
        self.resyncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Event sink that records everything the engine emits.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<SyncEngineEvent>>,
}

impl RecordingSink {
    pub fn invalidation_count(&self) -> usize {
        self.events
            .lock()
            .expect("sink lock")
            .iter()
            .filter(|event| matches!(event, SyncEngineEvent::HabitsInvalidated))
            .count()
    }

    pub fn started_count(&self) -> usize {
        self.events
            .lock()
            .expect("sink lock")
            .iter()
            .filter(|event| matches!(event, SyncEngineEvent::Started { .. }))
            .count()
    }
}

impl SyncEventSink for RecordingSink {
    fn emit(&self, event: SyncEngineEvent) {
        self.events.lock().expect("sink lock").push(event);
    }
}

pub struct Harness {
    pub engine: Arc<SyncEngine>,
    pub local: Arc<MemoryLocalStore>,
    pub remote: Arc<MemoryRemoteStore>,
    pub settings: Arc<MemorySettings>,
    pub identity: Arc<SharedIdentity>,
    pub xp: Arc<RecordingXp>,
    pub sink: Arc<RecordingSink>,
    pub guard: Arc<RecentlyDeletedGuard>,
}

pub fn harness(user_id: &str) -> Harness {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(MemoryRemoteStore::new());
    let settings = Arc::new(MemorySettings::new());
    let identity = Arc::new(SharedIdentity::new(user_id));
    let xp = Arc::new(RecordingXp::default());
    let sink = Arc::new(RecordingSink::default());
    let guard = Arc::new(RecentlyDeletedGuard::new());

    let engine = Arc::new(SyncEngine::new(EngineDeps {
        local: local.clone(),
        remote: remote.clone(),
        settings: settings.clone(),
        identity: identity.clone(),
        xp: xp.clone(),
        events: sink.clone(),
        metrics: Arc::new(NoopMetrics),
        deleted_guard: Arc::clone(&guard),
    }));

    Harness {
        engine,
        local,
        remote,
        settings,
        identity,
        xp,
        sink,
        guard,
    }
}

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Today's `yyyy-MM-dd` key, for scenarios that must land inside the
/// pull window.
pub fn today_key() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

pub fn habit(user_id: &str, habit_id: &str, created_at: DateTime<Utc>) -> HabitData {
    HabitData {
        id: habit_id.to_string(),
        user_id: user_id.to_string(),
        name: format!("Habit {}", habit_id),
        daily_goal: 2,
        archived: false,
        created_at,
        updated_at: created_at,
        last_synced_at: None,
    }
}

pub fn completion(
    user_id: &str,
    habit_id: &str,
    date_key: &str,
    progress: i32,
    is_completed: bool,
    updated_at: DateTime<Utc>,
) -> CompletionRecord {
    CompletionRecord {
        user_id: user_id.to_string(),
        habit_id: habit_id.to_string(),
        date_key: date_key.to_string(),
        is_completed,
        progress,
        created_at: updated_at,
        updated_at,
        synced: false,
    }
}

pub fn award(user_id: &str, date_key: &str, xp_granted: i32) -> DailyAward {
    DailyAward {
        user_id: user_id.to_string(),
        date_key: date_key.to_string(),
        xp_granted,
        all_habits_completed: true,
        created_at: Utc::now(),
        synced: false,
    }
}

pub async fn seed_remote_habit(remote: &MemoryRemoteStore, habit: &HabitData) {
    remote
        .set_merge(
            &habit_doc_path(&habit.user_id, &habit.id),
            encode(&HabitDoc::from_habit(habit)).expect("encode habit"),
        )
        .await
        .expect("seed habit");
}

pub async fn seed_remote_completion(remote: &MemoryRemoteStore, record: &CompletionRecord) {
    let month = month_bucket(&record.date_key).expect("valid date key");
    remote
        .set_merge(
            &completion_doc_path(&record.user_id, month, &record.habit_id, &record.date_key),
            encode(&CompletionDoc::from_record(record)).expect("encode completion"),
        )
        .await
        .expect("seed completion");
}

pub async fn seed_remote_award(remote: &MemoryRemoteStore, award: &DailyAward) {
    remote
        .set_merge(
            &award_doc_path(&award.user_id, &award.date_key),
            encode(&AwardDoc::from_award(award)).expect("encode award"),
        )
        .await
        .expect("seed award");
}

pub async fn seed_remote_event(remote: &MemoryRemoteStore, event: &ProgressEvent) {
    let month = month_bucket(&event.date_key).expect("valid date key");
    remote
        .set_merge(
            &event_doc_path(&event.user_id, month, &event.operation_id),
            encode(&EventDoc::from_event(event)).expect("encode event"),
        )
        .await
        .expect("seed event");
}
