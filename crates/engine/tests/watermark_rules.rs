//! Watermark discipline: first sync ignores a stale value, partial
//! failure still advances, total failure never does.

mod common;

use chrono::{DateTime, Utc};

use habitloop_core::sync::watermark_key;
use habitloop_engine::store::{LocalStore, SettingsStore};

async fn stored_watermark(h: &common::Harness) -> Option<DateTime<Utc>> {
    h.settings
        .get(&watermark_key("u1"))
        .await
        .expect("read watermark")
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .expect("rfc3339 watermark")
                .with_timezone(&Utc)
        })
}

#[tokio::test]
async fn first_sync_pulls_everything_despite_a_stale_watermark() {
    let h = common::harness("u1");

    // A leftover watermark from a previous install on this device; the
    // local store itself is empty.
    h.settings
        .set(&watermark_key("u1"), &Utc::now().to_rfc3339())
        .await
        .expect("seed stale watermark");

    let habit = common::habit("u1", "h1", common::at(2020, 6, 1, 9));
    common::seed_remote_habit(&h.remote, &habit).await;

    let summary = h.engine.pull().await.expect("pull");
    assert_eq!(summary.habits_pulled, 1, "old remote habit still pulled");
    assert!(h
        .local
        .habit("u1", "h1")
        .await
        .expect("fetch")
        .is_some());
}

#[tokio::test]
async fn partially_failed_pull_still_advances_the_watermark() {
    let h = common::harness("u1");
    let habit = common::habit("u1", "h1", common::at(2025, 3, 1, 9));
    h.local.upsert_habit(habit.clone()).await.expect("insert habit");
    common::seed_remote_habit(&h.remote, &habit).await;

    h.remote.fail_reads_under("users/u1/completions/");
    let before = Utc::now();
    let summary = h.engine.pull().await.expect("pull");

    assert!(!summary.errors.is_empty(), "completion step failed");
    let after = stored_watermark(&h).await.expect("watermark persisted");
    assert!(after >= before, "partial success advances the watermark");
}

#[tokio::test]
async fn totally_failed_pull_leaves_the_watermark_alone() {
    let h = common::harness("u1");
    let habit = common::habit("u1", "h1", common::at(2025, 3, 1, 9));
    h.local.upsert_habit(habit.clone()).await.expect("insert habit");

    h.remote.fail_reads_under("users/u1/");
    let summary = h.engine.pull().await.expect("pull");

    assert!(summary.errors.len() >= 4, "every step recorded its failure");
    assert!(
        stored_watermark(&h).await.is_none(),
        "no watermark written on total failure"
    );

    // The next pull re-attempts the same work safely.
    h.remote.clear_failures();
    common::seed_remote_habit(&h.remote, &habit).await;
    let retry = h.engine.pull().await.expect("retry pull");
    assert!(retry.errors.is_empty());
    assert!(stored_watermark(&h).await.is_some());
}
