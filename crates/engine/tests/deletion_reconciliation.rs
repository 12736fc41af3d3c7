//! Bidirectional deletion reconciliation and the no-resurrection guard.

mod common;

use chrono::Utc;

use habitloop_core::sync::watermark_key;
use habitloop_engine::store::{LocalStore, RemoteStore, SettingsStore};

#[tokio::test]
async fn reconciliation_completes_deletions_on_both_sides() {
    let h = common::harness("u1");
    let created = common::at(2025, 3, 1, 9);

    // Local has {A, B}; remote has {B, C}. A was deleted on another
    // device, C was deleted here before the remote delete went through.
    let mut a = common::habit("u1", "A", created);
    let mut b = common::habit("u1", "B", created);
    let c = common::habit("u1", "C", created);
    a.last_synced_at = Some(created);
    b.last_synced_at = Some(created);
    h.local.upsert_habit(a.clone()).await.expect("insert A");
    h.local.upsert_habit(b.clone()).await.expect("insert B");
    common::seed_remote_habit(&h.remote, &b).await;
    common::seed_remote_habit(&h.remote, &c).await;

    let mut a_done = common::completion("u1", "A", "2025-03-02", 2, true, created);
    a_done.synced = true;
    h.local.upsert_completion(a_done).await.expect("A completion");
    common::seed_remote_completion(
        &h.remote,
        &common::completion("u1", "C", "2025-03-02", 2, true, created),
    )
    .await;

    // The habits were all pulled long ago; only the deletions are news.
    h.settings
        .set(&watermark_key("u1"), &Utc::now().to_rfc3339())
        .await
        .expect("set watermark");

    h.engine.pull().await.expect("pull");

    let local_ids: Vec<String> = h
        .local
        .habits_for_user("u1")
        .await
        .expect("local habits")
        .into_iter()
        .map(|habit| habit.id)
        .collect();
    assert_eq!(local_ids, vec!["B".to_string()], "A removed, B untouched");
    assert!(
        h.remote
            .get("users/u1/habits/C")
            .await
            .expect("get C")
            .is_none(),
        "C's interrupted delete completed remotely"
    );
    assert!(
        h.remote
            .get("users/u1/habits/B")
            .await
            .expect("get B")
            .is_some(),
        "B untouched remotely"
    );

    // Dependent completions went with their habits.
    assert!(h
        .local
        .completion("u1", "A", "2025-03-02")
        .await
        .expect("fetch")
        .is_none());
    assert!(h
        .remote
        .get("users/u1/completions/2025-03/completions/comp_C_2025-03-02")
        .await
        .expect("get")
        .is_none());

    // Guard discipline: every mark cleared once both sides confirmed.
    assert!(!h.guard.contains("A"));
    assert!(!h.guard.contains("C"));
    assert!(h.sink.invalidation_count() >= 1, "UI cache told to reload");
}

#[tokio::test]
async fn never_uploaded_local_habit_survives_reconciliation() {
    let h = common::harness("u1");

    // Created offline; the UI write-through to the remote store has not
    // happened yet, so the habit is absent from the remote id set.
    let fresh = common::habit("u1", "new", common::at(2025, 3, 1, 9));
    h.local.upsert_habit(fresh).await.expect("insert habit");

    h.engine.pull().await.expect("pull");

    assert!(
        h.local
            .habit("u1", "new")
            .await
            .expect("fetch")
            .is_some(),
        "awaiting first upload is not a cross-device deletion"
    );
}

#[tokio::test]
async fn pull_does_not_resurrect_a_habit_deleted_mid_flight() {
    let h = common::harness("u1");
    let created = common::at(2025, 3, 1, 9);

    let habit = common::habit("u1", "H", created);
    let other = common::habit("u1", "K", created);
    h.local.upsert_habit(other.clone()).await.expect("insert K");
    common::seed_remote_habit(&h.remote, &other).await;
    common::seed_remote_habit(&h.remote, &habit).await;
    common::seed_remote_completion(
        &h.remote,
        &common::completion("u1", "H", "2025-03-02", 2, true, created),
    )
    .await;

    // The deletion path marked H and removed the local row, but the
    // remote delete is still propagating when the pull starts.
    h.guard.mark("H");
    let summary = h.engine.pull().await.expect("pull");

    assert!(
        h.local
            .habit("u1", "H")
            .await
            .expect("fetch")
            .is_none(),
        "stale remote document must not recreate the habit"
    );
    assert!(h
        .local
        .completion("u1", "H", "2025-03-02")
        .await
        .expect("fetch")
        .is_none());
    assert!(
        h.remote
            .get("users/u1/habits/H")
            .await
            .expect("get")
            .is_none(),
        "reconciliation finished the interrupted remote delete"
    );
    assert!(!h.guard.contains("H"), "guard cleared after remote confirmed");
    assert!(summary.errors.is_empty());
}
