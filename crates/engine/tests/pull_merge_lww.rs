//! Completion merge is last-write-wins, not last-pull-wins.

mod common;

use chrono::Duration;

use habitloop_engine::store::LocalStore;

#[tokio::test]
async fn older_remote_snapshot_never_overwrites_newer_local_state() {
    let h = common::harness("u1");
    let t1 = common::at(2025, 3, 4, 20);

    let habit = common::habit("u1", "h1", common::at(2025, 3, 1, 9));
    h.local.upsert_habit(habit.clone()).await.expect("insert habit");
    common::seed_remote_habit(&h.remote, &habit).await;

    let mut local = common::completion("u1", "h1", "2025-03-04", 2, true, t1);
    local.synced = true;
    h.local.upsert_completion(local).await.expect("insert completion");

    // Remote snapshot is older but carries a higher progress value.
    let stale = common::completion("u1", "h1", "2025-03-04", 5, true, t1 - Duration::seconds(30));
    common::seed_remote_completion(&h.remote, &stale).await;

    h.engine.pull().await.expect("pull");

    let merged = h
        .local
        .completion("u1", "h1", "2025-03-04")
        .await
        .expect("fetch")
        .expect("exists");
    assert_eq!(merged.progress, 2, "local value survives an older remote");
    assert_eq!(merged.updated_at, t1);
}

#[tokio::test]
async fn repeated_pull_of_the_same_completion_is_a_noop() {
    let h = common::harness("u1");
    let habit = common::habit("u1", "h1", common::at(2025, 3, 1, 9));
    h.local.upsert_habit(habit.clone()).await.expect("insert habit");
    common::seed_remote_habit(&h.remote, &habit).await;

    let remote = common::completion("u1", "h1", "2025-03-04", 2, true, common::at(2025, 3, 4, 20));
    common::seed_remote_completion(&h.remote, &remote).await;

    let first = h.engine.pull().await.expect("first pull");
    assert_eq!(first.completions_pulled, 1);

    let second = h.engine.pull().await.expect("second pull");
    assert_eq!(second.completions_pulled, 0, "identical replay is a no-op");

    let merged = h
        .local
        .completion("u1", "h1", "2025-03-04")
        .await
        .expect("fetch")
        .expect("single row per (user, habit, date)");
    assert_eq!(merged.progress, 2);
}

#[tokio::test]
async fn tied_timestamps_with_differing_fields_take_the_remote_value() {
    let h = common::harness("u1");
    let t = common::at(2025, 3, 4, 20);

    let habit = common::habit("u1", "h1", common::at(2025, 3, 1, 9));
    h.local.upsert_habit(habit.clone()).await.expect("insert habit");
    common::seed_remote_habit(&h.remote, &habit).await;

    let mut local = common::completion("u1", "h1", "2025-03-04", 1, false, t);
    local.synced = true;
    h.local.upsert_completion(local).await.expect("insert completion");
    common::seed_remote_completion(&h.remote, &common::completion("u1", "h1", "2025-03-04", 2, true, t))
        .await;

    h.engine.pull().await.expect("pull");

    let merged = h
        .local
        .completion("u1", "h1", "2025-03-04")
        .await
        .expect("fetch")
        .expect("exists");
    assert_eq!(merged.progress, 2, "deterministic tie-break prefers remote");
    assert!(merged.is_completed);
}

#[tokio::test]
async fn in_flight_local_events_win_over_any_remote_snapshot() {
    let h = common::harness("u1");
    let t = common::at(2025, 3, 4, 20);

    let habit = common::habit("u1", "h1", common::at(2025, 3, 1, 9));
    h.local.upsert_habit(habit.clone()).await.expect("insert habit");
    common::seed_remote_habit(&h.remote, &habit).await;

    let mut local = common::completion("u1", "h1", "2025-03-04", 1, false, t);
    local.synced = true;
    h.local.upsert_completion(local).await.expect("insert completion");
    h.local
        .insert_event(habitloop_core::habits::ProgressEvent::record(
            "u1",
            "h1",
            "2025-03-04",
            1,
        ))
        .await
        .expect("queue unsynced event");

    // Remote is newer, but the local intent has not been uploaded yet.
    common::seed_remote_completion(
        &h.remote,
        &common::completion("u1", "h1", "2025-03-04", 5, true, t + Duration::hours(1)),
    )
    .await;

    let summary = h.engine.pull().await.expect("pull");
    assert_eq!(summary.completions_pulled, 0);

    let kept = h
        .local
        .completion("u1", "h1", "2025-03-04")
        .await
        .expect("fetch")
        .expect("exists");
    assert_eq!(kept.progress, 1, "merge skipped while events are in flight");
}
