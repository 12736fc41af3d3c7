//! Remote events are immutable facts: insert-if-absent by operation id.

mod common;

use habitloop_core::habits::ProgressEvent;
use habitloop_engine::store::LocalStore;

#[tokio::test]
async fn remote_events_import_once() {
    let h = common::harness("u1");
    let date_key = common::today_key();

    let habit = common::habit("u1", "h1", common::at(2025, 3, 1, 9));
    h.local.upsert_habit(habit.clone()).await.expect("insert habit");
    common::seed_remote_habit(&h.remote, &habit).await;

    let mut remote_event = ProgressEvent::record("u1", "h1", &date_key, 1);
    remote_event.synced = true;
    common::seed_remote_event(&h.remote, &remote_event).await;

    let first = h.engine.pull().await.expect("first pull");
    assert_eq!(first.events_pulled, 1);

    let imported = h
        .local
        .event_by_operation_id("u1", &remote_event.operation_id)
        .await
        .expect("fetch")
        .expect("event imported");
    assert!(imported.synced, "imported rows arrive already synced");
    assert_eq!(imported.amount, 1);

    let second = h.engine.pull().await.expect("second pull");
    assert_eq!(second.events_pulled, 0, "operation id equality dedups");
}

#[tokio::test]
async fn locally_known_operation_ids_are_not_reimported() {
    let h = common::harness("u1");
    let date_key = common::today_key();

    let habit = common::habit("u1", "h1", common::at(2025, 3, 1, 9));
    h.local.upsert_habit(habit.clone()).await.expect("insert habit");
    common::seed_remote_habit(&h.remote, &habit).await;

    // The same logical action exists on both sides, e.g. uploaded by
    // this device and then seen again on pull.
    let event = ProgressEvent::record("u1", "h1", &date_key, 1);
    h.local.insert_event(event.clone()).await.expect("insert local");
    common::seed_remote_event(&h.remote, &event).await;

    let summary = h.engine.pull().await.expect("pull");
    assert_eq!(summary.events_pulled, 0);
}
