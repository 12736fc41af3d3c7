//! A remote completion referencing a habit with no local definition is
//! never imported.

mod common;

use habitloop_engine::store::LocalStore;

#[tokio::test]
async fn completion_without_local_habit_is_skipped() {
    let h = common::harness("u1");

    common::seed_remote_completion(
        &h.remote,
        &common::completion("u1", "ghost", "2025-03-04", 2, true, common::at(2025, 3, 4, 20)),
    )
    .await;

    let summary = h.engine.pull().await.expect("pull");

    assert_eq!(summary.completions_pulled, 0);
    assert!(
        h.local
            .completion("u1", "ghost", "2025-03-04")
            .await
            .expect("fetch")
            .is_none(),
        "orphan completion rejected"
    );
}
