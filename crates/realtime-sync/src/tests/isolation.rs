use super::*;
use crate::SyncError;
use backing_store::{BackingStore, ChangeEvent, RowChange};

#[tokio::test]
async fn old_user_changes_after_switch_cause_no_fetch() {
    let store = MemoryBackingStore::new();
    store.seed(Collection::Tasks, [task_row("a1", "alice", "2026-01-01T00:00:00Z")]);
    store.seed(Collection::Tasks, [task_row("b1", "bob", "2026-01-01T00:00:00Z")]);

    let sync = sync_over(&store);
    sync.set_user(Some("alice".to_string())).await;
    wait_all_fetched(&sync, "alice").await;

    sync.set_user(Some("bob".to_string())).await;
    wait_all_fetched(&sync, "bob").await;
    let counts: Vec<usize> = Collection::SYNCED.iter().map(|c| store.select_count(*c)).collect();

    store.emit(RowChange::from_record(
        Collection::Tasks,
        ChangeEvent::Insert,
        task_row("a2", "alice", "2026-01-02T00:00:00Z"),
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after: Vec<usize> = Collection::SYNCED.iter().map(|c| store.select_count(*c)).collect();
    assert_eq!(after, counts);
    assert_eq!(store.subscriber_count(None), 4);
    for (_, user) in sync.active_subscriptions().await {
        assert_eq!(user, "bob");
    }

    let tasks = sync.tasks().borrow().clone();
    assert_eq!(tasks.user_id.as_deref(), Some("bob"));
    let ids: Vec<&str> = tasks.rows.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["b1"]);
}

#[tokio::test]
async fn new_user_changes_trigger_refetch_after_switch() {
    let store = MemoryBackingStore::new();
    let sync = sync_over(&store);
    sync.set_user(Some("alice".to_string())).await;
    wait_all_fetched(&sync, "alice").await;
    sync.set_user(Some("bob".to_string())).await;
    wait_all_fetched(&sync, "bob").await;

    store
        .insert(Collection::Activities, activity_row("x1", "bob"))
        .await
        .unwrap();

    let mut activities = sync.activities();
    wait_view(&mut activities, |v| v.len() == 1).await;
    assert_eq!(activities.borrow().rows[0].user_id, "bob");
}

#[tokio::test]
async fn failing_collection_does_not_affect_the_others() {
    let store = MemoryBackingStore::new();
    store.seed(Collection::Tasks, [task_row("t1", "alice", "2026-01-01T00:00:00Z")]);
    store.seed(Collection::Activities, [activity_row("a1", "alice")]);
    store.fail_selects(Collection::Activities, true);

    let sync = sync_over(&store);
    sync.set_user(Some("alice".to_string())).await;
    wait_all_fetched(&sync, "alice").await;

    let activities = sync.activities().borrow().clone();
    assert!(activities.is_empty());
    assert!(matches!(
        activities.error,
        Some(SyncError::FetchFailed { collection: Collection::Activities, .. })
    ));
    assert_eq!(sync.tasks().borrow().len(), 1);
    assert!(sync.tasks().borrow().error.is_none());
    assert_eq!(sync.errors().len(), 1);

    // Subscription is still live; the next change retries the fetch.
    store.fail_selects(Collection::Activities, false);
    store
        .insert(Collection::Activities, activity_row("a2", "alice"))
        .await
        .unwrap();

    let mut rx = sync.activities();
    wait_view(&mut rx, |v| v.len() == 2 && v.error.is_none()).await;
    assert!(sync.errors().is_empty());
}

#[tokio::test]
async fn failed_refetch_keeps_previous_rows() {
    let store = MemoryBackingStore::new();
    store.seed(Collection::AgentMetrics, [metric_row("m1", "alice", 1.0)]);

    let sync = sync_over(&store);
    sync.set_user(Some("alice".to_string())).await;
    wait_all_fetched(&sync, "alice").await;

    store.fail_selects(Collection::AgentMetrics, true);
    let result = sync.refresh(Collection::AgentMetrics).await;
    assert!(matches!(result, Err(SyncError::FetchFailed { .. })));

    let metrics = sync.metrics().borrow().clone();
    assert_eq!(metrics.len(), 1);
    assert!(metrics.error.is_some());
}

#[tokio::test]
async fn malformed_rows_surface_as_fetch_failure() {
    let store = MemoryBackingStore::new();
    store.seed(
        Collection::Tasks,
        [json!({ "id": "t1", "user_id": "alice", "status": "pending", "metadata": "oops" })],
    );

    let sync = sync_over(&store);
    sync.set_user(Some("alice".to_string())).await;
    wait_all_fetched(&sync, "alice").await;

    let tasks = sync.tasks().borrow().clone();
    assert!(tasks.is_empty());
    assert!(matches!(
        tasks.error,
        Some(SyncError::FetchFailed { collection: Collection::Tasks, .. })
    ));
}

#[tokio::test]
async fn rapid_switches_leave_only_the_last_user_subscribed() {
    let store = MemoryBackingStore::new();
    let sync = sync_over(&store);

    for user in ["alice", "bob", "carol", "dave"] {
        sync.set_user(Some(user.to_string())).await;
    }
    wait_all_fetched(&sync, "dave").await;

    assert_eq!(store.subscriber_count(None), 4);
    let active = sync.active_subscriptions().await;
    assert_eq!(active.len(), 4);
    assert!(active.iter().all(|(_, user)| user == "dave"));
}
