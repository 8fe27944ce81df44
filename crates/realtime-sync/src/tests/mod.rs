//! Tests for realtime state sync.
//!
//! - `lifecycle.rs` - initial fetch, refetch on change, refresh, sign-out
//! - `isolation.rs` - user switches and per-collection failures

mod isolation;

use crate::{CollectionView, RealtimeStateSync};
use backing_store::{Collection, MemoryBackingStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(2);

fn sync_over(store: &MemoryBackingStore) -> RealtimeStateSync {
    RealtimeStateSync::new(Arc::new(store.clone()), Arc::new(store.clone()))
}

fn task_row(id: &str, user_id: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "instruction": format!("instruction {}", id),
        "status": "pending",
        "metadata": null,
        "created_at": created_at,
    })
}

fn activity_row(id: &str, user_id: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "type": "task_created",
        "description": "created",
        "created_at": "2026-01-01T00:00:00Z",
    })
}

fn metric_row(id: &str, user_id: &str, value: f64) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "metric_name": "tokens",
        "value": value,
        "recorded_at": "2026-01-01T00:00:00Z",
    })
}

fn knowledge_row(id: &str, user_id: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "title": "Notes",
        "tags": ["rust"],
        "updated_at": "2026-01-01T00:00:00Z",
    })
}

/// Waits until the view matches `pred`, panicking after [`WAIT`].
async fn wait_view<T>(rx: &mut watch::Receiver<CollectionView<T>>, pred: impl FnMut(&CollectionView<T>) -> bool) {
    tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("view did not settle in time")
        .expect("view channel closed");
}

/// Waits until every collection has been fetched at least once for `user_id`.
async fn wait_all_fetched(sync: &RealtimeStateSync, user_id: &str) {
    let fetched = |view_user: &Option<String>, revision: u64| view_user.as_deref() == Some(user_id) && revision > 0;
    wait_view(&mut sync.tasks(), |v| fetched(&v.user_id, v.revision)).await;
    wait_view(&mut sync.activities(), |v| fetched(&v.user_id, v.revision)).await;
    wait_view(&mut sync.metrics(), |v| fetched(&v.user_id, v.revision)).await;
    wait_view(&mut sync.knowledge(), |v| fetched(&v.user_id, v.revision)).await;
}

fn total_selects(store: &MemoryBackingStore) -> usize {
    Collection::SYNCED.iter().map(|c| store.select_count(*c)).sum()
}
