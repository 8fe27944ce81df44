//! Backing store trait definitions.

use crate::{decode_rows, ChangeFilter, Collection, RowChange, RowQuery, StoreResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

/// Row access on the backing store.
///
/// Rows are JSON objects; use [`select_typed`] or [`decode_rows`] to validate
/// them into record types.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Filtered, ordered, limited scan.
    async fn select(&self, query: &RowQuery) -> StoreResult<Vec<Value>>;

    /// Inserts one row and returns it as stored.
    async fn insert(&self, collection: Collection, row: Value) -> StoreResult<Value>;

    /// Inserts or merges one row keyed by the comma-separated `on_conflict`
    /// columns, and returns it as stored.
    async fn upsert(&self, collection: Collection, row: Value, on_conflict: &str) -> StoreResult<Value>;

    /// Merges `patch` into every row matching `filters`; returns the updated rows.
    async fn update(
        &self,
        collection: Collection,
        filters: &[(String, String)],
        patch: Value,
    ) -> StoreResult<Vec<Value>>;
}

/// Row-level change notifications.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Starts delivering changes matching `filter` until the returned
    /// subscription is closed or dropped.
    async fn subscribe(&self, filter: ChangeFilter) -> StoreResult<ChangeSubscription>;
}

/// Scans and decodes rows in one step.
pub async fn select_typed<T: DeserializeOwned>(
    store: &dyn BackingStore,
    query: &RowQuery,
) -> StoreResult<Vec<T>> {
    let rows = store.select(query).await?;
    decode_rows(query.collection, rows)
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// A live change subscription. Unsubscribes when closed or dropped.
pub struct ChangeSubscription {
    filter: ChangeFilter,
    rx: mpsc::UnboundedReceiver<RowChange>,
    on_close: Option<CloseHook>,
}

impl ChangeSubscription {
    /// Wraps a receiver. `on_close` runs exactly once, on close or drop.
    pub fn new(
        filter: ChangeFilter,
        rx: mpsc::UnboundedReceiver<RowChange>,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            filter,
            rx,
            on_close: Some(Box::new(on_close)),
        }
    }

    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }

    /// Next change, or `None` once the feed has shut down.
    pub async fn recv(&mut self) -> Option<RowChange> {
        self.rx.recv().await
    }

    /// Next change if one is already queued.
    pub fn try_recv(&mut self) -> Option<RowChange> {
        self.rx.try_recv().ok()
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}
