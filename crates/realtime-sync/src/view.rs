use crate::SyncError;
use backing_store::{Activity, AgentMetric, Collection, KnowledgeNode, RowQuery, Task};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Snapshot of one synced collection.
#[derive(Debug, Clone)]
pub struct CollectionView<T> {
    /// User the rows belong to.
    pub user_id: Option<String>,
    pub rows: Arc<Vec<T>>,
    /// Last failure; cleared by the next successful fetch. Rows are kept.
    pub error: Option<SyncError>,
    /// Bumped on every publish.
    pub revision: u64,
}

impl<T> Default for CollectionView<T> {
    fn default() -> Self {
        Self {
            user_id: None,
            rows: Arc::new(Vec::new()),
            error: None,
            revision: 0,
        }
    }
}

impl<T> CollectionView<T> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A record type kept fresh by realtime sync.
pub trait SyncedRecord: DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;
    const ORDER_COLUMN: &'static str;
    const LIMIT: usize;

    /// Newest-first scan of the user's rows.
    fn query(user_id: &str) -> RowQuery {
        RowQuery::owned_by(Self::COLLECTION, user_id)
            .order_desc(Self::ORDER_COLUMN)
            .limit(Self::LIMIT)
    }
}

impl SyncedRecord for Task {
    const COLLECTION: Collection = Collection::Tasks;
    const ORDER_COLUMN: &'static str = "created_at";
    const LIMIT: usize = 50;
}

impl SyncedRecord for Activity {
    const COLLECTION: Collection = Collection::Activities;
    const ORDER_COLUMN: &'static str = "created_at";
    const LIMIT: usize = 50;
}

impl SyncedRecord for AgentMetric {
    const COLLECTION: Collection = Collection::AgentMetrics;
    const ORDER_COLUMN: &'static str = "recorded_at";
    const LIMIT: usize = 100;
}

impl SyncedRecord for KnowledgeNode {
    const COLLECTION: Collection = Collection::KnowledgeNodes;
    const ORDER_COLUMN: &'static str = "updated_at";
    const LIMIT: usize = 100;
}
