//! Tables, scans, and change filters.

use crate::{ChangeEvent, RowChange};
use serde::{Deserialize, Serialize};

/// Column holding the owning user's id in every tracked table.
pub const OWNER_COLUMN: &str = "user_id";

/// Tables the hub reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Tasks,
    Activities,
    AgentMetrics,
    KnowledgeNodes,
    Installations,
}

impl Collection {
    /// The four collections kept fresh by realtime sync.
    pub const SYNCED: [Collection; 4] = [
        Collection::Tasks,
        Collection::Activities,
        Collection::AgentMetrics,
        Collection::KnowledgeNodes,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Collection::Tasks => "tasks",
            Collection::Activities => "activities",
            Collection::AgentMetrics => "agent_metrics",
            Collection::KnowledgeNodes => "knowledge_nodes",
            Collection::Installations => "github_installations",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        match table {
            "tasks" => Some(Collection::Tasks),
            "activities" => Some(Collection::Activities),
            "agent_metrics" => Some(Collection::AgentMetrics),
            "knowledge_nodes" => Some(Collection::KnowledgeNodes),
            "github_installations" => Some(Collection::Installations),
            _ => None,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// A filtered, ordered, limited scan of one table.
///
/// Filters are equality matches on column values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowQuery {
    pub collection: Collection,
    pub filters: Vec<(String, String)>,
    /// Column and whether to sort descending.
    pub order_by: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Scan of the rows owned by `user_id`.
    pub fn owned_by(collection: Collection, user_id: &str) -> Self {
        Self::new(collection).eq(OWNER_COLUMN, user_id)
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some((column.into(), true));
        self
    }

    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some((column.into(), false));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Row changes of one table owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeFilter {
    pub collection: Collection,
    pub user_id: String,
}

impl ChangeFilter {
    pub fn new(collection: Collection, user_id: impl Into<String>) -> Self {
        Self {
            collection,
            user_id: user_id.into(),
        }
    }

    /// PostgREST-style filter expression sent to the realtime service.
    pub fn expression(&self) -> String {
        format!("{}=eq.{}", OWNER_COLUMN, self.user_id)
    }

    /// Whether `change` belongs to this filter's table and user.
    ///
    /// A delete without an owner is accepted: the realtime service only sends
    /// the primary key of deleted rows, already scoped to the subscribed user.
    pub fn matches(&self, change: &RowChange) -> bool {
        if change.table != self.collection.table() {
            return false;
        }
        match change.user_id.as_deref() {
            Some(owner) => owner == self.user_id,
            None => change.event == ChangeEvent::Delete,
        }
    }

    /// Returns `change` with its owner filled in when it matches.
    pub fn claim(&self, mut change: RowChange) -> Option<RowChange> {
        if !self.matches(&change) {
            return None;
        }
        change.user_id.get_or_insert_with(|| self.user_id.clone());
        Some(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_round_trip() {
        for collection in [
            Collection::Tasks,
            Collection::Activities,
            Collection::AgentMetrics,
            Collection::KnowledgeNodes,
            Collection::Installations,
        ] {
            assert_eq!(Collection::from_table(collection.table()), Some(collection));
        }
        assert_eq!(Collection::Installations.table(), "github_installations");
        assert_eq!(Collection::from_table("users"), None);
    }

    #[test]
    fn owned_by_builds_owner_filter() {
        let query = RowQuery::owned_by(Collection::Tasks, "u1")
            .order_desc("created_at")
            .limit(50);
        assert_eq!(query.filters, vec![("user_id".to_string(), "u1".to_string())]);
        assert_eq!(query.order_by, Some(("created_at".to_string(), true)));
        assert_eq!(query.limit, Some(50));
    }

    #[test]
    fn change_filter_matches_table_and_owner() {
        let filter = ChangeFilter::new(Collection::Tasks, "u1");
        assert_eq!(filter.expression(), "user_id=eq.u1");

        let mut change = RowChange {
            table: "tasks".to_string(),
            event: crate::ChangeEvent::Insert,
            user_id: Some("u1".to_string()),
            record: serde_json::json!({}),
        };
        assert!(filter.matches(&change));

        change.user_id = Some("u2".to_string());
        assert!(!filter.matches(&change));

        change.user_id = Some("u1".to_string());
        change.table = "activities".to_string();
        assert!(!filter.matches(&change));
    }

    #[test]
    fn ownerless_delete_is_claimed_for_the_filter_user() {
        let filter = ChangeFilter::new(Collection::Tasks, "u1");
        let mut change = RowChange {
            table: "tasks".to_string(),
            event: crate::ChangeEvent::Delete,
            user_id: None,
            record: serde_json::json!({ "id": "t1" }),
        };

        let claimed = filter.claim(change.clone()).unwrap();
        assert_eq!(claimed.user_id.as_deref(), Some("u1"));

        change.event = crate::ChangeEvent::Update;
        assert!(filter.claim(change).is_none());
    }
}
