//! In-memory backing store and change feed.

use crate::{
    BackingStore, ChangeEvent, ChangeFeed, ChangeFilter, ChangeSubscription, Collection, RowChange,
    RowQuery, StoreError, StoreResult,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

struct Subscriber {
    id: u64,
    filter: ChangeFilter,
    tx: mpsc::UnboundedSender<RowChange>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<Collection, Vec<Value>>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    select_counts: HashMap<Collection, usize>,
    write_count: usize,
    failing_selects: HashSet<Collection>,
}

impl Inner {
    fn emit(&mut self, change: &RowChange) {
        self.subscribers.retain(|sub| {
            match sub.filter.claim(change.clone()) {
                Some(claimed) => sub.tx.send(claimed).is_ok(),
                None => true,
            }
        });
    }
}

/// Backing store held in process memory.
///
/// Writes notify matching subscribers. Every select is counted per table, and
/// selects on a table can be made to fail.
#[derive(Clone, Default)]
pub struct MemoryBackingStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory backing store lock poisoned")
    }

    /// Adds rows without emitting changes.
    pub fn seed(&self, collection: Collection, rows: impl IntoIterator<Item = Value>) {
        self.lock().tables.entry(collection).or_default().extend(rows);
    }

    /// Current rows of a table, in insertion order.
    pub fn rows(&self, collection: Collection) -> Vec<Value> {
        self.lock().tables.get(&collection).cloned().unwrap_or_default()
    }

    /// Number of selects issued against a table.
    pub fn select_count(&self, collection: Collection) -> usize {
        self.lock().select_counts.get(&collection).copied().unwrap_or(0)
    }

    /// Selects across all tables plus writes.
    pub fn total_calls(&self) -> usize {
        let inner = self.lock();
        inner.select_counts.values().sum::<usize>() + inner.write_count
    }

    /// Makes selects on `collection` fail until reset.
    pub fn fail_selects(&self, collection: Collection, fail: bool) {
        let mut inner = self.lock();
        if fail {
            inner.failing_selects.insert(collection);
        } else {
            inner.failing_selects.remove(&collection);
        }
    }

    /// Live subscriptions, optionally for one table.
    pub fn subscriber_count(&self, collection: Option<Collection>) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|sub| !sub.tx.is_closed());
        inner
            .subscribers
            .iter()
            .filter(|sub| collection.map_or(true, |c| sub.filter.collection == c))
            .count()
    }

    /// Delivers `change` to matching subscribers as if the remote side wrote it.
    pub fn emit(&self, change: RowChange) {
        self.lock().emit(&change);
    }

    /// Deletes matching rows as the remote side would.
    ///
    /// Each notification carries only the row id, with no owner.
    pub fn delete_remote(&self, collection: Collection, filters: &[(String, String)]) -> usize {
        let mut inner = self.lock();
        let table = inner.tables.entry(collection).or_default();
        let mut removed = Vec::new();
        table.retain(|row| {
            if matches_filters(row, filters) {
                removed.push(json!({ "id": row.get("id").cloned().unwrap_or(Value::Null) }));
                false
            } else {
                true
            }
        });

        for key in &removed {
            inner.emit(&RowChange {
                table: collection.table().to_string(),
                event: ChangeEvent::Delete,
                user_id: None,
                record: key.clone(),
            });
        }
        removed.len()
    }

    fn unsubscribe(&self, id: u64) {
        self.lock().subscribers.retain(|sub| sub.id != id);
    }
}

fn column_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn matches_filters(row: &Value, filters: &[(String, String)]) -> bool {
    filters
        .iter()
        .all(|(column, value)| column_text(row, column).as_deref() == Some(value.as_str()))
}

fn compare_column(a: &Value, b: &Value, column: &str) -> Ordering {
    match (a.get(column), b.get(column)) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => column_text(a, column).cmp(&column_text(b, column)),
    }
}

fn merge_into(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn with_defaults(row: Value) -> StoreResult<Value> {
    let Value::Object(mut object) = row else {
        return Err(StoreError::Config("row must be a JSON object".to_string()));
    };
    let now = Value::String(chrono::Utc::now().to_rfc3339());
    object
        .entry("id")
        .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
    object.entry("created_at").or_insert_with(|| now.clone());
    object.entry("updated_at").or_insert(now);
    Ok(Value::Object(object))
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn select(&self, query: &RowQuery) -> StoreResult<Vec<Value>> {
        let mut inner = self.lock();
        *inner.select_counts.entry(query.collection).or_default() += 1;
        if inner.failing_selects.contains(&query.collection) {
            return Err(StoreError::Supabase {
                status: 503,
                message: format!("injected failure for {}", query.collection),
            });
        }

        let mut rows: Vec<Value> = inner
            .tables
            .get(&query.collection)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_filters(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((column, descending)) = &query.order_by {
            rows.sort_by(|a, b| {
                let ord = compare_column(a, b, column);
                if *descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, collection: Collection, row: Value) -> StoreResult<Value> {
        let row = with_defaults(row)?;
        let mut inner = self.lock();
        inner.write_count += 1;
        inner.tables.entry(collection).or_default().push(row.clone());
        inner.emit(&RowChange::from_record(collection, ChangeEvent::Insert, row.clone()));
        Ok(row)
    }

    async fn upsert(&self, collection: Collection, row: Value, on_conflict: &str) -> StoreResult<Value> {
        let keys: Vec<(String, String)> = on_conflict
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|column| {
                column_text(&row, column)
                    .map(|value| (column.to_string(), value))
                    .ok_or_else(|| StoreError::Config(format!("upsert row lacks conflict column {}", column)))
            })
            .collect::<StoreResult<_>>()?;

        let mut inner = self.lock();
        inner.write_count += 1;
        let table = inner.tables.entry(collection).or_default();

        let (stored, event) = match table.iter_mut().find(|existing| matches_filters(existing, &keys)) {
            Some(existing) => {
                merge_into(existing, &row);
                merge_into(
                    existing,
                    &Value::Object(Map::from_iter([(
                        "updated_at".to_string(),
                        Value::String(chrono::Utc::now().to_rfc3339()),
                    )])),
                );
                (existing.clone(), ChangeEvent::Update)
            }
            None => {
                let row = with_defaults(row)?;
                table.push(row.clone());
                (row, ChangeEvent::Insert)
            }
        };

        inner.emit(&RowChange::from_record(collection, event, stored.clone()));
        Ok(stored)
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[(String, String)],
        patch: Value,
    ) -> StoreResult<Vec<Value>> {
        let mut inner = self.lock();
        inner.write_count += 1;
        let updated: Vec<Value> = inner
            .tables
            .entry(collection)
            .or_default()
            .iter_mut()
            .filter(|row| matches_filters(row, filters))
            .map(|row| {
                merge_into(row, &patch);
                row.clone()
            })
            .collect();

        for row in &updated {
            inner.emit(&RowChange::from_record(collection, ChangeEvent::Update, row.clone()));
        }
        Ok(updated)
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackingStore {
    async fn subscribe(&self, filter: ChangeFilter) -> StoreResult<ChangeSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            inner.next_subscriber += 1;
            let id = inner.next_subscriber;
            inner.subscribers.push(Subscriber {
                id,
                filter: filter.clone(),
                tx,
            });
            id
        };

        let store = self.clone();
        Ok(ChangeSubscription::new(filter, rx, move || store.unsubscribe(id)))
    }
}

impl std::fmt::Debug for MemoryBackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryBackingStore")
            .field("tables", &inner.tables.len())
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}
