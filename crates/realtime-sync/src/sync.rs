use crate::{CollectionView, SubscriptionHandle, SyncError, SyncResult, SyncedRecord};
use backing_store::{
    select_typed, Activity, AgentMetric, BackingStore, ChangeFeed, Collection, KnowledgeNode, Task,
};
use std::sync::{Arc, RwLock};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

pub(crate) struct Shared {
    pub(crate) store: Arc<dyn BackingStore>,
    pub(crate) feed: Arc<dyn ChangeFeed>,
    current_user: RwLock<Option<String>>,
    tasks: watch::Sender<CollectionView<Task>>,
    activities: watch::Sender<CollectionView<Activity>>,
    metrics: watch::Sender<CollectionView<AgentMetric>>,
    knowledge: watch::Sender<CollectionView<KnowledgeNode>>,
}

/// Maps a record type to its view channel.
pub(crate) trait ViewSlot: SyncedRecord {
    fn slot(shared: &Shared) -> &watch::Sender<CollectionView<Self>>;
}

impl ViewSlot for Task {
    fn slot(shared: &Shared) -> &watch::Sender<CollectionView<Self>> {
        &shared.tasks
    }
}

impl ViewSlot for Activity {
    fn slot(shared: &Shared) -> &watch::Sender<CollectionView<Self>> {
        &shared.activities
    }
}

impl ViewSlot for AgentMetric {
    fn slot(shared: &Shared) -> &watch::Sender<CollectionView<Self>> {
        &shared.metrics
    }
}

impl ViewSlot for KnowledgeNode {
    fn slot(shared: &Shared) -> &watch::Sender<CollectionView<Self>> {
        &shared.knowledge
    }
}

/// Applies `update` to the view if `user_id` is still the current user.
///
/// Returns false when the result belongs to a user that was switched away.
pub(crate) fn publish<T: ViewSlot>(
    shared: &Shared,
    user_id: &str,
    update: impl FnOnce(&mut CollectionView<T>),
) -> bool {
    let current = shared.current_user.read().expect("sync user lock poisoned");
    if current.as_deref() != Some(user_id) {
        return false;
    }
    T::slot(shared).send_modify(|view| {
        update(view);
        view.user_id = Some(user_id.to_string());
        view.revision += 1;
    });
    true
}

/// Fetches the whole collection and replaces the view in one publish.
/// Failures are recorded on the view; previous rows are kept.
pub(crate) async fn fetch_and_replace<T: ViewSlot>(shared: &Shared, user_id: &str) -> SyncResult<usize> {
    let collection = T::COLLECTION;
    match select_typed::<T>(shared.store.as_ref(), &T::query(user_id)).await {
        Ok(rows) => {
            let count = rows.len();
            let rows = Arc::new(rows);
            if publish::<T>(shared, user_id, |view| {
                view.rows = rows;
                view.error = None;
            }) {
                debug!(user_id, collection = %collection, count, "Collection replaced");
            }
            Ok(count)
        }
        Err(e) => {
            warn!(user_id, collection = %collection, error = %e, "Collection fetch failed");
            let error = SyncError::FetchFailed {
                collection,
                message: e.to_string(),
            };
            let stored = error.clone();
            publish::<T>(shared, user_id, |view| view.error = Some(stored));
            Err(error)
        }
    }
}

fn reset<T: ViewSlot>(shared: &Shared) {
    T::slot(shared).send_modify(|view| {
        view.user_id = None;
        view.rows = Arc::new(Vec::new());
        view.error = None;
        view.revision += 1;
    });
}

/// Realtime state sync for tasks, activities, agent metrics, and knowledge.
pub struct RealtimeStateSync {
    shared: Arc<Shared>,
    handles: Mutex<Vec<SubscriptionHandle>>,
}

impl RealtimeStateSync {
    pub fn new(store: Arc<dyn BackingStore>, feed: Arc<dyn ChangeFeed>) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                feed,
                current_user: RwLock::new(None),
                tasks: watch::channel(CollectionView::default()).0,
                activities: watch::channel(CollectionView::default()).0,
                metrics: watch::channel(CollectionView::default()).0,
                knowledge: watch::channel(CollectionView::default()).0,
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn current_user(&self) -> Option<String> {
        self.shared.current_user.read().expect("sync user lock poisoned").clone()
    }

    /// Switches the tracked user.
    ///
    /// Every existing handle is stopped and awaited, views are cleared, then
    /// one handle per collection starts for the new user. `None` signs out.
    /// Setting the user that is already fully subscribed does nothing.
    pub async fn set_user(&self, user_id: Option<String>) {
        let user_id = user_id.filter(|id| !id.trim().is_empty());
        let mut handles = self.handles.lock().await;

        let unchanged = self.current_user() == user_id
            && handles.len() == Collection::SYNCED.len()
            && handles.iter().all(SubscriptionHandle::is_active);
        if unchanged && user_id.is_some() {
            return;
        }

        *self.shared.current_user.write().expect("sync user lock poisoned") = None;
        let stopped = handles.len();
        for handle in handles.drain(..) {
            handle.stop().await;
        }
        reset::<Task>(&self.shared);
        reset::<Activity>(&self.shared);
        reset::<AgentMetric>(&self.shared);
        reset::<KnowledgeNode>(&self.shared);

        *self.shared.current_user.write().expect("sync user lock poisoned") = user_id.clone();

        if let Some(user_id) = user_id {
            handles.push(SubscriptionHandle::spawn::<Task>(Arc::clone(&self.shared), user_id.clone()));
            handles.push(SubscriptionHandle::spawn::<Activity>(Arc::clone(&self.shared), user_id.clone()));
            handles.push(SubscriptionHandle::spawn::<AgentMetric>(Arc::clone(&self.shared), user_id.clone()));
            handles.push(SubscriptionHandle::spawn::<KnowledgeNode>(Arc::clone(&self.shared), user_id.clone()));
            info!(user_id = %user_id, stopped, "Realtime sync started");
        } else {
            info!(stopped, "Realtime sync stopped");
        }
    }

    /// Stops every subscription. Same as `set_user(None)`.
    pub async fn shutdown(&self) {
        self.set_user(None).await;
    }

    /// Live handles as `(collection, user_id)`.
    pub async fn active_subscriptions(&self) -> Vec<(Collection, String)> {
        self.handles
            .lock()
            .await
            .iter()
            .filter(|handle| handle.is_active())
            .map(|handle| (handle.collection(), handle.user_id().to_string()))
            .collect()
    }

    /// Re-fetches one collection for the current user now.
    pub async fn refresh(&self, collection: Collection) -> SyncResult<usize> {
        let user_id = self.current_user().ok_or(SyncError::NoUser)?;
        match collection {
            Collection::Tasks => fetch_and_replace::<Task>(&self.shared, &user_id).await,
            Collection::Activities => fetch_and_replace::<Activity>(&self.shared, &user_id).await,
            Collection::AgentMetrics => fetch_and_replace::<AgentMetric>(&self.shared, &user_id).await,
            Collection::KnowledgeNodes => fetch_and_replace::<KnowledgeNode>(&self.shared, &user_id).await,
            Collection::Installations => Err(SyncError::Untracked(collection)),
        }
    }

    pub fn tasks(&self) -> watch::Receiver<CollectionView<Task>> {
        self.shared.tasks.subscribe()
    }

    pub fn activities(&self) -> watch::Receiver<CollectionView<Activity>> {
        self.shared.activities.subscribe()
    }

    pub fn metrics(&self) -> watch::Receiver<CollectionView<AgentMetric>> {
        self.shared.metrics.subscribe()
    }

    pub fn knowledge(&self) -> watch::Receiver<CollectionView<KnowledgeNode>> {
        self.shared.knowledge.subscribe()
    }

    /// Errors currently recorded on any view.
    pub fn errors(&self) -> Vec<SyncError> {
        [
            self.shared.tasks.borrow().error.clone(),
            self.shared.activities.borrow().error.clone(),
            self.shared.metrics.borrow().error.clone(),
            self.shared.knowledge.borrow().error.clone(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
