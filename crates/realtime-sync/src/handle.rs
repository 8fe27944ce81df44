use crate::sync::{fetch_and_replace, publish, Shared, ViewSlot};
use crate::SyncError;
use backing_store::{ChangeFilter, Collection};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One collection's live subscription for one user.
///
/// Stopping or dropping the handle aborts its task, which drops the change
/// subscription and unsubscribes from the feed.
pub struct SubscriptionHandle {
    collection: Collection,
    user_id: String,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub(crate) fn spawn<T: ViewSlot>(shared: Arc<Shared>, user_id: String) -> Self {
        let task_user = user_id.clone();
        let task = tokio::spawn(async move {
            let user_id = task_user;
            let collection = T::COLLECTION;

            let subscription = match shared.feed.subscribe(ChangeFilter::new(collection, &user_id)).await {
                Ok(subscription) => Some(subscription),
                Err(e) => {
                    warn!(user_id = %user_id, collection = %collection, error = %e, "Change subscription failed");
                    let error = SyncError::SubscribeFailed {
                        collection,
                        message: e.to_string(),
                    };
                    publish::<T>(&shared, &user_id, |view| view.error = Some(error));
                    None
                }
            };

            // Initial fetch does not wait for a first change.
            let _ = fetch_and_replace::<T>(&shared, &user_id).await;

            let Some(mut subscription) = subscription else {
                return;
            };
            while let Some(change) = subscription.recv().await {
                if change.user_id.as_deref().is_some_and(|owner| owner != user_id) {
                    debug!(collection = %collection, "Ignoring change for another user");
                    continue;
                }
                debug!(collection = %collection, event = ?change.event, "Row change; refetching");
                let _ = fetch_and_replace::<T>(&shared, &user_id).await;
            }
            debug!(collection = %collection, "Change feed closed");
        });

        Self {
            collection: T::COLLECTION,
            user_id,
            task: Some(task),
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Still listening for changes.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Aborts the task and waits for it to finish.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("collection", &self.collection)
            .field("user_id", &self.user_id)
            .field("active", &self.is_active())
            .finish()
    }
}
