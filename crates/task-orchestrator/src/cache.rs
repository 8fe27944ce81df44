use backing_store::Task;
use realtime_sync::CollectionView;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Local, eventually consistent copy of the user's tasks, newest first.
#[derive(Clone, Default)]
pub struct TaskCache {
    tasks: Arc<RwLock<Vec<Task>>>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `task` first, dropping any cached copy with the same id.
    pub fn prepend(&self, task: Task) {
        let mut tasks = self.tasks.write().expect("task cache lock poisoned");
        tasks.retain(|cached| cached.id != task.id);
        tasks.insert(0, task);
    }

    /// Replaces the whole list with a fresh fetch.
    pub fn replace_all(&self, tasks: Vec<Task>) {
        *self.tasks.write().expect("task cache lock poisoned") = tasks;
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks
            .read()
            .expect("task cache lock poisoned")
            .iter()
            .find(|task| task.id == id)
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.read().expect("task cache lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().expect("task cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies one remote row. Returns false when the status move is not
    /// allowed by the task lifecycle; the cached copy is then left alone.
    pub fn apply_remote_update(&self, task: Task) -> bool {
        let mut tasks = self.tasks.write().expect("task cache lock poisoned");
        match tasks.iter_mut().find(|cached| cached.id == task.id) {
            Some(cached) => {
                if !cached.status.can_transition_to(task.status) {
                    warn!(
                        task_id = %task.id,
                        from = %cached.status,
                        to = %task.status,
                        "Ignoring illegal task status transition"
                    );
                    return false;
                }
                *cached = task;
            }
            None => tasks.insert(0, task),
        }
        true
    }

    /// Mirrors every published tasks view into the cache until the sender
    /// goes away.
    pub fn follow(&self, mut views: watch::Receiver<CollectionView<Task>>) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            while views.changed().await.is_ok() {
                let rows = Arc::clone(&views.borrow_and_update().rows);
                debug!(count = rows.len(), "Task cache refreshed from sync");
                cache.replace_all(rows.as_ref().clone());
            }
        })
    }
}

impl std::fmt::Debug for TaskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCache").field("len", &self.len()).finish()
    }
}
