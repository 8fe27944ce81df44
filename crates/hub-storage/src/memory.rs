//! In-memory key-value store.

use crate::{
    ContextId, KeyValueStore, StorageError, StorageEvent, StorageResult, EVENT_CHANNEL_CAPACITY,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

struct Backing {
    data: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

/// Process-local store. Handles opened with [`MemoryStore::open_context`]
/// share one map and one notification channel, like tabs sharing storage.
#[derive(Clone)]
pub struct MemoryStore {
    backing: Arc<Backing>,
    context: ContextId,
    enabled: bool,
}

impl MemoryStore {
    /// Creates a new, empty backing and returns the first handle over it.
    pub fn shared() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backing: Arc::new(Backing {
                data: Mutex::new(HashMap::new()),
                events,
            }),
            context: ContextId::next(),
            enabled: true,
        }
    }

    /// A store whose every operation fails with [`StorageError::Unavailable`].
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::shared()
        }
    }

    /// Opens another handle over the same backing with its own context.
    pub fn open_context(&self) -> Self {
        Self {
            backing: Arc::clone(&self.backing),
            context: ContextId::next(),
            enabled: self.enabled,
        }
    }

    fn ensure_enabled(&self) -> StorageResult<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(StorageError::Unavailable("storage is disabled".to_string()))
        }
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        // No subscribers is fine.
        let _ = self.backing.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
            origin: self.context,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::shared()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.ensure_enabled()?;
        let data = self.backing.data.lock().expect("memory store lock poisoned");
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.ensure_enabled()?;
        {
            let mut data = self.backing.data.lock().expect("memory store lock poisoned");
            data.insert(key.to_string(), value.to_string());
        }
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.ensure_enabled()?;
        let removed = {
            let mut data = self.backing.data.lock().expect("memory store lock poisoned");
            data.remove(key).is_some()
        };
        if removed {
            self.notify(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.backing.events.subscribe()
    }

    fn context_id(&self) -> ContextId {
        self.context
    }
}
