//! File-backed key-value store.
//!
//! Each key is one file under the root directory. Key names are escaped so
//! any string maps to a single, reversible file name. Writes go through a
//! temp file and a rename so readers never observe a partial value.

use crate::{
    ContextId, KeyValueStore, StorageError, StorageEvent, StorageResult, EVENT_CHANNEL_CAPACITY,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Persistent store rooted at a directory.
///
/// Handles from [`FileStore::open_context`] share a notification channel.
/// Writes made by another process are visible on read but are not announced.
#[derive(Clone)]
pub struct FileStore {
    root: Arc<PathBuf>,
    events: broadcast::Sender<StorageEvent>,
    context: ContextId,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            StorageError::Unavailable(format!("cannot create {}: {}", root.display(), e))
        })?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            root: Arc::new(root),
            events,
            context: ContextId::next(),
        })
    }

    /// Opens another handle over the same directory with its own context.
    pub fn open_context(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            events: self.events.clone(),
            context: ContextId::next(),
        }
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(escape_key(key))
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        let _ = self.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
            origin: self.context,
        });
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageError::Encoding(format!("{}: {}", key, e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let target = self.path_for(key);
        let tmp = self
            .root
            .join(format!(".{}.tmp-{}", escape_key(key), self.context));
        std::fs::write(&tmp, value)?;
        if let Err(e) = std::fs::rename(&tmp, &target) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(key, bytes = value.len(), "file store write");
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                self.notify(key, None);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    fn context_id(&self) -> ContextId {
        self.context
    }
}

/// Escapes everything outside `[A-Za-z0-9._-]` as `%XX`.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    // Leading dots would collide with temp files.
    if out.starts_with('.') {
        out.replace_range(0..1, "%2E");
    }
    out
}
