use crate::{CredentialVault, VaultState};
use hub_storage::StorageKeys;
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Keeps a [`VaultState`] current for one user.
///
/// Reloads when another context changes the user's record and when the
/// session secret changes. Dropping the watcher stops it.
pub struct VaultWatcher {
    state: watch::Receiver<VaultState>,
    secret: watch::Sender<Option<String>>,
    task: JoinHandle<()>,
}

impl VaultWatcher {
    /// Loads the current state and starts watching. Must run inside a tokio runtime.
    pub fn spawn(vault: Arc<CredentialVault>, user_id: impl Into<String>, secret: Option<String>) -> Self {
        let user_id = user_id.into();
        let initial = VaultState::from_load(vault.load(&user_id, secret.as_deref()));
        let (state_tx, state_rx) = watch::channel(initial);
        let (secret_tx, mut secret_rx) = watch::channel(secret);

        let mut events = vault.store().subscribe();
        let context = vault.store().context_id();
        let record_key = StorageKeys::vault_record(&user_id);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = secret_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Ok(event) if event.key == record_key && event.is_external_to(context) => {
                            debug!(user_id = %user_id, "vault record changed in another context");
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(user_id = %user_id, missed, "vault watcher lagged; reloading");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }

                let secret = secret_rx.borrow_and_update().clone();
                // The backing store may do file I/O.
                let reload = tokio::task::spawn_blocking({
                    let vault = Arc::clone(&vault);
                    let user_id = user_id.clone();
                    move || VaultState::from_load(vault.load(&user_id, secret.as_deref()))
                });
                let state = match reload.await {
                    Ok(state) => state,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "vault reload task failed");
                        continue;
                    }
                };
                if state_tx.send(state).is_err() {
                    break;
                }
            }
        });

        Self {
            state: state_rx,
            secret: secret_tx,
            task,
        }
    }

    /// Latest state.
    pub fn state(&self) -> VaultState {
        self.state.borrow().clone()
    }

    /// Receiver that is notified on every reload.
    pub fn subscribe(&self) -> watch::Receiver<VaultState> {
        self.state.clone()
    }

    /// Replaces the session secret and reloads.
    pub fn set_secret(&self, secret: Option<String>) {
        self.secret.send_replace(secret);
    }

    /// Reloads with the current secret, e.g. after a write from this context.
    pub fn refresh(&self) {
        self.secret.send_modify(|_| {});
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for VaultWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
