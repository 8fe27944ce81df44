use crate::*;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hub_storage::{FileStore, KeyValueStore, MemoryStore, StorageKeys};
use std::sync::Arc;
use std::time::Duration;

fn vault_over(store: MemoryStore) -> CredentialVault {
    CredentialVault::new(Arc::new(store))
}

fn stored_record(store: &MemoryStore, user_id: &str) -> Option<VaultRecord> {
    store
        .get(&StorageKeys::vault_record(user_id))
        .unwrap()
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

// ==========================================
// persist / load / clear
// ==========================================

#[test]
fn persist_then_load_with_same_secret() {
    let vault = vault_over(MemoryStore::shared());
    vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();

    assert_eq!(
        vault.load("u1", Some("sess-1")).unwrap(),
        VaultLoad::Unlocked("ghp_abc123".to_string())
    );
}

#[test]
fn persist_trims_token() {
    let vault = vault_over(MemoryStore::shared());
    vault.persist("u1", "  ghp_abc123\n", Some("sess-1")).unwrap();
    assert_eq!(
        vault.load("u1", Some("sess-1")).unwrap(),
        VaultLoad::Unlocked("ghp_abc123".to_string())
    );
}

#[test]
fn persist_rejects_empty_input_and_missing_session() {
    let vault = vault_over(MemoryStore::shared());

    let err = vault.persist("u1", "   ", Some("sess-1")).unwrap_err();
    assert_eq!(err, VaultError::EmptyInput);
    assert_eq!(err.cause(), "empty-input");

    let err = vault.persist("u1", "ghp_abc123", None).unwrap_err();
    assert_eq!(err, VaultError::NoSession);
    assert_eq!(err.cause(), "locked");

    assert_eq!(vault.persist("u1", "ghp_abc123", Some("")).unwrap_err(), VaultError::NoSession);
}

#[test]
fn persist_stores_record_with_fresh_nonce() {
    let store = MemoryStore::shared();
    let vault = vault_over(store.clone());

    vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();
    let first = stored_record(&store, "u1").unwrap();
    vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();
    let second = stored_record(&store, "u1").unwrap();

    assert_ne!(first.nonce, second.nonce);
    assert_ne!(first.ciphertext, second.ciphertext);
    assert_eq!(first.key_check, second.key_check);
    assert!(!first.ciphertext.contains("ghp_abc123"));
}

#[test]
fn load_missing_record_is_absent() {
    let vault = vault_over(MemoryStore::shared());
    assert_eq!(vault.load("nobody", Some("sess-1")).unwrap(), VaultLoad::Absent);
}

#[test]
fn clear_is_idempotent() {
    let vault = vault_over(MemoryStore::shared());
    vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();

    vault.clear("u1").unwrap();
    vault.clear("u1").unwrap();
    assert_eq!(vault.load("u1", Some("sess-1")).unwrap(), VaultLoad::Absent);
}

#[test]
fn records_are_scoped_per_user() {
    let vault = vault_over(MemoryStore::shared());
    vault.persist("u1", "token-one", Some("sess-1")).unwrap();
    vault.persist("u2", "token-two", Some("sess-1")).unwrap();

    vault.clear("u1").unwrap();
    assert_eq!(vault.load("u1", Some("sess-1")).unwrap(), VaultLoad::Absent);
    assert_eq!(
        vault.load("u2", Some("sess-1")).unwrap(),
        VaultLoad::Unlocked("token-two".to_string())
    );
}

// ==========================================
// Session rotation vs corruption
// ==========================================

#[test]
fn rotated_secret_locks_and_keeps_record() {
    let store = MemoryStore::shared();
    let vault = vault_over(store.clone());
    vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();

    assert_eq!(vault.load("u1", Some("sess-2")).unwrap(), VaultLoad::Locked);
    assert!(stored_record(&store, "u1").is_some());

    // The original secret still unlocks it.
    assert_eq!(
        vault.load("u1", Some("sess-1")).unwrap(),
        VaultLoad::Unlocked("ghp_abc123".to_string())
    );
}

#[test]
fn missing_secret_locks_and_keeps_record() {
    let store = MemoryStore::shared();
    let vault = vault_over(store.clone());
    vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();

    assert_eq!(vault.load("u1", None).unwrap(), VaultLoad::Locked);
    assert!(stored_record(&store, "u1").is_some());
}

#[test]
fn tampered_ciphertext_is_purged() {
    let store = MemoryStore::shared();
    let vault = vault_over(store.clone());
    vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();

    let mut record = stored_record(&store, "u1").unwrap();
    let mut bytes = BASE64.decode(&record.ciphertext).unwrap();
    bytes[0] ^= 0xff;
    record.ciphertext = BASE64.encode(bytes);
    store
        .set(&StorageKeys::vault_record("u1"), &serde_json::to_string(&record).unwrap())
        .unwrap();

    let err = vault.load("u1", Some("sess-1")).unwrap_err();
    assert!(matches!(err, VaultError::Corrupt(_)));
    assert_eq!(err.cause(), "corrupt");

    assert_eq!(vault.load("u1", Some("sess-1")).unwrap(), VaultLoad::Absent);
}

#[test]
fn unparseable_record_is_purged() {
    let store = MemoryStore::shared();
    let vault = vault_over(store.clone());
    store.set(&StorageKeys::vault_record("u1"), "{not json").unwrap();

    assert!(matches!(vault.load("u1", Some("sess-1")), Err(VaultError::Corrupt(_))));
    assert!(stored_record(&store, "u1").is_none());
}

#[test]
fn malformed_nonce_is_purged() {
    let store = MemoryStore::shared();
    let vault = vault_over(store.clone());
    vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();

    let mut record = stored_record(&store, "u1").unwrap();
    record.nonce = BASE64.encode([1u8; 4]);
    store
        .set(&StorageKeys::vault_record("u1"), &serde_json::to_string(&record).unwrap())
        .unwrap();

    assert!(matches!(vault.load("u1", Some("sess-1")), Err(VaultError::Corrupt(_))));
    assert_eq!(vault.load("u1", Some("sess-1")).unwrap(), VaultLoad::Absent);
}

#[test]
fn record_without_fingerprint_locks_on_auth_failure() {
    let store = MemoryStore::shared();
    let vault = vault_over(store.clone());
    vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();

    let mut record = stored_record(&store, "u1").unwrap();
    record.key_check = None;
    store
        .set(&StorageKeys::vault_record("u1"), &serde_json::to_string(&record).unwrap())
        .unwrap();

    assert_eq!(vault.load("u1", Some("sess-2")).unwrap(), VaultLoad::Locked);
    assert!(stored_record(&store, "u1").is_some());
}

// ==========================================
// Storage availability
// ==========================================

#[test]
fn unavailable_storage_short_circuits_every_operation() {
    let vault = vault_over(MemoryStore::disabled());
    assert!(!vault.is_available());

    let err = vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap_err();
    assert!(matches!(err, VaultError::StorageUnavailable(_)));
    assert_eq!(err.cause(), "unavailable");
    assert!(matches!(vault.load("u1", Some("sess-1")), Err(VaultError::StorageUnavailable(_))));
    assert!(matches!(vault.clear("u1"), Err(VaultError::StorageUnavailable(_))));

    let state = VaultState::from_load(vault.load("u1", Some("sess-1")));
    assert_eq!(state.status, VaultStatus::Unavailable);
    assert!(!state.has_stored_token);
}

#[test]
fn works_over_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("storage")).unwrap();
    let vault = CredentialVault::new(Arc::new(store));

    vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();

    let reopened = CredentialVault::new(Arc::new(FileStore::open(dir.path().join("storage")).unwrap()));
    assert_eq!(
        reopened.load("u1", Some("sess-1")).unwrap(),
        VaultLoad::Unlocked("ghp_abc123".to_string())
    );
}

// ==========================================
// VaultState
// ==========================================

#[test]
fn reload_scenario_unlocked_then_locked() {
    let vault = vault_over(MemoryStore::shared());
    vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();

    let same = VaultState::from_load(vault.load("u1", Some("sess-1")));
    assert_eq!(same.token, "ghp_abc123");
    assert!(same.has_stored_token);
    assert_eq!(same.status, VaultStatus::Unlocked);

    let rotated = VaultState::from_load(vault.load("u1", Some("sess-2")));
    assert_eq!(rotated.token, "");
    assert!(rotated.has_stored_token);
    assert_eq!(rotated.status, VaultStatus::Locked);
    assert_eq!(rotated.token(), None);
}

#[test]
fn state_debug_hides_token() {
    let state = VaultState::from_load(Ok(VaultLoad::Unlocked("ghp_secret".to_string())));
    let printed = format!("{:?}", state);
    assert!(!printed.contains("ghp_secret"));
    assert!(!format!("{:?}", VaultLoad::Unlocked("ghp_secret".to_string())).contains("ghp_secret"));
}

// ==========================================
// Watcher
// ==========================================

async fn next_state(rx: &mut tokio::sync::watch::Receiver<VaultState>) -> VaultState {
    tokio::time::timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("watcher did not publish")
        .unwrap();
    let state = rx.borrow_and_update().clone();
    state
}

#[tokio::test]
async fn watcher_reloads_on_write_from_other_context() {
    let tab_a = MemoryStore::shared();
    let tab_b = tab_a.open_context();
    let vault_a = Arc::new(vault_over(tab_a));
    let vault_b = vault_over(tab_b);

    let watcher = VaultWatcher::spawn(Arc::clone(&vault_a), "u1", Some("sess-1".to_string()));
    assert_eq!(watcher.state().status, VaultStatus::Empty);
    let mut rx = watcher.subscribe();

    vault_b.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();
    let state = next_state(&mut rx).await;
    assert_eq!(state.status, VaultStatus::Unlocked);
    assert_eq!(state.token, "ghp_abc123");

    vault_b.clear("u1").unwrap();
    let state = next_state(&mut rx).await;
    assert_eq!(state.status, VaultStatus::Empty);
    assert!(!state.has_stored_token);
}

#[tokio::test]
async fn watcher_ignores_own_context_and_other_users() {
    let tab_a = MemoryStore::shared();
    let tab_b = tab_a.open_context();
    let vault_a = Arc::new(vault_over(tab_a));
    let vault_b = vault_over(tab_b);

    let watcher = VaultWatcher::spawn(Arc::clone(&vault_a), "u1", Some("sess-1".to_string()));
    let mut rx = watcher.subscribe();

    vault_a.persist("u1", "own-write", Some("sess-1")).unwrap();
    vault_b.persist("u2", "other-user", Some("sess-1")).unwrap();

    let waited = tokio::time::timeout(Duration::from_millis(200), rx.changed()).await;
    assert!(waited.is_err(), "watcher should not reload");

    watcher.refresh();
    let state = next_state(&mut rx).await;
    assert_eq!(state.token, "own-write");
}

#[tokio::test]
async fn watcher_set_secret_unlocks_and_locks() {
    let vault = Arc::new(vault_over(MemoryStore::shared()));
    vault.persist("u1", "ghp_abc123", Some("sess-1")).unwrap();

    let watcher = VaultWatcher::spawn(Arc::clone(&vault), "u1", Some("sess-2".to_string()));
    assert_eq!(watcher.state().status, VaultStatus::Locked);
    let mut rx = watcher.subscribe();

    watcher.set_secret(Some("sess-1".to_string()));
    let state = next_state(&mut rx).await;
    assert_eq!(state.status, VaultStatus::Unlocked);

    watcher.set_secret(None);
    let state = next_state(&mut rx).await;
    assert_eq!(state.status, VaultStatus::Locked);
    assert!(state.has_stored_token);

    watcher.stop();
}

#[tokio::test(flavor = "current_thread")]
async fn watcher_reloads_from_file_store_context() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("storage")).unwrap();
    let other = store.open_context();
    let vault = Arc::new(CredentialVault::new(Arc::new(store)));
    let writer = CredentialVault::new(Arc::new(other));

    let watcher = VaultWatcher::spawn(Arc::clone(&vault), "u1", Some("sess-1".to_string()));
    let mut rx = watcher.subscribe();

    writer.persist("u1", "ghp_file", Some("sess-1")).unwrap();
    let state = next_state(&mut rx).await;
    assert_eq!(state.status, VaultStatus::Unlocked);
    assert_eq!(state.token, "ghp_file");
}
