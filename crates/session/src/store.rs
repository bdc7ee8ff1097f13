//! The credential store.
//!
//! Holds the current credential set and the last confirmed identity
//! snapshot, and persists both through a pluggable key-value backend. All
//! writes funnel through this one type; it is the single mutation entry
//! point named in the session design, invoked only by login, register,
//! external login, refresh success, and logout.
//!
//! The store carries an epoch counter so a logout issued while a refresh is
//! in flight wins the race: the late refresh commit is rejected instead of
//! resurrecting cleared credentials.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::credentials::{CredentialMode, CredentialSet, TokenPair, storage_keys};
use crate::models::UserIdentity;

/// Key-value persistence backend for session data.
///
/// Deployments back this with whatever the host environment offers
/// (browser local storage, a keychain, a file); tests use [`MemoryStorage`].
pub trait CredentialStorage: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str);
    /// Remove the value stored under `key`, if any.
    fn remove(&self, key: &str);
}

/// In-memory [`CredentialStorage`] backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl CredentialStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        lock_unpoisoned(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        lock_unpoisoned(&self.entries).insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        lock_unpoisoned(&self.entries).remove(key);
    }
}

/// The credential store.
///
/// Cheaply cloneable via `Arc`; all clones observe the same state.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    mode: CredentialMode,
    storage: Arc<dyn CredentialStorage>,
    slot: Mutex<Slot>,
}

struct Slot {
    credentials: Option<CredentialSet>,
    epoch: u64,
}

impl CredentialStore {
    /// Create a store for `mode`, hydrating any credential set previously
    /// persisted to `storage`.
    #[must_use]
    pub fn new(mode: CredentialMode, storage: Arc<dyn CredentialStorage>) -> Self {
        let credentials = hydrate(mode, storage.as_ref());
        Self {
            inner: Arc::new(StoreInner {
                mode,
                storage,
                slot: Mutex::new(Slot {
                    credentials,
                    epoch: 0,
                }),
            }),
        }
    }

    /// The credential-transport mode this store was configured with.
    #[must_use]
    pub fn mode(&self) -> CredentialMode {
        self.inner.mode
    }

    /// The current credential set, if one is held.
    #[must_use]
    pub fn current(&self) -> Option<CredentialSet> {
        self.lock_slot().credentials.clone()
    }

    /// Whether a credential set is currently held.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.lock_slot().credentials.is_some()
    }

    /// The cached identity snapshot, if one was persisted.
    ///
    /// Never consulted for access decisions; it exists so views can render
    /// optimistically while startup resolution is still in flight.
    #[must_use]
    pub fn cached_identity(&self) -> Option<UserIdentity> {
        self.inner
            .storage
            .get(storage_keys::CURRENT_USER)
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Install a freshly issued credential set (login, register, or
    /// external login).
    ///
    /// Bumps the epoch: a refresh cycle that was already in flight must not
    /// overwrite these newer credentials with its stale renewal.
    pub(crate) fn install(&self, set: CredentialSet) {
        let mut slot = self.lock_slot();
        slot.epoch += 1;
        self.persist(&set);
        slot.credentials = Some(set);
    }

    /// The epoch at which a refresh cycle starts; passed back to
    /// [`Self::commit_refresh`] to detect an intervening logout.
    pub(crate) fn refresh_epoch(&self) -> u64 {
        self.lock_slot().epoch
    }

    /// Commit the outcome of a successful refresh.
    ///
    /// Returns `false` without writing if the store was cleared (or
    /// re-installed) since the cycle started: the logout wins and the
    /// renewed credentials are discarded.
    pub(crate) fn commit_refresh(&self, set: CredentialSet, started_epoch: u64) -> bool {
        let mut slot = self.lock_slot();
        if slot.epoch != started_epoch {
            return false;
        }
        self.persist(&set);
        slot.credentials = Some(set);
        true
    }

    /// Drop the credential set and cached identity (logout, or an
    /// irrecoverable refresh failure).
    pub(crate) fn clear(&self) {
        let mut slot = self.lock_slot();
        slot.credentials = None;
        slot.epoch += 1;
        let storage = self.inner.storage.as_ref();
        storage.remove(storage_keys::ACCESS_TOKEN);
        storage.remove(storage_keys::REFRESH_TOKEN);
        storage.remove(storage_keys::SESSION_PRESENT);
        storage.remove(storage_keys::CURRENT_USER);
    }

    /// Persist a confirmed identity snapshot.
    pub(crate) fn cache_identity(&self, user: &UserIdentity) {
        if let Ok(raw) = serde_json::to_string(user) {
            self.inner.storage.set(storage_keys::CURRENT_USER, &raw);
        }
    }

    fn persist(&self, set: &CredentialSet) {
        let storage = self.inner.storage.as_ref();
        match set {
            CredentialSet::Bearer(pair) => {
                storage.set(storage_keys::ACCESS_TOKEN, pair.access_token());
                storage.set(storage_keys::REFRESH_TOKEN, pair.refresh_token_exposed());
            }
            CredentialSet::Cookie => {
                storage.set(storage_keys::SESSION_PRESENT, "true");
            }
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        lock_unpoisoned(&self.inner.slot)
    }
}

/// Rebuild the credential set from persisted storage, if a complete one is
/// present.
fn hydrate(mode: CredentialMode, storage: &dyn CredentialStorage) -> Option<CredentialSet> {
    match mode {
        CredentialMode::Bearer => {
            let access = storage.get(storage_keys::ACCESS_TOKEN)?;
            let refresh = storage.get(storage_keys::REFRESH_TOKEN)?;
            Some(CredentialSet::Bearer(TokenPair::new(access, refresh)))
        }
        CredentialMode::Cookie => storage
            .get(storage_keys::SESSION_PRESENT)
            .filter(|flag| flag == "true")
            .map(|_| CredentialSet::Cookie),
    }
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orchard_core::{Email, Role, UserId};

    fn bearer_store() -> CredentialStore {
        CredentialStore::new(CredentialMode::Bearer, Arc::new(MemoryStorage::default()))
    }

    fn identity() -> UserIdentity {
        UserIdentity {
            id: UserId::new(7),
            full_name: "Pat Chen".to_owned(),
            email: Email::parse("pat@store.test").unwrap(),
            role: Role::Customer,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_install_and_clear() {
        let store = bearer_store();
        assert!(!store.has_credentials());

        store.install(CredentialSet::Bearer(TokenPair::new("a1", "r1")));
        assert!(store.has_credentials());

        store.clear();
        assert!(!store.has_credentials());
    }

    #[test]
    fn test_hydrates_persisted_bearer_pair() {
        let storage = Arc::new(MemoryStorage::default());
        storage.set(storage_keys::ACCESS_TOKEN, "a1");
        storage.set(storage_keys::REFRESH_TOKEN, "r1");

        let store = CredentialStore::new(CredentialMode::Bearer, storage);
        match store.current() {
            Some(CredentialSet::Bearer(pair)) => assert_eq!(pair.access_token(), "a1"),
            other => panic!("expected bearer credentials, got {other:?}"),
        }
    }

    #[test]
    fn test_hydration_requires_complete_pair() {
        let storage = Arc::new(MemoryStorage::default());
        storage.set(storage_keys::ACCESS_TOKEN, "a1");

        let store = CredentialStore::new(CredentialMode::Bearer, storage);
        assert!(!store.has_credentials());
    }

    #[test]
    fn test_hydrates_cookie_marker() {
        let storage = Arc::new(MemoryStorage::default());
        storage.set(storage_keys::SESSION_PRESENT, "true");

        let store = CredentialStore::new(CredentialMode::Cookie, storage);
        assert!(store.has_credentials());
    }

    #[test]
    fn test_commit_refresh_applies_when_epoch_unchanged() {
        let store = bearer_store();
        store.install(CredentialSet::Bearer(TokenPair::new("a1", "r1")));

        let epoch = store.refresh_epoch();
        let committed =
            store.commit_refresh(CredentialSet::Bearer(TokenPair::new("a2", "r2")), epoch);

        assert!(committed);
        match store.current() {
            Some(CredentialSet::Bearer(pair)) => assert_eq!(pair.access_token(), "a2"),
            other => panic!("expected bearer credentials, got {other:?}"),
        }
    }

    #[test]
    fn test_fresh_login_wins_over_late_refresh() {
        let store = bearer_store();
        store.install(CredentialSet::Bearer(TokenPair::new("a1", "r1")));

        let epoch = store.refresh_epoch();
        // A new login lands while the renewal call is in flight
        store.install(CredentialSet::Bearer(TokenPair::new("a3", "r3")));

        let committed =
            store.commit_refresh(CredentialSet::Bearer(TokenPair::new("a2", "r2")), epoch);

        assert!(!committed);
        match store.current() {
            Some(CredentialSet::Bearer(pair)) => assert_eq!(pair.access_token(), "a3"),
            other => panic!("expected bearer credentials, got {other:?}"),
        }
    }

    #[test]
    fn test_logout_wins_over_late_refresh() {
        let store = bearer_store();
        store.install(CredentialSet::Bearer(TokenPair::new("a1", "r1")));

        let epoch = store.refresh_epoch();
        store.clear(); // logout lands while the renewal call is in flight

        let committed =
            store.commit_refresh(CredentialSet::Bearer(TokenPair::new("a2", "r2")), epoch);

        assert!(!committed);
        assert!(!store.has_credentials());
    }

    #[test]
    fn test_clear_removes_persisted_state() {
        let storage = Arc::new(MemoryStorage::default());
        let store = CredentialStore::new(
            CredentialMode::Bearer,
            Arc::clone(&storage) as Arc<dyn CredentialStorage>,
        );
        store.install(CredentialSet::Bearer(TokenPair::new("a1", "r1")));
        store.cache_identity(&identity());

        store.clear();

        assert!(storage.get(storage_keys::ACCESS_TOKEN).is_none());
        assert!(storage.get(storage_keys::REFRESH_TOKEN).is_none());
        assert!(storage.get(storage_keys::CURRENT_USER).is_none());
    }

    #[test]
    fn test_cached_identity_roundtrip() {
        let store = bearer_store();
        let user = identity();
        store.cache_identity(&user);
        assert_eq!(store.cached_identity(), Some(user));
    }
}
