use std::sync::Arc;

use capsule_store::Store;
use capsule_types::{DocumentKey, User, emails_match};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AuthError;
use crate::password::{CredentialHasher, Verification};

/// Observable auth state of one tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<User>,
    /// True until the first [`AuthSession::load`].
    pub loading: bool,
}

/// Fields to change in [`AuthSession::update_profile`]. An untouched field is
/// left as stored; `clear_name` explicitly removes the name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<Option<String>>,
}

impl ProfileUpdate {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Some(name.into()));
        self
    }

    pub fn clear_name(mut self) -> Self {
        self.name = Some(None);
        self
    }
}

/// Explicit session context for one consumer (one "tab").
///
/// Clones share the same state, so a clone can be handed to the watcher task.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: Store,
    hasher: CredentialHasher,
    state: watch::Sender<AuthState>,
}

impl AuthSession {
    pub fn new(store: Store) -> Self {
        Self::with_hasher(store, CredentialHasher::default())
    }

    pub fn with_hasher(store: Store, hasher: CredentialHasher) -> Self {
        let (state, _) = watch::channel(AuthState {
            user: None,
            loading: true,
        });
        Self {
            inner: Arc::new(SessionInner {
                store,
                hasher,
                state,
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Read-only view of the state that wakes on every change.
    pub fn observe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    fn set_user(&self, user: Option<User>) {
        self.inner.state.send_modify(|state| state.user = user);
    }

    /// Resolve the persisted session pointer into the current user.
    pub fn load(&self) {
        let store = &self.inner.store;
        if !store.is_attached() {
            return;
        }
        let user = store
            .session_user_id()
            .and_then(|id| store.users().into_iter().find(|u| u.id == id));
        debug!(user_id = ?user.as_ref().map(|u| u.id), "Session loaded");
        self.inner.state.send_replace(AuthState {
            user,
            loading: false,
        });
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let store = &self.inner.store;
        let mut user = store
            .users()
            .into_iter()
            .find(|u| emails_match(&u.email, email))
            .ok_or(AuthError::AccountNotFound)?;

        match self.inner.hasher.verify(password, &user.password_hash)? {
            Verification::Mismatch => return Err(AuthError::InvalidCredentials),
            Verification::Match { needs_rehash: false } => {}
            Verification::Match { needs_rehash: true } => match self.rehash(user.id, password) {
                Ok(hash) => {
                    info!(user_id = %user.id, "Upgraded legacy password hash");
                    user.password_hash = hash;
                }
                Err(e) => warn!(user_id = %user.id, "Failed to upgrade legacy password hash: {}", e),
            },
        }

        store.set_session_user_id(Some(user.id))?;
        self.set_user(Some(user.clone()));
        info!(user_id = %user.id, "Signed in");
        Ok(user)
    }

    pub fn sign_up(&self, email: &str, password: &str, name: Option<&str>) -> Result<User, AuthError> {
        let store = &self.inner.store;
        // Checked again inside the update; this one just skips hashing for duplicates.
        if store.users().iter().any(|u| emails_match(&u.email, email)) {
            return Err(AuthError::EmailAlreadyRegistered);
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.map(str::to_string),
            password_hash: self.inner.hasher.hash(password)?,
            created_at: Utc::now(),
        };

        store.try_update(DocumentKey::Users, Vec::new, |users: &mut Vec<User>| {
            if users.iter().any(|u| emails_match(&u.email, email)) {
                return Err(AuthError::EmailAlreadyRegistered);
            }
            users.push(user.clone());
            Ok(())
        })?;

        store.set_session_user_id(Some(user.id))?;
        self.set_user(Some(user.clone()));
        info!(user_id = %user.id, "Account created");
        Ok(user)
    }

    pub fn sign_out(&self) -> Result<(), AuthError> {
        self.inner.store.set_session_user_id(None)?;
        self.set_user(None);
        Ok(())
    }

    pub fn update_password(&self, new_password: &str) -> Result<(), AuthError> {
        let current = self.current_user().ok_or(AuthError::NotAuthenticated)?;
        let hash = self.rehash(current.id, new_password)?;
        self.set_user(Some(User {
            password_hash: hash,
            ..current
        }));
        Ok(())
    }

    pub fn update_profile(&self, update: ProfileUpdate) -> Result<User, AuthError> {
        let current = self.current_user().ok_or(AuthError::NotAuthenticated)?;
        let updated = self.modify_user(current.id, |user| {
            if let Some(name) = &update.name {
                user.name = name.clone();
            }
        })?;
        self.set_user(Some(updated.clone()));
        Ok(updated)
    }

    /// Hash `password` and store it on the user. Returns the new hash.
    fn rehash(&self, user_id: Uuid, password: &str) -> Result<String, AuthError> {
        let hash = self.inner.hasher.hash(password)?;
        self.modify_user(user_id, |user| user.password_hash = hash.clone())?;
        Ok(hash)
    }

    fn modify_user(&self, user_id: Uuid, mut f: impl FnMut(&mut User)) -> Result<User, AuthError> {
        self.inner
            .store
            .try_update(DocumentKey::Users, Vec::new, |users: &mut Vec<User>| {
                let user = users
                    .iter_mut()
                    .find(|u| u.id == user_id)
                    .ok_or(AuthError::UserNotFound)?;
                f(user);
                Ok(user.clone())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::legacy_sha256_hex;
    use capsule_store::{MemoryBackend, SqliteBackend};
    use capsule_types::Outcome;

    fn session(store: Store) -> AuthSession {
        AuthSession::with_hasher(store, CredentialHasher::with_params(8, 1, 1).unwrap())
    }

    fn fresh() -> AuthSession {
        session(Store::new(MemoryBackend::new()))
    }

    #[test]
    fn sign_up_then_sign_in_scenario() {
        let auth = fresh();

        let ann = auth.sign_up("a@x.com", "pw1", Some("Ann")).unwrap();
        assert_eq!(auth.store().session_user_id(), Some(ann.id));
        assert_eq!(auth.current_user().unwrap().name.as_deref(), Some("Ann"));

        assert!(matches!(
            auth.sign_up("A@X.com", "other", None),
            Err(AuthError::EmailAlreadyRegistered)
        ));
        assert!(matches!(
            auth.sign_in("a@x.com", "wrong"),
            Err(AuthError::InvalidCredentials)
        ));

        auth.sign_out().unwrap();
        let signed_in = auth.sign_in("a@x.com", "pw1").unwrap();
        assert_eq!(signed_in.id, ann.id);
        assert_eq!(auth.current_user().map(|u| u.id), Some(ann.id));
    }

    #[test]
    fn sign_in_is_case_insensitive() {
        let auth = fresh();
        let ann = auth.sign_up("Ann@Example.com", "pw", None).unwrap();
        auth.sign_out().unwrap();
        assert_eq!(auth.sign_in("ann@example.COM", "pw").unwrap().id, ann.id);
    }

    #[test]
    fn unknown_email_is_account_not_found() {
        let auth = fresh();
        assert!(matches!(
            auth.sign_in("nobody@x.com", "pw"),
            Err(AuthError::AccountNotFound)
        ));
    }

    #[test]
    fn failures_flatten_to_outcome_messages() {
        let auth = fresh();
        let outcome: Outcome<User> = auth.sign_in("nobody@x.com", "pw").into();
        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_deref(), Some("Account not found"));

        let outcome: Outcome<User> = auth.sign_up("a@x.com", "pw", None).into();
        assert!(outcome.ok);
        let outcome: Outcome<User> = auth.sign_up("A@x.com", "pw", None).into();
        assert_eq!(outcome.error.as_deref(), Some("Email already registered"));
    }

    #[test]
    fn sign_out_clears_session_and_user() {
        let auth = fresh();
        auth.sign_up("a@x.com", "pw", None).unwrap();
        auth.sign_out().unwrap();
        assert_eq!(auth.store().session_user_id(), None);
        assert!(auth.current_user().is_none());
    }

    #[test]
    fn load_restores_user_from_persisted_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capsules.db");

        let ann_id = {
            let auth = session(Store::new(SqliteBackend::open(&path).unwrap()));
            auth.sign_up("a@x.com", "pw", Some("Ann")).unwrap().id
        };

        let auth = session(Store::new(SqliteBackend::open(&path).unwrap()));
        assert!(auth.is_loading());
        auth.load();
        assert!(!auth.is_loading());
        assert_eq!(auth.current_user().map(|u| u.id), Some(ann_id));
    }

    #[test]
    fn load_with_dangling_session_yields_no_user() {
        let store = Store::new(MemoryBackend::new());
        store.set_session_user_id(Some(Uuid::new_v4())).unwrap();
        let auth = session(store);
        auth.load();
        assert!(auth.current_user().is_none());
        assert!(!auth.is_loading());
    }

    #[test]
    fn detached_load_is_a_no_op() {
        let auth = session(Store::detached());
        auth.load();
        assert!(auth.is_loading());
    }

    #[test]
    fn password_update_requires_session() {
        let auth = fresh();
        assert!(matches!(
            auth.update_password("new"),
            Err(AuthError::NotAuthenticated)
        ));
        assert!(matches!(
            auth.update_profile(ProfileUpdate::default().name("x")),
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[test]
    fn password_update_takes_effect() {
        let auth = fresh();
        auth.sign_up("a@x.com", "old", None).unwrap();
        auth.update_password("new").unwrap();
        auth.sign_out().unwrap();

        assert!(matches!(
            auth.sign_in("a@x.com", "old"),
            Err(AuthError::InvalidCredentials)
        ));
        auth.sign_in("a@x.com", "new").unwrap();
    }

    #[test]
    fn updates_fail_when_user_was_removed() {
        let auth = fresh();
        auth.sign_up("a@x.com", "pw", None).unwrap();
        auth.store().save_users(&[]).unwrap();

        assert!(matches!(
            auth.update_password("new"),
            Err(AuthError::UserNotFound)
        ));
        assert!(matches!(
            auth.update_profile(ProfileUpdate::default().name("x")),
            Err(AuthError::UserNotFound)
        ));
    }

    #[test]
    fn profile_name_absent_set_and_cleared() {
        let auth = fresh();
        let ann = auth.sign_up("a@x.com", "pw", Some("Ann")).unwrap();

        let unchanged = auth.update_profile(ProfileUpdate::default()).unwrap();
        assert_eq!(unchanged.name.as_deref(), Some("Ann"));

        let renamed = auth.update_profile(ProfileUpdate::default().name("Annie")).unwrap();
        assert_eq!(renamed.name.as_deref(), Some("Annie"));
        assert_eq!(auth.current_user().unwrap().name.as_deref(), Some("Annie"));

        let cleared = auth.update_profile(ProfileUpdate::default().clear_name()).unwrap();
        assert_eq!(cleared.name, None);

        let stored = auth.store().users().into_iter().find(|u| u.id == ann.id).unwrap();
        assert_eq!(stored.name, None);
    }

    #[test]
    fn legacy_hash_is_upgraded_on_sign_in() {
        let store = Store::new(MemoryBackend::new());
        let legacy = User {
            id: Uuid::new_v4(),
            email: "old@x.com".into(),
            name: None,
            password_hash: legacy_sha256_hex("pw1"),
            created_at: Utc::now(),
        };
        store.save_users(&[legacy.clone()]).unwrap();

        let auth = session(store);
        let user = auth.sign_in("old@x.com", "pw1").unwrap();
        assert!(user.password_hash.starts_with("$argon2id$"));

        let stored = auth.store().users().remove(0);
        assert_eq!(stored.password_hash, user.password_hash);

        auth.sign_out().unwrap();
        auth.sign_in("old@x.com", "pw1").unwrap();
    }

    #[test]
    fn unreadable_stored_hash_is_invalid_credentials() {
        let store = Store::new(MemoryBackend::new());
        store
            .save_users(&[User {
                id: Uuid::new_v4(),
                email: "a@x.com".into(),
                name: None,
                password_hash: legacy_sha256_hex("pw1").to_uppercase(),
                created_at: Utc::now(),
            }])
            .unwrap();

        let auth = session(store);
        assert!(matches!(
            auth.sign_in("a@x.com", "wrong"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.sign_in("a@x.com", "pw1"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(auth.current_user().is_none());
    }

    #[test]
    fn state_changes_are_observable() {
        let auth = fresh();
        let rx = auth.observe();
        auth.sign_up("a@x.com", "pw", None).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow().user.as_ref().map(|u| u.email.as_str()), Some("a@x.com"));
    }
}
