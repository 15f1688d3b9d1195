use std::sync::Arc;

use capsule_types::{Capsule, ChangeEvent, DocumentKey, User};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::KvBackend;
use crate::error::{Result, StoreError};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Attempts a read-modify-write makes before reporting a conflict.
const MAX_UPDATE_ATTEMPTS: usize = 8;

/// Facade over the three JSON documents.
///
/// Clones share the backend and the change broadcast, so each clone behaves
/// like another tab on the same storage. A detached store has no backend at
/// all: reads return their fallback and writes do nothing.
#[derive(Clone)]
pub struct Store {
    inner: Option<Arc<StoreInner>>,
}

struct StoreInner {
    backend: Box<dyn KvBackend>,
    changes: broadcast::Sender<ChangeEvent>,
}

/// What a [`Subscription`] yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Changed(ChangeEvent),
    /// The subscriber fell behind and this many events were dropped.
    Lagged(u64),
}

/// Listener for document changes. Dropping it (or calling
/// [`unsubscribe`](Subscription::unsubscribe)) stops delivery.
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    keys: Option<Vec<DocumentKey>>,
}

impl Subscription {
    fn wants(&self, key: DocumentKey) -> bool {
        self.keys.as_ref().is_none_or(|keys| keys.contains(&key))
    }

    /// Wait for the next matching change. `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.wants(event.key) => return Some(Notification::Changed(event)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    return Some(Notification::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv). `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.wants(event.key) => return Some(Notification::Changed(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Notification::Lagged(n));
                }
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

impl Store {
    pub fn new(backend: impl KvBackend + 'static) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Some(Arc::new(StoreInner {
                backend: Box::new(backend),
                changes,
            })),
        }
    }

    pub fn detached() -> Self {
        Self { inner: None }
    }

    pub fn is_attached(&self) -> bool {
        self.inner.is_some()
    }

    /// Subscribe to every document change.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_inner(None)
    }

    /// Subscribe to changes of the given documents only.
    pub fn subscribe_to(&self, keys: &[DocumentKey]) -> Subscription {
        self.subscribe_inner(Some(keys.to_vec()))
    }

    fn subscribe_inner(&self, keys: Option<Vec<DocumentKey>>) -> Subscription {
        let rx = match &self.inner {
            Some(inner) => inner.changes.subscribe(),
            // Sender dropped right away: the subscription is closed from the start.
            None => broadcast::channel(1).1,
        };
        Subscription { rx, keys }
    }

    fn emit(inner: &StoreInner, key: DocumentKey, revision: u64) {
        debug!(%key, revision, "Document written");
        let _ = inner.changes.send(ChangeEvent { key, revision });
    }

    /// Parsed document at `key`, or `fallback` when it is missing or unreadable.
    pub fn read<T: DeserializeOwned>(&self, key: DocumentKey, fallback: T) -> T {
        let Some(inner) = &self.inner else {
            return fallback;
        };
        match inner.backend.get(key.as_str()) {
            Ok(Some(doc)) => decode_or(key, &doc.value, fallback),
            Ok(None) => fallback,
            Err(e) => {
                warn!(%key, "Read failed, using fallback: {}", e);
                fallback
            }
        }
    }

    /// Replace the document at `key` and notify subscribers. Last writer wins.
    pub fn write<T: Serialize + ?Sized>(&self, key: DocumentKey, value: &T) -> Result<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        let json = serde_json::to_string(value)?;
        let revision = inner.backend.put(key.as_str(), &json)?;
        Self::emit(inner, key, revision);
        Ok(())
    }

    /// Read-modify-write guarded by the document revision.
    ///
    /// `f` may run more than once if another writer races us; it must not
    /// have side effects beyond the document. Returning `Err` aborts without
    /// writing.
    pub fn try_update<T, R, E, F>(&self, key: DocumentKey, fallback: impl Fn() -> T, mut f: F) -> Result<R, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<StoreError>,
        F: FnMut(&mut T) -> Result<R, E>,
    {
        let Some(inner) = &self.inner else {
            let mut doc = fallback();
            return f(&mut doc);
        };

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let (mut doc, expected) = match inner.backend.get(key.as_str()).map_err(StoreError::from)? {
                Some(stored) => (decode_or(key, &stored.value, fallback()), stored.revision),
                None => (fallback(), 0),
            };

            let out = f(&mut doc)?;
            let json = serde_json::to_string(&doc).map_err(StoreError::from)?;

            match inner
                .backend
                .put_if(key.as_str(), &json, expected)
                .map_err(StoreError::from)?
            {
                Some(revision) => {
                    Self::emit(inner, key, revision);
                    return Ok(out);
                }
                None => debug!(%key, attempt, "Concurrent write detected, retrying"),
            }
        }

        Err(StoreError::Conflict { key }.into())
    }

    /// [`try_update`](Self::try_update) for closures that cannot fail.
    pub fn update<T, R, F>(&self, key: DocumentKey, fallback: impl Fn() -> T, mut f: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut T) -> R,
    {
        self.try_update(key, fallback, |doc| Ok::<R, StoreError>(f(doc)))
    }

    // -- Documents --

    pub fn users(&self) -> Vec<User> {
        self.read(DocumentKey::Users, Vec::new())
    }

    pub fn save_users(&self, users: &[User]) -> Result<()> {
        self.write(DocumentKey::Users, users)
    }

    pub fn capsules(&self) -> Vec<Capsule> {
        self.read(DocumentKey::Capsules, Vec::new())
    }

    pub fn save_capsules(&self, capsules: &[Capsule]) -> Result<()> {
        self.write(DocumentKey::Capsules, capsules)
    }

    pub fn session_user_id(&self) -> Option<Uuid> {
        self.read(DocumentKey::Session, None)
    }

    pub fn set_session_user_id(&self, id: Option<Uuid>) -> Result<()> {
        self.write(DocumentKey::Session, &id)
    }
}

fn decode_or<T: DeserializeOwned>(key: DocumentKey, raw: &str, fallback: T) -> T {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(%key, "Stored document is unreadable, using fallback: {}", e);
            fallback
        }
    }
}
