use capsule_store::Notification;
use capsule_types::DocumentKey;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::session::AuthSession;

/// Keeps an [`AuthSession`] in sync with writes made through other clones of
/// its store. Dropping the handle unsubscribes.
pub struct WatchHandle {
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl AuthSession {
    /// Reload whenever the users or session document changes.
    ///
    /// Must be called inside a tokio runtime.
    pub fn watch(&self) -> WatchHandle {
        let mut sub = self
            .store()
            .subscribe_to(&[DocumentKey::Users, DocumentKey::Session]);
        let session = self.clone();

        let task = tokio::spawn(async move {
            while let Some(notification) = sub.recv().await {
                match notification {
                    Notification::Changed(event) => {
                        debug!(key = %event.key, revision = event.revision, "Reloading session");
                    }
                    Notification::Lagged(missed) => {
                        debug!(missed, "Change feed lagged, reloading session");
                    }
                }
                session.load();
            }
        });

        WatchHandle { task }
    }

    /// Load the persisted session and start following changes.
    pub fn mount(&self) -> WatchHandle {
        self.load();
        self.watch()
    }
}
