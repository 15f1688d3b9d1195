use std::time::Duration;

use capsule_store::{Store, StoreError};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

/// Background task that sends (logs) unlock notifications.
///
/// Runs on an interval, finds capsules whose `unlock_at` has passed and that
/// were not notified yet, logs a notification for each, then flags them.
pub async fn run_sweep_loop(store: Store, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match sweep(&store, Utc::now()) {
            Ok(count) => {
                if count > 0 {
                    info!("Sweep: notified {} unlocked capsules", count);
                }
            }
            Err(e) => {
                warn!("Sweep error: {}", e);
            }
        }
    }
}

pub fn sweep(store: &Store, now: DateTime<Utc>) -> Result<usize, StoreError> {
    let due = store.due_capsules(now);
    if due.is_empty() {
        return Ok(0);
    }

    let users = store.users();
    for capsule in &due {
        match users.iter().find(|u| u.id == capsule.user_id) {
            Some(owner) => info!(
                capsule_id = %capsule.id,
                email = %owner.email,
                title = %capsule.title,
                "Capsule unlocked, notifying owner"
            ),
            None => warn!(capsule_id = %capsule.id, "Capsule unlocked but its owner no longer exists"),
        }
    }

    let ids: Vec<Uuid> = due.iter().map(|c| c.id).collect();
    store.mark_notified(&ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_store::MemoryBackend;
    use capsule_types::{Capsule, User};
    use chrono::Duration as ChronoDuration;

    fn store_with_owner() -> (Store, Uuid) {
        let store = Store::new(MemoryBackend::new());
        let owner = User {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            name: None,
            password_hash: "h".into(),
            created_at: Utc::now(),
        };
        store.save_users(&[owner.clone()]).unwrap();
        (store, owner.id)
    }

    #[test]
    fn each_due_capsule_is_notified_once() {
        let (store, owner) = store_with_owner();
        let now = Utc::now();
        for minutes in [-10, -1, 10] {
            let unlock = now + ChronoDuration::minutes(minutes);
            store
                .upsert_capsule(Capsule::new(owner, "t", "n", unlock, false))
                .unwrap();
        }
        // owner deleted: still notified, just without an address
        store
            .upsert_capsule(Capsule::new(Uuid::new_v4(), "orphan", "n", now, true))
            .unwrap();

        assert_eq!(sweep(&store, now).unwrap(), 3);
        assert_eq!(sweep(&store, now).unwrap(), 0);
        assert_eq!(sweep(&store, now + ChronoDuration::minutes(11)).unwrap(), 1);
    }

    #[test]
    fn empty_store_sweeps_nothing() {
        let store = Store::new(MemoryBackend::new());
        let mut sub = store.subscribe();
        assert_eq!(sweep(&store, Utc::now()).unwrap(), 0);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn loop_sweeps_on_first_tick() {
        let (store, owner) = store_with_owner();
        let capsule = Capsule::new(owner, "t", "n", Utc::now(), false);
        store.upsert_capsule(capsule.clone()).unwrap();

        let task = tokio::spawn(run_sweep_loop(store.clone(), 3600));
        tokio::time::sleep(Duration::from_millis(200)).await;
        task.abort();

        assert_eq!(store.capsule(capsule.id).unwrap().notified, Some(true));
    }
}
