use capsule_types::{Capsule, DocumentKey};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::error::Result;
use crate::store::Store;

pub const DEFAULT_PUBLIC_LIMIT: usize = 20;

impl Store {
    /// Replace the capsule with the same id, or put it at the front.
    pub fn upsert_capsule(&self, capsule: Capsule) -> Result<()> {
        self.update(DocumentKey::Capsules, Vec::new, |list: &mut Vec<Capsule>| {
            match list.iter().position(|c| c.id == capsule.id) {
                Some(idx) => list[idx] = capsule.clone(),
                None => list.insert(0, capsule.clone()),
            }
        })
    }

    /// Remove the capsule with `id`. Returns false (and writes nothing) if absent.
    pub fn delete_capsule(&self, id: Uuid) -> Result<bool> {
        if self.capsule(id).is_none() {
            return Ok(false);
        }
        self.update(DocumentKey::Capsules, Vec::new, |list: &mut Vec<Capsule>| {
            let before = list.len();
            list.retain(|c| c.id != id);
            list.len() != before
        })
    }

    pub fn capsule(&self, id: Uuid) -> Option<Capsule> {
        self.capsules().into_iter().find(|c| c.id == id)
    }

    pub fn capsules_for_user(&self, user_id: Uuid) -> Vec<Capsule> {
        self.capsules()
            .into_iter()
            .filter(|c| c.user_id == user_id)
            .collect()
    }

    /// Up to `limit` public capsules in random order.
    pub fn public_capsules_random(&self, limit: usize) -> Vec<Capsule> {
        let mut public: Vec<Capsule> = self.capsules().into_iter().filter(|c| c.is_public).collect();
        public.shuffle(&mut rand::rng());
        public.truncate(limit);
        public
    }

    /// Unlocked capsules whose notification has not gone out yet.
    pub fn due_capsules(&self, now: DateTime<Utc>) -> Vec<Capsule> {
        self.capsules()
            .into_iter()
            .filter(|c| c.is_unlocked(now) && !c.is_notified())
            .collect()
    }

    /// Flag the given capsules as notified. Returns how many were newly flagged.
    pub fn mark_notified(&self, ids: &[Uuid]) -> Result<usize> {
        let pending = self
            .capsules()
            .iter()
            .any(|c| ids.contains(&c.id) && !c.is_notified());
        if !pending {
            return Ok(0);
        }
        self.update(DocumentKey::Capsules, Vec::new, |list: &mut Vec<Capsule>| {
            let mut flagged = 0;
            for capsule in list.iter_mut() {
                if ids.contains(&capsule.id) && !capsule.is_notified() {
                    capsule.notified = Some(true);
                    flagged += 1;
                }
            }
            flagged
        })
    }
}
