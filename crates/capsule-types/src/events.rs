use serde::{Deserialize, Serialize};

use crate::keys::DocumentKey;

/// Broadcast to every subscriber of a store after a document is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub key: DocumentKey,
    /// Revision the backend assigned to the write.
    pub revision: u64,
}
