use capsule_types::DocumentKey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Document {key} kept changing underneath the update, giving up")]
    Conflict { key: DocumentKey },
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
