use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;

/// A stored JSON document and the revision of the write that produced it.
/// Revisions start at 1; 0 stands for "absent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub value: String,
    pub revision: u64,
}

/// Raw string storage underneath the [`Store`](crate::Store) facade.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Document>>;

    /// Unconditional write. Returns the new revision.
    fn put(&self, key: &str, value: &str) -> Result<u64>;

    /// Write only if the stored revision still equals `expected` (0 = absent).
    /// Returns `None` when another writer got there first.
    fn put_if(&self, key: &str, value: &str, expected: u64) -> Result<Option<u64>>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local backend. Clone the owning `Store` to share it between tabs.
#[derive(Default)]
pub struct MemoryBackend {
    docs: Mutex<HashMap<String, Document>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_docs<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut HashMap<String, Document>) -> T,
    {
        let mut docs = self
            .docs
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory backend lock poisoned: {}", e))?;
        Ok(f(&mut docs))
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Document>> {
        self.with_docs(|docs| docs.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<u64> {
        self.with_docs(|docs| {
            let revision = docs.get(key).map_or(0, |d| d.revision) + 1;
            docs.insert(
                key.to_string(),
                Document {
                    value: value.to_string(),
                    revision,
                },
            );
            revision
        })
    }

    fn put_if(&self, key: &str, value: &str, expected: u64) -> Result<Option<u64>> {
        self.with_docs(|docs| {
            let current = docs.get(key).map_or(0, |d| d.revision);
            if current != expected {
                return None;
            }
            let revision = current + 1;
            docs.insert(
                key.to_string(),
                Document {
                    value: value.to_string(),
                    revision,
                },
            );
            Some(revision)
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_docs(|docs| {
            docs.remove(key);
        })
    }
}
