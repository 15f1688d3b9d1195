//! Key-value document store for users, capsules and the session pointer.
//!
//! Every document is a whole JSON value under a fixed key. Writes replace the
//! entire document and are broadcast to every clone of the [`Store`].

pub mod backend;
pub mod capsules;
pub mod error;
pub mod sqlite;
pub mod store;

pub use backend::{Document, KvBackend, MemoryBackend};
pub use error::StoreError;
pub use sqlite::SqliteBackend;
pub use store::{Notification, Store, Subscription};
