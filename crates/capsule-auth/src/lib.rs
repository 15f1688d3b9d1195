//! Sign-in state for one tab, kept in sync with the shared store.

pub mod errors;
pub mod password;
pub mod session;
pub mod watcher;

pub use errors::AuthError;
pub use password::CredentialHasher;
pub use session::{AuthSession, AuthState, ProfileUpdate};
pub use watcher::WatchHandle;
