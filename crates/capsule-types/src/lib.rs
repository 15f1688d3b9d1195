pub mod events;
pub mod keys;
pub mod models;
pub mod outcome;

pub use events::ChangeEvent;
pub use keys::DocumentKey;
pub use models::{Capsule, CapsuleMedia, PublicUser, User};
pub use outcome::Outcome;

/// Case-insensitive email comparison used for account lookup and uniqueness.
pub fn emails_match(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
