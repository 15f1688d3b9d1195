use std::fmt;

use serde::{Deserialize, Serialize};

/// The three persisted documents. Storage names keep the `tc_*_v1` layout so
/// existing dumps stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKey {
    Users,
    Capsules,
    Session,
}

impl DocumentKey {
    pub const ALL: [DocumentKey; 3] = [Self::Users, Self::Capsules, Self::Session];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "tc_users_v1",
            Self::Capsules => "tc_capsules_v1",
            Self::Session => "tc_session_v1",
        }
    }

    pub fn from_storage_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Keys whose changes invalidate in-memory auth state.
    pub fn affects_session(&self) -> bool {
        matches!(self, Self::Users | Self::Session)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
