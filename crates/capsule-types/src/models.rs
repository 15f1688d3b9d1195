use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn public_profile(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
        }
    }
}

/// A user without credential material, safe to hand to display code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capsule {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub note: String,
    pub is_public: bool,
    pub unlock_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub media: Vec<CapsuleMedia>,
    /// Set once the unlock notification has gone out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified: Option<bool>,
}

impl Capsule {
    pub fn new(
        user_id: Uuid,
        title: impl Into<String>,
        note: impl Into<String>,
        unlock_at: DateTime<Utc>,
        is_public: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            note: note.into(),
            is_public,
            unlock_at,
            created_at: now,
            updated_at: now,
            media: Vec::new(),
            notified: None,
        }
    }

    pub fn is_unlocked(&self, now: DateTime<Utc>) -> bool {
        self.unlock_at <= now
    }

    pub fn is_notified(&self) -> bool {
        self.notified.unwrap_or(false)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// An attachment inlined as a base64 data URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleMedia {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub data_url: String,
    pub size: u64,
}

impl CapsuleMedia {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        let mime_type = mime_type.into();
        let data_url = format!("data:{};base64,{}", mime_type, BASE64.encode(bytes));
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mime_type,
            data_url,
            size: bytes.len() as u64,
        }
    }

    /// Decode the payload of the data URL.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let rest = self
            .data_url
            .strip_prefix("data:")
            .ok_or_else(|| anyhow!("Not a data URL"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| anyhow!("Data URL has no payload"))?;
        if !header.ends_with(";base64") {
            return Err(anyhow!("Data URL is not base64-encoded"));
        }
        Ok(BASE64.decode(payload)?)
    }
}
