//! Password hashing.
//!
//! New hashes are Argon2id PHC strings with a random salt. Hashes written by
//! the old scheme (bare lowercase hex SHA-256 of the password) still verify so
//! those accounts can sign in once and be rehashed.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::errors::AuthError;

const LEGACY_HASH_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Match { needs_rehash: bool },
    Mismatch,
}

#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

impl CredentialHasher {
    /// Argon2id with explicit cost parameters (memory in KiB, iterations, lanes).
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, AuthError> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    pub fn verify(&self, password: &str, stored: &str) -> Result<Verification, AuthError> {
        if is_legacy_hash(stored) {
            return Ok(if legacy_sha256_hex(password) == stored {
                Verification::Match { needs_rehash: true }
            } else {
                Verification::Mismatch
            });
        }

        // Anything we cannot parse can never match.
        let parsed = match PasswordHash::new(stored) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Stored password hash is unreadable: {}", e);
                return Ok(Verification::Mismatch);
            }
        };
        Ok(match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Verification::Match { needs_rehash: false },
            Err(_) => Verification::Mismatch,
        })
    }
}

/// Unsalted SHA-256 of the UTF-8 password as lowercase hex.
pub fn legacy_sha256_hex(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

fn is_legacy_hash(stored: &str) -> bool {
    stored.len() == LEGACY_HASH_LEN
        && stored
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> CredentialHasher {
        CredentialHasher::with_params(8, 1, 1).unwrap()
    }

    #[test]
    fn argon2_hash_verifies() {
        let hasher = fast();
        let hash = hasher.hash("pw1").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert_eq!(
            hasher.verify("pw1", &hash).unwrap(),
            Verification::Match { needs_rehash: false }
        );
        assert_eq!(hasher.verify("pw2", &hash).unwrap(), Verification::Mismatch);
    }

    #[test]
    fn same_password_gets_different_salts() {
        let hasher = fast();
        assert_ne!(hasher.hash("pw").unwrap(), hasher.hash("pw").unwrap());
    }

    #[test]
    fn legacy_digest_matches_known_vector() {
        assert_eq!(
            legacy_sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn legacy_hash_verifies_and_asks_for_rehash() {
        let hasher = fast();
        let stored = legacy_sha256_hex("pw1");
        assert_eq!(
            hasher.verify("pw1", &stored).unwrap(),
            Verification::Match { needs_rehash: true }
        );
        assert_eq!(hasher.verify("nope", &stored).unwrap(), Verification::Mismatch);
    }

    #[test]
    fn unreadable_hash_never_matches() {
        let hasher = fast();
        assert_eq!(hasher.verify("pw", "not-a-hash").unwrap(), Verification::Mismatch);

        let uppercase_legacy = legacy_sha256_hex("pw").to_uppercase();
        assert_eq!(
            hasher.verify("pw", &uppercase_legacy).unwrap(),
            Verification::Mismatch
        );
    }
}
