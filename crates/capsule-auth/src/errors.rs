use capsule_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Account not found")]
    AccountNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("User not found")]
    UserNotFound,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
