use crate::domain::{AccountId, Money};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Account {0} not found")]
    NotFound(AccountId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Money, available: Money },

    /// Concurrent mutations kept winning until the retry budget ran out.
    #[error("Account {0} is busy, retry budget exhausted")]
    Conflict(AccountId),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("E-mail {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Account {account} already has is_admin = {is_admin}")]
    RoleUnchanged { account: AccountId, is_admin: bool },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion failed with: {0}")]
    Ingestion(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the same request may succeed if the caller tries again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::StorageUnavailable(_))
    }
}
