use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::domain::{AccountId, Authenticator, Clock, Error, SystemClock};

#[derive(Debug, Clone, Copy)]
struct Session {
    account: AccountId,
    expires_at: DateTime<Utc>,
}

/// Opaque bearer tokens kept in process memory, valid for a fixed TTL.
pub struct SessionAuthenticator {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionAuthenticator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sessions living for the configured `token_ttl`.
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.token_ttl)
    }

    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Hands out a fresh token for an already authenticated account.
    pub fn issue(&self, account: AccountId) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = self.clock.now() + self.ttl;
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(token.clone(), Session { account, expires_at });
        debug!(account = %account, %expires_at, "session issued");
        token
    }

    pub fn revoke(&self, token: &str) {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(token);
    }
}

impl Authenticator for SessionAuthenticator {
    fn validate(&self, token: &str) -> Result<AccountId, Error> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        let session = self
            .sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(token)
            .copied()
            .ok_or(Error::InvalidToken)?;

        if session.expires_at <= self.clock.now() {
            self.revoke(token);
            return Err(Error::InvalidToken);
        }
        Ok(session.account)
    }
}
