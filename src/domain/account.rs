use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub savings_balance: Money,    // never negative
    pub investment_balance: Money, // grows only through sweeps
    pub last_transaction_at: DateTime<Utc>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every successful compare-and-set.
    pub version: u64,
}

impl Account {
    pub fn new(name: impl Into<String>, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            email: email.into(),
            savings_balance: Money::ZERO,
            investment_balance: Money::ZERO,
            last_transaction_at: now,
            is_admin: false,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Positive savings untouched by deposits or withdrawals for longer than `idle_period`.
    ///
    /// A period reaching back past the earliest representable instant leaves
    /// nothing idle.
    pub fn is_idle(&self, now: DateTime<Utc>, idle_period: Duration) -> bool {
        self.savings_balance.is_positive()
            && now
                .checked_sub_signed(idle_period)
                .is_some_and(|cutoff| self.last_transaction_at < cutoff)
    }
}
