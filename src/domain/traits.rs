use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::domain::{Account, AccountId, Command, Error, Transaction, TransactionId, TransactionKind};

/// Durable account state with an atomic read-modify-write primitive.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    async fn get(&self, id: AccountId) -> Result<Account, Error>;

    /// Fails with `AlreadyRegistered` if the e-mail is taken.
    async fn insert(&self, account: Account) -> Result<(), Error>;

    /// Replaces the stored record with `next` only if the stored version still
    /// equals `expected_version`. Returns the stored record with its new version,
    /// or `Conflict` when another writer got there first.
    async fn compare_and_set(&self, expected_version: u64, next: Account) -> Result<Account, Error>;

    /// Point-in-time snapshot of accounts with positive savings and
    /// `last_transaction_at` strictly before `cutoff`.
    async fn idle_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<AccountId>, Error>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error>;

    /// Number of non-admin accounts.
    async fn count_members(&self) -> Result<u64, Error>;
}

/// Append-only audit trail of balance mutations.
#[async_trait]
pub trait TransactionLog: Send + Sync + 'static {
    async fn append(&self, transaction: Transaction) -> Result<TransactionId, Error>;

    async fn count_by_kind(&self, kind: TransactionKind) -> Result<u64, Error>;

    /// Records of one account ordered by `created_at`.
    async fn for_account(&self, account_id: AccountId) -> Result<Vec<Transaction>, Error>;
}

pub trait Authenticator: Send + Sync {
    fn validate(&self, token: &str) -> Result<AccountId, Error>;
}

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub trait CommandStream {
    type Stream: Stream<Item = Result<Command, Error>> + Send + Unpin + 'static;
    fn stream(&mut self) -> Self::Stream;
}

/// Sink for commands that could not be applied.
pub trait DeadLetterQueue {
    fn report(&self, command: Option<&Command>, error: &Error);
}
