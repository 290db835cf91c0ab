use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountStore, Error, Money, Transaction, TransactionId, TransactionKind,
    TransactionLog,
};

/// Accounts keyed by id. Every compare-and-set runs under the write lock, so
/// version checks and replacement are a single atomic step.
#[derive(Default, Debug)]
pub struct InMemoryAccounts {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prints the account table as CSV, ordered by account id.
    pub async fn flush<W: Write>(&self, out: W) -> Result<(), Error> {
        #[derive(Serialize)]
        struct Row<'a> {
            account: &'a str,
            savings: Money,
            investment: Money,
            admin: bool,
        }

        let accounts = self.accounts.read().await;
        let mut rows: Vec<&Account> = accounts.values().collect();
        rows.sort_by_key(|a| a.id);

        let mut writer = csv::Writer::from_writer(out);
        for account in rows {
            writer
                .serialize(Row {
                    account: &account.name,
                    savings: account.savings_balance,
                    investment: account.investment_balance,
                    admin: account.is_admin,
                })
                .map_err(|e| Error::Internal(format!("CSV write error: {e}")))?;
        }
        writer
            .flush()
            .map_err(|e| Error::Internal(format!("CSV flush error: {e}")))
    }
}

#[async_trait]
impl AccountStore for InMemoryAccounts {
    async fn get(&self, id: AccountId) -> Result<Account, Error> {
        self.accounts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    async fn insert(&self, account: Account) -> Result<(), Error> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(Error::AlreadyRegistered(account.email));
        }
        accounts.insert(account.id, account);
        Ok(())
    }

    async fn compare_and_set(&self, expected_version: u64, mut next: Account) -> Result<Account, Error> {
        let mut accounts = self.accounts.write().await;
        let stored = accounts.get_mut(&next.id).ok_or(Error::NotFound(next.id))?;

        if stored.version != expected_version {
            return Err(Error::Conflict(next.id));
        }

        next.version = expected_version + 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn idle_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<AccountId>, Error> {
        let accounts = self.accounts.read().await;
        let mut idle: Vec<AccountId> = accounts
            .values()
            .filter(|a| a.savings_balance.is_positive() && a.last_transaction_at < cutoff)
            .map(|a| a.id)
            .collect();
        idle.sort();
        Ok(idle)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn count_members(&self) -> Result<u64, Error> {
        Ok(self.accounts.read().await.values().filter(|a| !a.is_admin).count() as u64)
    }
}

#[derive(Default, Debug)]
struct LogIndex {
    records: HashMap<TransactionId, Transaction>,
    by_account: BTreeSet<(AccountId, DateTime<Utc>, TransactionId)>,
    by_kind: HashMap<TransactionKind, u64>,
}

/// Append-only transaction log with the `(account, created_at)` and `kind` indexes.
#[derive(Default, Debug)]
pub struct InMemoryTransactionLog {
    inner: RwLock<LogIndex>,
}

impl InMemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TransactionLog for InMemoryTransactionLog {
    async fn append(&self, transaction: Transaction) -> Result<TransactionId, Error> {
        let mut log = self.inner.write().await;
        let id = transaction.id;
        if log.records.contains_key(&id) {
            return Err(Error::Internal(format!("Transaction ID {id} already exists")));
        }

        log.by_account
            .insert((transaction.account_id, transaction.created_at, id));
        *log.by_kind.entry(transaction.kind).or_default() += 1;
        log.records.insert(id, transaction);
        Ok(id)
    }

    async fn count_by_kind(&self, kind: TransactionKind) -> Result<u64, Error> {
        Ok(self.inner.read().await.by_kind.get(&kind).copied().unwrap_or(0))
    }

    async fn for_account(&self, account_id: AccountId) -> Result<Vec<Transaction>, Error> {
        let log = self.inner.read().await;
        let from = (account_id, DateTime::<Utc>::MIN_UTC, TransactionId(Uuid::nil()));
        Ok(log
            .by_account
            .range(from..)
            .take_while(|(account, _, _)| *account == account_id)
            .filter_map(|(_, _, id)| log.records.get(id).cloned())
            .collect())
    }
}
