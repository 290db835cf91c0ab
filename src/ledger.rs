use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::LedgerConfig;
use crate::domain::{
    Account, AccountId, AccountStore, Clock, Error, Money, SystemClock, Transaction, TransactionId,
    TransactionKind, TransactionLog,
};

/// Whether a successful balance change made it into the transaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audit {
    Recorded(TransactionId),
    /// The balance moved but the log append failed; needs reconciliation.
    Degraded(String),
}

impl Audit {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Audit::Degraded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    pub previous_balance: Money,
    pub new_balance: Money,
    pub audit: Audit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Swept { amount: Money, audit: Audit },
    /// The account stopped being idle between selection and mutation.
    Skipped,
}

impl SweepOutcome {
    pub fn swept_amount(&self) -> Money {
        match self {
            SweepOutcome::Swept { amount, .. } => *amount,
            SweepOutcome::Skipped => Money::ZERO,
        }
    }
}

/// The only writer of savings and investment balances.
///
/// Every mutation is a read-modify-write against the store's compare-and-set;
/// a lost race re-reads the account and re-validates before trying again.
pub struct LedgerService<S, L>
where
    S: AccountStore,
    L: TransactionLog,
{
    accounts: Arc<S>,
    log: Arc<L>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl<S, L> Clone for LedgerService<S, L>
where
    S: AccountStore,
    L: TransactionLog,
{
    fn clone(&self) -> Self {
        Self {
            accounts: Arc::clone(&self.accounts),
            log: Arc::clone(&self.log),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<S, L> LedgerService<S, L>
where
    S: AccountStore,
    L: TransactionLog,
{
    pub fn new(accounts: Arc<S>, log: Arc<L>, config: LedgerConfig) -> Self {
        Self {
            accounts,
            log,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn accounts(&self) -> &Arc<S> {
        &self.accounts
    }

    pub fn log(&self) -> &Arc<L> {
        &self.log
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn account(&self, id: AccountId) -> Result<Account, Error> {
        self.storage(self.accounts.get(id)).await
    }

    /// Accounts idle as of `now`, as one point-in-time query.
    pub async fn idle_candidates(&self, now: DateTime<Utc>) -> Result<Vec<AccountId>, Error> {
        let cutoff = now.checked_sub_signed(self.config.idle_period).ok_or_else(|| {
            Error::Config(format!("idle period {} reaches before {now}", self.config.idle_period))
        })?;
        self.storage(self.accounts.idle_candidates(cutoff)).await
    }

    /// Runs on its own task, so a dropped caller does not abandon the deposit midway.
    pub async fn deposit(&self, id: AccountId, amount: Money) -> Result<BalanceChange, Error> {
        ensure_positive(amount)?;
        let this = self.clone();
        tokio::spawn(async move { this.apply(id, TransactionKind::Deposit, amount).await })
            .await
            .map_err(|e| Error::Internal(format!("deposit task failed: {e}")))?
    }

    /// Runs on its own task, so a dropped caller does not abandon the withdrawal midway.
    pub async fn withdraw(&self, id: AccountId, amount: Money) -> Result<BalanceChange, Error> {
        ensure_positive(amount)?;
        let this = self.clone();
        tokio::spawn(async move { this.apply(id, TransactionKind::Withdrawal, amount).await })
            .await
            .map_err(|e| Error::Internal(format!("withdrawal task failed: {e}")))?
    }

    /// Moves all savings of an idle account into its investment balance.
    ///
    /// Eligibility is re-checked on every fresh read, so an account drained or
    /// touched since the candidate query is skipped rather than failed.
    /// `last_transaction_at` is left alone.
    pub async fn sweep_idle_account(&self, id: AccountId, now: DateTime<Utc>) -> Result<SweepOutcome, Error> {
        let idle_period = self.config.idle_period;

        let applied = self
            .read_modify_write(id, |current| {
                if !current.is_idle(now, idle_period) {
                    return Ok(None);
                }
                let investment_balance = current
                    .investment_balance
                    .checked_add(current.savings_balance)
                    .ok_or_else(|| Error::InvalidAmount("investment balance would overflow".into()))?;

                Ok(Some(Account {
                    savings_balance: Money::ZERO,
                    investment_balance,
                    updated_at: now,
                    ..current.clone()
                }))
            })
            .await?;

        let Some((before, after)) = applied else {
            info!(account = %id, "account no longer idle, sweep skipped");
            return Ok(SweepOutcome::Skipped);
        };

        let amount = before.savings_balance;
        let audit = self
            .record(Transaction::new(id, TransactionKind::Investment, amount, now))
            .await;
        info!(
            account = %id,
            amount = %amount,
            investment_balance = %after.investment_balance,
            "idle savings swept to investment"
        );

        Ok(SweepOutcome::Swept { amount, audit })
    }

    async fn apply(&self, id: AccountId, kind: TransactionKind, amount: Money) -> Result<BalanceChange, Error> {
        let now = self.clock.now();

        let applied = self
            .read_modify_write(id, |current| {
                let savings_balance = match kind {
                    TransactionKind::Deposit => current
                        .savings_balance
                        .checked_add(amount)
                        .ok_or_else(|| Error::InvalidAmount("savings balance would overflow".into()))?,
                    TransactionKind::Withdrawal => {
                        if current.savings_balance < amount {
                            return Err(Error::InsufficientBalance {
                                requested: amount,
                                available: current.savings_balance,
                            });
                        }
                        current
                            .savings_balance
                            .checked_sub(amount)
                            .ok_or_else(|| Error::InvalidAmount("savings balance would underflow".into()))?
                    }
                    TransactionKind::Investment => {
                        return Err(Error::Internal("investments only come from sweeps".into()));
                    }
                };

                Ok(Some(Account {
                    savings_balance,
                    last_transaction_at: now,
                    updated_at: now,
                    ..current.clone()
                }))
            })
            .await;

        let (before, after) = match applied {
            Ok(Some(pair)) => pair,
            Ok(None) => return Err(Error::Internal("balance mutation produced no update".into())),
            Err(e) => {
                warn!(account = %id, ?kind, amount = %amount, error = %e, "balance mutation rejected");
                return Err(e);
            }
        };

        let audit = self.record(Transaction::new(id, kind, amount, now)).await;
        info!(
            account = %id,
            ?kind,
            amount = %amount,
            previous_balance = %before.savings_balance,
            new_balance = %after.savings_balance,
            "balance mutation applied"
        );

        Ok(BalanceChange {
            previous_balance: before.savings_balance,
            new_balance: after.savings_balance,
            audit,
        })
    }

    /// Load, plan, compare-and-set; repeated with fresh data on conflict.
    ///
    /// `plan` returns `None` to leave the account untouched. On success yields
    /// the record that was read and the record that was stored.
    pub(crate) async fn read_modify_write<F>(&self, id: AccountId, mut plan: F) -> Result<Option<(Account, Account)>, Error>
    where
        F: FnMut(&Account) -> Result<Option<Account>, Error>,
    {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = Error::Conflict(id);

        for attempt in 1..=attempts {
            let current = match self.storage(self.accounts.get(id)).await {
                Ok(account) => account,
                Err(Error::StorageUnavailable(reason)) => {
                    warn!(account = %id, attempt, %reason, "account read failed, backing off");
                    last_error = Error::StorageUnavailable(reason);
                    if attempt < attempts {
                        self.backoff(attempt).await;
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            let Some(next) = plan(&current)? else {
                return Ok(None);
            };

            // A failed write is not retried: a timed-out compare-and-set may
            // still have landed, and replaying it could apply the change twice.
            match self.storage(self.accounts.compare_and_set(current.version, next)).await {
                Ok(stored) => return Ok(Some((current, stored))),
                Err(Error::Conflict(_)) => {
                    debug!(account = %id, attempt, "concurrent update, retrying with fresh data");
                    last_error = Error::Conflict(id);
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }

    async fn record(&self, transaction: Transaction) -> Audit {
        let described = transaction.to_string();
        match self.storage(self.log.append(transaction)).await {
            Ok(id) => Audit::Recorded(id),
            Err(e) => {
                error!(
                    transaction = %described,
                    error = %e,
                    "balance changed without an audit record, flagged for reconciliation"
                );
                Audit::Degraded(e.to_string())
            }
        }
    }

    pub(crate) async fn storage<T, F>(&self, call: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let limit = self.config.storage_timeout;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| Error::StorageUnavailable(format!("storage call exceeded {limit:?}")))?
    }

    async fn backoff(&self, attempt: u32) {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(10));
        tokio::time::sleep(self.config.retry_backoff.saturating_mul(factor)).await;
    }
}

fn ensure_positive(amount: Money) -> Result<(), Error> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(Error::InvalidAmount(format!("amount must be positive, got {amount}")))
    }
}
