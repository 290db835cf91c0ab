use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::domain::{AccountId, AccountStore, Error, Money, TransactionLog};
use crate::ledger::{LedgerService, SweepOutcome};

/// What one sweep batch did. Per-account failures never abort the batch.
#[derive(Debug, Default)]
pub struct SweepSummary {
    pub candidates: usize,
    pub swept: Vec<(AccountId, Money)>,
    pub skipped: Vec<AccountId>,
    /// Swept, but the investment record could not be written.
    pub degraded: Vec<AccountId>,
    pub failed: Vec<(AccountId, Error)>,
    /// The candidate query itself failed; nothing was touched.
    pub selection_error: Option<Error>,
    /// Shutdown was requested before every candidate was visited.
    pub interrupted: bool,
}

impl SweepSummary {
    pub fn total_swept(&self) -> Money {
        self.swept
            .iter()
            .fold(Money::ZERO, |acc, (_, amount)| acc.checked_add(*amount).unwrap_or(acc))
    }

    fn report(&self) {
        if let Some(e) = &self.selection_error {
            error!(error = %e, "idle sweep could not select candidates");
            return;
        }
        for (account, e) in &self.failed {
            error!(account = %account, error = %e, "idle sweep failed for account");
        }
        info!(
            candidates = self.candidates,
            swept = self.swept.len(),
            skipped = self.skipped.len(),
            degraded = self.degraded.len(),
            failed = self.failed.len(),
            interrupted = self.interrupted,
            total = %self.total_swept(),
            "idle sweep finished"
        );
    }
}

#[derive(Debug)]
pub enum SweepRun {
    Completed(SweepSummary),
    /// A previous run was still in progress; this trigger was dropped.
    Overlapped,
}

/// Held for the duration of one run; clears the running flag on drop.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodically moves idle savings into investments through the ledger.
///
/// Holds no lock over the accounts: each sweep goes through the same
/// compare-and-set as deposits and withdrawals.
pub struct IdleSweepScheduler<S, L>
where
    S: AccountStore,
    L: TransactionLog,
{
    ledger: LedgerService<S, L>,
    running: Arc<AtomicBool>,
}

impl<S, L> Clone for IdleSweepScheduler<S, L>
where
    S: AccountStore,
    L: TransactionLog,
{
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            running: Arc::clone(&self.running),
        }
    }
}

impl<S, L> IdleSweepScheduler<S, L>
where
    S: AccountStore,
    L: TransactionLog,
{
    pub fn new(ledger: LedgerService<S, L>) -> Self {
        Self {
            ledger,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> SweepRun {
        self.run(now, None).await
    }

    /// Like [`run_once`](Self::run_once), stopping between accounts once
    /// `shutdown` turns `true`.
    pub async fn run_with_shutdown(&self, now: DateTime<Utc>, shutdown: &watch::Receiver<bool>) -> SweepRun {
        self.run(now, Some(shutdown)).await
    }

    async fn run(&self, now: DateTime<Utc>, shutdown: Option<&watch::Receiver<bool>>) -> SweepRun {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("previous idle sweep still running, trigger skipped");
            return SweepRun::Overlapped;
        };
        let summary = self.sweep(now, shutdown).await;
        summary.report();
        SweepRun::Completed(summary)
    }

    async fn sweep(&self, now: DateTime<Utc>, shutdown: Option<&watch::Receiver<bool>>) -> SweepSummary {
        let mut summary = SweepSummary::default();

        let candidates = match self.ledger.idle_candidates(now).await {
            Ok(candidates) => candidates,
            Err(e) => {
                summary.selection_error = Some(e);
                return summary;
            }
        };
        summary.candidates = candidates.len();
        info!(candidates = summary.candidates, %now, "idle sweep started");

        for id in candidates {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                warn!(account = %id, "shutdown requested, leaving remaining accounts for the next run");
                summary.interrupted = true;
                break;
            }

            match self.ledger.sweep_idle_account(id, now).await {
                Ok(SweepOutcome::Swept { amount, audit }) => {
                    if audit.is_degraded() {
                        summary.degraded.push(id);
                    }
                    summary.swept.push((id, amount));
                }
                Ok(SweepOutcome::Skipped) => summary.skipped.push(id),
                Err(e) => summary.failed.push((id, e)),
            }
        }

        summary
    }

    /// Fires every `sweep_interval` until `shutdown` turns `true` or its sender
    /// goes away. The first run happens one interval after start. The returned
    /// handle resolves only after any batch still in flight has stopped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.ledger.config().sweep_interval;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            info!(?period, "idle sweep scheduler started");

            let mut runs = JoinSet::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Runs detached so the ticker keeps firing, and overlapping
                        // triggers are observed and dropped.
                        let this = self.clone();
                        let rx = shutdown.clone();
                        runs.spawn(async move {
                            let now = this.ledger.now();
                            this.run(now, Some(&rx)).await;
                        });
                    }
                    Some(joined) = runs.join_next(), if !runs.is_empty() => {
                        if let Err(e) = joined {
                            error!(error = %e, "idle sweep task aborted");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            // In-flight batches see the shutdown flag and stop between accounts.
            while let Some(joined) = runs.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "idle sweep task aborted");
                }
            }
            info!("idle sweep scheduler stopped");
        })
    }
}
