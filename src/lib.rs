//! Savings ledger core: balance mutations with compare-and-set concurrency,
//! an append-only transaction log and a daily idle-savings sweep.

pub mod auth;
pub mod config;
pub mod directory;
pub mod dlq;
pub mod domain;
pub mod engine;
pub mod ingestion;
pub mod ledger;
pub mod repository;
pub mod scheduler;

pub use config::LedgerConfig;
pub use directory::{AdminDirectory, Dashboard};
pub use domain::{Account, AccountId, Error, Money, Transaction, TransactionKind};
pub use ledger::{Audit, BalanceChange, LedgerService, SweepOutcome};
pub use scheduler::{IdleSweepScheduler, SweepRun, SweepSummary};
