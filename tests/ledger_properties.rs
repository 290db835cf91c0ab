use std::sync::Arc;

use chrono::{Duration, Utc};
use proptest::prelude::*;

use savings_ledger::domain::{AccountStore, TransactionLog};
use savings_ledger::repository::{InMemoryAccounts, InMemoryTransactionLog};
use savings_ledger::{
    Account, AccountId, Error, LedgerConfig, LedgerService, Money, SweepOutcome, TransactionKind,
};

type Ledger = LedgerService<InMemoryAccounts, InMemoryTransactionLog>;

fn ledger_with_retries(max_retries: u32) -> Ledger {
    LedgerService::new(
        Arc::new(InMemoryAccounts::new()),
        Arc::new(InMemoryTransactionLog::new()),
        LedgerConfig {
            max_retries,
            ..LedgerConfig::default()
        },
    )
}

async fn open(ledger: &Ledger, savings: Money, idle_days: i64) -> AccountId {
    let mut account = Account::new(
        "prop",
        format!("{}@example.com", AccountId::new()),
        Utc::now() - Duration::days(idle_days),
    );
    account.savings_balance = savings;
    let id = account.id;
    ledger.accounts().insert(account).await.unwrap();
    id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deposits_lose_no_updates() {
    const N: i64 = 64;
    let ledger = ledger_with_retries(10_000);
    let id = open(&ledger, Money::ZERO, 0).await;

    let tasks: Vec<_> = (0..N)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.deposit(id, Money::from_minor(250)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().expect("every deposit succeeds");
    }

    let account = ledger.account(id).await.unwrap();
    assert_eq!(account.savings_balance, Money::from_minor(250 * N));
    assert_eq!(account.version, N as u64);

    let records = ledger.log().for_account(id).await.unwrap();
    assert_eq!(records.len(), N as usize);
    assert!(records
        .iter()
        .all(|t| t.kind == TransactionKind::Deposit && t.amount == Money::from_minor(250)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_withdrawals_never_overdraw() {
    let ledger = ledger_with_retries(10_000);
    let id = open(&ledger, Money::from_major(100), 0).await;

    let tasks: Vec<_> = (0..25)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.withdraw(id, Money::from_major(10)).await })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(Error::InsufficientBalance { .. }) => {}
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(ledger.account(id).await.unwrap().savings_balance, Money::ZERO);
    assert_eq!(ledger.log().count_by_kind(TransactionKind::Withdrawal).await.unwrap(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweep_racing_a_withdrawal_conserves_money() {
    for _ in 0..20 {
        let ledger = ledger_with_retries(10_000);
        let id = open(&ledger, Money::from_major(100), 45).await;
        let now = Utc::now();

        let withdraw = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.withdraw(id, Money::from_major(100)).await })
        };
        let sweep = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.sweep_idle_account(id, now).await })
        };

        let withdrawn = match withdraw.await.unwrap() {
            Ok(_) => Money::from_major(100),
            Err(Error::InsufficientBalance { .. }) => Money::ZERO,
            Err(e) => panic!("unexpected error {e}"),
        };
        let swept = sweep.await.unwrap().unwrap().swept_amount();

        let account = ledger.account(id).await.unwrap();
        let total = account
            .savings_balance
            .checked_add(account.investment_balance)
            .and_then(|m| m.checked_add(withdrawn))
            .unwrap();
        assert_eq!(total, Money::from_major(100));
        assert_eq!(account.investment_balance, swept);
        assert_eq!(ledger.log().len().await, 1, "exactly one of the two moves money");
    }
}

#[tokio::test]
async fn deposit_then_withdraw_scenarios() {
    let ledger = ledger_with_retries(5);
    let id = open(&ledger, Money::from_major(1000), 0).await;

    let deposit = ledger.deposit(id, Money::from_major(500)).await.unwrap();
    assert_eq!(deposit.previous_balance, Money::from_major(1000));
    assert_eq!(deposit.new_balance, Money::from_major(1500));
    assert_eq!(ledger.log().count_by_kind(TransactionKind::Deposit).await.unwrap(), 1);

    let other = open(&ledger, Money::from_major(1000), 0).await;
    let withdrawal = ledger.withdraw(other, Money::from_major(500)).await.unwrap();
    assert_eq!(withdrawal.previous_balance, Money::from_major(1000));
    assert_eq!(withdrawal.new_balance, Money::from_major(500));

    let fresh = open(&ledger, Money::from_major(1000), 0).await;
    let err = ledger.withdraw(fresh, Money::from_major(1500)).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientBalance { .. }));
    assert_eq!(ledger.account(fresh).await.unwrap().savings_balance, Money::from_major(1000));
}

#[tokio::test]
async fn swept_account_becomes_eligible_again_after_fresh_idle_deposit() {
    let ledger = ledger_with_retries(5);
    let id = open(&ledger, Money::from_major(200), 31).await;
    let now = Utc::now();

    assert_eq!(
        ledger.sweep_idle_account(id, now).await.unwrap().swept_amount(),
        Money::from_major(200)
    );

    ledger.deposit(id, Money::from_major(30)).await.unwrap();
    assert_eq!(ledger.sweep_idle_account(id, now).await.unwrap(), SweepOutcome::Skipped);

    let later = Utc::now() + Duration::days(31);
    assert_eq!(
        ledger.sweep_idle_account(id, later).await.unwrap().swept_amount(),
        Money::from_major(30)
    );
    let account = ledger.account(id).await.unwrap();
    assert_eq!(account.investment_balance, Money::from_major(230));
}

#[derive(Debug, Clone)]
enum Op {
    Deposit(i64),
    Withdraw(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..100_000).prop_map(Op::Deposit),
        (1i64..100_000).prop_map(Op::Withdraw),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Property: sequential deposits and withdrawals conserve money, and a
    /// rejected withdrawal changes nothing.
    #[test]
    fn sequential_mutations_conserve_balance(
        initial in 0i64..1_000_000,
        ops in prop::collection::vec(op(), 1..40)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let ledger = ledger_with_retries(5);
            let id = open(&ledger, Money::from_minor(initial), 0).await;

            let mut expected = initial;
            let mut applied = 0usize;
            for op in ops {
                match op {
                    Op::Deposit(minor) => {
                        ledger.deposit(id, Money::from_minor(minor)).await.unwrap();
                        expected += minor;
                        applied += 1;
                    }
                    Op::Withdraw(minor) => {
                        let before = ledger.account(id).await.unwrap();
                        match ledger.withdraw(id, Money::from_minor(minor)).await {
                            Ok(_) => {
                                expected -= minor;
                                applied += 1;
                            }
                            Err(Error::InsufficientBalance { .. }) => {
                                prop_assert!(minor > before.savings_balance.as_minor());
                                prop_assert_eq!(ledger.account(id).await.unwrap(), before);
                            }
                            Err(e) => prop_assert!(false, "unexpected error {}", e),
                        }
                    }
                }
            }

            let account = ledger.account(id).await.unwrap();
            prop_assert_eq!(account.savings_balance, Money::from_minor(expected));
            prop_assert!(account.savings_balance.as_minor() >= 0);
            prop_assert_eq!(ledger.log().len().await, applied);
            Ok(())
        })?;
    }
}
