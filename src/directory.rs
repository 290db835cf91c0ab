use serde::Serialize;
use tracing::{info, warn};

use crate::auth::SessionAuthenticator;
use crate::domain::{
    Account, AccountId, AccountStore, Authenticator, Error, TransactionKind, TransactionLog,
};
use crate::ledger::LedgerService;

/// Aggregate numbers for the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    /// Non-admin accounts.
    pub total_users: u64,
    pub total_deposits: u64,
    pub total_withdrawals: u64,
    pub total_investments: u64,
}

/// Registration and role flags, layered on the ledger's account store.
///
/// Never touches balances. Admin gating is left to callers, see
/// [`require_admin`](Self::require_admin).
pub struct AdminDirectory<S, L>
where
    S: AccountStore,
    L: TransactionLog,
{
    ledger: LedgerService<S, L>,
}

impl<S, L> AdminDirectory<S, L>
where
    S: AccountStore,
    L: TransactionLog,
{
    pub fn new(ledger: LedgerService<S, L>) -> Self {
        Self { ledger }
    }

    pub async fn register(&self, name: &str, email: &str) -> Result<Account, Error> {
        self.create(name, email, false).await
    }

    /// Self-service admin sign-up, guarded by the configured admin secret.
    pub async fn register_admin(&self, name: &str, email: &str, secret: &str) -> Result<Account, Error> {
        match self.ledger.config().admin_secret.as_deref() {
            Some(expected) if expected == secret => self.create(name, email, true).await,
            _ => {
                warn!(%email, "admin registration with a wrong or disabled secret");
                Err(Error::Unauthorized)
            }
        }
    }

    /// Opens a session for the account registered under `email`.
    pub async fn login(&self, sessions: &SessionAuthenticator, email: &str) -> Result<String, Error> {
        let email = email.trim().to_ascii_lowercase();
        match self.ledger.storage(self.ledger.accounts().find_by_email(&email)).await? {
            Some(account) => {
                info!(account = %account.id, "session opened");
                Ok(sessions.issue(account.id))
            }
            None => {
                warn!(%email, "login for an unknown e-mail");
                Err(Error::Unauthorized)
            }
        }
    }

    pub async fn is_admin(&self, id: AccountId) -> Result<bool, Error> {
        Ok(self.ledger.account(id).await?.is_admin)
    }

    /// Promotes or demotes. Asking for the role the account already has is
    /// rejected with `RoleUnchanged`.
    pub async fn set_admin(&self, id: AccountId, is_admin: bool) -> Result<Account, Error> {
        let now = self.ledger.now();
        let applied = self
            .ledger
            .read_modify_write(id, |current| {
                if current.is_admin == is_admin {
                    return Err(Error::RoleUnchanged { account: id, is_admin });
                }
                Ok(Some(Account {
                    is_admin,
                    updated_at: now,
                    ..current.clone()
                }))
            })
            .await?;

        let (_, stored) = applied.ok_or_else(|| Error::Internal("role change produced no update".into()))?;
        info!(account = %id, is_admin, "admin flag changed");
        Ok(stored)
    }

    /// Resolves the bearer of `token` and insists on the admin flag.
    pub async fn require_admin(&self, auth: &impl Authenticator, token: &str) -> Result<AccountId, Error> {
        let id = auth.validate(token)?;
        match self.ledger.account(id).await {
            Ok(account) if account.is_admin => Ok(id),
            Ok(_) | Err(Error::NotFound(_)) => Err(Error::Unauthorized),
            Err(e) => Err(e),
        }
    }

    pub async fn dashboard(&self) -> Result<Dashboard, Error> {
        let log = self.ledger.log();
        Ok(Dashboard {
            total_users: self.ledger.storage(self.ledger.accounts().count_members()).await?,
            total_deposits: self.ledger.storage(log.count_by_kind(TransactionKind::Deposit)).await?,
            total_withdrawals: self
                .ledger
                .storage(log.count_by_kind(TransactionKind::Withdrawal))
                .await?,
            total_investments: self
                .ledger
                .storage(log.count_by_kind(TransactionKind::Investment))
                .await?,
        })
    }

    async fn create(&self, name: &str, email: &str, is_admin: bool) -> Result<Account, Error> {
        let (name, email) = (name.trim(), email.trim().to_ascii_lowercase());
        if name.is_empty() {
            return Err(Error::InvalidInput("name is required".into()));
        }
        if !is_plausible_email(&email) {
            return Err(Error::InvalidInput(format!("{email:?} is not an e-mail address")));
        }
        if self.ledger.storage(self.ledger.accounts().find_by_email(&email)).await?.is_some() {
            return Err(Error::AlreadyRegistered(email));
        }

        let mut account = Account::new(name, email, self.ledger.now());
        account.is_admin = is_admin;
        self.ledger
            .storage(self.ledger.accounts().insert(account.clone()))
            .await?;

        info!(account = %account.id, email = %account.email, is_admin, "account registered");
        Ok(account)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}
