use std::collections::HashMap;

use futures::StreamExt;
use tracing::info;

use crate::auth::SessionAuthenticator;
use crate::directory::AdminDirectory;
use crate::domain::{
    AccountId, AccountStore, Command, CommandStream, DeadLetterQueue, Error, TransactionLog,
};
use crate::ledger::LedgerService;

/// Replays a command stream against the ledger and the admin directory.
///
/// Accounts are addressed by label; `register` binds a label to a fresh
/// account with the e-mail `<label>@replay.local`, and `login` opens a
/// session for it that lives for the configured token TTL.
pub struct Engine<I, D, S, L>
where
    I: CommandStream,
    D: DeadLetterQueue,
    S: AccountStore,
    L: TransactionLog,
{
    ingestion: I,
    dlq: D,
    ledger: LedgerService<S, L>,
    directory: AdminDirectory<S, L>,
    sessions: SessionAuthenticator,
    labels: HashMap<String, AccountId>,
    tokens: HashMap<String, String>,
}

impl<I, D, S, L> Engine<I, D, S, L>
where
    I: CommandStream,
    D: DeadLetterQueue,
    S: AccountStore,
    L: TransactionLog,
{
    pub fn new(ingestion: I, dlq: D, ledger: LedgerService<S, L>) -> Self {
        Self {
            ingestion,
            dlq,
            directory: AdminDirectory::new(ledger.clone()),
            sessions: SessionAuthenticator::from_config(ledger.config()),
            ledger,
            labels: HashMap::new(),
            tokens: HashMap::new(),
        }
    }

    /// Applies every command in order. Rejected commands go to the DLQ and
    /// never stop the replay. Returns how many commands were applied.
    pub async fn process(&mut self) -> usize {
        let mut commands = self.ingestion.stream();
        let mut applied = 0;

        while let Some(command) = commands.next().await {
            match command {
                Ok(command) => match self.apply(&command).await {
                    Ok(()) => applied += 1,
                    Err(e) => self.dlq.report(Some(&command), &e),
                },
                Err(e) => self.dlq.report(None, &e),
            }
        }

        info!(applied, "replay finished");
        applied
    }

    pub fn account_id(&self, label: &str) -> Option<AccountId> {
        self.labels.get(label).copied()
    }

    /// Token of the most recent session opened for `label`.
    pub fn session_token(&self, label: &str) -> Option<&str> {
        self.tokens.get(label).map(String::as_str)
    }

    pub fn sessions(&self) -> &SessionAuthenticator {
        &self.sessions
    }

    async fn apply(&mut self, command: &Command) -> Result<(), Error> {
        if let Command::Register { account } = command {
            let registered = self
                .directory
                .register(account, &format!("{account}@replay.local"))
                .await?;
            self.labels.insert(account.clone(), registered.id);
            return Ok(());
        }

        let id = self
            .account_id(command.account())
            .ok_or_else(|| Error::InvalidInput(format!("unknown account label {:?}", command.account())))?;

        match command {
            Command::Deposit { amount, .. } => self.ledger.deposit(id, *amount).await.map(drop),
            Command::Withdraw { amount, .. } => self.ledger.withdraw(id, *amount).await.map(drop),
            Command::Promote { .. } => self.directory.set_admin(id, true).await.map(drop),
            Command::Demote { .. } => self.directory.set_admin(id, false).await.map(drop),
            Command::Login { account } => {
                let token = self
                    .directory
                    .login(&self.sessions, &format!("{account}@replay.local"))
                    .await?;
                self.tokens.insert(account.clone(), token);
                Ok(())
            }
            Command::Register { .. } => Ok(()),
        }
    }

    pub fn dlq(&self) -> &D {
        &self.dlq
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::LedgerConfig;
    use crate::dlq::LoggingDLQ;
    use crate::domain::{Authenticator, Money};
    use crate::ingestion::CsvReader;
    use crate::repository::{InMemoryAccounts, InMemoryTransactionLog};

    fn engine(csv: &'static str) -> Engine<CsvReader<&'static [u8]>, LoggingDLQ, InMemoryAccounts, InMemoryTransactionLog> {
        let ledger = LedgerService::new(
            Arc::new(InMemoryAccounts::new()),
            Arc::new(InMemoryTransactionLog::new()),
            LedgerConfig::default(),
        );
        Engine::new(CsvReader::new(csv.as_bytes()), LoggingDLQ::new(), ledger)
    }

    #[tokio::test]
    async fn replays_commands_and_dead_letters_rejections() {
        let mut engine = engine(
            "type,account,amount\n\
             register,alice,\n\
             register,bob,\n\
             deposit,alice,1000\n\
             deposit,alice,500\n\
             withdraw,alice,1500.01\n\
             withdraw,bob,1\n\
             deposit,carol,5\n\
             promote,bob,\n\
             promote,bob,\n\
             register,alice,\n\
             login,alice,\n\
             login,carol,\n",
        );

        let applied = engine.process().await;
        assert_eq!(applied, 6);
        assert_eq!(engine.dlq().reported(), 6);

        let alice = engine.account_id("alice").unwrap();
        let bob = engine.account_id("bob").unwrap();
        let ledger = &engine.ledger;
        assert_eq!(ledger.account(alice).await.unwrap().savings_balance, Money::from_major(1500));
        assert!(ledger.account(bob).await.unwrap().is_admin);

        let token = engine.session_token("alice").unwrap();
        assert_eq!(engine.sessions().validate(token).unwrap(), alice);
        assert!(engine.session_token("bob").is_none());
    }
}
