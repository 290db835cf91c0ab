use crate::domain::Money;

/// One row of a ledger replay. Accounts are addressed by a caller-chosen label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register { account: String },
    Deposit { account: String, amount: Money },
    Withdraw { account: String, amount: Money },
    Promote { account: String },
    Demote { account: String },
    /// Opens a session for the account.
    Login { account: String },
}

impl Command {
    pub fn account(&self) -> &str {
        match self {
            Command::Register { account }
            | Command::Deposit { account, .. }
            | Command::Withdraw { account, .. }
            | Command::Promote { account }
            | Command::Demote { account }
            | Command::Login { account } => account,
        }
    }
}
