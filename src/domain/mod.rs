pub mod account;
pub mod command;
pub mod error;
pub mod money;
pub mod traits;
pub mod transaction;

pub use account::{Account, AccountId};
pub use command::Command;
pub use error::Error;
pub use money::Money;
pub use traits::{AccountStore, Authenticator, Clock, CommandStream, DeadLetterQueue, SystemClock, TransactionLog};
pub use transaction::{Transaction, TransactionId, TransactionKind};
