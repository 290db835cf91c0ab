use std::io::Read;
use std::pin::Pin;

use futures::stream::{self, Stream};
use serde::Deserialize;

use crate::domain::{Command, CommandStream, Error, Money};

/// Reads `type, account, amount` rows into ledger commands.
pub struct CsvReader<R: Read> {
    reader: Option<csv::Reader<R>>,
}

impl<R: Read> CsvReader<R> {
    pub fn new(reader: R) -> Self {
        let rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        Self { reader: Some(rdr) }
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "type")]
    kind: String,
    account: String,
    amount: Option<Money>,
}

impl TryFrom<CsvRow> for Command {
    type Error = Error;

    fn try_from(row: CsvRow) -> Result<Self, Self::Error> {
        if row.account.is_empty() {
            return Err(Error::Ingestion("missing account label".into()));
        }
        let account = row.account;

        let command = match (row.kind.to_ascii_lowercase().as_str(), row.amount) {
            ("register", None) => Command::Register { account },
            ("deposit", Some(amount)) => Command::Deposit { account, amount },
            ("withdraw" | "withdrawal", Some(amount)) => Command::Withdraw { account, amount },
            ("promote", None) => Command::Promote { account },
            ("demote", None) => Command::Demote { account },
            ("login", None) => Command::Login { account },
            (other, amount) => {
                return Err(Error::Ingestion(format!(
                    "invalid command {other:?} for {account} (amount: {amount:?})"
                )));
            }
        };

        Ok(command)
    }
}

impl<R: Read + Send + 'static> CommandStream for CsvReader<R> {
    type Stream = Pin<Box<dyn Stream<Item = Result<Command, Error>> + Send>>;

    fn stream(&mut self) -> Self::Stream {
        let Some(reader) = self.reader.take() else {
            return Box::pin(stream::empty::<Result<Command, Error>>());
        };

        let rows = reader.into_deserialize::<CsvRow>().map(|row| match row {
            Ok(row) => Command::try_from(row),
            Err(e) => Err(Error::Ingestion(format!("CSV deserialization error: {e}"))),
        });

        Box::pin(stream::iter(rows))
    }
}
