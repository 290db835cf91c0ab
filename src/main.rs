use std::{env, fs::File, io, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use savings_ledger::{
    IdleSweepScheduler, LedgerConfig, LedgerService, SweepRun, dlq::LoggingDLQ, engine::Engine,
    ingestion::CsvReader,
    repository::{InMemoryAccounts, InMemoryTransactionLog},
};

/// Usage: savings_ledger <commands.csv> [sweep-at (RFC 3339)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let mut args = env::args().skip(1);
    let path = args.next().ok_or("usage: savings_ledger <commands.csv> [sweep-at]")?;
    let sweep_at = args
        .next()
        .map(|raw| DateTime::parse_from_rfc3339(&raw).map(|t| t.with_timezone(&Utc)))
        .transpose()?;

    let config = LedgerConfig::from_env()?;
    let accounts = Arc::new(InMemoryAccounts::new());
    let ledger = LedgerService::new(
        Arc::clone(&accounts),
        Arc::new(InMemoryTransactionLog::new()),
        config,
    );

    let scheduler = IdleSweepScheduler::new(ledger.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = scheduler.clone().spawn(shutdown_rx);

    let mut engine = Engine::new(CsvReader::new(File::open(&path)?), LoggingDLQ::new(), ledger);
    engine.process().await;

    if let Some(now) = sweep_at {
        if let SweepRun::Completed(summary) = scheduler.run_once(now).await {
            info!(swept = summary.swept.len(), total = %summary.total_swept(), "sweep pass done");
        }
    }

    shutdown_tx.send(true)?;
    sweeper.await?;

    accounts.flush(io::stdout().lock()).await?;
    Ok(())
}
