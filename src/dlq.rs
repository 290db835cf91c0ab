use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

use crate::domain::{Command, DeadLetterQueue, Error};

/// Logs rejected commands and keeps count of them.
#[derive(Default, Debug)]
pub struct LoggingDLQ {
    reported: AtomicUsize,
}

impl LoggingDLQ {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reported(&self) -> usize {
        self.reported.load(Ordering::Relaxed)
    }
}

impl DeadLetterQueue for LoggingDLQ {
    fn report(&self, command: Option<&Command>, error: &Error) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        match command {
            Some(command) => warn!(?command, error = %error, retryable = error.is_retryable(), "command rejected"),
            None => warn!(error = %error, "unreadable command"),
        }
    }
}
