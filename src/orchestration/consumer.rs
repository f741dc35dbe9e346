//! Consumption driver: pulls messages one at a time and runs them through the ledger.

use crate::config::Config;
use crate::orchestration::ledger::{Ledger, ProcessOutcome};
use crate::transport::{Transport, TransportError};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters reported when the consumer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub messages: u64,
    pub recorded: u64,
    pub duplicates: u64,
    pub ignored: u64,
    /// Malformed payloads or invalid sides.
    pub rejected: u64,
    /// Store failures that stopped a message mid-pipeline.
    pub failed: u64,
    pub read_errors: u64,
}

pub struct Consumer {
    transport: Box<dyn Transport>,
    ledger: Ledger,
    read_retry_initial: Duration,
    read_retry_max: Duration,
}

impl Consumer {
    pub fn new(transport: Box<dyn Transport>, ledger: Ledger) -> Self {
        Self {
            transport,
            ledger,
            read_retry_initial: Duration::from_millis(100),
            read_retry_max: Duration::from_millis(5000),
        }
    }

    pub fn from_config(transport: Box<dyn Transport>, ledger: Ledger, config: &Config) -> Self {
        Self::new(transport, ledger).with_read_retry(config.read_retry_initial, config.read_retry_max)
    }

    pub fn with_read_retry(mut self, initial: Duration, max: Duration) -> Self {
        self.read_retry_initial = initial;
        self.read_retry_max = max;
        self
    }

    fn read_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.read_retry_initial,
            max_interval: self.read_retry_max,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }

    /// Run until cancelled or the transport reports end of stream.
    ///
    /// A message already pulled is always processed and committed before the
    /// cancellation is observed. The transport is closed on exit.
    ///
    /// # Errors
    /// Returns an error only if closing the transport fails.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<ConsumerStats, TransportError> {
        let mut stats = ConsumerStats::default();
        let mut backoff = self.read_backoff();

        info!("Consumer started");
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Shutdown requested, stopping consumer");
                    break;
                }
                next = self.transport.next_message() => next,
            };

            let message = match next {
                Ok(Some(message)) => message,
                Ok(None) => {
                    info!("End of stream");
                    break;
                }
                Err(e) => {
                    stats.read_errors += 1;
                    let delay = backoff.next_backoff().unwrap_or(self.read_retry_max);
                    warn!(error = %e, delay_ms = delay.as_millis() as u64, "Transport read failed");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            info!("Shutdown requested during read backoff");
                            break;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            };
            backoff.reset();
            stats.messages += 1;

            match self.ledger.process(&message.payload).await {
                Ok(ProcessOutcome::Recorded { .. }) => stats.recorded += 1,
                Ok(ProcessOutcome::Duplicate { .. }) => stats.duplicates += 1,
                Ok(ProcessOutcome::Ignored { .. }) => stats.ignored += 1,
                Err(e) if e.is_rejection() => {
                    stats.rejected += 1;
                    warn!(offset = message.offset, error = %e, "Rejected message");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(offset = message.offset, error = %e, "Failed to process message");
                }
            }

            if let Err(e) = self.transport.commit(&message).await {
                warn!(offset = message.offset, error = %e, "Commit failed");
            } else {
                debug!(partition = message.partition, offset = message.offset, "Committed");
            }
        }

        self.transport.close().await?;
        info!(
            messages = stats.messages,
            recorded = stats.recorded,
            duplicates = stats.duplicates,
            ignored = stats.ignored,
            rejected = stats.rejected,
            failed = stats.failed,
            read_errors = stats.read_errors,
            "Consumer stopped"
        );
        Ok(stats)
    }
}
