//! Per-message pipeline: decode → dedup → append → aggregate → archive.

use crate::config::Config;
use crate::db::{RepoError, Repository};
use crate::decode::{Decoded, EventDecoder};
use crate::domain::{DecimalOverflow, Execution, ExecutionKey, Position};
use crate::engine::{self, Transition};
use crate::error::LedgerError;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// What processing one message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Not a trade event.
    Ignored { event_type: String },
    /// Already recorded; nothing changed.
    Duplicate { key: ExecutionKey },
    /// Appended to the audit ledger and folded into positions.
    Recorded {
        execution_id: i64,
        aggregation: Aggregation,
    },
}

/// Effect of an appended execution on the open position for its symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregation {
    Opened { position_id: i64 },
    Increased { position_id: i64 },
    Reduced { position_id: i64 },
    Closed { trade_history_id: i64 },
    SellWithoutPosition,
    /// Position could not be updated; logged, execution stays in the ledger.
    Failed,
}

enum ApplyError {
    Position(RepoError),
    Overflow(DecimalOverflow),
    Archive(RepoError),
}

#[derive(Debug, Clone)]
pub struct Ledger {
    repo: Arc<Repository>,
    decoder: EventDecoder,
    conflict_retries: u32,
}

impl Ledger {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self {
            repo,
            decoder: EventDecoder::default(),
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    pub fn from_config(repo: Arc<Repository>, config: &Config) -> Self {
        Self::new(repo)
            .with_decoder(EventDecoder::new(config.trade_event_type.clone()))
            .with_conflict_retries(config.position_conflict_retries)
    }

    pub fn with_decoder(mut self, decoder: EventDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn repo(&self) -> &Arc<Repository> {
        &self.repo
    }

    /// Process one raw payload end to end.
    ///
    /// # Errors
    /// Rejected payloads, failed dedup checks, failed audit appends and failed
    /// trade history writes. Position failures are logged, not returned.
    pub async fn process(&self, payload: &[u8]) -> Result<ProcessOutcome, LedgerError> {
        match self.decoder.decode(payload)? {
            Decoded::Ignored { event_type } => Ok(ProcessOutcome::Ignored { event_type }),
            Decoded::Execution(exec) => self.process_execution(&exec).await,
        }
    }

    /// Record an already decoded execution and fold it into positions.
    pub async fn process_execution(&self, exec: &Execution) -> Result<ProcessOutcome, LedgerError> {
        let key = exec.key.clone();

        match self.repo.execution_exists(&key).await {
            Ok(true) => {
                info!(key = %key, "Skipping duplicate execution");
                return Ok(ProcessOutcome::Duplicate { key });
            }
            Ok(false) => {}
            Err(source) => {
                return Err(LedgerError::DuplicateCheck {
                    key: key.to_string(),
                    source,
                })
            }
        }

        let execution_id = match self.repo.append_execution(exec).await {
            Ok(id) => id,
            Err(RepoError::Duplicate(_)) => {
                info!(key = %key, "Execution recorded concurrently, skipping");
                return Ok(ProcessOutcome::Duplicate { key });
            }
            Err(source) => {
                return Err(LedgerError::AuditWrite {
                    key: key.to_string(),
                    source,
                })
            }
        };

        info!(
            key = %key,
            symbol = %exec.symbol,
            side = %exec.side,
            quantity = %exec.quantity,
            price = %exec.price,
            execution_id,
            "Recorded execution"
        );

        let aggregation = self.aggregate(execution_id, exec).await?;
        Ok(ProcessOutcome::Recorded {
            execution_id,
            aggregation,
        })
    }

    /// Read-modify-write of the symbol's position, retried on version conflicts.
    async fn aggregate(&self, execution_id: i64, exec: &Execution) -> Result<Aggregation, LedgerError> {
        let mut attempt = 0;
        loop {
            let current = match self.repo.get_position(&exec.symbol).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(symbol = %exec.symbol, error = %e, "Position lookup failed");
                    return Ok(Aggregation::Failed);
                }
            };

            let transition = match engine::transition(current.as_ref(), exec) {
                Ok(t) => t,
                Err(e) => {
                    warn!(symbol = %exec.symbol, execution_id, error = %e, "Position arithmetic out of range");
                    return Ok(Aggregation::Failed);
                }
            };
            debug!(symbol = %exec.symbol, transition = transition.label(), attempt, "Applying transition");

            match self.apply(execution_id, exec, current, transition).await {
                Ok(aggregation) => return Ok(aggregation),
                Err(ApplyError::Archive(source)) => {
                    return Err(LedgerError::Archive {
                        symbol: exec.symbol.to_string(),
                        source,
                    })
                }
                Err(ApplyError::Overflow(e)) => {
                    warn!(symbol = %exec.symbol, execution_id, error = %e, "Cycle arithmetic out of range");
                    return Ok(Aggregation::Failed);
                }
                Err(ApplyError::Position(e)) if e.is_conflict() && attempt < self.conflict_retries => {
                    attempt += 1;
                    debug!(symbol = %exec.symbol, attempt, "Position changed concurrently, retrying");
                }
                Err(ApplyError::Position(e)) => {
                    warn!(
                        symbol = %exec.symbol,
                        execution_id,
                        error = %e,
                        "Position update failed"
                    );
                    return Ok(Aggregation::Failed);
                }
            }
        }
    }

    async fn apply(
        &self,
        execution_id: i64,
        exec: &Execution,
        current: Option<Position>,
        transition: Transition,
    ) -> Result<Aggregation, ApplyError> {
        match (transition, current) {
            (Transition::Open(new), _) => {
                let position = self
                    .repo
                    .create_position(&new)
                    .await
                    .map_err(ApplyError::Position)?;
                info!(
                    symbol = %position.symbol,
                    quantity = %position.quantity,
                    entry_price = %position.entry_price,
                    "Opened position"
                );
                self.attach(execution_id, position.id).await;
                Ok(Aggregation::Opened {
                    position_id: position.id,
                })
            }
            (
                Transition::Increase {
                    quantity,
                    entry_price,
                },
                Some(current),
            ) => {
                let position = self
                    .repo
                    .update_position(&current, quantity, entry_price)
                    .await
                    .map_err(ApplyError::Position)?;
                info!(
                    symbol = %position.symbol,
                    quantity = %position.quantity,
                    entry_price = %position.entry_price,
                    "Increased position"
                );
                self.attach(execution_id, position.id).await;
                Ok(Aggregation::Increased {
                    position_id: position.id,
                })
            }
            (Transition::Reduce { quantity }, Some(current)) => {
                let position = self
                    .repo
                    .update_position(&current, quantity, current.entry_price)
                    .await
                    .map_err(ApplyError::Position)?;
                info!(
                    symbol = %position.symbol,
                    quantity = %position.quantity,
                    "Reduced position"
                );
                self.attach(execution_id, position.id).await;
                Ok(Aggregation::Reduced {
                    position_id: position.id,
                })
            }
            (Transition::Close { oversold }, Some(current)) => {
                if oversold.is_positive() {
                    warn!(
                        symbol = %current.symbol,
                        oversold = %oversold,
                        "Sell exceeds open position, closing"
                    );
                }
                self.archive(execution_id, exec, &current).await
            }
            (Transition::SellWithoutPosition, _) => {
                warn!(
                    symbol = %exec.symbol,
                    key = %exec.key,
                    "Sell without open position, discarding"
                );
                Ok(Aggregation::SellWithoutPosition)
            }
            (transition, None) => {
                warn!(
                    symbol = %exec.symbol,
                    transition = transition.label(),
                    "Transition requires an open position"
                );
                Ok(Aggregation::Failed)
            }
        }
    }

    async fn attach(&self, execution_id: i64, position_id: i64) {
        if let Err(e) = self.repo.attach_position(execution_id, position_id).await {
            warn!(execution_id, position_id, error = %e, "Failed to link execution to position");
        }
    }

    /// Close the cycle: write the trade history, relink executions, drop the position.
    ///
    /// Only the trade history write is fatal; the follow-up steps log and continue.
    /// Executions keep their position id, so a failed relink can be repaired
    /// later with `Repository::relink_closed_cycles`.
    async fn archive(
        &self,
        execution_id: i64,
        closing: &Execution,
        position: &Position,
    ) -> Result<Aggregation, ApplyError> {
        let linked = self
            .repo
            .executions_for_position(position.id)
            .await
            .map_err(ApplyError::Archive)?;
        let cycle = linked
            .iter()
            .filter(|r| r.id != execution_id)
            .map(|r| &r.execution)
            .chain(std::iter::once(closing));
        let closed = engine::close_cycle(position, cycle, closing).map_err(ApplyError::Overflow)?;

        let history = self
            .repo
            .create_trade_history(&closed)
            .await
            .map_err(ApplyError::Archive)?;
        info!(
            symbol = %closed.symbol,
            trade_history_id = history.id,
            realized_pnl = %closed.realized_pnl,
            realized_pnl_pct = %closed.realized_pnl_pct,
            holding_period_hours = closed.holding_period_hours,
            "Closed position"
        );

        match self
            .repo
            .link_position_to_trade_history(position.id, history.id)
            .await
        {
            Ok(n) => debug!(position_id = position.id, linked = n, "Linked cycle executions"),
            Err(e) => warn!(
                position_id = position.id,
                trade_history_id = history.id,
                error = %e,
                "Failed to link cycle executions to trade history"
            ),
        }

        if let Err(e) = self.repo.attach_trade_history(execution_id, history.id).await {
            warn!(
                execution_id,
                trade_history_id = history.id,
                error = %e,
                "Failed to link closing execution to trade history"
            );
        }

        if let Err(e) = self.repo.delete_position(position).await {
            warn!(
                symbol = %position.symbol,
                position_id = position.id,
                error = %e,
                "Failed to delete closed position"
            );
        }

        Ok(Aggregation::Closed {
            trade_history_id: history.id,
        })
    }
}
