//! Execution type representing a single broker fill.

use crate::domain::{Decimal, DecimalOverflow, Side, Symbol, TimeMs};
use serde::{Deserialize, Serialize};

/// Idempotency key of an execution: the broker order id scoped by source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionKey {
    pub order_id: String,
    pub source: String,
}

impl ExecutionKey {
    pub fn new(order_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            source: source.into(),
        }
    }
}

impl std::fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.order_id)
    }
}

/// A validated fill, as produced by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub key: ExecutionKey,
    pub symbol: Symbol,
    pub side: Side,
    /// Filled quantity, always > 0.
    pub quantity: Decimal,
    /// Average fill price, always > 0.
    pub price: Decimal,
    /// Total notional; `quantity * price` unless the broker reported it.
    pub total_notional: Decimal,
    pub fees: Decimal,
    pub executed_at: TimeMs,
}

impl Execution {
    /// Create a new Execution, deriving the notional when none was reported.
    ///
    /// # Errors
    /// Returns `DecimalOverflow` when `quantity * price` is out of range.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: ExecutionKey,
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        total_notional: Option<Decimal>,
        fees: Decimal,
        executed_at: TimeMs,
    ) -> Result<Self, DecimalOverflow> {
        let total_notional = match total_notional {
            Some(notional) => notional,
            None => quantity.checked_mul(price)?,
        };
        Ok(Execution {
            key,
            symbol,
            side,
            quantity,
            price,
            total_notional,
            fees,
            executed_at,
        })
    }

    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }
}

/// An execution as stored in the audit ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub execution: Execution,
    /// Open position this fill was folded into, while the cycle is open.
    pub position_id: Option<i64>,
    /// Trade history record of the closed cycle this fill belongs to.
    pub trade_history_id: Option<i64>,
    pub created_at: TimeMs,
}
