//! Open position held for a single symbol.

use crate::domain::{Decimal, Symbol, TimeMs};
use serde::{Deserialize, Serialize};

/// The single open holding for a symbol, valued at weighted-average cost.
///
/// A row only exists while `quantity > 0`; closing the cycle deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub symbol: Symbol,
    pub quantity: Decimal,
    /// Weighted-average entry price.
    pub entry_price: Decimal,
    /// Execution time of the BUY that opened this cycle.
    pub entry_date: TimeMs,
    pub sector: Option<String>,
    pub entry_reason: Option<String>,
    pub entry_rsi: Option<Decimal>,
    /// Optimistic concurrency counter, bumped on every update.
    pub version: i64,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

/// Values needed to open a new position row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPosition {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub entry_date: TimeMs,
    pub sector: Option<String>,
    pub entry_reason: Option<String>,
    pub entry_rsi: Option<Decimal>,
}

impl NewPosition {
    pub fn new(symbol: Symbol, quantity: Decimal, entry_price: Decimal, entry_date: TimeMs) -> Self {
        Self {
            symbol,
            quantity,
            entry_price,
            entry_date,
            sector: None,
            entry_reason: None,
            entry_rsi: None,
        }
    }
}
