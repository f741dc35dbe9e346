//! Pure computation for the ledger: position transitions, cycle P&L, journal stats.

use crate::domain::{Decimal, NewPosition};

pub mod aggregator;
pub mod archiver;
pub mod stats;

pub use aggregator::{transition, weighted_average};
pub use archiver::{close_cycle, CycleTotals};
pub use stats::TradeStats;

/// How one execution changes the open position for its symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// ABSENT → OPEN on a buy.
    Open(NewPosition),
    /// OPEN → OPEN on a buy; new total quantity and weighted-average price.
    Increase {
        quantity: Decimal,
        entry_price: Decimal,
    },
    /// OPEN → OPEN on a partial sell; price unchanged.
    Reduce { quantity: Decimal },
    /// OPEN → ABSENT on a sell of the whole position or more.
    Close {
        /// Quantity sold beyond the open position (zero on an exact match).
        oversold: Decimal,
    },
    /// Sell while ABSENT: logged and discarded.
    SellWithoutPosition,
}

impl Transition {
    pub fn label(&self) -> &'static str {
        match self {
            Transition::Open(_) => "open",
            Transition::Increase { .. } => "increase",
            Transition::Reduce { .. } => "reduce",
            Transition::Close { .. } => "close",
            Transition::SellWithoutPosition => "sell_without_position",
        }
    }
}
