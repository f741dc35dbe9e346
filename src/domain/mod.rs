//! Domain types for the trade ledger.
//!
//! This module provides:
//! - Exact numeric handling via the Decimal wrapper
//! - Domain primitives: TimeMs, Symbol, Side
//! - Execution (audit fact), Position (open holding) and TradeHistory (closed cycle)

pub mod decimal;
pub mod execution;
pub mod position;
pub mod primitives;
pub mod trade_history;

pub use decimal::{Decimal, DecimalOverflow};
pub use execution::{Execution, ExecutionKey, ExecutionRecord};
pub use position::{NewPosition, Position};
pub use primitives::{Side, SideParseError, Symbol, TimeMs};
pub use trade_history::{ClosedCycle, TradeHistory, TradeJournal};
