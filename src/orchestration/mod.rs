//! Message pipeline and the driver that feeds it.

pub mod consumer;
pub mod ledger;

pub use consumer::{Consumer, ConsumerStats};
pub use ledger::{Aggregation, Ledger, ProcessOutcome, DEFAULT_CONFLICT_RETRIES};
