pub mod config;
pub mod db;
pub mod decode;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod transport;

pub use config::{Config, EventInput};
pub use db::{init_db, RepoError, Repository};
pub use decode::{DecodeError, Decoded, EventDecoder};
pub use domain::{
    ClosedCycle, Decimal, Execution, ExecutionKey, ExecutionRecord, NewPosition, Position, Side,
    Symbol, TimeMs, TradeHistory, TradeJournal,
};
pub use engine::{TradeStats, Transition};
pub use error::LedgerError;
pub use orchestration::{Aggregation, Consumer, ConsumerStats, Ledger, ProcessOutcome};
pub use transport::{LinesTransport, Message, MockTransport, Transport, TransportError};
