//! Message transport abstraction for the consumption driver.

use async_trait::async_trait;
use std::fmt;

pub mod lines;
pub mod mock;

pub use lines::LinesTransport;
pub use mock::{MockTransport, MockTransportHandle};

/// One message pulled from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(partition: i32, offset: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            partition,
            offset,
            key: None,
            payload: payload.into(),
        }
    }
}

/// Source of trade event messages.
///
/// `next_message` must be cancel safe: the consumer drops the pending read
/// when shutdown is requested.
#[async_trait]
pub trait Transport: Send + fmt::Debug {
    /// Pull the next message. `Ok(None)` means the stream has ended.
    async fn next_message(&mut self) -> Result<Option<Message>, TransportError>;

    /// Acknowledge a fully processed message.
    async fn commit(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Release the underlying handle. Called once when the consumer stops.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// I/O failure on the underlying stream
    Io(String),
    /// The transport was used after `close`
    Closed,
    /// Other error
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(msg) => write!(f, "I/O error: {}", msg),
            TransportError::Closed => write!(f, "Transport closed"),
            TransportError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}
