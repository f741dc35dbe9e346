//! Scripted transport for testing the consumer without a broker.

use super::{Message, Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Step {
    Payload(Vec<u8>),
    ReadError(TransportError),
}

/// Observer for commits and closes made on a `MockTransport`.
#[derive(Debug, Clone, Default)]
pub struct MockTransportHandle {
    committed: Arc<Mutex<Vec<i64>>>,
    closes: Arc<AtomicUsize>,
}

impl MockTransportHandle {
    /// Offsets committed so far, in commit order.
    pub fn committed_offsets(&self) -> Vec<i64> {
        self.committed
            .lock()
            .map(|offsets| offsets.clone())
            .unwrap_or_default()
    }

    pub fn commit_count(&self) -> usize {
        self.committed_offsets().len()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Mock transport that replays predefined payloads and read errors.
///
/// Once the script is drained the transport either reports end of stream or,
/// by default, blocks like an idle broker until the consumer is cancelled.
#[derive(Debug)]
pub struct MockTransport {
    script: VecDeque<Step>,
    next_offset: i64,
    end_when_drained: bool,
    closed: bool,
    handle: MockTransportHandle,
}

impl MockTransport {
    /// Create a new mock transport with an empty script.
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            next_offset: 0,
            end_when_drained: false,
            closed: false,
            handle: MockTransportHandle::default(),
        }
    }

    /// Queue a message payload.
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.script.push_back(Step::Payload(payload.into()));
        self
    }

    /// Queue multiple message payloads.
    pub fn with_payloads<I, P>(mut self, payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        self.script
            .extend(payloads.into_iter().map(|p| Step::Payload(p.into())));
        self
    }

    /// Queue a failed read.
    pub fn with_read_error(mut self, err: TransportError) -> Self {
        self.script.push_back(Step::ReadError(err));
        self
    }

    /// Report end of stream once the script is drained.
    pub fn ending_when_drained(mut self) -> Self {
        self.end_when_drained = true;
        self
    }

    pub fn handle(&self) -> MockTransportHandle {
        self.handle.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn next_message(&mut self) -> Result<Option<Message>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.script.pop_front() {
            Some(Step::Payload(payload)) => {
                let offset = self.next_offset;
                self.next_offset += 1;
                Ok(Some(Message::new(0, offset, payload)))
            }
            Some(Step::ReadError(err)) => Err(err),
            None if self.end_when_drained => Ok(None),
            None => std::future::pending().await,
        }
    }

    async fn commit(&mut self, message: &Message) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if let Ok(mut committed) = self.handle.committed.lock() {
            committed.push(message.offset);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.handle.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
