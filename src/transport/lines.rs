//! Newline-delimited JSON transport over any async buffered reader.
//!
//! Lets the consumer sit at the end of a pipe from a broker CLI, or replay a
//! captured file. Offsets are 1-based line numbers. Lines are passed on as raw
//! bytes; invalid UTF-8 is left for the decoder to reject.

use super::{Message, Transport, TransportError};
use async_trait::async_trait;
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Split};
use tracing::debug;

pub struct LinesTransport<R> {
    lines: Split<R>,
    line_no: i64,
    last_committed: Option<i64>,
    closed: bool,
}

impl<R: AsyncBufRead + Unpin + Send> LinesTransport<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.split(b'\n'),
            line_no: 0,
            last_committed: None,
            closed: false,
        }
    }

    pub fn last_committed(&self) -> Option<i64> {
        self.last_committed
    }
}

impl LinesTransport<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl LinesTransport<BufReader<tokio::fs::File>> {
    pub async fn open(path: &str) -> Result<Self, TransportError> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R> fmt::Debug for LinesTransport<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinesTransport")
            .field("line_no", &self.line_no)
            .field("last_committed", &self.last_committed)
            .field("closed", &self.closed)
            .finish()
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Transport for LinesTransport<R> {
    async fn next_message(&mut self) -> Result<Option<Message>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        loop {
            let Some(mut line) = self.lines.next_segment().await? else {
                return Ok(None);
            };
            self.line_no += 1;
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(Message::new(0, self.line_no, line)));
        }
    }

    async fn commit(&mut self, message: &Message) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        debug!(offset = message.offset, "Committed line");
        self.last_committed = Some(message.offset);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}
