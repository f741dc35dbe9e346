//! Event decoder: turns a raw transport payload into a validated Execution.

pub mod envelope;

use crate::domain::{Decimal, Execution, ExecutionKey, Side, Symbol, TimeMs};
use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::debug;

pub use envelope::{TradeEvent, TradeEventData, TRADE_DETECTED};

/// Secondary timestamp layout: no offset, interpreted as UTC.
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("invalid trade side: {0}")]
    InvalidSide(String),
}

/// Result of decoding one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A trade-fill notification, validated.
    Execution(Execution),
    /// Any other event type; not an error.
    Ignored { event_type: String },
}

#[derive(Debug, Clone)]
pub struct EventDecoder {
    trade_event_type: String,
}

impl EventDecoder {
    pub fn new(trade_event_type: impl Into<String>) -> Self {
        Self {
            trade_event_type: trade_event_type.into(),
        }
    }

    /// Decode a payload, using the wall clock for unparseable timestamps.
    ///
    /// # Errors
    /// `MalformedEvent` when the payload or a required numeric field cannot be
    /// parsed or the derived notional is out of range, `InvalidSide` when the side is neither buy nor sell.
    pub fn decode(&self, payload: &[u8]) -> Result<Decoded, DecodeError> {
        self.decode_at(payload, TimeMs::now())
    }

    /// Decode a payload with an explicit fallback time for the execution timestamp.
    pub fn decode_at(&self, payload: &[u8], now: TimeMs) -> Result<Decoded, DecodeError> {
        let event: TradeEvent = serde_json::from_slice(payload)
            .map_err(|e| DecodeError::MalformedEvent(format!("invalid envelope: {}", e)))?;

        if event.event_type != self.trade_event_type {
            debug!(event_type = %event.event_type, "Ignoring event type");
            return Ok(Decoded::Ignored {
                event_type: event.event_type,
            });
        }

        let data_value = event
            .data
            .ok_or_else(|| DecodeError::MalformedEvent("missing data block".to_string()))?;
        let data: TradeEventData = serde_json::from_value(data_value)
            .map_err(|e| DecodeError::MalformedEvent(format!("invalid data block: {}", e)))?;

        let order_id = non_empty(data.order_id.as_deref())
            .ok_or_else(|| DecodeError::MalformedEvent("missing order_id".to_string()))?;
        let symbol = non_empty(data.symbol.as_deref())
            .ok_or_else(|| DecodeError::MalformedEvent("missing symbol".to_string()))?;

        let quantity = parse_positive("quantity", data.quantity.as_deref())?;
        let price = parse_positive("average_price", data.average_price.as_deref())?;

        let total_notional = data
            .total_notional
            .as_deref()
            .and_then(|s| Decimal::from_str_canonical(s).ok());
        let fees = data
            .fees
            .as_deref()
            .and_then(|s| Decimal::from_str_canonical(s).ok())
            .unwrap_or_default();

        let side_raw = data.side.unwrap_or_default();
        let side = side_raw
            .parse::<Side>()
            .map_err(|_| DecodeError::InvalidSide(side_raw.clone()))?;

        let executed_at = data
            .executed_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now);

        let exec = Execution::new(
            ExecutionKey::new(order_id, event.source),
            Symbol::new(symbol),
            side,
            quantity,
            price,
            total_notional,
            fees,
            executed_at,
        )
        .map_err(|e| DecodeError::MalformedEvent(format!("notional out of range: {}", e)))?;
        Ok(Decoded::Execution(exec))
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new(TRADE_DETECTED)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_positive(field: &str, value: Option<&str>) -> Result<Decimal, DecodeError> {
    let raw = value.unwrap_or_default();
    let parsed = Decimal::from_str_canonical(raw)
        .map_err(|_| DecodeError::MalformedEvent(format!("invalid {} {:?}", field, raw)))?;
    if !parsed.is_positive() {
        return Err(DecodeError::MalformedEvent(format!(
            "{} must be positive, got {}",
            field, parsed
        )));
    }
    Ok(parsed)
}

/// RFC 3339 first, then a naive UTC layout. `None` when neither matches.
pub fn parse_timestamp(raw: &str) -> Option<TimeMs> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(TimeMs::from(dt.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(raw, NAIVE_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| TimeMs::from(naive.and_utc()))
}
