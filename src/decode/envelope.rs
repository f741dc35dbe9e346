//! Wire shape of trade notifications published by the broker-sync process.

use serde::{Deserialize, Deserializer};

/// Event type of a filled-order notification.
pub const TRADE_DETECTED: &str = "TRADE_DETECTED";

/// Outer event envelope.
///
/// `data` stays untyped until the event type is known, so other event kinds
/// sharing the topic never fail on a differently shaped data block.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEvent {
    pub event_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Fill details; numeric fields arrive as strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradeEventData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub quantity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub average_price: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub total_notional: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fees: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub executed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Accept a string, a bare JSON number, or null.
///
/// Producers are expected to send strings, but a number must not turn an
/// otherwise valid fill into a parse failure.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    })
}
