//! Relay Wire Format
//!
//! Messages sent from the relay to subscribers. Field names are abbreviated
//! to keep frames small.
//!
//! # Wire Format (JSON)
//! ```json
//! {"type":"priceUpdate","data":{"s":"BTC","c":"65000","P":"120.50","p":"2.50",
//!  "v":"1000","h":"66000","l":"64000","o":"64880","n":"500"}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::market::{TickerSnapshot, TradeCount};

/// Envelope for every relay-to-subscriber message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WireMessage {
    /// Normalized 24h ticker for one symbol.
    #[serde(rename = "priceUpdate")]
    PriceUpdate(TickerPayload),
}

impl WireMessage {
    /// Serialize to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, an unknown `type`, or a payload
    /// missing fields.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Ticker payload keyed by abbreviated field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerPayload {
    /// Display symbol (quote asset stripped).
    #[serde(rename = "s")]
    pub symbol: String,
    /// Last price, trailing zeros dropped.
    #[serde(rename = "c")]
    pub last_price: String,
    /// Absolute 24h change, two decimals.
    #[serde(rename = "P")]
    pub price_change: String,
    /// Percent 24h change, two decimals.
    #[serde(rename = "p")]
    pub price_change_percent: String,
    /// 24h volume.
    #[serde(rename = "v")]
    pub volume: String,
    /// 24h high.
    #[serde(rename = "h")]
    pub high_price: String,
    /// 24h low.
    #[serde(rename = "l")]
    pub low_price: String,
    /// 24h open.
    #[serde(rename = "o")]
    pub open_price: String,
    /// Trade count, in the JSON form the exchange sent.
    #[serde(rename = "n")]
    pub trade_count: TradeCount,
}

impl TickerPayload {
    /// Convert into a snapshot stamped with the receipt time.
    #[must_use]
    pub fn into_snapshot(self, received_at: DateTime<Utc>) -> TickerSnapshot {
        TickerSnapshot {
            symbol: self.symbol,
            last_price: self.last_price,
            price_change: self.price_change,
            price_change_percent: self.price_change_percent,
            volume: self.volume,
            high_price: self.high_price,
            low_price: self.low_price,
            open_price: self.open_price,
            trade_count: self.trade_count,
            updated_at: received_at,
        }
    }
}
