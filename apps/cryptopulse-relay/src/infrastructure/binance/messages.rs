//! Binance WebSocket Message Types
//!
//! Wire format types for the exchange's market stream. Only the pieces the
//! relay consumes are modelled:
//!
//! - `SubscribeRequest`: the `SUBSCRIBE` control request sent after connect
//! - `TickerEvent`: the per-symbol 24h rolling ticker (`<symbol>@ticker`)
//! - `ControlReply`: acknowledgements and errors for control requests
//!
//! # References
//!
//! - [Individual Symbol Ticker Streams](https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams)

use serde::{Deserialize, Serialize};

use crate::domain::market::{Symbol, TradeCount};

/// Event type tag of the 24h ticker stream.
pub const TICKER_EVENT_TYPE: &str = "24hrTicker";

/// Request id used for the subscribe request.
pub const SUBSCRIBE_REQUEST_ID: u64 = 1;

// =============================================================================
// Control Messages
// =============================================================================

/// Stream subscription request.
///
/// # Wire Format (JSON)
/// ```json
/// {"method":"SUBSCRIBE","params":["btcusdt@ticker","ethusdt@ticker"],"id":1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Always `SUBSCRIBE`.
    pub method: String,
    /// Stream names.
    pub params: Vec<String>,
    /// Request id echoed in the reply.
    pub id: u64,
}

impl SubscribeRequest {
    /// Subscribe to the 24h ticker stream of every symbol, in order.
    #[must_use]
    pub fn tickers(symbols: &[Symbol]) -> Self {
        Self {
            method: "SUBSCRIBE".to_string(),
            params: symbols.iter().map(Symbol::ticker_stream).collect(),
            id: SUBSCRIBE_REQUEST_ID,
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Error body in a control reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlError {
    /// Error code.
    pub code: i64,
    /// Error description.
    pub msg: String,
}

/// Reply to a control request.
///
/// # Wire Format (JSON)
/// ```json
/// {"result":null,"id":1}
/// {"error":{"code":2,"msg":"Invalid request"},"id":1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply {
    /// Request id this reply answers.
    pub id: Option<u64>,
    /// Result payload (`null` on success).
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Error, if the request failed.
    #[serde(default)]
    pub error: Option<ControlError>,
}

impl ControlReply {
    /// Whether the request succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// =============================================================================
// Market Data
// =============================================================================

/// 24h rolling window ticker for one symbol.
///
/// Prices and quantities arrive as decimal strings and are kept verbatim.
/// Fields the relay does not forward are optional.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "e": "24hrTicker", "E": 1672515782136, "s": "BNBBTC",
///   "p": "0.0015", "P": "250.00", "w": "0.0018",
///   "c": "0.0025", "o": "0.0010", "h": "0.0025", "l": "0.0010",
///   "v": "10000", "q": "18", "n": 18151
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerEvent {
    /// Event type (always "24hrTicker").
    #[serde(rename = "e")]
    pub event_type: String,

    /// Event time (ms since epoch).
    #[serde(rename = "E", default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<u64>,

    /// Exchange symbol.
    #[serde(rename = "s")]
    pub symbol: String,

    /// Last price.
    #[serde(rename = "c")]
    pub last_price: String,

    /// The exchange's `P` field (documented upstream as the percent change).
    ///
    /// Forwarded as the wire `P` without swapping or recomputation.
    #[serde(rename = "P")]
    pub price_change: String,

    /// The exchange's `p` field (documented upstream as the absolute change).
    ///
    /// Forwarded as the wire `p` without swapping or recomputation.
    #[serde(rename = "p")]
    pub price_change_percent: String,

    /// Total traded base asset volume.
    #[serde(rename = "v")]
    pub volume: String,

    /// High price.
    #[serde(rename = "h")]
    pub high_price: String,

    /// Low price.
    #[serde(rename = "l")]
    pub low_price: String,

    /// Open price.
    #[serde(rename = "o")]
    pub open_price: String,

    /// Number of trades, in whatever JSON form it arrived.
    #[serde(rename = "n")]
    pub trade_count: TradeCount,

    /// Weighted average price.
    #[serde(rename = "w", default, skip_serializing_if = "Option::is_none")]
    pub weighted_avg_price: Option<String>,

    /// Total traded quote asset volume.
    #[serde(rename = "q", default, skip_serializing_if = "Option::is_none")]
    pub quote_volume: Option<String>,
}

/// Decoded upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamMessage {
    /// 24h ticker update.
    Ticker(Box<TickerEvent>),
    /// Reply to a control request.
    Reply(ControlReply),
    /// Event of a type the relay does not consume.
    Other {
        /// The event type tag.
        event_type: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_request_wire_format() {
        let symbols = vec![
            Symbol::new("BTCUSDT").unwrap(),
            Symbol::new("ETHUSDT").unwrap(),
        ];
        let json = SubscribeRequest::tickers(&symbols).to_json().unwrap();
        assert_eq!(
            json,
            r#"{"method":"SUBSCRIBE","params":["btcusdt@ticker","ethusdt@ticker"],"id":1}"#
        );
    }

    #[test]
    fn ticker_event_deserializes_full_payload() {
        let json = r#"{
            "e":"24hrTicker","E":1672515782136,"s":"BNBBTC","p":"0.0015","P":"250.00",
            "w":"0.0018","x":"0.0009","c":"0.0025","Q":"10","b":"0.0024","B":"10",
            "a":"0.0026","A":"100","o":"0.0010","h":"0.0025","l":"0.0010","v":"10000",
            "q":"18","O":0,"C":86400000,"F":0,"L":18150,"n":18151
        }"#;

        let event: TickerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, TICKER_EVENT_TYPE);
        assert_eq!(event.symbol, "BNBBTC");
        assert_eq!(event.price_change, "250.00");
        assert_eq!(event.price_change_percent, "0.0015");
        assert_eq!(event.trade_count, TradeCount::Count(18151));
        assert_eq!(event.quote_volume.as_deref(), Some("18"));
    }

    #[test]
    fn ticker_event_requires_price_fields() {
        let json = r#"{"e":"24hrTicker","s":"BTCUSDT","P":"1","p":"1","v":"1","h":"1","l":"1","o":"1","n":1}"#;
        assert!(serde_json::from_str::<TickerEvent>(json).is_err());
    }

    #[test]
    fn control_reply_success_and_error() {
        let ok: ControlReply = serde_json::from_str(r#"{"result":null,"id":1}"#).unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.id, Some(1));

        let err: ControlReply =
            serde_json::from_str(r#"{"error":{"code":2,"msg":"Invalid request"},"id":1}"#)
                .unwrap();
        assert!(!err.is_success());
        assert_eq!(err.error.unwrap().msg, "Invalid request");
    }
}
