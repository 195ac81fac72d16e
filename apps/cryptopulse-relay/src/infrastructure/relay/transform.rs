//! Ticker Transformer
//!
//! Maps an exchange 24h ticker event onto the relay wire message. The mapping
//! is total and stateless. Change values are the exchange's own figures,
//! rounded for display; nothing is recomputed from prices.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use super::wire::{TickerPayload, WireMessage};
use crate::domain::market::Symbol;
use crate::infrastructure::binance::messages::TickerEvent;

/// Reasons a ticker event cannot be transformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// Symbol was empty or malformed.
    #[error("invalid symbol {0:?}")]
    InvalidSymbol(String),

    /// A numeric field did not parse as a decimal.
    #[error("field {field} is not a decimal: {value:?}")]
    InvalidNumber {
        /// Upstream field name.
        field: &'static str,
        /// Raw value received.
        value: String,
    },
}

/// Stateless mapping from upstream events to wire messages.
#[derive(Debug, Clone)]
pub struct TickerTransformer {
    quote_asset: String,
}

impl Default for TickerTransformer {
    fn default() -> Self {
        Self::new("USDT")
    }
}

impl TickerTransformer {
    /// Create a transformer that strips `quote_asset` from symbols.
    #[must_use]
    pub fn new(quote_asset: impl Into<String>) -> Self {
        Self {
            quote_asset: quote_asset.into().to_ascii_uppercase(),
        }
    }

    /// Transform one ticker event.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is malformed or the last price or
    /// change fields are not decimals. Callers drop such events.
    pub fn transform(&self, event: &TickerEvent) -> Result<WireMessage, TransformError> {
        let symbol =
            Symbol::new(&event.symbol).map_err(|_| TransformError::InvalidSymbol(event.symbol.clone()))?;

        let payload = TickerPayload {
            symbol: symbol.base_asset(&self.quote_asset).to_string(),
            last_price: normalized(parse_decimal("c", &event.last_price)?),
            price_change: two_places(parse_decimal("P", &event.price_change)?),
            price_change_percent: two_places(parse_decimal("p", &event.price_change_percent)?),
            volume: event.volume.clone(),
            high_price: event.high_price.clone(),
            low_price: event.low_price.clone(),
            open_price: event.open_price.clone(),
            trade_count: event.trade_count.clone(),
        };

        Ok(WireMessage::PriceUpdate(payload))
    }
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, TransformError> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| TransformError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

fn normalized(value: Decimal) -> String {
    value.normalize().to_string()
}

fn two_places(value: Decimal) -> String {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}
