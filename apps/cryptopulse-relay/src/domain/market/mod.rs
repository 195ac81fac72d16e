//! Market Data Types
//!
//! Normalized per-symbol ticker state. A consumer of the relay keeps one
//! [`TickerSnapshot`] per symbol in a [`TickerBook`] (last write wins, entries
//! are never removed) and a bounded [`PriceHistory`] window used for charts.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default number of price points retained per symbol.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

// =============================================================================
// Symbol
// =============================================================================

/// An uppercase trading pair identifier such as `BTCUSDT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Parse a symbol, normalizing to uppercase.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or contains characters other
    /// than ASCII letters and digits.
    pub fn new(raw: &str) -> Result<Self, SymbolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SymbolError::Empty);
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SymbolError::InvalidCharacters(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// The symbol as an uppercase string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the exchange's 24h ticker stream for this symbol.
    #[must_use]
    pub fn ticker_stream(&self) -> String {
        format!("{}@ticker", self.0.to_ascii_lowercase())
    }

    /// Symbol with the quote asset suffix removed (`BTCUSDT` -> `BTC`).
    ///
    /// Symbols that do not end in the quote asset are returned unchanged.
    #[must_use]
    pub fn base_asset<'a>(&'a self, quote_asset: &str) -> &'a str {
        match self.0.strip_suffix(quote_asset) {
            Some(base) if !base.is_empty() => base,
            _ => &self.0,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Symbol parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Symbol was empty after trimming.
    #[error("symbol cannot be empty")]
    Empty,
    /// Symbol contained characters other than ASCII alphanumerics.
    #[error("invalid symbol: {0}")]
    InvalidCharacters(String),
}

// =============================================================================
// Trade Count
// =============================================================================

/// 24h trade count exactly as the exchange sent it.
///
/// The exchange documents a number, but the value is passed through untouched
/// so a string form (`"500"`) survives the relay as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TradeCount {
    /// Numeric form.
    Count(u64),
    /// Any other textual form.
    Raw(String),
}

impl TradeCount {
    /// The count as an integer, if it is one.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Count(n) => Some(*n),
            Self::Raw(s) => s.trim().parse().ok(),
        }
    }
}

impl From<u64> for TradeCount {
    fn from(n: u64) -> Self {
        Self::Count(n)
    }
}

impl fmt::Display for TradeCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => n.fmt(f),
            Self::Raw(s) => f.write_str(s),
        }
    }
}

// =============================================================================
// Ticker Snapshot
// =============================================================================

/// Latest known 24h ticker state for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerSnapshot {
    /// Display symbol (quote asset stripped).
    pub symbol: String,
    /// Last traded price.
    pub last_price: String,
    /// Absolute 24h price change.
    pub price_change: String,
    /// Percent 24h price change.
    pub price_change_percent: String,
    /// 24h base asset volume.
    pub volume: String,
    /// 24h high.
    pub high_price: String,
    /// 24h low.
    pub low_price: String,
    /// 24h open.
    pub open_price: String,
    /// Number of trades in the 24h window.
    pub trade_count: TradeCount,
    /// When this snapshot was received.
    pub updated_at: DateTime<Utc>,
}

impl TickerSnapshot {
    /// Parse the last price as a decimal, if well formed.
    #[must_use]
    pub fn last_price_decimal(&self) -> Option<Decimal> {
        self.last_price.parse().ok()
    }
}

// =============================================================================
// Ticker Book
// =============================================================================

/// One snapshot per symbol, overwritten in place on every update.
#[derive(Debug, Default, Clone)]
pub struct TickerBook {
    snapshots: HashMap<String, TickerSnapshot>,
}

impl TickerBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot, replacing any previous one for the same symbol.
    ///
    /// Returns the replaced snapshot.
    pub fn apply(&mut self, snapshot: TickerSnapshot) -> Option<TickerSnapshot> {
        self.snapshots.insert(snapshot.symbol.clone(), snapshot)
    }

    /// Latest snapshot for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&TickerSnapshot> {
        self.snapshots.get(symbol)
    }

    /// Number of symbols seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no symbol has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Known symbols in lexical order.
    #[must_use]
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.snapshots.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }
}

// =============================================================================
// Price History
// =============================================================================

/// One point in a symbol's price window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Last price at the time of the update.
    pub price: Decimal,
    /// When the update was received.
    pub timestamp: DateTime<Utc>,
}

/// Most-recent-N price points per symbol, oldest evicted first.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    series: HashMap<String, VecDeque<PricePoint>>,
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl PriceHistory {
    /// Create a history keeping at most `capacity` points per symbol.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: HashMap::new(),
        }
    }

    /// Maximum points kept per symbol.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a point, evicting the oldest once the window is full.
    pub fn push(&mut self, symbol: &str, point: PricePoint) {
        let capacity = self.capacity;
        let window = self
            .series
            .entry(symbol.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        window.push_back(point);
        while window.len() > capacity {
            window.pop_front();
        }
    }

    /// Points for a symbol, oldest first.
    #[must_use]
    pub fn points(&self, symbol: &str) -> Vec<PricePoint> {
        self.series
            .get(symbol)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of points held for a symbol.
    #[must_use]
    pub fn len(&self, symbol: &str) -> usize {
        self.series.get(symbol).map_or(0, VecDeque::len)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn snapshot(symbol: &str, price: &str) -> TickerSnapshot {
        TickerSnapshot {
            symbol: symbol.to_string(),
            last_price: price.to_string(),
            price_change: "1.00".to_string(),
            price_change_percent: "0.50".to_string(),
            volume: "10".to_string(),
            high_price: "2".to_string(),
            low_price: "1".to_string(),
            open_price: "1.5".to_string(),
            trade_count: TradeCount::Count(7),
            updated_at: Utc::now(),
        }
    }

    fn point(price: i64) -> PricePoint {
        PricePoint {
            price: Decimal::from(price),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn symbol_normalizes_to_uppercase() {
        let symbol = Symbol::new(" btcusdt ").unwrap();
        assert_eq!(symbol.as_str(), "BTCUSDT");
        assert_eq!(symbol.ticker_stream(), "btcusdt@ticker");
    }

    #[test]
    fn symbol_rejects_bad_input() {
        assert_eq!(Symbol::new("  "), Err(SymbolError::Empty));
        assert!(matches!(
            Symbol::new("BTC/USDT"),
            Err(SymbolError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn base_asset_strips_quote_suffix() {
        let symbol = Symbol::new("DOGEUSDT").unwrap();
        assert_eq!(symbol.base_asset("USDT"), "DOGE");
        assert_eq!(symbol.base_asset("BTC"), "DOGEUSDT");

        let bare = Symbol::new("USDT").unwrap();
        assert_eq!(bare.base_asset("USDT"), "USDT");
    }

    #[test]
    fn trade_count_keeps_its_json_form() {
        let number: TradeCount = serde_json::from_str("500").unwrap();
        let text: TradeCount = serde_json::from_str(r#""500""#).unwrap();

        assert_eq!(number, TradeCount::Count(500));
        assert_eq!(text, TradeCount::Raw("500".to_string()));
        assert_eq!(serde_json::to_string(&number).unwrap(), "500");
        assert_eq!(serde_json::to_string(&text).unwrap(), r#""500""#);
        assert_eq!(text.as_u64(), Some(500));
        assert_eq!(text.to_string(), "500");
    }

    #[test]
    fn book_is_last_write_wins() {
        let mut book = TickerBook::new();
        assert!(book.apply(snapshot("BTC", "1")).is_none());
        let replaced = book.apply(snapshot("BTC", "2")).unwrap();

        assert_eq!(replaced.last_price, "1");
        assert_eq!(book.get("BTC").unwrap().last_price, "2");
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn book_lists_symbols_sorted() {
        let mut book = TickerBook::new();
        book.apply(snapshot("SOL", "1"));
        book.apply(snapshot("BTC", "1"));
        book.apply(snapshot("ETH", "1"));
        assert_eq!(book.symbols(), vec!["BTC", "ETH", "SOL"]);
    }

    #[test]
    fn history_keeps_latest_hundred() {
        let mut history = PriceHistory::default();
        for i in 0..101 {
            history.push("BTC", point(i));
        }

        let points = history.points("BTC");
        assert_eq!(points.len(), 100);
        assert_eq!(points.first().unwrap().price, Decimal::from(1));
        assert_eq!(points.last().unwrap().price, Decimal::from(100));
    }

    #[test]
    fn history_series_are_independent() {
        let mut history = PriceHistory::new(2);
        history.push("BTC", point(1));
        history.push("ETH", point(2));
        history.push("BTC", point(3));
        history.push("BTC", point(4));

        assert_eq!(history.len("BTC"), 2);
        assert_eq!(history.len("ETH"), 1);
        assert_eq!(history.len("SOL"), 0);
    }

    #[test]
    fn zero_capacity_keeps_one_point() {
        let mut history = PriceHistory::new(0);
        history.push("BTC", point(1));
        history.push("BTC", point(2));
        let points = history.points("BTC");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].price, Decimal::from(2));
    }

    proptest! {
        #[test]
        fn history_window_is_suffix_of_input(
            capacity in 1usize..50,
            prices in proptest::collection::vec(0i64..1_000_000, 0..200),
        ) {
            let mut history = PriceHistory::new(capacity);
            for p in &prices {
                history.push("X", point(*p));
            }

            let kept: Vec<Decimal> = history.points("X").iter().map(|p| p.price).collect();
            let skip = prices.len().saturating_sub(capacity);
            let expected: Vec<Decimal> = prices[skip..].iter().map(|p| Decimal::from(*p)).collect();
            prop_assert_eq!(kept, expected);
        }
    }
}
