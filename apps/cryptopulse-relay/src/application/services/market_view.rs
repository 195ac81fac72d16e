//! Subscriber-side market state.

use crate::domain::market::{PriceHistory, PricePoint, TickerBook, TickerSnapshot};

/// Latest snapshot per symbol plus a bounded price window for charts.
#[derive(Debug, Clone, Default)]
pub struct MarketView {
    book: TickerBook,
    history: PriceHistory,
}

impl MarketView {
    /// Create a view keeping `history_capacity` price points per symbol.
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        Self {
            book: TickerBook::new(),
            history: PriceHistory::new(history_capacity),
        }
    }

    /// Record an update: overwrite the snapshot and extend the price window.
    ///
    /// The snapshot is stored even when its last price does not parse; only
    /// the chart window skips it.
    pub fn apply(&mut self, snapshot: TickerSnapshot) {
        match snapshot.last_price_decimal() {
            Some(price) => self.history.push(
                &snapshot.symbol,
                PricePoint {
                    price,
                    timestamp: snapshot.updated_at,
                },
            ),
            None => {
                tracing::debug!(
                    symbol = %snapshot.symbol,
                    last_price = %snapshot.last_price,
                    "Unparseable last price, skipping history point"
                );
            }
        }
        self.book.apply(snapshot);
    }

    /// Latest snapshot for a symbol.
    #[must_use]
    pub fn snapshot(&self, symbol: &str) -> Option<&TickerSnapshot> {
        self.book.get(symbol)
    }

    /// All snapshots.
    #[must_use]
    pub const fn book(&self) -> &TickerBook {
        &self.book
    }

    /// Price windows.
    #[must_use]
    pub const fn history(&self) -> &PriceHistory {
        &self.history
    }
}
