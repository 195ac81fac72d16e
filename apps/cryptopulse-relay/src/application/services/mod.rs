//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `MarketView`: Subscriber-side snapshot book and price history
//! - `PreferencesService`: Favorites and theme with write-through persistence

mod market_view;
mod preferences;

pub use market_view::MarketView;
pub use preferences::{Notice, PreferencesService, Updated};
