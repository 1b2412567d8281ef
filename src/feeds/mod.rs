//! Price feeds - polled, read-only market data sources.

pub mod simulated;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::Result;
use crate::core::types::InstrumentId;

pub use simulated::{Stock, StockBoard};

/// A source of current prices, polled by the order engine's watch tasks.
///
/// Prices are EUR-denominated. The feed is read-only from the core's point
/// of view; it never pushes updates.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Current price for an instrument.
    async fn current_price(&self, instrument: InstrumentId) -> Result<Decimal>;
}
