//! Simulated stock board - a random-walk price source for demos and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use crate::core::types::InstrumentId;
use crate::core::{Error, Result};
use crate::feeds::PriceFeed;

/// A listed stock with a mutable quote.
pub struct Stock {
    name: String,
    instrument: InstrumentId,
    price: RwLock<Decimal>,
}

impl Stock {
    pub fn new(name: impl Into<String>, instrument: InstrumentId, price: Decimal) -> Self {
        Self {
            name: name.into(),
            instrument,
            price: RwLock::new(price),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instrument(&self) -> InstrumentId {
        self.instrument
    }

    pub fn price(&self) -> Decimal {
        *self.price.read()
    }

    /// Nudge the quote by a uniform percentage in [-3%, +3%], re-rounded to
    /// 2 dp half-up.
    fn tick(&self) {
        let percent: f64 = rand::thread_rng().gen_range(-3.0..3.0);
        let factor = Decimal::ONE
            + Decimal::try_from(percent).unwrap_or(Decimal::ZERO) / Decimal::ONE_HUNDRED;
        let mut price = self.price.write();
        *price = (*price * factor)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        debug!(stock = %self.name, price = %*price, "quote updated");
    }
}

/// In-process price feed over a fixed set of listed stocks.
pub struct StockBoard {
    stocks: HashMap<InstrumentId, Arc<Stock>>,
}

impl StockBoard {
    pub fn new(stocks: impl IntoIterator<Item = Stock>) -> Arc<Self> {
        Arc::new(Self {
            stocks: stocks
                .into_iter()
                .map(|s| (s.instrument(), Arc::new(s)))
                .collect(),
        })
    }

    pub fn stock(&self, instrument: InstrumentId) -> Option<Arc<Stock>> {
        self.stocks.get(&instrument).cloned()
    }

    /// Start the random walk: every `interval` each listed quote moves by a
    /// random percentage. Aborts when the returned handle is dropped by the
    /// caller via `abort()`, or when the board itself is dropped.
    pub fn start_random_walk(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let board = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(board) = board.upgrade() else {
                    break;
                };
                for stock in board.stocks.values() {
                    stock.tick();
                }
            }
        })
    }
}

#[async_trait]
impl PriceFeed for StockBoard {
    async fn current_price(&self, instrument: InstrumentId) -> Result<Decimal> {
        self.stocks
            .get(&instrument)
            .map(|stock| stock.price())
            .ok_or_else(|| Error::Feed(format!("unknown instrument {instrument}")))
    }
}
