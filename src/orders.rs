//! Order engine - background watch tasks that poll a price feed and execute
//! buy/sell orders against account balances once a trigger price is crossed.
//!
//! Every submission returns an [`OrderHandle`]; results are never discarded.
//! A watch task suspends only between price polls, and that sleep is the
//! only place cancellation is observed. A task that has already passed its
//! trigger runs its mutation to completion.

use std::sync::{Arc, Weak};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::account::Account;
use crate::core::config::OrderConfig;
use crate::core::types::{AccountId, InstrumentId, Side};
use crate::core::{Error, Result};
use crate::feeds::PriceFeed;
use crate::ledger::Ledger;

/// One pending watch order. Exists only for the lifetime of its task.
#[derive(Debug, Clone)]
struct Order {
    id: Uuid,
    account: AccountId,
    instrument: InstrumentId,
    quantity: u32,
    trigger_price: Decimal,
    side: Side,
}

/// Handle to a background watch task.
pub struct OrderHandle {
    id: Uuid,
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<Decimal>>,
}

impl OrderHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation. Best-effort: a task still polling stops before
    /// its next price check; a task already executing its trigger step runs
    /// to completion and the applied mutation stands.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_done(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task and return its outcome: the debited cost (buy) or
    /// credited proceeds (sell), `0` for an expired order, or the error the
    /// task finished with.
    pub async fn await_result(self) -> Result<Decimal> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(Error::Cancelled),
            Err(e) => Err(Error::Task(e.to_string())),
        }
    }
}

/// Schedules watch tasks over a shared price feed and the account registry.
pub struct OrderEngine {
    ledger: Arc<Ledger>,
    feed: Arc<dyn PriceFeed>,
    poll_interval: Duration,
}

impl OrderEngine {
    pub fn new(ledger: Arc<Ledger>, feed: Arc<dyn PriceFeed>, config: &OrderConfig) -> Self {
        Self {
            ledger,
            feed,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    /// Watch `instrument` until its price falls to `max_price` or below,
    /// then buy `quantity` units if the account balance covers the cost at
    /// the observed price. An order whose funds are insufficient at trigger
    /// time completes with `0` and is not retried.
    pub fn submit_buy_order(
        &self,
        account: AccountId,
        instrument: InstrumentId,
        quantity: u32,
        max_price: Decimal,
    ) -> Result<OrderHandle> {
        if quantity == 0 || max_price <= Decimal::ZERO {
            return Err(Error::InvalidAmount);
        }
        let order = Order {
            id: Uuid::new_v4(),
            account,
            instrument,
            quantity,
            trigger_price: max_price,
            side: Side::Buy,
        };
        self.spawn(order)
    }

    /// Watch `instrument` until its price rises to `min_price` or above,
    /// then sell the account's entire holding at the observed price. A zero
    /// holding at trigger time completes with `0` and mutates nothing.
    pub fn submit_sell_order(
        &self,
        account: AccountId,
        instrument: InstrumentId,
        min_price: Decimal,
    ) -> Result<OrderHandle> {
        if min_price <= Decimal::ZERO {
            return Err(Error::InvalidAmount);
        }
        let order = Order {
            id: Uuid::new_v4(),
            account,
            instrument,
            quantity: 0,
            trigger_price: min_price,
            side: Side::Sell,
        };
        self.spawn(order)
    }

    fn spawn(&self, order: Order) -> Result<OrderHandle> {
        // Fail fast on unknown accounts; the task itself only keeps a weak
        // reference so a closed account is not kept alive by its orders.
        let account = self
            .ledger
            .account(order.account)
            .ok_or(Error::UnknownAccount(order.account))?;
        let account = Arc::downgrade(&account);

        info!(
            order = %order.id,
            side = %order.side,
            account = %order.account,
            instrument = %order.instrument,
            trigger = %order.trigger_price,
            "order submitted"
        );

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let feed = Arc::clone(&self.feed);
        let interval = self.poll_interval;
        let id = order.id;
        let task = tokio::spawn(watch_task(order, account, feed, interval, cancel_rx));

        Ok(OrderHandle {
            id,
            cancel: cancel_tx,
            task,
        })
    }
}

/// Resolves once cancellation is requested; never resolves if the handle
/// was dropped without cancelling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn watch_task(
    order: Order,
    account: Weak<Account>,
    feed: Arc<dyn PriceFeed>,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
) -> Result<Decimal> {
    let observed = loop {
        let price = feed.current_price(order.instrument).await?;
        let triggered = match order.side {
            Side::Buy => price <= order.trigger_price,
            Side::Sell => price >= order.trigger_price,
        };
        if triggered {
            break price;
        }
        debug!(order = %order.id, %price, trigger = %order.trigger_price, "not triggered");

        tokio::select! {
            _ = cancelled(&mut cancel) => {
                info!(order = %order.id, "order cancelled");
                return Err(Error::Cancelled);
            }
            _ = tokio::time::sleep(interval) => {}
        }
    };

    // Trigger step: from here the order runs to completion.
    let account = account.upgrade().ok_or(Error::UnknownAccount(order.account))?;
    let outcome = match order.side {
        Side::Buy => account.execute_buy(order.instrument, order.quantity, observed),
        Side::Sell => account.execute_sell(order.instrument, observed),
    };
    info!(order = %order.id, price = %observed, %outcome, "order triggered");
    Ok(outcome)
}
