use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing_subscriber::{EnvFilter, fmt};

use bankwerk::Config;
use bankwerk::account::AccountKind;
use bankwerk::core::types::{Currency, Customer, InstrumentId};
use bankwerk::feeds::{Stock, StockBoard};
use bankwerk::ledger::Ledger;
use bankwerk::orders::OrderEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logger
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bankwerk=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&PathBuf::from(path))?,
        None => Config::default(),
    };
    tracing::info!("Bankwerk starting (bank code {})", config.bank.bank_code);

    // 2. Open the bank and a pair of accounts
    let ledger = Arc::new(Ledger::new(&config.bank));

    let mia = Arc::new(Customer::new(
        "Mia Hartmann",
        "Bergstr. 12, Berlin",
        NaiveDate::from_ymd_opt(1990, 4, 17).unwrap(),
    ));
    let ben = Arc::new(Customer::new(
        "Ben Okafor",
        "Seeweg 3, Leipzig",
        NaiveDate::from_ymd_opt(1987, 11, 30).unwrap(),
    ));

    let checking = ledger.open_account(AccountKind::Checking, Arc::clone(&mia))?;
    let savings = ledger.open_account(AccountKind::Savings, Arc::clone(&ben))?;
    let other = ledger.open_account(AccountKind::Checking, ben)?;

    ledger.deposit(checking, Decimal::from(150_000), Currency::Eur)?;
    ledger.deposit(savings, Decimal::from(3_000), Currency::Eur)?;

    let sent = ledger.transfer(
        checking,
        other,
        Decimal::from(250),
        Currency::Eur,
        "November rent",
    )?;
    tracing::info!(sent, "transfer executed");

    // 3. Watch balance changes on the checking account
    let account = ledger.account(checking).expect("account just opened");
    let mut events = account.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(?event, "account notification");
        }
    });

    // 4. List a stock and let its price wander
    let siemens = InstrumentId(723610);
    let board = StockBoard::new([Stock::new("Siemens", siemens, Decimal::from(180))]);
    board.start_random_walk(Duration::from_millis(200));

    // 5. Submit a buy and a sell order and wait for both
    let engine = OrderEngine::new(Arc::clone(&ledger), board, &config.orders);

    let buy = engine.submit_buy_order(checking, siemens, 25, Decimal::from(200))?;
    let cost = buy.await_result().await?;
    tracing::info!(%cost, "buy order settled");

    let sell = engine.submit_sell_order(checking, siemens, Decimal::from(150))?;
    let proceeds = sell.await_result().await?;
    tracing::info!(%proceeds, "sell order settled");

    // 6. Final state
    tracing::info!(
        balance = %ledger.balance(checking)?,
        "checking account after trading"
    );
    println!("{}", serde_json::to_string_pretty(&ledger.snapshot())?);

    Ok(())
}
