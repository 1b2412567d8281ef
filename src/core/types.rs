//! Core Types - Strong typing for safety

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Unique bank account number, assigned by the [`Ledger`](crate::ledger::Ledger)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:010}", self.0)
    }
}

/// Identifier of a tradeable instrument (stock)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub u64);

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported currencies with their fixed EUR exchange rates.
///
/// 1 EUR buys `rate()` units of the currency. EUR is always the conversion
/// pivot and every conversion step rounds to 2 decimal places half-up,
/// matching the historical rate table used for account statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Eur,
    Bgn,
    Mkd,
    Dkk,
}

impl Currency {
    /// Units of this currency per 1 EUR.
    pub fn rate(self) -> Decimal {
        match self {
            Currency::Eur => Decimal::ONE,
            Currency::Bgn => Decimal::new(19558, 4), // 1.9558
            Currency::Mkd => Decimal::new(6162, 2),  // 61.62
            Currency::Dkk => Decimal::new(74604, 4), // 7.4604
        }
    }

    /// Convert an EUR amount into this currency, rounded to 2 dp half-up.
    pub fn from_eur(self, amount: Decimal) -> Decimal {
        (amount * self.rate()).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Convert an amount in this currency into EUR, rounded to 2 dp half-up.
    pub fn to_eur(self, amount: Decimal) -> Decimal {
        (amount / self.rate()).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Convert between two currencies through the EUR pivot.
    ///
    /// Rounding happens at each step; `convert(a, x, x)` still rounds once
    /// per leg, which is the documented two-step behavior.
    pub fn convert(amount: Decimal, from: Currency, to: Currency) -> Decimal {
        to.from_eur(from.to_eur(amount))
    }

    pub fn code(self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Bgn => "BGN",
            Currency::Mkd => "MKD",
            Currency::Dkk => "DKK",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Account holder. Referenced by accounts, never owned by them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub address: String,
    pub birth_date: NaiveDate,
}

impl Customer {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        birth_date: NaiveDate,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            birth_date,
        }
    }
}

impl std::fmt::Display for Customer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Change notification emitted by an account.
///
/// Delivery (print, UI binding, log) is external; subscribers may come and
/// go at any time without affecting account correctness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccountEvent {
    BalanceChanged {
        account: AccountId,
        old: Decimal,
        new: Decimal,
        at: DateTime<Utc>,
    },
    LockChanged {
        account: AccountId,
        old: bool,
        new: bool,
        at: DateTime<Utc>,
    },
    CurrencyChanged {
        account: AccountId,
        old: Currency,
        new: Currency,
        at: DateTime<Utc>,
    },
}

impl AccountEvent {
    pub fn account(&self) -> AccountId {
        match self {
            AccountEvent::BalanceChanged { account, .. }
            | AccountEvent::LockChanged { account, .. }
            | AccountEvent::CurrencyChanged { account, .. } => *account,
        }
    }
}
