//! Bank accounts - balance, lock and currency rules per account kind.
//!
//! An [`Account`] is shared as `Arc<Account>` between the synchronous call
//! path (ledger deposits/withdrawals/transfers) and the order engine's watch
//! tasks. Every check-then-mutate sequence runs under one per-account mutex,
//! so no two mutations on the same account ever interleave.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::core::types::{AccountEvent, AccountId, Currency, Customer, InstrumentId};
use crate::core::{Error, Result};

/// Total withdrawals allowed from a savings account per calendar month, in EUR.
pub fn savings_monthly_cap() -> Decimal {
    Decimal::from(2000)
}

/// Balance floor a savings account may never fall below, in EUR.
pub fn savings_min_reserve() -> Decimal {
    Decimal::new(50, 2) // 0.50
}

/// Account kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Checking,
    Savings,
}

impl AccountKind {
    /// Whether accounts of this kind can send and receive transfers.
    pub fn supports_transfers(self) -> bool {
        matches!(self, AccountKind::Checking)
    }
}

/// Kind-specific withdrawal-policy state, kept under the account mutex.
#[derive(Debug, Clone)]
enum KindState {
    Checking {
        overdraft_limit: Decimal,
    },
    Savings {
        withdrawn_this_month: Decimal,
        period_start: NaiveDate,
    },
}

#[derive(Debug)]
struct AccountState {
    balance: Decimal,
    currency: Currency,
    locked: bool,
    holdings: HashMap<InstrumentId, u32>,
    kind: KindState,
}

/// A bank account. Balance is a signed amount in the account's currency.
///
/// While locked, every balance-reducing operation and owner change is
/// rejected; deposits are always allowed.
pub struct Account {
    id: AccountId,
    kind: AccountKind,
    owner: RwLock<Arc<Customer>>,
    state: Mutex<AccountState>,
    events: broadcast::Sender<AccountEvent>,
}

impl Account {
    /// Open a checking account with the given overdraft limit.
    pub fn checking(
        id: AccountId,
        owner: Arc<Customer>,
        overdraft_limit: Decimal,
    ) -> Result<Arc<Self>> {
        if overdraft_limit < Decimal::ZERO {
            return Err(Error::InvalidAmount);
        }
        Self::build(id, AccountKind::Checking, owner, KindState::Checking { overdraft_limit })
    }

    /// Open a savings account.
    pub fn savings(id: AccountId, owner: Arc<Customer>) -> Result<Arc<Self>> {
        Self::build(
            id,
            AccountKind::Savings,
            owner,
            KindState::Savings {
                withdrawn_this_month: Decimal::ZERO,
                period_start: Utc::now().date_naive(),
            },
        )
    }

    fn build(
        id: AccountId,
        kind: AccountKind,
        owner: Arc<Customer>,
        kind_state: KindState,
    ) -> Result<Arc<Self>> {
        if owner.name.trim().is_empty() {
            return Err(Error::InvalidOwner);
        }
        let (events, _) = broadcast::channel(64);
        Ok(Arc::new(Self {
            id,
            kind,
            owner: RwLock::new(owner),
            state: Mutex::new(AccountState {
                balance: Decimal::ZERO,
                currency: Currency::Eur,
                locked: false,
                holdings: HashMap::new(),
                kind: kind_state,
            }),
            events,
        }))
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn owner(&self) -> Arc<Customer> {
        Arc::clone(&self.owner.read())
    }

    pub fn balance(&self) -> Decimal {
        self.state.lock().balance
    }

    pub fn currency(&self) -> Currency {
        self.state.lock().currency
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Quantity held of the given instrument. Only the order engine mutates holdings.
    pub fn holding(&self, instrument: InstrumentId) -> u32 {
        self.state.lock().holdings.get(&instrument).copied().unwrap_or(0)
    }

    /// Overdraft limit in the account currency; `None` for non-checking kinds.
    pub fn overdraft_limit(&self) -> Option<Decimal> {
        match self.state.lock().kind {
            KindState::Checking { overdraft_limit } => Some(overdraft_limit),
            KindState::Savings { .. } => None,
        }
    }

    /// Amount withdrawn this calendar month; `None` for non-savings kinds.
    pub fn withdrawn_this_month(&self) -> Option<Decimal> {
        match self.state.lock().kind {
            KindState::Savings { withdrawn_this_month, .. } => Some(withdrawn_this_month),
            KindState::Checking { .. } => None,
        }
    }

    /// Subscribe to change notifications. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<AccountEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AccountEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_balance_changed(&self, old: Decimal, new: Decimal) {
        self.emit(AccountEvent::BalanceChanged {
            account: self.id,
            old,
            new,
            at: Utc::now(),
        });
    }

    /// Deposit `amount` given in `currency`, converting into the account
    /// currency. Always allowed, locked or not.
    pub fn deposit(&self, amount: Decimal, currency: Currency) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount);
        }
        let mut state = self.state.lock();
        let credited = Currency::convert(amount, currency, state.currency);
        let old = state.balance;
        state.balance += credited;
        let new = state.balance;
        drop(state);

        debug!(account = %self.id, %credited, "deposit");
        self.emit_balance_changed(old, new);
        Ok(())
    }

    /// Withdraw `amount` given in `currency`.
    ///
    /// Returns `Ok(false)` when the account is locked or the kind policy
    /// refuses the withdrawal (soft failures); the balance is untouched in
    /// either case. The authorization check and the debit are one atomic
    /// step with respect to all other mutations on this account.
    pub fn withdraw(&self, amount: Decimal, currency: Currency) -> Result<bool> {
        self.withdraw_on(amount, currency, Utc::now().date_naive())
    }

    fn withdraw_on(&self, amount: Decimal, currency: Currency, today: NaiveDate) -> Result<bool> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount);
        }
        let mut state = self.state.lock();
        if state.locked {
            return Ok(false);
        }

        let debit = Currency::convert(amount, currency, state.currency);
        let AccountState { balance, currency: account_currency, kind, .. } = &mut *state;

        let authorized = match kind {
            KindState::Checking { overdraft_limit } => *balance - debit >= -*overdraft_limit,
            KindState::Savings { withdrawn_this_month, period_start } => {
                if today.month() != period_start.month() || today.year() != period_start.year() {
                    *withdrawn_this_month = Decimal::ZERO;
                    *period_start = today;
                }
                let reserve = account_currency.from_eur(savings_min_reserve());
                let cap = account_currency.from_eur(savings_monthly_cap());
                *balance - debit >= reserve && *withdrawn_this_month + debit <= cap
            }
        };

        if !authorized {
            return Ok(false);
        }

        let old = *balance;
        *balance -= debit;
        let new = *balance;
        if let KindState::Savings { withdrawn_this_month, period_start } = kind {
            *withdrawn_this_month += debit;
            *period_start = today;
        }
        drop(state);

        debug!(account = %self.id, %debit, "withdrawal");
        self.emit_balance_changed(old, new);
        Ok(true)
    }

    /// Lock the account. Idempotent.
    pub fn lock(&self) {
        let mut state = self.state.lock();
        let old = state.locked;
        state.locked = true;
        drop(state);
        self.emit(AccountEvent::LockChanged {
            account: self.id,
            old,
            new: true,
            at: Utc::now(),
        });
    }

    /// Unlock the account. Idempotent.
    pub fn unlock(&self) {
        let mut state = self.state.lock();
        let old = state.locked;
        state.locked = false;
        drop(state);
        self.emit(AccountEvent::LockChanged {
            account: self.id,
            old,
            new: false,
            at: Utc::now(),
        });
    }

    /// Change the account currency, converting the balance and the
    /// kind-specific accumulators through the EUR pivot (2 dp half-up at
    /// each step).
    pub fn change_currency(&self, new_currency: Currency) {
        let mut state = self.state.lock();
        let old = state.currency;
        state.balance = Currency::convert(state.balance, old, new_currency);
        match &mut state.kind {
            KindState::Checking { overdraft_limit } => {
                *overdraft_limit = Currency::convert(*overdraft_limit, old, new_currency);
            }
            KindState::Savings { withdrawn_this_month, .. } => {
                *withdrawn_this_month =
                    Currency::convert(*withdrawn_this_month, old, new_currency);
            }
        }
        state.currency = new_currency;
        drop(state);

        debug!(account = %self.id, %old, %new_currency, "currency change");
        self.emit(AccountEvent::CurrencyChanged {
            account: self.id,
            old,
            new: new_currency,
            at: Utc::now(),
        });
    }

    /// Change the account owner. Rejected while the account is locked.
    pub fn set_owner(&self, new_owner: Arc<Customer>) -> Result<()> {
        if new_owner.name.trim().is_empty() {
            return Err(Error::InvalidOwner);
        }
        if self.is_locked() {
            return Err(Error::Locked(self.id));
        }
        *self.owner.write() = new_owner;
        Ok(())
    }

    /// Send a transfer. Checking accounts only; precondition identical to
    /// [`withdraw`](Self::withdraw).
    pub fn transfer_out(&self, amount: Decimal, currency: Currency) -> Result<bool> {
        if !self.kind.supports_transfers() {
            return Err(Error::Unsupported);
        }
        self.withdraw(amount, currency)
    }

    /// Receive a transfer. Checking accounts only; unconditional like a
    /// deposit, but sender and purpose must be non-empty.
    pub fn transfer_in(
        &self,
        amount: Decimal,
        currency: Currency,
        sender: &str,
        purpose: &str,
    ) -> Result<()> {
        if !self.kind.supports_transfers() {
            return Err(Error::Unsupported);
        }
        if sender.trim().is_empty() {
            return Err(Error::InvalidTransfer("empty sender"));
        }
        if purpose.trim().is_empty() {
            return Err(Error::InvalidTransfer("empty purpose"));
        }
        self.deposit(amount, currency)
    }

    /// Buy `quantity` units at `unit_price_eur` if the balance covers the
    /// cost. Returns the debited cost in the account currency, or zero when
    /// the account is locked or the funds are insufficient (no mutation).
    ///
    /// Called by the order engine's watch tasks only.
    pub(crate) fn execute_buy(
        &self,
        instrument: InstrumentId,
        quantity: u32,
        unit_price_eur: Decimal,
    ) -> Decimal {
        let mut state = self.state.lock();
        if state.locked {
            return Decimal::ZERO;
        }
        let cost = state
            .currency
            .from_eur(unit_price_eur * Decimal::from(quantity));
        if state.balance < cost {
            return Decimal::ZERO;
        }
        let old = state.balance;
        state.balance -= cost;
        let new = state.balance;
        *state.holdings.entry(instrument).or_insert(0) += quantity;
        drop(state);

        debug!(account = %self.id, %instrument, quantity, %cost, "buy executed");
        self.emit_balance_changed(old, new);
        cost
    }

    /// Sell the entire holding of `instrument` at `unit_price_eur` and
    /// credit the proceeds. Returns the credited proceeds, or zero when
    /// nothing is held (no mutation).
    pub(crate) fn execute_sell(&self, instrument: InstrumentId, unit_price_eur: Decimal) -> Decimal {
        let mut state = self.state.lock();
        let quantity = state.holdings.remove(&instrument).unwrap_or(0);
        if quantity == 0 {
            return Decimal::ZERO;
        }
        let proceeds = state
            .currency
            .from_eur(unit_price_eur * Decimal::from(quantity));
        let old = state.balance;
        state.balance += proceeds;
        let new = state.balance;
        drop(state);

        debug!(account = %self.id, %instrument, quantity, %proceeds, "sell executed");
        self.emit_balance_changed(old, new);
        proceeds
    }

    /// Serializable capture of this account's persistent state.
    pub fn snapshot(&self) -> AccountSnapshot {
        let state = self.state.lock();
        AccountSnapshot {
            id: self.id,
            kind: self.kind,
            owner: self.owner.read().as_ref().clone(),
            balance: state.balance,
            currency: state.currency,
            locked: state.locked,
            holdings: state.holdings.iter().map(|(k, v)| (*k, *v)).collect(),
            policy: match &state.kind {
                KindState::Checking { overdraft_limit } => PolicySnapshot::Checking {
                    overdraft_limit: *overdraft_limit,
                },
                KindState::Savings { withdrawn_this_month, period_start } => {
                    PolicySnapshot::Savings {
                        withdrawn_this_month: *withdrawn_this_month,
                        period_start: *period_start,
                    }
                }
            },
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Point-in-time account capture for the external persistence layer.
///
/// Round-tripping must preserve id, balance, currency, lock state and the
/// kind-specific accumulators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: AccountId,
    pub kind: AccountKind,
    pub owner: Customer,
    pub balance: Decimal,
    pub currency: Currency,
    pub locked: bool,
    pub holdings: Vec<(InstrumentId, u32)>,
    pub policy: PolicySnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PolicySnapshot {
    Checking {
        overdraft_limit: Decimal,
    },
    Savings {
        withdrawn_this_month: Decimal,
        period_start: NaiveDate,
    },
}
