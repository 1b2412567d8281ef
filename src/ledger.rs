//! Ledger - owns the account registry and executes cross-account operations.
//!
//! The registry has its own exclusion scope, independent of the per-account
//! mutexes, so opening one account never blocks operations on another.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::account::{Account, AccountKind, AccountSnapshot};
use crate::core::config::BankConfig;
use crate::core::types::{AccountId, Currency, Customer};
use crate::core::{Error, Result};

/// The bank: account registry, number allocation, transfers and bulk queries.
pub struct Ledger {
    bank_code: u64,
    base_number: u64,
    max_number: u64,
    default_overdraft: Decimal,
    next_offset: AtomicU64,
    accounts: RwLock<HashMap<AccountId, Arc<Account>>>,
}

impl Ledger {
    pub fn new(config: &BankConfig) -> Self {
        Self {
            bank_code: config.bank_code,
            base_number: config.base_number,
            max_number: config.max_number,
            default_overdraft: config.default_overdraft,
            next_offset: AtomicU64::new(0),
            accounts: RwLock::new(HashMap::new()),
        }
    }

    pub fn bank_code(&self) -> u64 {
        self.bank_code
    }

    /// Allocate the next sequential account number. Each number is handed
    /// out exactly once, even across close/reopen.
    fn allocate_number(&self) -> AccountId {
        AccountId(self.base_number + self.next_offset.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Open an account of the given kind. Checking accounts get the
    /// configured default overdraft.
    pub fn open_account(&self, kind: AccountKind, owner: Arc<Customer>) -> Result<AccountId> {
        match kind {
            AccountKind::Checking => {
                self.open_checking_with_overdraft(owner, self.default_overdraft)
            }
            AccountKind::Savings => {
                Self::require_owner(&owner)?;
                let id = self.allocate_number();
                let account = Account::savings(id, owner)?;
                self.insert(account);
                Ok(id)
            }
        }
    }

    /// Open a checking account with an explicit overdraft limit.
    pub fn open_checking_with_overdraft(
        &self,
        owner: Arc<Customer>,
        overdraft_limit: Decimal,
    ) -> Result<AccountId> {
        Self::require_owner(&owner)?;
        if overdraft_limit < Decimal::ZERO {
            return Err(Error::InvalidAmount);
        }
        let id = self.allocate_number();
        let account = Account::checking(id, owner, overdraft_limit)?;
        self.insert(account);
        Ok(id)
    }

    // Validated before allocating so a refused open never consumes a number.
    fn require_owner(owner: &Customer) -> Result<()> {
        if owner.name.trim().is_empty() {
            return Err(Error::InvalidOwner);
        }
        Ok(())
    }

    fn insert(&self, account: Arc<Account>) {
        let id = account.id();
        self.accounts.write().insert(id, account);
        info!(account = %id, "account opened");
    }

    /// Remove an account. Returns `false` when the id is unknown; closing an
    /// unknown account is a no-op, not an error.
    pub fn close_account(&self, id: AccountId) -> bool {
        let removed = self.accounts.write().remove(&id).is_some();
        if removed {
            info!(account = %id, "account closed");
        }
        removed
    }

    /// Look up an account. This is the keyed-registry interface other
    /// components (presentation layer, order engine) go through.
    pub fn account(&self, id: AccountId) -> Option<Arc<Account>> {
        self.accounts.read().get(&id).cloned()
    }

    fn require(&self, id: AccountId) -> Result<Arc<Account>> {
        self.account(id).ok_or(Error::UnknownAccount(id))
    }

    pub fn deposit(&self, id: AccountId, amount: Decimal, currency: Currency) -> Result<()> {
        self.require(id)?.deposit(amount, currency)
    }

    pub fn withdraw(&self, id: AccountId, amount: Decimal, currency: Currency) -> Result<bool> {
        self.require(id)?.withdraw(amount, currency)
    }

    pub fn balance(&self, id: AccountId) -> Result<Decimal> {
        Ok(self.require(id)?.balance())
    }

    /// Transfer between two accounts. The debit must fully succeed before
    /// the credit runs; if the credit is then refused, the debited amount is
    /// restored, so funds are never left debited without being credited.
    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        currency: Currency,
        purpose: &str,
    ) -> Result<bool> {
        let source = self.require(from)?;
        let destination = self.require(to)?;
        if !source.kind().supports_transfers() || !destination.kind().supports_transfers() {
            return Err(Error::Unsupported);
        }

        if !source.transfer_out(amount, currency)? {
            return Ok(false);
        }

        let sender = source.owner().name.clone();
        if let Err(e) = destination.transfer_in(amount, currency, &sender, purpose) {
            // Restore the debit; the transfer never happened.
            warn!(%from, %to, error = %e, "transfer credit refused, restoring debit");
            source.deposit(amount, currency)?;
            return Err(e);
        }

        info!(%from, %to, %amount, %currency, "transfer completed");
        Ok(true)
    }

    /// Lock every account whose balance is negative.
    pub fn lock_overdrawn(&self) {
        let accounts: Vec<_> = self.accounts.read().values().cloned().collect();
        for account in accounts {
            if account.balance() < Decimal::ZERO {
                warn!(account = %account.id(), "locking overdrawn account");
                account.lock();
            }
        }
    }

    /// Owners holding at least `minimum` in some account, deduplicated by
    /// owner identity. Order is not guaranteed.
    pub fn customers_with_balance_at_least(&self, minimum: Decimal) -> Vec<Arc<Customer>> {
        let accounts = self.accounts.read();
        let mut seen = HashSet::new();
        accounts
            .values()
            .filter(|account| account.balance() >= minimum)
            .map(|account| account.owner())
            .filter(|owner| seen.insert(Arc::clone(owner)))
            .collect()
    }

    /// All currently allocated account numbers.
    pub fn account_numbers(&self) -> Vec<AccountId> {
        self.accounts.read().keys().copied().collect()
    }

    /// Account numbers within the configured range that are not currently
    /// allocated.
    pub fn free_account_numbers(&self) -> Vec<AccountId> {
        let accounts = self.accounts.read();
        (self.base_number..self.max_number)
            .map(AccountId)
            .filter(|id| !accounts.contains_key(id))
            .collect()
    }

    /// Serializable capture of every account, for the external persistence
    /// layer.
    pub fn snapshot(&self) -> Vec<AccountSnapshot> {
        let mut snapshots: Vec<_> = self
            .accounts
            .read()
            .values()
            .map(|account| account.snapshot())
            .collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn config() -> BankConfig {
        BankConfig {
            bank_code: 12345678,
            base_number: 1000,
            max_number: 1010,
            default_overdraft: dec!(1000),
        }
    }

    fn customer(name: &str) -> Arc<Customer> {
        Arc::new(Customer::new(
            name,
            "Hauptstr. 1, Potsdam",
            NaiveDate::from_ymd_opt(1985, 9, 2).unwrap(),
        ))
    }

    #[test]
    fn allocates_sequential_unique_numbers() {
        let ledger = Ledger::new(&config());
        let a = ledger.open_account(AccountKind::Checking, customer("A")).unwrap();
        let b = ledger.open_account(AccountKind::Savings, customer("B")).unwrap();
        assert_eq!(a, AccountId(1001));
        assert_eq!(b, AccountId(1002));

        // Numbers are never reissued.
        assert!(ledger.close_account(a));
        let c = ledger.open_account(AccountKind::Checking, customer("C")).unwrap();
        assert_eq!(c, AccountId(1003));
    }

    #[test]
    fn refused_open_does_not_consume_a_number() {
        let ledger = Ledger::new(&config());
        let ghost = customer(" ");
        assert!(matches!(
            ledger.open_account(AccountKind::Savings, ghost),
            Err(Error::InvalidOwner)
        ));
        assert!(matches!(
            ledger.open_checking_with_overdraft(customer("A"), dec!(-1)),
            Err(Error::InvalidAmount)
        ));

        let id = ledger.open_account(AccountKind::Checking, customer("A")).unwrap();
        assert_eq!(id, AccountId(1001));
    }

    #[test]
    fn close_unknown_account_is_a_soft_failure() {
        let ledger = Ledger::new(&config());
        assert!(!ledger.close_account(AccountId(9999)));
    }

    #[test]
    fn deposit_and_withdraw_delegate_or_fail_on_unknown_id() {
        let ledger = Ledger::new(&config());
        let id = ledger.open_account(AccountKind::Checking, customer("A")).unwrap();

        ledger.deposit(id, dec!(200), Currency::Eur).unwrap();
        assert_eq!(ledger.balance(id).unwrap(), dec!(200));
        assert!(ledger.withdraw(id, dec!(50), Currency::Eur).unwrap());
        assert_eq!(ledger.balance(id).unwrap(), dec!(150));

        assert!(matches!(
            ledger.deposit(AccountId(42), dec!(1), Currency::Eur),
            Err(Error::UnknownAccount(AccountId(42)))
        ));
        assert!(matches!(
            ledger.balance(AccountId(42)),
            Err(Error::UnknownAccount(_))
        ));
    }

    #[test]
    fn transfer_moves_funds_between_checking_accounts() {
        let ledger = Ledger::new(&config());
        let from = ledger.open_account(AccountKind::Checking, customer("A")).unwrap();
        let to = ledger.open_account(AccountKind::Checking, customer("B")).unwrap();
        ledger.deposit(from, dec!(300), Currency::Eur).unwrap();

        assert!(ledger.transfer(from, to, dec!(120), Currency::Eur, "rent").unwrap());
        assert_eq!(ledger.balance(from).unwrap(), dec!(180));
        assert_eq!(ledger.balance(to).unwrap(), dec!(120));
    }

    #[test]
    fn transfer_aborts_before_any_mutation_when_debit_fails() {
        let ledger = Ledger::new(&config());
        let from = ledger.open_checking_with_overdraft(customer("A"), dec!(0)).unwrap();
        let to = ledger.open_account(AccountKind::Checking, customer("B")).unwrap();
        ledger.deposit(from, dec!(10), Currency::Eur).unwrap();

        assert!(!ledger.transfer(from, to, dec!(50), Currency::Eur, "rent").unwrap());
        assert_eq!(ledger.balance(from).unwrap(), dec!(10));
        assert_eq!(ledger.balance(to).unwrap(), dec!(0));
    }

    #[test]
    fn transfer_restores_debit_when_credit_is_refused() {
        let ledger = Ledger::new(&config());
        let from = ledger.open_account(AccountKind::Checking, customer("A")).unwrap();
        let to = ledger.open_account(AccountKind::Checking, customer("B")).unwrap();
        ledger.deposit(from, dec!(100), Currency::Eur).unwrap();

        // Empty purpose makes the credit side refuse after the debit.
        let result = ledger.transfer(from, to, dec!(40), Currency::Eur, "");
        assert!(matches!(result, Err(Error::InvalidTransfer(_))));
        assert_eq!(ledger.balance(from).unwrap(), dec!(100));
        assert_eq!(ledger.balance(to).unwrap(), dec!(0));
    }

    #[test]
    fn transfer_involving_savings_is_unsupported() {
        let ledger = Ledger::new(&config());
        let from = ledger.open_account(AccountKind::Checking, customer("A")).unwrap();
        let to = ledger.open_account(AccountKind::Savings, customer("B")).unwrap();
        ledger.deposit(from, dec!(100), Currency::Eur).unwrap();

        assert!(matches!(
            ledger.transfer(from, to, dec!(10), Currency::Eur, "rent"),
            Err(Error::Unsupported)
        ));
        assert_eq!(ledger.balance(from).unwrap(), dec!(100));
    }

    #[test]
    fn transfer_with_unknown_id_is_a_hard_error() {
        let ledger = Ledger::new(&config());
        let from = ledger.open_account(AccountKind::Checking, customer("A")).unwrap();
        assert!(matches!(
            ledger.transfer(from, AccountId(9), dec!(1), Currency::Eur, "x"),
            Err(Error::UnknownAccount(_))
        ));
    }

    #[test]
    fn lock_overdrawn_locks_exactly_the_negative_accounts() {
        let ledger = Ledger::new(&config());
        let red = ledger.open_account(AccountKind::Checking, customer("A")).unwrap();
        let black = ledger.open_account(AccountKind::Checking, customer("B")).unwrap();
        ledger.deposit(black, dec!(100), Currency::Eur).unwrap();
        assert!(ledger.withdraw(red, dec!(250), Currency::Eur).unwrap());

        ledger.lock_overdrawn();
        assert!(ledger.account(red).unwrap().is_locked());
        assert!(!ledger.account(black).unwrap().is_locked());
    }

    #[test]
    fn rich_customers_are_deduplicated_by_owner() {
        let ledger = Ledger::new(&config());
        let mia = customer("Mia");
        let one = ledger.open_account(AccountKind::Checking, Arc::clone(&mia)).unwrap();
        let two = ledger.open_account(AccountKind::Savings, Arc::clone(&mia)).unwrap();
        let poor = ledger.open_account(AccountKind::Checking, customer("Ben")).unwrap();
        ledger.deposit(one, dec!(5000), Currency::Eur).unwrap();
        ledger.deposit(two, dec!(5000), Currency::Eur).unwrap();
        ledger.deposit(poor, dec!(10), Currency::Eur).unwrap();

        let rich = ledger.customers_with_balance_at_least(dec!(1000));
        assert_eq!(rich.len(), 1);
        assert_eq!(rich[0].name, "Mia");
    }

    #[test]
    fn free_account_numbers_reflect_the_registry() {
        let ledger = Ledger::new(&config());
        let a = ledger.open_account(AccountKind::Checking, customer("A")).unwrap();
        let b = ledger.open_account(AccountKind::Checking, customer("B")).unwrap();

        let mut free = ledger.free_account_numbers();
        free.sort();
        assert!(!free.contains(&a));
        assert!(!free.contains(&b));
        assert_eq!(free.len(), 8); // range holds 10 numbers, 2 allocated

        ledger.close_account(a);
        assert!(ledger.free_account_numbers().contains(&a));
    }

    #[test]
    fn snapshot_round_trips_every_account_through_json() {
        let ledger = Ledger::new(&config());
        let a = ledger.open_account(AccountKind::Checking, customer("A")).unwrap();
        let b = ledger.open_account(AccountKind::Savings, customer("B")).unwrap();
        ledger.deposit(a, dec!(12.34), Currency::Eur).unwrap();
        ledger.deposit(b, dec!(500), Currency::Eur).unwrap();
        ledger.withdraw(b, dec!(20), Currency::Eur).unwrap();
        ledger.account(a).unwrap().lock();

        let snapshot = ledger.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: Vec<AccountSnapshot> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(restored.len(), 2);
    }
}
