//! Balance Store
//!
//! The authoritative record of every account. All other components read and
//! write balances through this store; none of them touch an [`Account`]
//! directly.
//!
//! # Critical Invariants
//!
//! 1. **Non-negative balances**: a debit larger than the balance is rejected
//! 2. **Serialized mutation**: each account sits behind its own mutex; two
//!    mutations of the same account never interleave
//! 3. **Audit completeness**: every credit and debit appends one audit entry
//!    while the account lock is still held
//! 4. **Bounded waits**: lock acquisition times out and surfaces as the
//!    transient [`StoreError::ConcurrentModification`]
//!
//! # Lock ordering
//!
//! Multi-account operations go through [`BalanceStore::lock_pair`], which
//! always acquires the lower account id first. The audit log lock is a leaf:
//! nothing else is acquired while it is held.

pub mod retry;

pub use retry::{RetryPolicy, Retryable};

use crate::core::time::Clock;
use crate::models::account::{Account, AccountError, SubscriptionTier};
use crate::models::event::{AuditEntry, AuditLog, AuditReason};
use chrono::NaiveDate;
use parking_lot::{Mutex, RawMutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Exclusive handle on one account, released on drop
pub type AccountLock = parking_lot::lock_api::ArcMutexGuard<RawMutex, Account>;

/// Read-only hold on one account's lock, released on drop
pub struct AccountHold {
    guard: AccountLock,
}

impl AccountHold {
    pub(crate) fn new(guard: AccountLock) -> Self {
        Self { guard }
    }

    pub fn account(&self) -> &Account {
        &self.guard
    }
}

/// Errors that can occur in the Balance Store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    DuplicateAccount(String),

    #[error("Concurrent modification of account {0}, lock not acquired in time")]
    ConcurrentModification(String),

    #[error("Cannot lock account {0} twice in one operation")]
    SameAccount(String),

    #[error("Total supply exceeds i64::MAX")]
    SupplyOverflow,

    #[error(transparent)]
    Account(#[from] AccountError),
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConcurrentModification(_))
    }
}

/// Result of replaying an account's audit trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub account_id: String,
    pub balance: i64,
    pub audited_balance: i64,
    pub entries: usize,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.audited_balance
    }
}

/// Per-account balance store with an append-only audit log
pub struct BalanceStore {
    /// Account index; the map lock is only held long enough to clone an `Arc`
    accounts: RwLock<BTreeMap<String, Arc<Mutex<Account>>>>,
    audit: Mutex<AuditLog>,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
}

impl BalanceStore {
    /// Create an empty store
    pub fn new(clock: Arc<dyn Clock>, lock_timeout: Duration) -> Self {
        Self::from_parts(Vec::new(), AuditLog::new(), clock, lock_timeout)
    }

    /// Rebuild a store from persisted accounts and audit entries
    pub fn from_parts(
        accounts: Vec<Account>,
        audit: AuditLog,
        clock: Arc<dyn Clock>,
        lock_timeout: Duration,
    ) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|account| (account.id().to_string(), Arc::new(Mutex::new(account))))
            .collect();
        Self {
            accounts: RwLock::new(accounts),
            audit: Mutex::new(audit),
            clock,
            lock_timeout,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Register a new account
    ///
    /// A positive opening balance is written to the audit log so the trail
    /// always reconciles to the balance.
    pub fn open_account(
        &self,
        account_id: &str,
        opening_balance: i64,
        tier: SubscriptionTier,
    ) -> Result<Account, StoreError> {
        if opening_balance < 0 {
            return Err(AccountError::InvalidAmount {
                amount: opening_balance,
            }
            .into());
        }
        let mut accounts = self.accounts.write();
        if accounts.contains_key(account_id) {
            return Err(StoreError::DuplicateAccount(account_id.to_string()));
        }
        let account = Account::new(
            account_id.to_string(),
            opening_balance,
            tier,
            self.clock.today(),
        );
        if opening_balance > 0 {
            self.audit.lock().record(
                account_id,
                opening_balance,
                opening_balance,
                AuditReason::Opening,
                self.clock.now(),
            );
        }
        accounts.insert(account_id.to_string(), Arc::new(Mutex::new(account.clone())));
        debug!(account_id, opening_balance, tier = ?tier, "account opened");
        Ok(account)
    }

    /// Check if an account exists
    pub fn contains(&self, account_id: &str) -> bool {
        self.accounts.read().contains_key(account_id)
    }

    /// Number of accounts
    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }

    /// Account ids in ascending order, strictly after `cursor`, at most `limit`
    ///
    /// The second value is true when more ids remain past the returned page.
    pub fn account_ids_after(&self, cursor: Option<&str>, limit: usize) -> (Vec<String>, bool) {
        let accounts = self.accounts.read();
        let mut ids = accounts
            .keys()
            .filter(|id| cursor.map_or(true, |c| id.as_str() > c))
            .cloned();
        let page: Vec<String> = ids.by_ref().take(limit).collect();
        let more = ids.next().is_some();
        (page, more)
    }

    /// Copy of an account record
    pub fn account(&self, account_id: &str) -> Result<Account, StoreError> {
        Ok(self.lock(account_id)?.clone())
    }

    pub fn get_balance(&self, account_id: &str) -> Result<i64, StoreError> {
        Ok(self.lock(account_id)?.balance())
    }

    /// Credit an account and return the new balance
    pub fn credit(
        &self,
        account_id: &str,
        amount: i64,
        reason: AuditReason,
    ) -> Result<i64, StoreError> {
        let mut account = self.lock(account_id)?;
        self.credit_locked(&mut account, amount, reason)
    }

    /// Debit an account and return the new balance
    ///
    /// Fails with `InsufficientFunds` if `amount` exceeds the balance.
    pub fn debit(
        &self,
        account_id: &str,
        amount: i64,
        reason: AuditReason,
    ) -> Result<i64, StoreError> {
        let mut account = self.lock(account_id)?;
        self.debit_locked(&mut account, amount, reason)
    }

    /// Credit an account the caller already holds the lock for
    pub fn credit_locked(
        &self,
        account: &mut Account,
        amount: i64,
        reason: AuditReason,
    ) -> Result<i64, StoreError> {
        let balance_after = account.credit(amount)?;
        self.append_audit(account.id(), amount, balance_after, reason);
        Ok(balance_after)
    }

    /// Debit an account the caller already holds the lock for
    pub fn debit_locked(
        &self,
        account: &mut Account,
        amount: i64,
        reason: AuditReason,
    ) -> Result<i64, StoreError> {
        let balance_after = account.debit(amount)?;
        self.append_audit(account.id(), -amount, balance_after, reason);
        Ok(balance_after)
    }

    fn append_audit(&self, account_id: &str, delta: i64, balance_after: i64, reason: AuditReason) {
        debug!(
            account_id,
            delta,
            balance_after,
            reason = reason.reason_type(),
            "balance updated"
        );
        self.audit
            .lock()
            .record(account_id, delta, balance_after, reason, self.clock.now());
    }

    /// Record a login for streak and inactivity tracking
    pub fn record_activity(&self, account_id: &str, date: NaiveDate) -> Result<Account, StoreError> {
        let mut account = self.lock(account_id)?;
        account.record_activity(date);
        Ok(account.clone())
    }

    pub fn set_subscription_tier(
        &self,
        account_id: &str,
        tier: SubscriptionTier,
    ) -> Result<(), StoreError> {
        self.lock(account_id)?.set_subscription_tier(tier);
        Ok(())
    }

    /// Add experience points and return the new total
    pub fn award_experience(&self, account_id: &str, points: u64) -> Result<u64, StoreError> {
        Ok(self.lock(account_id)?.award_experience(points))
    }

    /// Acquire one account's lock, waiting at most the configured timeout
    pub fn lock(&self, account_id: &str) -> Result<AccountLock, StoreError> {
        let handle = self
            .accounts
            .read()
            .get(account_id)
            .cloned()
            .ok_or_else(|| StoreError::AccountNotFound(account_id.to_string()))?;
        handle
            .try_lock_arc_for(self.lock_timeout)
            .ok_or_else(|| StoreError::ConcurrentModification(account_id.to_string()))
    }

    /// Acquire two account locks in ascending id order
    ///
    /// Guards are returned in argument order regardless of acquisition order.
    pub fn lock_pair(
        &self,
        first_id: &str,
        second_id: &str,
    ) -> Result<(AccountLock, AccountLock), StoreError> {
        if first_id == second_id {
            return Err(StoreError::SameAccount(first_id.to_string()));
        }
        if first_id < second_id {
            let first = self.lock(first_id)?;
            let second = self.lock(second_id)?;
            Ok((first, second))
        } else {
            let second = self.lock(second_id)?;
            let first = self.lock(first_id)?;
            Ok((first, second))
        }
    }

    /// Copies of every account, in id order
    pub fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let ids: Vec<String> = self.accounts.read().keys().cloned().collect();
        ids.iter().map(|id| self.account(id)).collect()
    }

    /// Sum of all balances
    ///
    /// Fails with `SupplyOverflow` when the sum does not fit in an `i64`,
    /// even though each balance on its own does.
    pub fn total_supply(&self) -> Result<i64, StoreError> {
        self.accounts()?
            .iter()
            .try_fold(0i64, |total, account| total.checked_add(account.balance()))
            .ok_or(StoreError::SupplyOverflow)
    }

    /// Audit entries for one account, in order
    pub fn audit_trail(&self, account_id: &str) -> Vec<AuditEntry> {
        self.audit
            .lock()
            .entries_for_account(account_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Copy of the whole audit log
    pub fn audit_log(&self) -> AuditLog {
        self.audit.lock().clone()
    }

    /// Replay an account's audit trail against its balance
    pub fn reconcile(&self, account_id: &str) -> Result<Reconciliation, StoreError> {
        let account = self.lock(account_id)?;
        let audit = self.audit.lock();
        Ok(Reconciliation {
            account_id: account_id.to_string(),
            balance: account.balance(),
            audited_balance: audit.net_delta(account_id),
            entries: audit.entries_for_account(account_id).len(),
        })
    }
}

impl std::fmt::Debug for BalanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceStore")
            .field("accounts", &self.len())
            .field("audit_entries", &self.audit.lock().len())
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}
