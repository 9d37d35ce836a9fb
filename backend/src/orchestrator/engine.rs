//! Ledger - the facade every caller goes through
//!
//! Wires the Balance Store, the accrual engines, the duel and transfer
//! engines and the payment bridge together behind one configuration.
//!
//! # Operation flow
//!
//! ```text
//! caller ─▶ gate (shared) ─▶ retry(ConcurrentModification) ─▶ engine ─▶ BalanceStore
//! ```
//!
//! The gate is a ledger-wide `RwLock`: every operation holds it shared, and
//! taking a checkpoint holds it exclusively, so a snapshot always captures a
//! state between operations.

use crate::accrual::{
    apply_daily_yield, apply_inactivity_penalty, is_penalty_eligible, run_sweep, AccrualError,
    AccrualKind, PenaltyRates, PenaltyResult, SweepReport, YieldRates, YieldResult,
};
use crate::core::time::{Clock, SystemClock};
use crate::models::account::{Account, SubscriptionTier};
use crate::models::duel::{AnswerReceipt, Duel, DuelSettlement, Question};
use crate::models::event::{AuditEntry, AuditLog};
use crate::models::transfer::Transfer;
use crate::orchestrator::checkpoint::{
    compute_config_hash, validate_snapshot, LedgerSnapshot, SNAPSHOT_FORMAT_VERSION,
};
use crate::payments::{PaymentBridge, PaymentCredit, PaymentError};
use crate::settlement::{self, DuelBook, TransferError, TransferJournal, WagerError};
use crate::store::{
    AccountHold, BalanceStore, Reconciliation, RetryPolicy, Retryable, StoreError,
};
use chrono::NaiveDate;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

// ============================================================================
// Configuration
// ============================================================================

/// Complete ledger configuration
///
/// Every field has a default, so `{}` is a valid configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub yield_rates: YieldRates,
    pub penalty_rates: PenaltyRates,
    pub retry: RetryPolicy,
    /// Longest wait for any single account, duel or receipt lock
    pub lock_timeout_ms: u64,
    /// Accounts per sweep batch
    pub sweep_batch_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            yield_rates: YieldRates::default(),
            penalty_rates: PenaltyRates::default(),
            retry: RetryPolicy::default(),
            lock_timeout_ms: 250,
            sweep_batch_size: 500,
        }
    }
}

impl LedgerConfig {
    /// Parse a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LedgerError::SerializationError(format!("Config parse failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for inconsistent values
    pub fn validate(&self) -> Result<(), LedgerError> {
        self.yield_rates.validate().map_err(LedgerError::InvalidConfig)?;
        self.penalty_rates
            .validate()
            .map_err(LedgerError::InvalidConfig)?;
        if self.retry.max_attempts == 0 {
            return Err(LedgerError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(LedgerError::InvalidConfig(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(LedgerError::InvalidConfig(
                "lock_timeout_ms must be positive".to_string(),
            ));
        }
        if self.sweep_batch_size == 0 {
            return Err(LedgerError::InvalidConfig(
                "sweep_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by the ledger facade
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Config mismatch: checkpoint was taken with config {found}, ledger uses {expected}")]
    ConfigMismatch { expected: String, found: String },

    #[error("Ledger busy, operation not admitted in time")]
    ConcurrentModification,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Accrual(#[from] AccrualError),

    #[error(transparent)]
    Wager(#[from] WagerError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("State validation error: {0}")]
    StateValidationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Retryable for LedgerError {
    fn is_retryable(&self) -> bool {
        match self {
            LedgerError::ConcurrentModification => true,
            LedgerError::Store(e) => e.is_retryable(),
            LedgerError::Accrual(e) => e.is_retryable(),
            LedgerError::Wager(e) => e.is_retryable(),
            LedgerError::Transfer(e) => e.is_retryable(),
            LedgerError::Payment(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl LedgerError {
    /// True for transient failures worth retrying later
    pub fn is_retryable(&self) -> bool {
        Retryable::is_retryable(self)
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// The BTZ ledger
///
/// # Example
/// ```
/// use btz_ledger_core::{Ledger, LedgerConfig, SubscriptionTier};
///
/// let ledger = Ledger::new(LedgerConfig::default()).unwrap();
/// ledger.open_account("alice", 100, SubscriptionTier::Free).unwrap();
/// ledger.open_account("bob", 0, SubscriptionTier::Free).unwrap();
///
/// ledger.transfer("alice", "bob", 30).unwrap();
/// assert_eq!(ledger.balance("alice").unwrap(), 70);
/// assert_eq!(ledger.balance("bob").unwrap(), 30);
/// ```
pub struct Ledger {
    config: LedgerConfig,
    config_hash: String,
    store: BalanceStore,
    duels: DuelBook,
    transfers: TransferJournal,
    payments: PaymentBridge,
    gate: RwLock<()>,
}

impl Ledger {
    /// Create an empty ledger on the system clock
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an empty ledger on a given clock
    pub fn with_clock(config: LedgerConfig, clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        config.validate()?;
        let config_hash = compute_config_hash(&config)?;
        let timeout = config.lock_timeout();
        Ok(Self {
            store: BalanceStore::new(clock, timeout),
            duels: DuelBook::new(timeout),
            transfers: TransferJournal::new(),
            payments: PaymentBridge::new(timeout),
            gate: RwLock::new(()),
            config_hash,
            config,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    /// Hold one account's lock until the returned guard drops
    ///
    /// Every operation touching the account waits (and eventually times out)
    /// while the hold is alive. The hold gives read access only.
    pub fn hold_account(&self, account_id: &str) -> Result<AccountHold, LedgerError> {
        Ok(AccountHold::new(self.store.lock(account_id)?))
    }

    pub fn today(&self) -> NaiveDate {
        self.store.clock().today()
    }

    fn enter(&self) -> Result<RwLockReadGuard<'_, ()>, LedgerError> {
        self.gate
            .try_read_for(self.config.lock_timeout())
            .ok_or(LedgerError::ConcurrentModification)
    }

    /// Run `op` inside the gate with bounded retries on transient errors
    fn run<T, E, F>(&self, operation: &str, op: F) -> Result<T, LedgerError>
    where
        E: Retryable + std::fmt::Display,
        LedgerError: From<E>,
        F: FnMut() -> Result<T, E>,
    {
        let _gate = self.enter()?;
        Ok(self.config.retry.run(operation, op)?)
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    pub fn open_account(
        &self,
        account_id: &str,
        opening_balance: i64,
        tier: SubscriptionTier,
    ) -> Result<Account, LedgerError> {
        self.run("open_account", || {
            self.store.open_account(account_id, opening_balance, tier)
        })
    }

    pub fn account(&self, account_id: &str) -> Result<Account, LedgerError> {
        self.run("account", || self.store.account(account_id))
    }

    pub fn balance(&self, account_id: &str) -> Result<i64, LedgerError> {
        self.run("balance", || self.store.get_balance(account_id))
    }

    /// Record a login on `date` (streak and inactivity bookkeeping)
    pub fn record_activity(&self, account_id: &str, date: NaiveDate) -> Result<Account, LedgerError> {
        self.run("record_activity", || self.store.record_activity(account_id, date))
    }

    /// Record a login today
    pub fn record_login(&self, account_id: &str) -> Result<Account, LedgerError> {
        self.record_activity(account_id, self.today())
    }

    pub fn set_subscription_tier(
        &self,
        account_id: &str,
        tier: SubscriptionTier,
    ) -> Result<(), LedgerError> {
        self.run("set_subscription_tier", || {
            self.store.set_subscription_tier(account_id, tier)
        })
    }

    pub fn award_experience(&self, account_id: &str, points: u64) -> Result<u64, LedgerError> {
        self.run("award_experience", || self.store.award_experience(account_id, points))
    }

    pub fn audit_trail(&self, account_id: &str) -> Result<Vec<AuditEntry>, LedgerError> {
        let _gate = self.enter()?;
        if !self.store.contains(account_id) {
            return Err(StoreError::AccountNotFound(account_id.to_string()).into());
        }
        Ok(self.store.audit_trail(account_id))
    }

    /// Copy of the whole audit log
    pub fn audit_log(&self) -> Result<AuditLog, LedgerError> {
        let _gate = self.enter()?;
        Ok(self.store.audit_log())
    }

    pub fn reconcile(&self, account_id: &str) -> Result<Reconciliation, LedgerError> {
        self.run("reconcile", || self.store.reconcile(account_id))
    }

    pub fn total_supply(&self) -> Result<i64, LedgerError> {
        self.run("total_supply", || self.store.total_supply())
    }

    // ------------------------------------------------------------------------
    // Yield & penalty
    // ------------------------------------------------------------------------

    /// Apply today's yield to one account
    pub fn apply_daily_yield(&self, account_id: &str) -> Result<YieldResult, LedgerError> {
        self.run("apply_daily_yield", || {
            apply_daily_yield(&self.store, account_id, &self.config.yield_rates)
        })
    }

    /// Apply today's inactivity penalty to one account
    pub fn apply_inactivity_penalty(&self, account_id: &str) -> Result<PenaltyResult, LedgerError> {
        self.run("apply_inactivity_penalty", || {
            apply_inactivity_penalty(&self.store, account_id, &self.config.penalty_rates)
        })
    }

    /// Run one yield sweep batch starting after `cursor`
    pub fn run_yield_sweep(&self, cursor: Option<&str>) -> Result<SweepReport, LedgerError> {
        let _gate = self.enter()?;
        let rates: &YieldRates = &self.config.yield_rates;
        Ok(run_sweep(
            &self.store,
            AccrualKind::Yield,
            cursor,
            self.config.sweep_batch_size,
            &self.config.retry,
            |account_id| {
                apply_daily_yield(&self.store, account_id, rates).map(|r| Some(r.applied_amount))
            },
        ))
    }

    /// Run one penalty sweep batch starting after `cursor`
    ///
    /// Accounts still inside the grace period are counted as ineligible and
    /// left untouched.
    pub fn run_penalty_sweep(&self, cursor: Option<&str>) -> Result<SweepReport, LedgerError> {
        let _gate = self.enter()?;
        let rates: &PenaltyRates = &self.config.penalty_rates;
        let today = self.today();
        Ok(run_sweep(
            &self.store,
            AccrualKind::Penalty,
            cursor,
            self.config.sweep_batch_size,
            &self.config.retry,
            |account_id| {
                let account = self.store.account(account_id)?;
                if !is_penalty_eligible(&account, rates, today) {
                    return Ok(None);
                }
                apply_inactivity_penalty(&self.store, account_id, rates)
                    .map(|r| Some(r.penalty_amount))
            },
        ))
    }

    /// Run sweep batches until every account was visited
    pub fn run_full_sweep(&self, kind: AccrualKind) -> Result<Vec<SweepReport>, LedgerError> {
        let mut reports = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let report = match kind {
                AccrualKind::Yield => self.run_yield_sweep(cursor.as_deref())?,
                AccrualKind::Penalty => self.run_penalty_sweep(cursor.as_deref())?,
            };
            cursor = report.next_cursor.clone();
            reports.push(report);
            if cursor.is_none() {
                return Ok(reports);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Duels
    // ------------------------------------------------------------------------

    /// Escrow both bets and start a duel
    pub fn create_duel(
        &self,
        player1_id: &str,
        player2_id: &str,
        bet_amount: i64,
        questions: Vec<Question>,
    ) -> Result<Duel, LedgerError> {
        self.run("create_duel", || {
            settlement::create_duel(
                &self.store,
                &self.duels,
                player1_id,
                player2_id,
                bet_amount,
                questions.clone(),
            )
        })
    }

    pub fn record_answer(
        &self,
        duel_id: &str,
        player_id: &str,
        question_index: usize,
        answer: usize,
    ) -> Result<AnswerReceipt, LedgerError> {
        self.run("record_answer", || {
            settlement::record_answer(
                &self.store,
                &self.duels,
                duel_id,
                player_id,
                question_index,
                answer,
            )
        })
    }

    /// Settle a duel on its current scores (idempotent)
    pub fn complete_duel(&self, duel_id: &str) -> Result<DuelSettlement, LedgerError> {
        self.run("complete_duel", || {
            settlement::complete_duel(&self.store, &self.duels, duel_id)
        })
    }

    pub fn abandon_duel(
        &self,
        duel_id: &str,
        abandoning_player: &str,
    ) -> Result<DuelSettlement, LedgerError> {
        self.run("abandon_duel", || {
            settlement::abandon_duel(&self.store, &self.duels, duel_id, abandoning_player)
        })
    }

    pub fn duel(&self, duel_id: &str) -> Result<Duel, LedgerError> {
        self.run("duel", || self.duels.get(duel_id))
    }

    pub fn active_duels_for(&self, account_id: &str) -> Result<Vec<Duel>, LedgerError> {
        self.run("active_duels_for", || self.duels.active_for(account_id))
    }

    // ------------------------------------------------------------------------
    // Transfers & payments
    // ------------------------------------------------------------------------

    pub fn transfer(
        &self,
        sender_id: &str,
        receiver_id: &str,
        amount: i64,
    ) -> Result<Transfer, LedgerError> {
        self.run("transfer", || {
            settlement::execute_transfer(&self.store, &self.transfers, sender_id, receiver_id, amount)
        })
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.transfers.transfers()
    }

    pub fn transfers_for(&self, account_id: &str) -> Vec<Transfer> {
        self.transfers.transfers_for(account_id)
    }

    /// Credit a confirmed external payment (idempotent on the payment id)
    pub fn credit_from_payment(
        &self,
        account_id: &str,
        amount: i64,
        external_payment_id: &str,
    ) -> Result<PaymentCredit, LedgerError> {
        self.run("credit_from_payment", || {
            self.payments
                .credit_from_payment(&self.store, account_id, amount, external_payment_id)
        })
    }

    // ------------------------------------------------------------------------
    // Checkpoints
    // ------------------------------------------------------------------------

    /// Capture the complete ledger state
    ///
    /// Waits for in-flight operations to finish and blocks new ones while the
    /// copy is taken.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        let _exclusive = self
            .gate
            .try_write_for(self.config.lock_timeout())
            .ok_or(LedgerError::ConcurrentModification)?;

        Ok(LedgerSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            taken_at: self.store.clock().now(),
            config_hash: self.config_hash.clone(),
            accounts: self.store.accounts()?,
            duels: self.duels.duels()?,
            transfers: self.transfers.transfers(),
            payments: self.payments.receipts(),
            audit: self.store.audit_log().entries().to_vec(),
        })
    }

    /// Rebuild a ledger from a snapshot taken with the same configuration
    pub fn restore(
        config: LedgerConfig,
        clock: Arc<dyn Clock>,
        snapshot: LedgerSnapshot,
    ) -> Result<Self, LedgerError> {
        config.validate()?;
        let config_hash = compute_config_hash(&config)?;
        if snapshot.config_hash != config_hash {
            return Err(LedgerError::ConfigMismatch {
                expected: config_hash,
                found: snapshot.config_hash,
            });
        }
        validate_snapshot(&snapshot)?;

        let timeout = config.lock_timeout();
        let LedgerSnapshot {
            accounts,
            duels,
            transfers,
            payments,
            audit,
            ..
        } = snapshot;

        let ledger = Self {
            store: BalanceStore::from_parts(
                accounts,
                AuditLog::from_entries(audit),
                clock,
                timeout,
            ),
            duels: DuelBook::from_duels(duels, timeout),
            transfers: TransferJournal::from_transfers(transfers),
            payments: PaymentBridge::from_receipts(payments, timeout),
            gate: RwLock::new(()),
            config_hash,
            config,
        };
        info!(
            accounts = ledger.store.len(),
            duels = ledger.duels.len(),
            transfers = ledger.transfers.len(),
            "ledger restored from checkpoint"
        );
        Ok(ledger)
    }

    /// Write a checkpoint file
    pub fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<(), LedgerError> {
        let snapshot = self.snapshot()?;
        snapshot.write_to(path.as_ref())?;
        info!(
            path = %path.as_ref().display(),
            accounts = snapshot.accounts.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Rebuild a ledger from a checkpoint file
    pub fn load_checkpoint(
        config: LedgerConfig,
        clock: Arc<dyn Clock>,
        path: impl AsRef<Path>,
    ) -> Result<Self, LedgerError> {
        let snapshot = LedgerSnapshot::read_from(path.as_ref())?;
        Self::restore(config, clock, snapshot)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config_hash", &self.config_hash)
            .field("store", &self.store)
            .field("duels", &self.duels.len())
            .field("transfers", &self.transfers.len())
            .finish()
    }
}
