//! Wager Escrow & Settlement Engine
//!
//! Moves money for duels:
//!
//! ```text
//! create   : debit bet from player 1 ─┐
//!            debit bet from player 2 ─┴─▶ escrow (2 × bet), duel Active
//! complete : escrow ─▶ winner (2 × bet)  or  ─▶ each player (bet) on a tie
//! abandon  : escrow ─▶ remaining player (2 × bet)
//! ```
//!
//! # Critical Invariants
//!
//! - **No one-sided escrow**: if the second debit fails, the first is
//!   compensated before the error is returned
//! - **Conservation**: a settlement pays out exactly the escrowed pot
//! - **Exactly once**: the duel lock is held from the state check until the
//!   terminal state is written, together with both account locks, so the
//!   payout and the status change are one atomic step. Completing an already
//!   completed duel returns the stored settlement without moving money.
//!
//! # Lock order
//!
//! Duel lock first, then both account locks (ascending id) through
//! [`BalanceStore::lock_pair`].

use crate::models::account::AccountError;
use crate::models::duel::{
    AnswerReceipt, Duel, DuelError, DuelSettlement, DuelStatus, PayoutKind, Question,
    MAX_BET_AMOUNT,
};
use crate::models::event::AuditReason;
use crate::store::{AccountLock, BalanceStore, Retryable, StoreError};
use parking_lot::{Mutex, RawMutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Exclusive handle on one duel, released on drop
pub type DuelLock = parking_lot::lock_api::ArcMutexGuard<RawMutex, Duel>;

/// Errors that can occur during duel escrow and settlement
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WagerError {
    #[error("Duel not found: {0}")]
    DuelNotFound(String),

    #[error("Bet amount must be positive and no more than half of i64::MAX, got {amount}")]
    InvalidAmount { amount: i64 },

    #[error("A duel needs two different players, got {0} twice")]
    SamePlayer(String),

    #[error("A duel needs at least one question")]
    EmptyQuestionSet,

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Insufficient funds in account {account_id}: required {required}, available {available}")]
    InsufficientFunds {
        account_id: String,
        required: i64,
        available: i64,
    },

    #[error("Concurrent modification of duel {0}, lock not acquired in time")]
    ConcurrentModification(String),

    #[error(transparent)]
    Duel(#[from] DuelError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for WagerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => WagerError::AccountNotFound(id),
            StoreError::Account(AccountError::InsufficientFunds {
                account_id,
                required,
                available,
            }) => WagerError::InsufficientFunds {
                account_id,
                required,
                available,
            },
            other => WagerError::Store(other),
        }
    }
}

impl Retryable for WagerError {
    fn is_retryable(&self) -> bool {
        match self {
            WagerError::ConcurrentModification(_) => true,
            WagerError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Index of every duel, each behind its own mutex
pub struct DuelBook {
    duels: RwLock<HashMap<String, Arc<Mutex<Duel>>>>,
    lock_timeout: Duration,
}

impl DuelBook {
    pub fn new(lock_timeout: Duration) -> Self {
        Self::from_duels(Vec::new(), lock_timeout)
    }

    /// Rebuild the book from persisted duels
    pub fn from_duels(duels: Vec<Duel>, lock_timeout: Duration) -> Self {
        let duels = duels
            .into_iter()
            .map(|duel| (duel.id().to_string(), Arc::new(Mutex::new(duel))))
            .collect();
        Self {
            duels: RwLock::new(duels),
            lock_timeout,
        }
    }

    fn insert(&self, duel: Duel) {
        self.duels
            .write()
            .insert(duel.id().to_string(), Arc::new(Mutex::new(duel)));
    }

    /// Acquire a duel's lock, waiting at most the configured timeout
    pub fn lock(&self, duel_id: &str) -> Result<DuelLock, WagerError> {
        let handle = self
            .duels
            .read()
            .get(duel_id)
            .cloned()
            .ok_or_else(|| WagerError::DuelNotFound(duel_id.to_string()))?;
        handle
            .try_lock_arc_for(self.lock_timeout)
            .ok_or_else(|| WagerError::ConcurrentModification(duel_id.to_string()))
    }

    /// Copy of a duel record
    pub fn get(&self, duel_id: &str) -> Result<Duel, WagerError> {
        Ok(self.lock(duel_id)?.clone())
    }

    /// Copies of every duel, oldest first
    pub fn duels(&self) -> Result<Vec<Duel>, WagerError> {
        let ids: Vec<String> = self.duels.read().keys().cloned().collect();
        let mut duels = ids
            .iter()
            .map(|id| self.get(id))
            .collect::<Result<Vec<_>, _>>()?;
        duels.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then(a.id().cmp(b.id())));
        Ok(duels)
    }

    /// Active duels an account takes part in
    pub fn active_for(&self, account_id: &str) -> Result<Vec<Duel>, WagerError> {
        Ok(self
            .duels()?
            .into_iter()
            .filter(|d| d.is_active() && d.is_participant(account_id))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.duels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.duels.read().is_empty()
    }
}

/// Escrow both bets and open a duel
///
/// Fails with `InsufficientFunds` if either player cannot cover the bet; in
/// that case no money has moved once the function returns. Bets above
/// [`MAX_BET_AMOUNT`] are rejected before any lock is taken.
pub fn create_duel(
    store: &BalanceStore,
    book: &DuelBook,
    player1_id: &str,
    player2_id: &str,
    bet_amount: i64,
    questions: Vec<Question>,
) -> Result<Duel, WagerError> {
    if bet_amount <= 0 || bet_amount > MAX_BET_AMOUNT {
        return Err(WagerError::InvalidAmount { amount: bet_amount });
    }
    if player1_id == player2_id {
        return Err(WagerError::SamePlayer(player1_id.to_string()));
    }
    if questions.is_empty() {
        return Err(WagerError::EmptyQuestionSet);
    }

    let duel_id = Uuid::new_v4().to_string();
    let (mut player1, mut player2) = store.lock_pair(player1_id, player2_id)?;

    let escrow = || AuditReason::DuelEscrow {
        duel_id: duel_id.clone(),
    };
    store.debit_locked(&mut player1, bet_amount, escrow())?;
    if let Err(e) = store.debit_locked(&mut player2, bet_amount, escrow()) {
        let rollback = AuditReason::DuelEscrowRollback {
            duel_id: duel_id.clone(),
        };
        if let Err(rollback_err) = store.credit_locked(&mut player1, bet_amount, rollback) {
            error!(
                duel_id = %duel_id,
                account_id = player1_id,
                error = %rollback_err,
                "escrow rollback failed"
            );
            return Err(rollback_err.into());
        }
        warn!(duel_id = %duel_id, error = %e, "duel not created, escrow rolled back");
        return Err(e.into());
    }

    let duel = Duel::new(
        duel_id,
        player1_id.to_string(),
        player2_id.to_string(),
        bet_amount,
        questions,
        store.clock().now(),
    );
    book.insert(duel.clone());
    info!(
        duel_id = duel.id(),
        player1_id,
        player2_id,
        bet_amount,
        "duel created"
    );
    Ok(duel)
}

/// Record one answer; settles the duel when it was the last answer owed
///
/// If the final settlement cannot run right now (e.g. an account lock timed
/// out) the answer is still kept and the duel stays active, to be finished
/// with [`complete_duel`].
pub fn record_answer(
    store: &BalanceStore,
    book: &DuelBook,
    duel_id: &str,
    player_id: &str,
    question_index: usize,
    answer: usize,
) -> Result<AnswerReceipt, WagerError> {
    let mut duel = book.lock(duel_id)?;
    let mut receipt = duel.submit_answer(player_id, question_index, answer)?;

    if receipt.all_answered {
        match duel
            .plan_completion(store.clock().now())
            .map_err(WagerError::from)
            .and_then(|settlement| settle_locked(store, &mut duel, settlement))
        {
            Ok(settlement) => receipt.settlement = Some(settlement),
            Err(e) => warn!(duel_id, error = %e, "automatic settlement deferred"),
        }
    }
    Ok(receipt)
}

/// Settle a duel on its current scores
///
/// Calling this on a duel that is already completed returns the original
/// settlement and moves no money.
pub fn complete_duel(
    store: &BalanceStore,
    book: &DuelBook,
    duel_id: &str,
) -> Result<DuelSettlement, WagerError> {
    let mut duel = book.lock(duel_id)?;
    if duel.status() == DuelStatus::Completed {
        if let Some(settlement) = duel.settlement() {
            return Ok(settlement.clone());
        }
    }
    let settlement = duel.plan_completion(store.clock().now())?;
    settle_locked(store, &mut duel, settlement)
}

/// End a duel because `abandoning_player` left
///
/// The remaining player receives the whole pot.
pub fn abandon_duel(
    store: &BalanceStore,
    book: &DuelBook,
    duel_id: &str,
    abandoning_player: &str,
) -> Result<DuelSettlement, WagerError> {
    let mut duel = book.lock(duel_id)?;
    let settlement = duel.plan_forfeit(abandoning_player, store.clock().now())?;
    settle_locked(store, &mut duel, settlement)
}

/// Pay out a planned settlement and move the duel to its terminal state
///
/// Every credit is checked for overflow before the first one is applied, so
/// once money starts moving the whole settlement goes through.
fn settle_locked(
    store: &BalanceStore,
    duel: &mut DuelLock,
    settlement: DuelSettlement,
) -> Result<DuelSettlement, WagerError> {
    let (mut player1, mut player2) = store.lock_pair(duel.player1_id(), duel.player2_id())?;

    for account in [&player1, &player2] {
        if account
            .balance()
            .checked_add(settlement.paid_to(account.id()))
            .is_none()
        {
            return Err(StoreError::Account(AccountError::BalanceOverflow {
                account_id: account.id().to_string(),
            })
            .into());
        }
    }

    for payout in &settlement.payouts {
        let reason = match payout.kind {
            PayoutKind::Winnings => AuditReason::DuelPayout {
                duel_id: settlement.duel_id.clone(),
            },
            PayoutKind::Refund => AuditReason::DuelRefund {
                duel_id: settlement.duel_id.clone(),
            },
        };
        let account: &mut AccountLock = if payout.account_id == player1.id() {
            &mut player1
        } else {
            &mut player2
        };
        store.credit_locked(account, payout.amount, reason)?;
    }

    duel.finalize(settlement.clone())?;
    info!(
        duel_id = %settlement.duel_id,
        outcome = ?settlement.outcome,
        player1_score = settlement.player1_score,
        player2_score = settlement.player2_score,
        pot = settlement.pot,
        "duel settled"
    );
    Ok(settlement)
}
