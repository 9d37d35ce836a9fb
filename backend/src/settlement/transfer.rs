//! P2P Transfer Engine
//!
//! Direct BTZ transfers between two users.
//!
//! Validation order:
//! 1. `amount > 0`
//! 2. sender and receiver differ
//! 3. receiver exists
//! 4. sender balance covers the amount
//!
//! The debit, the credit and the journal entry happen while both account
//! locks are held, after every check has passed, so either all three are
//! applied or none is. Transfers are final; reversals are an administrative
//! matter outside this engine.

use crate::models::account::AccountError;
use crate::models::event::AuditReason;
use crate::models::transfer::Transfer;
use crate::store::{BalanceStore, Retryable, StoreError};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Errors that can occur during a transfer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Transfer amount must be positive, got {amount}")]
    InvalidAmount { amount: i64 },

    #[error("Cannot transfer to the same account: {0}")]
    SelfTransfer(String),

    #[error("Receiver not found: {0}")]
    ReceiverNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Insufficient funds in account {account_id}: required {required}, available {available}")]
    InsufficientFunds {
        account_id: String,
        required: i64,
        available: i64,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => TransferError::AccountNotFound(id),
            StoreError::Account(AccountError::InsufficientFunds {
                account_id,
                required,
                available,
            }) => TransferError::InsufficientFunds {
                account_id,
                required,
                available,
            },
            other => TransferError::Store(other),
        }
    }
}

impl Retryable for TransferError {
    fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Store(e) if e.is_retryable())
    }
}

/// Append-only history of completed transfers
#[derive(Debug, Default)]
pub struct TransferJournal {
    transfers: Mutex<Vec<Transfer>>,
}

impl TransferJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transfers(transfers: Vec<Transfer>) -> Self {
        Self {
            transfers: Mutex::new(transfers),
        }
    }

    fn append(&self, transfer: Transfer) {
        self.transfers.lock().push(transfer);
    }

    /// All transfers, oldest first
    pub fn transfers(&self) -> Vec<Transfer> {
        self.transfers.lock().clone()
    }

    /// Transfers sent or received by an account, oldest first
    pub fn transfers_for(&self, account_id: &str) -> Vec<Transfer> {
        self.transfers
            .lock()
            .iter()
            .filter(|t| t.involves(account_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transfers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.lock().is_empty()
    }
}

/// Move `amount` from `sender_id` to `receiver_id`
///
/// # Example
///
/// ```rust
/// use btz_ledger_core::core::time::SystemClock;
/// use btz_ledger_core::settlement::{execute_transfer, TransferJournal};
/// use btz_ledger_core::store::BalanceStore;
/// use btz_ledger_core::SubscriptionTier;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let store = BalanceStore::new(Arc::new(SystemClock), Duration::from_millis(50));
/// let journal = TransferJournal::new();
/// store.open_account("alice", 100, SubscriptionTier::Free).unwrap();
/// store.open_account("bob", 0, SubscriptionTier::Free).unwrap();
///
/// let transfer = execute_transfer(&store, &journal, "alice", "bob", 40).unwrap();
/// assert_eq!(transfer.sender_balance_after(), 60);
/// assert_eq!(transfer.receiver_balance_after(), 40);
/// ```
pub fn execute_transfer(
    store: &BalanceStore,
    journal: &TransferJournal,
    sender_id: &str,
    receiver_id: &str,
    amount: i64,
) -> Result<Transfer, TransferError> {
    if amount <= 0 {
        return Err(TransferError::InvalidAmount { amount });
    }
    if sender_id == receiver_id {
        return Err(TransferError::SelfTransfer(sender_id.to_string()));
    }
    if !store.contains(receiver_id) {
        return Err(TransferError::ReceiverNotFound(receiver_id.to_string()));
    }

    let (mut sender, mut receiver) = store.lock_pair(sender_id, receiver_id)?;

    if !sender.can_pay(amount) {
        return Err(TransferError::InsufficientFunds {
            account_id: sender_id.to_string(),
            required: amount,
            available: sender.balance(),
        });
    }
    if receiver.balance().checked_add(amount).is_none() {
        return Err(StoreError::Account(AccountError::BalanceOverflow {
            account_id: receiver_id.to_string(),
        })
        .into());
    }

    let transfer_id = Uuid::new_v4().to_string();
    let sender_balance_after = store.debit_locked(
        &mut sender,
        amount,
        AuditReason::TransferOut {
            transfer_id: transfer_id.clone(),
        },
    )?;
    let receiver_balance_after = store.credit_locked(
        &mut receiver,
        amount,
        AuditReason::TransferIn {
            transfer_id: transfer_id.clone(),
        },
    )?;

    let transfer = Transfer::new(
        transfer_id,
        sender_id.to_string(),
        receiver_id.to_string(),
        amount,
        store.clock().now(),
        sender_balance_after,
        receiver_balance_after,
    );
    journal.append(transfer.clone());
    info!(
        transfer_id = transfer.id(),
        sender_id,
        receiver_id,
        amount,
        "transfer completed"
    );
    Ok(transfer)
}
