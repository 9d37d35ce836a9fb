//! External Payment Bridge
//!
//! The payment provider confirms a purchase by calling
//! [`PaymentBridge::credit_from_payment`] once per payment, but webhooks can be
//! delivered more than once. The bridge keeps one receipt per external payment
//! id; the receipt lookup, the credit and the receipt insert all happen while
//! the receipt map is locked, so a duplicate delivery can never credit twice.
//!
//! The bridge only ever calls the Balance Store's credit operation.

use crate::models::event::AuditReason;
use crate::store::{BalanceStore, Retryable, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur while crediting a payment
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Payment amount must be positive, got {amount}")]
    InvalidAmount { amount: i64 },

    #[error("External payment id must not be empty")]
    MissingPaymentId,

    #[error("Payment {external_payment_id} was already credited with different details")]
    PaymentMismatch { external_payment_id: String },

    #[error("Payment receipts busy, lock not acquired in time")]
    ConcurrentModification,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Retryable for PaymentError {
    fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ConcurrentModification => true,
            PaymentError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Proof that an external payment was credited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub external_payment_id: String,
    pub account_id: String,
    pub amount: i64,
    pub balance_after: i64,
    pub credited_at: DateTime<Utc>,
}

/// Result of one `credit_from_payment` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCredit {
    pub receipt: PaymentReceipt,
    /// True when the payment had already been credited by an earlier call
    pub duplicate: bool,
}

/// Idempotent entry point for confirmed external payments
#[derive(Debug)]
pub struct PaymentBridge {
    receipts: Mutex<HashMap<String, PaymentReceipt>>,
    lock_timeout: Duration,
}

impl PaymentBridge {
    pub fn new(lock_timeout: Duration) -> Self {
        Self::from_receipts(Vec::new(), lock_timeout)
    }

    /// Rebuild the bridge from persisted receipts
    pub fn from_receipts(receipts: Vec<PaymentReceipt>, lock_timeout: Duration) -> Self {
        let receipts = receipts
            .into_iter()
            .map(|r| (r.external_payment_id.clone(), r))
            .collect();
        Self {
            receipts: Mutex::new(receipts),
            lock_timeout,
        }
    }

    /// Credit `amount` to `account_id` for a confirmed external payment
    ///
    /// Repeated calls with the same `external_payment_id` return the original
    /// receipt flagged as a duplicate. A repeated id with a different account
    /// or amount is rejected.
    pub fn credit_from_payment(
        &self,
        store: &BalanceStore,
        account_id: &str,
        amount: i64,
        external_payment_id: &str,
    ) -> Result<PaymentCredit, PaymentError> {
        if amount <= 0 {
            return Err(PaymentError::InvalidAmount { amount });
        }
        if external_payment_id.trim().is_empty() {
            return Err(PaymentError::MissingPaymentId);
        }

        let mut receipts = self
            .receipts
            .try_lock_for(self.lock_timeout)
            .ok_or(PaymentError::ConcurrentModification)?;

        if let Some(existing) = receipts.get(external_payment_id) {
            if existing.account_id != account_id || existing.amount != amount {
                warn!(
                    external_payment_id,
                    account_id, amount, "payment id reused with different details"
                );
                return Err(PaymentError::PaymentMismatch {
                    external_payment_id: external_payment_id.to_string(),
                });
            }
            return Ok(PaymentCredit {
                receipt: existing.clone(),
                duplicate: true,
            });
        }

        let balance_after = store.credit(
            account_id,
            amount,
            AuditReason::Payment {
                external_payment_id: external_payment_id.to_string(),
            },
        )?;
        let receipt = PaymentReceipt {
            external_payment_id: external_payment_id.to_string(),
            account_id: account_id.to_string(),
            amount,
            balance_after,
            credited_at: store.clock().now(),
        };
        receipts.insert(external_payment_id.to_string(), receipt.clone());
        info!(external_payment_id, account_id, amount, "payment credited");

        Ok(PaymentCredit {
            receipt,
            duplicate: false,
        })
    }

    /// Receipt for an external payment id
    pub fn receipt(&self, external_payment_id: &str) -> Option<PaymentReceipt> {
        self.receipts.lock().get(external_payment_id).cloned()
    }

    /// All receipts, oldest first
    pub fn receipts(&self) -> Vec<PaymentReceipt> {
        let mut receipts: Vec<PaymentReceipt> = self.receipts.lock().values().cloned().collect();
        receipts.sort_by(|a, b| {
            a.credited_at
                .cmp(&b.credited_at)
                .then_with(|| a.external_payment_id.cmp(&b.external_payment_id))
        });
        receipts
    }
}
