//! Transfer model
//!
//! A completed peer-to-peer movement of BTZ. Transfers are append-only
//! ledger entries: once recorded they are never modified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A completed transfer between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Unique transfer identifier (UUID)
    id: String,
    sender_id: String,
    receiver_id: String,
    amount: i64,
    created_at: DateTime<Utc>,
    sender_balance_after: i64,
    receiver_balance_after: i64,
}

impl Transfer {
    pub(crate) fn new(
        id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
        created_at: DateTime<Utc>,
        sender_balance_after: i64,
        receiver_balance_after: i64,
    ) -> Self {
        Self {
            id,
            sender_id,
            receiver_id,
            amount,
            created_at,
            sender_balance_after,
            receiver_balance_after,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn sender_balance_after(&self) -> i64 {
        self.sender_balance_after
    }

    pub fn receiver_balance_after(&self) -> i64 {
        self.receiver_balance_after
    }

    /// Check if an account took part in this transfer
    pub fn involves(&self, account_id: &str) -> bool {
        self.sender_id == account_id || self.receiver_id == account_id
    }
}
