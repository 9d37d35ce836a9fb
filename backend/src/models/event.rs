//! Audit log for balance reconciliation.
//!
//! Every credit and debit applied by the Balance Store appends exactly one
//! [`AuditEntry`]. The log is append-only and is the only source of truth when
//! reconciling disputes: replaying an account's deltas must reproduce its
//! balance.
//!
//! # Reasons
//!
//! Entries are categorized by the producer that caused them:
//! - **Opening**: initial balance of a freshly opened account
//! - **Yield / Penalty**: daily accrual engines
//! - **DuelEscrow / DuelEscrowRollback / DuelPayout / DuelRefund**: wagers
//! - **TransferOut / TransferIn**: peer-to-peer transfers
//! - **Payment**: credits confirmed by the external payment provider
//!
//! # Example
//!
//! ```rust
//! use btz_ledger_core::models::event::{AuditLog, AuditReason};
//! use chrono::Utc;
//!
//! let mut log = AuditLog::new();
//! log.record("alice", 500, 500, AuditReason::Opening, Utc::now());
//! log.record("alice", -200, 300, AuditReason::Penalty, Utc::now());
//!
//! assert_eq!(log.net_delta("alice"), 300);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a balance changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuditReason {
    Opening,
    Yield,
    Penalty,
    DuelEscrow { duel_id: String },
    DuelEscrowRollback { duel_id: String },
    DuelPayout { duel_id: String },
    DuelRefund { duel_id: String },
    TransferOut { transfer_id: String },
    TransferIn { transfer_id: String },
    Payment { external_payment_id: String },
}

impl AuditReason {
    /// Get reason name for filtering
    pub fn reason_type(&self) -> &'static str {
        match self {
            AuditReason::Opening => "Opening",
            AuditReason::Yield => "Yield",
            AuditReason::Penalty => "Penalty",
            AuditReason::DuelEscrow { .. } => "DuelEscrow",
            AuditReason::DuelEscrowRollback { .. } => "DuelEscrowRollback",
            AuditReason::DuelPayout { .. } => "DuelPayout",
            AuditReason::DuelRefund { .. } => "DuelRefund",
            AuditReason::TransferOut { .. } => "TransferOut",
            AuditReason::TransferIn { .. } => "TransferIn",
            AuditReason::Payment { .. } => "Payment",
        }
    }

    /// Duel this entry belongs to, if any
    pub fn duel_id(&self) -> Option<&str> {
        match self {
            AuditReason::DuelEscrow { duel_id }
            | AuditReason::DuelEscrowRollback { duel_id }
            | AuditReason::DuelPayout { duel_id }
            | AuditReason::DuelRefund { duel_id } => Some(duel_id),
            _ => None,
        }
    }
}

/// One balance mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the log, starting at 0
    pub sequence: u64,
    pub account_id: String,
    /// Signed change: positive for credits, negative for debits
    pub delta: i64,
    pub balance_after: i64,
    pub reason: AuditReason,
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    /// Create empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from persisted entries
    pub fn from_entries(entries: Vec<AuditEntry>) -> Self {
        Self { entries }
    }

    /// Append an entry and return its sequence number
    pub fn record(
        &mut self,
        account_id: &str,
        delta: i64,
        balance_after: i64,
        reason: AuditReason,
        timestamp: DateTime<Utc>,
    ) -> u64 {
        let sequence = self.entries.len() as u64;
        self.entries.push(AuditEntry {
            sequence,
            account_id: account_id.to_string(),
            delta,
            balance_after,
            reason,
            timestamp,
        });
        sequence
    }

    /// Get all entries
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get entries for a specific account, in order
    pub fn entries_for_account(&self, account_id: &str) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .collect()
    }

    /// Get entries of a specific reason type
    pub fn entries_of_type(&self, reason_type: &str) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.reason.reason_type() == reason_type)
            .collect()
    }

    /// Get entries belonging to a duel
    pub fn entries_for_duel(&self, duel_id: &str) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.reason.duel_id() == Some(duel_id))
            .collect()
    }

    /// Sum of all deltas recorded for an account
    pub fn net_delta(&self, account_id: &str) -> i64 {
        self.entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.delta)
            .sum()
    }
}
