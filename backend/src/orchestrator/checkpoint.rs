//! Checkpoint - Save/Load Ledger State
//!
//! Serializes the complete ledger (accounts, duels, transfers, payment
//! receipts and the audit log) so it can be persisted and restored.
//!
//! # Critical Invariants
//!
//! - **Reconciliation**: every account balance equals the sum of its audit deltas
//! - **Escrow integrity**: every active duel has both escrow debits in the audit log
//! - **Conservation**: every settled duel paid out exactly its pot
//! - **Config Matching**: state can only be loaded with matching config

use crate::models::account::Account;
use crate::models::duel::{Duel, DuelStatus, MAX_BET_AMOUNT};
use crate::models::event::{AuditEntry, AuditReason};
use crate::models::transfer::Transfer;
use crate::orchestrator::LedgerError;
use crate::payments::PaymentReceipt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Version written into every new snapshot
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Snapshot Structure
// ============================================================================

/// Complete ledger state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub format_version: u32,

    pub taken_at: DateTime<Utc>,

    /// SHA256 hash of the ledger config (for validation)
    pub config_hash: String,

    pub accounts: Vec<Account>,

    pub duels: Vec<Duel>,

    pub transfers: Vec<Transfer>,

    pub payments: Vec<PaymentReceipt>,

    /// Full audit log, in sequence order
    pub audit: Vec<AuditEntry>,
}

impl LedgerSnapshot {
    pub fn to_json(&self) -> Result<String, LedgerError> {
        serde_json::to_string_pretty(self).map_err(|e| {
            LedgerError::SerializationError(format!("Snapshot serialization failed: {}", e))
        })
    }

    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        let snapshot: Self = serde_json::from_str(json).map_err(|e| {
            LedgerError::SerializationError(format!("Snapshot deserialization failed: {}", e))
        })?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(LedgerError::StateValidationError(format!(
                "Unsupported snapshot format version {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(snapshot)
    }

    /// Write the snapshot next to `path` and rename it into place
    pub fn write_to(&self, path: &Path) -> Result<(), LedgerError> {
        let json = self.to_json()?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, LedgerError> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

// ============================================================================
// Config Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of config
///
/// Uses canonical JSON serialization with sorted keys so the hash does not
/// depend on field or map ordering.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, LedgerError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config).map_err(|e| {
        LedgerError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        LedgerError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation
// ============================================================================

fn invalid(message: String) -> LedgerError {
    LedgerError::StateValidationError(message)
}

/// Validate snapshot integrity
///
/// Checks critical invariants:
/// - Unique ids and non-negative balances
/// - Audit log sequence and per-account reconciliation
/// - Duel referential integrity, escrow and conservation
/// - Transfer and payment referential integrity
pub fn validate_snapshot(snapshot: &LedgerSnapshot) -> Result<(), LedgerError> {
    // 1. Accounts
    let mut balances: HashMap<&str, i64> = HashMap::new();
    for account in &snapshot.accounts {
        if account.balance() < 0 {
            return Err(invalid(format!(
                "Negative balance {} in account {}",
                account.balance(),
                account.id()
            )));
        }
        if balances.insert(account.id(), account.balance()).is_some() {
            return Err(invalid(format!("Duplicate account {}", account.id())));
        }
    }

    // 2. Audit log
    let mut audited: HashMap<&str, i64> = HashMap::new();
    for (position, entry) in snapshot.audit.iter().enumerate() {
        if entry.sequence != position as u64 {
            return Err(invalid(format!(
                "Audit sequence gap: expected {}, found {}",
                position, entry.sequence
            )));
        }
        if !balances.contains_key(entry.account_id.as_str()) {
            return Err(invalid(format!(
                "Audit entry {} references unknown account {}",
                entry.sequence, entry.account_id
            )));
        }
        *audited.entry(entry.account_id.as_str()).or_insert(0) += entry.delta;
    }
    for (account_id, balance) in &balances {
        let audited_balance = audited.get(account_id).copied().unwrap_or(0);
        if audited_balance != *balance {
            return Err(invalid(format!(
                "Account {} does not reconcile: balance {}, audit log {}",
                account_id, balance, audited_balance
            )));
        }
    }

    // 3. Duels
    let mut duel_ids = HashSet::new();
    for duel in &snapshot.duels {
        if !duel_ids.insert(duel.id()) {
            return Err(invalid(format!("Duplicate duel {}", duel.id())));
        }
        if duel.bet_amount() <= 0 || duel.bet_amount() > MAX_BET_AMOUNT {
            return Err(invalid(format!(
                "Duel {} has invalid bet {}",
                duel.id(),
                duel.bet_amount()
            )));
        }
        for player in [duel.player1_id(), duel.player2_id()] {
            if !balances.contains_key(player) {
                return Err(invalid(format!(
                    "Duel {} references unknown account {}",
                    duel.id(),
                    player
                )));
            }
        }

        let escrowed: i64 = snapshot
            .audit
            .iter()
            .filter(|e| {
                matches!(&e.reason, AuditReason::DuelEscrow { duel_id } if duel_id == duel.id())
            })
            .map(|e| -e.delta)
            .sum();
        if escrowed != duel.pot() {
            return Err(invalid(format!(
                "Duel {} escrow mismatch: pot {}, escrowed {}",
                duel.id(),
                duel.pot(),
                escrowed
            )));
        }

        match (duel.status(), duel.settlement()) {
            (DuelStatus::Active, None) => {}
            (DuelStatus::Active, Some(_)) => {
                return Err(invalid(format!("Active duel {} has a settlement", duel.id())));
            }
            (_, None) => {
                return Err(invalid(format!(
                    "Terminal duel {} has no settlement",
                    duel.id()
                )));
            }
            (_, Some(settlement)) => {
                if settlement.total_paid() != duel.pot() {
                    return Err(invalid(format!(
                        "Duel {} paid out {} of a {} pot",
                        duel.id(),
                        settlement.total_paid(),
                        duel.pot()
                    )));
                }
            }
        }
    }

    // 4. Transfers & payments
    let mut transfer_ids = HashSet::new();
    for transfer in &snapshot.transfers {
        if !transfer_ids.insert(transfer.id()) {
            return Err(invalid(format!("Duplicate transfer {}", transfer.id())));
        }
        for account_id in [transfer.sender_id(), transfer.receiver_id()] {
            if !balances.contains_key(account_id) {
                return Err(invalid(format!(
                    "Transfer {} references unknown account {}",
                    transfer.id(),
                    account_id
                )));
            }
        }
    }

    let mut payment_ids = HashSet::new();
    for receipt in &snapshot.payments {
        if !payment_ids.insert(receipt.external_payment_id.as_str()) {
            return Err(invalid(format!(
                "Duplicate payment receipt {}",
                receipt.external_payment_id
            )));
        }
        if !balances.contains_key(receipt.account_id.as_str()) {
            return Err(invalid(format!(
                "Payment {} references unknown account {}",
                receipt.external_payment_id, receipt.account_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::account::SubscriptionTier;
    use chrono::NaiveDate;

    fn empty_snapshot() -> LedgerSnapshot {
        LedgerSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            taken_at: DateTime::<Utc>::default(),
            config_hash: "hash".to_string(),
            accounts: Vec::new(),
            duels: Vec::new(),
            transfers: Vec::new(),
            payments: Vec::new(),
            audit: Vec::new(),
        }
    }

    #[test]
    fn test_compute_config_hash_deterministic() {
        #[derive(Serialize)]
        struct TestConfig {
            value: i32,
            name: String,
        }

        let config1 = TestConfig {
            value: 42,
            name: "test".to_string(),
        };
        let config2 = TestConfig {
            value: 42,
            name: "test".to_string(),
        };

        assert_eq!(
            compute_config_hash(&config1).unwrap(),
            compute_config_hash(&config2).unwrap(),
            "Same config should produce same hash"
        );
    }

    #[test]
    fn test_compute_config_hash_different_for_different_configs() {
        #[derive(Serialize)]
        struct TestConfig {
            value: i32,
        }

        assert_ne!(
            compute_config_hash(&TestConfig { value: 42 }).unwrap(),
            compute_config_hash(&TestConfig { value: 43 }).unwrap(),
            "Different configs should produce different hashes"
        );
    }

    #[test]
    fn test_unaudited_balance_rejected() {
        let mut snapshot = empty_snapshot();
        snapshot.accounts.push(Account::new(
            "a".to_string(),
            50,
            SubscriptionTier::Free,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        ));

        let err = validate_snapshot(&snapshot).unwrap_err();
        assert!(matches!(err, LedgerError::StateValidationError(msg) if msg.contains("reconcile")));
    }

    #[test]
    fn test_unknown_format_version_rejected() {
        let mut snapshot = empty_snapshot();
        snapshot.format_version = 99;
        let json = serde_json::to_string(&snapshot).unwrap();

        assert!(matches!(
            LedgerSnapshot::from_json(&json),
            Err(LedgerError::StateValidationError(_))
        ));
    }
}
