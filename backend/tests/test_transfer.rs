//! P2P Transfer Tests
//!
//! Validation order, atomicity and conservation of direct transfers.

use btz_ledger_core::{
    AuditReason, FixedClock, Ledger, LedgerConfig, LedgerError, SubscriptionTier, TransferError,
};
use chrono::NaiveDate;
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn create_ledger(balances: &[(&str, i64)]) -> Ledger {
    let clock = Arc::new(FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));
    let ledger = Ledger::with_clock(LedgerConfig::default(), clock).unwrap();
    for (id, balance) in balances {
        ledger.open_account(id, *balance, SubscriptionTier::Free).unwrap();
    }
    ledger
}

fn transfer_error(result: Result<impl std::fmt::Debug, LedgerError>) -> TransferError {
    match result {
        Err(LedgerError::Transfer(e)) => e,
        other => panic!("expected a transfer error, got {:?}", other),
    }
}

// ============================================================================
// Successful Transfers
// ============================================================================

#[test]
fn test_transfer_moves_funds_and_records_history() {
    let ledger = create_ledger(&[("alice", 100), ("bob", 10)]);

    let transfer = ledger.transfer("alice", "bob", 35).unwrap();
    assert_eq!(transfer.sender_id(), "alice");
    assert_eq!(transfer.receiver_id(), "bob");
    assert_eq!(transfer.amount(), 35);
    assert_eq!(transfer.sender_balance_after(), 65);
    assert_eq!(transfer.receiver_balance_after(), 45);

    assert_eq!(ledger.balance("alice").unwrap(), 65);
    assert_eq!(ledger.balance("bob").unwrap(), 45);
    assert_eq!(ledger.transfers().len(), 1);
    assert_eq!(ledger.transfers_for("bob")[0].id(), transfer.id());

    let out = ledger.audit_trail("alice").unwrap();
    assert_eq!(
        out.last().unwrap().reason,
        AuditReason::TransferOut {
            transfer_id: transfer.id().to_string()
        }
    );
    let incoming = ledger.audit_trail("bob").unwrap();
    assert_eq!(
        incoming.last().unwrap().reason,
        AuditReason::TransferIn {
            transfer_id: transfer.id().to_string()
        }
    );
}

#[test]
fn test_transfer_of_entire_balance() {
    let ledger = create_ledger(&[("alice", 50), ("bob", 0)]);
    ledger.transfer("alice", "bob", 50).unwrap();
    assert_eq!(ledger.balance("alice").unwrap(), 0);
    assert_eq!(ledger.balance("bob").unwrap(), 50);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_insufficient_funds_changes_nothing() {
    let ledger = create_ledger(&[("alice", 40), ("bob", 0)]);

    let err = transfer_error(ledger.transfer("alice", "bob", 50));
    assert_eq!(
        err,
        TransferError::InsufficientFunds {
            account_id: "alice".to_string(),
            required: 50,
            available: 40,
        }
    );
    assert_eq!(ledger.balance("alice").unwrap(), 40);
    assert_eq!(ledger.balance("bob").unwrap(), 0);
    assert!(ledger.transfers().is_empty());
    assert_eq!(ledger.audit_trail("alice").unwrap().len(), 1);
}

#[test]
fn test_validation_order() {
    let ledger = create_ledger(&[("alice", 40), ("bob", 0)]);

    // amount is checked before anything else
    assert_eq!(
        transfer_error(ledger.transfer("alice", "alice", 0)),
        TransferError::InvalidAmount { amount: 0 }
    );
    assert_eq!(
        transfer_error(ledger.transfer("alice", "alice", 5)),
        TransferError::SelfTransfer("alice".to_string())
    );
    // receiver existence is checked before the sender's balance
    assert_eq!(
        transfer_error(ledger.transfer("alice", "ghost", 500)),
        TransferError::ReceiverNotFound("ghost".to_string())
    );
    assert_eq!(
        transfer_error(ledger.transfer("ghost", "bob", 5)),
        TransferError::AccountNotFound("ghost".to_string())
    );
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_transfers_conserve_total(
        start_a in 0i64..1_000,
        start_b in 0i64..1_000,
        amounts in proptest::collection::vec((any::<bool>(), 1i64..300), 1..20),
    ) {
        let ledger = create_ledger(&[("a", start_a), ("b", start_b)]);

        for (a_to_b, amount) in amounts {
            let (from, to) = if a_to_b { ("a", "b") } else { ("b", "a") };
            let before = ledger.balance(from).unwrap();
            match ledger.transfer(from, to, amount) {
                Ok(_) => prop_assert!(before >= amount),
                Err(LedgerError::Transfer(TransferError::InsufficientFunds { .. })) => {
                    prop_assert!(before < amount)
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
            let a = ledger.balance("a").unwrap();
            let b = ledger.balance("b").unwrap();
            prop_assert!(a >= 0 && b >= 0);
            prop_assert_eq!(a + b, start_a + start_b);
        }
    }
}
