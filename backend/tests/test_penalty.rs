//! Inactivity Penalty Tests
//!
//! Brackets, the protected floor, per-day idempotency and the penalty sweep.

use btz_ledger_core::accrual::{compute_penalty, PenaltyBracket, PenaltyRates};
use btz_ledger_core::{
    Account, AccrualError, AccrualKind, AuditReason, FixedClock, Ledger, LedgerConfig,
    LedgerError, SubscriptionTier,
};
use chrono::NaiveDate;
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
}

fn create_ledger() -> (Ledger, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::at_date(day(1)));
    let ledger = Ledger::with_clock(LedgerConfig::default(), clock.clone()).unwrap();
    (ledger, clock)
}

// ============================================================================
// Brackets
// ============================================================================

#[test]
fn test_penalty_brackets() {
    let (ledger, clock) = create_ledger();
    for id in ["d2", "d4", "d8"] {
        ledger.open_account(id, 1_000, SubscriptionTier::Free).unwrap();
    }

    clock.set_date(day(3));
    let two_days = ledger.apply_inactivity_penalty("d2").unwrap();
    assert_eq!(two_days.days_inactive, 2);
    assert_eq!(two_days.penalty_rate_bps, 100);
    assert_eq!(two_days.penalty_amount, 8);

    clock.set_date(day(5));
    let four_days = ledger.apply_inactivity_penalty("d4").unwrap();
    assert_eq!(four_days.penalty_rate_bps, 200);
    assert_eq!(four_days.penalty_amount, 16);

    clock.set_date(day(9));
    let eight_days = ledger.apply_inactivity_penalty("d8").unwrap();
    assert_eq!(eight_days.penalty_rate_bps, 500);
    assert_eq!(eight_days.protected_balance, 200);
    assert_eq!(eight_days.unprotected_balance, 800);
    assert_eq!(eight_days.penalty_amount, 40);
    assert_eq!(ledger.balance("d8").unwrap(), 960);
}

#[test]
fn test_grace_period_consumes_marker_without_debit() {
    let (ledger, clock) = create_ledger();
    ledger.open_account("alice", 1_000, SubscriptionTier::Free).unwrap();

    clock.set_date(day(2));
    let result = ledger.apply_inactivity_penalty("alice").unwrap();
    assert_eq!(result.days_inactive, 1);
    assert_eq!(result.penalty_amount, 0);
    assert_eq!(ledger.balance("alice").unwrap(), 1_000);

    assert!(matches!(
        ledger.apply_inactivity_penalty("alice"),
        Err(LedgerError::Accrual(AccrualError::AlreadyProcessedToday {
            kind: AccrualKind::Penalty,
            ..
        }))
    ));
}

#[test]
fn test_penalty_applied_once_per_day() {
    let (ledger, clock) = create_ledger();
    ledger.open_account("idle", 1_000, SubscriptionTier::Free).unwrap();
    clock.set_date(day(11));

    ledger.apply_inactivity_penalty("idle").unwrap();
    assert!(ledger.apply_inactivity_penalty("idle").is_err());
    assert_eq!(ledger.balance("idle").unwrap(), 960);

    let penalties = ledger
        .audit_trail("idle")
        .unwrap()
        .into_iter()
        .filter(|e| e.reason == AuditReason::Penalty)
        .count();
    assert_eq!(penalties, 1);
}

#[test]
fn test_login_resets_inactivity() {
    let (ledger, clock) = create_ledger();
    ledger.open_account("alice", 1_000, SubscriptionTier::Free).unwrap();

    clock.set_date(day(20));
    ledger.record_login("alice").unwrap();
    let result = ledger.apply_inactivity_penalty("alice").unwrap();
    assert_eq!(result.days_inactive, 0);
    assert_eq!(result.penalty_amount, 0);
}

#[test]
fn test_repeated_penalties_never_touch_protected_floor() {
    let (ledger, clock) = create_ledger();
    ledger.open_account("idle", 1_000, SubscriptionTier::Free).unwrap();

    for d in 9..=31 {
        clock.set_date(day(d));
        let before = ledger.balance("idle").unwrap();
        let result = ledger.apply_inactivity_penalty("idle").unwrap();
        assert!(result.balance_after >= before / 5);
    }
    assert!(ledger.balance("idle").unwrap() > 0);
}

// ============================================================================
// Sweeps
// ============================================================================

#[test]
fn test_penalty_sweep_skips_active_accounts() {
    let (ledger, clock) = create_ledger();
    for id in ["active", "idle-1", "idle-2"] {
        ledger.open_account(id, 1_000, SubscriptionTier::Free).unwrap();
    }
    clock.set_date(day(11));
    ledger.record_login("active").unwrap();

    let reports = ledger.run_full_sweep(AccrualKind::Penalty).unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.examined, 3);
    assert_eq!(report.processed, 2);
    assert_eq!(report.ineligible, 1);
    assert_eq!(report.total_amount, 80);
    assert!(report.failures.is_empty());

    assert_eq!(ledger.balance("active").unwrap(), 1_000);
    assert_eq!(ledger.balance("idle-1").unwrap(), 960);

    let again = ledger.run_penalty_sweep(None).unwrap();
    assert_eq!(again.already_processed, 2);
    assert_eq!(again.processed, 0);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_penalty_never_breaches_protected_balance(
        balance in 0i64..=1_000_000_000_000,
        days_inactive in 0u64..400,
    ) {
        let last_login = day(1);
        let account = Account::new("p".to_string(), balance, SubscriptionTier::Free, last_login);
        let today = last_login + chrono::Days::new(days_inactive);

        let result = compute_penalty(&account, &PenaltyRates::default(), today);
        prop_assert!(result.penalty_amount >= 0);
        prop_assert!(result.balance_after >= balance / 5);
        prop_assert_eq!(result.protected_balance, balance / 5);
        prop_assert_eq!(result.balance_after, balance - result.penalty_amount);
    }

    #[test]
    fn prop_full_rate_still_keeps_floor(balance in 0i64..1_000_000_000) {
        let rates = PenaltyRates {
            brackets: vec![PenaltyBracket { min_days_inactive: 2, rate_bps: 10_000 }],
            ..PenaltyRates::default()
        };
        let last_login = day(1);
        let account = Account::new("p".to_string(), balance, SubscriptionTier::Free, last_login);

        let result = compute_penalty(&account, &rates, day(30));
        prop_assert_eq!(result.balance_after, balance / 5);
    }
}
