//! Inactivity Penalty Engine
//!
//! Decays the balance of accounts that stopped logging in. A protected share
//! of the balance (20% by default) is never touched:
//!
//! ```text
//! days_inactive = today - last_activity_date
//! protected     = floor(balance * protected_share)
//! unprotected   = balance - protected
//! penalty       = floor(unprotected * bracket_rate(days_inactive))
//! ```
//!
//! The penalty is at most `unprotected`, so the balance never drops below the
//! protected floor. Evaluation is idempotent per account per UTC day through
//! the `last_penalty_date` marker, set under the account lock together with
//! the debit.

use super::rates::PenaltyRates;
use super::{AccrualError, AccrualKind};
use crate::core::time::days_between;
use crate::models::account::{apply_bps, protected_portion, Account};
use crate::models::event::AuditReason;
use crate::store::BalanceStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Outcome of one day's penalty evaluation for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyResult {
    pub account_id: String,
    pub date: NaiveDate,
    pub days_inactive: i64,
    pub penalty_rate_bps: i64,
    pub protected_balance: i64,
    pub unprotected_balance: i64,
    pub penalty_amount: i64,
    pub balance_after: i64,
}

/// Whole days since the account's last login
pub fn days_inactive(account: &Account, today: NaiveDate) -> i64 {
    days_between(account.last_activity_date(), today).max(0)
}

/// Check if an account is past the grace period on `today`
pub fn is_penalty_eligible(account: &Account, rates: &PenaltyRates, today: NaiveDate) -> bool {
    days_inactive(account, today) >= rates.threshold_days()
}

/// Compute the penalty an account would pay on `today`
///
/// Pure: nothing is debited.
///
/// # Example
/// ```
/// use btz_ledger_core::accrual::{compute_penalty, PenaltyRates};
/// use btz_ledger_core::{Account, SubscriptionTier};
/// use chrono::NaiveDate;
///
/// let last_login = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let today = NaiveDate::from_ymd_opt(2024, 1, 11).unwrap();
/// let account = Account::new("idle".to_string(), 1_000, SubscriptionTier::Free, last_login);
///
/// let result = compute_penalty(&account, &PenaltyRates::default(), today);
/// assert_eq!(result.days_inactive, 10);
/// assert_eq!(result.protected_balance, 200);
/// assert_eq!(result.penalty_amount, 40); // 5% of 800
/// ```
pub fn compute_penalty(account: &Account, rates: &PenaltyRates, today: NaiveDate) -> PenaltyResult {
    let balance = account.balance();
    let days_inactive = days_inactive(account, today);
    let penalty_rate_bps = rates.rate_for(days_inactive);
    let protected_balance = protected_portion(balance, rates.protected_share_bps);
    let unprotected_balance = balance - protected_balance;
    let penalty_amount = apply_bps(unprotected_balance, penalty_rate_bps).min(unprotected_balance);

    PenaltyResult {
        account_id: account.id().to_string(),
        date: today,
        days_inactive,
        penalty_rate_bps,
        protected_balance,
        unprotected_balance,
        penalty_amount,
        balance_after: balance - penalty_amount,
    }
}

/// Evaluate and apply today's inactivity penalty to one account
///
/// Accounts inside the grace period get a zero result. Either way the day's
/// marker is consumed; a second call the same day returns
/// `AlreadyProcessedToday`.
pub fn apply_inactivity_penalty(
    store: &BalanceStore,
    account_id: &str,
    rates: &PenaltyRates,
) -> Result<PenaltyResult, AccrualError> {
    let today = store.clock().today();
    let mut account = store.lock(account_id)?;

    if account.last_penalty_date().is_some_and(|d| d >= today) {
        return Err(AccrualError::AlreadyProcessedToday {
            account_id: account_id.to_string(),
            date: today,
            kind: AccrualKind::Penalty,
        });
    }

    let mut result = compute_penalty(&account, rates, today);
    if result.penalty_amount > 0 {
        result.balance_after =
            store.debit_locked(&mut account, result.penalty_amount, AuditReason::Penalty)?;
    }
    account.mark_penalty_evaluated(today);

    Ok(result)
}
