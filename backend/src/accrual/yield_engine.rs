//! Yield Accrual Engine
//!
//! Credits a small daily reward on each account's balance.
//!
//! ```text
//! base      = floor(balance * base_rate)
//! bonus     = floor(balance * (subscription_bonus + streak_bonus))
//! requested = base + bonus
//! applied   = min(requested, daily_cap)
//! ```
//!
//! The daily cap is an absolute amount, independent of balance size.
//!
//! # Idempotency
//!
//! The account's `last_yield_date` marker is checked and set under the same
//! account lock as the credit, so a second call on the same UTC day can never
//! credit twice, no matter how the scheduler behaves.

use super::rates::YieldRates;
use super::{AccrualError, AccrualKind};
use crate::models::account::{apply_bps, Account};
use crate::models::event::AuditReason;
use crate::store::BalanceStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Outcome of one day's yield for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldResult {
    pub account_id: String,
    pub date: NaiveDate,
    pub base_amount: i64,
    pub bonus_amount: i64,
    pub total_requested: i64,
    pub applied_amount: i64,
    pub was_capped: bool,
    /// Combined base, subscription and streak rate before the cap
    pub effective_rate_bps: i64,
    pub balance_after: i64,
}

/// Compute the yield an account would receive on `date`
///
/// Pure: nothing is credited.
///
/// # Example
/// ```
/// use btz_ledger_core::accrual::{compute_yield, YieldRates};
/// use btz_ledger_core::{Account, SubscriptionTier};
/// use chrono::NaiveDate;
///
/// let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let account = Account::new("whale".to_string(), 1_000_000, SubscriptionTier::Elite, today);
///
/// let result = compute_yield(&account, &YieldRates::default(), today);
/// assert_eq!(result.total_requested, 2_000);
/// assert_eq!(result.applied_amount, 5);
/// assert!(result.was_capped);
/// ```
pub fn compute_yield(account: &Account, rates: &YieldRates, date: NaiveDate) -> YieldResult {
    let balance = account.balance();
    let bonus_rate_bps = rates.subscription_bonus_bps(account.subscription_tier())
        + rates.streak_bonus_bps(account.consecutive_active_days());

    let base_amount = apply_bps(balance, rates.base_rate_bps);
    let bonus_amount = apply_bps(balance, bonus_rate_bps);
    let total_requested = base_amount.saturating_add(bonus_amount);
    let applied_amount = total_requested.min(rates.daily_cap.max(0));

    YieldResult {
        account_id: account.id().to_string(),
        date,
        base_amount,
        bonus_amount,
        total_requested,
        applied_amount,
        was_capped: applied_amount < total_requested,
        effective_rate_bps: rates.base_rate_bps + bonus_rate_bps,
        balance_after: balance.saturating_add(applied_amount),
    }
}

/// Apply today's yield to one account
///
/// Returns `AlreadyProcessedToday` without touching the balance if the
/// account already received yield on the current UTC day. A zero balance
/// still consumes the day's marker.
pub fn apply_daily_yield(
    store: &BalanceStore,
    account_id: &str,
    rates: &YieldRates,
) -> Result<YieldResult, AccrualError> {
    let today = store.clock().today();
    let mut account = store.lock(account_id)?;

    if account.last_yield_date().is_some_and(|d| d >= today) {
        return Err(AccrualError::AlreadyProcessedToday {
            account_id: account_id.to_string(),
            date: today,
            kind: AccrualKind::Yield,
        });
    }

    let mut result = compute_yield(&account, rates, today);
    if result.applied_amount > 0 {
        result.balance_after =
            store.credit_locked(&mut account, result.applied_amount, AuditReason::Yield)?;
    }
    account.mark_yield_applied(today);

    Ok(result)
}
