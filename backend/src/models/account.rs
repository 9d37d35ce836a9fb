//! Account model
//!
//! Represents one user's BTZ account. Each account has:
//! - Balance in the smallest currency unit (i64, never negative)
//! - Experience points (non-currency counter)
//! - Activity streak and last activity date (inputs to yield and penalty)
//! - Subscription tier
//! - Per-day idempotency markers for yield and penalty
//!
//! The protected balance is derived, never stored.
//!
//! CRITICAL: All money values are i64 and a balance can never go below zero.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Share of a balance exempt from inactivity penalties, in basis points (20%)
pub const DEFAULT_PROTECTED_SHARE_BPS: i64 = 2_000;

/// Basis point denominator
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Errors that can occur during account operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("Insufficient funds in account {account_id}: required {required}, available {available}")]
    InsufficientFunds {
        account_id: String,
        required: i64,
        available: i64,
    },

    #[error("Amount must be positive, got {amount}")]
    InvalidAmount { amount: i64 },

    #[error("Balance overflow in account {account_id}")]
    BalanceOverflow { account_id: String },
}

/// Subscription tier of the account holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Elite,
}

impl std::str::FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "elite" => Ok(Self::Elite),
            other => Err(format!("unknown subscription tier '{}'", other)),
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Elite => write!(f, "elite"),
        }
    }
}

/// A user's BTZ account
///
/// # Example
/// ```
/// use btz_ledger_core::{Account, SubscriptionTier};
/// use chrono::NaiveDate;
///
/// let opened = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let mut account = Account::new("alice".to_string(), 1_000, SubscriptionTier::Pro, opened);
///
/// account.debit(300).unwrap();
/// assert_eq!(account.balance(), 700);
/// assert_eq!(account.protected_balance(), 140);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier (the user id)
    id: String,

    /// Current BTZ balance, never negative
    balance: i64,

    /// Experience points earned on the platform
    experience_points: u64,

    /// Consecutive calendar days with at least one login
    consecutive_active_days: u32,

    /// Last calendar day with a login
    last_activity_date: NaiveDate,

    subscription_tier: SubscriptionTier,

    /// Day the account was opened
    opened_on: NaiveDate,

    /// Last day yield was applied
    last_yield_date: Option<NaiveDate>,

    /// Last day the inactivity penalty was evaluated
    last_penalty_date: Option<NaiveDate>,
}

impl Account {
    /// Create a new account
    ///
    /// The opening day counts as the first active day.
    ///
    /// # Panics
    ///
    /// Panics if `balance` is negative.
    pub fn new(id: String, balance: i64, tier: SubscriptionTier, opened_on: NaiveDate) -> Self {
        assert!(balance >= 0, "opening balance must be non-negative");
        Self {
            id,
            balance,
            experience_points: 0,
            consecutive_active_days: 1,
            last_activity_date: opened_on,
            subscription_tier: tier,
            opened_on,
            last_yield_date: None,
            last_penalty_date: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Portion of the balance exempt from inactivity penalties
    ///
    /// `floor(balance * 20%)`
    pub fn protected_balance(&self) -> i64 {
        protected_portion(self.balance, DEFAULT_PROTECTED_SHARE_BPS)
    }

    pub fn experience_points(&self) -> u64 {
        self.experience_points
    }

    pub fn consecutive_active_days(&self) -> u32 {
        self.consecutive_active_days
    }

    pub fn last_activity_date(&self) -> NaiveDate {
        self.last_activity_date
    }

    pub fn subscription_tier(&self) -> SubscriptionTier {
        self.subscription_tier
    }

    pub fn opened_on(&self) -> NaiveDate {
        self.opened_on
    }

    pub fn last_yield_date(&self) -> Option<NaiveDate> {
        self.last_yield_date
    }

    pub fn last_penalty_date(&self) -> Option<NaiveDate> {
        self.last_penalty_date
    }

    /// Check if the account can cover `amount`
    pub fn can_pay(&self, amount: i64) -> bool {
        amount <= self.balance
    }

    /// Debit the account
    ///
    /// Fails without changing anything if the amount is not positive or
    /// exceeds the balance.
    pub fn debit(&mut self, amount: i64) -> Result<i64, AccountError> {
        if amount <= 0 {
            return Err(AccountError::InvalidAmount { amount });
        }
        if !self.can_pay(amount) {
            return Err(AccountError::InsufficientFunds {
                account_id: self.id.clone(),
                required: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(self.balance)
    }

    /// Credit the account
    pub fn credit(&mut self, amount: i64) -> Result<i64, AccountError> {
        if amount <= 0 {
            return Err(AccountError::InvalidAmount { amount });
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| AccountError::BalanceOverflow {
                account_id: self.id.clone(),
            })?;
        Ok(self.balance)
    }

    /// Add experience points (saturating)
    pub fn award_experience(&mut self, points: u64) -> u64 {
        self.experience_points = self.experience_points.saturating_add(points);
        self.experience_points
    }

    /// Record a login on `date`
    ///
    /// Same day: no change. Next day: streak grows by one. Larger gap: the
    /// streak restarts at 1. Dates before the last activity are ignored.
    pub fn record_activity(&mut self, date: NaiveDate) {
        let gap = crate::core::time::days_between(self.last_activity_date, date);
        match gap {
            g if g <= 0 => return,
            1 => self.consecutive_active_days = self.consecutive_active_days.saturating_add(1),
            _ => self.consecutive_active_days = 1,
        }
        self.last_activity_date = date;
    }

    pub fn set_subscription_tier(&mut self, tier: SubscriptionTier) {
        self.subscription_tier = tier;
    }

    pub(crate) fn mark_yield_applied(&mut self, date: NaiveDate) {
        self.last_yield_date = Some(date);
    }

    pub(crate) fn mark_penalty_evaluated(&mut self, date: NaiveDate) {
        self.last_penalty_date = Some(date);
    }
}

/// `floor(balance * share_bps / 10000)` for a non-negative balance
pub fn protected_portion(balance: i64, share_bps: i64) -> i64 {
    apply_bps(balance, share_bps)
}

/// `floor(amount * bps / 10000)` computed without intermediate overflow
///
/// Negative inputs are treated as zero.
pub fn apply_bps(amount: i64, bps: i64) -> i64 {
    if amount <= 0 || bps <= 0 {
        return 0;
    }
    let scaled = i128::from(amount) * i128::from(bps) / i128::from(BPS_DENOMINATOR);
    i64::try_from(scaled).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_streak_extends_on_consecutive_days() {
        let mut account = Account::new("a".to_string(), 0, SubscriptionTier::Free, day(1));
        account.record_activity(day(1));
        account.record_activity(day(2));
        account.record_activity(day(3));
        assert_eq!(account.consecutive_active_days(), 3);
        assert_eq!(account.last_activity_date(), day(3));
    }

    #[test]
    fn test_streak_restarts_after_gap() {
        let mut account = Account::new("a".to_string(), 0, SubscriptionTier::Free, day(1));
        account.record_activity(day(2));
        account.record_activity(day(5));
        assert_eq!(account.consecutive_active_days(), 1);
    }

    #[test]
    fn test_earlier_activity_is_ignored() {
        let mut account = Account::new("a".to_string(), 0, SubscriptionTier::Free, day(10));
        account.record_activity(day(3));
        assert_eq!(account.last_activity_date(), day(10));
    }

    #[test]
    fn test_apply_bps_floors() {
        assert_eq!(apply_bps(999, 10), 0);
        assert_eq!(apply_bps(1_000, 10), 1);
        assert_eq!(apply_bps(1_999, 10), 1);
        assert_eq!(apply_bps(i64::MAX, 10_000), i64::MAX);
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("Elite".parse::<SubscriptionTier>(), Ok(SubscriptionTier::Elite));
        assert!("gold".parse::<SubscriptionTier>().is_err());
    }
}
