//! Accrual Rates
//!
//! Rates for the daily yield and the inactivity penalty. Every rate is an
//! integer number of basis points (1 bps = 0.0001) so amounts come out of
//! exact integer floor division.

use crate::models::account::{SubscriptionTier, BPS_DENOMINATOR, DEFAULT_PROTECTED_SHARE_BPS};
use serde::{Deserialize, Serialize};

/// Yield rates and limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YieldRates {
    /// Base daily rate. Default: 10 bps (0.1%)
    pub base_rate_bps: i64,
    /// Extra rate for `pro` subscribers. Default: 5 bps
    pub pro_bonus_bps: i64,
    /// Extra rate for `elite` subscribers. Default: 10 bps
    pub elite_bonus_bps: i64,
    /// Streak days per bonus step. Default: 5
    pub streak_step_days: u32,
    /// Bonus per completed streak step. Default: 1 bps
    pub streak_bonus_per_step_bps: i64,
    /// Ceiling on the streak bonus. Default: 30 bps
    pub max_streak_bonus_bps: i64,
    /// Absolute cap on the amount credited per day, whatever the balance.
    /// Default: 5
    pub daily_cap: i64,
}

impl Default for YieldRates {
    fn default() -> Self {
        Self {
            base_rate_bps: 10,
            pro_bonus_bps: 5,
            elite_bonus_bps: 10,
            streak_step_days: 5,
            streak_bonus_per_step_bps: 1,
            max_streak_bonus_bps: 30,
            daily_cap: 5,
        }
    }
}

impl YieldRates {
    /// Subscription bonus for a tier
    pub fn subscription_bonus_bps(&self, tier: SubscriptionTier) -> i64 {
        match tier {
            SubscriptionTier::Free => 0,
            SubscriptionTier::Pro => self.pro_bonus_bps,
            SubscriptionTier::Elite => self.elite_bonus_bps,
        }
    }

    /// Streak bonus for a run of consecutive active days
    ///
    /// # Example
    /// ```
    /// use btz_ledger_core::accrual::YieldRates;
    ///
    /// let rates = YieldRates::default();
    /// assert_eq!(rates.streak_bonus_bps(4), 0);
    /// assert_eq!(rates.streak_bonus_bps(10), 2);
    /// assert_eq!(rates.streak_bonus_bps(1_000), 30);
    /// ```
    pub fn streak_bonus_bps(&self, consecutive_active_days: u32) -> i64 {
        if self.streak_step_days == 0 {
            return 0;
        }
        let steps = i64::from(consecutive_active_days / self.streak_step_days);
        steps
            .saturating_mul(self.streak_bonus_per_step_bps)
            .min(self.max_streak_bonus_bps)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let rates = [
            ("base_rate_bps", self.base_rate_bps),
            ("pro_bonus_bps", self.pro_bonus_bps),
            ("elite_bonus_bps", self.elite_bonus_bps),
            ("streak_bonus_per_step_bps", self.streak_bonus_per_step_bps),
            ("max_streak_bonus_bps", self.max_streak_bonus_bps),
        ];
        for (name, value) in rates {
            if !(0..=BPS_DENOMINATOR).contains(&value) {
                return Err(format!("yield_rates.{} must be within 0..=10000, got {}", name, value));
            }
        }
        if self.streak_step_days == 0 {
            return Err("yield_rates.streak_step_days must be positive".to_string());
        }
        if self.daily_cap < 0 {
            return Err(format!("yield_rates.daily_cap must be non-negative, got {}", self.daily_cap));
        }
        Ok(())
    }
}

/// One inactivity bracket: applies from `min_days_inactive` upwards until the
/// next bracket starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyBracket {
    pub min_days_inactive: i64,
    pub rate_bps: i64,
}

/// Inactivity penalty rates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyRates {
    /// Days of inactivity tolerated without penalty. Default: 1
    pub grace_days: i64,
    /// Brackets in ascending `min_days_inactive` order.
    /// Default: 2-3 days 1%, 4-7 days 2%, 8+ days 5%
    pub brackets: Vec<PenaltyBracket>,
    /// Share of the balance exempt from penalties. Default: 2000 bps (20%)
    pub protected_share_bps: i64,
}

impl Default for PenaltyRates {
    fn default() -> Self {
        Self {
            grace_days: 1,
            brackets: vec![
                PenaltyBracket {
                    min_days_inactive: 2,
                    rate_bps: 100,
                },
                PenaltyBracket {
                    min_days_inactive: 4,
                    rate_bps: 200,
                },
                PenaltyBracket {
                    min_days_inactive: 8,
                    rate_bps: 500,
                },
            ],
            protected_share_bps: DEFAULT_PROTECTED_SHARE_BPS,
        }
    }
}

impl PenaltyRates {
    /// Penalty rate for a number of inactive days (0 inside the grace period)
    ///
    /// # Example
    /// ```
    /// use btz_ledger_core::accrual::PenaltyRates;
    ///
    /// let rates = PenaltyRates::default();
    /// assert_eq!(rates.rate_for(1), 0);
    /// assert_eq!(rates.rate_for(3), 100);
    /// assert_eq!(rates.rate_for(7), 200);
    /// assert_eq!(rates.rate_for(30), 500);
    /// ```
    pub fn rate_for(&self, days_inactive: i64) -> i64 {
        if days_inactive <= self.grace_days {
            return 0;
        }
        self.brackets
            .iter()
            .rev()
            .find(|b| days_inactive >= b.min_days_inactive)
            .map_or(0, |b| b.rate_bps)
    }

    /// First day count that can be penalized
    pub fn threshold_days(&self) -> i64 {
        self.grace_days + 1
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.grace_days < 0 {
            return Err("penalty_rates.grace_days must be non-negative".to_string());
        }
        if !(0..=BPS_DENOMINATOR).contains(&self.protected_share_bps) {
            return Err(format!(
                "penalty_rates.protected_share_bps must be within 0..=10000, got {}",
                self.protected_share_bps
            ));
        }
        let mut previous: Option<i64> = None;
        for bracket in &self.brackets {
            if !(0..=BPS_DENOMINATOR).contains(&bracket.rate_bps) {
                return Err(format!(
                    "penalty bracket rate must be within 0..=10000, got {}",
                    bracket.rate_bps
                ));
            }
            if previous.is_some_and(|p| bracket.min_days_inactive <= p) {
                return Err("penalty brackets must be in ascending order".to_string());
            }
            previous = Some(bracket.min_days_inactive);
        }
        Ok(())
    }
}
