//! Daily accrual engines
//!
//! - **yield_engine**: daily reward credited on balances
//! - **penalty**: decay of inactive balances above the protected floor
//! - **sweep**: resumable batch passes applying either engine to every account
//!
//! Both engines are idempotent per account per UTC day, which is what makes
//! sweeps safe to re-run after a crash: an account already handled today is
//! reported as such and skipped.

pub mod penalty;
pub mod rates;
pub mod sweep;
pub mod yield_engine;

pub use penalty::{apply_inactivity_penalty, compute_penalty, is_penalty_eligible, PenaltyResult};
pub use rates::{PenaltyBracket, PenaltyRates, YieldRates};
pub use sweep::{run_sweep, SweepFailure, SweepReport};
pub use yield_engine::{apply_daily_yield, compute_yield, YieldResult};

use crate::store::{Retryable, StoreError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which daily engine an operation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccrualKind {
    Yield,
    Penalty,
}

impl std::fmt::Display for AccrualKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccrualKind::Yield => write!(f, "yield"),
            AccrualKind::Penalty => write!(f, "penalty"),
        }
    }
}

/// Errors that can occur while applying yield or penalties
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccrualError {
    #[error("Account {account_id} already processed for {kind} on {date}")]
    AlreadyProcessedToday {
        account_id: String,
        date: NaiveDate,
        kind: AccrualKind,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Retryable for AccrualError {
    fn is_retryable(&self) -> bool {
        matches!(self, AccrualError::Store(e) if e.is_retryable())
    }
}
