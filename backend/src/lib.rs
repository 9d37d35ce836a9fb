//! BTZ Ledger Core - Rust Engine
//!
//! Authoritative ledger and settlement engine for the BTZ virtual currency.
//!
//! # Architecture
//!
//! - **core**: Clock abstraction and calendar-day helpers
//! - **models**: Domain types (Account, Duel, Transfer, AuditLog)
//! - **store**: Balance Store, the only writer of account balances
//! - **accrual**: Daily yield, inactivity penalty and batch sweeps
//! - **settlement**: Duel escrow/settlement and P2P transfers
//! - **payments**: Idempotent credits from the external payment provider
//! - **orchestrator**: The `Ledger` facade, configuration and checkpoints
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (smallest BTZ unit), rates are integer bps
//! 2. No account balance is ever negative
//! 3. Every balance change has exactly one audit entry
//! 4. Two-account operations lock accounts in ascending id order

// Module declarations
pub mod accrual;
pub mod core;
pub mod models;
pub mod orchestrator;
pub mod payments;
pub mod settlement;
pub mod store;

// Re-exports for convenience
pub use accrual::{AccrualError, AccrualKind, PenaltyResult, SweepReport, YieldResult};
pub use core::time::{Clock, FixedClock, SystemClock};
pub use models::{
    account::{Account, AccountError, SubscriptionTier},
    duel::{
        Duel, DuelError, DuelOutcome, DuelSettlement, DuelStatus, Question, MAX_BET_AMOUNT,
    },
    event::{AuditEntry, AuditLog, AuditReason},
    transfer::Transfer,
};
pub use orchestrator::{Ledger, LedgerConfig, LedgerError, LedgerSnapshot};
pub use payments::{PaymentBridge, PaymentCredit, PaymentError, PaymentReceipt};
pub use settlement::{TransferError, WagerError};
pub use store::{AccountHold, BalanceStore, RetryPolicy, StoreError};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn btz_ledger_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::ledger::PyLedger>()?;
    Ok(())
}
