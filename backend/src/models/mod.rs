//! Domain models for the BTZ ledger

pub mod account;
pub mod duel;
pub mod event;
pub mod transfer;

// Re-exports
pub use account::{Account, AccountError, SubscriptionTier};
pub use duel::{
    AnswerReceipt, Duel, DuelError, DuelOutcome, DuelSettlement, DuelStatus, Payout, PayoutKind,
    Question, MAX_BET_AMOUNT,
};
pub use event::{AuditEntry, AuditLog, AuditReason};
pub use transfer::Transfer;
