//! Settlement Module
//!
//! The two engines that move money between two accounts at once:
//! - **duel**: escrow of both stakes at creation, one-time payout at the end
//! - **transfer**: direct peer-to-peer transfers
//!
//! # Critical Invariants
//!
//! 1. **Atomicity**: both legs of a two-account movement are applied together
//!    or not at all
//! 2. **Conservation**: the total balance across the two accounts is unchanged
//!    by a transfer, and a duel pays out exactly what it escrowed
//! 3. **Deadlock freedom**: account locks are always taken in ascending id order

pub mod duel;
pub mod transfer;

// Re-export public API
pub use duel::{
    abandon_duel, complete_duel, create_duel, record_answer, DuelBook, DuelLock, WagerError,
};
pub use transfer::{execute_transfer, TransferError, TransferJournal};
