//! Orchestrator - the ledger facade
//!
//! Owns every component and exposes the complete operation surface.
//!
//! See `engine.rs` for the facade and `checkpoint.rs` for persistence.

pub mod checkpoint;
pub mod engine;

// Re-export main types for convenience
pub use engine::{Ledger, LedgerConfig, LedgerError};

// Re-export checkpoint types
pub use checkpoint::{compute_config_hash, validate_snapshot, LedgerSnapshot};
