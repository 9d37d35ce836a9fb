//! Python bindings (enabled with the `pyo3` feature)

pub mod ledger;
pub mod types;

pub use ledger::PyLedger;
