//! PyO3 wrapper for the Ledger
//!
//! This module provides the Python interface to the Rust ledger.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use super::types::{
    account_to_py, answer_receipt_to_py, duel_to_py, payment_credit_to_py, penalty_result_to_py,
    settlement_to_py, sweep_report_to_py, to_py_err, transfer_to_py, yield_result_to_py,
};
use crate::models::account::SubscriptionTier;
use crate::models::duel::Question;
use crate::orchestrator::{Ledger as RustLedger, LedgerConfig};

/// Python wrapper for the Rust Ledger
///
/// # Example (from Python)
///
/// ```python
/// from btz_ledger_core import Ledger
///
/// ledger = Ledger()
/// ledger.open_account("alice", 100, "free")
/// ledger.open_account("bob", 0, "pro")
/// ledger.transfer("alice", "bob", 30)
/// print(ledger.balance("bob"))  # 30
/// ```
#[pyclass(name = "Ledger")]
pub struct PyLedger {
    inner: RustLedger,
}

fn parse_tier(tier: &str) -> PyResult<SubscriptionTier> {
    tier.parse().map_err(PyValueError::new_err)
}

/// Questions arrive as `(prompt, options, correct_option)` tuples
fn parse_questions(questions: Vec<(String, Vec<String>, usize)>) -> Vec<Question> {
    questions
        .into_iter()
        .map(|(prompt, options, correct)| Question::new(prompt, options, correct))
        .collect()
}

#[pymethods]
impl PyLedger {
    /// Create a ledger, optionally from a JSON configuration string
    ///
    /// Raises ValueError if the configuration is invalid.
    #[new]
    #[pyo3(signature = (config_json=None))]
    fn new(config_json: Option<&str>) -> PyResult<Self> {
        let config = match config_json {
            Some(json) => LedgerConfig::from_json(json).map_err(to_py_err)?,
            None => LedgerConfig::default(),
        };
        let inner = RustLedger::new(config).map_err(to_py_err)?;
        Ok(PyLedger { inner })
    }

    /// Restore a ledger from a checkpoint file
    #[staticmethod]
    #[pyo3(signature = (path, config_json=None))]
    fn load(path: &str, config_json: Option<&str>) -> PyResult<Self> {
        let config = match config_json {
            Some(json) => LedgerConfig::from_json(json).map_err(to_py_err)?,
            None => LedgerConfig::default(),
        };
        let inner = RustLedger::load_checkpoint(
            config,
            std::sync::Arc::new(crate::core::time::SystemClock),
            path,
        )
        .map_err(to_py_err)?;
        Ok(PyLedger { inner })
    }

    fn open_account(
        &self,
        py: Python,
        account_id: &str,
        opening_balance: i64,
        tier: &str,
    ) -> PyResult<Py<PyDict>> {
        let account = self
            .inner
            .open_account(account_id, opening_balance, parse_tier(tier)?)
            .map_err(to_py_err)?;
        account_to_py(py, &account)
    }

    fn account(&self, py: Python, account_id: &str) -> PyResult<Py<PyDict>> {
        let account = self.inner.account(account_id).map_err(to_py_err)?;
        account_to_py(py, &account)
    }

    fn balance(&self, account_id: &str) -> PyResult<i64> {
        self.inner.balance(account_id).map_err(to_py_err)
    }

    /// Record a login for today
    fn record_login(&self, py: Python, account_id: &str) -> PyResult<Py<PyDict>> {
        let account = self.inner.record_login(account_id).map_err(to_py_err)?;
        account_to_py(py, &account)
    }

    fn set_subscription_tier(&self, account_id: &str, tier: &str) -> PyResult<()> {
        self.inner
            .set_subscription_tier(account_id, parse_tier(tier)?)
            .map_err(to_py_err)
    }

    fn apply_daily_yield(&self, py: Python, account_id: &str) -> PyResult<Py<PyDict>> {
        let result = self.inner.apply_daily_yield(account_id).map_err(to_py_err)?;
        yield_result_to_py(py, &result)
    }

    fn apply_inactivity_penalty(&self, py: Python, account_id: &str) -> PyResult<Py<PyDict>> {
        let result = self
            .inner
            .apply_inactivity_penalty(account_id)
            .map_err(to_py_err)?;
        penalty_result_to_py(py, &result)
    }

    #[pyo3(signature = (cursor=None))]
    fn run_yield_sweep(&self, py: Python, cursor: Option<&str>) -> PyResult<Py<PyDict>> {
        let report = self.inner.run_yield_sweep(cursor).map_err(to_py_err)?;
        sweep_report_to_py(py, &report)
    }

    #[pyo3(signature = (cursor=None))]
    fn run_penalty_sweep(&self, py: Python, cursor: Option<&str>) -> PyResult<Py<PyDict>> {
        let report = self.inner.run_penalty_sweep(cursor).map_err(to_py_err)?;
        sweep_report_to_py(py, &report)
    }

    fn transfer(
        &self,
        py: Python,
        sender_id: &str,
        receiver_id: &str,
        amount: i64,
    ) -> PyResult<Py<PyDict>> {
        let transfer = self
            .inner
            .transfer(sender_id, receiver_id, amount)
            .map_err(to_py_err)?;
        transfer_to_py(py, &transfer)
    }

    /// Transfers sent or received by an account, oldest first
    fn transfers_for(&self, py: Python, account_id: &str) -> PyResult<Py<PyList>> {
        let list = PyList::empty(py);
        for transfer in self.inner.transfers_for(account_id) {
            list.append(transfer_to_py(py, &transfer)?)?;
        }
        Ok(list.into())
    }

    fn credit_from_payment(
        &self,
        py: Python,
        account_id: &str,
        amount: i64,
        external_payment_id: &str,
    ) -> PyResult<Py<PyDict>> {
        let credit = self
            .inner
            .credit_from_payment(account_id, amount, external_payment_id)
            .map_err(to_py_err)?;
        payment_credit_to_py(py, &credit)
    }

    fn create_duel(
        &self,
        py: Python,
        player1_id: &str,
        player2_id: &str,
        bet_amount: i64,
        questions: Vec<(String, Vec<String>, usize)>,
    ) -> PyResult<Py<PyDict>> {
        let duel = self
            .inner
            .create_duel(player1_id, player2_id, bet_amount, parse_questions(questions))
            .map_err(to_py_err)?;
        duel_to_py(py, &duel)
    }

    fn record_answer(
        &self,
        py: Python,
        duel_id: &str,
        player_id: &str,
        question_index: usize,
        answer: usize,
    ) -> PyResult<Py<PyDict>> {
        let receipt = self
            .inner
            .record_answer(duel_id, player_id, question_index, answer)
            .map_err(to_py_err)?;
        answer_receipt_to_py(py, &receipt)
    }

    fn complete_duel(&self, py: Python, duel_id: &str) -> PyResult<Py<PyDict>> {
        let settlement = self.inner.complete_duel(duel_id).map_err(to_py_err)?;
        settlement_to_py(py, &settlement)
    }

    fn abandon_duel(
        &self,
        py: Python,
        duel_id: &str,
        abandoning_player: &str,
    ) -> PyResult<Py<PyDict>> {
        let settlement = self
            .inner
            .abandon_duel(duel_id, abandoning_player)
            .map_err(to_py_err)?;
        settlement_to_py(py, &settlement)
    }

    fn duel(&self, py: Python, duel_id: &str) -> PyResult<Py<PyDict>> {
        let duel = self.inner.duel(duel_id).map_err(to_py_err)?;
        duel_to_py(py, &duel)
    }

    /// Write a checkpoint file
    fn save_checkpoint(&self, path: &str) -> PyResult<()> {
        self.inner.save_checkpoint(path).map_err(to_py_err)
    }

    fn total_supply(&self) -> PyResult<i64> {
        self.inner.total_supply().map_err(to_py_err)
    }
}
