//! Type conversion utilities for FFI boundary
//!
//! Converts ledger results into Python dicts and ledger errors into Python
//! exceptions.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::accrual::{AccrualError, PenaltyResult, SweepReport, YieldResult};
use crate::models::account::Account;
use crate::models::duel::{AnswerReceipt, Duel, DuelSettlement};
use crate::models::transfer::Transfer;
use crate::orchestrator::LedgerError;
use crate::payments::{PaymentCredit, PaymentError};
use crate::settlement::{TransferError, WagerError};
use crate::store::StoreError;

/// Map a ledger error onto a Python exception
///
/// Caller mistakes (bad amounts, unknown ids, insufficient funds, invalid
/// state transitions) raise `ValueError`; everything else `RuntimeError`.
pub fn to_py_err(err: LedgerError) -> PyErr {
    let is_validation = match &err {
        LedgerError::InvalidConfig(_) | LedgerError::ConfigMismatch { .. } => true,
        LedgerError::Store(e) => is_store_validation(e),
        LedgerError::Accrual(AccrualError::AlreadyProcessedToday { .. }) => true,
        LedgerError::Accrual(AccrualError::Store(e)) => is_store_validation(e),
        LedgerError::Wager(WagerError::ConcurrentModification(_)) => false,
        LedgerError::Wager(WagerError::Store(e)) => is_store_validation(e),
        LedgerError::Wager(_) => true,
        LedgerError::Transfer(TransferError::Store(e)) => is_store_validation(e),
        LedgerError::Transfer(_) => true,
        LedgerError::Payment(PaymentError::ConcurrentModification) => false,
        LedgerError::Payment(PaymentError::Store(e)) => is_store_validation(e),
        LedgerError::Payment(_) => true,
        _ => false,
    };
    if is_validation {
        PyValueError::new_err(err.to_string())
    } else {
        PyRuntimeError::new_err(err.to_string())
    }
}

fn is_store_validation(err: &StoreError) -> bool {
    !matches!(
        err,
        StoreError::ConcurrentModification(_) | StoreError::SupplyOverflow
    )
}

/// Convert Account to Python dict
pub fn account_to_py(py: Python, account: &Account) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("id", account.id())?;
    dict.set_item("balance", account.balance())?;
    dict.set_item("protected_balance", account.protected_balance())?;
    dict.set_item("experience_points", account.experience_points())?;
    dict.set_item("consecutive_active_days", account.consecutive_active_days())?;
    dict.set_item("last_activity_date", account.last_activity_date().to_string())?;
    dict.set_item("subscription_tier", account.subscription_tier().to_string())?;
    Ok(dict.into())
}

/// Convert YieldResult to Python dict
pub fn yield_result_to_py(py: Python, result: &YieldResult) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("account_id", &result.account_id)?;
    dict.set_item("date", result.date.to_string())?;
    dict.set_item("base_amount", result.base_amount)?;
    dict.set_item("bonus_amount", result.bonus_amount)?;
    dict.set_item("total_requested", result.total_requested)?;
    dict.set_item("applied_amount", result.applied_amount)?;
    dict.set_item("was_capped", result.was_capped)?;
    dict.set_item("effective_rate_bps", result.effective_rate_bps)?;
    dict.set_item("balance_after", result.balance_after)?;
    Ok(dict.into())
}

/// Convert PenaltyResult to Python dict
pub fn penalty_result_to_py(py: Python, result: &PenaltyResult) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("account_id", &result.account_id)?;
    dict.set_item("date", result.date.to_string())?;
    dict.set_item("days_inactive", result.days_inactive)?;
    dict.set_item("penalty_rate_bps", result.penalty_rate_bps)?;
    dict.set_item("protected_balance", result.protected_balance)?;
    dict.set_item("unprotected_balance", result.unprotected_balance)?;
    dict.set_item("penalty_amount", result.penalty_amount)?;
    dict.set_item("balance_after", result.balance_after)?;
    Ok(dict.into())
}

/// Convert SweepReport to Python dict
pub fn sweep_report_to_py(py: Python, report: &SweepReport) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("kind", report.kind.to_string())?;
    dict.set_item("date", report.date.to_string())?;
    dict.set_item("examined", report.examined)?;
    dict.set_item("processed", report.processed)?;
    dict.set_item("already_processed", report.already_processed)?;
    dict.set_item("ineligible", report.ineligible)?;
    dict.set_item("total_amount", report.total_amount)?;
    dict.set_item("next_cursor", report.next_cursor.clone())?;

    let failures = PyList::empty(py);
    for failure in &report.failures {
        let item = PyDict::new(py);
        item.set_item("account_id", &failure.account_id)?;
        item.set_item("error", &failure.error)?;
        failures.append(item)?;
    }
    dict.set_item("failures", failures)?;
    Ok(dict.into())
}

/// Convert Transfer to Python dict
pub fn transfer_to_py(py: Python, transfer: &Transfer) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("id", transfer.id())?;
    dict.set_item("sender_id", transfer.sender_id())?;
    dict.set_item("receiver_id", transfer.receiver_id())?;
    dict.set_item("amount", transfer.amount())?;
    dict.set_item("created_at", transfer.created_at().to_rfc3339())?;
    dict.set_item("sender_balance_after", transfer.sender_balance_after())?;
    dict.set_item("receiver_balance_after", transfer.receiver_balance_after())?;
    Ok(dict.into())
}

/// Convert PaymentCredit to Python dict
pub fn payment_credit_to_py(py: Python, credit: &PaymentCredit) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("external_payment_id", &credit.receipt.external_payment_id)?;
    dict.set_item("account_id", &credit.receipt.account_id)?;
    dict.set_item("amount", credit.receipt.amount)?;
    dict.set_item("balance_after", credit.receipt.balance_after)?;
    dict.set_item("credited_at", credit.receipt.credited_at.to_rfc3339())?;
    dict.set_item("duplicate", credit.duplicate)?;
    Ok(dict.into())
}

/// Convert Duel to Python dict
pub fn duel_to_py(py: Python, duel: &Duel) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("id", duel.id())?;
    dict.set_item("player1_id", duel.player1_id())?;
    dict.set_item("player2_id", duel.player2_id())?;
    dict.set_item("bet_amount", duel.bet_amount())?;
    dict.set_item("status", format!("{:?}", duel.status()).to_lowercase())?;
    dict.set_item("player1_score", duel.player1_score())?;
    dict.set_item("player2_score", duel.player2_score())?;
    dict.set_item("winner_id", duel.winner_id())?;
    dict.set_item("question_count", duel.questions().len())?;
    dict.set_item("created_at", duel.created_at().to_rfc3339())?;
    dict.set_item("completed_at", duel.completed_at().map(|t| t.to_rfc3339()))?;
    Ok(dict.into())
}

/// Convert DuelSettlement to Python dict
pub fn settlement_to_py(py: Python, settlement: &DuelSettlement) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("duel_id", &settlement.duel_id)?;
    dict.set_item("winner_id", settlement.outcome.winner_id())?;
    dict.set_item("player1_score", settlement.player1_score)?;
    dict.set_item("player2_score", settlement.player2_score)?;
    dict.set_item("pot", settlement.pot)?;

    let payouts = PyList::empty(py);
    for payout in &settlement.payouts {
        let item = PyDict::new(py);
        item.set_item("account_id", &payout.account_id)?;
        item.set_item("amount", payout.amount)?;
        item.set_item("kind", format!("{:?}", payout.kind).to_lowercase())?;
        payouts.append(item)?;
    }
    dict.set_item("payouts", payouts)?;
    Ok(dict.into())
}

/// Convert AnswerReceipt to Python dict
pub fn answer_receipt_to_py(py: Python, receipt: &AnswerReceipt) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("duel_id", &receipt.duel_id)?;
    dict.set_item("player_id", &receipt.player_id)?;
    dict.set_item("question_index", receipt.question_index)?;
    dict.set_item("correct", receipt.correct)?;
    dict.set_item("score", receipt.score)?;
    dict.set_item("all_answered", receipt.all_answered)?;
    match &receipt.settlement {
        Some(settlement) => dict.set_item("settlement", settlement_to_py(py, settlement)?)?,
        None => dict.set_item("settlement", py.None())?,
    }
    Ok(dict.into())
}
