//! Scheduled sweeps
//!
//! A sweep walks accounts in ascending id order, one batch at a time, and
//! applies a per-account accrual. Per-account failures are logged and
//! recorded in the report; they never stop the sweep. The returned
//! `next_cursor` lets a scheduler resume exactly where the batch ended.

use super::{AccrualError, AccrualKind};
use crate::store::{BalanceStore, RetryPolicy};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One account the sweep could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub account_id: String,
    pub error: String,
}

/// Summary of one sweep batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub kind: AccrualKind,
    pub date: NaiveDate,
    /// Accounts looked at in this batch
    pub examined: usize,
    /// Accounts the accrual was applied to (including zero amounts)
    pub processed: usize,
    /// Accounts already handled earlier the same day
    pub already_processed: usize,
    /// Accounts not meeting the sweep's eligibility rule
    pub ineligible: usize,
    pub failures: Vec<SweepFailure>,
    /// Sum of credited (yield) or debited (penalty) amounts
    pub total_amount: i64,
    /// Resume point for the next batch; `None` once every account was seen
    pub next_cursor: Option<String>,
}

impl SweepReport {
    pub fn is_complete(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Run one sweep batch
///
/// `apply` returns `Ok(Some(amount))` when the accrual ran, `Ok(None)` when
/// the account is not eligible, or an error. Transient errors are retried
/// according to `retry` before being recorded as failures.
pub fn run_sweep<F>(
    store: &BalanceStore,
    kind: AccrualKind,
    cursor: Option<&str>,
    batch_size: usize,
    retry: &RetryPolicy,
    mut apply: F,
) -> SweepReport
where
    F: FnMut(&str) -> Result<Option<i64>, AccrualError>,
{
    let date = store.clock().today();
    let (ids, more) = store.account_ids_after(cursor, batch_size.max(1));

    let mut report = SweepReport {
        kind,
        date,
        examined: ids.len(),
        processed: 0,
        already_processed: 0,
        ineligible: 0,
        failures: Vec::new(),
        total_amount: 0,
        next_cursor: None,
    };

    for account_id in &ids {
        match retry.run("sweep", || apply(account_id.as_str())) {
            Ok(Some(amount)) => {
                report.processed += 1;
                report.total_amount = report.total_amount.saturating_add(amount);
            }
            Ok(None) => report.ineligible += 1,
            Err(AccrualError::AlreadyProcessedToday { .. }) => report.already_processed += 1,
            Err(e) => {
                warn!(%kind, account_id = %account_id, error = %e, "sweep skipped account");
                report.failures.push(SweepFailure {
                    account_id: account_id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    if more {
        report.next_cursor = ids.last().cloned();
    }

    info!(
        %kind,
        %date,
        examined = report.examined,
        processed = report.processed,
        already_processed = report.already_processed,
        failed = report.failures.len(),
        total_amount = report.total_amount,
        complete = report.is_complete(),
        "sweep batch finished"
    );

    report
}
