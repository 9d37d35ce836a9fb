//! `btz-ledger` command line tool.
//!
//! Operates on a checkpoint file: every command loads the ledger, runs one
//! operation, prints the result as JSON and writes the checkpoint back.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use btz_ledger_core::{
    AccrualKind, Clock, FixedClock, Ledger, LedgerConfig, SubscriptionTier, SystemClock,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

/// `btz-ledger` command arguments.
#[derive(Debug, Parser)]
#[command(name = "btz-ledger", about = "Operate a BTZ ledger checkpoint", version)]
struct CliArgs {
    /// Ledger checkpoint file.
    #[arg(long, value_name = "path", default_value = "ledger.json")]
    state: PathBuf,
    /// JSON ledger configuration. Defaults apply when omitted.
    #[arg(long, value_name = "path")]
    config: Option<PathBuf>,
    /// Treat this date as today (UTC), e.g. to replay a missed sweep.
    #[arg(long, value_name = "YYYY-MM-DD")]
    date: Option<NaiveDate>,
    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an empty ledger checkpoint.
    Init {
        /// Overwrite an existing checkpoint.
        #[arg(long)]
        force: bool,
    },
    /// Open a new account.
    OpenAccount {
        account_id: String,
        #[arg(long, default_value_t = 0)]
        balance: i64,
        #[arg(long, default_value = "free")]
        tier: SubscriptionTier,
    },
    /// Show an account.
    Balance { account_id: String },
    /// Record a login for the account.
    Activity { account_id: String },
    /// Transfer BTZ between two accounts.
    Transfer {
        sender_id: String,
        receiver_id: String,
        amount: i64,
    },
    /// Credit a confirmed external payment.
    CreditPayment {
        account_id: String,
        amount: i64,
        #[arg(long = "payment-id", value_name = "id")]
        payment_id: String,
    },
    /// Apply today's yield to every account.
    SweepYield,
    /// Apply today's inactivity penalty to every eligible account.
    SweepPenalty,
    /// Show an account's audit trail and reconciliation.
    Audit { account_id: String },
}

fn main() -> io::Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.json_logs);

    let config = load_config(args.config.as_deref())?;
    let clock: Arc<dyn Clock> = match args.date {
        Some(date) => Arc::new(FixedClock::at_date(date)),
        None => Arc::new(SystemClock),
    };

    if let Command::Init { force } = args.command {
        if args.state.exists() && !force {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("'{}' already exists, pass --force to overwrite", args.state.display()),
            ));
        }
        let ledger = Ledger::with_clock(config, clock).map_err(ledger_error("create ledger"))?;
        save(&ledger, &args.state)?;
        return print(&json!({ "state": args.state, "config_hash": ledger.config_hash() }));
    }

    let ledger = Ledger::load_checkpoint(config, clock, &args.state)
        .map_err(ledger_error("load checkpoint"))?;
    debug!(state = %args.state.display(), today = %ledger.today(), "ledger loaded");

    match args.command {
        // handled before loading
        Command::Init { .. } => Ok(()),
        Command::OpenAccount {
            account_id,
            balance,
            tier,
        } => {
            let account = ledger
                .open_account(&account_id, balance, tier)
                .map_err(ledger_error("open account"))?;
            save(&ledger, &args.state)?;
            print(&account)
        }
        Command::Balance { account_id } => {
            let account = ledger.account(&account_id).map_err(ledger_error("read account"))?;
            print(&json!({
                "account": account,
                "protected_balance": account.protected_balance(),
            }))
        }
        Command::Activity { account_id } => {
            let account = ledger
                .record_login(&account_id)
                .map_err(ledger_error("record activity"))?;
            save(&ledger, &args.state)?;
            print(&account)
        }
        Command::Transfer {
            sender_id,
            receiver_id,
            amount,
        } => {
            let transfer = ledger
                .transfer(&sender_id, &receiver_id, amount)
                .map_err(ledger_error("transfer"))?;
            save(&ledger, &args.state)?;
            print(&transfer)
        }
        Command::CreditPayment {
            account_id,
            amount,
            payment_id,
        } => {
            let credit = ledger
                .credit_from_payment(&account_id, amount, &payment_id)
                .map_err(ledger_error("credit payment"))?;
            save(&ledger, &args.state)?;
            print(&credit)
        }
        Command::SweepYield => {
            let reports = ledger
                .run_full_sweep(AccrualKind::Yield)
                .map_err(ledger_error("yield sweep"))?;
            save(&ledger, &args.state)?;
            print(&reports)
        }
        Command::SweepPenalty => {
            let reports = ledger
                .run_full_sweep(AccrualKind::Penalty)
                .map_err(ledger_error("penalty sweep"))?;
            save(&ledger, &args.state)?;
            print(&reports)
        }
        Command::Audit { account_id } => {
            let trail = ledger
                .audit_trail(&account_id)
                .map_err(ledger_error("read audit trail"))?;
            let reconciliation = ledger
                .reconcile(&account_id)
                .map_err(ledger_error("reconcile"))?;
            print(&json!({
                "account_id": account_id,
                "balance": reconciliation.balance,
                "audited_balance": reconciliation.audited_balance,
                "consistent": reconciliation.is_consistent(),
                "entries": trail,
            }))
        }
    }
}

fn init_tracing(json: bool) {
    let builder = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(error) = result {
        eprintln!("tracing init failed: {error}");
    }
}

fn load_config(path: Option<&Path>) -> io::Result<LedgerConfig> {
    let Some(path) = path else {
        return Ok(LedgerConfig::default());
    };
    let raw = fs::read_to_string(path).map_err(|error| {
        io::Error::other(format!("read config '{}': {error}", path.display()))
    })?;
    LedgerConfig::from_json(&raw).map_err(ledger_error("parse config"))
}

fn save(ledger: &Ledger, path: &Path) -> io::Result<()> {
    ledger
        .save_checkpoint(path)
        .map_err(ledger_error("save checkpoint"))
}

fn print<T: Serialize>(value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|error| io::Error::other(format!("encode output: {error}")))?;
    println!("{json}");
    Ok(())
}

fn ledger_error(context: &'static str) -> impl Fn(btz_ledger_core::LedgerError) -> io::Error {
    move |error| io::Error::other(format!("{context}: {error}"))
}
