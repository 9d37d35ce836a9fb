//! Duel Escrow & Settlement Tests
//!
//! Escrow at creation, scoring, settlement, abandonment, rollback of a
//! one-sided escrow and exactly-once settlement.

use btz_ledger_core::{
    AuditReason, DuelError, DuelOutcome, DuelStatus, FixedClock, Ledger, LedgerConfig,
    LedgerError, Question, RetryPolicy, StoreError, SubscriptionTier, WagerError,
    MAX_BET_AMOUNT,
};
use chrono::NaiveDate;
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn create_ledger(balances: &[(&str, i64)]) -> Ledger {
    let clock = Arc::new(FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()));
    let ledger = Ledger::with_clock(LedgerConfig::default(), clock).unwrap();
    for (id, balance) in balances {
        ledger.open_account(id, *balance, SubscriptionTier::Free).unwrap();
    }
    ledger
}

/// `count` questions whose correct answer is option 0
fn questions(count: usize) -> Vec<Question> {
    (0..count)
        .map(|i| {
            Question::new(
                format!("Question {}", i + 1),
                vec!["right".to_string(), "wrong".to_string()],
                0,
            )
        })
        .collect()
}

/// Answer every question, getting the first `correct` of them right
fn answer_all(ledger: &Ledger, duel_id: &str, player: &str, total: usize, correct: usize) {
    for index in 0..total {
        let answer = if index < correct { 0 } else { 1 };
        ledger.record_answer(duel_id, player, index, answer).unwrap();
    }
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn test_create_duel_escrows_both_bets() {
    let ledger = create_ledger(&[("p1", 100), ("p2", 100)]);
    let duel = ledger.create_duel("p1", "p2", 50, questions(3)).unwrap();

    assert_eq!(duel.status(), DuelStatus::Active);
    assert_eq!(duel.pot(), 100);
    assert_eq!(ledger.balance("p1").unwrap(), 50);
    assert_eq!(ledger.balance("p2").unwrap(), 50);
    assert_eq!(ledger.active_duels_for("p1").unwrap().len(), 1);

    let escrow = ledger
        .audit_trail("p2")
        .unwrap()
        .into_iter()
        .filter(|e| e.reason == AuditReason::DuelEscrow { duel_id: duel.id().to_string() })
        .count();
    assert_eq!(escrow, 1);
}

#[test]
fn test_failed_second_debit_rolls_back_first() {
    let ledger = create_ledger(&[("p1", 100), ("p2", 20)]);

    let err = ledger.create_duel("p1", "p2", 50, questions(3)).unwrap_err();
    match err {
        LedgerError::Wager(WagerError::InsufficientFunds {
            account_id,
            required,
            available,
        }) => {
            assert_eq!(account_id, "p2");
            assert_eq!(required, 50);
            assert_eq!(available, 20);
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }

    assert_eq!(ledger.balance("p1").unwrap(), 100);
    assert_eq!(ledger.balance("p2").unwrap(), 20);
    assert!(ledger.active_duels_for("p1").unwrap().is_empty());

    let trail = ledger.audit_trail("p1").unwrap();
    assert!(matches!(trail[1].reason, AuditReason::DuelEscrow { .. }));
    assert!(matches!(trail[2].reason, AuditReason::DuelEscrowRollback { .. }));
    assert!(ledger.reconcile("p1").unwrap().is_consistent());
}

#[test]
fn test_creation_validation() {
    let ledger = create_ledger(&[("p1", 100), ("p2", 100)]);

    assert!(matches!(
        ledger.create_duel("p1", "p2", 0, questions(1)),
        Err(LedgerError::Wager(WagerError::InvalidAmount { amount: 0 }))
    ));
    assert!(matches!(
        ledger.create_duel("p1", "p1", 10, questions(1)),
        Err(LedgerError::Wager(WagerError::SamePlayer(_)))
    ));
    assert!(matches!(
        ledger.create_duel("p1", "p2", 10, Vec::new()),
        Err(LedgerError::Wager(WagerError::EmptyQuestionSet))
    ));
    assert!(matches!(
        ledger.create_duel("p1", "ghost", 10, questions(1)),
        Err(LedgerError::Wager(WagerError::AccountNotFound(_)))
    ));
    assert_eq!(ledger.total_supply().unwrap(), 200);
}

// ============================================================================
// Settlement
// ============================================================================

#[test]
fn test_six_to_four_winner_takes_pot() {
    let ledger = create_ledger(&[("p1", 100), ("p2", 100)]);
    let duel = ledger.create_duel("p1", "p2", 50, questions(8)).unwrap();

    answer_all(&ledger, duel.id(), "p1", 8, 6);
    for index in 0..7 {
        let answer = if index < 4 { 0 } else { 1 };
        let receipt = ledger.record_answer(duel.id(), "p2", index, answer).unwrap();
        assert!(receipt.settlement.is_none());
    }
    let last = ledger.record_answer(duel.id(), "p2", 7, 1).unwrap();
    assert!(last.all_answered);
    let settlement = last.settlement.expect("last answer settles the duel");

    assert_eq!(
        settlement.outcome,
        DuelOutcome::Win {
            winner_id: "p1".to_string()
        }
    );
    assert_eq!(settlement.player1_score, 6);
    assert_eq!(settlement.player2_score, 4);
    assert_eq!(settlement.total_paid(), 100);

    assert_eq!(ledger.balance("p1").unwrap(), 150);
    assert_eq!(ledger.balance("p2").unwrap(), 50);

    let stored = ledger.duel(duel.id()).unwrap();
    assert_eq!(stored.status(), DuelStatus::Completed);
    assert_eq!(stored.winner_id(), Some("p1"));
    assert!(stored.completed_at().is_some());
}

#[test]
fn test_tie_refunds_both_players() {
    let ledger = create_ledger(&[("p1", 100), ("p2", 100)]);
    let duel = ledger.create_duel("p1", "p2", 40, questions(2)).unwrap();

    answer_all(&ledger, duel.id(), "p1", 2, 1);
    answer_all(&ledger, duel.id(), "p2", 2, 1);

    let stored = ledger.duel(duel.id()).unwrap();
    assert_eq!(stored.status(), DuelStatus::Completed);
    assert_eq!(stored.winner_id(), None);
    assert_eq!(ledger.balance("p1").unwrap(), 100);
    assert_eq!(ledger.balance("p2").unwrap(), 100);
}

#[test]
fn test_complete_twice_returns_same_settlement() {
    let ledger = create_ledger(&[("p1", 100), ("p2", 100)]);
    let duel = ledger.create_duel("p1", "p2", 25, questions(3)).unwrap();
    ledger.record_answer(duel.id(), "p2", 0, 0).unwrap();

    let first = ledger.complete_duel(duel.id()).unwrap();
    let balances = (ledger.balance("p1").unwrap(), ledger.balance("p2").unwrap());
    let audit_len = ledger.audit_log().unwrap().len();

    let second = ledger.complete_duel(duel.id()).unwrap();
    assert_eq!(first, second);
    assert_eq!(balances, (75, 125));
    assert_eq!(
        (ledger.balance("p1").unwrap(), ledger.balance("p2").unwrap()),
        balances
    );
    assert_eq!(ledger.audit_log().unwrap().len(), audit_len);
}

#[test]
fn test_answers_rejected_after_settlement() {
    let ledger = create_ledger(&[("p1", 100), ("p2", 100)]);
    let duel = ledger.create_duel("p1", "p2", 10, questions(2)).unwrap();
    ledger.complete_duel(duel.id()).unwrap();

    assert!(matches!(
        ledger.record_answer(duel.id(), "p1", 0, 0),
        Err(LedgerError::Wager(WagerError::Duel(DuelError::DuelNotActive { .. })))
    ));
}

#[test]
fn test_answer_validation() {
    let ledger = create_ledger(&[("p1", 100), ("p2", 100), ("p3", 100)]);
    let duel = ledger.create_duel("p1", "p2", 10, questions(2)).unwrap();

    assert!(matches!(
        ledger.record_answer(duel.id(), "p3", 0, 0),
        Err(LedgerError::Wager(WagerError::Duel(DuelError::NotAParticipant { .. })))
    ));
    assert!(matches!(
        ledger.record_answer(duel.id(), "p1", 5, 0),
        Err(LedgerError::Wager(WagerError::Duel(DuelError::InvalidQuestionIndex {
            index: 5,
            count: 2
        })))
    ));
    assert!(matches!(
        ledger.record_answer(duel.id(), "p1", 1, 0),
        Err(LedgerError::Wager(WagerError::Duel(DuelError::OutOfOrderAnswer {
            expected: 0,
            got: 1
        })))
    ));
    assert!(matches!(
        ledger.record_answer("missing", "p1", 0, 0),
        Err(LedgerError::Wager(WagerError::DuelNotFound(_)))
    ));
}

// ============================================================================
// Abandonment
// ============================================================================

#[test]
fn test_abandon_awards_pot_to_remaining_player() {
    let ledger = create_ledger(&[("p1", 100), ("p2", 100)]);
    let duel = ledger.create_duel("p1", "p2", 30, questions(5)).unwrap();
    ledger.record_answer(duel.id(), "p2", 0, 0).unwrap();

    let settlement = ledger.abandon_duel(duel.id(), "p2").unwrap();
    assert_eq!(
        settlement.outcome,
        DuelOutcome::Forfeit {
            winner_id: "p1".to_string(),
            abandoned_by: "p2".to_string(),
        }
    );
    assert_eq!(settlement.paid_to("p1"), 60);
    assert_eq!(settlement.paid_to("p2"), 0);
    assert_eq!(ledger.balance("p1").unwrap(), 130);
    assert_eq!(ledger.balance("p2").unwrap(), 70);

    let stored = ledger.duel(duel.id()).unwrap();
    assert_eq!(stored.status(), DuelStatus::Abandoned);
    assert_eq!(stored.winner_id(), Some("p1"));
}

#[test]
fn test_abandon_rules() {
    let ledger = create_ledger(&[("p1", 100), ("p2", 100), ("p3", 100)]);
    let duel = ledger.create_duel("p1", "p2", 30, questions(5)).unwrap();

    assert!(matches!(
        ledger.abandon_duel(duel.id(), "p3"),
        Err(LedgerError::Wager(WagerError::Duel(DuelError::NotAParticipant { .. })))
    ));

    ledger.abandon_duel(duel.id(), "p1").unwrap();
    assert!(matches!(
        ledger.abandon_duel(duel.id(), "p2"),
        Err(LedgerError::Wager(WagerError::Duel(DuelError::DuelNotActive { .. })))
    ));
    assert!(matches!(
        ledger.complete_duel(duel.id()),
        Err(LedgerError::Wager(WagerError::Duel(DuelError::DuelNotActive {
            status: DuelStatus::Abandoned,
            ..
        })))
    ));
    assert_eq!(ledger.balance("p2").unwrap(), 130);
}

#[test]
fn test_bet_whose_pot_overflows_is_rejected() {
    let ledger = create_ledger(&[("p1", i64::MAX), ("p2", i64::MAX)]);

    let err = ledger
        .create_duel("p1", "p2", MAX_BET_AMOUNT + 1, questions(1))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Wager(WagerError::InvalidAmount { amount }) if amount == MAX_BET_AMOUNT + 1
    ));
    assert_eq!(ledger.balance("p1").unwrap(), i64::MAX);
    assert_eq!(ledger.balance("p2").unwrap(), i64::MAX);
    assert!(ledger.active_duels_for("p1").unwrap().is_empty());

    // The largest allowed bet escrows and settles without losing anything
    let duel = ledger
        .create_duel("p1", "p2", MAX_BET_AMOUNT, questions(1))
        .unwrap();
    assert_eq!(duel.pot(), MAX_BET_AMOUNT * 2);
    ledger.record_answer(duel.id(), "p1", 0, 0).unwrap();
    let receipt = ledger.record_answer(duel.id(), "p2", 0, 0).unwrap();
    assert_eq!(receipt.settlement.unwrap().outcome, DuelOutcome::Tie);
    assert_eq!(ledger.balance("p1").unwrap(), i64::MAX);
    assert_eq!(ledger.balance("p2").unwrap(), i64::MAX);
    assert!(matches!(
        ledger.total_supply(),
        Err(LedgerError::Store(StoreError::SupplyOverflow))
    ));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_blocked_final_settlement_is_deferred() {
    let config = LedgerConfig {
        retry: RetryPolicy::no_retry(),
        lock_timeout_ms: 1,
        ..LedgerConfig::default()
    };
    let clock = Arc::new(FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()));
    let ledger = Ledger::with_clock(config, clock).unwrap();
    ledger.open_account("p1", 100, SubscriptionTier::Free).unwrap();
    ledger.open_account("p2", 100, SubscriptionTier::Free).unwrap();

    let duel = ledger.create_duel("p1", "p2", 50, questions(1)).unwrap();
    ledger.record_answer(duel.id(), "p2", 0, 1).unwrap();

    let hold = ledger.hold_account("p1").unwrap();
    assert_eq!(hold.account().balance(), 50);
    let receipt = ledger.record_answer(duel.id(), "p1", 0, 0).unwrap();
    assert!(receipt.all_answered);
    assert!(receipt.settlement.is_none());
    assert_eq!(ledger.balance("p2").unwrap(), 50);
    drop(hold);

    // The answer was kept and no money moved
    let stored = ledger.duel(duel.id()).unwrap();
    assert_eq!(stored.status(), DuelStatus::Active);
    assert_eq!(stored.player1_score(), 1);
    assert_eq!(ledger.total_supply().unwrap(), 100);

    let settlement = ledger.complete_duel(duel.id()).unwrap();
    assert_eq!(
        settlement.outcome,
        DuelOutcome::Win {
            winner_id: "p1".to_string()
        }
    );
    assert_eq!(ledger.balance("p1").unwrap(), 150);
    assert_eq!(ledger.balance("p2").unwrap(), 50);

    // A second completion pays nothing
    assert_eq!(ledger.complete_duel(duel.id()).unwrap(), settlement);
    assert_eq!(ledger.total_supply().unwrap(), 200);
    for id in ["p1", "p2"] {
        assert!(ledger.reconcile(id).unwrap().is_consistent());
    }
}

#[test]
fn test_racing_settlements_pay_once() {
    let ledger = create_ledger(&[("p1", 100), ("p2", 100)]);
    let duel = ledger.create_duel("p1", "p2", 50, questions(1)).unwrap();
    ledger.record_answer(duel.id(), "p1", 0, 0).unwrap();

    std::thread::scope(|s| {
        let complete = s.spawn(|| ledger.complete_duel(duel.id()));
        let abandon = s.spawn(|| ledger.abandon_duel(duel.id(), "p1"));
        let results = [complete.join().unwrap().is_ok(), abandon.join().unwrap().is_ok()];
        assert!(results.iter().any(|ok| *ok));
    });

    assert_eq!(ledger.total_supply().unwrap(), 200);
    let stored = ledger.duel(duel.id()).unwrap();
    assert_ne!(stored.status(), DuelStatus::Active);
    assert_eq!(stored.settlement().unwrap().total_paid(), 100);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_settlement_conserves_pot(
        bet in 1i64..=100,
        p1_answers in proptest::collection::vec(0usize..2, 4),
        p2_answers in proptest::collection::vec(0usize..2, 4),
    ) {
        let ledger = create_ledger(&[("p1", 100), ("p2", 100)]);
        let duel = ledger.create_duel("p1", "p2", bet, questions(4)).unwrap();
        prop_assert_eq!(ledger.total_supply().unwrap(), 200 - 2 * bet);

        for (index, answer) in p1_answers.iter().enumerate() {
            ledger.record_answer(duel.id(), "p1", index, *answer).unwrap();
        }
        for (index, answer) in p2_answers.iter().enumerate() {
            ledger.record_answer(duel.id(), "p2", index, *answer).unwrap();
        }

        let stored = ledger.duel(duel.id()).unwrap();
        prop_assert_eq!(stored.status(), DuelStatus::Completed);
        prop_assert_eq!(stored.settlement().unwrap().total_paid(), 2 * bet);
        prop_assert_eq!(ledger.total_supply().unwrap(), 200);
        prop_assert!(ledger.balance("p1").unwrap() >= 0);
        prop_assert!(ledger.balance("p2").unwrap() >= 0);
    }
}
