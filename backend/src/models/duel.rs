//! Duel model
//!
//! A head-to-head quiz wager between two players. Both players stake the same
//! `bet_amount`; the stakes are escrowed when the duel is created and
//! redistributed exactly once when it ends.
//!
//! # State machine
//!
//! ```text
//!            complete (scores compared)
//!   Active ─────────────────────────────▶ Completed
//!     │
//!     └──── abandon (by a participant) ──▶ Abandoned
//! ```
//!
//! Both terminal states are final. Every operation checks the current state
//! first and is rejected with [`DuelError::DuelNotActive`] if it does not apply.
//!
//! This module only holds the state and computes settlements; moving money is
//! the job of the settlement engine, which calls [`Duel::finalize`] once the
//! payouts have been credited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest bet whose pot (`2 * bet`) still fits in an `i64`
pub const MAX_BET_AMOUNT: i64 = i64::MAX / 2;

/// Duel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuelStatus {
    Active,
    Completed,
    Abandoned,
}

/// Errors that can occur during duel state transitions
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DuelError {
    #[error("Duel {duel_id} is not active (status: {status:?})")]
    DuelNotActive { duel_id: String, status: DuelStatus },

    #[error("Account {account_id} is not a participant of duel {duel_id}")]
    NotAParticipant { duel_id: String, account_id: String },

    #[error("Question index {index} out of range (duel has {count} questions)")]
    InvalidQuestionIndex { index: usize, count: usize },

    #[error("Answer out of order: expected question {expected}, got {got}")]
    OutOfOrderAnswer { expected: usize, got: usize },
}

/// One quiz item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    /// Index into `options` of the correct answer
    pub correct_option: usize,
}

impl Question {
    pub fn new(prompt: impl Into<String>, options: Vec<String>, correct_option: usize) -> Self {
        Self {
            prompt: prompt.into(),
            options,
            correct_option,
        }
    }

    pub fn is_correct(&self, answer: usize) -> bool {
        answer == self.correct_option
    }
}

/// How a duel ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DuelOutcome {
    /// Higher score takes the pot
    Win { winner_id: String },
    /// Equal scores, both stakes refunded
    Tie,
    /// One player left; the other takes the pot
    Forfeit {
        winner_id: String,
        abandoned_by: String,
    },
}

impl DuelOutcome {
    pub fn winner_id(&self) -> Option<&str> {
        match self {
            DuelOutcome::Win { winner_id } | DuelOutcome::Forfeit { winner_id, .. } => {
                Some(winner_id)
            }
            DuelOutcome::Tie => None,
        }
    }
}

/// Kind of money returned to a player at settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutKind {
    Winnings,
    Refund,
}

/// One credit paid out of the escrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub account_id: String,
    pub amount: i64,
    pub kind: PayoutKind,
}

/// The one-time redistribution of a duel's escrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuelSettlement {
    pub duel_id: String,
    pub outcome: DuelOutcome,
    pub player1_score: u32,
    pub player2_score: u32,
    /// Total escrowed: `2 * bet_amount`
    pub pot: i64,
    pub payouts: Vec<Payout>,
    pub settled_at: DateTime<Utc>,
}

impl DuelSettlement {
    /// Sum paid out; always equals `pot`
    pub fn total_paid(&self) -> i64 {
        self.payouts.iter().map(|p| p.amount).sum()
    }

    /// Amount paid to one account
    pub fn paid_to(&self, account_id: &str) -> i64 {
        self.payouts
            .iter()
            .filter(|p| p.account_id == account_id)
            .map(|p| p.amount)
            .sum()
    }
}

/// Which side of the duel a player is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSlot {
    One,
    Two,
}

/// Result of submitting one answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerReceipt {
    pub duel_id: String,
    pub player_id: String,
    pub question_index: usize,
    pub correct: bool,
    pub score: u32,
    /// Both players have answered every question
    pub all_answered: bool,
    /// Present when this answer finished the duel and triggered settlement
    pub settlement: Option<DuelSettlement>,
}

/// A BTZ wager between two players
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duel {
    /// Unique duel identifier (UUID)
    id: String,
    player1_id: String,
    player2_id: String,
    /// Stake per player
    bet_amount: i64,
    status: DuelStatus,
    player1_score: u32,
    player2_score: u32,
    /// `None` while active and on a tie
    winner_id: Option<String>,
    /// Fixed once the duel starts
    questions: Vec<Question>,
    player1_answers: Vec<usize>,
    player2_answers: Vec<usize>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    settlement: Option<DuelSettlement>,
}

impl Duel {
    /// Create an active duel whose stakes are already escrowed
    pub fn new(
        id: String,
        player1_id: String,
        player2_id: String,
        bet_amount: i64,
        questions: Vec<Question>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            player1_id,
            player2_id,
            bet_amount,
            status: DuelStatus::Active,
            player1_score: 0,
            player2_score: 0,
            winner_id: None,
            questions,
            player1_answers: Vec::new(),
            player2_answers: Vec::new(),
            created_at,
            completed_at: None,
            settlement: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn player1_id(&self) -> &str {
        &self.player1_id
    }

    pub fn player2_id(&self) -> &str {
        &self.player2_id
    }

    pub fn bet_amount(&self) -> i64 {
        self.bet_amount
    }

    /// Escrowed total
    ///
    /// Exact for every bet up to [`MAX_BET_AMOUNT`], which creation and
    /// checkpoint validation both enforce.
    pub fn pot(&self) -> i64 {
        self.bet_amount.saturating_mul(2)
    }

    pub fn status(&self) -> DuelStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == DuelStatus::Active
    }

    pub fn player1_score(&self) -> u32 {
        self.player1_score
    }

    pub fn player2_score(&self) -> u32 {
        self.player2_score
    }

    pub fn winner_id(&self) -> Option<&str> {
        self.winner_id.as_deref()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn settlement(&self) -> Option<&DuelSettlement> {
        self.settlement.as_ref()
    }

    /// Answers submitted so far by a player
    pub fn answers_of(&self, slot: PlayerSlot) -> &[usize] {
        match slot {
            PlayerSlot::One => &self.player1_answers,
            PlayerSlot::Two => &self.player2_answers,
        }
    }

    pub fn slot_of(&self, account_id: &str) -> Option<PlayerSlot> {
        if account_id == self.player1_id {
            Some(PlayerSlot::One)
        } else if account_id == self.player2_id {
            Some(PlayerSlot::Two)
        } else {
            None
        }
    }

    pub fn is_participant(&self, account_id: &str) -> bool {
        self.slot_of(account_id).is_some()
    }

    /// Both players have answered every question
    pub fn all_answered(&self) -> bool {
        self.player1_answers.len() == self.questions.len()
            && self.player2_answers.len() == self.questions.len()
    }

    fn ensure_active(&self) -> Result<(), DuelError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DuelError::DuelNotActive {
                duel_id: self.id.clone(),
                status: self.status,
            })
        }
    }

    fn require_slot(&self, account_id: &str) -> Result<PlayerSlot, DuelError> {
        self.slot_of(account_id)
            .ok_or_else(|| DuelError::NotAParticipant {
                duel_id: self.id.clone(),
                account_id: account_id.to_string(),
            })
    }

    /// Record a player's answer to the next question in sequence
    ///
    /// A correct answer adds one point to that player's score. Questions are
    /// answered strictly in order, each once.
    pub fn submit_answer(
        &mut self,
        player_id: &str,
        question_index: usize,
        answer: usize,
    ) -> Result<AnswerReceipt, DuelError> {
        self.ensure_active()?;
        let slot = self.require_slot(player_id)?;

        let count = self.questions.len();
        let question = self
            .questions
            .get(question_index)
            .ok_or(DuelError::InvalidQuestionIndex {
                index: question_index,
                count,
            })?;
        let correct = question.is_correct(answer);

        let (answers, score) = match slot {
            PlayerSlot::One => (&mut self.player1_answers, &mut self.player1_score),
            PlayerSlot::Two => (&mut self.player2_answers, &mut self.player2_score),
        };
        if question_index != answers.len() {
            return Err(DuelError::OutOfOrderAnswer {
                expected: answers.len(),
                got: question_index,
            });
        }
        answers.push(answer);
        if correct {
            *score += 1;
        }
        let score = *score;

        Ok(AnswerReceipt {
            duel_id: self.id.clone(),
            player_id: player_id.to_string(),
            question_index,
            correct,
            score,
            all_answered: self.all_answered(),
            settlement: None,
        })
    }

    /// Compute the settlement for a normal completion
    ///
    /// Scores are compared as they stand; the duel is not modified.
    pub fn plan_completion(&self, now: DateTime<Utc>) -> Result<DuelSettlement, DuelError> {
        self.ensure_active()?;
        let pot = self.pot();
        let (outcome, payouts) = match self.player1_score.cmp(&self.player2_score) {
            std::cmp::Ordering::Greater => (
                DuelOutcome::Win {
                    winner_id: self.player1_id.clone(),
                },
                vec![self.payout(&self.player1_id, pot, PayoutKind::Winnings)],
            ),
            std::cmp::Ordering::Less => (
                DuelOutcome::Win {
                    winner_id: self.player2_id.clone(),
                },
                vec![self.payout(&self.player2_id, pot, PayoutKind::Winnings)],
            ),
            std::cmp::Ordering::Equal => (
                DuelOutcome::Tie,
                vec![
                    self.payout(&self.player1_id, self.bet_amount, PayoutKind::Refund),
                    self.payout(&self.player2_id, self.bet_amount, PayoutKind::Refund),
                ],
            ),
        };
        Ok(self.settlement_with(outcome, payouts, now))
    }

    /// Compute the settlement when `abandoning_player` leaves
    ///
    /// The remaining player takes the whole pot; the abandoning player gets
    /// nothing back and pays nothing extra.
    pub fn plan_forfeit(
        &self,
        abandoning_player: &str,
        now: DateTime<Utc>,
    ) -> Result<DuelSettlement, DuelError> {
        self.ensure_active()?;
        let winner_id = match self.require_slot(abandoning_player)? {
            PlayerSlot::One => self.player2_id.clone(),
            PlayerSlot::Two => self.player1_id.clone(),
        };
        let payouts = vec![self.payout(&winner_id, self.pot(), PayoutKind::Winnings)];
        let outcome = DuelOutcome::Forfeit {
            winner_id,
            abandoned_by: abandoning_player.to_string(),
        };
        Ok(self.settlement_with(outcome, payouts, now))
    }

    /// Move to the terminal state described by `settlement`
    ///
    /// Called by the settlement engine after every payout was credited.
    pub fn finalize(&mut self, settlement: DuelSettlement) -> Result<(), DuelError> {
        self.ensure_active()?;
        self.status = match settlement.outcome {
            DuelOutcome::Forfeit { .. } => DuelStatus::Abandoned,
            DuelOutcome::Win { .. } | DuelOutcome::Tie => DuelStatus::Completed,
        };
        self.winner_id = settlement.outcome.winner_id().map(str::to_string);
        self.completed_at = Some(settlement.settled_at);
        self.settlement = Some(settlement);
        Ok(())
    }

    fn payout(&self, account_id: &str, amount: i64, kind: PayoutKind) -> Payout {
        Payout {
            account_id: account_id.to_string(),
            amount,
            kind,
        }
    }

    fn settlement_with(
        &self,
        outcome: DuelOutcome,
        payouts: Vec<Payout>,
        now: DateTime<Utc>,
    ) -> DuelSettlement {
        DuelSettlement {
            duel_id: self.id.clone(),
            outcome,
            player1_score: self.player1_score,
            player2_score: self.player2_score,
            pot: self.pot(),
            payouts,
            settled_at: now,
        }
    }
}
