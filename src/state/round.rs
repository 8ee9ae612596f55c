use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use utoipa::ToSchema;
use uuid::Uuid;

/// Reasons an answer submission is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnswerRejection {
    /// Submitted after the round's close time.
    #[error("answer arrived after the question closed")]
    TooLate,
    /// The participant already answered this question.
    #[error("question already answered")]
    Duplicate,
    /// The question index is not the one currently open.
    #[error("answer targets a question that is not open")]
    WrongRound,
    /// The participant is not part of this session.
    #[error("unknown participant")]
    UnknownParticipant,
    /// The chosen option does not exist for this question.
    #[error("chosen option does not exist")]
    InvalidChoice,
}

/// An accepted answer. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    /// Who answered.
    pub participant_id: Uuid,
    /// Which question was answered.
    pub question_index: usize,
    /// Chosen option index.
    pub choice: usize,
    /// Server receive time.
    pub submitted_at: Instant,
}

/// The answer window of a single question.
#[derive(Debug, Clone)]
pub struct QuestionRound {
    question_index: usize,
    option_count: usize,
    opened_at: Instant,
    closes_at: Instant,
    closes_at_wall: SystemTime,
    answers: IndexMap<Uuid, AnswerRecord>,
}

impl QuestionRound {
    /// Open a round for `question_index` lasting `time_limit` from `opened_at`.
    pub fn open(
        question_index: usize,
        option_count: usize,
        opened_at: Instant,
        time_limit: Duration,
    ) -> Self {
        Self {
            question_index,
            option_count,
            opened_at,
            closes_at: opened_at + time_limit,
            closes_at_wall: SystemTime::now() + time_limit,
            answers: IndexMap::new(),
        }
    }

    /// Index of the question this round collects answers for.
    pub fn question_index(&self) -> usize {
        self.question_index
    }

    /// Monotonic instant the round opened.
    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// Monotonic deadline; authoritative for the answer cutoff.
    pub fn closes_at(&self) -> Instant {
        self.closes_at
    }

    /// Wall-clock deadline shown to clients.
    pub fn closes_at_wall(&self) -> SystemTime {
        self.closes_at_wall
    }

    /// Number of answers accepted so far.
    pub fn answer_count(&self) -> usize {
        self.answers.len()
    }

    /// Accept an answer if it targets this round, is on time and is the first
    /// one from this participant.
    pub fn submit(
        &mut self,
        participant_id: Uuid,
        question_index: usize,
        choice: usize,
        submitted_at: Instant,
    ) -> Result<&AnswerRecord, AnswerRejection> {
        if question_index != self.question_index {
            return Err(AnswerRejection::WrongRound);
        }
        if self.answers.contains_key(&participant_id) {
            return Err(AnswerRejection::Duplicate);
        }
        if submitted_at > self.closes_at {
            return Err(AnswerRejection::TooLate);
        }
        if choice >= self.option_count {
            return Err(AnswerRejection::InvalidChoice);
        }

        let record = AnswerRecord {
            participant_id,
            question_index,
            choice,
            submitted_at,
        };
        Ok(self.answers.entry(participant_id).or_insert(record))
    }

    /// Milliseconds between the round opening and `at`.
    pub fn elapsed_ms(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.opened_at).as_millis() as u64
    }

    /// Close the round, handing back the accepted answers in arrival order.
    pub fn close(self) -> Vec<AnswerRecord> {
        self.answers.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round() -> (QuestionRound, Instant) {
        let opened = Instant::now();
        (
            QuestionRound::open(2, 4, opened, Duration::from_secs(10)),
            opened,
        )
    }

    #[test]
    fn accepts_first_on_time_answer() {
        let (mut round, opened) = round();
        let who = Uuid::new_v4();
        let record = round
            .submit(who, 2, 1, opened + Duration::from_secs(3))
            .unwrap()
            .clone();
        assert_eq!(record.choice, 1);
        assert_eq!(round.elapsed_ms(record.submitted_at), 3_000);
        assert_eq!(round.answer_count(), 1);
    }

    #[test]
    fn every_duplicate_is_rejected() {
        let (mut round, opened) = round();
        let who = Uuid::new_v4();
        round.submit(who, 2, 0, opened).unwrap();
        for attempt in 1..5 {
            let at = opened + Duration::from_millis(attempt * 100);
            assert_eq!(
                round.submit(who, 2, 3, at).unwrap_err(),
                AnswerRejection::Duplicate
            );
        }
        assert_eq!(round.close()[0].choice, 0);
    }

    #[test]
    fn deadline_is_inclusive() {
        let (mut round, _) = round();
        let at_close = round.closes_at();
        assert!(round.submit(Uuid::new_v4(), 2, 0, at_close).is_ok());
        assert_eq!(
            round
                .submit(Uuid::new_v4(), 2, 0, at_close + Duration::from_millis(1))
                .unwrap_err(),
            AnswerRejection::TooLate
        );
    }

    #[test]
    fn stale_index_is_wrong_round() {
        let (mut round, opened) = round();
        assert_eq!(
            round.submit(Uuid::new_v4(), 1, 0, opened).unwrap_err(),
            AnswerRejection::WrongRound
        );
    }

    #[test]
    fn out_of_range_choice_is_rejected() {
        let (mut round, opened) = round();
        assert_eq!(
            round.submit(Uuid::new_v4(), 2, 4, opened).unwrap_err(),
            AnswerRejection::InvalidChoice
        );
        assert_eq!(round.answer_count(), 0);
    }
}
