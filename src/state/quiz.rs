use std::time::Duration;

use uuid::Uuid;

use crate::dao::models::{QuestionEntity, QuizEntity};

/// Runtime representation of a quiz with its questions in play order.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizDefinition {
    /// Identifier of the quiz in the definition store (random for inline quizzes).
    pub id: Uuid,
    /// Human readable quiz title.
    pub title: String,
    /// Ordered questions.
    pub questions: Vec<Question>,
}

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    /// Text shown to participants.
    pub prompt: String,
    /// Answer options, indexed from zero.
    pub options: Vec<String>,
    /// Index into `options` of the correct answer.
    pub correct_option: usize,
    /// Time participants have to answer.
    pub time_limit: Duration,
    /// Points awarded for an instant correct answer.
    pub points: u32,
}

impl QuizDefinition {
    /// Question at `index`, if it exists.
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// Number of questions in the quiz.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Whether the quiz has no question.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl Question {
    /// Time limit in whole milliseconds.
    pub fn time_limit_ms(&self) -> u64 {
        self.time_limit.as_millis() as u64
    }
}

impl From<QuestionEntity> for Question {
    fn from(value: QuestionEntity) -> Self {
        Self {
            prompt: value.prompt,
            options: value.options,
            correct_option: value.correct_option,
            time_limit: Duration::from_millis(value.time_limit_ms),
            points: value.points,
        }
    }
}

impl From<QuizEntity> for QuizDefinition {
    fn from(value: QuizEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            questions: value.questions.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<QuizDefinition> for QuizEntity {
    fn from(value: QuizDefinition) -> Self {
        Self {
            id: value.id,
            title: value.title,
            questions: value
                .questions
                .into_iter()
                .map(|question| QuestionEntity {
                    time_limit_ms: question.time_limit_ms(),
                    prompt: question.prompt,
                    options: question.options,
                    correct_option: question.correct_option,
                    points: question.points,
                })
                .collect(),
        }
    }
}
