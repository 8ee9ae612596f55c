use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{QuestionEntity, QuizEntity},
    dto::validation::{validate_correct_option, validate_options, validate_time_limit},
    state::quiz::{Question, QuizDefinition},
};

const DEFAULT_POINTS: u32 = 100;

/// Quiz supplied inline when a host creates a session.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct QuizInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 200), nested)]
    pub questions: Vec<QuestionInput>,
}

/// One multiple-choice question of an inline quiz.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct QuestionInput {
    pub prompt: String,
    pub options: Vec<String>,
    /// Zero-based index into `options`.
    pub correct_option: usize,
    pub time_limit_ms: u64,
    /// Points for an instant correct answer (defaults to 100).
    #[serde(default = "default_points")]
    pub points: u32,
}

fn default_points() -> u32 {
    DEFAULT_POINTS
}

impl Validate for QuestionInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.prompt.trim().is_empty() {
            let mut err = ValidationError::new("prompt_blank");
            err.message = Some("question prompt must not be blank".into());
            errors.add("prompt", err);
        }
        if !(2..=10).contains(&self.options.len()) {
            let mut err = ValidationError::new("options_count");
            err.message = Some(
                format!("between 2 and 10 options required (got {})", self.options.len()).into(),
            );
            errors.add("options", err);
        } else if let Err(err) = validate_options(&self.options) {
            errors.add("options", err);
        }
        if let Err(err) = validate_correct_option(self.correct_option, self.options.len()) {
            errors.add("correct_option", err);
        }
        if let Err(err) = validate_time_limit(self.time_limit_ms) {
            errors.add("time_limit_ms", err);
        }
        if self.points == 0 {
            let mut err = ValidationError::new("points_zero");
            err.message = Some("points must be positive".into());
            errors.add("points", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl QuizInput {
    /// Turn a validated inline quiz into a runtime definition with a fresh id.
    pub fn into_definition(self) -> QuizDefinition {
        QuizDefinition {
            id: Uuid::new_v4(),
            title: self.title.trim().to_owned(),
            questions: self
                .questions
                .into_iter()
                .map(|question| Question {
                    prompt: question.prompt,
                    options: question.options,
                    correct_option: question.correct_option,
                    time_limit: Duration::from_millis(question.time_limit_ms),
                    points: question.points,
                })
                .collect(),
        }
    }
}

impl From<&QuizEntity> for QuizInput {
    fn from(value: &QuizEntity) -> Self {
        Self {
            title: value.title.clone(),
            questions: value.questions.iter().map(QuestionInput::from).collect(),
        }
    }
}

impl From<&QuestionEntity> for QuestionInput {
    fn from(value: &QuestionEntity) -> Self {
        Self {
            prompt: value.prompt.clone(),
            options: value.options.clone(),
            correct_option: value.correct_option,
            time_limit_ms: value.time_limit_ms,
            points: value.points,
        }
    }
}

/// Question as shown to participants while the round is open: no answer key.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionView {
    pub prompt: String,
    pub options: Vec<String>,
    pub points: u32,
}

impl From<&Question> for QuestionView {
    fn from(value: &Question) -> Self {
        Self {
            prompt: value.prompt.clone(),
            options: value.options.clone(),
            points: value.points,
        }
    }
}
