// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use url::Url;
use validator::Validate;

/// One answer option of a multi-select question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// Owning subject.
    pub subject_id: i64,

    /// The text content of the question.
    pub text: String,

    /// Optional illustration URL.
    pub image: Option<String>,

    /// Ordered answer options. Zero, one, or many may be flagged correct;
    /// multi-select is legal. Stored as a JSON array in the database.
    pub options: Json<Vec<QuestionOption>>,

    /// Explanation shown in the result review once published.
    pub explanation: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for delivering a question to a student taking an exam.
/// Correctness flags and the explanation are stripped.
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub subject_id: i64,
    pub text: String,
    pub image: Option<String>,
    pub options: Vec<String>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            subject_id: q.subject_id,
            text: q.text,
            image: q.image,
            options: q.options.0.into_iter().map(|opt| opt.text).collect(),
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub subject_id: i64,
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    #[validate(custom(function = validate_image_url))]
    pub image: Option<String>,
    #[validate(custom(function = validate_options))]
    pub options: Vec<QuestionOption>,
    #[validate(length(max = 5000))]
    pub explanation: Option<String>,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub subject_id: Option<i64>,
    pub text: Option<String>,
    pub image: Option<String>,
    pub options: Option<Vec<QuestionOption>>,
    pub explanation: Option<String>,
}

fn validate_image_url(image: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(image).is_err() {
        return Err(validator::ValidationError::new("invalid_image_url"));
    }
    Ok(())
}

pub fn validate_options(options: &[QuestionOption]) -> Result<(), validator::ValidationError> {
    if options.is_empty() {
        return Err(validator::ValidationError::new("options_cannot_be_empty"));
    }
    for opt in options {
        if opt.text.is_empty() || opt.text.len() > 500 {
            return Err(validator::ValidationError::new("option_text_length"));
        }
    }
    // The evaluator's answer key is the set of flagged options; a question
    // with none would be unanswerable.
    if !options.iter().any(|opt| opt.is_correct) {
        return Err(validator::ValidationError::new("no_correct_option"));
    }
    Ok(())
}
