// src/models/attempt.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// One evaluated answer inside an attempt record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub question_id: i64,
    /// Normalized option indices, sorted and deduplicated.
    pub selected_options: Vec<usize>,
    pub is_correct: bool,
}

/// A subject's percentage score within one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectScore {
    pub subject_id: i64,
    /// Percentage of the subject's achievable marks, rounded to 2 decimals.
    /// May be negative when penalties outweigh earned marks.
    pub marks: f64,
}

/// Represents the 'attempts' table: one immutable scored submission by a
/// student for one exam. Written exactly once, never mutated, never
/// deleted in normal operation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub student_id: i64,
    pub exam_id: i64,
    pub answers: Json<Vec<AnswerResult>>,

    /// Exam-level percentage. Stored signed; negative totals are floored
    /// only in read-time views so the audit record stays accurate.
    pub total_score: f64,

    pub subjects_score: Json<Vec<SubjectScore>>,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for submitting an exam.
///
/// Answer values are raw JSON: clients send option indices, numeric
/// strings, option text, or lists of any of those. The normalizer sorts
/// it out; entries that resolve to nothing count as unanswered.
#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    pub exam_id: i64,
    pub answers: HashMap<i64, serde_json::Value>,
}

/// Response to a submission: the attempt's scores plus what it changed on
/// the student's achievement profile.
#[derive(Debug, Serialize)]
pub struct SubmitAttemptResponse {
    pub attempt_id: i64,
    pub total_score: f64,
    pub subjects_score: Vec<SubjectScore>,
    pub profile_delta: crate::scoring::profile::ProfileDelta,
}
