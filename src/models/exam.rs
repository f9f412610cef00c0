// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::models::question::PublicQuestion;

/// Represents the 'exams' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category_id: i64,

    /// Exam duration in minutes.
    pub duration_minutes: i64,

    /// Marks awarded for each fully correct question.
    pub marks_per_question: f64,

    /// Flat penalty applied per wrong attempt (non-positive).
    pub negative_marks: f64,

    /// Always `marks_per_question * question count`, computed server-side.
    pub total_marks: f64,

    /// Question ids in author order. Stored as a JSON array.
    pub question_ids: Json<Vec<i64>>,

    pub scheduled_date: Option<chrono::DateTime<chrono::Utc>>,
    pub created_by: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Listing entry for the exam catalogue.
#[derive(Debug, Serialize)]
pub struct ExamSummary {
    pub id: i64,
    pub title: String,
    pub category_id: i64,
    pub duration_minutes: i64,
    pub total_marks: f64,
    pub question_count: usize,
    pub scheduled_date: Option<chrono::DateTime<chrono::Utc>>,

    /// Whether the requesting student has already submitted this exam.
    /// Duplicate prevention happens at this layer, not in the recorder.
    pub attempted: bool,
}

/// Full exam view for a student about to take it: metadata plus the
/// questions with answer keys stripped.
#[derive(Debug, Serialize)]
pub struct SafeExamResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub duration_minutes: i64,
    pub marks_per_question: f64,
    pub negative_marks: f64,
    pub total_marks: f64,
    pub scheduled_date: Option<chrono::DateTime<chrono::Utc>>,
    pub questions: Vec<PublicQuestion>,
}

/// DTO for creating a new exam.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub category_id: i64,
    #[validate(range(min = 1, message = "duration must be a positive number of minutes"))]
    pub duration_minutes: i64,
    #[validate(range(exclusive_min = 0.0, message = "marks_per_question must be positive"))]
    pub marks_per_question: f64,
    #[validate(range(max = 0.0, message = "negative_marks must be zero or negative"))]
    pub negative_marks: f64,
    #[validate(length(min = 1, message = "provide at least one question id"))]
    pub question_ids: Vec<i64>,
    pub scheduled_date: Option<chrono::DateTime<chrono::Utc>>,
}
