// src/handlers/exam.rs

use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{Sqlite, SqlitePool};

use crate::{
    error::AppError,
    models::{
        exam::{Exam, ExamSummary, SafeExamResponse},
        question::{PublicQuestion, Question},
    },
    utils::jwt::Claims,
};

#[derive(Debug, Deserialize)]
pub struct ExamListParams {
    pub category_id: Option<i64>,
}

/// Lists exams, optionally filtered by category.
///
/// Each entry carries an `attempted` flag for the requesting student. The
/// recorder itself accepts re-submissions (audit trail keeps every one);
/// this flag is what the transport layer uses to stop duplicates up front.
pub async fn list_exams(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ExamListParams>,
) -> Result<impl IntoResponse, AppError> {
    let exams = match params.category_id {
        Some(category_id) => {
            sqlx::query_as::<_, Exam>(
                "SELECT * FROM exams WHERE category_id = ? ORDER BY scheduled_date ASC, id ASC",
            )
            .bind(category_id)
            .fetch_all(&pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Exam>("SELECT * FROM exams ORDER BY scheduled_date ASC, id ASC")
                .fetch_all(&pool)
                .await?
        }
    };

    let attempted_exam_ids: HashSet<i64> =
        sqlx::query_scalar::<_, i64>("SELECT DISTINCT exam_id FROM attempts WHERE student_id = ?")
            .bind(claims.user_id())
            .fetch_all(&pool)
            .await?
            .into_iter()
            .collect();

    let summaries: Vec<ExamSummary> = exams
        .into_iter()
        .map(|exam| ExamSummary {
            attempted: attempted_exam_ids.contains(&exam.id),
            question_count: exam.question_ids.0.len(),
            id: exam.id,
            title: exam.title,
            category_id: exam.category_id,
            duration_minutes: exam.duration_minutes,
            total_marks: exam.total_marks,
            scheduled_date: exam.scheduled_date,
        })
        .collect();

    Ok(Json(summaries))
}

/// Returns one exam in its safe-to-deliver form: metadata plus questions
/// in author order, with correctness flags and explanations stripped.
pub async fn get_exam(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = sqlx::query_as::<_, Exam>("SELECT * FROM exams WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    let questions = fetch_exam_questions(&pool, &exam.question_ids.0).await?;

    // Preserve the author's question ordering from the exam record.
    let mut by_id: HashMap<i64, Question> =
        questions.into_iter().map(|q| (q.id, q)).collect();
    let ordered: Vec<PublicQuestion> = exam
        .question_ids
        .0
        .iter()
        .filter_map(|qid| by_id.remove(qid))
        .map(PublicQuestion::from)
        .collect();

    Ok(Json(SafeExamResponse {
        id: exam.id,
        title: exam.title,
        description: exam.description,
        category_id: exam.category_id,
        duration_minutes: exam.duration_minutes,
        marks_per_question: exam.marks_per_question,
        negative_marks: exam.negative_marks,
        total_marks: exam.total_marks,
        scheduled_date: exam.scheduled_date,
        questions: ordered,
    }))
}

/// Fetches the question rows referenced by an exam.
/// Uses a dynamic IN clause; the id list comes from the exam record.
pub async fn fetch_exam_questions(
    pool: &SqlitePool,
    question_ids: &[i64],
) -> Result<Vec<Question>, AppError> {
    if question_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query_builder =
        sqlx::QueryBuilder::<Sqlite>::new("SELECT * FROM questions WHERE id IN (");

    let mut separated = query_builder.separated(",");
    for qid in question_ids {
        separated.push_bind(qid);
    }
    separated.push_unseparated(")");

    let questions: Vec<Question> = query_builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch exam questions: {:?}", e);
            AppError::from(e)
        })?;

    Ok(questions)
}
