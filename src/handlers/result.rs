// src/handlers/result.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{
        attempt::Attempt,
        exam::Exam,
        publish_control::{PublishControl, PublishResultRequest},
        question::Question,
    },
    scoring::evaluate::correct_indices,
    utils::jwt::Claims,
};

use super::exam::fetch_exam_questions;

/// Lists exams whose results have been published.
pub async fn list_published_exams(
    State(pool): State<SqlitePool>,
) -> Result<impl IntoResponse, AppError> {
    let rows = sqlx::query_as::<_, PublishControl>(
        "SELECT id, exam_id, publish_at, created_at FROM publish_controls WHERE publish_at IS NOT NULL",
    )
    .fetch_all(&pool)
    .await?;

    let now = Utc::now();
    let published_ids: Vec<i64> = rows
        .iter()
        .filter(|control| control.is_published_at(now))
        .map(|control| control.exam_id)
        .collect();

    if published_ids.is_empty() {
        return Ok(Json(Vec::<serde_json::Value>::new()));
    }

    let mut query_builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
        "SELECT * FROM exams WHERE id IN (",
    );
    let mut separated = query_builder.separated(",");
    for id in &published_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(") ORDER BY id DESC");

    let exams: Vec<Exam> = query_builder.build_query_as().fetch_all(&pool).await?;

    let listing: Vec<serde_json::Value> = exams
        .into_iter()
        .map(|exam| {
            serde_json::json!({
                "exam_id": exam.id,
                "title": exam.title,
                "category_id": exam.category_id,
                "total_marks": exam.total_marks,
            })
        })
        .collect();

    Ok(Json(listing))
}

/// Returns the caller's detailed result for one exam: every question with
/// the correct option set revealed, their selection, and the attempt's
/// scores.
///
/// Gated on publication - until staff publish the exam's result, students
/// get 403 no matter what the stored attempt says.
pub async fn get_my_exam_result(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let control = sqlx::query_as::<_, PublishControl>(
        "SELECT id, exam_id, publish_at, created_at FROM publish_controls WHERE exam_id = ?",
    )
    .bind(exam_id)
    .fetch_optional(&pool)
    .await?;

    let published = control.is_some_and(|c| c.is_published_at(Utc::now()));
    if !published {
        return Err(AppError::Forbidden("Result not published yet".to_string()));
    }

    // Latest attempt wins the review view; older ones stay in the audit
    // trail.
    let attempt = sqlx::query_as::<_, Attempt>(
        r#"
        SELECT * FROM attempts
        WHERE exam_id = ? AND student_id = ?
        ORDER BY submitted_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(exam_id)
    .bind(claims.user_id())
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    let exam = sqlx::query_as::<_, Exam>("SELECT * FROM exams WHERE id = ?")
        .bind(exam_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    let questions = fetch_exam_questions(&pool, &exam.question_ids.0).await?;
    let by_id: std::collections::HashMap<i64, Question> =
        questions.into_iter().map(|q| (q.id, q)).collect();

    let detailed_answers: Vec<serde_json::Value> = attempt
        .answers
        .0
        .iter()
        .filter_map(|answer| {
            let question = by_id.get(&answer.question_id)?;
            let correct = correct_indices(&question.options.0);
            Some(serde_json::json!({
                "question": {
                    "id": question.id,
                    "subject_id": question.subject_id,
                    "text": question.text,
                    "image": question.image,
                    "explanation": question.explanation,
                    "options": question.options.0.iter().map(|opt| opt.text.clone()).collect::<Vec<_>>(),
                    "correct_options": correct,
                },
                "selected_options": answer.selected_options,
                "is_correct": answer.is_correct,
            }))
        })
        .collect();

    Ok(Json(serde_json::json!({
        "exam_id": exam_id,
        "student_id": attempt.student_id,
        "total_score": attempt.total_score,
        "subjects_score": attempt.subjects_score.0,
        "submitted_at": attempt.submitted_at,
        "answers": detailed_answers,
    })))
}

/// Sets the publication date of an exam's result.
/// Staff only.
///
/// 404 until any attempt has been recorded (the publish control is created
/// lazily on first submission); 400 when the timestamp does not parse.
pub async fn publish_result(
    State(pool): State<SqlitePool>,
    Path(exam_id): Path<i64>,
    Json(payload): Json<PublishResultRequest>,
) -> Result<impl IntoResponse, AppError> {
    let publish_at = DateTime::parse_from_rfc3339(&payload.publish_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            AppError::BadRequest(format!(
                "'{}' is not a valid RFC 3339 timestamp",
                payload.publish_at
            ))
        })?;

    let result = sqlx::query("UPDATE publish_controls SET publish_at = ? WHERE exam_id = ?")
        .bind(publish_at)
        .bind(exam_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to publish result for exam {}: {:?}", exam_id, e);
            AppError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "No submissions recorded for this exam yet".to_string(),
        ));
    }

    tracing::info!("Exam {} results publish at {}", exam_id, publish_at);

    Ok(Json(serde_json::json!({
        "exam_id": exam_id,
        "publish_at": publish_at,
    })))
}
