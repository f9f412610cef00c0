// src/handlers/admin.rs

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        category::CreateCategoryRequest,
        exam::CreateExamRequest,
        question::{CreateQuestionRequest, UpdateQuestionRequest, validate_options},
        subject::CreateSubjectRequest,
    },
    utils::{html::clean_html, jwt::Claims},
};

/// Creates a new subject.
/// Staff only.
pub async fn create_subject(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO subjects (name, description) VALUES (?, ?) RETURNING id",
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint") {
            AppError::Conflict(format!("Subject '{}' already exists", payload.name))
        } else {
            tracing::error!("Failed to create subject: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Creates a new exam category.
/// Staff only.
pub async fn create_category(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar("INSERT INTO categories (name) VALUES (?) RETURNING id")
        .bind(&payload.name)
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::Conflict(format!("Category '{}' already exists", payload.name))
            } else {
                tracing::error!("Failed to create category: {:?}", e);
                AppError::from(e)
            }
        })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Creates a new question.
/// Staff only. At least one option must be flagged correct.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let subject_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM subjects WHERE id = ?)")
        .bind(payload.subject_id)
        .fetch_one(&pool)
        .await?;
    if !subject_exists {
        return Err(AppError::NotFound("Subject not found".to_string()));
    }

    let explanation = payload.explanation.as_deref().map(clean_html);

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (subject_id, text, image, options, explanation)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.subject_id)
    .bind(&payload.text)
    .bind(&payload.image)
    .bind(SqlJson(&payload.options))
    .bind(&explanation)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// True when any submitted attempt belongs to an exam referencing the
/// question. Such questions are frozen: rescoring history out from under
/// an audit record is not allowed.
async fn question_is_attempted(pool: &SqlitePool, question_id: i64) -> Result<bool, AppError> {
    let referenced: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1
            FROM attempts a
            JOIN exams e ON e.id = a.exam_id, json_each(e.question_ids) je
            WHERE je.value = ?
        )
        "#,
    )
    .bind(question_id)
    .fetch_one(pool)
    .await?;
    Ok(referenced)
}

/// Updates a question by ID.
/// Staff only. Rejected once the question appears in any submitted attempt.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.subject_id.is_none()
        && payload.text.is_none()
        && payload.image.is_none()
        && payload.options.is_none()
        && payload.explanation.is_none()
    {
        return Ok(StatusCode::OK);
    }

    if let Some(options) = &payload.options {
        if validate_options(options).is_err() {
            return Err(AppError::BadRequest(
                "options must be non-empty with at least one correct flag".to_string(),
            ));
        }
    }

    if question_is_attempted(&pool, id).await? {
        return Err(AppError::Conflict(
            "Question is referenced by submitted attempts and cannot be changed".to_string(),
        ));
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if let Some(subject_id) = payload.subject_id {
        separated.push("subject_id = ");
        separated.push_bind_unseparated(subject_id);
    }

    if let Some(text) = payload.text {
        separated.push("text = ");
        separated.push_bind_unseparated(text);
    }

    if let Some(image) = payload.image {
        separated.push("image = ");
        separated.push_bind_unseparated(image);
    }

    if let Some(options) = payload.options {
        separated.push("options = ");
        separated.push_bind_unseparated(SqlJson(options));
    }

    if let Some(explanation) = payload.explanation {
        separated.push("explanation = ");
        separated.push_bind_unseparated(clean_html(&explanation));
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::from(e)
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a question by ID.
/// Staff only. Rejected once the question appears in any submitted attempt.
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if question_is_attempted(&pool, id).await? {
        return Err(AppError::Conflict(
            "Question is referenced by submitted attempts and cannot be deleted".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Creates a new exam.
/// Staff only. `total_marks` is computed server-side so it can never
/// disagree with `marks_per_question × question count`.
pub async fn create_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let unique: HashSet<i64> = payload.question_ids.iter().copied().collect();
    if unique.len() != payload.question_ids.len() {
        return Err(AppError::BadRequest(
            "question_ids contains duplicates".to_string(),
        ));
    }

    let category_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?)")
            .bind(payload.category_id)
            .fetch_one(&pool)
            .await?;
    if !category_exists {
        return Err(AppError::NotFound("Category not found".to_string()));
    }

    let mut count_builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM questions WHERE id IN (");
    let mut separated = count_builder.separated(",");
    for qid in &payload.question_ids {
        separated.push_bind(qid);
    }
    separated.push_unseparated(")");

    let found: i64 = count_builder.build_query_scalar().fetch_one(&pool).await?;
    if found != payload.question_ids.len() as i64 {
        return Err(AppError::BadRequest(
            "Some question_ids are invalid".to_string(),
        ));
    }

    let total_marks = payload.marks_per_question * payload.question_ids.len() as f64;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO exams
            (title, description, category_id, duration_minutes,
             marks_per_question, negative_marks, total_marks,
             question_ids, scheduled_date, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.category_id)
    .bind(payload.duration_minutes)
    .bind(payload.marks_per_question)
    .bind(payload.negative_marks)
    .bind(total_marks)
    .bind(SqlJson(&payload.question_ids))
    .bind(payload.scheduled_date)
    .bind(claims.user_id())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create exam: {:?}", e);
        AppError::from(e)
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": id, "total_marks": total_marks})),
    ))
}
