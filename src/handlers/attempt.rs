// src/handlers/attempt.rs

use std::collections::HashMap;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use sqlx::{SqlitePool, types::Json as SqlJson};

use crate::{
    config::PROFILE_MERGE_MAX_RETRIES,
    error::AppError,
    models::{
        achievement::AchievementRow,
        attempt::{AnswerResult, SubmitAttemptRequest, SubmitAttemptResponse},
        exam::Exam,
        question::Question,
    },
    scoring::{
        aggregate::{AggregatedScores, aggregate_scores},
        evaluate::{QuestionOutcome, correct_indices, evaluate_question},
        normalize::normalize_selection,
        profile::{ProfileDelta, ProfileState},
    },
    utils::jwt::Claims,
};

use super::exam::fetch_exam_questions;

/// Submits a student's exam answers.
///
/// The pipeline: normalize raw selections, evaluate against each answer
/// key, aggregate subject/total percentages, then persist the attempt and
/// fold it into the student's achievement profile in one transaction.
/// Scoring is pure; only the final persistence step can fail.
pub async fn submit_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.answers.is_empty() {
        return Err(AppError::BadRequest("No answers submitted".to_string()));
    }

    let student_id = claims.user_id();

    let exam = sqlx::query_as::<_, Exam>("SELECT * FROM exams WHERE id = ?")
        .bind(req.exam_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    let questions = fetch_exam_questions(&pool, &exam.question_ids.0).await?;
    let by_id: HashMap<i64, Question> = questions.into_iter().map(|q| (q.id, q)).collect();

    // Every question the exam references must still exist; a gap would
    // silently shrink the maximum achievable marks.
    for qid in &exam.question_ids.0 {
        if !by_id.contains_key(qid) {
            return Err(AppError::NotFound(format!(
                "Question {} referenced by exam {} is missing",
                qid, exam.id
            )));
        }
    }

    let outcomes = evaluate_submission(&exam, &by_id, &req.answers);
    let scores = aggregate_scores(&outcomes, exam.marks_per_question);

    let answers: Vec<AnswerResult> = outcomes
        .iter()
        .map(|outcome| AnswerResult {
            question_id: outcome.question_id,
            selected_options: outcome.selected_options.clone(),
            is_correct: outcome.is_correct,
        })
        .collect();

    let (attempt_id, profile_delta) =
        record_attempt(&pool, student_id, &exam, &answers, &scores).await?;

    tracing::info!(
        "Recorded attempt {} for student {} on exam {} ({}%)",
        attempt_id,
        student_id,
        exam.id,
        scores.total_percent
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitAttemptResponse {
            attempt_id,
            total_score: scores.total_percent,
            subjects_score: scores.subjects,
            profile_delta,
        }),
    ))
}

/// Evaluates every exam question against the raw answers map.
///
/// Iterates in the exam's question order, so the result cannot depend on
/// the ordering of the submitted map. Questions absent from the map (or
/// whose value resolves to nothing) are recorded as unanswered.
fn evaluate_submission(
    exam: &Exam,
    questions: &HashMap<i64, Question>,
    answers: &HashMap<i64, serde_json::Value>,
) -> Vec<QuestionOutcome> {
    exam.question_ids
        .0
        .iter()
        .map(|qid| {
            let question = &questions[qid];
            let selected = match answers.get(qid) {
                Some(raw) => normalize_selection(raw, &question.options.0),
                None => Vec::new(),
            };
            let correct = correct_indices(&question.options.0);
            let (is_correct, mark_delta) = evaluate_question(
                &correct,
                &selected,
                exam.marks_per_question,
                exam.negative_marks,
            );
            QuestionOutcome {
                question_id: *qid,
                subject_id: question.subject_id,
                selected_options: selected,
                is_correct,
                mark_delta,
            }
        })
        .collect()
}

/// Persists one evaluated submission: the attempt row, the lazily-created
/// publish control, and the achievement merge, all in one transaction.
///
/// The achievement write is conditional on the row's `version`, so two
/// concurrent submissions by the same user cannot lose an update; the
/// loser rolls back (including its attempt row) and retries the whole
/// transaction. Publish-control races are settled by the UNIQUE exam_id.
async fn record_attempt(
    pool: &SqlitePool,
    student_id: i64,
    exam: &Exam,
    answers: &[AnswerResult],
    scores: &AggregatedScores,
) -> Result<(i64, ProfileDelta), AppError> {
    for round in 0..PROFILE_MERGE_MAX_RETRIES {
        let mut tx = pool.begin().await?;

        let attempt_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO attempts (student_id, exam_id, answers, total_score, subjects_score, submitted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(student_id)
        .bind(exam.id)
        .bind(SqlJson(answers))
        .bind(scores.total_percent)
        .bind(SqlJson(&scores.subjects))
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        // Lazy publish control, unpublished until staff set a date.
        sqlx::query("INSERT INTO publish_controls (exam_id) VALUES (?) ON CONFLICT(exam_id) DO NOTHING")
            .bind(exam.id)
            .execute(&mut *tx)
            .await?;

        let stored = sqlx::query_as::<_, AchievementRow>(
            "SELECT user_id, rating, medals, expertise, subjects_score, version FROM achievements WHERE user_id = ?",
        )
        .bind(student_id)
        .fetch_optional(&mut *tx)
        .await?;

        let merged = match stored {
            Some(row) => {
                let mut profile = ProfileState {
                    rating: row.rating,
                    medals: row.medals,
                    expertise: row.expertise.0,
                    subjects: row.subjects_score.0,
                };
                let delta =
                    profile.merge_attempt(exam.category_id, scores.total_percent, &scores.subjects);

                let updated = sqlx::query(
                    r#"
                    UPDATE achievements
                    SET rating = ?, medals = ?, expertise = ?, subjects_score = ?,
                        version = version + 1, updated_at = CURRENT_TIMESTAMP
                    WHERE user_id = ? AND version = ?
                    "#,
                )
                .bind(profile.rating)
                .bind(profile.medals)
                .bind(SqlJson(&profile.expertise))
                .bind(SqlJson(&profile.subjects))
                .bind(student_id)
                .bind(row.version)
                .execute(&mut *tx)
                .await?;

                (updated.rows_affected() > 0).then_some(delta)
            }
            None => {
                let mut profile = ProfileState::default();
                let delta =
                    profile.merge_attempt(exam.category_id, scores.total_percent, &scores.subjects);

                let inserted = sqlx::query(
                    r#"
                    INSERT INTO achievements (user_id, rating, medals, expertise, subjects_score, version)
                    VALUES (?, ?, ?, ?, ?, 1)
                    ON CONFLICT(user_id) DO NOTHING
                    "#,
                )
                .bind(student_id)
                .bind(profile.rating)
                .bind(profile.medals)
                .bind(SqlJson(&profile.expertise))
                .bind(SqlJson(&profile.subjects))
                .execute(&mut *tx)
                .await?;

                (inserted.rows_affected() > 0).then_some(delta)
            }
        };

        match merged {
            Some(delta) => {
                tx.commit().await?;
                return Ok((attempt_id, delta));
            }
            None => {
                // Someone else's merge landed between our read and write.
                tx.rollback().await?;
                tracing::warn!(
                    "Achievement merge for user {} lost a version race (round {}), retrying",
                    student_id,
                    round + 1
                );
            }
        }
    }

    Err(AppError::Conflict(
        "Profile update kept losing concurrent races; please retry the submission".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionOption;
    use sqlx::types::Json;

    fn question(id: i64, subject_id: i64, flags: &[bool]) -> Question {
        Question {
            id,
            subject_id,
            text: format!("Q{}", id),
            image: None,
            options: Json(
                flags
                    .iter()
                    .enumerate()
                    .map(|(i, correct)| QuestionOption {
                        text: format!("opt {}", i),
                        is_correct: *correct,
                    })
                    .collect(),
            ),
            explanation: None,
            created_at: None,
        }
    }

    fn exam(question_ids: &[i64]) -> Exam {
        Exam {
            id: 1,
            title: "Mock exam".to_string(),
            description: None,
            category_id: 1,
            duration_minutes: 60,
            marks_per_question: 4.0,
            negative_marks: -1.0,
            total_marks: 4.0 * question_ids.len() as f64,
            question_ids: Json(question_ids.to_vec()),
            scheduled_date: None,
            created_by: 1,
            created_at: None,
        }
    }

    #[test]
    fn test_evaluation_is_order_independent_and_repeatable() {
        let exam = exam(&[1, 2]);
        let mut questions = HashMap::new();
        questions.insert(1, question(1, 10, &[true, false]));
        questions.insert(2, question(2, 11, &[false, true, true]));

        let mut forward = HashMap::new();
        forward.insert(1, serde_json::json!([0]));
        forward.insert(2, serde_json::json!([1]));

        let mut reversed = HashMap::new();
        reversed.insert(2, serde_json::json!([1]));
        reversed.insert(1, serde_json::json!([0]));

        let first = evaluate_submission(&exam, &questions, &forward);
        let second = evaluate_submission(&exam, &questions, &reversed);
        let third = evaluate_submission(&exam, &questions, &forward);
        assert_eq!(first, second);
        assert_eq!(first, third);

        let scores = aggregate_scores(&first, exam.marks_per_question);
        assert_eq!(scores.total_percent, 37.5);
        assert_eq!(scores.subjects.len(), 2);
    }

    #[test]
    fn test_unanswered_questions_are_recorded_unanswered() {
        let exam = exam(&[1, 2]);
        let mut questions = HashMap::new();
        questions.insert(1, question(1, 10, &[true, false]));
        questions.insert(2, question(2, 10, &[false, true]));

        // Only question 1 answered; question 2 absent from the map.
        let mut answers = HashMap::new();
        answers.insert(1, serde_json::json!([0]));

        let outcomes = evaluate_submission(&exam, &questions, &answers);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_correct);
        assert!(!outcomes[1].is_correct);
        assert!(outcomes[1].selected_options.is_empty());
        assert_eq!(outcomes[1].mark_delta, 0.0);
    }
}
