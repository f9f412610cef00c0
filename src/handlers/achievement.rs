// src/handlers/achievement.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::achievement::{
        AchievementRow, AttemptVisibilityRow, LeaderboardEntry, VisibleAchievement, VisibleAttempt,
    },
    scoring::profile::{HiddenContribution, ProfileState},
    utils::jwt::Claims,
};

/// Returns the caller's achievement profile after the publication
/// visibility filter.
///
/// Contributions from attempts whose exam result is unpublished (no
/// publish control, or a `publish_at` still in the future) are backed out
/// of the displayed rating and subject means, and those attempts are
/// stripped from the visible list. A user with no profile yet gets zeroed
/// defaults, never a 404.
pub async fn get_my_achievement(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let stored = sqlx::query_as::<_, AchievementRow>(
        "SELECT user_id, rating, medals, expertise, subjects_score, version FROM achievements WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(&pool)
    .await?;

    let Some(row) = stored else {
        return Ok(Json(VisibleAchievement::empty()));
    };

    let profile = ProfileState {
        rating: row.rating,
        medals: row.medals,
        expertise: row.expertise.0,
        subjects: row.subjects_score.0,
    };

    let attempt_rows = sqlx::query_as::<_, AttemptVisibilityRow>(
        r#"
        SELECT a.id AS attempt_id, a.exam_id, e.title AS exam_title, e.category_id,
               a.total_score, a.subjects_score, a.submitted_at, p.publish_at
        FROM attempts a
        JOIN exams e ON e.id = a.exam_id
        LEFT JOIN publish_controls p ON p.exam_id = a.exam_id
        WHERE a.student_id = ?
        ORDER BY a.submitted_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    // The publish gate is evaluated here rather than in SQL so the
    // timestamp comparison is not at the mercy of text-affinity formats.
    let now = Utc::now();
    let mut hidden: Vec<HiddenContribution> = Vec::new();
    let mut visible_attempts: Vec<VisibleAttempt> = Vec::new();

    for row in attempt_rows {
        let published = row.publish_at.is_some_and(|at| at <= now);
        if published {
            visible_attempts.push(VisibleAttempt {
                attempt_id: row.attempt_id,
                exam_id: row.exam_id,
                exam_title: row.exam_title,
                category_id: row.category_id,
                total_score: row.total_score,
                submitted_at: row.submitted_at,
            });
        } else {
            hidden.push(HiddenContribution {
                total_score: row.total_score,
                subjects: row.subjects_score.0,
            });
        }
    }

    let view = profile.visible_view(&hidden);

    Ok(Json(VisibleAchievement {
        rating: view.rating,
        medals: view.medals,
        expertise: view.expertise,
        subjects_score: view.subjects,
        visible_attempts,
    }))
}

/// Retrieves the top 50 profiles ordered by rating, then medals.
///
/// Served from stored profiles, so not-yet-published contributions do
/// influence ranking order. That matches the behavior this service
/// replaces; per-user filtering on every read was judged not worth it.
pub async fn get_leaderboard(
    State(pool): State<SqlitePool>,
) -> Result<impl IntoResponse, AppError> {
    let leaderboard = sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT u.username, a.rating, a.medals
        FROM achievements a
        JOIN users u ON u.id = a.user_id
        ORDER BY a.rating DESC, a.medals DESC
        LIMIT 50
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch leaderboard: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(leaderboard))
}
