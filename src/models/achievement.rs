// src/models/achievement.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

use crate::models::attempt::SubjectScore;

/// A subject's running average inside an achievement profile.
///
/// `samples` counts how many attempt contributions the mean covers; it is
/// what lets the visibility filter back a hidden contribution out exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAverage {
    pub subject_id: i64,
    /// Running average percentage, rounded to 2 decimals.
    pub marks: f64,
    pub samples: u32,
}

/// Represents the 'achievements' table: one durable cross-exam summary per
/// user, mutated only by the submission merge.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AchievementRow {
    pub user_id: i64,

    /// Cumulative sum of rounded attempt percentages. Signed; floored at
    /// zero only for display.
    pub rating: i64,

    pub medals: i64,

    /// Categories ever scored in. Stored as a JSON id array.
    pub expertise: Json<Vec<i64>>,

    pub subjects_score: Json<Vec<SubjectAverage>>,

    /// Optimistic-concurrency token; bumped on every merge.
    pub version: i64,
}

/// One row of the attempt/publish join used by the visibility filter.
#[derive(Debug, FromRow)]
pub struct AttemptVisibilityRow {
    pub attempt_id: i64,
    pub exam_id: i64,
    pub exam_title: String,
    pub category_id: i64,
    pub total_score: f64,
    pub subjects_score: Json<Vec<SubjectScore>>,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
    /// NULL when the control exists but was never published; the LEFT JOIN
    /// also yields NULL if the control row is somehow missing. Both mean
    /// hidden.
    pub publish_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// An attempt the student is allowed to see (its exam's result is
/// published), as exposed in the profile view.
#[derive(Debug, Serialize)]
pub struct VisibleAttempt {
    pub attempt_id: i64,
    pub exam_id: i64,
    pub exam_title: String,
    pub category_id: i64,
    pub total_score: f64,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

/// The visibility-filtered profile returned to a student.
#[derive(Debug, Serialize)]
pub struct VisibleAchievement {
    pub rating: i64,
    pub medals: i64,
    pub expertise: Vec<i64>,
    pub subjects_score: Vec<SubjectAverage>,
    pub visible_attempts: Vec<VisibleAttempt>,
}

impl VisibleAchievement {
    /// What a user with no profile yet sees.
    pub fn empty() -> Self {
        VisibleAchievement {
            rating: 0,
            medals: 0,
            expertise: Vec::new(),
            subjects_score: Vec::new(),
            visible_attempts: Vec::new(),
        }
    }
}

/// Aggregated row for the leaderboard, joined from `users` and
/// `achievements`.
#[derive(Debug, Serialize, FromRow)]
pub struct LeaderboardEntry {
    pub username: String,
    pub rating: i64,
    pub medals: i64,
}
