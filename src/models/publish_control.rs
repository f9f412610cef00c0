// src/models/publish_control.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'publish_controls' table: one gate per exam deciding
/// whether attempt scores are visible to students.
///
/// Created lazily (with no `publish_at`) the first time any attempt is
/// recorded for the exam; staff set `publish_at` explicitly afterwards.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PublishControl {
    pub id: i64,
    pub exam_id: i64,
    pub publish_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PublishControl {
    /// An absent or future `publish_at` means results are still hidden.
    pub fn is_published_at(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.publish_at.is_some_and(|at| at <= now)
    }
}

/// DTO for the staff publish operation. The timestamp arrives as a string
/// so an unparseable date can be answered with 400 instead of a generic
/// deserialization failure.
#[derive(Debug, Deserialize)]
pub struct PublishResultRequest {
    pub publish_at: String,
}
