// src/scoring/profile.rs

use serde::Serialize;

use crate::config::MEDAL_THRESHOLD_PERCENT;
use crate::models::achievement::SubjectAverage;
use crate::models::attempt::SubjectScore;
use crate::scoring::aggregate::round2;

/// In-memory image of one user's achievement profile. Loaded from the
/// achievements row, merged, and written back under the version check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileState {
    pub rating: i64,
    pub medals: i64,
    pub expertise: Vec<i64>,
    pub subjects: Vec<SubjectAverage>,
}

/// What one attempt changed on the profile; echoed back to the submitter.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileDelta {
    pub rating_delta: i64,
    pub medal_awarded: bool,
    pub new_expertise: bool,
}

/// The score contribution of one attempt whose exam result is still
/// unpublished, as the visibility filter needs it.
#[derive(Debug, Clone)]
pub struct HiddenContribution {
    pub total_score: f64,
    pub subjects: Vec<SubjectScore>,
}

impl ProfileState {
    /// Folds one scored attempt into the profile.
    ///
    /// Subject entries keep a true running mean over a `samples` counter.
    /// The system this replaces folded with `round((old + new) / 2)` - a
    /// two-sample average that drifts from the real mean after the second
    /// attempt and cannot be inverted; the counter is what lets
    /// [`ProfileState::visible_view`] back a hidden contribution out
    /// exactly.
    ///
    /// Ratings accumulate signed: a negative attempt percentage pulls the
    /// rating down. Medals are monotonic - once earned, never revoked.
    pub fn merge_attempt(
        &mut self,
        category_id: i64,
        total_percent: f64,
        subjects: &[SubjectScore],
    ) -> ProfileDelta {
        let rating_delta = total_percent.round() as i64;
        self.rating += rating_delta;

        for score in subjects {
            match self
                .subjects
                .iter_mut()
                .find(|entry| entry.subject_id == score.subject_id)
            {
                Some(entry) => {
                    let widened = entry.marks * f64::from(entry.samples) + score.marks;
                    entry.samples += 1;
                    entry.marks = round2(widened / f64::from(entry.samples));
                }
                None => self.subjects.push(SubjectAverage {
                    subject_id: score.subject_id,
                    marks: round2(score.marks),
                    samples: 1,
                }),
            }
        }

        let new_expertise = !self.expertise.contains(&category_id);
        if new_expertise {
            self.expertise.push(category_id);
        }

        let medal_awarded = total_percent >= MEDAL_THRESHOLD_PERCENT;
        if medal_awarded {
            self.medals += 1;
        }

        ProfileDelta {
            rating_delta,
            medal_awarded,
            new_expertise,
        }
    }

    /// Computes the profile view a student is allowed to see: the rating
    /// and subject means with every hidden attempt's contribution backed
    /// out.
    ///
    /// The displayed rating is floored at zero; the stored value stays
    /// signed. Medals and expertise are monotonic and not retracted here.
    pub fn visible_view(&self, hidden: &[HiddenContribution]) -> ProfileState {
        let mut view = self.clone();

        for contribution in hidden {
            view.rating -= contribution.total_score.round() as i64;

            for score in &contribution.subjects {
                let Some(pos) = view
                    .subjects
                    .iter()
                    .position(|entry| entry.subject_id == score.subject_id)
                else {
                    continue;
                };

                let entry = &mut view.subjects[pos];
                if entry.samples <= 1 {
                    view.subjects.remove(pos);
                } else {
                    let widened = entry.marks * f64::from(entry.samples) - score.marks;
                    entry.samples -= 1;
                    entry.marks = round2(widened / f64::from(entry.samples));
                }
            }
        }

        view.rating = view.rating.max(0);
        view
    }
}
