// src/scoring/aggregate.rs

use crate::models::attempt::SubjectScore;
use crate::scoring::evaluate::QuestionOutcome;

/// Rounds to two decimal places, half away from zero. All displayed
/// percentages go through this.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Subject and exam percentages for one evaluated submission.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedScores {
    /// Exam-level percentage. Negative totals (penalties outweighing
    /// earned marks) propagate here unfloored; flooring happens only in
    /// read-time views, never in the attempt record.
    pub total_percent: f64,

    /// Per-subject percentages, in order of first appearance in the exam.
    pub subjects: Vec<SubjectScore>,
}

struct SubjectAccum {
    subject_id: i64,
    raw_marks: f64,
    question_count: u32,
}

/// Rolls per-question mark deltas into subject-level and exam-level
/// percentages against the maximum achievable marks.
pub fn aggregate_scores(outcomes: &[QuestionOutcome], marks_per_question: f64) -> AggregatedScores {
    let mut accum: Vec<SubjectAccum> = Vec::new();
    let mut raw_total = 0.0;

    for outcome in outcomes {
        raw_total += outcome.mark_delta;

        match accum
            .iter_mut()
            .find(|entry| entry.subject_id == outcome.subject_id)
        {
            Some(entry) => {
                entry.raw_marks += outcome.mark_delta;
                entry.question_count += 1;
            }
            None => accum.push(SubjectAccum {
                subject_id: outcome.subject_id,
                raw_marks: outcome.mark_delta,
                question_count: 1,
            }),
        }
    }

    let max_total = outcomes.len() as f64 * marks_per_question;
    let total_percent = if max_total > 0.0 {
        round2(raw_total / max_total * 100.0)
    } else {
        0.0
    };

    let subjects = accum
        .into_iter()
        .map(|entry| {
            let max_marks = f64::from(entry.question_count) * marks_per_question;
            let percent = if max_marks > 0.0 {
                round2(entry.raw_marks / max_marks * 100.0)
            } else {
                0.0
            };
            SubjectScore {
                subject_id: entry.subject_id,
                marks: percent,
            }
        })
        .collect();

    AggregatedScores {
        total_percent,
        subjects,
    }
}
