// src/scoring/evaluate.rs

use crate::models::question::QuestionOption;

/// Evaluation result for one exam question.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionOutcome {
    pub question_id: i64,
    pub subject_id: i64,
    /// Normalized selection, sorted and deduplicated.
    pub selected_options: Vec<usize>,
    pub is_correct: bool,
    pub mark_delta: f64,
}

/// Indices of the options flagged correct in the answer key, in order.
pub fn correct_indices(options: &[QuestionOption]) -> Vec<usize> {
    options
        .iter()
        .enumerate()
        .filter(|(_, opt)| opt.is_correct)
        .map(|(idx, _)| idx)
        .collect()
}

/// Scores one question against its answer key.
///
/// - Empty selection: not correct, delta 0. Skipping costs nothing.
/// - Selection equal to the correct set: full `marks_per_question`.
/// - Any other non-empty selection: the flat `negative_marks` penalty.
///
/// Multi-select is all-or-nothing: a partial or over-selected answer takes
/// the same single penalty as a plain wrong one. That is the scoring
/// policy, not an oversight - there is no per-option partial credit.
pub fn evaluate_question(
    correct: &[usize],
    selected: &[usize],
    marks_per_question: f64,
    negative_marks: f64,
) -> (bool, f64) {
    if selected.is_empty() {
        return (false, 0.0);
    }

    // Both sides arrive sorted and deduplicated, so slice equality is set
    // equality.
    if correct == selected {
        (true, marks_per_question)
    } else {
        (false, negative_marks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(flags: &[bool]) -> Vec<QuestionOption> {
        flags
            .iter()
            .enumerate()
            .map(|(i, correct)| QuestionOption {
                text: format!("option {}", i),
                is_correct: *correct,
            })
            .collect()
    }

    #[test]
    fn test_correct_indices_in_order() {
        let opts = options(&[false, true, true, false]);
        assert_eq!(correct_indices(&opts), vec![1, 2]);
    }

    #[test]
    fn test_empty_selection_costs_nothing() {
        let (correct, delta) = evaluate_question(&[1, 2], &[], 4.0, -1.0);
        assert!(!correct);
        assert_eq!(delta, 0.0);
    }

    #[test]
    fn test_exact_match_earns_full_marks() {
        let (correct, delta) = evaluate_question(&[1, 2], &[1, 2], 4.0, -1.0);
        assert!(correct);
        assert_eq!(delta, 4.0);
    }

    #[test]
    fn test_partial_selection_takes_flat_penalty() {
        // Selecting only one of two correct options is wrong, not half right.
        let (correct, delta) = evaluate_question(&[1, 2], &[1], 4.0, -1.0);
        assert!(!correct);
        assert_eq!(delta, -1.0);
    }

    #[test]
    fn test_over_selection_takes_flat_penalty() {
        let (correct, delta) = evaluate_question(&[1, 2], &[0, 1, 2], 4.0, -1.0);
        assert!(!correct);
        assert_eq!(delta, -1.0);
    }

    #[test]
    fn test_wrong_single_choice() {
        let (correct, delta) = evaluate_question(&[0], &[1], 4.0, -1.0);
        assert!(!correct);
        assert_eq!(delta, -1.0);
    }

    #[test]
    fn test_zero_penalty_exam() {
        let (_, delta) = evaluate_question(&[0], &[1], 4.0, 0.0);
        assert_eq!(delta, 0.0);
    }
}
