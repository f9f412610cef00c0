// src/scoring/normalize.rs

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::question::QuestionOption;

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("valid regex"));

/// Resolves one raw answer value to a deduplicated, sorted set of valid
/// option indices for a question.
///
/// Clients are sloppy about answer shapes: a bare index, a numeric string,
/// the option's display text, or a list mixing all three. Values that
/// resolve to nothing (free text matching no option, out-of-range indices,
/// non-scalar garbage) are dropped silently - they count as "no selection"
/// for that option, not as an error, so one bad entry never blocks an
/// otherwise valid submission.
pub fn normalize_selection(raw: &Value, options: &[QuestionOption]) -> Vec<usize> {
    let candidates: Vec<&Value> = match raw {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        scalar => vec![scalar],
    };

    let mut indices: Vec<usize> = candidates
        .into_iter()
        .filter_map(|value| resolve_one(value, options))
        .filter(|idx| *idx < options.len())
        .collect();

    indices.sort_unstable();
    indices.dedup();
    indices
}

fn resolve_one(value: &Value, options: &[QuestionOption]) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|i| usize::try_from(i).ok()),
        Value::String(s) if NUMERIC.is_match(s) => s.parse::<usize>().ok(),
        Value::String(s) => options.iter().position(|opt| opt.text == *s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(texts: &[&str]) -> Vec<QuestionOption> {
        texts
            .iter()
            .map(|t| QuestionOption {
                text: t.to_string(),
                is_correct: false,
            })
            .collect()
    }

    #[test]
    fn test_indices_pass_through() {
        let opts = options(&["a", "b", "c"]);
        assert_eq!(normalize_selection(&json!([2, 0]), &opts), vec![0, 2]);
    }

    #[test]
    fn test_scalar_becomes_singleton() {
        let opts = options(&["a", "b"]);
        assert_eq!(normalize_selection(&json!(1), &opts), vec![1]);
    }

    #[test]
    fn test_numeric_strings_resolve_to_indices() {
        let opts = options(&["a", "b", "c"]);
        assert_eq!(normalize_selection(&json!(["1", "2"]), &opts), vec![1, 2]);
    }

    #[test]
    fn test_option_text_resolves_to_index() {
        let opts = options(&["Paris", "London", "Rome"]);
        assert_eq!(
            normalize_selection(&json!(["Rome", "Paris"]), &opts),
            vec![0, 2]
        );
    }

    #[test]
    fn test_unmatched_text_contributes_nothing() {
        let opts = options(&["a", "b"]);
        assert_eq!(normalize_selection(&json!("Madrid"), &opts), Vec::<usize>::new());
    }

    #[test]
    fn test_out_of_range_discarded_silently() {
        let opts = options(&["a", "b"]);
        assert_eq!(normalize_selection(&json!([0, 5, -1]), &opts), vec![0]);
    }

    #[test]
    fn test_duplicates_collapse() {
        let opts = options(&["a", "b"]);
        assert_eq!(normalize_selection(&json!([1, "1", "b"]), &opts), vec![1]);
    }

    #[test]
    fn test_null_and_garbage_mean_unanswered() {
        let opts = options(&["a", "b"]);
        assert_eq!(normalize_selection(&json!(null), &opts), Vec::<usize>::new());
        assert_eq!(
            normalize_selection(&json!({"weird": true}), &opts),
            Vec::<usize>::new()
        );
        assert_eq!(
            normalize_selection(&json!([true, 1.5]), &opts),
            Vec::<usize>::new()
        );
    }
}
