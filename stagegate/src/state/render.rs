//! Task template rendering.
//!
//! Templates reference state keys either as `{{ key }}` or `{key}`. Keys may
//! contain dots, so `{{ requirements.content }}` reads the flat state key
//! `requirements.content`. The feedback of the previously rejected attempt
//! is exposed under `feedback.score`, `feedback.summary`,
//! `feedback.suggestions`, `feedback.critical_issues` and
//! `feedback.attempt`, taking precedence over state keys of the same name.
//!
//! String values are inserted verbatim, anything else as compact JSON.
//! Unknown placeholders are left untouched.

use super::StateSnapshot;
use crate::core::Feedback;
use regex::{Captures, Regex};
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}|\{([A-Za-z0-9_.\-]+)\}")
        .expect("placeholder pattern is valid")
});

fn feedback_value(feedback: &Feedback, field: &str) -> Option<serde_json::Value> {
    let value = match field {
        "score" => serde_json::json!(feedback.score),
        "summary" => serde_json::json!(feedback.summary),
        "suggestions" => serde_json::json!(feedback.suggestions),
        "critical_issues" => serde_json::json!(feedback.critical_issues),
        "attempt" => serde_json::json!(feedback.attempt),
        _ => return None,
    };
    Some(value)
}

fn display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders `template` against the state and optional feedback.
#[must_use]
pub fn render_task(template: &str, state: &StateSnapshot, feedback: Option<&Feedback>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let key = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());

            let from_feedback = key
                .strip_prefix("feedback.")
                .zip(feedback)
                .and_then(|(field, fb)| feedback_value(fb, field));

            from_feedback
                .or_else(|| state.get(key).cloned())
                .map_or_else(|| caps[0].to_string(), |value| display(&value))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn state() -> StateSnapshot {
        let mut s = StateSnapshot::new();
        s.insert("topic".to_string(), json!("caching"));
        s.insert("requirements.content".to_string(), json!("R1\nR2"));
        s.insert("limits".to_string(), json!({"max": 3}));
        s
    }

    #[test]
    fn test_both_placeholder_styles() {
        let out = render_task("Write about {topic} using {{ requirements.content }}", &state(), None);
        assert_eq!(out, "Write about caching using R1\nR2");
    }

    #[test]
    fn test_non_string_values_render_as_json() {
        let out = render_task("limits={{limits}}", &state(), None);
        assert_eq!(out, r#"limits={"max":3}"#);
    }

    #[test]
    fn test_unknown_placeholders_are_kept() {
        let out = render_task("{missing} and {{ also.missing }}", &state(), None);
        assert_eq!(out, "{missing} and {{ also.missing }}");
    }

    #[test]
    fn test_feedback_fields() {
        let feedback = Feedback {
            attempt: 1,
            score: 0.4,
            summary: "too vague".to_string(),
            suggestions: vec!["be concrete".to_string()],
            critical_issues: vec![],
        };
        let out = render_task(
            "{topic} (retry after {{ feedback.attempt }}: {{ feedback.summary }}, {feedback.score})",
            &state(),
            Some(&feedback),
        );
        assert_eq!(out, "caching (retry after 1: too vague, 0.4)");
    }

    #[test]
    fn test_feedback_placeholders_without_feedback_stay_intact() {
        let out = render_task("{{ feedback.summary }}", &state(), None);
        assert_eq!(out, "{{ feedback.summary }}");
    }
}
