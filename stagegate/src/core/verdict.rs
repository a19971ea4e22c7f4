//! Review verdicts and the typed feedback derived from rejected ones.

use serde::{Deserialize, Serialize};

/// Severity of the issues found by a review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// No or minor issues.
    #[default]
    Low,
    /// Some issues worth addressing.
    Medium,
    /// Many critical issues.
    High,
    /// Output is unusable.
    Critical,
}

/// The result of reviewing one producer output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    /// Quality score in `[0, 1]`.
    pub score: f64,
    /// Whether the reviewer approves the output.
    pub approved: bool,
    /// Blocking problems.
    #[serde(default)]
    pub critical_issues: Vec<String>,
    /// Non-blocking improvement ideas.
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// One-line summary.
    #[serde(default)]
    pub summary: String,
    /// Overall severity.
    #[serde(default)]
    pub severity: Severity,
}

impl ReviewVerdict {
    /// Creates a verdict with no issues.
    #[must_use]
    pub fn new(score: f64, approved: bool) -> Self {
        Self {
            score,
            approved,
            critical_issues: Vec::new(),
            suggestions: Vec::new(),
            summary: String::new(),
            severity: Severity::Low,
        }
    }

    /// Creates an approving verdict.
    #[must_use]
    pub fn approve(score: f64) -> Self {
        Self::new(score, true)
    }

    /// Creates a rejecting verdict.
    #[must_use]
    pub fn reject(score: f64) -> Self {
        Self::new(score, false)
    }

    /// Sets the summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Adds a critical issue.
    #[must_use]
    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.critical_issues.push(issue.into());
        self
    }

    /// Adds a suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Sets the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Acceptance gate: approved and scoring at least `threshold`.
    #[must_use]
    pub fn passes(&self, threshold: f64) -> bool {
        self.approved && self.score >= threshold
    }

    /// Checks that the score is a finite number in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns a description of the violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.score.is_nan() || !(0.0..=1.0).contains(&self.score) {
            return Err(format!("score {} is outside [0, 1]", self.score));
        }
        Ok(())
    }
}

/// Typed feedback handed to the next attempt after a rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// The attempt that was rejected (1-based).
    pub attempt: u32,
    /// The rejected attempt's score.
    pub score: f64,
    /// Reviewer summary.
    pub summary: String,
    /// Reviewer suggestions.
    pub suggestions: Vec<String>,
    /// Reviewer critical issues.
    pub critical_issues: Vec<String>,
}

impl Feedback {
    /// Builds feedback from the verdict that rejected `attempt`.
    #[must_use]
    pub fn from_verdict(verdict: &ReviewVerdict, attempt: u32) -> Self {
        Self {
            attempt,
            score: verdict.score,
            summary: verdict.summary.clone(),
            suggestions: verdict.suggestions.clone(),
            critical_issues: verdict.critical_issues.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_requires_approval_and_threshold() {
        assert!(ReviewVerdict::approve(0.9).passes(0.85));
        assert!(ReviewVerdict::approve(0.85).passes(0.85));
        assert!(!ReviewVerdict::approve(0.8).passes(0.85));
        assert!(!ReviewVerdict::reject(1.0).passes(0.5));
    }

    #[test]
    fn test_validate_score_range() {
        assert!(ReviewVerdict::approve(0.0).validate().is_ok());
        assert!(ReviewVerdict::approve(1.0).validate().is_ok());
        assert!(ReviewVerdict::approve(1.01).validate().is_err());
        assert!(ReviewVerdict::approve(-0.1).validate().is_err());
        assert!(ReviewVerdict::approve(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_feedback_copies_verdict() {
        let verdict = ReviewVerdict::reject(0.4)
            .with_summary("too short")
            .with_issue("missing section")
            .with_suggestion("add examples");
        let feedback = Feedback::from_verdict(&verdict, 2);

        assert_eq!(feedback.attempt, 2);
        assert_eq!(feedback.summary, "too short");
        assert_eq!(feedback.critical_issues, vec!["missing section"]);
        assert_eq!(feedback.suggestions, vec!["add examples"]);
    }

    #[test]
    fn test_verdict_deserializes_with_defaults() {
        let verdict: ReviewVerdict =
            serde_json::from_str(r#"{"score": 0.7, "approved": true}"#).unwrap();
        assert_eq!(verdict.severity, Severity::Low);
        assert!(verdict.summary.is_empty());
    }
}
