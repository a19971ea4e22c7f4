//! Multi-reviewer consensus.
//!
//! A [`ReviewerCouncil`] asks every member for a verdict and folds them into
//! one. It implements [`Reviewer`] itself, so orchestrators gate a council
//! verdict exactly like a single reviewer's.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

use super::{CouncilSpec, DecisionMode};
use crate::core::{ProducerOutput, ReviewVerdict, Severity};
use crate::errors::PipelineValidationError;
use crate::stages::{Reviewer, ReviewerRegistry};
use crate::state::StateSnapshot;

/// Maximum issues and suggestions carried into the aggregate verdict.
pub const MAX_COUNCIL_ITEMS: usize = 10;

/// Critical issue count at which the aggregate severity becomes high.
const HIGH_SEVERITY_ISSUES: usize = 5;

/// A set of reviewers whose verdicts are aggregated into one.
#[derive(Debug, Clone)]
pub struct ReviewerCouncil {
    members: Vec<(String, Arc<dyn Reviewer>)>,
    decision: DecisionMode,
    min_score: f64,
    weights: HashMap<String, f64>,
}

impl ReviewerCouncil {
    /// Creates a council deciding by `decision` against `min_score`.
    #[must_use]
    pub fn new(decision: DecisionMode, min_score: f64) -> Self {
        Self {
            members: Vec::new(),
            decision,
            min_score,
            weights: HashMap::new(),
        }
    }

    /// Builds a council from its policy spec.
    ///
    /// # Errors
    ///
    /// Returns an error if a member is not registered.
    pub fn from_spec(
        spec: &CouncilSpec,
        reviewers: &ReviewerRegistry,
        min_score: f64,
    ) -> Result<Self, PipelineValidationError> {
        let mut council = Self::new(spec.decision, min_score);
        for name in &spec.reviewers {
            let reviewer = reviewers.get(name).ok_or_else(|| {
                PipelineValidationError::new(format!("Council references unknown reviewer '{name}'"))
            })?;
            council = council.with_member(name.clone(), reviewer);
        }
        if let Some(weights) = &spec.weights {
            council.weights.clone_from(weights);
        }
        Ok(council)
    }

    /// Adds a member.
    #[must_use]
    pub fn with_member(mut self, name: impl Into<String>, reviewer: Arc<dyn Reviewer>) -> Self {
        self.members.push((name.into(), reviewer));
        self
    }

    /// Sets a member's weight for average decisions.
    #[must_use]
    pub fn with_weight(mut self, name: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(name.into(), weight);
        self
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the council has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Folds member verdicts, listed in member order, into one verdict.
    #[must_use]
    pub fn aggregate(&self, verdicts: &[ReviewVerdict]) -> ReviewVerdict {
        let n = verdicts.len();
        if n == 0 {
            return ReviewVerdict::reject(0.0).with_summary(format!(
                "Council decision via {}: 0/0 approvals; avg=0.00",
                self.decision.as_str()
            ));
        }

        let approvals = verdicts.iter().filter(|v| v.passes(self.min_score)).count();
        #[allow(clippy::cast_precision_loss)]
        let mean = verdicts.iter().map(|v| v.score).sum::<f64>() / n as f64;

        // decisions use the reported two-decimal score so the gate agrees
        let (score, approved) = match self.decision {
            DecisionMode::Majority => (round2(mean), approvals > n / 2),
            DecisionMode::Average => {
                let score = round2(self.weighted_mean(verdicts).unwrap_or(mean));
                (score, score >= self.min_score)
            }
        };

        let critical_issues: Vec<String> = verdicts
            .iter()
            .flat_map(|v| v.critical_issues.iter().cloned())
            .take(MAX_COUNCIL_ITEMS)
            .collect();
        let suggestions: Vec<String> = verdicts
            .iter()
            .flat_map(|v| v.suggestions.iter().cloned())
            .take(MAX_COUNCIL_ITEMS)
            .collect();
        let severity = match critical_issues.len() {
            0 => Severity::Low,
            k if k >= HIGH_SEVERITY_ISSUES => Severity::High,
            _ => Severity::Medium,
        };

        ReviewVerdict {
            score,
            approved,
            critical_issues,
            suggestions,
            summary: format!(
                "Council decision via {}: {approvals}/{n} approvals; avg={score:.2}",
                self.decision.as_str()
            ),
            severity,
        }
    }

    /// Weighted mean of member scores; `None` when the total weight is not
    /// positive. Members without a weight count as 1.0.
    fn weighted_mean(&self, verdicts: &[ReviewVerdict]) -> Option<f64> {
        if self.weights.is_empty() {
            return None;
        }
        let (sum, total) = self
            .members
            .iter()
            .zip(verdicts)
            .fold((0.0, 0.0), |(sum, total), ((name, _), verdict)| {
                let weight = self.weights.get(name).copied().unwrap_or(1.0);
                (sum + weight * verdict.score, total + weight)
            });
        (total > 0.0).then(|| sum / total)
    }
}

#[async_trait]
impl Reviewer for ReviewerCouncil {
    fn name(&self) -> &str {
        "council"
    }

    async fn review(
        &self,
        output: &ProducerOutput,
        task: &str,
        state: &StateSnapshot,
    ) -> anyhow::Result<ReviewVerdict> {
        let results = join_all(
            self.members
                .iter()
                .map(|(_, reviewer)| reviewer.review(output, task, state)),
        )
        .await;

        let mut verdicts = Vec::with_capacity(results.len());
        for ((name, _), result) in self.members.iter().zip(results) {
            let verdict =
                result.map_err(|e| e.context(format!("council member '{name}' failed")))?;
            verdict
                .validate()
                .map_err(|msg| anyhow::anyhow!("council member '{name}' returned {msg}"))?;
            verdicts.push(verdict);
        }

        let verdict = self.aggregate(&verdicts);
        tracing::debug!(
            decision = self.decision.as_str(),
            members = verdicts.len(),
            score = verdict.score,
            approved = verdict.approved,
            "Council verdict"
        );
        Ok(verdict)
    }
}

fn round2(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedReviewer;
    use pretty_assertions::assert_eq;

    fn council(decision: DecisionMode, verdicts: &[(&str, f64, bool)]) -> ReviewerCouncil {
        verdicts.iter().fold(ReviewerCouncil::new(decision, 0.8), |c, (name, score, approved)| {
            let reviewer = if *approved {
                FixedReviewer::approving(*name, *score)
            } else {
                FixedReviewer::rejecting(*name, *score)
            };
            c.with_member(*name, Arc::new(reviewer))
        })
    }

    async fn review(council: &ReviewerCouncil) -> ReviewVerdict {
        council
            .review(&ProducerOutput::new("x"), "task", &StateSnapshot::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_majority_tie_fails() {
        let c = council(DecisionMode::Majority, &[("a", 0.9, true), ("b", 0.5, false)]);
        let verdict = review(&c).await;

        assert!(!verdict.approved);
        assert_eq!(verdict.score, 0.7);
        assert_eq!(verdict.summary, "Council decision via majority: 1/2 approvals; avg=0.70");
    }

    #[tokio::test]
    async fn test_majority_counts_only_gated_approvals() {
        // approved but below min_score does not count as a vote
        let c = council(
            DecisionMode::Majority,
            &[("a", 0.9, true), ("b", 0.79, true), ("c", 0.95, true)],
        );
        let verdict = review(&c).await;
        assert!(verdict.approved);
        assert!(verdict.summary.contains("2/3 approvals"));
    }

    #[tokio::test]
    async fn test_average_weighted() {
        let c = council(DecisionMode::Average, &[("a", 1.0, true), ("b", 0.5, false)])
            .with_weight("a", 3.0);
        let verdict = review(&c).await;

        // (3 * 1.0 + 1 * 0.5) / 4
        assert_eq!(verdict.score, 0.88);
        assert!(verdict.approved);
    }

    #[tokio::test]
    async fn test_average_non_positive_weights_fall_back() {
        let c = council(DecisionMode::Average, &[("a", 1.0, true), ("b", 0.5, true)])
            .with_weight("a", 0.0)
            .with_weight("b", 0.0);
        let verdict = review(&c).await;
        assert_eq!(verdict.score, 0.75);
        assert!(!verdict.approved);
    }

    #[test]
    fn test_issue_truncation_and_severity() {
        let c = ReviewerCouncil::new(DecisionMode::Majority, 0.5);
        let noisy = (0..7).fold(ReviewVerdict::reject(0.2), |v, i| {
            v.with_issue(format!("issue {i}")).with_suggestion(format!("fix {i}"))
        });
        let verdict = c.aggregate(&[noisy.clone(), noisy]);

        assert_eq!(verdict.critical_issues.len(), MAX_COUNCIL_ITEMS);
        assert_eq!(verdict.suggestions.len(), MAX_COUNCIL_ITEMS);
        assert_eq!(verdict.severity, Severity::High);

        let mild = c.aggregate(&[ReviewVerdict::approve(0.9).with_issue("one")]);
        assert_eq!(mild.severity, Severity::Medium);
        let clean = c.aggregate(&[ReviewVerdict::approve(0.9)]);
        assert_eq!(clean.severity, Severity::Low);
    }

    #[test]
    fn test_empty_council_rejects() {
        let verdict = ReviewerCouncil::new(DecisionMode::Average, 0.5).aggregate(&[]);
        assert!(!verdict.approved);
        assert_eq!(verdict.score, 0.0);
    }

    #[tokio::test]
    async fn test_gate_applies_to_council_verdict() {
        let c = council(DecisionMode::Majority, &[("a", 0.9, true), ("b", 0.85, true)]);
        let verdict = review(&c).await;
        assert!(c.gate(&verdict, 0.8));
        assert!(!c.gate(&verdict, 0.9));
    }

    #[test]
    fn test_average_decision_uses_reported_score() {
        let strict = ReviewerCouncil::new(DecisionMode::Average, 0.801);
        let verdict = strict.aggregate(&[ReviewVerdict::approve(0.8049), ReviewVerdict::approve(0.8049)]);
        assert_eq!(verdict.score, 0.8);
        assert!(!verdict.approved);
        assert!(!strict.gate(&verdict, 0.801));

        let lenient = ReviewerCouncil::new(DecisionMode::Average, 0.8);
        let verdict = lenient.aggregate(&[ReviewVerdict::approve(0.7951)]);
        assert_eq!(verdict.score, 0.8);
        assert!(verdict.approved);
        assert!(lenient.gate(&verdict, 0.8));
    }
}
