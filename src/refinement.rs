//! Guided Refinement.
//!
//! An optional pre-flight pass, bounded by its own sub-budget, that
//! produces a clarified query and up to three alternative rewrites. Never
//! consumes budget from any other phase: if it overruns or errors, the
//! original [`Query`] is used unchanged and no refinement event is
//! emitted.

use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info_span, warn, Instrument};

use crate::query::{GuidedPromptPolicy, Query};

#[derive(Debug, Clone, thiserror::Error)]
pub enum RefinementError {
    #[error("refinement exceeded its sub-budget")]
    BudgetExceeded,
    #[error("refiner error: {0}")]
    Provider(String),
}

/// Policy knobs for one refinement pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementPolicy {
    pub enabled: GuidedPromptPolicy,
    /// 1..=3.
    pub suggestion_cap: u8,
    pub redact_pii: bool,
}

impl Default for RefinementPolicy {
    fn default() -> Self {
        Self {
            enabled: GuidedPromptPolicy::Adaptive,
            suggestion_cap: 3,
            redact_pii: true,
        }
    }
}

/// A single rewrite the refiner proposes, with enough confidence that the
/// Orchestrator can choose to adopt it outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementSuggestion {
    pub text: String,
    pub confidence: f64,
}

/// Outcome of a refinement pass, named so the Orchestrator can tell "used
/// the rewrite" apart from "bypassed, kept the original" without inventing
/// an out-of-band sentinel.
#[derive(Debug, Clone)]
pub enum RefinementOutcome {
    Applied {
        refined_text: String,
        alternatives: Vec<RefinementSuggestion>,
    },
    Bypassed,
}

/// Capability a refinement backend offers. Mirrors the provider-trait shape used
/// throughout this crate (e.g. [`crate::lanes::RetrievalProvider`]).
#[async_trait]
pub trait Refiner: Send + Sync {
    async fn suggest(&self, normalized_query: &str, cap: u8) -> Result<Vec<RefinementSuggestion>, RefinementError>;
}

/// Reference [`Refiner`] that proposes no rewrites — the wire protocol to a
/// real clarifier is out of scope here, so this is what the demo
/// binary wires in by default. A policy of `on`/`adaptive` with this refiner
/// degrades to always bypassing, which is a correct (if unhelpful) outcome
/// since a refiner erroring or returning nothing is handled the same way as
/// skipping the pass.
pub struct NoopRefiner;

#[async_trait]
impl Refiner for NoopRefiner {
    async fn suggest(&self, _normalized_query: &str, _cap: u8) -> Result<Vec<RefinementSuggestion>, RefinementError> {
        Ok(Vec::new())
    }
}

/// PII patterns redacted before any downstream call when `redact_pii` is on.
/// Deliberately coarse — email and phone-number shapes, not a full PII
/// classifier.
fn pii_patterns() -> Vec<Regex> {
    vec![
        Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").unwrap(),
        Regex::new(r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap(),
        Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
    ]
}

fn redact(text: &str) -> String {
    let mut out = text.to_string();
    for pattern in pii_patterns() {
        out = pattern.replace_all(&out, "[redacted]").into_owned();
    }
    out
}

/// Tracks per-user acceptance of refinement suggestions so the `adaptive`
/// policy can decide whether to run the pass at all. A real deployment would persist
/// this; here it's an in-memory running average, reset on process restart.
#[derive(Debug, Default)]
pub struct AcceptanceTracker {
    accepted: u64,
    offered: u64,
}

impl AcceptanceTracker {
    pub fn record(&mut self, accepted: bool) {
        self.offered += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    /// Cheap copy of the current counters, used to consult the tracker
    /// without holding its lock across an in-flight refinement call.
    pub fn snapshot(&self) -> Self {
        Self { accepted: self.accepted, offered: self.offered }
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.offered == 0 {
            return 1.0; // no history yet: give refinement the benefit of the doubt
        }
        self.accepted as f64 / self.offered as f64
    }

    /// Adaptive policy runs refinement only while the learned acceptance
    /// rate clears this floor.
    pub fn should_run(&self, floor: f64) -> bool {
        self.acceptance_rate() >= floor
    }
}

/// Minimum adaptive-mode acceptance rate below which refinement is skipped.
pub const ADAPTIVE_ACCEPTANCE_FLOOR: f64 = 0.2;

/// Run Guided Refinement against `query` within `deadline`, honoring
/// `policy`.
pub async fn refine(
    query: &Query,
    policy: &RefinementPolicy,
    refiner: &dyn Refiner,
    tracker: &AcceptanceTracker,
    deadline: Instant,
) -> RefinementOutcome {
    match policy.enabled {
        GuidedPromptPolicy::Off | GuidedPromptPolicy::AlwaysBypass => return RefinementOutcome::Bypassed,
        GuidedPromptPolicy::Adaptive if !tracker.should_run(ADAPTIVE_ACCEPTANCE_FLOOR) => {
            return RefinementOutcome::Bypassed
        }
        GuidedPromptPolicy::On | GuidedPromptPolicy::Adaptive => {}
    }

    let cap = policy.suggestion_cap.clamp(1, 3);
    let input = if policy.redact_pii {
        redact(&query.normalized_text)
    } else {
        query.normalized_text.clone()
    };

    let span = info_span!("refinement", trace_id = %query.trace_id);
    let attempt = async {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(RefinementError::BudgetExceeded);
        }
        tokio::time::timeout(remaining, refiner.suggest(&input, cap))
            .await
            .map_err(|_| RefinementError::BudgetExceeded)?
    }
    .instrument(span)
    .await;

    match attempt {
        Ok(mut suggestions) if !suggestions.is_empty() => {
            suggestions.truncate(cap as usize);
            let best = suggestions.remove(0);
            RefinementOutcome::Applied {
                refined_text: best.text,
                alternatives: suggestions,
            }
        }
        Ok(_) => RefinementOutcome::Bypassed,
        Err(err) => {
            warn!(error = %err, "guided refinement failed, using original query");
            RefinementOutcome::Bypassed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct EchoRefiner;

    #[async_trait]
    impl Refiner for EchoRefiner {
        async fn suggest(&self, normalized_query: &str, cap: u8) -> Result<Vec<RefinementSuggestion>, RefinementError> {
            let mut suggestions = Vec::new();
            for i in 0..cap {
                suggestions.push(RefinementSuggestion {
                    text: format!("{} (variant {})", normalized_query, i + 1),
                    confidence: 0.9 - (i as f64 * 0.1),
                });
            }
            Ok(suggestions)
        }
    }

    struct HangingRefiner;

    #[async_trait]
    impl Refiner for HangingRefiner {
        async fn suggest(&self, _q: &str, _cap: u8) -> Result<Vec<RefinementSuggestion>, RefinementError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn query() -> Query {
        Query::new(
            "contact me at a@b.com".to_string(),
            crate::query::QueryMode::Simple,
            crate::query::Constraints::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn pii_is_redacted() {
        let redacted = redact("email me at jane@example.com or call 555-123-4567");
        assert!(!redacted.contains("jane@example.com"));
        assert!(!redacted.contains("555-123-4567"));
    }

    #[tokio::test]
    async fn off_policy_bypasses_without_calling_refiner() {
        let policy = RefinementPolicy { enabled: GuidedPromptPolicy::Off, ..Default::default() };
        let outcome = refine(
            &query(),
            &policy,
            &HangingRefiner,
            &AcceptanceTracker::default(),
            Instant::now() + Duration::from_secs(1),
        )
        .await;
        assert!(matches!(outcome, RefinementOutcome::Bypassed));
    }

    #[tokio::test]
    async fn applies_best_suggestion_and_caps_alternatives() {
        let policy = RefinementPolicy {
            enabled: GuidedPromptPolicy::On,
            suggestion_cap: 2,
            redact_pii: true,
        };
        let outcome = refine(
            &query(),
            &policy,
            &EchoRefiner,
            &AcceptanceTracker::default(),
            Instant::now() + Duration::from_secs(1),
        )
        .await;
        match outcome {
            RefinementOutcome::Applied { refined_text, alternatives } => {
                assert!(refined_text.contains("variant 1"));
                assert_eq!(alternatives.len(), 1);
                assert!(!refined_text.contains("a@b.com"));
            }
            RefinementOutcome::Bypassed => panic!("expected Applied"),
        }
    }

    #[tokio::test]
    async fn expired_deadline_falls_back_to_original() {
        let policy = RefinementPolicy { enabled: GuidedPromptPolicy::On, ..Default::default() };
        let outcome = refine(
            &query(),
            &policy,
            &HangingRefiner,
            &AcceptanceTracker::default(),
            Instant::now(),
        )
        .await;
        assert!(matches!(outcome, RefinementOutcome::Bypassed));
    }

    #[tokio::test]
    async fn slow_refiner_times_out_against_deadline() {
        let policy = RefinementPolicy { enabled: GuidedPromptPolicy::On, ..Default::default() };
        let outcome = refine(
            &query(),
            &policy,
            &HangingRefiner,
            &AcceptanceTracker::default(),
            Instant::now() + Duration::from_millis(20),
        )
        .await;
        assert!(matches!(outcome, RefinementOutcome::Bypassed));
    }

    #[test]
    fn adaptive_policy_learns_from_acceptance() {
        let mut tracker = AcceptanceTracker::default();
        for _ in 0..8 {
            tracker.record(false);
        }
        tracker.record(true);
        tracker.record(true);
        assert!(!tracker.should_run(ADAPTIVE_ACCEPTANCE_FLOOR));
    }
}
