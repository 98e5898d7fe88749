//! Reference [`RetrievalProvider`] implementations.
//!
//! Real deployments wire in HTTP clients for the vector index, lexical
//! index, knowledge graph, and web/news/markets feeds — none of that wire
//! protocol is in scope here. What ships in this crate is a
//! deterministic in-memory provider used by the lane tests, the demo
//! binary, and as a template for a real backend adapter: anything that
//! implements [`RetrievalProvider`] slots into a [`crate::lanes::LaneSpec`]
//! unchanged.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::sleep;

use crate::lanes::retrieval::{RetrievalError, RetrievalProvider, SearchOutcome};
use crate::lanes::source::Hit;
use crate::query::Constraints;

/// Scripted outcome for one call, used to drive lane-executor tests
/// deterministically (timeouts, rate limits, partial chains, etc.).
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Hits(Vec<Hit>),
    Partial(Vec<Hit>, RetrievalError),
    Error(RetrievalError),
    /// Sleeps past any deadline passed to `search`, so the caller's
    /// `tokio::time::timeout` fires.
    HangForever,
}

/// A provider whose behavior is entirely scripted ahead of time. Simulates
/// latency with `tokio::time::sleep` so it composes correctly with
/// `tokio::time::pause`/`advance` in tests.
pub struct SimulatedProvider {
    id: String,
    keyed: bool,
    latency: Duration,
    outcome: ScriptedOutcome,
}

impl SimulatedProvider {
    pub fn new(id: impl Into<String>, keyed: bool, latency: Duration, outcome: ScriptedOutcome) -> Self {
        Self {
            id: id.into(),
            keyed,
            latency,
            outcome,
        }
    }

    pub fn healthy_with_hits(id: impl Into<String>, keyed: bool, hits: Vec<Hit>) -> Self {
        Self::new(id, keyed, Duration::from_millis(5), ScriptedOutcome::Hits(hits))
    }
}

#[async_trait]
impl RetrievalProvider for SimulatedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn keyed(&self) -> bool {
        self.keyed
    }

    async fn search(
        &self,
        _normalized_query: &str,
        _constraints: &Constraints,
        deadline: Instant,
    ) -> SearchOutcome {
        match &self.outcome {
            ScriptedOutcome::HangForever => loop {
                sleep(Duration::from_secs(3600)).await;
                if Instant::now() >= deadline {
                    return SearchOutcome::Err(RetrievalError::Timeout);
                }
            },
            other => {
                sleep(self.latency).await;
                match other {
                    ScriptedOutcome::Hits(hits) => SearchOutcome::Ok(hits.clone()),
                    ScriptedOutcome::Partial(hits, err) => {
                        SearchOutcome::Partial(hits.clone(), err.clone())
                    }
                    ScriptedOutcome::Error(err) => SearchOutcome::Err(err.clone()),
                    ScriptedOutcome::HangForever => unreachable!(),
                }
            }
        }
    }
}

/// Convenience builder for a quick hit list in tests and demos.
pub fn hit(url: &str, title: &str, excerpt: &str, score: f64) -> Hit {
    Hit {
        canonical_url_or_key: url.to_string(),
        title: title.to_string(),
        excerpt: excerpt.to_string(),
        raw_score: Some(score),
        ts: Some(chrono::Utc::now()),
        language: Some("en".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn simulated_provider_returns_scripted_hits() {
        let provider = SimulatedProvider::healthy_with_hits(
            "web-primary",
            true,
            vec![hit("https://example.com/a", "A", "a", 0.9)],
        );
        let deadline = Instant::now() + Duration::from_secs(1);
        match provider.search("q", &Constraints::default(), deadline).await {
            SearchOutcome::Ok(hits) => assert_eq!(hits.len(), 1),
            other => panic!("expected Ok, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn simulated_provider_surfaces_scripted_error() {
        let provider = SimulatedProvider::new(
            "web-fallback",
            false,
            Duration::from_millis(1),
            ScriptedOutcome::Error(RetrievalError::RateLimited { retry_after_ms: 200 }),
        );
        let deadline = Instant::now() + Duration::from_secs(1);
        match provider.search("q", &Constraints::default(), deadline).await {
            SearchOutcome::Err(err) => assert!(err.is_retryable()),
            other => panic!("expected Err, got {:?}", other),
        }
    }
}
