//! Lane Executor.
//!
//! Runs a single [`LaneSpec`] against its provider chain, honoring a
//! per-lane deadline and emitting a [`LaneResult`] with whatever sources it
//! managed to gather. Providers within one chain are tried **sequentially**
//! — never in parallel with each other, unlike lanes
//! themselves, which the Orchestrator runs concurrently.

pub mod providers;
pub mod retrieval;
pub mod source;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info_span, warn, Instrument};

use crate::budget::Budget;
use crate::query::{Constraints, LaneId};
use crate::registry::{Health, ProviderHandle, ProviderKind, ProviderRegistry};

pub use retrieval::{RetrievalError, RetrievalProvider, SearchOutcome};
pub use source::{FallbackEvent, Hit, LaneResult, LaneStatus, SourceRecord};

/// One entry in a lane's provider chain: the registry's view of the
/// provider (for health/fallback bookkeeping) paired with the live client.
#[derive(Clone)]
pub struct ChainEntry {
    pub handle: ProviderHandle,
    pub provider: Arc<dyn RetrievalProvider>,
}

/// A lane to execute.
pub struct LaneSpec {
    pub lane_id: LaneId,
    pub provider_chain: Vec<ChainEntry>,
    pub per_lane_budget_ms: u64,
    pub required: bool,
}

/// Stateless executor — all per-request state lives in the arguments to
/// [`LaneExecutor::run`], so one executor instance is shared across lanes
/// and requests.
pub struct LaneExecutor;

impl LaneExecutor {
    /// Run one lane's retrieval chain to completion or deadline, falling
    /// through the chain on failure and returning whatever hits were
    /// gathered before either succeeds.
    pub async fn run(
        spec: &LaneSpec,
        normalized_query: &str,
        constraints: &Constraints,
        budget: &Budget,
        registry: &ProviderRegistry,
        synthesis_reserve_ms: u64,
    ) -> LaneResult {
        let span = info_span!("lane", lane_id = %spec.lane_id);
        async move {
            let start = Instant::now();
            let lane_deadline = budget.lane_deadline(spec.per_lane_budget_ms, synthesis_reserve_ms);

            let mut accumulated: Vec<SourceRecord> = Vec::new();
            let mut seen_urls: HashSet<String> = HashSet::new();
            let mut fallback_events = Vec::new();
            let mut provider_used: Option<String> = None;
            let mut last_error: Option<String> = None;
            let mut any_error = false;
            let mut any_skipped = false;
            let mut hit_deadline = false;
            let mut attempted_provider: Option<String> = None;

            'chain: for (position, entry) in spec.provider_chain.iter().enumerate() {
                if Instant::now() >= lane_deadline {
                    hit_deadline = true;
                    break;
                }

                let chain_health = registry.chain_for(ProviderKind::from(spec.lane_id));
                let health = chain_health
                    .iter()
                    .find(|(h, _)| h.id == entry.handle.id)
                    .map(|(_, health)| *health)
                    .unwrap_or(Health::Healthy);

                if let Some(prev) = &attempted_provider {
                    if prev != &entry.handle.id {
                        fallback_events.push(FallbackEvent {
                            lane_id: spec.lane_id,
                            from_provider: prev.clone(),
                            to_provider: entry.handle.id.clone(),
                            reason: last_error.clone().unwrap_or_else(|| "unavailable".to_string()),
                        });
                    }
                }
                attempted_provider = Some(entry.handle.id.clone());

                if health == Health::Down {
                    any_skipped = true;
                    last_error = Some("provider marked down".to_string());
                    continue;
                }

                let provider_deadline = budget.provider_deadline(budget.per_provider_cap_ms(), lane_deadline);
                let remaining = provider_deadline.saturating_duration_since(Instant::now());

                let call = entry.provider.search(normalized_query, constraints, provider_deadline);
                let outcome = match tokio::time::timeout(remaining, call).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        registry.report_retryable_failure(&entry.handle.id);
                        last_error = Some("provider deadline exceeded".to_string());
                        any_error = true;
                        if Instant::now() >= lane_deadline {
                            hit_deadline = true;
                            break 'chain;
                        }
                        continue;
                    }
                };

                match outcome {
                    SearchOutcome::Ok(hits) => {
                        registry.report_success(&entry.handle.id);
                        fold_hits(
                            hits,
                            spec.lane_id,
                            &entry.handle,
                            position,
                            &mut accumulated,
                            &mut seen_urls,
                        );
                        provider_used = Some(entry.handle.id.clone());
                        return LaneResult {
                            lane_id: spec.lane_id,
                            provider_used,
                            status: LaneStatus::Ok,
                            sources: accumulated,
                            elapsed_ms: start.elapsed().as_millis() as u64,
                            budget_ms: spec.per_lane_budget_ms,
                            error: None,
                            fallback_events,
                        };
                    }
                    SearchOutcome::Partial(hits, err) => {
                        fold_hits(
                            hits,
                            spec.lane_id,
                            &entry.handle,
                            position,
                            &mut accumulated,
                            &mut seen_urls,
                        );
                        record_error(registry, &entry.handle.id, &err);
                        last_error = Some(err.to_string());
                        any_error = true;
                    }
                    SearchOutcome::Err(err) => {
                        record_error(registry, &entry.handle.id, &err);
                        last_error = Some(err.to_string());
                        any_error = true;
                    }
                }
            }

            let status = if hit_deadline {
                if accumulated.is_empty() {
                    LaneStatus::Timeout
                } else {
                    LaneStatus::Partial
                }
            } else if !accumulated.is_empty() {
                LaneStatus::Partial
            } else if any_error {
                LaneStatus::Error
            } else if any_skipped {
                LaneStatus::Skipped
            } else {
                // Chain was empty entirely.
                LaneStatus::Skipped
            };

            if status == LaneStatus::Error || status == LaneStatus::Timeout {
                warn!(lane_id = %spec.lane_id, ?status, "lane did not complete successfully");
            }

            LaneResult {
                lane_id: spec.lane_id,
                provider_used,
                status,
                sources: accumulated,
                elapsed_ms: start.elapsed().as_millis() as u64,
                budget_ms: spec.per_lane_budget_ms,
                error: last_error,
                fallback_events,
            }
        }
        .instrument(span)
        .await
    }
}

fn record_error(registry: &ProviderRegistry, provider_id: &str, err: &RetrievalError) {
    match err {
        RetrievalError::RateLimited { retry_after_ms } => {
            registry.report_rate_limited(provider_id, std::time::Duration::from_millis(*retry_after_ms));
        }
        RetrievalError::Timeout => registry.report_retryable_failure(provider_id),
        RetrievalError::Unavailable(_) | RetrievalError::Other(_) => {
            registry.report_hard_failure(provider_id);
        }
    }
}

/// Canonicalize hits into [`SourceRecord`]s, collapsing duplicate URLs
/// within this lane and keeping the earliest-ranked hit.
fn fold_hits(
    hits: Vec<Hit>,
    lane_id: LaneId,
    handle: &ProviderHandle,
    position: usize,
    accumulated: &mut Vec<SourceRecord>,
    seen_urls: &mut HashSet<String>,
) {
    let mut ranked = hits;
    ranked.sort_by(|a, b| {
        b.raw_score
            .unwrap_or(0.0)
            .partial_cmp(&a.raw_score.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for (idx, raw_hit) in ranked.into_iter().enumerate() {
        // Non-UTF-8/malformed wire entries are dropped by the out-of-scope
        // backend adapter before a `Hit` is ever constructed; here we only
        // guard the one malformed shape that survives into this type.
        if raw_hit.canonical_url_or_key.trim().is_empty() {
            continue;
        }
        let key = raw_hit.canonical_url_or_key.trim().to_lowercase();
        if !seen_urls.insert(key) {
            continue;
        }
        accumulated.push(SourceRecord::from_hit(
            raw_hit,
            lane_id,
            handle.id.clone(),
            !handle.keyed,
            position * 100 + idx,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ModeBudgetTable;
    use crate::lanes::providers::{hit, ScriptedOutcome, SimulatedProvider};
    use crate::query::QueryMode;
    use crate::registry::{CostClass, RegistryConfig};
    use std::time::Duration;

    fn entry(provider: SimulatedProvider, handle: ProviderHandle) -> ChainEntry {
        ChainEntry {
            handle,
            provider: Arc::new(provider),
        }
    }

    #[tokio::test]
    async fn zero_hits_is_ok_not_failure() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        let handle = ProviderHandle::new("web-primary", ProviderKind::Web, true, CostClass::Standard);
        registry.register_chain(ProviderKind::Web, vec![handle.clone()]);

        let spec = LaneSpec {
            lane_id: LaneId::Web,
            provider_chain: vec![entry(
                SimulatedProvider::healthy_with_hits("web-primary", true, vec![]),
                handle,
            )],
            per_lane_budget_ms: 1_500,
            required: false,
        };

        let budget = Budget::from_mode(QueryMode::Simple, &ModeBudgetTable::default());
        let result = LaneExecutor::run(&spec, "q", &Constraints::default(), &budget, &registry, 2_500).await;
        assert_eq!(result.status, LaneStatus::Ok);
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_next_provider_on_error() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        let primary = ProviderHandle::new("primary", ProviderKind::Web, true, CostClass::Standard);
        let fallback = ProviderHandle::new("fallback", ProviderKind::Web, false, CostClass::Free);
        registry.register_chain(ProviderKind::Web, vec![primary.clone(), fallback.clone()]);

        let spec = LaneSpec {
            lane_id: LaneId::Web,
            provider_chain: vec![
                entry(
                    SimulatedProvider::new(
                        "primary",
                        true,
                        Duration::from_millis(5),
                        ScriptedOutcome::Error(RetrievalError::Unavailable("down".into())),
                    ),
                    primary,
                ),
                entry(
                    SimulatedProvider::healthy_with_hits(
                        "fallback",
                        false,
                        vec![hit("https://example.com/a", "A", "a", 0.8)],
                    ),
                    fallback,
                ),
            ],
            per_lane_budget_ms: 1_500,
            required: false,
        };

        let budget = Budget::from_mode(QueryMode::Simple, &ModeBudgetTable::default());
        let result = LaneExecutor::run(&spec, "q", &Constraints::default(), &budget, &registry, 2_500).await;
        assert_eq!(result.status, LaneStatus::Ok);
        assert_eq!(result.provider_used.as_deref(), Some("fallback"));
        assert_eq!(result.fallback_events.len(), 1);
        assert!(result.sources[0].keyed_fallback);
    }

    #[tokio::test]
    async fn duplicate_urls_within_lane_collapse() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        let handle = ProviderHandle::new("web-primary", ProviderKind::Web, true, CostClass::Standard);
        registry.register_chain(ProviderKind::Web, vec![handle.clone()]);

        let spec = LaneSpec {
            lane_id: LaneId::Web,
            provider_chain: vec![entry(
                SimulatedProvider::healthy_with_hits(
                    "web-primary",
                    true,
                    vec![
                        hit("https://example.com/a", "First", "first", 0.9),
                        hit("https://EXAMPLE.com/a", "Second", "second", 0.5),
                    ],
                ),
                handle,
            )],
            per_lane_budget_ms: 1_500,
            required: false,
        };

        let budget = Budget::from_mode(QueryMode::Simple, &ModeBudgetTable::default());
        let result = LaneExecutor::run(&spec, "q", &Constraints::default(), &budget, &registry, 2_500).await;
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].title, "First");
    }

    #[tokio::test]
    async fn pre_existing_down_provider_still_emits_a_fallback_event() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        let primary = ProviderHandle::new("primary", ProviderKind::Web, true, CostClass::Standard);
        let fallback = ProviderHandle::new("fallback", ProviderKind::Web, false, CostClass::Free);
        registry.register_chain(ProviderKind::Web, vec![primary.clone(), fallback.clone()]);
        registry.report_rate_limited("primary", Duration::from_secs(60));

        let spec = LaneSpec {
            lane_id: LaneId::Web,
            provider_chain: vec![
                entry(SimulatedProvider::healthy_with_hits("primary", true, vec![]), primary),
                entry(
                    SimulatedProvider::healthy_with_hits(
                        "fallback",
                        false,
                        vec![hit("https://example.com/a", "A", "a", 0.8)],
                    ),
                    fallback,
                ),
            ],
            per_lane_budget_ms: 1_500,
            required: false,
        };

        let budget = Budget::from_mode(QueryMode::Simple, &ModeBudgetTable::default());
        let result = LaneExecutor::run(&spec, "q", &Constraints::default(), &budget, &registry, 2_500).await;
        assert_eq!(result.status, LaneStatus::Ok);
        assert_eq!(result.provider_used.as_deref(), Some("fallback"));
        assert_eq!(result.fallback_events.len(), 1);
        assert!(result.sources[0].keyed_fallback);
    }

    #[tokio::test]
    async fn all_providers_down_yields_skipped() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        let handle = ProviderHandle::new("primary", ProviderKind::Web, true, CostClass::Standard);
        registry.register_chain(ProviderKind::Web, vec![handle.clone()]);
        registry.report_rate_limited("primary", Duration::from_secs(60));

        let spec = LaneSpec {
            lane_id: LaneId::Web,
            provider_chain: vec![entry(
                SimulatedProvider::healthy_with_hits("primary", true, vec![]),
                handle,
            )],
            per_lane_budget_ms: 1_500,
            required: false,
        };

        let budget = Budget::from_mode(QueryMode::Simple, &ModeBudgetTable::default());
        let result = LaneExecutor::run(&spec, "q", &Constraints::default(), &budget, &registry, 2_500).await;
        assert_eq!(result.status, LaneStatus::Skipped);
    }
}
