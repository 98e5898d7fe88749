//! Provider Registry.
//!
//! Holds typed handles to every retrieval backend and LLM provider, tracks
//! health and rate-limit state, and yields ordered fallback chains. Health is
//! the only piece of shared mutable state in the whole orchestrator; it
//! lives behind [`dashmap::DashMap`] so readers never block writers for
//! longer than one entry update.

pub mod provider;

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

pub use provider::{CostClass, Health, ProviderHandle, ProviderKind};

/// Mutable health/rate-limit record for one provider. Updated under the
/// registry's map entry lock; never read directly by lane workers — they
/// consult [`ProviderRegistry::chain_for`], which snapshots this into a
/// plain `Health` value.
#[derive(Debug, Clone)]
struct HealthRecord {
    health: Health,
    consecutive_failures: u32,
    cooled_down_until: Option<Instant>,
    rate_limited_until: Option<Instant>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            health: Health::Healthy,
            consecutive_failures: 0,
            cooled_down_until: None,
            rate_limited_until: None,
        }
    }
}

impl HealthRecord {
    fn effective_health(&self) -> Health {
        let now = Instant::now();
        if self.rate_limited_until.map(|t| now < t).unwrap_or(false) {
            return Health::Down;
        }
        if self.cooled_down_until.map(|t| now < t).unwrap_or(false) {
            return Health::Degraded;
        }
        self.health
    }
}

/// Registry configuration.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub health_cooldown: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_cooldown: Duration::from_millis(30_000),
        }
    }
}

/// A lane or LLM-class provider chain: the preferred (typically keyed)
/// provider first, fallbacks after.
pub type ProviderChain = Vec<ProviderHandle>;

/// Central registry of provider handles and their chains.
///
/// Chains are registered once at startup (composition root) and are never
/// mutated afterwards — only the health table changes at request time — so
/// `chains` itself needs no lock.
pub struct ProviderRegistry {
    config: RegistryConfig,
    chains: DashMap<ProviderKind, ProviderChain>,
    health: DashMap<String, HealthRecord>,
}

impl ProviderRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            chains: DashMap::new(),
            health: DashMap::new(),
        }
    }

    /// Register the fallback chain for one provider kind (retrieval lane or
    /// the LLM tier). The first handle is the preferred provider.
    pub fn register_chain(&self, kind: ProviderKind, chain: ProviderChain) {
        for handle in &chain {
            self.health.entry(handle.id.clone()).or_default();
        }
        self.chains.insert(kind, chain);
    }

    /// Yield the ordered chain for a kind, annotated with live health. An
    /// unhealthy/rate-limited provider is kept in the chain (so callers can
    /// report degradation) but sorted after healthy ones, preserving
    /// relative order within each health bucket.
    pub fn chain_for(&self, kind: ProviderKind) -> Vec<(ProviderHandle, Health)> {
        let Some(chain) = self.chains.get(&kind) else {
            return Vec::new();
        };
        let mut annotated: Vec<(ProviderHandle, Health)> = chain
            .iter()
            .map(|handle| {
                let health = self
                    .health
                    .get(&handle.id)
                    .map(|rec| rec.effective_health())
                    .unwrap_or(Health::Healthy);
                (handle.clone(), health)
            })
            .collect();
        annotated.sort_by_key(|(_, health)| match health {
            Health::Healthy => 0,
            Health::Degraded => 1,
            Health::Down => 2,
        });
        annotated
    }

    /// Report a successful call: clears the failure streak and cooldown.
    pub fn report_success(&self, provider_id: &str) {
        if let Some(mut rec) = self.health.get_mut(provider_id) {
            rec.consecutive_failures = 0;
            rec.cooled_down_until = None;
            rec.health = Health::Healthy;
        }
        debug!(provider_id, "provider reported healthy");
    }

    /// Report a retryable failure: degrades the provider for the configured
    /// cooldown window.
    pub fn report_retryable_failure(&self, provider_id: &str) {
        let mut rec = self.health.entry(provider_id.to_string()).or_default();
        rec.consecutive_failures += 1;
        rec.cooled_down_until = Some(Instant::now() + self.config.health_cooldown);
        rec.health = Health::Degraded;
        warn!(provider_id, failures = rec.consecutive_failures, "provider cooling down");
    }

    /// Report a rate-limit response: the provider is treated as `Down`
    /// until the given retry-after elapses.
    pub fn report_rate_limited(&self, provider_id: &str, retry_after: Duration) {
        let mut rec = self.health.entry(provider_id.to_string()).or_default();
        rec.rate_limited_until = Some(Instant::now() + retry_after);
        warn!(provider_id, ?retry_after, "provider rate limited");
    }

    /// Report a non-retryable failure: recorded but does not trigger a
    /// cooldown — the caller already moved to the next provider.
    pub fn report_hard_failure(&self, provider_id: &str) {
        if let Some(mut rec) = self.health.get_mut(provider_id) {
            rec.consecutive_failures += 1;
        }
    }

    /// Full point-in-time view of every registered chain and its live
    /// health, used by the admin surface —
    /// never consulted on the request path.
    pub fn snapshot(&self) -> Vec<(ProviderKind, Vec<(ProviderHandle, Health)>)> {
        self.chains.iter().map(|entry| (*entry.key(), self.chain_for(*entry.key()))).collect()
    }

    /// Background health probe hook: refreshes health asynchronously.
    /// Never blocks request-path callers — spawned once at startup and runs
    /// independently.
    pub fn spawn_health_probes<F, Fut>(self: &std::sync::Arc<Self>, interval: Duration, probe: F)
    where
        F: Fn(ProviderHandle) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = bool> + Send,
    {
        let registry = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let handles: Vec<ProviderHandle> = registry
                    .chains
                    .iter()
                    .flat_map(|entry| entry.value().clone())
                    .collect();
                for handle in handles {
                    let healthy = probe(handle.clone()).await;
                    if healthy {
                        registry.report_success(&handle.id);
                    } else {
                        registry.report_retryable_failure(&handle.id);
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: &str, keyed: bool) -> ProviderHandle {
        ProviderHandle::new(id, ProviderKind::Web, keyed, CostClass::Standard)
    }

    #[test]
    fn unhealthy_providers_sort_after_healthy_ones() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        registry.register_chain(
            ProviderKind::Web,
            vec![handle("primary", true), handle("fallback", false)],
        );
        registry.report_retryable_failure("primary");

        let chain = registry.chain_for(ProviderKind::Web);
        assert_eq!(chain[0].0.id, "fallback");
        assert_eq!(chain[1].0.id, "primary");
        assert_eq!(chain[1].1, Health::Degraded);
    }

    #[test]
    fn success_clears_degradation() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        registry.register_chain(ProviderKind::Web, vec![handle("primary", true)]);
        registry.report_retryable_failure("primary");
        registry.report_success("primary");
        let chain = registry.chain_for(ProviderKind::Web);
        assert_eq!(chain[0].1, Health::Healthy);
    }

    #[test]
    fn rate_limited_provider_is_down() {
        let registry = ProviderRegistry::new(RegistryConfig::default());
        registry.register_chain(ProviderKind::Web, vec![handle("primary", true)]);
        registry.report_rate_limited("primary", Duration::from_secs(60));
        let chain = registry.chain_for(ProviderKind::Web);
        assert_eq!(chain[0].1, Health::Down);
    }
}
