//! Model Router.
//!
//! Chooses an ordered LLM chain for synthesis given the query mode, the
//! fused context's size, the caller's cost ceiling, and live provider
//! health from the [`ProviderRegistry`]. Never talks to a model directly —
//! that's the Synthesizer's job once it has this chain.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::{CostCeiling, QueryMode};
use crate::registry::{CostClass, Health, ProviderHandle, ProviderKind, ProviderRegistry};

/// Capability tags used to steer `technical` queries toward code-capable
/// models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelCapability {
    General,
    Code,
}

/// Static side-table mapping a provider id to the capabilities of the
/// model it serves. Populated once at the composition root alongside the
/// registry's provider chains.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: std::collections::HashMap<String, Vec<ModelCapability>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider_id: impl Into<String>, capabilities: Vec<ModelCapability>) {
        self.entries.insert(provider_id.into(), capabilities);
    }

    fn supports(&self, provider_id: &str, capability: ModelCapability) -> bool {
        self.entries
            .get(provider_id)
            .map(|caps| caps.contains(&capability))
            .unwrap_or(false)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no healthy model available within cost ceiling for mode {mode:?}")]
pub struct NoModelAvailable {
    pub mode: QueryMode,
}

/// Upper bound on [`CostClass`] implied by a [`CostCeiling`] constraint.
fn max_allowed_cost_class(ceiling: CostCeiling) -> CostClass {
    match ceiling {
        CostCeiling::FreeOnly => CostClass::Free,
        CostCeiling::Low => CostClass::Low,
        CostCeiling::Standard => CostClass::Standard,
        CostCeiling::Unlimited => CostClass::Premium,
    }
}

/// Select an ordered chain of LLM provider handles for `mode`.
///
/// The chain is ordered by preference; the Synthesizer tries each in turn
/// on failure, same as a [`crate::lanes::LaneSpec`] provider chain.
pub fn select_chain(
    mode: QueryMode,
    cost_ceiling: CostCeiling,
    catalog: &ModelCatalog,
    registry: &ProviderRegistry,
) -> Result<Vec<ProviderHandle>, NoModelAvailable> {
    let ceiling = max_allowed_cost_class(cost_ceiling);
    let candidates = registry.chain_for(ProviderKind::Llm);

    let acceptable: Vec<(ProviderHandle, Health)> = candidates
        .into_iter()
        .filter(|(handle, _)| handle.cost_class <= ceiling)
        .collect();

    let mut ranked: Vec<ProviderHandle> = match mode {
        QueryMode::Simple => {
            // Cheapest healthy model meeting a minimum quality tier
            // (Free-tier models are excluded as below the floor).
            let mut pool: Vec<ProviderHandle> = acceptable
                .iter()
                .filter(|(handle, _)| handle.cost_class > CostClass::Free)
                .map(|(h, _)| h.clone())
                .collect();
            pool.sort_by_key(|h| h.cost_class);
            pool
        }
        QueryMode::Technical => {
            let (code_capable, rest): (Vec<_>, Vec<_>) = acceptable
                .iter()
                .map(|(h, _)| h.clone())
                .partition(|h| catalog.supports(&h.id, ModelCapability::Code));
            let mut ranked = code_capable;
            ranked.extend(rest);
            ranked
        }
        QueryMode::Research | QueryMode::Multimedia => {
            let mut pool: Vec<ProviderHandle> = acceptable.iter().map(|(h, _)| h.clone()).collect();
            // Premium first, degrading toward Standard.
            pool.sort_by(|a, b| b.cost_class.cmp(&a.cost_class));
            pool
        }
    };

    // Within each rule's ordering, push unhealthy/down candidates to the
    // back without discarding them, matching the registry's own
    // health-aware but non-destructive ordering.
    let health_of = |id: &str| -> Health {
        acceptable
            .iter()
            .find(|(h, _)| h.id == id)
            .map(|(_, health)| *health)
            .unwrap_or(Health::Down)
    };
    ranked.sort_by_key(|h| match health_of(&h.id) {
        Health::Healthy => 0,
        Health::Degraded => 1,
        Health::Down => 2,
    });

    if ranked.iter().all(|h| health_of(&h.id) == Health::Down) || ranked.is_empty() {
        return Err(NoModelAvailable { mode });
    }

    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: &str, cost: CostClass) -> ProviderHandle {
        ProviderHandle::new(id, ProviderKind::Llm, true, cost)
    }

    fn registry_with(handles: Vec<ProviderHandle>) -> ProviderRegistry {
        let registry = ProviderRegistry::new(crate::registry::RegistryConfig::default());
        registry.register_chain(ProviderKind::Llm, handles);
        registry
    }

    #[test]
    fn simple_mode_prefers_cheapest_above_free() {
        let registry = registry_with(vec![
            handle("premium-a", CostClass::Premium),
            handle("free-a", CostClass::Free),
            handle("low-a", CostClass::Low),
        ]);
        let chain = select_chain(
            QueryMode::Simple,
            CostCeiling::Unlimited,
            &ModelCatalog::new(),
            &registry,
        )
        .unwrap();
        assert_eq!(chain[0].id, "low-a");
    }

    #[test]
    fn technical_mode_prefers_code_capable_model() {
        let mut catalog = ModelCatalog::new();
        catalog.register("coder", vec![ModelCapability::Code]);
        let registry = registry_with(vec![
            handle("generalist", CostClass::Standard),
            handle("coder", CostClass::Standard),
        ]);
        let chain = select_chain(QueryMode::Technical, CostCeiling::Unlimited, &catalog, &registry).unwrap();
        assert_eq!(chain[0].id, "coder");
    }

    #[test]
    fn research_mode_prefers_premium_tier() {
        let registry = registry_with(vec![
            handle("standard-a", CostClass::Standard),
            handle("premium-a", CostClass::Premium),
        ]);
        let chain = select_chain(
            QueryMode::Research,
            CostCeiling::Unlimited,
            &ModelCatalog::new(),
            &registry,
        )
        .unwrap();
        assert_eq!(chain[0].id, "premium-a");
    }

    #[test]
    fn cost_ceiling_excludes_premium_models() {
        let registry = registry_with(vec![
            handle("standard-a", CostClass::Standard),
            handle("premium-a", CostClass::Premium),
        ]);
        let chain = select_chain(
            QueryMode::Research,
            CostCeiling::Standard,
            &ModelCatalog::new(),
            &registry,
        )
        .unwrap();
        assert!(chain.iter().all(|h| h.id != "premium-a"));
    }

    #[test]
    fn all_down_yields_no_model_available() {
        let registry = registry_with(vec![handle("only", CostClass::Standard)]);
        registry.report_rate_limited("only", std::time::Duration::from_secs(60));
        let err = select_chain(
            QueryMode::Simple,
            CostCeiling::Unlimited,
            &ModelCatalog::new(),
            &registry,
        )
        .unwrap_err();
        assert_eq!(err.mode, QueryMode::Simple);
    }
}
