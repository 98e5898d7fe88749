//! Admin status endpoint: exposes Provider
//! Registry health and Response Cache occupancy for local operability
//! tooling. Not part of the request path — no query ever touches this
//! module.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::registry::{Health, ProviderKind};

use super::handlers::ApiState;

/// Also `Deserialize` so the `admin` binary can parse this straight out of
/// a `GET /admin/status` response instead of duplicating the shape.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub id: String,
    pub keyed: bool,
    pub cost_class: String,
    pub health: Health,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChainStatus {
    pub kind: ProviderKind,
    pub providers: Vec<ProviderStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminStatus {
    pub chains: Vec<ChainStatus>,
    pub cache_entries: u64,
    pub cache_in_flight: usize,
}

/// GET /admin/status
pub async fn admin_status(State(state): State<ApiState>) -> Json<AdminStatus> {
    let chains = state
        .orchestrator
        .registry()
        .snapshot()
        .into_iter()
        .map(|(kind, providers)| ChainStatus {
            kind,
            providers: providers
                .into_iter()
                .map(|(handle, health)| ProviderStatus {
                    id: handle.id,
                    keyed: handle.keyed,
                    cost_class: handle.cost_class.to_string(),
                    health,
                })
                .collect(),
        })
        .collect();

    Json(AdminStatus {
        chains,
        cache_entries: state.orchestrator.cache().entry_count(),
        cache_in_flight: state.orchestrator.cache().in_flight_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ModeBudgetTable;
    use crate::cache::{CacheTtlTable, ResponseCache};
    use crate::fusion::HeuristicDisagreementDetector;
    use crate::model_router::ModelCatalog;
    use crate::orchestrator::{Orchestrator, OrchestratorConfig};
    use crate::refinement::RefinementPolicy;
    use crate::registry::{CostClass, ProviderHandle, ProviderRegistry, RegistryConfig};
    use crate::telemetry::NullTelemetrySink;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct PanicRefiner;
    #[async_trait::async_trait]
    impl crate::refinement::Refiner for PanicRefiner {
        async fn suggest(
            &self,
            _q: &str,
            _cap: u8,
        ) -> Result<Vec<crate::refinement::RefinementSuggestion>, crate::refinement::RefinementError> {
            panic!("refiner should not run under an Off policy")
        }
    }

    #[tokio::test]
    async fn status_reports_registered_chains_and_cache_occupancy() {
        let registry = Arc::new(ProviderRegistry::new(RegistryConfig::default()));
        registry.register_chain(
            ProviderKind::Web,
            vec![ProviderHandle::new("web-primary", ProviderKind::Web, true, CostClass::Standard)],
        );

        let orchestrator = Arc::new(Orchestrator::new(
            OrchestratorConfig {
                refinement_policy: RefinementPolicy { enabled: crate::query::GuidedPromptPolicy::Off, ..Default::default() },
                budget_table: ModeBudgetTable::default(),
                ..OrchestratorConfig::default()
            },
            registry,
            HashMap::new(),
            Arc::new(PanicRefiner),
            Arc::new(HeuristicDisagreementDetector),
            ModelCatalog::new(),
            HashMap::new(),
            Arc::new(ResponseCache::new(CacheTtlTable::default(), 100)),
            Arc::new(NullTelemetrySink),
        ));

        let Json(status) = admin_status(State(ApiState { orchestrator })).await;
        assert_eq!(status.chains.len(), 1);
        assert_eq!(status.chains[0].providers[0].id, "web-primary");
        assert_eq!(status.cache_entries, 0);
    }
}
