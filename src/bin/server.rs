//! Query Orchestrator server binary.
//!
//! Composition root: loads [`Config`], wires the provider registry (one
//! [`SimulatedProvider`] chain per retrieval lane, plus an LLM chain built
//! from whichever provider API keys are present in the environment), builds
//! the [`Orchestrator`], and serves it over HTTP/SSE. Run with:
//! `cargo run --bin server`.

use std::collections::HashMap;
use std::sync::Arc;

use aperture_orchestrator::api::{ApiConfig, QueryApiServer};
use aperture_orchestrator::config::Config;
use aperture_orchestrator::fusion::HeuristicDisagreementDetector;
use aperture_orchestrator::lanes::providers::{hit, SimulatedProvider};
use aperture_orchestrator::lanes::{ChainEntry, LaneSpec};
use aperture_orchestrator::llm::providers::{anthropic, google, openai};
use aperture_orchestrator::llm::traits::LLMProviderClient;
use aperture_orchestrator::model_router::{ModelCapability, ModelCatalog};
use aperture_orchestrator::orchestrator::{ModelClientBinding, Orchestrator, OrchestratorConfig};
use aperture_orchestrator::refinement::NoopRefiner;
use aperture_orchestrator::registry::{CostClass, ProviderHandle, ProviderKind, ProviderRegistry};
use aperture_orchestrator::cache::ResponseCache;
use aperture_orchestrator::query::LaneId;
use aperture_orchestrator::telemetry::{NullTelemetrySink, TelemetrySink};
use tracing::{info, warn};

/// Demo hits served by every lane's [`SimulatedProvider`]. A real deployment
/// replaces this with an HTTP-backed [`aperture_orchestrator::lanes::RetrievalProvider`]
/// per backend.
fn demo_hits_for(lane: LaneId) -> Vec<aperture_orchestrator::lanes::source::Hit> {
    match lane {
        LaneId::Web => vec![hit(
            "https://example.com/rag-overview",
            "Retrieval-Augmented Generation",
            "RAG combines a retrieval step with a generation step so answers can cite sources.",
            0.91,
        )],
        LaneId::Vector => vec![hit(
            "vector://corpus/doc-42",
            "Internal design note: context fusion",
            "Fusion dedups near-duplicate passages before ranking by source-type weight.",
            0.87,
        )],
        LaneId::Graph => vec![hit(
            "graph://entity/rag",
            "RAG (entity)",
            "Related entities: vector index, reranker, citation.",
            0.74,
        )],
        LaneId::News => vec![hit(
            "https://news.example.com/llm-roundup",
            "This week in LLM tooling",
            "Coverage of retrieval-augmented systems shipping to production.",
            0.68,
        )],
        LaneId::Markets => vec![hit(
            "markets://ticker/none",
            "No market data relevant to this query",
            "",
            0.0,
        )],
    }
}

/// One [`LaneSpec`] per [`LaneId`], each backed by a single healthy
/// [`SimulatedProvider`] registered as that lane's sole chain entry.
fn build_lane_specs(registry: &ProviderRegistry) -> HashMap<LaneId, Arc<LaneSpec>> {
    let mut lane_specs = HashMap::new();
    let budget_table = aperture_orchestrator::budget::ModeBudgetTable::default();

    for lane in LaneId::ALL {
        let provider_id = format!("{}-primary", lane);
        let handle = ProviderHandle::new(provider_id.clone(), ProviderKind::from(lane), true, CostClass::Standard);
        registry.register_chain(ProviderKind::from(lane), vec![handle.clone()]);

        lane_specs.insert(
            lane,
            Arc::new(LaneSpec {
                lane_id: lane,
                provider_chain: vec![ChainEntry {
                    handle,
                    provider: Arc::new(SimulatedProvider::healthy_with_hits(
                        provider_id,
                        true,
                        demo_hits_for(lane),
                    )),
                }],
                per_lane_budget_ms: budget_table.simple.per_lane_cap_ms,
                required: false,
            }),
        );
    }
    lane_specs
}

/// Registers one LLM provider chain entry per API key found in the
/// environment. Returns an empty map (and an empty chain) if no key is
/// configured — the Orchestrator then always answers with
/// [`aperture_orchestrator::model_router::NoModelAvailable`], which is a
/// deliberate fail-closed default rather than a silent stub.
fn build_model_clients(
    registry: &ProviderRegistry,
    catalog: &mut ModelCatalog,
) -> HashMap<String, ModelClientBinding> {
    let mut clients: HashMap<String, ModelClientBinding> = HashMap::new();
    let mut chain = Vec::new();

    if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        let base_url = std::env::var("OPENAI_BASE_URL").ok();
        let client = openai::create_client(api_key.clone(), base_url);
        let handle = ProviderHandle::new("openai-gpt4", ProviderKind::Llm, true, CostClass::Premium);
        chain.push(handle.clone());
        catalog.register("openai-gpt4", vec![ModelCapability::General, ModelCapability::Code]);
        clients.insert(
            "openai-gpt4".to_string(),
            ModelClientBinding {
                client: Arc::new(client) as Arc<dyn LLMProviderClient>,
                api_key,
                model_id: "gpt-4o".to_string(),
            },
        );
        info!("wired OpenAI provider into the LLM chain");
    }

    if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
        let base_url = std::env::var("ANTHROPIC_BASE_URL").ok();
        let client = anthropic::create_client(api_key.clone(), base_url);
        let handle = ProviderHandle::new("anthropic-claude", ProviderKind::Llm, true, CostClass::Standard);
        chain.push(handle.clone());
        catalog.register("anthropic-claude", vec![ModelCapability::General, ModelCapability::Code]);
        clients.insert(
            "anthropic-claude".to_string(),
            ModelClientBinding {
                client: Arc::new(client) as Arc<dyn LLMProviderClient>,
                api_key,
                model_id: "claude-3-5-sonnet-latest".to_string(),
            },
        );
        info!("wired Anthropic provider into the LLM chain");
    }

    if let Ok(api_key) = std::env::var("GOOGLE_API_KEY") {
        let base_url = std::env::var("GOOGLE_BASE_URL").ok();
        let client = google::create_client(api_key.clone(), base_url);
        let handle = ProviderHandle::new("google-gemini", ProviderKind::Llm, false, CostClass::Low);
        chain.push(handle.clone());
        catalog.register("google-gemini", vec![ModelCapability::General]);
        clients.insert(
            "google-gemini".to_string(),
            ModelClientBinding {
                client: Arc::new(client) as Arc<dyn LLMProviderClient>,
                api_key,
                model_id: "gemini-1.5-pro".to_string(),
            },
        );
        info!("wired Google provider into the LLM chain");
    }

    if chain.is_empty() {
        warn!("no LLM provider API key found (OPENAI_API_KEY / ANTHROPIC_API_KEY / GOOGLE_API_KEY); synthesis will fail closed");
    }
    registry.register_chain(ProviderKind::Llm, chain);
    clients
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::load()?;
    info!("configuration loaded and validated");

    let registry = Arc::new(ProviderRegistry::new(config.registry));
    let lane_specs = build_lane_specs(&registry);

    let mut model_catalog = ModelCatalog::new();
    let model_clients = build_model_clients(&registry, &mut model_catalog);

    let cache = Arc::new(ResponseCache::new(config.cache_ttl_table, config.cache_max_entries));
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(NullTelemetrySink);

    registry.spawn_health_probes(config.health_probe_interval, |_handle| async move {
        // No real backend to probe in this demo composition; a production
        // deployment replaces this closure with a cheap per-provider ping.
        true
    });

    let orchestrator = Arc::new(Orchestrator::new(
        OrchestratorConfig {
            budget_table: config.budget_table,
            refinement_policy: config.refinement_policy,
            ..OrchestratorConfig::default()
        },
        registry,
        lane_specs,
        Arc::new(NoopRefiner),
        Arc::new(HeuristicDisagreementDetector),
        model_catalog,
        model_clients,
        cache,
        telemetry,
    ));

    let api_config = ApiConfig {
        host: config.server.host,
        port: config.server.port,
        cors_enabled: config.server.cors_enabled,
    };
    let server = QueryApiServer::new(api_config, orchestrator);
    server.run().await?;

    Ok(())
}
