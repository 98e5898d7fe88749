//! HTTP surface: a single SSE query-intake endpoint plus a health check,
//! assembled as an Axum router with a CORS layer, a fallback route, and
//! `with_state`.

pub mod admin;
pub mod handlers;
pub mod types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::orchestrator::Orchestrator;
use admin::admin_status;
use handlers::{health_check, not_found, submit_query, ApiState};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080, cors_enabled: true }
    }
}

pub struct QueryApiServer {
    config: ApiConfig,
    state: ApiState,
}

impl QueryApiServer {
    pub fn new(config: ApiConfig, orchestrator: Arc<Orchestrator>) -> Self {
        Self { config, state: ApiState { orchestrator } }
    }

    pub fn create_router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(health_check))
            .route("/v1/query", post(submit_query))
            .route("/admin/status", get(admin_status))
            .with_state(self.state.clone())
            .fallback(not_found);

        if self.config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    pub async fn run(self) -> Result<(), std::io::Error> {
        let app = self.create_router();
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!("query orchestrator listening on http://{}", addr);
        info!("  POST http://{}/v1/query", addr);
        info!("  GET  http://{}/health", addr);

        axum::Server::bind(&addr.parse().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?)
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

/// Waits for ctrl-c so the server stops accepting new connections while
/// letting in-flight requests run to their own deadline.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining in-flight requests");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ModeBudgetTable;
    use crate::cache::{CacheTtlTable, ResponseCache};
    use crate::fusion::HeuristicDisagreementDetector;
    use crate::model_router::ModelCatalog;
    use crate::orchestrator::OrchestratorConfig;
    use crate::refinement::RefinementPolicy;
    use crate::registry::{ProviderRegistry, RegistryConfig};
    use crate::telemetry::NullTelemetrySink;
    use axum::http::{Method, StatusCode};
    use std::collections::HashMap;
    use tower::ServiceExt;

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

    fn test_orchestrator() -> Arc<Orchestrator> {
        let registry = Arc::new(ProviderRegistry::new(RegistryConfig::default()));
        Arc::new(Orchestrator::new(
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
        ))
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = QueryApiServer::new(ApiConfig::default(), test_orchestrator());
        let app = server.create_router();

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method(Method::GET)
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = QueryApiServer::new(ApiConfig::default(), test_orchestrator());
        let app = server.create_router();

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method(Method::GET)
                    .uri("/nope")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
