//! Query Orchestrator for a multi-lane knowledge-search platform.
//!
//! Given a user query and mode, the Orchestrator ([`orchestrator::Orchestrator`])
//! sequences:
//!
//! 1. [`budget`] — derives a hard wall-clock [`budget::Budget`] from the query mode.
//! 2. [`refinement`] — an optional, separately-budgeted rewrite pass.
//! 3. [`lanes`] — bounded, concurrent multi-lane retrieval with per-provider fallback.
//! 4. [`fusion`] — dedup, rank, and attribute sources into a [`fusion::FusedContext`].
//! 5. [`model_router`] — selects an ordered LLM fallback chain.
//! 6. [`synthesizer`] — streams cited tokens from the chosen model.
//!
//! Every step is guarded by the same [`budget::Budget`]; exhausting it is the
//! sole authoritative stop signal. The [`cache`] module coalesces concurrent
//! identical requests and replays cached results. [`registry`] is the shared
//! mutable state (provider health) every other module consults but never
//! owns. [`telemetry`] records a per-request summary regardless of outcome.
//! [`api`] exposes this as an HTTP/SSE endpoint; [`config`] resolves process
//! settings once at startup.

pub mod api;
pub mod budget;
pub mod cache;
pub mod config;
pub mod envelope;
pub mod fusion;
pub mod lanes;
pub mod llm;
pub mod model_router;
pub mod orchestrator;
pub mod query;
pub mod refinement;
pub mod registry;
pub mod synthesizer;
pub mod telemetry;

use thiserror::Error;

/// Crate-level error type for failures that don't belong to one specific
/// module (e.g. composition-root wiring). Individual modules define their
/// own `thiserror` enums (`budget::BudgetExceeded`, `query::ValidationError`,
/// `model_router::NoModelAvailable`, ...) and are not funneled through this
/// type.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
