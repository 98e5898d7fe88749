//! Retrieval-backend interface.
//!
//! The wire implementation of concrete backends (vector index, lexical
//! index, knowledge graph, web/news/markets feeds) is explicitly out of
//! scope — this module defines only the trait boundary the Lane
//! Executor programs against, mirroring how `llm::traits::LLMProviderClient`
//! is the boundary the Model Router programs against for LLMs.

use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;

use crate::lanes::source::Hit;
use crate::query::Constraints;

#[derive(Debug, Error, Clone)]
pub enum RetrievalError {
    #[error("provider timed out")]
    Timeout,
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider error: {0}")]
    Other(String),
}

impl RetrievalError {
    /// Whether the Lane Executor should advance to the next provider in the
    /// chain rather than surfacing a hard failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetrievalError::Timeout | RetrievalError::RateLimited { .. })
    }
}

/// Outcome of one provider call. Streaming backends can
/// yield `Partial` when they had already produced some hits before an error
/// or cancellation cut the call short — the Lane Executor folds those into
/// its accumulator rather than discarding them.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Ok(Vec<Hit>),
    Partial(Vec<Hit>, RetrievalError),
    Err(RetrievalError),
}

/// Capability every retrieval backend offers.
#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    /// Stable identifier used for health tracking and `SourceRecord::provider_id`.
    fn id(&self) -> &str;

    /// Whether this provider requires an API key.
    fn keyed(&self) -> bool;

    async fn search(
        &self,
        normalized_query: &str,
        constraints: &Constraints,
        deadline: Instant,
    ) -> SearchOutcome;
}
