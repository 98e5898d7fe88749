//! LLM Providers Module
//! 
//! This module contains implementations for different LLM providers, organized
//! by provider with each having their own subdirectory containing:
//! - client.rs: Provider-specific client implementation
//! - config.rs: Provider-specific configuration and model definitions
//! - types.rs: Provider-specific request/response types
//! - mod.rs: Module exports

pub mod openai;
pub mod anthropic;
pub mod google;
pub mod ollama;

// Re-export provider clients for convenience. The composition root
// (`src/bin/server.rs`) wires these in directly via each module's
// `create_client`; there is no separate provider-kind-keyed factory/registry
// here — the orchestrator's own `registry::ProviderRegistry` already owns
// that job for every backend, retrieval lanes included.
pub use openai::OpenAIClient;
pub use anthropic::AnthropicClient;
pub use google::GoogleClient;
pub use ollama::OllamaClient;