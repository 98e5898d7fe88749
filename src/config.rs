//! Process configuration. A typed `Config`, built once at the composition
//! root from environment variables with a plain `Default` + env-var
//! override idiom, and validated before the server binds a socket.

use std::time::Duration;

use thiserror::Error;

use crate::budget::ModeBudgetTable;
use crate::cache::CacheTtlTable;
use crate::query::GuidedPromptPolicy;
use crate::refinement::RefinementPolicy;
use crate::registry::RegistryConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mode budget for {mode}: refinement ({refinement}ms) + retrieval ({retrieval}ms) + synthesis ({synthesis}ms) exceeds total ({total}ms)")]
    ModeBudgetOverrun {
        mode: &'static str,
        refinement: u64,
        retrieval: u64,
        synthesis: u64,
        total: u64,
    },
    #[error("SERVER_PORT must be a valid port number: {0}")]
    InvalidPort(String),
    #[error("cache_max_entries must be greater than zero")]
    ZeroCacheCapacity,
}

/// HTTP surface settings (host/port/CORS).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            cors_enabled: std::env::var("CORS_ENABLED")
                .map(|v| v != "false")
                .unwrap_or(true),
        }
    }
}

/// Top-level process configuration. Parsed once in `src/bin/server.rs` and
/// never re-read per request — every downstream component is handed the
/// already-resolved values (`ModeBudgetTable`, `RefinementPolicy`, etc.),
/// not this struct itself.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub budget_table: ModeBudgetTable,
    pub refinement_policy: RefinementPolicy,
    pub cache_ttl_table: CacheTtlTable,
    pub cache_max_entries: u64,
    pub registry: RegistryConfig,
    pub health_probe_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            budget_table: ModeBudgetTable::default(),
            refinement_policy: Self::refinement_policy_from_env(),
            cache_ttl_table: CacheTtlTable::default(),
            cache_max_entries: std::env::var("CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            registry: RegistryConfig::default(),
            health_probe_interval: Duration::from_secs(
                std::env::var("HEALTH_PROBE_INTERVAL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

impl Config {
    /// Load configuration, applying `.env` overrides (caller invokes
    /// `dotenv::dotenv()` before this) and validating the result.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    fn refinement_policy_from_env() -> RefinementPolicy {
        let enabled = match std::env::var("GUIDED_PROMPT_POLICY").as_deref() {
            Ok("on") => GuidedPromptPolicy::On,
            Ok("off") => GuidedPromptPolicy::Off,
            Ok("always_bypass") => GuidedPromptPolicy::AlwaysBypass,
            _ => GuidedPromptPolicy::Adaptive,
        };
        RefinementPolicy { enabled, ..RefinementPolicy::default() }
    }

    /// Catch contradictory mode budgets (refinement + retrieval + synthesis
    /// > total) and a zero cache capacity before the server binds a socket
    ///.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_max_entries == 0 {
            return Err(ConfigError::ZeroCacheCapacity);
        }

        let rows: [(&'static str, crate::budget::ModeBudget); 4] = [
            ("simple", self.budget_table.simple),
            ("technical", self.budget_table.technical),
            ("research", self.budget_table.research),
            ("multimedia", self.budget_table.multimedia),
        ];
        for (name, row) in rows {
            let sum = row.refinement_ms + row.retrieval_ms + row.synthesis_ms;
            if sum > row.total_ms {
                return Err(ConfigError::ModeBudgetOverrun {
                    mode: name,
                    refinement: row.refinement_ms,
                    retrieval: row.retrieval_ms,
                    synthesis: row.synthesis_ms,
                    total: row.total_ms,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_cache_capacity_is_rejected() {
        let mut config = Config::default();
        config.cache_max_entries = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCacheCapacity)));
    }

    #[test]
    fn overrunning_mode_budget_is_rejected() {
        let mut config = Config::default();
        config.budget_table.simple.refinement_ms = config.budget_table.simple.total_ms;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ModeBudgetOverrun { mode: "simple", .. }));
    }
}
