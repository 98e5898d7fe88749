//! Source records and lane results.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::query::LaneId;

/// A single retrieval hit before canonicalization, as returned by the
/// retrieval-backend interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub canonical_url_or_key: String,
    pub title: String,
    pub excerpt: String,
    pub raw_score: Option<f64>,
    pub ts: Option<chrono::DateTime<chrono::Utc>>,
    pub language: Option<String>,
}

/// Deterministic `source_id` derived from a canonical URL or document key
///.
pub fn source_id(canonical_url_or_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_url_or_key.trim().to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.domain().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// A canonicalized, attributed source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: String,
    pub lanes: Vec<LaneId>,
    pub provider_id: String,
    pub keyed_fallback: bool,
    pub title: String,
    pub url: String,
    pub domain: String,
    pub excerpt: String,
    pub raw_score: f64,
    pub ts: Option<chrono::DateTime<chrono::Utc>>,
    pub language: Option<String>,
}

impl SourceRecord {
    pub fn from_hit(hit: Hit, lane_id: LaneId, provider_id: String, keyed_fallback: bool, position: usize) -> Self {
        let raw_score = hit.raw_score.unwrap_or_else(|| 1.0 / (position as f64 + 1.0));
        Self {
            source_id: source_id(&hit.canonical_url_or_key),
            lanes: vec![lane_id],
            provider_id,
            keyed_fallback,
            title: hit.title,
            domain: extract_domain(&hit.canonical_url_or_key),
            url: hit.canonical_url_or_key,
            excerpt: hit.excerpt,
            raw_score,
            ts: hit.ts,
            language: hit.language,
        }
    }
}

/// Outcome of one lane's run against its provider chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LaneStatus {
    Ok,
    Partial,
    Timeout,
    Error,
    Skipped,
}

/// Internal signal recorded when a lane falls through to a non-preferred
/// provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackEvent {
    pub lane_id: LaneId,
    pub from_provider: String,
    pub to_provider: String,
    pub reason: String,
}

/// The result of running a [`crate::lanes::LaneSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneResult {
    pub lane_id: LaneId,
    pub provider_used: Option<String>,
    pub status: LaneStatus,
    pub sources: Vec<SourceRecord>,
    pub elapsed_ms: u64,
    pub budget_ms: u64,
    pub error: Option<String>,
    #[serde(default)]
    pub fallback_events: Vec<FallbackEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_url_yields_same_source_id() {
        let a = source_id("https://Example.com/Page");
        let b = source_id("  https://example.com/page  ");
        assert_eq!(a, b);
    }

    #[test]
    fn different_urls_yield_different_ids() {
        assert_ne!(source_id("https://a.example/x"), source_id("https://b.example/x"));
    }

    #[test]
    fn hit_without_score_uses_position_fallback() {
        let hit = Hit {
            canonical_url_or_key: "https://example.com/a".into(),
            title: "A".into(),
            excerpt: "".into(),
            raw_score: None,
            ts: None,
            language: None,
        };
        let rec = SourceRecord::from_hit(hit, LaneId::Web, "primary".into(), false, 0);
        assert!((rec.raw_score - 1.0).abs() < 1e-9);
    }
}
