//! Query intake types.
//!
//! A [`Query`] is created once at intake and never mutated afterwards; every
//! downstream component either reads it by reference or clones the fields it
//! needs (e.g. Guided Refinement produces a *new* `Query` rather than editing
//! the original).

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Query mode, drives the Budget Controller's table and the
/// Model Router's tier preference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    Simple,
    Technical,
    Research,
    Multimedia,
}

impl Default for QueryMode {
    fn default() -> Self {
        QueryMode::Simple
    }
}

impl std::fmt::Display for QueryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueryMode::Simple => "simple",
            QueryMode::Technical => "technical",
            QueryMode::Research => "research",
            QueryMode::Multimedia => "multimedia",
        };
        write!(f, "{}", s)
    }
}

/// Recognized time-range constraint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    Any,
    Day,
    Week,
    Month,
    Year,
    Custom { from: String, to: String },
}

impl Default for TimeRange {
    fn default() -> Self {
        TimeRange::Any
    }
}

/// One of the five retrieval lanes named in the GLOSSARY.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LaneId {
    Web,
    Vector,
    Graph,
    News,
    Markets,
}

impl LaneId {
    pub const ALL: [LaneId; 5] = [
        LaneId::Web,
        LaneId::Vector,
        LaneId::Graph,
        LaneId::News,
        LaneId::Markets,
    ];
}

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LaneId::Web => "web",
            LaneId::Vector => "vector",
            LaneId::Graph => "graph",
            LaneId::News => "news",
            LaneId::Markets => "markets",
        };
        write!(f, "{}", s)
    }
}

/// Cost ceiling constraint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CostCeiling {
    FreeOnly,
    Low,
    Standard,
    Unlimited,
}

impl Default for CostCeiling {
    fn default() -> Self {
        CostCeiling::Standard
    }
}

/// Guided-refinement policy knob.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GuidedPromptPolicy {
    On,
    Off,
    AlwaysBypass,
    Adaptive,
}

impl Default for GuidedPromptPolicy {
    fn default() -> Self {
        GuidedPromptPolicy::Adaptive
    }
}

/// Recognized request constraints.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Constraints {
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default)]
    pub sources: HashSet<String>,
    #[serde(default)]
    pub require_citations: bool,
    #[serde(default)]
    pub cost_ceiling: CostCeiling,
    #[serde(default)]
    pub guided_prompt: GuidedPromptPolicy,
}

impl Constraints {
    /// Deterministic signature used by the Response Cache fingerprint
    ///.
    pub fn signature(&self) -> String {
        let mut sources: Vec<&str> = self.sources.iter().map(String::as_str).collect();
        sources.sort_unstable();
        format!(
            "{:?}|{}|{}|{:?}|{:?}",
            self.time_range,
            sources.join(","),
            self.require_citations,
            self.cost_ceiling,
            self.guided_prompt
        )
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("query must be between 1 and {max} characters, got {actual}")]
    LengthOutOfBounds { actual: usize, max: usize },
}

/// Maximum accepted raw query length.
pub const MAX_QUERY_CHARS: usize = 4096;

/// Immutable record created on intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    pub raw_text: String,
    pub normalized_text: String,
    pub mode: QueryMode,
    pub constraints: Constraints,
    pub trace_id: String,
    pub received_at: chrono::DateTime<chrono::Utc>,
}

impl Query {
    /// Validate and construct a `Query` from raw intake fields.
    pub fn new(
        raw_text: String,
        mode: QueryMode,
        constraints: Constraints,
        trace_id: Option<String>,
    ) -> Result<Self, ValidationError> {
        let char_count = raw_text.chars().count();
        if char_count == 0 || char_count > MAX_QUERY_CHARS {
            return Err(ValidationError::LengthOutOfBounds {
                actual: char_count,
                max: MAX_QUERY_CHARS,
            });
        }

        let normalized_text = normalize(&raw_text);

        Ok(Self {
            id: Uuid::new_v4(),
            raw_text,
            normalized_text,
            mode,
            constraints,
            trace_id: trace_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            received_at: chrono::Utc::now(),
        })
    }

    /// Produce a copy with a replaced query text, used after Guided
    /// Refinement accepts a rewrite. Constraints, mode and trace_id carry
    /// over; `id` and `received_at` are preserved so downstream telemetry
    /// still refers to one logical request.
    pub fn with_refined_text(&self, refined_text: String) -> Self {
        Self {
            normalized_text: normalize(&refined_text),
            raw_text: refined_text,
            ..self.clone()
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let received = self.received_at.timestamp_millis();
        (now - received).max(0) as u64
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_query() {
        let err = Query::new(String::new(), QueryMode::Simple, Constraints::default(), None)
            .unwrap_err();
        assert!(matches!(err, ValidationError::LengthOutOfBounds { actual: 0, .. }));
    }

    #[test]
    fn accepts_max_length_query() {
        let text = "a".repeat(MAX_QUERY_CHARS);
        let query = Query::new(text, QueryMode::Simple, Constraints::default(), None).unwrap();
        assert_eq!(query.raw_text.chars().count(), MAX_QUERY_CHARS);
    }

    #[test]
    fn rejects_over_length_query() {
        let text = "a".repeat(MAX_QUERY_CHARS + 1);
        let err = Query::new(text, QueryMode::Simple, Constraints::default(), None).unwrap_err();
        assert!(matches!(err, ValidationError::LengthOutOfBounds { .. }));
    }

    #[test]
    fn normalization_is_stable() {
        let q1 = Query::new(
            "  What  IS rag? ".to_string(),
            QueryMode::Simple,
            Constraints::default(),
            None,
        )
        .unwrap();
        let q2 = Query::new(
            "what is rag?".to_string(),
            QueryMode::Simple,
            Constraints::default(),
            None,
        )
        .unwrap();
        assert_eq!(q1.normalized_text, q2.normalized_text);
    }
}
