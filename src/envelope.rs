//! Answer envelope.
//!
//! The wire format streamed to clients: an ordered sequence of events
//! emitted by the Orchestrator as each component finishes its work.
//! Serialized as SSE `data:` frames by the HTTP surface (`api` module).

use serde::{Deserialize, Serialize};

use crate::fusion::{DisagreementFlag, FusedContext};
use crate::lanes::{LaneResult, SourceRecord};

/// A single inline citation. Invariant: every marker a Synthesizer emits
/// corresponds to exactly one `source_id` present in the citable set it
/// was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub marker_index: u32,
    pub source_id: String,
}

/// Final metrics attached to the terminal `done` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalMetrics {
    pub total_elapsed_ms: u64,
    pub truncated: bool,
    pub lanes_ok: u32,
    pub lanes_degraded: u32,
    pub model_used: Option<String>,
    pub cache_hit: bool,
}

/// Error kinds surfaced at the envelope boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeErrorKind {
    NoModelAvailable,
    Internal,
}

/// One event in the streamed `AnswerEnvelope`.
///
/// Ordering guarantees: events for a request have a total order;
/// `sources_finalized` strictly precedes any `token`; `lane_update` events
/// for one lane preserve that lane's production order, but lanes may
/// interleave with each other and with `token` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerEvent {
    LaneUpdate { lane: LaneResult },
    SourcesFinalized { summary: FusedContextSummary },
    Token { text: String, citations: Vec<Citation> },
    Disagreement { flag: DisagreementFlag },
    FallbackNotice { lane_id: crate::query::LaneId, from_provider: String, to_provider: String, reason: String },
    Done { metrics: FinalMetrics },
    Error { kind: EnvelopeErrorKind, message: String },
}

/// One entry in the citable bibliography: just enough for a client to
/// resolve a [`Citation::marker_index`] into something displayable, without
/// shipping the full [`SourceRecord`] (internal ranking/provider fields
/// stay server-side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BibliographyEntry {
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub domain: String,
}

impl From<&SourceRecord> for BibliographyEntry {
    fn from(source: &SourceRecord) -> Self {
        Self {
            source_id: source.source_id.clone(),
            title: source.title.clone(),
            url: source.url.clone(),
            domain: source.domain.clone(),
        }
    }
}

/// Trimmed view of a [`FusedContext`] sent over the wire — excerpts are
/// capped and the internal fusion metadata is summarized, not dumped raw.
/// `bibliography` is the citable list `Citation::marker_index` resolves
/// against, in the same rank order the Synthesizer was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedContextSummary {
    pub citable_count: usize,
    pub residual_count: usize,
    pub disagreement_count: usize,
    pub bibliography: Vec<BibliographyEntry>,
}

impl From<&FusedContext> for FusedContextSummary {
    fn from(ctx: &FusedContext) -> Self {
        Self {
            citable_count: ctx.citable.len(),
            residual_count: ctx.residual.len(),
            disagreement_count: ctx.disagreement_flags.len(),
            bibliography: ctx.citable.iter().map(BibliographyEntry::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tags_serialize_as_snake_case() {
        let event = AnswerEvent::Done {
            metrics: FinalMetrics {
                total_elapsed_ms: 100,
                truncated: false,
                lanes_ok: 1,
                lanes_degraded: 0,
                model_used: Some("m".to_string()),
                cache_hit: false,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"done\""));
    }
}
