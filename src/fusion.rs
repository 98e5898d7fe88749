//! Fusion & Attribution.
//!
//! Merges all [`LaneResult`]s into one deduplicated, ranked
//! [`FusedContext`]. Fusion never fails for lack of sources — an empty
//! context is valid and handed to the Synthesizer, which then produces an
//! explicit "no evidence" answer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::lanes::{LaneResult, SourceRecord};
use crate::query::{LaneId, QueryMode};

/// Per-lane weight used when computing a source's fused score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LaneWeights {
    pub web: f64,
    pub vector: f64,
    pub graph: f64,
    pub news: f64,
    pub markets: f64,
}

impl LaneWeights {
    pub fn get(&self, lane: LaneId) -> f64 {
        match lane {
            LaneId::Web => self.web,
            LaneId::Vector => self.vector,
            LaneId::Graph => self.graph,
            LaneId::News => self.news,
            LaneId::Markets => self.markets,
        }
    }
}

/// Per-mode weighting table. Research/technical modes shift weight toward
/// the graph lane: simple queries lean on fast lexical/vector hits, while
/// research-oriented modes weight graph and research sources higher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionWeights {
    pub simple: LaneWeights,
    pub technical: LaneWeights,
    pub research: LaneWeights,
    pub multimedia: LaneWeights,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            simple: LaneWeights { web: 1.0, vector: 0.8, graph: 0.4, news: 0.6, markets: 0.6 },
            technical: LaneWeights { web: 0.9, vector: 1.0, graph: 0.6, news: 0.4, markets: 0.3 },
            research: LaneWeights { web: 0.7, vector: 0.9, graph: 1.0, news: 0.6, markets: 0.5 },
            multimedia: LaneWeights { web: 0.9, vector: 0.8, graph: 0.5, news: 0.7, markets: 0.4 },
        }
    }
}

impl FusionWeights {
    pub fn for_mode(&self, mode: QueryMode) -> LaneWeights {
        match mode {
            QueryMode::Simple => self.simple,
            QueryMode::Technical => self.technical,
            QueryMode::Research => self.research,
            QueryMode::Multimedia => self.multimedia,
        }
    }
}

/// Fusion configuration.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub top_k: usize,
    pub per_domain_cap: usize,
    pub weights: FusionWeights,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            per_domain_cap: 2,
            weights: FusionWeights::default(),
        }
    }
}

/// A pairwise contradiction hint between two ranked sources. The mechanism that produces these is pluggable — see
/// [`DisagreementDetector`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisagreementFlag {
    pub source_id_a: String,
    pub source_id_b: String,
    pub note: String,
}

/// Pluggable contradiction-detection mechanism. The default
/// implementation is a cheap lexical heuristic; a real deployment would
/// swap in an NLI model or a rule engine without touching Fusion's
/// control flow.
pub trait DisagreementDetector: Send + Sync {
    fn detect(&self, sources: &[SourceRecord]) -> Vec<DisagreementFlag>;
}

/// Flags sources whose excerpts both mention a shared keyword but contain
/// one negated and one non-negated assertion — a coarse but deterministic
/// stand-in for real contradiction detection.
pub struct HeuristicDisagreementDetector;

const NEGATION_MARKERS: [&str; 6] = ["not", "no longer", "never", "isn't", "doesn't", "won't"];

impl DisagreementDetector for HeuristicDisagreementDetector {
    fn detect(&self, sources: &[SourceRecord]) -> Vec<DisagreementFlag> {
        let mut flags = Vec::new();
        for i in 0..sources.len() {
            for j in (i + 1)..sources.len() {
                let a = &sources[i];
                let b = &sources[j];
                if a.domain == b.domain {
                    continue;
                }
                let a_negated = contains_negation(&a.excerpt);
                let b_negated = contains_negation(&b.excerpt);
                if a_negated != b_negated && shares_keyword(&a.excerpt, &b.excerpt) {
                    flags.push(DisagreementFlag {
                        source_id_a: a.source_id.clone(),
                        source_id_b: b.source_id.clone(),
                        note: format!("{} and {} may disagree", a.domain, b.domain),
                    });
                }
            }
        }
        flags
    }
}

fn contains_negation(text: &str) -> bool {
    let lower = text.to_lowercase();
    NEGATION_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn shares_keyword(a: &str, b: &str) -> bool {
    let a_words: std::collections::HashSet<&str> =
        a.split_whitespace().filter(|w| w.len() > 4).collect();
    b.split_whitespace().filter(|w| w.len() > 4).any(|w| a_words.contains(w))
}

/// The merged, ranked view of all retrieval output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedContext {
    /// Top-K citable sources, final rank order.
    pub citable: Vec<SourceRecord>,
    /// Remaining ranked sources beyond the citable cutoff.
    pub residual: Vec<SourceRecord>,
    pub disagreement_flags: Vec<DisagreementFlag>,
    pub fusion_metadata: FusionMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionMetadata {
    pub lanes_considered: Vec<LaneId>,
    pub total_before_dedup: usize,
    pub total_after_dedup: usize,
}

impl FusedContext {
    pub fn is_empty(&self) -> bool {
        self.citable.is_empty() && self.residual.is_empty()
    }
}

/// Merge all lane outputs into a single [`FusedContext`].
pub fn fuse(
    lane_results: &[LaneResult],
    mode: QueryMode,
    config: &FusionConfig,
    detector: &dyn DisagreementDetector,
) -> FusedContext {
    let weights = config.weights.for_mode(mode);
    let total_before_dedup: usize = lane_results.iter().map(|r| r.sources.len()).sum();

    // Step 1: dedupe globally by source_id, merging lane provenance.
    let mut merged: HashMap<String, SourceRecord> = HashMap::new();
    let mut rank_position: HashMap<String, Vec<usize>> = HashMap::new();
    for result in lane_results {
        for (position, source) in result.sources.iter().enumerate() {
            rank_position
                .entry(source.source_id.clone())
                .or_default()
                .push(position);
            merged
                .entry(source.source_id.clone())
                .and_modify(|existing| {
                    for lane in &source.lanes {
                        if !existing.lanes.contains(lane) {
                            existing.lanes.push(*lane);
                        }
                    }
                })
                .or_insert_with(|| source.clone());
        }
    }

    // Step 2: weighted fused score — normalized per-lane rank times the
    // mode's lane weight, summed across every lane that surfaced the
    // source.
    let mut scored: Vec<(f64, SourceRecord)> = merged
        .into_values()
        .map(|record| {
            let positions = rank_position.get(&record.source_id).cloned().unwrap_or_default();
            let score: f64 = record
                .lanes
                .iter()
                .zip(positions.iter())
                .map(|(lane, position)| {
                    let normalized_rank = 1.0 / (*position as f64 + 1.0);
                    weights.get(*lane) * normalized_rank
                })
                .sum();
            (score, record)
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    // Step 3: diversity pass — at most `per_domain_cap` per domain in the
    // citable set.
    let mut domain_counts: HashMap<String, usize> = HashMap::new();
    let mut citable = Vec::new();
    let mut residual = Vec::new();

    for (_, record) in scored {
        let count = domain_counts.entry(record.domain.clone()).or_insert(0);
        if citable.len() < config.top_k && *count < config.per_domain_cap {
            *count += 1;
            citable.push(record);
        } else {
            residual.push(record);
        }
    }

    let total_after_dedup = citable.len() + residual.len();

    // Step 4: disagreement detection over the citable set only — that's
    // what the Synthesizer can ground claims against.
    let disagreement_flags = detector.detect(&citable);

    FusedContext {
        citable,
        residual,
        disagreement_flags,
        fusion_metadata: FusionMetadata {
            lanes_considered: lane_results.iter().map(|r| r.lane_id).collect(),
            total_before_dedup,
            total_after_dedup,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lanes::LaneStatus;

    fn source(id: &str, domain: &str, lane: LaneId) -> SourceRecord {
        SourceRecord {
            source_id: id.to_string(),
            lanes: vec![lane],
            provider_id: "p".to_string(),
            keyed_fallback: false,
            title: id.to_string(),
            url: format!("https://{}/{}", domain, id),
            domain: domain.to_string(),
            excerpt: "some excerpt".to_string(),
            raw_score: 1.0,
            ts: None,
            language: None,
        }
    }

    fn lane_result(lane_id: LaneId, sources: Vec<SourceRecord>) -> LaneResult {
        LaneResult {
            lane_id,
            provider_used: Some("p".to_string()),
            status: LaneStatus::Ok,
            sources,
            elapsed_ms: 10,
            budget_ms: 1500,
            error: None,
            fallback_events: vec![],
        }
    }

    #[test]
    fn empty_lanes_produce_empty_but_valid_context() {
        let results = vec![lane_result(LaneId::Web, vec![])];
        let fused = fuse(
            &results,
            QueryMode::Simple,
            &FusionConfig::default(),
            &HeuristicDisagreementDetector,
        );
        assert!(fused.is_empty());
    }

    #[test]
    fn source_ids_are_unique_after_fusion() {
        let shared = source("dup", "a.com", LaneId::Web);
        let mut shared_from_vector = shared.clone();
        shared_from_vector.lanes = vec![LaneId::Vector];
        let results = vec![
            lane_result(LaneId::Web, vec![shared]),
            lane_result(LaneId::Vector, vec![shared_from_vector]),
        ];
        let fused = fuse(
            &results,
            QueryMode::Simple,
            &FusionConfig::default(),
            &HeuristicDisagreementDetector,
        );
        let mut ids: Vec<&str> = fused.citable.iter().map(|s| s.source_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), fused.citable.len());
        let merged = fused.citable.iter().find(|s| s.source_id == "dup").unwrap();
        assert_eq!(merged.lanes.len(), 2);
    }

    #[test]
    fn diversity_pass_caps_per_domain() {
        let sources: Vec<SourceRecord> = (0..5)
            .map(|i| source(&format!("s{}", i), "same.com", LaneId::Web))
            .collect();
        let results = vec![lane_result(LaneId::Web, sources)];
        let mut config = FusionConfig::default();
        config.top_k = 8;
        config.per_domain_cap = 2;
        let fused = fuse(&results, QueryMode::Simple, &config, &HeuristicDisagreementDetector);
        assert_eq!(fused.citable.len(), 2);
        assert_eq!(fused.residual.len(), 3);
    }
}
