//! Synthesizer.
//!
//! Streams tokens from the chosen LLM, grounded on a [`FusedContext`],
//! interleaving inline citation markers aligned to the citable bibliography.
//! Walks the Model Router's chain sequentially on failure, the same
//! fallback idiom the Lane Executor uses for retrieval providers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use regex::Regex;
use tokio::sync::mpsc;
use tracing::{info_span, warn, Instrument};

use crate::envelope::{AnswerEvent, EnvelopeErrorKind, FinalMetrics, FusedContextSummary};
use crate::fusion::FusedContext;
use crate::llm::traits::LLMProviderClient;
use crate::llm::{ChatMessage, LLMRequest, MessageRole};
use crate::query::Query;
use crate::registry::{ProviderHandle, ProviderRegistry};

/// Soft-cancel grace window: the Synthesizer may finish an in-flight
/// sentence within this window of the hard deadline before it must stop
///.
pub const SOFT_CANCEL_WINDOW: Duration = Duration::from_millis(250);

/// One candidate in the Model Router's chain, bound to a live client and
/// credential.
pub struct ModelChainEntry {
    pub handle: ProviderHandle,
    pub client: Arc<dyn LLMProviderClient>,
    pub api_key: String,
    pub model_id: String,
}

/// Internal synthesis state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SynthesisState {
    CallingModel,
    Streaming,
    Done,
    Error,
}

/// Outcome handed back to the Orchestrator once synthesis terminates.
pub struct SynthesisOutcome {
    pub model_used: Option<String>,
    pub truncated: bool,
    pub succeeded: bool,
}

fn citation_marker_pattern() -> Regex {
    Regex::new(r"\[(\d+)\]").unwrap()
}

/// Extract citation markers from a token fragment, keeping only markers
/// that index into the citable set.
fn extract_citations(text: &str, citable_len: usize, fused: &FusedContext) -> Vec<crate::envelope::Citation> {
    citation_marker_pattern()
        .captures_iter(text)
        .filter_map(|cap| cap.get(1)?.as_str().parse::<usize>().ok())
        .filter(|marker| *marker >= 1 && *marker <= citable_len)
        .filter_map(|marker| {
            fused
                .citable
                .get(marker - 1)
                .map(|source| crate::envelope::Citation {
                    marker_index: marker as u32,
                    source_id: source.source_id.clone(),
                })
        })
        .collect()
}

/// Build the grounding prompt: a numbered bibliography the model is
/// instructed to cite with `[n]` markers.
fn build_messages(query: &Query, fused: &FusedContext) -> Vec<ChatMessage> {
    let mut bibliography = String::new();
    for (i, source) in fused.citable.iter().enumerate() {
        bibliography.push_str(&format!(
            "[{}] {} ({}): {}\n",
            i + 1,
            source.title,
            source.domain,
            source.excerpt
        ));
    }

    let system = if fused.citable.is_empty() {
        "No sources were found for this query. State plainly that no evidence was found; do not invent citations.".to_string()
    } else {
        let mut prompt = format!(
            "Answer the user's question using only the sources below. Cite every factual claim with the matching [n] marker. Sources:\n{}",
            bibliography
        );
        if !fused.disagreement_flags.is_empty() {
            prompt.push_str("\nThe sources disagree on the following points. You must include at least one sentence acknowledging each disagreement and cite both conflicting sources:\n");
            for flag in &fused.disagreement_flags {
                prompt.push_str(&format!("- {} vs {}: {}\n", flag.source_id_a, flag.source_id_b, flag.note));
            }
        }
        prompt
    };

    vec![
        ChatMessage { role: MessageRole::System, content: system, name: None, function_call: None },
        ChatMessage { role: MessageRole::User, content: query.raw_text.clone(), name: None, function_call: None },
    ]
}

/// Run synthesis against `chain`, streaming `token`/`disagreement`/`done`
/// events into `tx`. Returns once the chain is exhausted, the model
/// finishes, or the deadline fires.
pub async fn synthesize(
    query: &Query,
    fused: &FusedContext,
    chain: &[ModelChainEntry],
    registry: &ProviderRegistry,
    deadline: Instant,
    tx: &mpsc::Sender<AnswerEvent>,
) -> SynthesisOutcome {
    let _ = tx
        .send(AnswerEvent::SourcesFinalized { summary: FusedContextSummary::from(fused) })
        .await;

    for flag in &fused.disagreement_flags {
        let _ = tx.send(AnswerEvent::Disagreement { flag: flag.clone() }).await;
    }

    if fused.citable.is_empty() {
        let _ = tx
            .send(AnswerEvent::Token { text: "No evidence found for this query.".to_string(), citations: vec![] })
            .await;
        let _ = tx
            .send(AnswerEvent::Done {
                metrics: FinalMetrics {
                    total_elapsed_ms: query.elapsed_ms(),
                    truncated: false,
                    lanes_ok: 0,
                    lanes_degraded: 0,
                    model_used: None,
                    cache_hit: false,
                },
            })
            .await;
        return SynthesisOutcome { model_used: None, truncated: false, succeeded: true };
    }

    let messages = build_messages(query, fused);

    for entry in chain {
        let span = info_span!("synthesis", provider_id = %entry.handle.id, model = %entry.model_id);
        let result = run_one_model(entry, &messages, fused, deadline, tx).instrument(span).await;
        match result {
            Ok(truncated) => {
                registry.report_success(&entry.handle.id);
                let _ = tx
                    .send(AnswerEvent::Done {
                        metrics: FinalMetrics {
                            total_elapsed_ms: query.elapsed_ms(),
                            truncated,
                            lanes_ok: 0,
                            lanes_degraded: 0,
                            model_used: Some(entry.model_id.clone()),
                            cache_hit: false,
                        },
                    })
                    .await;
                return SynthesisOutcome {
                    model_used: Some(entry.model_id.clone()),
                    truncated,
                    succeeded: true,
                };
            }
            Err(_) => {
                warn!(provider_id = %entry.handle.id, "synthesis model failed, trying next in chain");
                registry.report_retryable_failure(&entry.handle.id);
                continue;
            }
        }
    }

    let _ = tx
        .send(AnswerEvent::Error {
            kind: EnvelopeErrorKind::NoModelAvailable,
            message: "every model in the router's chain failed".to_string(),
        })
        .await;
    SynthesisOutcome { model_used: None, truncated: true, succeeded: false }
}

/// Drive one model through CALLING_MODEL -> STREAMING -> DONE|ERROR.
/// Returns `Ok(truncated)` on a completed (possibly cancelled) stream, or
/// `Err(())` if the call itself failed and the caller should retry the
/// next chain entry.
async fn run_one_model(
    entry: &ModelChainEntry,
    messages: &[ChatMessage],
    fused: &FusedContext,
    deadline: Instant,
    tx: &mpsc::Sender<AnswerEvent>,
) -> Result<bool, ()> {
    let mut state = SynthesisState::CallingModel;
    tracing::trace!(?state, "entering synthesis state");

    let request = LLMRequest {
        id: uuid::Uuid::new_v4(),
        model: entry.model_id.clone(),
        messages: messages.to_vec(),
        temperature: Some(0.2),
        max_tokens: None,
        top_p: None,
        frequency_penalty: None,
        presence_penalty: None,
        stop: None,
        stream: true,
        functions: None,
        function_call: None,
        user: None,
        metadata: Default::default(),
    };

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Ok(true);
    }

    let stream_result = tokio::time::timeout(
        remaining,
        entry.client.chat_completion_stream(request, entry.api_key.clone()),
    )
    .await;

    let mut stream = match stream_result {
        Ok(Ok(stream)) => {
            state = SynthesisState::Streaming;
            tracing::trace!(?state, "model call succeeded, streaming");
            stream
        }
        _ => {
            state = SynthesisState::Error;
            tracing::trace!(?state, "model call failed, retry_next");
            return Err(());
        }
    };

    let soft_deadline = deadline.checked_sub(SOFT_CANCEL_WINDOW).unwrap_or(deadline);
    let mut truncated = false;

    loop {
        if Instant::now() >= deadline {
            truncated = true;
            break;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let next = tokio::time::timeout(remaining, stream.next()).await;
        let chunk = match next {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(_))) => {
                truncated = true;
                break;
            }
            Ok(None) => break,
            Err(_) => {
                truncated = true;
                break;
            }
        };

        for choice in chunk.choices {
            let text = choice.delta.content;
            if text.is_empty() {
                continue;
            }
            let citations = extract_citations(&text, fused.citable.len(), fused);
            let ends_sentence = text.trim_end().ends_with(['.', '!', '?']);
            let _ = tx.send(AnswerEvent::Token { text, citations }).await;

            if Instant::now() >= soft_deadline && ends_sentence {
                truncated = true;
                return Ok(truncated);
            }
        }
    }

    state = SynthesisState::Done;
    tracing::trace!(?state, "stream exhausted or cancelled");
    Ok(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lanes::SourceRecord;
    use crate::llm::traits::{LLMProviderClient, ProviderConfigRequirements};
    use crate::llm::{Choice, LLMProviderType, LLMResponse, LLMResult, RoutingInfo, RoutingStrategy, StreamingChoice, StreamingChunk, TokenUsage};
    use crate::query::QueryMode;
    use crate::registry::{CostClass, ProviderKind, RegistryConfig};
    use async_trait::async_trait;
    use futures::stream;

    struct FakeClient {
        chunks: Vec<&'static str>,
    }

    #[async_trait]
    impl LLMProviderClient for FakeClient {
        async fn chat_completion(&self, _request: &LLMRequest, _api_key: &str) -> LLMResult<LLMResponse> {
            Ok(LLMResponse {
                id: "r".into(),
                object: "chat.completion".into(),
                created: 0,
                model: "fake".into(),
                choices: vec![],
                usage: TokenUsage { prompt_tokens: 0, completion_tokens: 0, total_tokens: 0, estimated_cost: 0.0 },
                provider: LLMProviderType::Custom("fake".into()),
                routing_info: RoutingInfo {
                    selected_provider: LLMProviderType::Custom("fake".into()),
                    routing_strategy: RoutingStrategy::CostOptimized,
                    latency_ms: 0,
                    retry_count: 0,
                    fallback_used: false,
                },
            })
        }

        async fn chat_completion_stream(
            &self,
            _request: LLMRequest,
            _api_key: String,
        ) -> LLMResult<Box<dyn futures::Stream<Item = LLMResult<StreamingChunk>> + Send + Unpin>> {
            let items: Vec<LLMResult<StreamingChunk>> = self
                .chunks
                .iter()
                .map(|text| {
                    Ok(StreamingChunk {
                        id: "c".into(),
                        object: "chat.completion.chunk".into(),
                        created: 0,
                        model: "fake".into(),
                        choices: vec![StreamingChoice {
                            index: 0,
                            delta: ChatMessage {
                                role: MessageRole::Assistant,
                                content: text.to_string(),
                                name: None,
                                function_call: None,
                            },
                            finish_reason: None,
                        }],
                        provider: LLMProviderType::Custom("fake".into()),
                    })
                })
                .collect();
            Ok(Box::new(stream::iter(items)))
        }

        fn provider_type(&self) -> LLMProviderType {
            LLMProviderType::Custom("fake".into())
        }

        async fn health_check(&self, _api_key: &str) -> LLMResult<bool> {
            Ok(true)
        }

        fn get_available_models(&self) -> Vec<crate::llm::traits::ModelInfo> {
            vec![]
        }

        fn supports_model(&self, _model: &str) -> bool {
            true
        }

        fn get_config_requirements(&self) -> ProviderConfigRequirements {
            ProviderConfigRequirements {
                api_key_env_var: "FAKE_API_KEY".into(),
                base_url_env_var: None,
                auth_methods: vec![],
                rate_limits: None,
                parameter_restrictions: Default::default(),
            }
        }
    }

    fn source(id: &str) -> SourceRecord {
        SourceRecord {
            source_id: id.to_string(),
            lanes: vec![crate::query::LaneId::Web],
            provider_id: "p".to_string(),
            keyed_fallback: false,
            title: "Title".to_string(),
            url: "https://example.com".to_string(),
            domain: "example.com".to_string(),
            excerpt: "excerpt".to_string(),
            raw_score: 1.0,
            ts: None,
            language: None,
        }
    }

    fn fused_with_sources(n: usize) -> FusedContext {
        FusedContext {
            citable: (0..n).map(|i| source(&format!("s{}", i))).collect(),
            residual: vec![],
            disagreement_flags: vec![],
            fusion_metadata: crate::fusion::FusionMetadata {
                lanes_considered: vec![],
                total_before_dedup: n,
                total_after_dedup: n,
            },
        }
    }

    fn query() -> Query {
        Query::new("what is rag?".to_string(), QueryMode::Simple, Default::default(), None).unwrap()
    }

    #[tokio::test]
    async fn empty_fused_context_yields_no_evidence_answer() {
        let (tx, mut rx) = mpsc::channel(16);
        let fused = fused_with_sources(0);
        let registry = ProviderRegistry::new(RegistryConfig::default());
        let outcome = synthesize(&query(), &fused, &[], &registry, Instant::now() + Duration::from_secs(1), &tx).await;
        assert!(outcome.succeeded);
        let mut saw_no_evidence = false;
        while let Ok(event) = rx.try_recv() {
            if let AnswerEvent::Token { text, .. } = event {
                if text.contains("No evidence") {
                    saw_no_evidence = true;
                }
            }
        }
        assert!(saw_no_evidence);
    }

    #[tokio::test]
    async fn citations_only_reference_citable_sources() {
        let (tx, mut rx) = mpsc::channel(16);
        let fused = fused_with_sources(1);
        let registry = ProviderRegistry::new(RegistryConfig::default());
        let entry = ModelChainEntry {
            handle: ProviderHandle::new("fake", ProviderKind::Llm, true, CostClass::Standard),
            client: Arc::new(FakeClient { chunks: vec!["RAG combines retrieval and generation [1].", " It is useful [9]."] }),
            api_key: "key".to_string(),
            model_id: "fake-model".to_string(),
        };
        let outcome = synthesize(
            &query(),
            &fused,
            &[entry],
            &registry,
            Instant::now() + Duration::from_secs(1),
            &tx,
        )
        .await;
        assert!(outcome.succeeded);
        let mut markers = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AnswerEvent::Token { citations, .. } = event {
                markers.extend(citations);
            }
        }
        assert!(markers.iter().all(|c| c.marker_index == 1));
    }

    #[test]
    fn system_prompt_requires_acknowledging_flagged_disagreements() {
        let mut fused = fused_with_sources(2);
        fused.disagreement_flags = vec![crate::fusion::DisagreementFlag {
            source_id_a: "s0".to_string(),
            source_id_b: "s1".to_string(),
            note: "one says X, the other says not X".to_string(),
        }];
        let messages = build_messages(&query(), &fused);
        let system = &messages[0].content;
        assert!(system.contains("s0"));
        assert!(system.contains("s1"));
        assert!(system.contains("acknowledging"));
    }

    #[tokio::test]
    async fn falls_back_to_next_model_on_stream_failure() {
        let (tx, _rx) = mpsc::channel(16);
        let fused = fused_with_sources(1);
        let registry = ProviderRegistry::new(RegistryConfig::default());
        registry.register_chain(
            ProviderKind::Llm,
            vec![
                ProviderHandle::new("broken", ProviderKind::Llm, true, CostClass::Standard),
                ProviderHandle::new("fake", ProviderKind::Llm, false, CostClass::Standard),
            ],
        );

        struct BrokenClient;
        #[async_trait]
        impl LLMProviderClient for BrokenClient {
            async fn chat_completion(&self, _r: &LLMRequest, _k: &str) -> LLMResult<LLMResponse> {
                Err(crate::llm::LLMError::Internal("broken".into()))
            }
            async fn chat_completion_stream(
                &self,
                _r: LLMRequest,
                _k: String,
            ) -> LLMResult<Box<dyn futures::Stream<Item = LLMResult<StreamingChunk>> + Send + Unpin>> {
                Err(crate::llm::LLMError::Internal("broken".into()))
            }
            fn provider_type(&self) -> LLMProviderType {
                LLMProviderType::Custom("broken".into())
            }
            async fn health_check(&self, _k: &str) -> LLMResult<bool> {
                Ok(false)
            }
            fn get_available_models(&self) -> Vec<crate::llm::traits::ModelInfo> {
                vec![]
            }
            fn supports_model(&self, _m: &str) -> bool {
                true
            }
            fn get_config_requirements(&self) -> ProviderConfigRequirements {
                ProviderConfigRequirements {
                    api_key_env_var: "X".into(),
                    base_url_env_var: None,
                    auth_methods: vec![],
                    rate_limits: None,
                    parameter_restrictions: Default::default(),
                }
            }
        }

        let chain = vec![
            ModelChainEntry {
                handle: ProviderHandle::new("broken", ProviderKind::Llm, true, CostClass::Standard),
                client: Arc::new(BrokenClient),
                api_key: "k".to_string(),
                model_id: "broken-model".to_string(),
            },
            ModelChainEntry {
                handle: ProviderHandle::new("fake", ProviderKind::Llm, false, CostClass::Standard),
                client: Arc::new(FakeClient { chunks: vec!["ok [1]."] }),
                api_key: "k".to_string(),
                model_id: "fake-model".to_string(),
            },
        ];

        let outcome = synthesize(&query(), &fused, &chain, &registry, Instant::now() + Duration::from_secs(1), &tx).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.model_used.as_deref(), Some("fake-model"));
    }
}
