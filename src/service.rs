//! Request-time orchestration: title detection, scoped retrieval, relevance
//! gating, answer synthesis, and guide generation.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::anyhow;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::embedder::Embedder;
use crate::gate::{self, GateOutcome, GateSignals, GateStep};
use crate::index::GuideIndex;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::prompts;
use crate::search;
use crate::store::{GeneratedGuide, GuideStore};
use crate::title;

/// Where an answer came from, as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Answered from retrieved walkthrough passages.
    #[serde(rename = "rag")]
    Rag,
    /// A fresh guide was generated because retrieval did not cover the game.
    #[serde(rename = "llm_generated")]
    Generated,
    /// Answered from general knowledge; nothing was retrieved.
    #[serde(rename = "llm_general")]
    General,
}

/// Completed answer for one question.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Answer text shown to the user.
    pub answer: String,
    /// Passages the answer was based on; empty for generated/general answers.
    pub passages: Vec<String>,
    /// Wire-level source classification.
    pub source: SourceKind,
    /// Resolved game title for display, when one is known.
    pub game_title: Option<String>,
    /// Fine-grained gate outcome, distinguishing the RAG confidence bands.
    pub outcome: GateOutcome,
}

/// Readiness snapshot for the inspection endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Status {
    /// True when an embedding client is configured.
    pub model_ready: bool,
    /// True when the passage index has been loaded.
    pub index_ready: bool,
    /// Number of passages in the index.
    pub passage_count: usize,
}

/// Errors that abort a request instead of degrading it.
#[derive(Debug)]
pub enum ServiceError {
    /// The passage index is missing; retrieval cannot run at all.
    IndexNotLoaded,
    /// No embedding client is configured; queries cannot be vectorized.
    ModelNotLoaded,
    /// The query embedding call failed.
    QueryEmbedding(anyhow::Error),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexNotLoaded => {
                write!(f, "passage index is not loaded; run guideseek-vectorize first")
            }
            Self::ModelNotLoaded => write!(f, "embedding model is not configured"),
            Self::QueryEmbedding(err) => write!(f, "failed to embed query: {err}"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Tunables for the answer pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    /// Similarity a best match must reach for high-confidence answering.
    pub similarity_threshold: f32,
    /// Similarity two game titles must reach to count as the same game.
    pub title_match_threshold: f32,
    /// Entries kept in the query-embedding cache (0 disables caching).
    pub embedding_cache_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            title_match_threshold: 0.6,
            embedding_cache_size: 1024,
        }
    }
}

/// Immutable-after-init answering service shared across concurrent requests.
pub struct GuideService {
    embedder: Option<Arc<dyn Embedder>>,
    llm: Option<Arc<dyn LlmProvider>>,
    index: Option<GuideIndex>,
    store: Option<Arc<dyn GuideStore>>,
    config: ServiceConfig,
    embedding_cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl GuideService {
    /// Assembles the service from its collaborators.
    ///
    /// Missing collaborators degrade rather than fail: without an index or
    /// embedder, questions are rejected as service-unavailable; without a chat
    /// model, canned answers are substituted; without a store, generated
    /// guides are only returned, never persisted.
    pub fn new(
        embedder: Option<Arc<dyn Embedder>>,
        llm: Option<Arc<dyn LlmProvider>>,
        index: Option<GuideIndex>,
        store: Option<Arc<dyn GuideStore>>,
        config: ServiceConfig,
    ) -> Self {
        let embedding_cache = NonZeroUsize::new(config.embedding_cache_size)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self {
            embedder,
            llm,
            index,
            store,
            config,
            embedding_cache,
        }
    }

    /// Answers one question, deciding between retrieved passages, fresh guide
    /// generation, and general knowledge.
    pub async fn answer(&self, question: &str, top_k: usize) -> Result<Answer, ServiceError> {
        let index = self.index.as_ref().ok_or(ServiceError::IndexNotLoaded)?;
        let threshold = self.config.similarity_threshold;

        let detected = title::extract_title(question);
        let known = index.current_title();
        let resolved = title::resolve(detected.as_deref(), known);
        tracing::info!(
            detected = detected.as_deref().unwrap_or("-"),
            known = known.unwrap_or("-"),
            "game title detection"
        );

        let scope = resolved.clone().or_else(|| detected.clone());
        let query_embedding = self.embed(question.to_string()).await?;
        let retrieval = search::search(
            index,
            &query_embedding,
            top_k,
            threshold,
            scope.as_deref(),
        );

        let signals = GateSignals {
            passage_count: retrieval.passages.len(),
            max_similarity: retrieval.max_similarity,
            threshold,
            title_detected: detected.is_some(),
            direct_title_match: title::is_direct_match(detected.as_deref(), known),
        };
        let outcome = match gate::after_search(&signals) {
            GateStep::Answer(outcome) => outcome,
            GateStep::VerifyTitle => match detected.as_deref() {
                Some(detected_title) => {
                    let matched = self.verify_game_match(detected_title, known).await;
                    gate::after_title_verification(&signals, matched)
                }
                // Verification is only requested when a title was detected.
                None => gate::after_title_verification(&signals, true),
            },
        };

        match outcome {
            GateOutcome::Generated => {
                let game_title = detected
                    .clone()
                    .or_else(|| resolved.clone())
                    .unwrap_or_default();
                tracing::warn!(
                    game = %game_title,
                    "retrieved passages do not cover the asked game; generating a fresh guide"
                );
                let content = self.generate_guide(&game_title, question).await;
                self.persist_guide(GeneratedGuide {
                    game_title,
                    content: content.clone(),
                    source_question: question.to_string(),
                })
                .await;
                Ok(Answer {
                    answer: content,
                    passages: Vec::new(),
                    source: SourceKind::Generated,
                    game_title: resolved.or(detected),
                    outcome,
                })
            }
            GateOutcome::RagHigh | GateOutcome::RagLow => {
                tracing::info!(
                    max_similarity = retrieval.max_similarity,
                    high_confidence = outcome == GateOutcome::RagHigh,
                    "answering from retrieved passages"
                );
                let answer = self.llm_answer(question, &retrieval.passages, true).await;
                Ok(Answer {
                    answer,
                    passages: retrieval.passages,
                    source: SourceKind::Rag,
                    game_title: resolved.or(detected),
                    outcome,
                })
            }
            GateOutcome::General => {
                tracing::info!("no passages retrieved; answering from general knowledge");
                let answer = self.llm_answer(question, &[], false).await;
                Ok(Answer {
                    answer,
                    passages: Vec::new(),
                    source: SourceKind::General,
                    game_title: resolved.or(detected),
                    outcome,
                })
            }
        }
    }

    /// Reports readiness of the embedding client and the passage index.
    pub fn status(&self) -> Status {
        Status {
            model_ready: self.embedder.is_some(),
            index_ready: self.index.is_some(),
            passage_count: self.index.as_ref().map_or(0, GuideIndex::len),
        }
    }

    async fn embed(&self, text: String) -> Result<Vec<f32>, ServiceError> {
        let embedder = self
            .embedder
            .clone()
            .ok_or(ServiceError::ModelNotLoaded)?;
        if let Some(cache) = &self.embedding_cache {
            let hit = {
                let mut guard = cache.lock().await;
                guard.get(&text).cloned()
            };
            if let Some(vector) = hit {
                return Ok(vector);
            }
        }

        let input = text.clone();
        let vector = tokio::task::spawn_blocking(move || {
            let refs = [input.as_str()];
            let mut vectors = embedder.encode(&refs)?;
            vectors
                .pop()
                .ok_or_else(|| anyhow!("embedder returned no vector"))
        })
        .await
        .map_err(|err| ServiceError::QueryEmbedding(anyhow!("embedding task join error: {err}")))?
        .map_err(ServiceError::QueryEmbedding)?;

        if let Some(cache) = &self.embedding_cache {
            let mut guard = cache.lock().await;
            guard.put(text, vector.clone());
        }
        Ok(vector)
    }

    /// Semantic re-verification that the detected game matches the loaded
    /// walkthrough; degrades to substring containment when embedding fails.
    async fn verify_game_match(&self, detected: &str, known: Option<&str>) -> bool {
        let Some(known) = known else {
            return false;
        };
        match self.title_similarity(detected.to_string(), known.to_string()).await {
            Ok(similarity) => {
                let matched = similarity >= self.config.title_match_threshold;
                tracing::info!(detected, known, similarity, matched, "semantic title check");
                matched
            }
            Err(err) => {
                tracing::warn!(%err, "title embedding failed; using substring containment");
                let detected = detected.to_lowercase();
                let known = known.to_lowercase();
                detected.contains(&known) || known.contains(&detected)
            }
        }
    }

    async fn title_similarity(&self, detected: String, known: String) -> anyhow::Result<f32> {
        let embedder = self
            .embedder
            .clone()
            .ok_or_else(|| anyhow!("embedding model not configured"))?;
        let vectors = tokio::task::spawn_blocking(move || {
            let refs = [detected.as_str(), known.as_str()];
            embedder.encode(&refs)
        })
        .await
        .map_err(|err| anyhow!("embedding task join error: {err}"))??;
        anyhow::ensure!(
            vectors.len() == 2,
            "expected two title vectors, got {}",
            vectors.len()
        );
        Ok(search::cosine_similarity(&vectors[0], &vectors[1]))
    }

    async fn llm_answer(&self, question: &str, passages: &[String], use_rag: bool) -> String {
        let Some(llm) = self.llm.clone() else {
            return prompts::offline_rag_answer(question, passages);
        };
        let user = if use_rag && !passages.is_empty() {
            prompts::rag_answer_prompt(question, passages)
        } else {
            prompts::general_answer_prompt(question)
        };
        let result = tokio::task::spawn_blocking(move || {
            llm.complete(&CompletionRequest {
                system: prompts::ANSWER_SYSTEM_PROMPT,
                user: &user,
                temperature: prompts::ANSWER_TEMPERATURE,
                max_tokens: prompts::ANSWER_MAX_TOKENS,
            })
        })
        .await
        .map_err(|err| anyhow!("chat task join error: {err}"))
        .and_then(|inner| inner);
        match result {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(%err, "chat completion failed; substituting explanatory text");
                prompts::answer_failure_message(&err)
            }
        }
    }

    async fn generate_guide(&self, game_title: &str, question: &str) -> String {
        let Some(llm) = self.llm.clone() else {
            return prompts::OFFLINE_GUIDE_MESSAGE.to_string();
        };
        let user = prompts::guide_generation_prompt(game_title, question);
        let result = tokio::task::spawn_blocking(move || {
            llm.complete(&CompletionRequest {
                system: prompts::GUIDE_SYSTEM_PROMPT,
                user: &user,
                temperature: prompts::GUIDE_TEMPERATURE,
                max_tokens: prompts::GUIDE_MAX_TOKENS,
            })
        })
        .await
        .map_err(|err| anyhow!("chat task join error: {err}"))
        .and_then(|inner| inner);
        match result {
            Ok(guide) => guide,
            Err(err) => {
                tracing::warn!(%err, "guide generation failed; substituting explanatory text");
                prompts::guide_failure_message(&err)
            }
        }
    }

    /// Upserts the generated guide; persistence failures are soft and never
    /// fail the request.
    async fn persist_guide(&self, guide: GeneratedGuide) {
        let Some(store) = &self.store else {
            tracing::warn!("no guide store configured; generated guide not persisted");
            return;
        };
        let result = match store.find_by_title(&guide.game_title).await {
            Ok(Some(_)) => store.update(&guide.game_title, &guide).await,
            Ok(None) => store.insert(&guide).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => tracing::info!(game = %guide.game_title, "persisted generated guide"),
            Err(err) => {
                tracing::warn!(%err, game = %guide.game_title, "failed to persist generated guide")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_service_reports_not_ready() {
        let service = GuideService::new(None, None, None, None, ServiceConfig::default());
        let status = service.status();
        assert!(!status.model_ready);
        assert!(!status.index_ready);
        assert_eq!(status.passage_count, 0);
    }

    #[tokio::test]
    async fn answering_without_an_index_is_rejected() {
        let service = GuideService::new(None, None, None, None, ServiceConfig::default());
        match service.answer("星露谷物语怎么钓鱼", 3).await {
            Err(ServiceError::IndexNotLoaded) => {}
            other => panic!("expected IndexNotLoaded, got {other:?}"),
        }
    }

    #[test]
    fn source_kinds_serialize_to_wire_names() {
        assert_eq!(serde_json::to_string(&SourceKind::Rag).unwrap(), "\"rag\"");
        assert_eq!(
            serde_json::to_string(&SourceKind::Generated).unwrap(),
            "\"llm_generated\""
        );
        assert_eq!(
            serde_json::to_string(&SourceKind::General).unwrap(),
            "\"llm_general\""
        );
    }
}
