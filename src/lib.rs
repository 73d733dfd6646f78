#![warn(missing_docs)]
//! Core library entry points for the guideseek walkthrough QA engine.

pub mod embedder;
pub mod gate;
pub mod index;
pub mod llm;
pub mod prompts;
pub mod search;
pub mod segmenter;
pub mod service;
pub mod store;
pub mod tagger;
pub mod title;

pub use embedder::{Embedder, EmbedderConfig, OpenAiEmbedder};
pub use gate::{GateOutcome, GateSignals, GateStep};
pub use index::{GuideIndex, VectorDocument};
pub use llm::{ChatCompletionsProvider, CompletionRequest, LlmProvider};
pub use search::{cosine_similarity, search, RetrievalResult, SearchStage};
pub use segmenter::{segment, SegmentConfig};
pub use service::{Answer, GuideService, ServiceConfig, ServiceError, SourceKind, Status};
pub use store::{GeneratedGuide, GuideStore, PostgresGuideStore};
pub use tagger::tag;
pub use title::{extract_title, is_direct_match, normalize, resolve};
