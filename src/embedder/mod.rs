//! Embedding clients used for passage and query vectors.

use anyhow::Result;

mod openai;

pub use openai::{EmbedderConfig, OpenAiEmbedder};

/// Batch text-embedding function shared by the offline pipeline and the query
/// path.
///
/// Implementations are deterministic for a fixed model version: the same input
/// always maps to the same vector, so passage vectors built offline stay
/// comparable with query vectors computed online.
pub trait Embedder: Send + Sync {
    /// Embeds a batch of inputs, returning one vector per input, in order.
    fn encode(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Maximum number of inputs accepted per `encode` call.
    fn batch_size(&self) -> usize;
}
