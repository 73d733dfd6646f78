use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use guideseek::embedder::{Embedder, EmbedderConfig, OpenAiEmbedder};
use guideseek::segmenter::{segment, SegmentConfig};
use guideseek::{tagger, VectorDocument};

#[derive(Parser, Debug)]
#[command(
    name = "guideseek-vectorize",
    about = "Segment and embed a walkthrough corpus into a vector document"
)]
struct VectorizeCli {
    /// Walkthrough corpus file
    #[arg(long, env = "GUIDESEEK_GUIDE", default_value = "guide.txt")]
    guide: PathBuf,

    /// Output vector document consumed by guideseek-api
    #[arg(long, env = "GUIDESEEK_VECTORS", default_value = "guide_vectors.json")]
    output: PathBuf,

    /// Characters per passage
    #[arg(long, default_value_t = 200)]
    chunk_size: usize,

    /// Overlapping characters between adjacent passages
    #[arg(long, default_value_t = 50)]
    overlap: usize,

    /// API key for embedding calls
    #[arg(long, env = "OPENAI_API_KEY")]
    embedding_api_key: String,

    /// Embedding model identifier
    #[arg(
        long,
        env = "GUIDESEEK_EMBED_MODEL",
        default_value = "text-embedding-3-small"
    )]
    embedding_model: String,

    /// Optional dimension override when supported by the model
    #[arg(long, env = "GUIDESEEK_EMBED_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    /// Base URL for the OpenAI-compatible API
    #[arg(
        long,
        env = "GUIDESEEK_EMBED_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    embedding_base_url: String,

    /// Max passages per embedding request
    #[arg(long, env = "GUIDESEEK_EMBED_BATCH", default_value_t = 32)]
    batch_size: usize,

    /// Max seconds to wait for each embedding request
    #[arg(long, env = "GUIDESEEK_EMBED_TIMEOUT_SECS", default_value_t = 30)]
    embedding_timeout_secs: u64,

    /// Number of retries for rate limits or transient errors
    #[arg(long, env = "GUIDESEEK_EMBED_MAX_RETRIES", default_value_t = 5)]
    embedding_max_retries: usize,
}

fn main() -> Result<()> {
    let cli = VectorizeCli::parse();
    let text = fs::read_to_string(&cli.guide)
        .with_context(|| format!("failed to read corpus {:?}", cli.guide))?;
    eprintln!(
        "loaded {} characters from {:?}",
        text.chars().count(),
        cli.guide
    );

    let chunks = segment(
        &text,
        &SegmentConfig {
            chunk_size: cli.chunk_size.max(1),
            overlap: cli.overlap,
        },
    );
    anyhow::ensure!(!chunks.is_empty(), "corpus produced no passages");
    eprintln!("segmented into {} passages:", chunks.len());
    for (i, chunk) in chunks.iter().take(3).enumerate() {
        eprintln!("  [{}] {}", i + 1, preview(chunk));
    }

    report_game_distribution(&chunks);

    let embedder = OpenAiEmbedder::new(EmbedderConfig {
        api_key: cli.embedding_api_key,
        base_url: cli.embedding_base_url,
        model: cli.embedding_model,
        dimensions: cli.embedding_dimensions,
        timeout: Duration::from_secs(cli.embedding_timeout_secs.max(1)),
        max_retries: cli.embedding_max_retries.max(1),
        batch_size: cli.batch_size.max(1),
    })?;

    let embeddings = embed_all(&embedder, &chunks)?;
    anyhow::ensure!(
        embeddings.len() == chunks.len(),
        "embedded {} passages but segmented {}",
        embeddings.len(),
        chunks.len()
    );
    let dims = embeddings.first().map_or(0, Vec::len);

    let document = VectorDocument { chunks, embeddings };
    let output = File::create(&cli.output)
        .with_context(|| format!("failed to create {:?}", cli.output))?;
    serde_json::to_writer_pretty(BufWriter::new(output), &document)
        .context("failed to write vector document")?;

    eprintln!(
        "vectorization complete: {} passages, {} dimensions, written to {:?}",
        document.chunks.len(),
        dims,
        cli.output
    );
    Ok(())
}

fn embed_all(embedder: &OpenAiEmbedder, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
    let batch_size = embedder.batch_size();
    let mut embeddings = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let inputs: Vec<&str> = batch.iter().map(String::as_str).collect();
        let mut vectors = embedder.encode(&inputs)?;
        embeddings.append(&mut vectors);
        eprintln!("embedded {}/{} passages...", embeddings.len(), chunks.len());
    }
    Ok(embeddings)
}

fn report_game_distribution(chunks: &[String]) {
    let tags = tagger::tag(chunks);
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in tags.iter().flatten() {
        *counts.entry(tag.as_str()).or_default() += 1;
    }
    if counts.is_empty() {
        eprintln!("warning: no game markers found; all passages will be untagged");
        return;
    }
    let mut ordered: Vec<(&str, usize)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    eprintln!("detected walkthroughs for {} game(s):", ordered.len());
    for (game, count) in ordered {
        eprintln!("  - {game}: {count} passages");
    }
}

fn preview(chunk: &str) -> String {
    let flattened = chunk.replace('\n', " ");
    let truncated: String = flattened.chars().take(50).collect();
    if truncated.chars().count() < flattened.chars().count() {
        format!("{truncated}...")
    } else {
        truncated
    }
}
