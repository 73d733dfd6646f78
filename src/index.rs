//! Persisted vector document and the in-memory passage index built from it.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::tagger;

/// On-disk vector document produced by the offline pipeline.
///
/// `chunks` and `embeddings` are parallel: one vector per passage, all vectors
/// sharing one dimensionality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    /// Passage texts in corpus order.
    pub chunks: Vec<String>,
    /// Embedding vectors, parallel to `chunks`.
    pub embeddings: Vec<Vec<f32>>,
}

/// Immutable in-memory index over the walkthrough corpus.
///
/// Built once at startup (or by the offline pipeline) and shared read-only
/// across concurrent queries; nothing mutates it afterwards.
pub struct GuideIndex {
    passages: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    tags: Vec<Option<String>>,
    current_title: Option<String>,
}

impl GuideIndex {
    /// Builds the index from a vector document, assigning per-game tags.
    pub fn from_document(document: VectorDocument) -> Result<Self> {
        let VectorDocument { chunks, embeddings } = document;
        anyhow::ensure!(
            chunks.len() == embeddings.len(),
            "vector document has {} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        );
        if let Some(first) = embeddings.first() {
            let dims = first.len();
            anyhow::ensure!(dims > 0, "vector document contains empty embeddings");
            for (i, embedding) in embeddings.iter().enumerate() {
                anyhow::ensure!(
                    embedding.len() == dims,
                    "embedding {} has {} dimensions, expected {}",
                    i,
                    embedding.len(),
                    dims
                );
            }
        }

        let tags = tagger::tag(&chunks);
        let current_title = tags.first().cloned().flatten();
        let index = Self {
            passages: chunks,
            embeddings,
            tags,
            current_title,
        };
        index.log_game_distribution();
        Ok(index)
    }

    /// Loads and validates a vector document from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read vector document {}", path.display()))?;
        let document: VectorDocument = serde_json::from_str(&raw)
            .with_context(|| format!("invalid vector document {}", path.display()))?;
        let index = Self::from_document(document)?;
        tracing::info!(passages = index.len(), "loaded passage index");
        Ok(index)
    }

    /// Number of passages in the index.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// True when the index holds no passages.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Passage texts in corpus order.
    pub fn passages(&self) -> &[String] {
        &self.passages
    }

    /// Embedding vectors, parallel to `passages`.
    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    /// Game tags, parallel to `passages`; `None` before the first marker.
    pub fn tags(&self) -> &[Option<String>] {
        &self.tags
    }

    /// The title the loaded walkthrough is known to cover: the tag of the
    /// opening passage, when the corpus starts with a game marker.
    pub fn current_title(&self) -> Option<&str> {
        self.current_title.as_deref()
    }

    fn log_game_distribution(&self) {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for tag in self.tags.iter().flatten() {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
        if counts.is_empty() {
            if !self.passages.is_empty() {
                tracing::warn!("no game markers found; all passages treated as untagged");
            }
            return;
        }
        let mut ordered: Vec<(&str, usize)> = counts.into_iter().collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        tracing::info!(games = ordered.len(), "tagged walkthrough corpus");
        for (game, count) in ordered {
            tracing::info!(game, passages = count, "game section");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn document(chunks: &[&str], dims: usize) -> VectorDocument {
        VectorDocument {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            embeddings: chunks.iter().map(|_| vec![0.5; dims]).collect(),
        }
    }

    #[test]
    fn builds_tags_and_current_title() {
        let index = GuideIndex::from_document(document(
            &["<<星露谷物语>>开局指南", "钓鱼需要先做鱼竿", "<<只狼>>序章"],
            4,
        ))
        .expect("index");
        assert_eq!(index.len(), 3);
        assert_eq!(index.current_title(), Some("星露谷物语"));
        assert_eq!(index.tags()[1], Some("星露谷物语".to_string()));
        assert_eq!(index.tags()[2], Some("只狼".to_string()));
    }

    #[test]
    fn corpus_without_leading_marker_has_no_current_title() {
        let index =
            GuideIndex::from_document(document(&["前言", "<<只狼>>序章"], 4)).expect("index");
        assert_eq!(index.current_title(), None);
        assert_eq!(index.tags()[1], Some("只狼".to_string()));
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let document = VectorDocument {
            chunks: vec!["一段".to_string()],
            embeddings: Vec::new(),
        };
        assert!(GuideIndex::from_document(document).is_err());
    }

    #[test]
    fn rejects_mixed_dimensionality() {
        let document = VectorDocument {
            chunks: vec!["一段".to_string(), "二段".to_string()],
            embeddings: vec![vec![0.1, 0.2], vec![0.1, 0.2, 0.3]],
        };
        assert!(GuideIndex::from_document(document).is_err());
    }

    #[test]
    fn empty_document_builds_an_empty_index() {
        let index = GuideIndex::from_document(VectorDocument {
            chunks: Vec::new(),
            embeddings: Vec::new(),
        })
        .expect("index");
        assert!(index.is_empty());
        assert_eq!(index.current_title(), None);
    }

    #[test]
    fn loads_a_document_from_disk() {
        let document = document(&["<<黑神话悟空>>第一回", "虎先锋打法要点"], 3);
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(serde_json::to_string(&document).expect("json").as_bytes())
            .expect("write");
        let index = GuideIndex::load(file.path()).expect("load");
        assert_eq!(index.len(), 2);
        assert_eq!(index.current_title(), Some("黑神话悟空"));
    }
}
