//! Scoped cosine-similarity search with adaptive passage selection.

use std::cmp::Ordering;

use crate::index::GuideIndex;
use crate::title;

/// Which candidate pool a search actually ran against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStage {
    /// Restricted to passages tagged with the requested game.
    Scoped,
    /// The requested game had no tagged passages; widened to the full index.
    FallbackFull,
    /// No game scope was requested.
    Unscoped,
}

/// Outcome of one similarity search.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Selected passages, best match first.
    pub passages: Vec<String>,
    /// Highest similarity over the candidate pool, regardless of selection.
    pub max_similarity: f32,
    /// Candidate pool the search ran against.
    pub stage: SearchStage,
}

/// Ranks passages by cosine similarity against `query_embedding` and selects
/// up to `top_k` of them.
///
/// When `scope_title` is given, candidates are restricted to passages whose
/// tag normalizes equal to it; an unknown scope silently widens to the full
/// index. Selection: if the best score clears `threshold`, take the `top_k`
/// best outright; otherwise keep everything at or above a dynamic floor of
/// `0.7 × best` (`0.1` when best is non-positive), truncated to `top_k`, and
/// never less than the single best candidate. A non-empty index therefore
/// always yields at least one passage.
pub fn search(
    index: &GuideIndex,
    query_embedding: &[f32],
    top_k: usize,
    threshold: f32,
    scope_title: Option<&str>,
) -> RetrievalResult {
    let top_k = top_k.max(1);
    let (candidates, stage) = candidate_indices(index, scope_title);
    if candidates.is_empty() {
        return RetrievalResult {
            passages: Vec::new(),
            max_similarity: 0.0,
            stage,
        };
    }

    let embeddings = index.embeddings();
    let mut scored: Vec<(usize, f32)> = candidates
        .into_iter()
        .map(|i| (i, cosine_similarity(query_embedding, &embeddings[i])))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(2 * top_k);

    let max_similarity = scored[0].1;
    let selected: Vec<(usize, f32)> = if max_similarity >= threshold {
        scored.into_iter().take(top_k).collect()
    } else {
        let dynamic = if max_similarity > 0.0 {
            max_similarity * 0.7
        } else {
            0.1
        };
        let kept: Vec<(usize, f32)> = scored
            .iter()
            .copied()
            .filter(|(_, score)| *score >= dynamic)
            .take(top_k)
            .collect();
        if kept.is_empty() {
            vec![scored[0]]
        } else {
            kept
        }
    };

    for (rank, (i, score)) in selected.iter().enumerate() {
        tracing::debug!(
            rank = rank + 1,
            score,
            game = index.tags()[*i].as_deref().unwrap_or("-"),
            "selected passage"
        );
    }
    tracing::debug!(max_similarity, threshold, "similarity search complete");

    RetrievalResult {
        passages: selected
            .into_iter()
            .map(|(i, _)| index.passages()[i].clone())
            .collect(),
        max_similarity,
        stage,
    }
}

fn candidate_indices(index: &GuideIndex, scope_title: Option<&str>) -> (Vec<usize>, SearchStage) {
    let Some(scope_title) = scope_title else {
        return ((0..index.len()).collect(), SearchStage::Unscoped);
    };
    let normalized = title::normalize(scope_title);
    let scoped: Vec<usize> = index
        .tags()
        .iter()
        .enumerate()
        .filter(|(_, tag)| {
            tag.as_ref()
                .is_some_and(|tag| title::normalize(tag) == normalized)
        })
        .map(|(i, _)| i)
        .collect();
    if scoped.is_empty() {
        tracing::warn!(game = scope_title, "no passages for game; widening to full index");
        ((0..index.len()).collect(), SearchStage::FallbackFull)
    } else {
        tracing::debug!(game = scope_title, passages = scoped.len(), "scoped search");
        (scoped, SearchStage::Scoped)
    }
}

/// Cosine similarity of two vectors.
///
/// Scores `0.0` when either vector has zero norm or the lengths differ, so a
/// degenerate embedding never poisons the ranking with `NaN`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VectorDocument;

    fn index(entries: &[(&str, [f32; 3])]) -> GuideIndex {
        GuideIndex::from_document(VectorDocument {
            chunks: entries.iter().map(|(text, _)| text.to_string()).collect(),
            embeddings: entries.iter().map(|(_, v)| v.to_vec()).collect(),
        })
        .expect("index")
    }

    fn fishing_index() -> GuideIndex {
        index(&[
            ("<<星露谷物语>>开局种防风草", [1.0, 0.0, 0.0]),
            ("钓鱼小游戏按住左键控制绿条", [0.9, 0.1, 0.0]),
            ("<<只狼>>苇名城怎么走", [0.0, 1.0, 0.0]),
            ("义手忍具推荐鞭炮", [0.0, 0.9, 0.1]),
        ])
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn scoped_search_only_sees_the_requested_game() {
        let result = search(&fishing_index(), &[1.0, 0.0, 0.0], 2, 0.7, Some("星露谷物语"));
        assert_eq!(result.stage, SearchStage::Scoped);
        assert_eq!(result.passages.len(), 2);
        assert!(result.passages.iter().all(|p| !p.contains("只狼") && !p.contains("义手")));
        assert!(result.max_similarity >= 0.99);
    }

    #[test]
    fn unknown_scope_widens_to_the_full_index() {
        let result = search(&fishing_index(), &[0.0, 1.0, 0.0], 2, 0.7, Some("原神"));
        assert_eq!(result.stage, SearchStage::FallbackFull);
        assert!(!result.passages.is_empty());
        assert!(result.passages[0].contains("只狼"));
    }

    #[test]
    fn missing_scope_runs_unscoped() {
        let result = search(&fishing_index(), &[0.0, 1.0, 0.0], 1, 0.7, None);
        assert_eq!(result.stage, SearchStage::Unscoped);
        assert_eq!(result.passages.len(), 1);
    }

    #[test]
    fn low_scores_fall_back_to_the_dynamic_floor() {
        let idx = index(&[
            ("甲路线", [1.0, 0.0, 0.0]),
            ("乙路线", [0.0, 1.0, 0.0]),
            ("丙路线", [0.0, 0.0, 1.0]),
        ]);
        // Best score 0.8 misses the 0.9 threshold; the floor 0.56 keeps the
        // two strongest candidates only.
        let result = search(&idx, &[0.6, 0.8, 0.0], 3, 0.9, None);
        assert_eq!(result.passages.len(), 2);
        assert!((result.max_similarity - 0.8).abs() < 1e-6);
        assert_eq!(result.passages[0], "乙路线");
        assert_eq!(result.passages[1], "甲路线");
    }

    #[test]
    fn nonpositive_best_score_still_returns_the_best_candidate() {
        let idx = index(&[("甲", [0.0, 1.0, 0.0]), ("乙", [0.0, 0.0, 1.0])]);
        let result = search(&idx, &[1.0, 0.0, 0.0], 2, 0.7, None);
        assert_eq!(result.passages.len(), 1);
        assert_eq!(result.max_similarity, 0.0);
    }

    #[test]
    fn nonempty_index_always_yields_a_passage() {
        let idx = fishing_index();
        for threshold in [0.1, 0.3, 0.5, 0.7, 0.9, 1.0] {
            let result = search(&idx, &[0.2, 0.1, 0.9], 3, threshold, None);
            assert!(!result.passages.is_empty(), "threshold {threshold}");
        }
    }

    #[test]
    fn empty_index_yields_nothing() {
        let idx = GuideIndex::from_document(VectorDocument {
            chunks: Vec::new(),
            embeddings: Vec::new(),
        })
        .expect("index");
        let result = search(&idx, &[1.0, 0.0, 0.0], 3, 0.7, None);
        assert!(result.passages.is_empty());
        assert_eq!(result.max_similarity, 0.0);
    }

    #[test]
    fn max_similarity_reports_the_true_best_score() {
        let result = search(&fishing_index(), &[0.9, 0.1, 0.0], 1, 0.2, None);
        assert_eq!(result.passages.len(), 1);
        let expected = cosine_similarity(&[0.9, 0.1, 0.0], &[0.9, 0.1, 0.0]);
        assert!((result.max_similarity - expected).abs() < 1e-6);
    }
}
