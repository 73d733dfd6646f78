//! Corpus segmentation into bounded, overlapping passages.

use once_cell::sync::Lazy;
use regex::Regex;

/// Segmentation tuning knobs.
///
/// All widths are measured in characters, not bytes, so that CJK corpora are
/// budgeted the same way as Latin text.
#[derive(Debug, Clone, Copy)]
pub struct SegmentConfig {
    /// Target passage width before a new passage is started.
    pub chunk_size: usize,
    /// Tail of the preceding passage prepended to each successor.
    pub overlap: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            overlap: 50,
        }
    }
}

/// Sentence terminators recognized when a single paragraph overflows the
/// passage budget. Covers both CJK and Western punctuation.
static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[。！？.!?]\s*").expect("sentence split regex"));

/// Splits raw corpus text into passages of roughly `chunk_size` characters.
///
/// Paragraphs (blank-line separated) are greedily packed into passages. A
/// paragraph that alone exceeds the budget is re-split on sentence boundaries
/// and repacked. After packing, every passage except the first is prefixed
/// with the last `overlap` characters of its predecessor so that context
/// straddling a boundary survives retrieval. Prefixed passages may exceed
/// `chunk_size`; that slack is intentional.
pub fn segment(text: &str, config: &SegmentConfig) -> Vec<String> {
    let chunks = pack_paragraphs(text, config.chunk_size);
    apply_overlap(chunks, config.overlap)
}

fn pack_paragraphs(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        if char_len(&current) + char_len(para) + 2 <= chunk_size {
            if current.is_empty() {
                current.push_str(para);
            } else {
                current.push_str("\n\n");
                current.push_str(para);
            }
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if char_len(para) > chunk_size {
            pack_sentences(para, chunk_size, &mut chunks, &mut current);
        } else {
            current.push_str(para);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn pack_sentences(para: &str, chunk_size: usize, chunks: &mut Vec<String>, current: &mut String) {
    current.clear();
    for sentence in SENTENCE_SPLIT.split(para) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        if char_len(current) + char_len(sentence) + 1 <= chunk_size {
            if current.is_empty() {
                current.push_str(sentence);
            } else {
                current.push(' ');
                current.push_str(sentence);
            }
        } else {
            if !current.is_empty() {
                chunks.push(std::mem::take(current));
            }
            current.push_str(sentence);
        }
    }
}

fn apply_overlap(chunks: Vec<String>, overlap: usize) -> Vec<String> {
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }
    let mut overlapped = Vec::with_capacity(chunks.len());
    overlapped.push(chunks[0].clone());
    for i in 1..chunks.len() {
        let prev = &chunks[i - 1];
        if char_len(prev) > overlap {
            let mut joined = tail_chars(prev, overlap).to_string();
            joined.push(' ');
            joined.push_str(&chunks[i]);
            overlapped.push(joined);
        } else {
            overlapped.push(chunks[i].clone());
        }
    }
    overlapped
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Returns the suffix of `s` holding its last `n` characters.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, overlap: usize) -> SegmentConfig {
        SegmentConfig {
            chunk_size,
            overlap,
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(segment("", &SegmentConfig::default()).is_empty());
        assert!(segment("\n\n\n\n", &SegmentConfig::default()).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = segment("第一段内容。", &SegmentConfig::default());
        assert_eq!(chunks, vec!["第一段内容。".to_string()]);
    }

    #[test]
    fn packs_paragraphs_up_to_budget() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        let chunks = segment(text, &config(14, 0));
        assert_eq!(chunks, vec!["aaaa\n\nbbbb".to_string(), "cccc".to_string()]);
    }

    #[test]
    fn long_paragraph_splits_on_sentences() {
        let text = "第一句很长很长很长。第二句也很长很长。第三句结束了。";
        let chunks = segment(text, &config(12, 0));
        assert!(chunks.len() > 1);
        assert!(chunks[0].starts_with("第一句"));
        for chunk in &chunks {
            assert!(!chunk.contains('。'));
        }
    }

    #[test]
    fn overlap_prefixes_successors_with_predecessor_tail() {
        let text = "甲甲甲甲甲甲甲甲\n\n乙乙乙乙乙乙乙乙";
        let chunks = segment(text, &config(10, 4));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "甲甲甲甲甲甲甲甲");
        assert_eq!(chunks[1], "甲甲甲甲 乙乙乙乙乙乙乙乙");
    }

    #[test]
    fn short_predecessor_leaves_successor_unprefixed() {
        let text = "短段\n\n乙乙乙乙乙乙乙乙";
        let chunks = segment(text, &config(8, 4));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], "乙乙乙乙乙乙乙乙");
    }

    #[test]
    fn overlap_only_adds_characters() {
        let text = "星露谷物语开荒前期先砍树攒木头。\n\n矿洞第五层可以拿到第一把剑。\n\n钓鱼小游戏按住左键控制绿条。";
        let plain = segment(text, &config(20, 0));
        let overlapped = segment(text, &config(20, 6));
        assert_eq!(plain.len(), overlapped.len());
        let plain_total: usize = plain.iter().map(|c| c.chars().count()).sum();
        let overlapped_total: usize = overlapped.iter().map(|c| c.chars().count()).sum();
        assert!(overlapped_total >= plain_total);
        for (plain_chunk, over_chunk) in plain.iter().zip(&overlapped) {
            assert!(over_chunk.ends_with(plain_chunk.as_str()));
        }
    }

    #[test]
    fn every_paragraph_survives_segmentation() {
        let text = "开局先做鱼竿。\n\n春季送礼优先送给海莉。\n\n下矿记得带食物。";
        let chunks = segment(text, &config(24, 0));
        let joined = chunks.join("\n\n");
        for para in text.split("\n\n") {
            assert!(joined.contains(para.trim()));
        }
    }
}
