//! Game title extraction from free-form questions, plus title reconciliation.
//!
//! Extraction runs an ordered cascade of rules, highest confidence first; the
//! first rule producing an accepted candidate wins. Marker-style brackets beat
//! everything else even when they appear mid-sentence.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::tagger;

/// Question keywords that separate a game title from the asked-about topic.
///
/// Scan order is list order, not position in the text: an earlier entry found
/// anywhere in the question takes precedence over a later entry appearing
/// sooner.
pub const QUESTION_KEYWORDS: &[&str] = &[
    "有没有", "是什么", "怎么", "如何", "怎样", "能否", "可否", "是否", "攻略", "怎么玩",
    "怎么打", "怎么过", "打法", "技巧", "阵容", "配装", "流程", "任务", "通关", "boss",
    "BOSS", "英雄", "角色", "难度", "段位", "思路", "秘籍", "作弊码", "代码", "指令", "命令",
];

static LEADING_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(关于|请问|求|想了解|帮我看看|问下|听说|求助|大神|各位|大家|请教)\s*")
        .expect("leading noise regex")
});

static CN_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"《([^》]+)》").expect("cn bracket regex"));

static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["']([^"']+?)["']"#).expect("quoted span regex"));

static SENTENCE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[？?！!。，,；;：:\n]").expect("sentence punct regex"));

static WORD_CHAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{4e00}-\u{9fa5}A-Za-z0-9]").expect("word char regex"));

static SEGMENT_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[。！？?!；;，,]").expect("segment split regex"));

static WORD_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\u{4e00}-\u{9fa5}A-Za-z0-9][\u{4e00}-\u{9fa5}A-Za-z0-9\s]{1,20}")
        .expect("word run regex")
});

type ExtractRule = fn(&str) -> Option<String>;

/// Extraction rules in descending confidence order; the first hit wins.
const EXTRACTION_RULES: &[(&str, ExtractRule)] = &[
    ("bracketed-marker", extract_bracketed),
    ("quoted-span", extract_quoted),
    ("keyword-boundary", extract_before_keyword),
    ("short-query", extract_short_query),
    ("segment-keyword", extract_from_segments),
    ("word-run-fallback", extract_word_run),
];

/// Guesses the game title a question is about.
///
/// Returns `None` when no rule yields an accepted candidate; that is a normal
/// outcome and simply disables game-scoped retrieval.
pub fn extract_title(query: &str) -> Option<String> {
    for (rule, extract) in EXTRACTION_RULES {
        if let Some(title) = extract(query) {
            tracing::debug!(rule, title = %title, "extracted candidate game title");
            return Some(title);
        }
    }
    None
}

fn extract_bracketed(query: &str) -> Option<String> {
    let candidate = tagger::marker_title(query).or_else(|| {
        CN_BRACKET
            .captures(query)
            .map(|caps| caps[1].trim().to_string())
    })?;
    (char_len(&candidate) >= 2).then_some(candidate)
}

fn extract_quoted(query: &str) -> Option<String> {
    let caps = QUOTED.captures(query)?;
    let candidate = caps[1].trim().to_string();
    let len = char_len(&candidate);
    ((2..=30).contains(&len)).then_some(candidate)
}

fn extract_before_keyword(query: &str) -> Option<String> {
    let cleaned = LEADING_NOISE.replace(query.trim(), "");
    for keyword in QUESTION_KEYWORDS {
        let Some(pos) = cleaned.find(keyword) else {
            continue;
        };
        if pos == 0 {
            continue;
        }
        let candidate = cleaned[..pos].trim().trim_matches(is_candidate_trim);
        let len = char_len(candidate);
        if (2..=30).contains(&len) && !contains_keyword(candidate) {
            return Some(candidate.to_string());
        }
    }
    None
}

fn extract_short_query(query: &str) -> Option<String> {
    let condensed = query.trim().trim_matches(is_bracket_quote);
    if contains_keyword(condensed) {
        return None;
    }
    let len = char_len(condensed);
    let looks_like_title = len > 1
        && len <= 20
        && !SENTENCE_PUNCT.is_match(condensed)
        && WORD_CHAR.is_match(condensed);
    looks_like_title.then(|| condensed.to_string())
}

fn extract_from_segments(query: &str) -> Option<String> {
    for segment in SEGMENT_SPLIT.split(query) {
        let seg = segment.trim();
        if seg.is_empty() {
            continue;
        }
        for keyword in QUESTION_KEYWORDS {
            let Some(pos) = seg.find(keyword) else {
                continue;
            };
            let cleaned = LEADING_NOISE.replace(&seg[..pos], "");
            let candidate = cleaned.trim_matches(is_bracket_quote_or_space);
            if char_len(candidate) >= 2 {
                return Some(candidate.to_string());
            }
        }
    }
    None
}

fn extract_word_run(query: &str) -> Option<String> {
    let run = WORD_RUN.find(query)?;
    let mut candidate = run.as_str().trim().to_string();
    for keyword in QUESTION_KEYWORDS {
        if let Some(pos) = candidate.find(keyword) {
            if pos > 0 {
                candidate = candidate[..pos].trim().to_string();
                break;
            }
        }
    }
    (char_len(&candidate) >= 2 && !contains_keyword(&candidate)).then_some(candidate)
}

fn contains_keyword(text: &str) -> bool {
    QUESTION_KEYWORDS.iter().any(|kw| text.contains(kw))
}

fn is_candidate_trim(c: char) -> bool {
    "《》\"「」『』，。！？?!；;：: ".contains(c)
}

fn is_bracket_quote(c: char) -> bool {
    "《》\"「」『』".contains(c)
}

fn is_bracket_quote_or_space(c: char) -> bool {
    "《》\"「」『』 ".contains(c)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Canonical form used for all title comparison: bracket characters and
/// whitespace removed, lowercased.
pub fn normalize(title: &str) -> String {
    title
        .chars()
        .filter(|c| !is_normalization_noise(*c))
        .collect::<String>()
        .to_lowercase()
}

fn is_normalization_noise(c: char) -> bool {
    matches!(c, '《' | '》' | '<' | '>' | '「' | '」' | '『' | '』') || c.is_whitespace()
}

/// Reconciles the title detected in the question with the title the loaded
/// walkthrough is known to cover.
///
/// When one normalized title contains the other, the longer raw string wins:
/// it usually carries an edition or subtitle suffix. Disjoint titles keep the
/// detected one, staying faithful to what the user asked.
pub fn resolve(detected: Option<&str>, known: Option<&str>) -> Option<String> {
    match (detected, known) {
        (Some(detected), Some(known)) => {
            let normalized_detected = normalize(detected);
            let normalized_known = normalize(known);
            if normalized_known.contains(&normalized_detected)
                && char_len(known) > char_len(detected)
            {
                Some(known.to_string())
            } else if normalized_detected.contains(&normalized_known)
                && char_len(detected) >= char_len(known)
            {
                Some(detected.to_string())
            } else {
                Some(detected.to_string())
            }
        }
        (Some(detected), None) => Some(detected.to_string()),
        (None, Some(known)) => Some(known.to_string()),
        (None, None) => None,
    }
}

/// True when the detected and known titles textually denote the same game,
/// ignoring brackets, whitespace and case: exact match or containment either
/// way.
pub fn is_direct_match(detected: Option<&str>, known: Option<&str>) -> bool {
    let (Some(detected), Some(known)) = (detected, known) else {
        return false;
    };
    let normalized_detected = normalize(detected);
    let normalized_known = normalize(known);
    normalized_detected == normalized_known
        || normalized_known.contains(&normalized_detected)
        || normalized_detected.contains(&normalized_known)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_brackets_win_even_mid_sentence() {
        assert_eq!(
            extract_title("<<星露谷物语>>怎么钓鱼"),
            Some("星露谷物语".to_string())
        );
        assert_eq!(
            extract_title("请问<<艾尔登法环>>的boss怎么打"),
            Some("艾尔登法环".to_string())
        );
        assert_eq!(
            extract_title("《塞尔达传说》有没有攻略"),
            Some("塞尔达传说".to_string())
        );
    }

    #[test]
    fn quoted_span_is_accepted_within_bounds() {
        assert_eq!(
            extract_title("\"Hollow Knight\"怎么玩"),
            Some("Hollow Knight".to_string())
        );
        // A single quoted character is too short to be a title.
        assert_eq!(extract_title("\"x\"怎么玩"), None);
    }

    #[test]
    fn keyword_boundary_extracts_title_prefix() {
        assert_eq!(extract_title("星露谷物语怎么钓鱼"), Some("星露谷物语".to_string()));
        assert_eq!(extract_title("请问原神如何抽卡"), Some("原神".to_string()));
    }

    #[test]
    fn keyword_scan_follows_list_order_not_text_order() {
        // "怎么" is scanned before "攻略" even though "攻略" appears first in
        // the text; its candidate contains a keyword and is rejected, so the
        // scan falls through to "攻略".
        assert_eq!(extract_title("地平线攻略里怎么骑马"), Some("地平线".to_string()));
    }

    #[test]
    fn query_that_is_all_keywords_yields_none() {
        assert_eq!(extract_title("怎么打败人马"), None);
    }

    #[test]
    fn short_query_is_taken_verbatim() {
        assert_eq!(extract_title("星露谷物语"), Some("星露谷物语".to_string()));
        assert_eq!(extract_title("《女神异闻录5》"), Some("女神异闻录5".to_string()));
    }

    #[test]
    fn single_character_query_is_rejected() {
        assert_eq!(extract_title("魂"), None);
    }

    #[test]
    fn segment_rule_recovers_from_noisy_lead_in() {
        assert_eq!(
            extract_title("有没有人知道，流放之路怎么玩"),
            Some("流放之路".to_string())
        );
    }

    #[test]
    fn word_run_fallback_survives_punctuation_noise() {
        assert_eq!(extract_title("!!!原神!!!"), Some("原神".to_string()));
    }

    #[test]
    fn extraction_is_idempotent_on_short_titles() {
        for query in ["星露谷物语", "只狼", "Hades"] {
            let first = extract_title(query).expect("title");
            assert_eq!(extract_title(&first), Some(first.clone()));
        }
    }

    #[test]
    fn normalize_strips_brackets_whitespace_and_case() {
        assert_eq!(normalize("《星露谷 物语》"), "星露谷物语");
        assert_eq!(normalize("<<Stardew Valley>>"), "stardewvalley");
    }

    #[test]
    fn normalize_is_a_fixed_point() {
        for title in ["《仙剑奇侠传》", "  Elden Ring ", "「只狼」", "星露谷物语"] {
            let once = normalize(title);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn resolve_prefers_the_superset_title() {
        assert_eq!(
            resolve(Some("仙剑"), Some("仙剑奇侠传")),
            Some("仙剑奇侠传".to_string())
        );
        assert_eq!(
            resolve(Some("星露谷物语豪华版"), Some("星露谷物语")),
            Some("星露谷物语豪华版".to_string())
        );
    }

    #[test]
    fn resolve_keeps_the_detected_title_when_disjoint() {
        assert_eq!(resolve(Some("原神"), Some("星露谷物语")), Some("原神".to_string()));
    }

    #[test]
    fn resolve_falls_back_to_whichever_side_is_present() {
        assert_eq!(resolve(Some("只狼"), None), Some("只狼".to_string()));
        assert_eq!(resolve(None, Some("只狼")), Some("只狼".to_string()));
        assert_eq!(resolve(None, None), None);
    }

    #[test]
    fn direct_match_ignores_brackets_and_allows_containment() {
        assert!(is_direct_match(Some("<<星露谷物语>>"), Some("星露谷物语")));
        assert!(is_direct_match(Some("仙剑"), Some("仙剑奇侠传")));
        assert!(!is_direct_match(Some("原神"), Some("星露谷物语")));
        assert!(!is_direct_match(Some("原神"), None));
        assert!(!is_direct_match(None, Some("星露谷物语")));
    }
}
