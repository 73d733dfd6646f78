//! Per-game passage tagging via forward propagation of corpus markers.

use once_cell::sync::Lazy;
use regex::Regex;

/// A `<<Title>>` marker opens a new game section in the corpus.
static GAME_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<<([^>]+)>>").expect("game marker regex"));

/// Extracts the game title from a marker inside `text`, if any.
pub fn marker_title(text: &str) -> Option<String> {
    GAME_MARKER
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

/// Assigns each passage the game it belongs to.
///
/// A passage carrying a `<<Title>>` marker starts a new current title; every
/// following passage inherits it until the next marker. Passages before the
/// first marker carry no title. One forward scan, no backward repair.
pub fn tag(passages: &[String]) -> Vec<Option<String>> {
    let mut tags = Vec::with_capacity(passages.len());
    let mut current: Option<String> = None;
    for passage in passages {
        if let Some(title) = marker_title(passage) {
            current = Some(title);
        }
        tags.push(current.clone());
    }
    tags
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn passages(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn marker_opens_a_section() {
        let tags = tag(&passages(&[
            "<<星露谷物语>>新手指南",
            "春季作物推荐防风草",
            "<<塞尔达传说>>初始台地攻略",
            "滑翔伞在神庙后获得",
        ]));
        assert_eq!(
            tags,
            vec![
                Some("星露谷物语".to_string()),
                Some("星露谷物语".to_string()),
                Some("塞尔达传说".to_string()),
                Some("塞尔达传说".to_string()),
            ]
        );
    }

    #[test]
    fn passages_before_first_marker_are_untagged() {
        let tags = tag(&passages(&["前言内容", "<<只狼>>忍义手玩法", "苇名城地图"]));
        assert_eq!(tags[0], None);
        assert_eq!(tags[1], Some("只狼".to_string()));
        assert_eq!(tags[2], Some("只狼".to_string()));
    }

    #[test]
    fn marker_title_is_trimmed() {
        assert_eq!(marker_title("<< 黑神话悟空 >>第一章"), Some("黑神话悟空".to_string()));
        assert_eq!(marker_title("无标记内容"), None);
    }

    #[test]
    fn empty_corpus_yields_no_tags() {
        assert!(tag(&[]).is_empty());
    }

    proptest! {
        /// An untagged position always equals its predecessor: the current
        /// title only ever moves forward.
        #[test]
        fn forward_propagation_invariant(layout in prop::collection::vec(prop::option::of(0u8..5), 0..40)) {
            let passages: Vec<String> = layout
                .iter()
                .enumerate()
                .map(|(i, marker)| match marker {
                    Some(game) => format!("<<game-{game}>>第{i}节"),
                    None => format!("第{i}节正文"),
                })
                .collect();
            let tags = tag(&passages);
            prop_assert_eq!(tags.len(), passages.len());
            for i in 0..tags.len() {
                if marker_title(&passages[i]).is_none() {
                    if i == 0 {
                        prop_assert!(tags[0].is_none());
                    } else {
                        prop_assert_eq!(&tags[i], &tags[i - 1]);
                    }
                }
            }
        }
    }
}
