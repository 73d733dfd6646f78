//! Relevance gating: decide whether retrieved passages are authoritative for
//! the asked-about game or a fresh guide must be generated.

/// Terminal outcome of the relevance gate for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Answer from retrieved passages; the best score cleared the threshold.
    RagHigh,
    /// Answer from retrieved passages despite a sub-threshold best score.
    RagLow,
    /// Retrieval does not cover the asked-about game; generate a fresh guide.
    Generated,
    /// Nothing was retrieved; answer from general knowledge.
    General,
}

/// Signals available once the similarity search has run.
#[derive(Debug, Clone, Copy)]
pub struct GateSignals {
    /// Number of passages the search returned.
    pub passage_count: usize,
    /// Best similarity over the candidate pool.
    pub max_similarity: f32,
    /// Configured similarity threshold.
    pub threshold: f32,
    /// Whether a game title was detected in the question.
    pub title_detected: bool,
    /// Whether the detected title textually matches the known title.
    pub direct_title_match: bool,
}

/// Next step after the search: answer immediately, or verify the game first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStep {
    /// Proceed straight to answering with the given outcome.
    Answer(GateOutcome),
    /// Passages exist and a title was detected without an exact high-confidence
    /// match; the game must be re-verified semantically before answering.
    VerifyTitle,
}

/// Decides what to do once retrieval has completed.
///
/// An exact textual title match combined with a threshold-clearing score skips
/// verification outright; a question with no detectable title is assumed to be
/// about the loaded walkthrough and is answered directly.
pub fn after_search(signals: &GateSignals) -> GateStep {
    let skip_verification =
        signals.direct_title_match && signals.max_similarity >= signals.threshold;
    if signals.passage_count > 0 && signals.title_detected && !skip_verification {
        GateStep::VerifyTitle
    } else {
        GateStep::Answer(answering_outcome(signals))
    }
}

/// Folds the semantic title-verification verdict into a terminal outcome.
pub fn after_title_verification(signals: &GateSignals, title_matches: bool) -> GateOutcome {
    if title_matches {
        answering_outcome(signals)
    } else {
        GateOutcome::Generated
    }
}

fn answering_outcome(signals: &GateSignals) -> GateOutcome {
    if signals.passage_count == 0 {
        GateOutcome::General
    } else if signals.max_similarity >= signals.threshold {
        GateOutcome::RagHigh
    } else {
        GateOutcome::RagLow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(
        passage_count: usize,
        max_similarity: f32,
        title_detected: bool,
        direct_title_match: bool,
    ) -> GateSignals {
        GateSignals {
            passage_count,
            max_similarity,
            threshold: 0.7,
            title_detected,
            direct_title_match,
        }
    }

    #[test]
    fn exact_title_with_high_score_skips_verification() {
        let step = after_search(&signals(3, 0.85, true, true));
        assert_eq!(step, GateStep::Answer(GateOutcome::RagHigh));
    }

    #[test]
    fn exact_title_with_low_score_still_verifies() {
        assert_eq!(after_search(&signals(3, 0.4, true, true)), GateStep::VerifyTitle);
    }

    #[test]
    fn foreign_title_triggers_verification() {
        assert_eq!(after_search(&signals(3, 0.9, true, false)), GateStep::VerifyTitle);
    }

    #[test]
    fn no_detected_title_answers_directly() {
        assert_eq!(
            after_search(&signals(3, 0.9, false, false)),
            GateStep::Answer(GateOutcome::RagHigh)
        );
        assert_eq!(
            after_search(&signals(2, 0.3, false, false)),
            GateStep::Answer(GateOutcome::RagLow)
        );
    }

    #[test]
    fn empty_retrieval_answers_from_general_knowledge() {
        assert_eq!(
            after_search(&signals(0, 0.0, true, false)),
            GateStep::Answer(GateOutcome::General)
        );
    }

    #[test]
    fn failed_verification_generates_a_fresh_guide() {
        let s = signals(3, 0.5, true, false);
        assert_eq!(after_title_verification(&s, false), GateOutcome::Generated);
    }

    #[test]
    fn passed_verification_answers_by_confidence() {
        assert_eq!(
            after_title_verification(&signals(3, 0.8, true, false), true),
            GateOutcome::RagHigh
        );
        assert_eq!(
            after_title_verification(&signals(3, 0.2, true, false), true),
            GateOutcome::RagLow
        );
    }
}
