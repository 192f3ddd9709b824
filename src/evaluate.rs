use clap::ValueEnum;
use serde::Serialize;

use crate::taxonomy::{SectionSet, collapse, normalize_opt};

const AMBIGUITY_MARKERS: [&str; 2] = ["DOUBT", "CANTFINDANYSECTION"];

const LEGACY_SLOT_ONE: &str = "SECTION1:";
const LEGACY_SLOT_TWO: &str = "SECTION2:";
const LEGACY_SLOT_WIDTH: usize = 4;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    AmbiguityOverride,
    Overlap,
    LegacySlots,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub predicted: SectionSet,
    pub ground_truth: SectionSet,
    pub is_match: bool,
    pub rule: MatchRule,
}

pub trait SectionEvaluator {
    fn evaluate(&self, predicted: Option<&str>, ground_truth: Option<&str>) -> MatchOutcome;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EvaluatorKind {
    Overlap,
    LegacySlots,
}

impl EvaluatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overlap => "overlap",
            Self::LegacySlots => "legacy-slots",
        }
    }

    pub fn build(self) -> Box<dyn SectionEvaluator + Send + Sync> {
        match self {
            Self::Overlap => Box::new(OverlapEvaluator),
            Self::LegacySlots => Box::new(LegacySlotEvaluator),
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct OverlapEvaluator;

impl SectionEvaluator for OverlapEvaluator {
    fn evaluate(&self, predicted: Option<&str>, ground_truth: Option<&str>) -> MatchOutcome {
        let predicted_sections = normalize_opt(predicted);
        let ground_truth_sections = normalize_opt(ground_truth);

        if ground_truth.is_some_and(is_ambiguous_label) {
            return MatchOutcome {
                predicted: predicted_sections,
                ground_truth: ground_truth_sections,
                is_match: true,
                rule: MatchRule::AmbiguityOverride,
            };
        }

        let is_match = !predicted_sections.is_disjoint(&ground_truth_sections);
        MatchOutcome {
            predicted: predicted_sections,
            ground_truth: ground_truth_sections,
            is_match,
            rule: MatchRule::Overlap,
        }
    }
}

pub fn evaluate(predicted: &str, ground_truth: &str) -> MatchOutcome {
    OverlapEvaluator.evaluate(Some(predicted), Some(ground_truth))
}

pub fn is_ambiguous_label(ground_truth: &str) -> bool {
    let collapsed = collapse(ground_truth);
    AMBIGUITY_MARKERS
        .iter()
        .any(|marker| collapsed.contains(marker))
}

#[derive(Copy, Clone, Debug, Default)]
pub struct LegacySlotEvaluator;

impl LegacySlotEvaluator {
    pub fn slots(predicted: &str) -> (String, String) {
        let squashed = strip_spaces_upper(predicted);
        let (first_part, second_part) = match squashed.split_once(LEGACY_SLOT_TWO) {
            Some((head, tail)) => (head, Some(tail)),
            None => (squashed.as_str(), None),
        };

        let slot_one = first_part
            .split_once(LEGACY_SLOT_ONE)
            .map(|(_, tail)| leading_chars(tail))
            .unwrap_or_default();
        let slot_two = second_part
            .map(|tail| {
                let tail = tail.split(LEGACY_SLOT_TWO).next().unwrap_or(tail);
                leading_chars(tail)
            })
            .unwrap_or_default();

        (slot_one, slot_two)
    }
}

impl SectionEvaluator for LegacySlotEvaluator {
    fn evaluate(&self, predicted: Option<&str>, ground_truth: Option<&str>) -> MatchOutcome {
        let (slot_one, slot_two) = predicted.map(Self::slots).unwrap_or_default();
        let expected = ground_truth.map(strip_spaces_upper).unwrap_or_default();

        let is_match =
            !expected.is_empty() && (expected == slot_one || expected == slot_two);

        MatchOutcome {
            predicted: normalize_opt(predicted),
            ground_truth: normalize_opt(ground_truth),
            is_match,
            rule: MatchRule::LegacySlots,
        }
    }
}

fn strip_spaces_upper(text: &str) -> String {
    text.replace(' ', "").to_uppercase()
}

fn leading_chars(text: &str) -> String {
    text.chars().take(LEGACY_SLOT_WIDTH).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{SectionCode, SectionSet};

    #[test]
    fn overlapping_prediction_matches_single_ground_truth() {
        let outcome = evaluate("Section1: 194C, Section2: 194Q", "194C");
        assert!(outcome.is_match);
        assert_eq!(outcome.rule, MatchRule::Overlap);
        assert_eq!(
            outcome.predicted,
            [SectionCode::S194C, SectionCode::S194Q].into_iter().collect::<SectionSet>()
        );
        assert_eq!(outcome.ground_truth, [SectionCode::S194C].into_iter().collect::<SectionSet>());
    }

    #[test]
    fn doubtful_ground_truth_forces_a_match() {
        let outcome = evaluate("194H", "I have doubts, can't find any section");
        assert!(outcome.is_match);
        assert_eq!(outcome.rule, MatchRule::AmbiguityOverride);
        assert!(outcome.ground_truth.is_empty());

        let outcome = evaluate("194A", "Can't find any section.");
        assert!(outcome.is_match);
    }

    #[test]
    fn disjoint_sections_do_not_match() {
        let outcome = evaluate("194A", "194C");
        assert!(!outcome.is_match);
        assert_eq!(outcome.rule, MatchRule::Overlap);
    }

    #[test]
    fn missing_ground_truth_never_matches() {
        let outcome = OverlapEvaluator.evaluate(Some("194C"), None);
        assert!(!outcome.is_match);
        assert!(outcome.ground_truth.is_empty());

        let outcome = OverlapEvaluator.evaluate(None, None);
        assert!(!outcome.is_match);
    }

    #[test]
    fn empty_sets_on_both_sides_are_not_a_match() {
        let outcome = evaluate("unsure", "not labelled");
        assert!(!outcome.is_match);
    }

    #[test]
    fn legacy_slots_take_four_characters_after_each_marker() {
        let (one, two) = LegacySlotEvaluator::slots("Section 1: 194C\nSection 2: 194Q");
        assert_eq!(one, "194C");
        assert_eq!(two, "194Q");

        let (one, two) = LegacySlotEvaluator::slots("Section 1: No TDS");
        assert_eq!(one, "NOTD");
        assert_eq!(two, "");
    }

    #[test]
    fn legacy_evaluator_requires_exact_slot_equality() {
        let evaluator = LegacySlotEvaluator;
        let hit = evaluator.evaluate(Some("Section 1: 194C, Section 2: 194Q"), Some("194Q"));
        assert!(hit.is_match);
        assert_eq!(hit.rule, MatchRule::LegacySlots);

        let drift = evaluator.evaluate(Some("The answer is 194C"), Some("194C"));
        assert!(!drift.is_match);
        assert_eq!(drift.predicted, [SectionCode::S194C].into_iter().collect::<SectionSet>());

        let truncated = evaluator.evaluate(Some("Section 1: 194JA"), Some("194JA"));
        assert!(!truncated.is_match);

        let empty = evaluator.evaluate(Some("no markers"), Some(""));
        assert!(!empty.is_match);
    }

    #[test]
    fn evaluator_kind_builds_matching_strategy() {
        let overlap = EvaluatorKind::Overlap.build();
        assert!(overlap.evaluate(Some("Section 1: 194C"), Some("194 C")).is_match);

        let legacy = EvaluatorKind::LegacySlots.build();
        assert!(!legacy.evaluate(Some("194C"), Some("194C")).is_match);
    }
}
