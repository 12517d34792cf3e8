//! Section Splitter Service
//!
//! Partitions label text into the ingredient-declaration zone and the
//! precautionary may-contain zone, then trims trailing storage/date text off
//! the may-contain zone. OCR noise in that trailing text routinely collides
//! with allergen terms ("cool" misread near "cod"), so it never reaches the
//! classifier.

use regex::Regex;
use thiserror::Error;

/// Splitter errors
#[derive(Debug, Error)]
pub enum SplitterError {
    /// Pattern compilation failed
    #[error("Pattern compilation failed: {0}")]
    Pattern(#[from] regex::Error),
}

/// Trigger phrases opening a may-contain / trace / cross-contamination zone
const MAY_CONTAIN_TRIGGERS: &[&str] = &[
    r"\bmay\s+contain\b",
    r"\bcontains\s+trace",
    r"\btraces?\s+of\b",
    r"\bcross[\s-]contaminat",
    r"\bproduced\s+in\s+a\s+facility",
    r"\bprocessed\s+with",
    r"\bshared\s+equipment",
    r"\bequipment\s+.*allergen",
];

/// Markers of trailing non-ingredient content (storage, dating, batch)
const NON_INGREDIENT_MARKERS: &[&str] = &[
    "store in",
    "store at",
    "storage",
    "best before",
    "best by",
    "use by",
    "expiry",
    "batch",
    "lot",
    "manufactured",
    "packed on",
    "keep refrigerated",
    "keep frozen",
    "refrigerate",
    "freeze",
];

/// Split result: borrowed slices of the input text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSections<'a> {
    /// Ingredient-declaration zone (everything before the trigger)
    pub ingredients: &'a str,
    /// May-contain zone, trimmed of trailing storage/date text
    pub may_contain: &'a str,
    /// Byte offset of the may-contain zone in the input, if a trigger matched
    pub may_contain_offset: Option<usize>,
}

/// Section Splitter
pub struct SectionSplitter {
    trigger: Regex,
}

impl SectionSplitter {
    pub fn new() -> Result<Self, SplitterError> {
        let trigger = Regex::new(&format!("(?i)(?:{})", MAY_CONTAIN_TRIGGERS.join("|")))?;
        Ok(Self { trigger })
    }

    /// Split text at the first may-contain trigger
    ///
    /// No trigger: the entire text is the ingredient section and the
    /// may-contain section is empty.
    pub fn split<'a>(&self, text: &'a str) -> SplitSections<'a> {
        let Some(m) = self.trigger.find(text) else {
            return SplitSections {
                ingredients: text,
                may_contain: "",
                may_contain_offset: None,
            };
        };

        let split_at = m.start();
        let ingredients = &text[..split_at];
        let candidate = &text[split_at..];

        // Trim the may-contain zone at the earliest non-ingredient marker
        let lower = candidate.to_lowercase();
        let cutoff = NON_INGREDIENT_MARKERS
            .iter()
            .filter_map(|marker| lower.find(marker))
            .min()
            .unwrap_or(candidate.len());

        SplitSections {
            ingredients,
            may_contain: candidate[..cutoff].trim_end(),
            may_contain_offset: Some(split_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter() -> SectionSplitter {
        SectionSplitter::new().unwrap()
    }

    #[test]
    fn no_trigger_means_everything_is_ingredients() {
        let s = splitter();
        let sections = s.split("ingredients: wheat flour, sugar, salt");
        assert_eq!(sections.ingredients, "ingredients: wheat flour, sugar, salt");
        assert_eq!(sections.may_contain, "");
        assert_eq!(sections.may_contain_offset, None);
    }

    #[test]
    fn splits_at_may_contain_trigger() {
        let s = splitter();
        let sections = s.split("ingredients: milk. may contain traces of peanuts.");
        assert_eq!(sections.ingredients, "ingredients: milk. ");
        assert_eq!(sections.may_contain, "may contain traces of peanuts.");
        assert_eq!(sections.may_contain_offset, Some(19));
    }

    #[test]
    fn trims_storage_instructions_from_may_contain() {
        let s = splitter();
        let sections =
            s.split("ingredients: milk. may contain traces of peanuts. store in a cool place.");
        assert_eq!(sections.may_contain, "may contain traces of peanuts.");
    }

    #[test]
    fn trims_at_earliest_marker() {
        let s = splitter();
        let sections = s.split("may contain sesame. batch 42. best before 2026");
        assert_eq!(sections.may_contain, "may contain sesame.");
    }

    #[test]
    fn facility_phrasing_triggers_split() {
        let s = splitter();
        let sections = s.split("sugar, cocoa. produced in a facility that handles tree nuts");
        assert_eq!(sections.ingredients, "sugar, cocoa. ");
        assert!(sections
            .may_contain
            .starts_with("produced in a facility"));
    }

    #[test]
    fn empty_input_yields_empty_sections() {
        let s = splitter();
        let sections = s.split("");
        assert_eq!(sections.ingredients, "");
        assert_eq!(sections.may_contain, "");
    }
}
