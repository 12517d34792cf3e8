//! Context Scorer Service
//!
//! Scores how likely a keyword hit is a genuine ingredient mention rather
//! than noise from a nutrition table, heading, or negated claim. Naive
//! keyword search over OCR text produces spurious hits inside nutrition
//! panels; this scorer is the gate that keeps them out of reports.
//!
//! Also hosts the context-gated dictionary mention scan the evidence merger
//! uses to corroborate recognizer output.

use crate::textutil::{ceil_char_boundary, floor_char_boundary};
use crate::types::AllergenClass;
use crate::vocabulary::Vocabulary;
use allerscan_common::EngineConfig;
use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

/// Scorer errors
#[derive(Debug, Error)]
pub enum ScorerError {
    /// Pattern compilation failed
    #[error("Pattern compilation failed: {0}")]
    Pattern(#[from] regex::Error),
}

/// Strong positive signals: clear ingredient-declaration context
const INGREDIENT_MARKERS: &[&str] = &[
    "ingredients:",
    "contains:",
    "may contain",
    "allergen",
    "allergy",
    "contains ",
];

/// Generic food words whose presence suggests a real ingredient list
const FOOD_WORDS: &[&str] = &[
    "oil", "salt", "sugar", "flour", "sauce", "powder", "extract", "organic", "natural",
    "fresh", "whole", "grain", "seed", "water",
];

/// Nutrition/measurement terms; penalized only without an ingredient marker
const NUTRITION_TERMS: &[&str] = &[
    "serving", "per 100", "energy", "kilojoule", "calorie", "average", "rdi", "qty",
];

/// Metadata/heading terms; penalized only without an ingredient marker
const METADATA_TERMS: &[&str] = &["information", "nutrition facts", "label", "package"];

/// A context-accepted dictionary mention of an allergen keyword
#[derive(Debug, Clone)]
pub struct Mention {
    /// Byte offset of the keyword in the scanned text
    pub offset: usize,
    /// The vocabulary term that matched
    pub keyword: String,
    /// Surrounding snippet for evidence
    pub context: String,
    /// Context score at the match site
    pub score: f32,
}

/// Context Scorer
///
/// Pure and stateless given its compiled signal tables. Total over all
/// inputs: out-of-range offsets clamp to the text bounds.
pub struct ContextScorer {
    window: usize,
    mention_threshold: f32,
    unit_re: Regex,
    negation_cue_re: Regex,
    class_patterns: Vec<(AllergenClass, Regex)>,
}

impl ContextScorer {
    /// Build the scorer, compiling one keyword pattern per vocabulary class
    pub fn new(config: &EngineConfig, vocabulary: &Vocabulary) -> Result<Self, ScorerError> {
        let mut class_patterns = Vec::new();
        for (class, entry) in vocabulary.iter() {
            let mut terms: Vec<&str> = entry
                .keywords
                .iter()
                .chain(entry.products.iter())
                .map(String::as_str)
                .collect();
            if terms.is_empty() {
                continue;
            }
            // Longest first so phrases win over their leading word
            terms.sort_by_key(|t| std::cmp::Reverse(t.len()));
            let alternation = terms
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            class_patterns.push((class, Regex::new(&format!(r"\b(?:{})\b", alternation))?));
        }

        Ok(Self {
            window: config.context_window,
            mention_threshold: config.mention_threshold,
            unit_re: Regex::new(r"\d+\s*[gm][gl]?")?,
            negation_cue_re: Regex::new(
                r"\b(?:free\s+from|does\s+not\s+contain|no|zero|without)\s+$",
            )?,
            class_patterns,
        })
    }

    /// Score a keyword hit at `match_offset` in `text`
    ///
    /// Starts neutral at 0.5 over a symmetric window around the match and
    /// applies the signal table; the result is clamped to [0, 1].
    pub fn score(&self, text: &str, match_offset: usize, keyword: &str) -> f32 {
        if text.is_empty() || keyword.is_empty() {
            return 0.5;
        }

        let offset = floor_char_boundary(text, match_offset.min(text.len()));
        let start = floor_char_boundary(text, offset.saturating_sub(self.window));
        let end = ceil_char_boundary(text, (offset + keyword.len() + self.window).min(text.len()));
        let context = text[start..end].to_lowercase();
        let keyword = keyword.to_lowercase();

        let mut score = 0.5_f32;

        let has_marker = INGREDIENT_MARKERS.iter().any(|m| context.contains(m));
        if has_marker {
            score += 0.6;
        }

        let food_hits = FOOD_WORDS.iter().filter(|w| context.contains(*w)).count();
        score += (food_hits as f32 * 0.08).min(0.3);

        let nutrition_hits = NUTRITION_TERMS
            .iter()
            .filter(|t| context.contains(*t))
            .count();
        if nutrition_hits > 0 && !has_marker {
            score -= (nutrition_hits as f32 * 0.15).min(0.4);
        }

        if !has_marker && METADATA_TERMS.iter().any(|t| context.contains(t)) {
            score -= 0.3;
        }

        if let Some(pos) = context.find(&keyword) {
            // Number+unit immediately adjacent to the keyword reads as a
            // nutrition figure, not an ingredient
            let before_start = floor_char_boundary(&context, pos.saturating_sub(3));
            let after_end = ceil_char_boundary(&context, (pos + keyword.len() + 3).min(context.len()));
            let before = &context[before_start..pos];
            let after = &context[pos + keyword.len()..after_end];
            if self.unit_re.is_match(before) || self.unit_re.is_match(after) {
                score -= 0.3;
            }

            // Keyword followed by a colon is a heading, not an ingredient
            let rest = context[pos + keyword.len()..].trim_start();
            if rest.starts_with(':') {
                score -= 0.4;
            }
        }

        if context.contains(',') || context.contains('(') || context.contains(')') {
            score += 0.2;
        }

        score.clamp(0.0, 1.0)
    }

    /// Scan the cleaned text for context-accepted keyword mentions per class
    ///
    /// Word-boundary matches are scored in context, negated mentions are
    /// skipped, and only mentions at or above the mention threshold survive.
    /// This is the corroboration index for recognizer output.
    pub fn scan_mentions(&self, text: &str) -> BTreeMap<AllergenClass, Vec<Mention>> {
        let mut found: BTreeMap<AllergenClass, Vec<Mention>> = BTreeMap::new();
        if text.trim().is_empty() {
            return found;
        }

        let lower = text.to_lowercase();
        for (class, pattern) in &self.class_patterns {
            let mut mentions: Vec<Mention> = Vec::new();
            for m in pattern.find_iter(&lower) {
                if self.is_negated(&lower, m.start()) {
                    continue;
                }

                let score = self.score(&lower, m.start(), m.as_str());
                if score < self.mention_threshold {
                    continue;
                }

                let ctx_start = floor_char_boundary(&lower, m.start().saturating_sub(30));
                let ctx_end = ceil_char_boundary(&lower, (m.end() + 30).min(lower.len()));
                let context = lower[ctx_start..ctx_end].trim().to_string();
                if mentions.iter().any(|existing| existing.context == context) {
                    continue;
                }

                mentions.push(Mention {
                    offset: m.start(),
                    keyword: m.as_str().to_string(),
                    context,
                    score,
                });
            }
            if !mentions.is_empty() {
                found.insert(*class, mentions);
            }
        }
        found
    }

    /// True if a negation cue immediately precedes the match
    fn is_negated(&self, text: &str, match_start: usize) -> bool {
        let start = floor_char_boundary(text, match_start.saturating_sub(50));
        self.negation_cue_re.is_match(&text[start..match_start])
    }
}
