//! Allergen Classifier Service
//!
//! Strict, explainable allergen classification separating CONTAINS from
//! MAY_CONTAIN with evidence tracking. Exact word-boundary keyword matching,
//! class exclusion rules, compound-word and negation suppression, and a
//! strict confidence acceptance threshold keep precision high on noisy text.
//!
//! Every pattern compiles once at construction. The effective keyword set is
//! recomputed per call as a pure function of the section text, so shared
//! configuration is never mutated and calls are request-independent.

use crate::services::section_splitter::{SectionSplitter, SplitterError};
use crate::textutil::{ceil_char_boundary, window};
use crate::types::{AllergenClass, Category, DetectionReport, Finding};
use crate::vocabulary::Vocabulary;
use allerscan_common::EngineConfig;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Classifier errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Pattern compilation failed
    #[error("Pattern compilation failed: {0}")]
    Pattern(#[from] regex::Error),

    /// Section splitter construction failed
    #[error(transparent)]
    Splitter(#[from] SplitterError),
}

/// Storage/shelf-life/instruction vocabulary. A section matching these is
/// not an ingredient declaration unless it also carries ingredient language.
const INSTRUCTION_KEYWORDS: &[&str] = &[
    "storage",
    "instructions",
    "keep away from",
    "avoid contact",
    "separate from",
    "do not store",
    "store in",
    "store at",
    "best before",
    "best by",
    "use by",
    "expiry",
    "expires",
    "batch",
    "lot",
    "manufactured",
    "packed on",
    "production date",
    "cool place",
    "dry place",
    "room temperature",
    "refrigerate",
    "freeze",
    "once opened",
    "after opening",
    "keep refrigerated",
    "keep frozen",
    "consume within",
    "shelf life",
];

/// Explicit ingredient language overriding the instruction-section guard
const INGREDIENT_LANGUAGE: &[&str] = &["ingredient", "contain", "made with", "include"];

/// Non-ingredient phrasing near a match marks it as storage/dating noise
const NON_INGREDIENT_PHRASES: &[&str] = &[
    "store in",
    "store at",
    "storage",
    "cool place",
    "dry place",
    "best before",
    "best by",
    "use by",
    "expiry",
    "expires",
    "batch",
    "lot",
    "manufactured",
    "packed on",
    "production",
    "room temperature",
    "refrigerate",
    "freeze",
    "keep refrigerated",
    "keep frozen",
    "once opened",
    "after opening",
    "consume within",
];

/// Known compound-word false positives per matched term.
///
/// The presence of any listed phrase in the local context rejects the match:
/// nut shells are not shellfish, plant milks and nut butters are not dairy,
/// and "cod" next to storage words is an OCR misread of "cool". New collision
/// pairs belong here, not in code.
const COMPOUND_FALSE_POSITIVES: &[(&str, &[&str])] = &[
    (
        "shellfish",
        &[
            "oyster shell",
            "clam shell",
            "scallop shell",
            "eggshell",
            "seashell",
            "nutshell",
            "bombshell",
            "pistachio shell",
            "walnut shell",
            "almond shell",
            "hazelnut shell",
            "peanut shell",
            "without shell",
            "with shell",
        ],
    ),
    (
        "milk",
        &[
            "almond milk",
            "soy milk",
            "coconut milk",
            "oat milk",
            "rice milk",
        ],
    ),
    (
        "butter",
        &[
            "nut butter",
            "peanut butter",
            "almond butter",
            "cashew butter",
            "cocoa butter",
            "shea butter",
            "mango butter",
        ],
    ),
    (
        "cod",
        &["cool place", "dry place", "store in", "store at", "keep in"],
    ),
];

/// Negation/substitute words that, appearing shortly after a match, mark it
/// as an allergen-free or substitute claim
const CLOSE_NEGATIONS: &[&str] = &["free", "substitute", "alternative"];

/// Qualifiers that halve confidence
const AMBIGUOUS_WORDS: &[&str] = &["maybe", "possibly", "unclear", "uncertain"];

/// Declaration phrasing that boosts confidence
const EXPLICIT_PHRASES: &[&str] = &["contains", "ingredients:", "made with", "includes"];

/// Window radius for false-positive context checks
const FALSE_POSITIVE_WINDOW: usize = 50;

/// Look-ahead distance for close negation words
const CLOSE_NEGATION_WINDOW: usize = 40;

/// One vocabulary term with its compiled match and negation patterns
struct TermPattern {
    term: String,
    word_re: Regex,
    negation_re: Regex,
}

impl TermPattern {
    fn compile(term: &str) -> Result<Self, regex::Error> {
        let escaped = regex::escape(term);
        Ok(Self {
            term: term.to_string(),
            word_re: Regex::new(&format!(r"\b{}\b", escaped))?,
            negation_re: Regex::new(&format!(
                r"\bno\s+{k}|\bfree\s+from\s+{k}|\b{k}\s+free\b|\bwithout\s+{k}|\bdoes\s+not\s+contain\s+{k}|\bnon[\s-]{k}",
                k = escaped
            ))?,
        })
    }
}

/// Compiled patterns for one allergen class
struct ClassPatterns {
    class: AllergenClass,
    keywords: Vec<TermPattern>,
    products: Vec<TermPattern>,
    exclusions: Vec<TermPattern>,
}

/// Allergen Classifier
pub struct AllergenClassifier {
    patterns: Vec<ClassPatterns>,
    splitter: SectionSplitter,
    bare_fish: TermPattern,
    shellfish_re: Regex,
    punct_re: Regex,
    whitespace_re: Regex,
    accept_threshold: f32,
    evidence_window: usize,
}

impl AllergenClassifier {
    /// Build the classifier, compiling every vocabulary pattern once
    pub fn new(config: &EngineConfig, vocabulary: &Vocabulary) -> Result<Self, ClassifierError> {
        let mut patterns = Vec::new();
        for (class, entry) in vocabulary.iter() {
            let compile_all = |terms: &[String]| -> Result<Vec<TermPattern>, regex::Error> {
                terms.iter().map(|t| TermPattern::compile(t)).collect()
            };
            patterns.push(ClassPatterns {
                class,
                keywords: compile_all(&entry.keywords)?,
                products: compile_all(&entry.products)?,
                exclusions: compile_all(&entry.exclusions)?,
            });
        }

        Ok(Self {
            patterns,
            splitter: SectionSplitter::new()?,
            bare_fish: TermPattern::compile("fish")?,
            shellfish_re: Regex::new(r"\bshellfish\b")?,
            punct_re: Regex::new(r"[,;:]+")?,
            whitespace_re: Regex::new(r"\s+")?,
            accept_threshold: config.acceptance_threshold,
            evidence_window: config.evidence_window,
        })
    }

    /// Classify cleaned text into a complete detection report
    ///
    /// Splits into ingredient and may-contain sections, classifies each, and
    /// resolves the buckets disjointly (CONTAINS wins a collision). Every
    /// allergen class appears exactly once across the three buckets.
    pub fn classify(&self, text: &str) -> DetectionReport {
        if text.trim().len() < 3 {
            return DetectionReport::empty();
        }

        let sections = self.splitter.split(text);
        let contains = self.classify_section(sections.ingredients, Category::Contains);
        let may_contain = self.classify_section(sections.may_contain, Category::MayContain);

        let report = DetectionReport::from_findings(contains, may_contain);
        debug!(
            contains = report.contains.len(),
            may_contain = report.may_contain.len(),
            "Rule classification complete"
        );
        report
    }

    /// Classify one section, emitting at most one finding per class
    ///
    /// `category` selects the base confidence and whether the
    /// instruction-section guard applies.
    pub fn classify_section(&self, section: &str, category: Category) -> Vec<Finding> {
        if section.trim().is_empty() {
            return Vec::new();
        }

        let section_lower = section.to_lowercase();
        let scan_text = self.scan_text(&section_lower);

        // Storage text is not an ingredient declaration
        if category == Category::Contains
            && is_instruction_section(&scan_text)
            && !has_ingredient_language(&scan_text)
        {
            debug!("Skipping CONTAINS detection in instruction-only section");
            return Vec::new();
        }

        let mut findings = Vec::new();
        for class_patterns in &self.patterns {
            if let Some(finding) =
                self.scan_class(class_patterns, &section_lower, &scan_text, category)
            {
                findings.push(finding);
            }
        }
        findings
    }

    /// Scan one class over the section, stopping at the first accepted term
    fn scan_class(
        &self,
        class_patterns: &ClassPatterns,
        section_lower: &str,
        scan_text: &str,
        category: Category,
    ) -> Option<Finding> {
        // Exclusion pre-check: an exclusion term present in the section
        // suppresses the colliding (substring) keywords of this class, while
        // narrower product phrases keep matching.
        let active_exclusions: Vec<&str> = class_patterns
            .exclusions
            .iter()
            .filter(|e| e.word_re.is_match(scan_text))
            .map(|e| e.term.as_str())
            .collect();

        let keyword_allowed = |term: &str| {
            !active_exclusions
                .iter()
                .any(|e| e.contains(term) && *e != term)
        };

        // Standalone "fish" participates only when it appears without
        // "shellfish"; computed per call, never written to the vocabulary.
        let fish_eligible = class_patterns.class == AllergenClass::Fish
            && self.bare_fish.word_re.is_match(scan_text)
            && !self.shellfish_re.is_match(scan_text);

        let candidates = class_patterns
            .keywords
            .iter()
            .filter(|kp| keyword_allowed(&kp.term))
            .chain(fish_eligible.then_some(&self.bare_fish))
            .chain(class_patterns.products.iter());

        for term_pattern in candidates {
            let Some(m) = term_pattern.word_re.find(scan_text) else {
                continue;
            };

            if self.is_false_positive(&term_pattern.term, scan_text, m.start(), m.end()) {
                continue;
            }

            let evidence = self.extract_evidence(term_pattern, section_lower);
            let confidence = self.calculate_confidence(term_pattern, &evidence, category);
            if confidence >= self.accept_threshold {
                debug!(
                    class = %class_patterns.class,
                    keyword = %term_pattern.term,
                    confidence,
                    "Accepted finding"
                );
                return Some(Finding::dictionary(
                    class_patterns.class,
                    category,
                    evidence,
                    confidence,
                    term_pattern.term.clone(),
                ));
            }
        }
        None
    }

    /// Punctuation-collapsed copy of the section used for matching
    fn scan_text(&self, section_lower: &str) -> String {
        let replaced = self.punct_re.replace_all(section_lower, " ");
        self.whitespace_re
            .replace_all(&replaced, " ")
            .trim()
            .to_string()
    }

    /// Evidence window around the match in the original section text
    ///
    /// The match is re-located in the unnormalized section so the snippet
    /// keeps its punctuation; a term visible only after punctuation collapse
    /// yields empty evidence.
    fn extract_evidence(&self, term_pattern: &TermPattern, section_lower: &str) -> String {
        match term_pattern.word_re.find(section_lower) {
            Some(m) => window(section_lower, m.start(), m.end(), self.evidence_window)
                .trim()
                .to_string(),
            None => String::new(),
        }
    }

    /// Reject matches that word-boundary discipline alone cannot catch
    fn is_false_positive(&self, term: &str, scan_text: &str, start: usize, end: usize) -> bool {
        let context = window(scan_text, start, end, FALSE_POSITIVE_WINDOW);

        // Storage/dating context around the match
        if NON_INGREDIENT_PHRASES.iter().any(|p| context.contains(p)) {
            return true;
        }

        // Compound-word collisions
        if let Some((_, compounds)) = COMPOUND_FALSE_POSITIVES.iter().find(|(k, _)| *k == term) {
            if compounds.iter().any(|c| context.contains(c)) {
                return true;
            }
        }

        // A milk substitute is not a milk allergen
        if (term == "milk" || term == "dairy") && context.contains("substitute") {
            return true;
        }

        // Almond is always a valid tree nut mention, even next to "milk"
        if term == "almond" {
            return false;
        }

        // Negation/substitute wording shortly after the match
        let rest = &scan_text[ceil_char_boundary(scan_text, end)..];
        let cut = ceil_char_boundary(rest, CLOSE_NEGATION_WINDOW.min(rest.len()));
        let trailing = &rest[..cut];
        if CLOSE_NEGATIONS.iter().any(|n| trailing.contains(n)) {
            return true;
        }

        false
    }

    /// Confidence for an accepted match
    ///
    /// Base 1.0 for CONTAINS, 0.9 for MAY_CONTAIN; negated evidence collapses
    /// to 0.1; ambiguity qualifiers halve; explicit declaration phrasing
    /// boosts by 1.1x capped at 1.0. Rounded to two decimals.
    fn calculate_confidence(
        &self,
        term_pattern: &TermPattern,
        evidence: &str,
        category: Category,
    ) -> f32 {
        if term_pattern.negation_re.is_match(evidence) {
            return 0.1;
        }

        let mut confidence: f32 = match category {
            Category::Contains => 1.0,
            Category::MayContain => 0.9,
            Category::NotDetected => 0.0,
        };

        for word in AMBIGUOUS_WORDS {
            if evidence.contains(word) {
                confidence *= 0.5;
            }
        }

        for phrase in EXPLICIT_PHRASES {
            if evidence.contains(phrase) {
                confidence = (confidence * 1.1).min(1.0);
            }
        }

        (confidence * 100.0).round() / 100.0
    }
}

fn is_instruction_section(scan_text: &str) -> bool {
    INSTRUCTION_KEYWORDS.iter().any(|k| scan_text.contains(k))
}

fn has_ingredient_language(scan_text: &str) -> bool {
    INGREDIENT_LANGUAGE.iter().any(|l| scan_text.contains(l))
}
