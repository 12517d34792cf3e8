//! Core types for the allergen detection engine
//!
//! Shared data model flowing between the detection services: allergen
//! classes, confidence-scored findings, and the complete per-request report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Source label for findings produced by the rule engine's keyword scan
pub const DICTIONARY_SOURCE: &str = "dictionary";

/// Type errors (unrecognized class labels in external input)
#[derive(Debug, Error)]
pub enum TypeError {
    /// Unknown allergen class label
    #[error("Unknown allergen class: {0}")]
    UnknownClass(String),
}

/// Regulated allergen classes
///
/// Fixed set, immutable at runtime. Extending coverage means adding a
/// vocabulary entry for an existing class, not adding variants here.
/// Declaration order is the vocabulary scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllergenClass {
    Peanut,
    TreeNut,
    Milk,
    Egg,
    Gluten,
    Soy,
    Fish,
    Shellfish,
    Sesame,
    Mustard,
    Celery,
    Sulphites,
    Lupin,
}

impl AllergenClass {
    /// All classes, in vocabulary scan order
    pub const ALL: [AllergenClass; 13] = [
        AllergenClass::Peanut,
        AllergenClass::TreeNut,
        AllergenClass::Milk,
        AllergenClass::Egg,
        AllergenClass::Gluten,
        AllergenClass::Soy,
        AllergenClass::Fish,
        AllergenClass::Shellfish,
        AllergenClass::Sesame,
        AllergenClass::Mustard,
        AllergenClass::Celery,
        AllergenClass::Sulphites,
        AllergenClass::Lupin,
    ];

    /// Canonical upper-snake label used in reports and vocabulary files
    pub fn as_str(&self) -> &'static str {
        match self {
            AllergenClass::Peanut => "PEANUT",
            AllergenClass::TreeNut => "TREE_NUT",
            AllergenClass::Milk => "MILK",
            AllergenClass::Egg => "EGG",
            AllergenClass::Gluten => "GLUTEN",
            AllergenClass::Soy => "SOY",
            AllergenClass::Fish => "FISH",
            AllergenClass::Shellfish => "SHELLFISH",
            AllergenClass::Sesame => "SESAME",
            AllergenClass::Mustard => "MUSTARD",
            AllergenClass::Celery => "CELERY",
            AllergenClass::Sulphites => "SULPHITES",
            AllergenClass::Lupin => "LUPIN",
        }
    }
}

impl fmt::Display for AllergenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllergenClass {
    type Err = TypeError;

    /// Parse a class label, accepting either case convention
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PEANUT" => Ok(AllergenClass::Peanut),
            "TREE_NUT" => Ok(AllergenClass::TreeNut),
            "MILK" => Ok(AllergenClass::Milk),
            "EGG" => Ok(AllergenClass::Egg),
            "GLUTEN" => Ok(AllergenClass::Gluten),
            "SOY" => Ok(AllergenClass::Soy),
            "FISH" => Ok(AllergenClass::Fish),
            "SHELLFISH" => Ok(AllergenClass::Shellfish),
            "SESAME" => Ok(AllergenClass::Sesame),
            "MUSTARD" => Ok(AllergenClass::Mustard),
            "CELERY" => Ok(AllergenClass::Celery),
            "SULPHITES" | "SULFITES" => Ok(AllergenClass::Sulphites),
            "LUPIN" => Ok(AllergenClass::Lupin),
            _ => Err(TypeError::UnknownClass(s.to_string())),
        }
    }
}

/// Finding classification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Allergen explicitly declared as a present ingredient
    Contains,
    /// Precautionary / cross-contamination warning
    MayContain,
    /// No accepted evidence for this class
    NotDetected,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Contains => "CONTAINS",
            Category::MayContain => "MAY_CONTAIN",
            Category::NotDetected => "NOT_DETECTED",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A span of evidence in the cleaned text
///
/// Half-open byte offsets into the cleaned text produced by the normalizer.
/// Recognizer adapters emit these; the mention scanner produces them
/// transiently during corroboration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
    /// Allergen class this span supports
    pub class: AllergenClass,
    /// The literal substring at the span
    pub raw: String,
}

impl TextSpan {
    pub fn new(start: usize, end: usize, class: AllergenClass, raw: impl Into<String>) -> Self {
        Self {
            start,
            end,
            class,
            raw: raw.into(),
        }
    }
}

/// One entity-recognizer output triple over the cleaned text
///
/// Produced by external sequence-labeling models. The engine never creates
/// these itself; it only corroborates and merges them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerHit {
    /// The labeled span
    pub span: TextSpan,
    /// Model confidence (clamped to 0.0-1.0 during merge)
    pub confidence: f32,
    /// Recognizer name for provenance tracking
    pub source: String,
}

impl RecognizerHit {
    pub fn new(span: TextSpan, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            span,
            confidence,
            source: source.into(),
        }
    }
}

/// A confidence-scored allergen finding with auditable evidence
///
/// Created by the classifier, mutated only by the merger (source
/// accumulation and confidence max), immutable after merge completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Detected allergen class
    pub allergen: AllergenClass,
    /// Classification category
    pub category: Category,
    /// Deduplicated evidence snippets justifying the finding
    pub evidence: Vec<String>,
    /// Confidence score (0.0-1.0)
    pub confidence: f32,
    /// The keyword that triggered detection
    pub matched_keyword: String,
    /// Every source that contributed evidence
    pub sources: BTreeSet<String>,
}

impl Finding {
    /// Create a rule-engine finding with a single evidence snippet
    pub fn dictionary(
        allergen: AllergenClass,
        category: Category,
        evidence: impl Into<String>,
        confidence: f32,
        matched_keyword: impl Into<String>,
    ) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(DICTIONARY_SOURCE.to_string());
        Self {
            allergen,
            category,
            evidence: vec![evidence.into()],
            confidence,
            matched_keyword: matched_keyword.into(),
            sources,
        }
    }

    /// Append an evidence snippet unless an identical one is present
    pub fn push_evidence(&mut self, snippet: impl Into<String>) {
        let snippet = snippet.into();
        if !snippet.is_empty() && !self.evidence.contains(&snippet) {
            self.evidence.push(snippet);
        }
    }
}

/// Report counts, kept for downstream consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub contains_count: usize,
    pub may_contain_count: usize,
    pub total_detected: usize,
}

/// Complete detection result over the full allergen class set
///
/// Invariant: `contains`, `may_contain`, and `not_detected` are pairwise
/// disjoint by allergen and jointly cover every `AllergenClass` variant.
/// Constructed per request, immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Allergens explicitly declared as ingredients
    pub contains: Vec<Finding>,
    /// Precautionary trace warnings
    pub may_contain: Vec<Finding>,
    /// Classes with no accepted evidence
    pub not_detected: Vec<AllergenClass>,
}

impl DetectionReport {
    /// Report with every class marked not-detected
    pub fn empty() -> Self {
        Self {
            contains: Vec::new(),
            may_contain: Vec::new(),
            not_detected: AllergenClass::ALL.to_vec(),
        }
    }

    /// Build a report from detected findings, completing `not_detected`
    /// over the full class set
    ///
    /// A class present in both input lists resolves to CONTAINS.
    pub fn from_findings(contains: Vec<Finding>, may_contain: Vec<Finding>) -> Self {
        let contains_classes: BTreeSet<AllergenClass> =
            contains.iter().map(|f| f.allergen).collect();

        // CONTAINS wins when a class appears in both buckets
        let may_contain: Vec<Finding> = may_contain
            .into_iter()
            .filter(|f| !contains_classes.contains(&f.allergen))
            .collect();

        let detected: BTreeSet<AllergenClass> = contains
            .iter()
            .chain(may_contain.iter())
            .map(|f| f.allergen)
            .collect();

        let not_detected = AllergenClass::ALL
            .iter()
            .copied()
            .filter(|class| !detected.contains(class))
            .collect();

        Self {
            contains,
            may_contain,
            not_detected,
        }
    }

    /// Look up the finding for a class, if it was detected
    pub fn finding_for(&self, class: AllergenClass) -> Option<&Finding> {
        self.contains
            .iter()
            .chain(self.may_contain.iter())
            .find(|f| f.allergen == class)
    }

    /// True if the class has no accepted evidence
    pub fn is_not_detected(&self, class: AllergenClass) -> bool {
        self.not_detected.contains(&class)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            contains_count: self.contains.len(),
            may_contain_count: self.may_contain.len(),
            total_detected: self.contains.len() + self.may_contain.len(),
        }
    }
}

/// Non-error merge outcomes worth surfacing to diagnostics
///
/// Recognizer hits dropped for lack of corroboration are not errors; they
/// are the precision guard working as intended.
#[derive(Debug, Clone, Default)]
pub struct MergeDiagnostics {
    /// Recognizer-only hits discarded because the class had keyword
    /// vocabulary but no literal mention in the cleaned text
    pub dropped_uncorroborated: Vec<(AllergenClass, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_labels_round_trip() {
        for class in AllergenClass::ALL {
            let parsed: AllergenClass = class.as_str().parse().unwrap();
            assert_eq!(parsed, class);
        }
    }

    #[test]
    fn class_parse_accepts_lowercase() {
        assert_eq!(
            "tree_nut".parse::<AllergenClass>().unwrap(),
            AllergenClass::TreeNut
        );
        assert_eq!(
            "sulfites".parse::<AllergenClass>().unwrap(),
            AllergenClass::Sulphites
        );
        assert!("GRAPEFRUIT".parse::<AllergenClass>().is_err());
    }

    #[test]
    fn empty_report_covers_all_classes() {
        let report = DetectionReport::empty();
        assert_eq!(report.not_detected.len(), AllergenClass::ALL.len());
        assert!(report.contains.is_empty());
        assert!(report.may_contain.is_empty());
    }

    #[test]
    fn from_findings_prefers_contains_on_collision() {
        let contains = vec![Finding::dictionary(
            AllergenClass::Milk,
            Category::Contains,
            "ingredients: milk",
            1.0,
            "milk",
        )];
        let may_contain = vec![Finding::dictionary(
            AllergenClass::Milk,
            Category::MayContain,
            "may contain milk",
            0.9,
            "milk",
        )];

        let report = DetectionReport::from_findings(contains, may_contain);
        assert_eq!(report.contains.len(), 1);
        assert!(report.may_contain.is_empty());
        assert!(!report.is_not_detected(AllergenClass::Milk));
    }

    #[test]
    fn from_findings_completes_not_detected() {
        let contains = vec![Finding::dictionary(
            AllergenClass::Peanut,
            Category::Contains,
            "peanuts",
            1.0,
            "peanuts",
        )];
        let report = DetectionReport::from_findings(contains, Vec::new());

        assert_eq!(report.not_detected.len(), AllergenClass::ALL.len() - 1);
        assert!(!report.is_not_detected(AllergenClass::Peanut));
        assert!(report.is_not_detected(AllergenClass::Sesame));
        assert_eq!(report.summary().total_detected, 1);
    }

    #[test]
    fn push_evidence_deduplicates() {
        let mut finding = Finding::dictionary(
            AllergenClass::Egg,
            Category::Contains,
            "contains egg",
            1.0,
            "egg",
        );
        finding.push_evidence("contains egg");
        finding.push_evidence("egg white");
        finding.push_evidence("");
        assert_eq!(finding.evidence.len(), 2);
    }
}
