//! AllerScan detection engine
//!
//! Extracts structured allergen declarations from noisy, OCR-derived food
//! label text. The pipeline normalizes and fuzzy-corrects the text, splits
//! it into ingredient and precautionary zones, classifies each allergen
//! class with strict word-boundary and false-positive discipline, and merges
//! the result with external entity-recognizer output under a corroboration
//! guard.
//!
//! The engine is synchronous, side-effect-free per call, and safe to share
//! across threads: all vocabularies and patterns are read-only after
//! construction. Image capture, OCR, model inference, persistence, and the
//! API surface are external collaborators.

pub mod services;
pub mod types;
pub mod vocabulary;

mod textutil;

pub use allerscan_common::{EngineConfig, Error, Result};
pub use types::{
    AllergenClass, Category, DetectionReport, Finding, MergeDiagnostics, RecognizerHit,
    ReportSummary, TextSpan, DICTIONARY_SOURCE,
};
pub use vocabulary::{ClassVocabulary, Vocabulary};

use services::{
    AllergenClassifier, ClassifierError, EvidenceMerger, MergerError, NormalizerError,
    TextNormalizer,
};
use thiserror::Error as ThisError;
use tracing::debug;

/// Detector construction errors
#[derive(Debug, ThisError)]
pub enum DetectorError {
    /// Normalizer construction failed
    #[error(transparent)]
    Normalizer(#[from] NormalizerError),

    /// Classifier construction failed
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    /// Merger construction failed
    #[error(transparent)]
    Merger(#[from] MergerError),

    /// Configuration or vocabulary rejected at load time
    #[error(transparent)]
    Config(#[from] allerscan_common::Error),
}

/// Allergen Detector
///
/// Owns the configured pipeline services and exposes the core surface:
/// [`normalize`](Self::normalize), [`classify`](Self::classify), and
/// [`merge`](Self::merge). Construction validates configuration and
/// vocabulary and compiles every pattern, so a built detector never fails
/// at request time.
pub struct AllergenDetector {
    normalizer: TextNormalizer,
    classifier: AllergenClassifier,
    merger: EvidenceMerger,
    vocabulary: Vocabulary,
}

impl AllergenDetector {
    /// Detector with the built-in vocabulary and default thresholds
    pub fn new() -> std::result::Result<Self, DetectorError> {
        Self::with_config(EngineConfig::default(), Vocabulary::builtin())
    }

    /// Detector with explicit configuration and vocabulary
    ///
    /// Fails fast on invalid thresholds or an incomplete vocabulary; a
    /// class silently missing its keywords would be a safety regression.
    pub fn with_config(
        config: EngineConfig,
        vocabulary: Vocabulary,
    ) -> std::result::Result<Self, DetectorError> {
        config.validate()?;
        vocabulary.validate()?;

        Ok(Self {
            normalizer: TextNormalizer::new(&config)?,
            classifier: AllergenClassifier::new(&config, &vocabulary)?,
            merger: EvidenceMerger::new(&config, &vocabulary)?,
            vocabulary,
        })
    }

    /// Normalize raw OCR text into canonical cleaned form
    pub fn normalize(&self, raw: &str) -> String {
        self.normalizer.normalize(raw)
    }

    /// Run the rule engine over raw text: normalize, split, classify
    ///
    /// The returned report covers every allergen class exactly once.
    pub fn classify(&self, raw: &str) -> DetectionReport {
        let cleaned = self.normalizer.normalize(raw);
        self.classifier.classify(&cleaned)
    }

    /// Merge a rule report with recognizer hits over the same cleaned text
    pub fn merge(
        &self,
        rule_report: &DetectionReport,
        hits: &[RecognizerHit],
        cleaned_text: &str,
    ) -> DetectionReport {
        self.merger.merge(rule_report, hits, cleaned_text)
    }

    /// Merge variant reporting dropped recognizer hits
    pub fn merge_with_diagnostics(
        &self,
        rule_report: &DetectionReport,
        hits: &[RecognizerHit],
        cleaned_text: &str,
    ) -> (DetectionReport, MergeDiagnostics) {
        self.merger
            .merge_with_diagnostics(rule_report, hits, cleaned_text)
    }

    /// Full pipeline: normalize, classify, and merge recognizer hits
    pub fn detect(&self, raw: &str, hits: &[RecognizerHit]) -> DetectionReport {
        let cleaned = self.normalizer.normalize(raw);
        let rule_report = self.classifier.classify(&cleaned);
        let report = self.merger.merge(&rule_report, hits, &cleaned);
        debug!(
            total_detected = report.summary().total_detected,
            "Detection complete"
        );
        report
    }

    /// The vocabulary this detector was built with
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}
