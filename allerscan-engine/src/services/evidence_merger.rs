//! Evidence Merger Service
//!
//! Unions rule-engine findings with entity-recognizer output into a single
//! deduplicated report. Per class the merged finding keeps the maximum
//! confidence across sources, the union of distinct evidence snippets, and
//! every contributing origin.
//!
//! Recognizer-only hits are trusted only when corroborated by a literal
//! keyword mention in the cleaned text (or when the class has no vocabulary
//! to check against). This is the main defense against an upstream model
//! hallucinating allergen labels on noise. Rule-engine findings are
//! self-evidencing and never dropped.

use crate::services::context_scorer::{ContextScorer, ScorerError};
use crate::services::section_splitter::{SectionSplitter, SplitterError};
use crate::types::{
    AllergenClass, Category, DetectionReport, Finding, MergeDiagnostics, RecognizerHit,
};
use crate::vocabulary::Vocabulary;
use allerscan_common::EngineConfig;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Merger errors
#[derive(Debug, Error)]
pub enum MergerError {
    /// Context scorer construction failed
    #[error(transparent)]
    Scorer(#[from] ScorerError),

    /// Section splitter construction failed
    #[error(transparent)]
    Splitter(#[from] SplitterError),
}

/// Evidence Merger
pub struct EvidenceMerger {
    scorer: ContextScorer,
    splitter: SectionSplitter,
    vocabulary: Vocabulary,
}

impl EvidenceMerger {
    pub fn new(config: &EngineConfig, vocabulary: &Vocabulary) -> Result<Self, MergerError> {
        Ok(Self {
            scorer: ContextScorer::new(config, vocabulary)?,
            splitter: SectionSplitter::new()?,
            vocabulary: vocabulary.clone(),
        })
    }

    /// Merge rule findings with recognizer hits over the same cleaned text
    pub fn merge(
        &self,
        rule_report: &DetectionReport,
        hits: &[RecognizerHit],
        cleaned_text: &str,
    ) -> DetectionReport {
        self.merge_with_diagnostics(rule_report, hits, cleaned_text).0
    }

    /// Merge, also reporting hits dropped by the corroboration guard
    pub fn merge_with_diagnostics(
        &self,
        rule_report: &DetectionReport,
        hits: &[RecognizerHit],
        cleaned_text: &str,
    ) -> (DetectionReport, MergeDiagnostics) {
        let mut merged: BTreeMap<AllergenClass, Finding> = rule_report
            .contains
            .iter()
            .chain(rule_report.may_contain.iter())
            .map(|f| (f.allergen, f.clone()))
            .collect();

        let mut diagnostics = MergeDiagnostics::default();

        if !hits.is_empty() {
            // Corroboration index and section boundary, computed once per call
            let mentions = self.scorer.scan_mentions(cleaned_text);
            let may_contain_offset = self.splitter.split(cleaned_text).may_contain_offset;

            for hit in hits {
                let class = hit.span.class;
                let confidence = hit.confidence.clamp(0.0, 1.0);

                if let Some(finding) = merged.get_mut(&class) {
                    // Max confidence, evidence union, source accumulation
                    finding.confidence = finding.confidence.max(confidence);
                    finding.push_evidence(hit.span.raw.clone());
                    finding.sources.insert(hit.source.clone());
                    continue;
                }

                let class_mentions = mentions.get(&class);
                let trusted = class_mentions.is_some() || self.vocabulary.is_empty_for(class);
                if !trusted {
                    debug!(
                        class = %class,
                        source = %hit.source,
                        "Dropped uncorroborated recognizer hit"
                    );
                    diagnostics
                        .dropped_uncorroborated
                        .push((class, hit.source.clone()));
                    continue;
                }

                // Bucket by which side of the may-contain boundary the hit
                // falls on; no boundary means ingredient territory
                let category = match may_contain_offset {
                    Some(offset) if hit.span.start >= offset => Category::MayContain,
                    _ => Category::Contains,
                };

                let matched_keyword = class_mentions
                    .and_then(|m| m.first())
                    .map(|m| m.keyword.clone())
                    .unwrap_or_else(|| hit.span.raw.clone());

                let mut finding = Finding {
                    allergen: class,
                    category,
                    evidence: vec![hit.span.raw.clone()],
                    confidence,
                    matched_keyword,
                    sources: std::iter::once(hit.source.clone()).collect(),
                };
                if let Some(mention) = class_mentions.and_then(|m| m.first()) {
                    finding.push_evidence(mention.context.clone());
                }
                merged.insert(class, finding);
            }
        }

        let (contains, may_contain): (Vec<Finding>, Vec<Finding>) = merged
            .into_values()
            .partition(|f| f.category == Category::Contains);

        let report = DetectionReport::from_findings(contains, may_contain);
        debug!(
            contains = report.contains.len(),
            may_contain = report.may_contain.len(),
            dropped = diagnostics.dropped_uncorroborated.len(),
            "Evidence merge complete"
        );
        (report, diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::classifier::AllergenClassifier;
    use crate::types::TextSpan;

    fn merger() -> EvidenceMerger {
        EvidenceMerger::new(&EngineConfig::default(), &Vocabulary::builtin()).unwrap()
    }

    fn rule_report(text: &str) -> DetectionReport {
        AllergenClassifier::new(&EngineConfig::default(), &Vocabulary::builtin())
            .unwrap()
            .classify(text)
    }

    fn hit(text: &str, needle: &str, class: AllergenClass, confidence: f32) -> RecognizerHit {
        let start = text.find(needle).unwrap_or(0);
        RecognizerHit::new(
            TextSpan::new(start, start + needle.len(), class, needle),
            confidence,
            "ner",
        )
    }

    #[test]
    fn merge_without_hits_is_the_rule_report() {
        let m = merger();
        let text = "ingredients: milk, salt";
        let report = m.merge(&rule_report(text), &[], text);
        assert!(report.finding_for(AllergenClass::Milk).is_some());
        assert_eq!(report.summary().total_detected, 1);
    }

    #[test]
    fn corroborated_hit_merges_with_max_confidence() {
        let m = merger();
        let text = "ingredients: tahini, salt";
        let rule = rule_report(text);
        let rule_conf = rule
            .finding_for(AllergenClass::Sesame)
            .unwrap()
            .confidence;

        let hits = vec![hit(text, "tahini", AllergenClass::Sesame, 0.55)];
        let report = m.merge(&rule, &hits, text);

        let sesame = report.finding_for(AllergenClass::Sesame).unwrap();
        assert_eq!(sesame.confidence, rule_conf.max(0.55));
        assert!(sesame.sources.contains("dictionary"));
        assert!(sesame.sources.contains("ner"));
    }

    #[test]
    fn uncorroborated_hit_is_dropped() {
        let m = merger();
        let text = "ingredients: sugar, salt, water";
        let rule = rule_report(text);

        let hits = vec![hit(text, "sugar", AllergenClass::Sesame, 0.95)];
        let (report, diagnostics) = m.merge_with_diagnostics(&rule, &hits, text);

        assert!(report.is_not_detected(AllergenClass::Sesame));
        assert_eq!(
            diagnostics.dropped_uncorroborated,
            vec![(AllergenClass::Sesame, "ner".to_string())]
        );
    }

    #[test]
    fn recognizer_only_hit_retained_when_keyword_present() {
        let m = merger();
        // "tahini" is literal in text, but weak context keeps the rule
        // engine finding plausible-but-absent in this synthetic report
        let text = "ingredients: tahini, salt";
        let rule = DetectionReport::empty();

        let hits = vec![hit(text, "tahini", AllergenClass::Sesame, 0.8)];
        let report = m.merge(&rule, &hits, text);

        let sesame = report.finding_for(AllergenClass::Sesame).unwrap();
        assert_eq!(sesame.category, Category::Contains);
        assert_eq!(sesame.confidence, 0.8);
        assert_eq!(sesame.matched_keyword, "tahini");
    }

    #[test]
    fn recognizer_only_hit_in_trace_zone_is_may_contain() {
        let m = merger();
        let text = "ingredients: sugar. may contain sesame seeds.";
        let rule = DetectionReport::empty();

        let hits = vec![hit(text, "sesame", AllergenClass::Sesame, 0.75)];
        let report = m.merge(&rule, &hits, text);

        let sesame = report.finding_for(AllergenClass::Sesame).unwrap();
        assert_eq!(sesame.category, Category::MayContain);
    }

    #[test]
    fn evidence_union_deduplicates() {
        let m = merger();
        let text = "ingredients: milk, salt";
        let rule = rule_report(text);
        let existing_evidence = rule
            .finding_for(AllergenClass::Milk)
            .unwrap()
            .evidence
            .clone();

        let hits = vec![
            hit(text, "milk", AllergenClass::Milk, 0.6),
            hit(text, "milk", AllergenClass::Milk, 0.6),
        ];
        let report = m.merge(&rule, &hits, text);

        let milk = report.finding_for(AllergenClass::Milk).unwrap();
        // One rule snippet plus one distinct recognizer span
        assert_eq!(milk.evidence.len(), existing_evidence.len() + 1);
    }

    #[test]
    fn out_of_range_recognizer_confidence_is_clamped() {
        let m = merger();
        let text = "ingredients: tahini";
        let hits = vec![hit(text, "tahini", AllergenClass::Sesame, 3.5)];
        let report = m.merge(&DetectionReport::empty(), &hits, text);
        let sesame = report.finding_for(AllergenClass::Sesame).unwrap();
        assert!(sesame.confidence <= 1.0);
    }

    #[test]
    fn report_stays_complete_after_merge() {
        let m = merger();
        let text = "ingredients: milk. may contain traces of peanuts.";
        let rule = rule_report(text);
        let hits = vec![hit(text, "milk", AllergenClass::Milk, 0.9)];
        let report = m.merge(&rule, &hits, text);

        let total =
            report.contains.len() + report.may_contain.len() + report.not_detected.len();
        assert_eq!(total, AllergenClass::ALL.len());
    }
}
