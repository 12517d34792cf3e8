//! Text Normalizer Service
//!
//! Canonicalizes noisy OCR label text before classification: lowercasing,
//! phrase rewrites, a curated table of known OCR misreadings of allergen
//! terms, and fuzzy correction of short garbled tokens against the canonical
//! allergen term list.
//!
//! `normalize` is a pure function and a fixed point on text already in
//! canonical lowercase ASCII form. All patterns compile once at construction
//! and are reused across calls.

use allerscan_common::EngineConfig;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Normalizer errors
#[derive(Debug, Error)]
pub enum NormalizerError {
    /// Pattern table failed to compile
    #[error("Pattern compilation failed: {0}")]
    Pattern(#[from] regex::Error),
}

/// Ordered phrase-rewrite rules canonicalizing common label phrasings.
///
/// Order matters: later rules assume earlier rewrites already occurred. The
/// may-contain rules run before the contains rule, and the contains rule
/// requires an explicit separator, so a precautionary "may contain" is never
/// rewritten into a declaration.
const PHRASE_REWRITES: &[(&str, &str)] = &[
    (r"\ballergy\s+advice\s*[:\-]*\s*", "contains "),
    (r"\ballergens?\s+(?:info|information|advice)\s*[:\-]*\s*", "contains "),
    (r"\bmay\s+contain\s+traces?\s+of\s+", "may contain traces of "),
    (r"\bmay\s+contain\s+", "may contain "),
    (r"\bcontains?\s*[:\-]+\s*", "contains "),
    (r"\bingredients?\s*[:\-]+\s*", "ingredients: "),
    (r"\s+and\s+", ", "),
    (r",\s*,", ","),
];

/// Known OCR misreadings of allergen terms, mapped to canonical form.
///
/// Keys are garbled variants only; no value appears as a key, so a single
/// substitution pass reaches a fixed point. Matched at word boundaries to
/// avoid partial-word corruption.
const OCR_SUBSTITUTIONS: &[(&str, &str)] = &[
    // Peanut
    ("peanat", "peanut"),
    ("peanats", "peanut"),
    ("peatat", "peanut"),
    ("peatats", "peanut"),
    ("peanot", "peanut"),
    ("peanots", "peanut"),
    ("peanu", "peanut"),
    ("peanus", "peanut"),
    ("peanvt", "peanut"),
    ("pednut", "peanut"),
    ("pearut", "peanut"),
    ("peaunt", "peanut"),
    ("qeanut", "peanut"),
    // Tree nuts
    ("walnt", "walnut"),
    ("walnts", "walnut"),
    ("wainut", "walnut"),
    ("wainuts", "walnut"),
    ("wa1nut", "walnut"),
    ("walnot", "walnut"),
    ("wolnut", "walnut"),
    ("vvalnut", "walnut"),
    ("watuts", "walnut"),
    ("walnus", "walnut"),
    ("hazelnot", "hazelnut"),
    ("hazlenut", "hazelnut"),
    ("hezelnut", "hazelnut"),
    ("haselnut", "hazelnut"),
    ("halzelnut", "hazelnut"),
    ("a1mond", "almond"),
    ("aimond", "almond"),
    ("almend", "almond"),
    ("almord", "almond"),
    ("amond", "almond"),
    ("aknond", "almond"),
    ("cashevv", "cashew"),
    ("cashw", "cashew"),
    ("cashev", "cashew"),
    ("casheew", "cashew"),
    ("kashew", "cashew"),
    ("plstachio", "pistachio"),
    ("pistachlo", "pistachio"),
    ("pistacho", "pistachio"),
    ("pecon", "pecan"),
    ("pecam", "pecan"),
    ("pekan", "pecan"),
    ("brazi", "brazil nut"),
    ("brazli", "brazil nut"),
    ("brazl", "brazil nut"),
    ("brasil nut", "brazil nut"),
    ("macadamla", "macadamia"),
    ("macademia", "macadamia"),
    ("muts", "nuts"),
    ("nvts", "nuts"),
    ("nuls", "nuts"),
    ("nutz", "nuts"),
    ("nus", "nuts"),
    // Milk
    ("mk", "milk"),
    ("miik", "milk"),
    ("m1lk", "milk"),
    ("mi1k", "milk"),
    ("rnilk", "milk"),
    ("mllk", "milk"),
    ("milx", "milk"),
    ("nilk", "milk"),
    ("bufter", "butter"),
    ("butfer", "butter"),
    ("cheeze", "cheese"),
    ("chese", "cheese"),
    ("chegoea", "cheese"),
    ("yogvrt", "yogurt"),
    ("yognrt", "yogurt"),
    ("caseln", "casein"),
    ("casern", "casein"),
    ("wbey", "whey"),
    ("vvhey", "whey"),
    ("lactuse", "lactose"),
    ("lactos", "lactose"),
    // Egg
    ("egq", "egg"),
    ("eqg", "egg"),
    ("e99", "egg"),
    ("eggg", "egg"),
    ("egs", "eggs"),
    ("albumln", "albumen"),
    ("a1bumen", "albumen"),
    ("albumer", "albumen"),
    ("ovalbumln", "ovalbumin"),
    // Gluten
    ("gltn", "gluten"),
    ("glten", "gluten"),
    ("g1uten", "gluten"),
    ("qluten", "gluten"),
    ("glutten", "gluten"),
    ("giuten", "gluten"),
    ("wheet", "wheat"),
    ("wbeat", "wheat"),
    ("vvheat", "wheat"),
    ("vheat", "wheat"),
    ("barly", "barley"),
    ("bariey", "barley"),
    ("bar1ey", "barley"),
    ("speit", "spelt"),
    ("spelf", "spelt"),
    ("kamvt", "kamut"),
    ("cereak", "cereal"),
    ("cerea1", "cereal"),
    // Soy
    ("s0y", "soy"),
    ("soi", "soy"),
    ("soja", "soya"),
    ("soybeen", "soybean"),
    ("tofv", "tofu"),
    ("t0fu", "tofu"),
    // Fish
    ("flsh", "fish"),
    ("fsh", "fish"),
    ("fiish", "fish"),
    ("f1sh", "fish"),
    ("anchow", "anchovy"),
    ("anchouy", "anchovy"),
    ("anchovv", "anchovy"),
    ("salrnon", "salmon"),
    ("sa1mon", "salmon"),
    ("salmom", "salmon"),
    ("saimon", "salmon"),
    ("tvna", "tuna"),
    ("tunna", "tuna"),
    ("tuua", "tuna"),
    ("c0d", "cod"),
    ("macherel", "mackerel"),
    ("mackerei", "mackerel"),
    ("mackere1", "mackerel"),
    ("sardlne", "sardine"),
    ("sardins", "sardines"),
    ("herrlng", "herring"),
    ("haddok", "haddock"),
    ("po1lock", "pollock"),
    ("tllapia", "tilapia"),
    // Shellfish
    ("shellflsh", "shellfish"),
    ("shelifish", "shellfish"),
    ("she11fish", "shellfish"),
    ("shelfish", "shellfish"),
    ("shellfsh", "shellfish"),
    ("shrlmp", "shrimp"),
    ("shrimq", "shrimp"),
    ("shr1mp", "shrimp"),
    ("pravvn", "prawn"),
    ("prawm", "prawn"),
    ("lobsler", "lobster"),
    ("lobsfer", "lobster"),
    ("l0bster", "lobster"),
    ("c1am", "clam"),
    ("ciam", "clam"),
    ("oysler", "oyster"),
    ("oystr", "oyster"),
    ("0yster", "oyster"),
    ("musse1", "mussel"),
    ("mussei", "mussel"),
    ("mvssel", "mussel"),
    ("scalop", "scallop"),
    ("sca1lop", "scallop"),
    ("scallsp", "scallop"),
    ("squld", "squid"),
    ("sqvid", "squid"),
    ("octopvs", "octopus"),
    ("calamarl", "calamari"),
    // Sesame
    ("sesem", "sesame"),
    ("seseme", "sesame"),
    ("sesarne", "sesame"),
    ("sessame", "sesame"),
    ("se5ame", "sesame"),
    ("tahlni", "tahini"),
    ("tah1ni", "tahini"),
    ("tahina", "tahini"),
    ("hummu", "hummus"),
    ("halva", "halvah"),
    // Mustard
    ("mustord", "mustard"),
    ("musfard", "mustard"),
    ("mvstard", "mustard"),
    ("mustarb", "mustard"),
    ("mu5tard", "mustard"),
    ("dljon", "dijon"),
    ("d1jon", "dijon"),
    ("dijor", "dijon"),
    // Celery
    ("celey", "celery"),
    ("ce1ery", "celery"),
    ("celerv", "celery"),
    ("ceiery", "celery"),
    ("celerey", "celery"),
    ("celerlac", "celeriac"),
    ("ce1eriac", "celeriac"),
    // Sulphites
    ("su1phite", "sulphite"),
    ("su1phites", "sulphites"),
    ("sulphlte", "sulphite"),
    ("sulphltes", "sulphites"),
    ("suphites", "sulphites"),
    ("sulfit", "sulphite"),
    ("sulfits", "sulphites"),
    ("so2", "sulphur dioxide"),
    ("s02", "sulphur dioxide"),
    ("sulpher dioxide", "sulphur dioxide"),
    ("sulphur dloxide", "sulphur dioxide"),
    // Lupin
    ("lupln", "lupin"),
    ("lup1n", "lupin"),
    ("1upin", "lupin"),
    ("lvpin", "lupin"),
    ("luqin", "lupin"),
    ("lupins", "lupin"),
];

/// Canonical allergen terms for fuzzy token correction.
///
/// Every term is its own best match, so canonical tokens are stable under
/// repeated normalization.
const FUZZY_TARGETS: &[&str] = &[
    "peanut",
    "tree nut",
    "milk",
    "egg",
    "fish",
    "shellfish",
    "gluten",
    "wheat",
    "cereal",
    "sesame",
    "soy",
    "sulphite",
    "mustard",
    "lupin",
    "walnut",
    "almond",
    "cashew",
    "hazelnut",
    "pecan",
    "pistachio",
    "macadamia",
    "brazil nut",
    "coconut",
    "celery",
    "barley",
    "salmon",
    "tuna",
    "prawn",
    "shrimp",
    "oyster",
    "mussel",
    "lobster",
    "scallop",
    "sardine",
    "herring",
    "anchovy",
    "tahini",
    "yogurt",
    "casein",
];

/// Common words that must never be fuzzy-corrected, regardless of score.
///
/// Each entry sits within correction distance of an allergen term ("custard"
/// vs "mustard", "heat" vs "wheat", "caster" vs "oyster") or marks
/// surrounding label furniture the corrector must leave alone.
const FUZZY_EXCLUSIONS: &[&str] = &[
    "cream",
    "cereal",
    "cereals",
    "organic",
    "ingredient",
    "ingredients",
    "contains",
    "serving",
    "energy",
    "protein",
    "total",
    "sugar",
    "lemon",
    "parsley",
    "caster",
    "custard",
    "mild",
    "mill",
    "dish",
    "finish",
    "what",
    "heat",
];

/// Text Normalizer
///
/// Deterministic OCR text canonicalization. All pattern tables compile once
/// here and are reused for every call.
pub struct TextNormalizer {
    phrase_rules: Vec<(Regex, &'static str)>,
    substitution_re: Regex,
    substitutions: HashMap<&'static str, &'static str>,
    exclusions: HashSet<&'static str>,
    whitespace_re: Regex,
    strip_re: Regex,
    fuzzy_threshold: f64,
}

impl TextNormalizer {
    /// Build the normalizer, compiling all pattern tables
    pub fn new(config: &EngineConfig) -> Result<Self, NormalizerError> {
        let phrase_rules = PHRASE_REWRITES
            .iter()
            .map(|(pattern, replacement)| Ok((Regex::new(pattern)?, *replacement)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        // Longest variants first: the regex crate prefers earlier
        // alternatives, and "peanut skin-on" must win over "peanut".
        let mut variants: Vec<&str> = OCR_SUBSTITUTIONS.iter().map(|(v, _)| *v).collect();
        variants.sort_by_key(|v| std::cmp::Reverse(v.len()));
        let alternation = variants
            .iter()
            .map(|v| regex::escape(v))
            .collect::<Vec<_>>()
            .join("|");
        let substitution_re = Regex::new(&format!(r"\b(?:{})\b", alternation))?;

        Ok(Self {
            phrase_rules,
            substitution_re,
            substitutions: OCR_SUBSTITUTIONS.iter().copied().collect(),
            exclusions: FUZZY_EXCLUSIONS.iter().copied().collect(),
            whitespace_re: Regex::new(r"\s+")?,
            strip_re: Regex::new(r"[^a-z0-9\s\-.,:]")?,
            fuzzy_threshold: config.fuzzy_threshold,
        })
    }

    /// Normalize raw OCR text into canonical lowercase form
    ///
    /// Steps, in order: lowercase, phrase rewrites, OCR substitution table,
    /// fuzzy token correction, whitespace collapse and artifact strip.
    /// Empty input returns an empty string.
    pub fn normalize(&self, raw: &str) -> String {
        if raw.trim().is_empty() {
            return String::new();
        }

        let mut text = raw.to_lowercase();

        for (pattern, replacement) in &self.phrase_rules {
            text = pattern.replace_all(&text, *replacement).into_owned();
        }

        text = self
            .substitution_re
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                let matched = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
                self.substitutions
                    .get(matched)
                    .copied()
                    .unwrap_or(matched)
                    .to_string()
            })
            .into_owned();

        let corrected: Vec<String> = text
            .split_whitespace()
            .map(|token| self.fuzzy_correct(token))
            .collect();
        text = corrected.join(" ");

        text = self.strip_re.replace_all(&text, "").into_owned();
        text = self.whitespace_re.replace_all(&text, " ").into_owned();
        text.trim().to_string()
    }

    /// Fuzzy-correct one whitespace-delimited token
    ///
    /// Only tokens of 4-8 letters with no digits are candidates; shorter and
    /// longer tokens are left alone as a precision guard, and the fixed
    /// exclusion list takes priority over any similarity score. Surrounding
    /// punctuation is preserved.
    fn fuzzy_correct(&self, token: &str) -> String {
        let not_word = |c: char| !c.is_alphanumeric();
        let start = token.len() - token.trim_start_matches(not_word).len();
        let end = token.trim_end_matches(not_word).len();
        if start >= end {
            return token.to_string();
        }

        let core = &token[start..end];
        if core.len() < 4 || core.len() > 8 || core.chars().any(|c| c.is_ascii_digit()) {
            return token.to_string();
        }
        if self.exclusions.contains(core) {
            return token.to_string();
        }

        let mut best: Option<&str> = None;
        let mut best_score = self.fuzzy_threshold;
        for target in FUZZY_TARGETS {
            let score = strsim::normalized_levenshtein(core, target);
            if score > best_score {
                best_score = score;
                best = Some(target);
            }
        }

        match best {
            Some(replacement) if replacement != core => {
                format!("{}{}{}", &token[..start], replacement, &token[end..])
            }
            _ => token.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn empty_input_returns_empty() {
        let n = normalizer();
        assert_eq!(n.normalize(""), "");
        assert_eq!(n.normalize("   \n\t "), "");
    }

    #[test]
    fn lowercases_and_collapses_whitespace() {
        let n = normalizer();
        assert_eq!(n.normalize("MILK   Powder"), "milk powder");
    }

    #[test]
    fn idempotent_on_canonical_text() {
        let n = normalizer();
        let inputs = [
            "ingredients: wheat flour, milk solids, salt",
            "contains peanut, may contain traces of sesame",
            "sugar, cocoa butter, emulsifier",
        ];
        for input in inputs {
            let once = n.normalize(input);
            let twice = n.normalize(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn phrase_rewrites_apply_in_order() {
        let n = normalizer();
        assert_eq!(n.normalize("Allergy Advice: Milk"), "contains milk");
        assert_eq!(n.normalize("Contains: Soy"), "contains soy");
        assert_eq!(n.normalize("wheat and barley"), "wheat, barley");
        // May-contain phrasing survives the contains rewrite
        assert_eq!(n.normalize("May  contain nuts"), "may contain nuts");
    }

    #[test]
    fn substitution_table_fixes_known_garbles() {
        let n = normalizer();
        assert_eq!(n.normalize("rnilk"), "milk");
        assert_eq!(n.normalize("Peatats"), "peanut");
        assert_eq!(n.normalize("Brazi Muts"), "brazil nut nuts");
        assert_eq!(n.normalize("Suphites"), "sulphites");
    }

    #[test]
    fn substitution_respects_word_boundaries() {
        let n = normalizer();
        // "mk" must not fire inside a longer token
        assert_eq!(n.normalize("hallmkark"), "hallmkark");
        assert_eq!(n.normalize("mk products"), "milk products");
    }

    #[test]
    fn fuzzy_corrects_moderately_garbled_tokens() {
        let n = normalizer();
        // Not in the substitution table; one edit from "almond"
        assert_eq!(n.normalize("almomd"), "almond");
        // Punctuation is preserved around the corrected token
        assert_eq!(n.normalize("almomd,"), "almond,");
    }

    #[test]
    fn fuzzy_exclusion_list_takes_priority() {
        let n = normalizer();
        assert_eq!(n.normalize("custard"), "custard");
        assert_eq!(n.normalize("cream"), "cream");
        assert_eq!(n.normalize("caster sugar"), "caster sugar");
        assert_eq!(n.normalize("store in a cool place, away from heat"),
            "store in a cool place, away from heat");
    }

    #[test]
    fn fuzzy_skips_short_long_and_numeric_tokens() {
        let n = normalizer();
        // 3 letters: too short to correct safely
        assert_eq!(n.normalize("ilk"), "ilk");
        // 12 letters: too long
        assert_eq!(n.normalize("strawberries"), "strawberries");
        // Digit-bearing token is never fuzzy-corrected
        assert_eq!(n.normalize("alm0nd8"), "alm0nd8");
    }

    #[test]
    fn strips_ocr_artifacts() {
        let n = normalizer();
        assert_eq!(n.normalize("milk & honey!"), "milk honey");
        assert_eq!(n.normalize("wheat (gluten)"), "wheat gluten");
    }

    #[test]
    fn garbled_label_end_to_end() {
        let n = normalizer();
        let cleaned = n.normalize("Peatats Skin-On Brazi Muts");
        assert!(cleaned.contains("peanut"), "got {:?}", cleaned);
        assert!(cleaned.contains("brazil nut"), "got {:?}", cleaned);
    }
}
