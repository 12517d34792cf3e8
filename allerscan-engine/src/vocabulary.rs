//! Keyword vocabulary configuration
//!
//! Per-class keyword, product-phrase, and exclusion sets driving the
//! classifier and the corroboration scan. Read-only after load: the engine
//! never mutates a vocabulary, and any per-call keyword adjustment (the
//! fish/shellfish collision) is computed as an ephemeral effective set.
//!
//! A class with a missing or empty vocabulary would be a silent safety
//! regression, so validation failures are fatal at load time.

use crate::types::AllergenClass;
use allerscan_common::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

static BUILTIN: Lazy<Vocabulary> = Lazy::new(build_builtin);

/// Keyword sets for one allergen class
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassVocabulary {
    /// Bare allergen terms and plurals, matched with word boundaries
    pub keywords: Vec<String>,

    /// Multi-word derived-product phrases ("fish oil", "whey powder")
    #[serde(default)]
    pub products: Vec<String>,

    /// Terms whose presence suppresses colliding keywords of this class
    #[serde(default)]
    pub exclusions: Vec<String>,
}

/// Full per-class vocabulary, in scan order
#[derive(Debug, Clone)]
pub struct Vocabulary {
    entries: Vec<(AllergenClass, ClassVocabulary)>,
}

impl Vocabulary {
    /// Vocabulary entry for a class
    pub fn get(&self, class: AllergenClass) -> Option<&ClassVocabulary> {
        self.entries
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, v)| v)
    }

    /// Iterate classes in scan order
    pub fn iter(&self) -> impl Iterator<Item = (AllergenClass, &ClassVocabulary)> {
        self.entries.iter().map(|(c, v)| (*c, v))
    }

    /// True if the class has no keyword or product terms to scan for
    ///
    /// Recognizer output for such a class cannot be sanity-checked against
    /// the text, so the merger trusts it as-is.
    pub fn is_empty_for(&self, class: AllergenClass) -> bool {
        self.get(class)
            .map(|v| v.keywords.is_empty() && v.products.is_empty())
            .unwrap_or(true)
    }

    /// Load a vocabulary from a JSON file
    ///
    /// Expected shape: `{ "PEANUT": { "keywords": [...], "products": [...],
    /// "exclusions": [...] }, ... }` with one entry per allergen class.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let vocab = Self::from_json_str(&content)?;
        info!(path = %path.display(), classes = vocab.entries.len(), "Vocabulary loaded");
        Ok(vocab)
    }

    /// Parse and validate a vocabulary from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, ClassVocabulary> = serde_json::from_str(json)
            .map_err(|e| Error::Vocabulary(format!("Failed to parse vocabulary: {}", e)))?;

        let mut by_class: BTreeMap<AllergenClass, ClassVocabulary> = BTreeMap::new();
        for (label, entry) in raw {
            let class: AllergenClass = label
                .parse()
                .map_err(|e| Error::Vocabulary(format!("{}", e)))?;
            by_class.insert(class, entry);
        }

        // Preserve canonical scan order regardless of file ordering
        let entries: Vec<(AllergenClass, ClassVocabulary)> = AllergenClass::ALL
            .iter()
            .filter_map(|class| by_class.remove(class).map(|v| (*class, v)))
            .collect();

        let vocab = Self { entries };
        vocab.validate()?;
        Ok(vocab)
    }

    /// Validate completeness, failing fast before any request is served
    pub fn validate(&self) -> Result<()> {
        for class in AllergenClass::ALL {
            let entry = self.get(class).ok_or_else(|| {
                Error::Vocabulary(format!("Missing vocabulary entry for class {}", class))
            })?;

            if entry.keywords.is_empty() && entry.products.is_empty() {
                return Err(Error::Vocabulary(format!(
                    "Class {} has no keywords or products",
                    class
                )));
            }

            for term in entry
                .keywords
                .iter()
                .chain(entry.products.iter())
                .chain(entry.exclusions.iter())
            {
                if term.trim().is_empty() {
                    return Err(Error::Vocabulary(format!(
                        "Class {} contains an empty term",
                        class
                    )));
                }
            }
        }
        Ok(())
    }

    /// Built-in vocabulary covering the full regulated class set
    ///
    /// Keywords must match as complete words; partial matches are handled by
    /// the classifier's word-boundary discipline, never by the vocabulary.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }
}

fn build_builtin() -> Vocabulary {
    fn entry(keywords: &[&str], products: &[&str], exclusions: &[&str]) -> ClassVocabulary {
        ClassVocabulary {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            products: products.iter().map(|s| s.to_string()).collect(),
            exclusions: exclusions.iter().map(|s| s.to_string()).collect(),
        }
    }

    let entries = vec![
        (
            AllergenClass::Peanut,
            entry(
                &["peanut", "peanuts", "groundnut", "groundnuts", "arachis"],
                &["peanut oil", "peanut butter", "peanut paste", "peanut flour"],
                &[],
            ),
        ),
        (
            AllergenClass::TreeNut,
            entry(
                &[
                    "almond",
                    "almonds",
                    "walnut",
                    "walnuts",
                    "hazelnut",
                    "hazelnuts",
                    "cashew",
                    "cashews",
                    "pistachio",
                    "pistachios",
                    "pecan",
                    "pecans",
                    "brazil nut",
                    "brazil nuts",
                    "macadamia",
                    "macadamias",
                    "chestnut",
                    "chestnuts",
                    "pine nut",
                    "pine nuts",
                ],
                &["nut butter", "nut oil", "nut paste", "tree nut", "tree nuts"],
                &[],
            ),
        ),
        (
            AllergenClass::Milk,
            entry(
                &[
                    "milk", "lactose", "casein", "whey", "butter", "cheese", "cream",
                    "yogurt", "yoghurt", "ghee", "milkfat", "dairy",
                ],
                &[
                    "milk powder",
                    "milk solids",
                    "milk fat",
                    "dairy product",
                    "dairy products",
                    "whey powder",
                    "whey protein",
                ],
                &[],
            ),
        ),
        (
            AllergenClass::Egg,
            entry(
                &[
                    "egg", "eggs", "albumen", "ovalbumin", "albumin", "lysozyme",
                    "ovomucoid",
                ],
                &["egg powder", "egg white", "egg yolk", "egg protein"],
                &[],
            ),
        ),
        (
            AllergenClass::Gluten,
            entry(
                &["gluten", "wheat", "barley", "rye", "spelt", "kamut"],
                &[
                    "wheat flour",
                    "wheat protein",
                    "wheat starch",
                    "rye flour",
                    "barley malt",
                ],
                &[],
            ),
        ),
        (
            AllergenClass::Soy,
            entry(
                &["soy", "soya", "soybean", "soybeans", "tofu", "tempeh", "edamame"],
                &[
                    "soy sauce",
                    "soy lecithin",
                    "soy flour",
                    "soya oil",
                    "soy protein",
                    "soya protein",
                ],
                &[],
            ),
        ),
        (
            // Bare "fish" is intentionally absent: the classifier adds it
            // per call when it appears standalone without "shellfish".
            AllergenClass::Fish,
            entry(
                &[
                    "anchovy",
                    "anchovies",
                    "cod",
                    "salmon",
                    "tuna",
                    "trout",
                    "bass",
                    "herring",
                    "sardine",
                    "sardines",
                    "whitebait",
                    "haddock",
                    "pollock",
                    "mackerel",
                    "tilapia",
                ],
                &["fish oil", "fish sauce", "fish stock", "fish protein"],
                &["shellfish"],
            ),
        ),
        (
            AllergenClass::Shellfish,
            entry(
                &[
                    "shrimp",
                    "shrimps",
                    "prawn",
                    "prawns",
                    "crab",
                    "crabs",
                    "lobster",
                    "lobsters",
                    "clam",
                    "clams",
                    "oyster",
                    "oysters",
                    "mussel",
                    "mussels",
                    "scallop",
                    "scallops",
                    "squid",
                    "octopus",
                    "calamari",
                    "crustacean",
                    "crustaceans",
                ],
                &["shellfish", "mollusc", "molluscs", "mollusk", "mollusks"],
                &[],
            ),
        ),
        (
            AllergenClass::Sesame,
            entry(
                &["sesame", "tahini", "hummus", "halvah"],
                &["sesame seed", "sesame seeds", "sesame oil"],
                &[],
            ),
        ),
        (
            AllergenClass::Mustard,
            entry(
                &["mustard", "dijon"],
                &[
                    "mustard seed",
                    "mustard seeds",
                    "mustard powder",
                    "mustard oil",
                ],
                &[],
            ),
        ),
        (
            AllergenClass::Celery,
            entry(
                &["celery", "celeriac"],
                &["celery seed", "celery seeds", "celery salt", "celery juice"],
                &[],
            ),
        ),
        (
            AllergenClass::Sulphites,
            entry(
                &[
                    "sulphite",
                    "sulphites",
                    "sulfite",
                    "sulfites",
                    "e220",
                    "e221",
                    "e222",
                ],
                &["sulphur dioxide", "sulfur dioxide"],
                &[],
            ),
        ),
        (
            AllergenClass::Lupin,
            entry(
                &["lupin", "lupine"],
                &["lupin flour", "lupin seed", "lupin seeds"],
                &[],
            ),
        ),
    ];

    Vocabulary { entries }
}
