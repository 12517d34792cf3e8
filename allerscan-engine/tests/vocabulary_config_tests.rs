//! Vocabulary and configuration loading tests
//!
//! Load-time validation must fail fast: a class silently missing its
//! vocabulary or a threshold outside [0, 1] would be a safety regression
//! served to every request.

use allerscan_engine::{
    AllergenClass, AllergenDetector, Category, EngineConfig, Vocabulary,
};
use std::io::Write;

fn full_vocabulary_json() -> String {
    let mut entries: Vec<String> = Vec::new();
    for class in AllergenClass::ALL {
        let extra = match class {
            AllergenClass::Fish => r#", "products": ["fish oil"], "exclusions": ["shellfish"]"#,
            _ => "",
        };
        entries.push(format!(
            r#""{}": {{ "keywords": ["{}"]{} }}"#,
            class,
            class.as_str().to_lowercase().replace('_', " "),
            extra
        ));
    }
    format!("{{ {} }}", entries.join(", "))
}

#[test]
fn vocabulary_loads_from_json_file() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, "{}", full_vocabulary_json())?;

    let vocab = Vocabulary::from_json_file(file.path())?;
    assert_eq!(
        vocab.get(AllergenClass::Fish).unwrap().exclusions,
        vec!["shellfish"]
    );

    // The loaded vocabulary drives a working detector
    let detector = AllergenDetector::with_config(EngineConfig::default(), vocab)?;
    let report = detector.classify("ingredients: peanut, salt");
    assert_eq!(
        report.finding_for(AllergenClass::Peanut).map(|f| f.category),
        Some(Category::Contains)
    );
    Ok(())
}

#[test]
fn vocabulary_missing_a_class_fails_at_load() {
    let json = r#"{ "PEANUT": { "keywords": ["peanut"] } }"#;
    assert!(Vocabulary::from_json_str(json).is_err());
}

#[test]
fn vocabulary_with_empty_terms_fails_at_load() {
    let json = full_vocabulary_json().replace(r#"["peanut"]"#, r#"["  "]"#);
    assert!(Vocabulary::from_json_str(&json).is_err());
}

#[test]
fn malformed_vocabulary_json_fails_at_load() {
    assert!(Vocabulary::from_json_str("not json at all").is_err());
    assert!(Vocabulary::from_json_str(r#"{ "PEANUT": ["flat", "list"] }"#).is_err());
}

#[test]
fn detector_rejects_out_of_range_thresholds() {
    let mut config = EngineConfig::default();
    config.acceptance_threshold = 1.5;
    assert!(AllergenDetector::with_config(config, Vocabulary::builtin()).is_err());

    let mut config = EngineConfig::default();
    config.fuzzy_threshold = -0.1;
    assert!(AllergenDetector::with_config(config, Vocabulary::builtin()).is_err());
}

#[test]
fn config_loads_from_toml_and_drives_the_detector() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "acceptance_threshold = 0.95")?;

    let config = EngineConfig::load(file.path())?;
    let detector = AllergenDetector::with_config(config, Vocabulary::builtin())?;

    // 0.9 base confidence for a trace warning now falls below threshold
    let report = detector.classify("ingredients: sugar. may contain peanuts.");
    assert!(report.is_not_detected(AllergenClass::Peanut));
    Ok(())
}
