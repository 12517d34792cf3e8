//! Engine configuration loading and resolution
//!
//! Detection thresholds were tuned empirically against a noisy-OCR label
//! corpus. They are documented tunables, not correctness invariants, so they
//! load from a TOML file when one is provided and fall back to the compiled
//! defaults otherwise.
//!
//! Resolution priority order:
//! 1. Explicit path argument (highest priority)
//! 2. `ALLERSCAN_CONFIG` environment variable
//! 3. Compiled defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Tunable thresholds and window sizes for the detection engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Minimum normalized similarity for fuzzy token correction
    pub fuzzy_threshold: f64,

    /// Minimum confidence for an accepted classifier finding (inclusive)
    pub acceptance_threshold: f32,

    /// Minimum context score for a dictionary mention used in corroboration
    pub mention_threshold: f32,

    /// Context window radius around a keyword match, in characters
    pub context_window: usize,

    /// Evidence window radius around an accepted match, in characters
    pub evidence_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.65,
            acceptance_threshold: 0.7,
            mention_threshold: 0.4,
            context_window: 100,
            evidence_window: 20,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, validating before returning
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        info!(path = %path.display(), "Engine configuration loaded");
        Ok(config)
    }

    /// Resolve configuration following the priority order
    ///
    /// 1. Explicit path argument
    /// 2. `ALLERSCAN_CONFIG` environment variable
    /// 3. Compiled defaults
    pub fn resolve(path_arg: Option<&str>) -> Result<Self> {
        // Priority 1: explicit path argument
        if let Some(path) = path_arg {
            return Self::load(Path::new(path));
        }

        // Priority 2: environment variable
        if let Ok(path) = std::env::var("ALLERSCAN_CONFIG") {
            return Self::load(Path::new(&path));
        }

        // Priority 3: compiled defaults
        Ok(Self::default())
    }

    /// Validate threshold ranges, failing fast on misconfiguration
    ///
    /// A silently out-of-range threshold would either reject every finding or
    /// accept pure noise, so bad values are a load-time error rather than a
    /// runtime surprise.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(Error::Config(format!(
                "fuzzy_threshold out of range: {}",
                self.fuzzy_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(Error::Config(format!(
                "acceptance_threshold out of range: {}",
                self.acceptance_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.mention_threshold) {
            return Err(Error::Config(format!(
                "mention_threshold out of range: {}",
                self.mention_threshold
            )));
        }
        if self.context_window == 0 {
            return Err(Error::Config("context_window must be non-zero".to_string()));
        }
        if self.evidence_window == 0 {
            return Err(Error::Config("evidence_window must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fuzzy_threshold, 0.65);
        assert_eq!(config.acceptance_threshold, 0.7);
    }

    #[test]
    fn load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "fuzzy_threshold = 0.7\nacceptance_threshold = 0.75\nmention_threshold = 0.5"
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.fuzzy_threshold, 0.7);
        assert_eq!(config.acceptance_threshold, 0.75);
        // Unspecified fields keep defaults
        assert_eq!(config.context_window, 100);
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "acceptance_threshold = 1.5").unwrap();

        let result = EngineConfig::load(file.path());
        assert!(result.is_err(), "Out-of-range threshold should fail fast");
    }

    #[test]
    fn unknown_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "acceptence_threshold = 0.7").unwrap();

        let result = EngineConfig::load(file.path());
        assert!(result.is_err(), "Misspelled field should fail fast");
    }

    #[test]
    fn resolve_without_sources_uses_defaults() {
        // No path argument and no env var set in this test process
        std::env::remove_var("ALLERSCAN_CONFIG");
        let config = EngineConfig::resolve(None).unwrap();
        assert_eq!(config.acceptance_threshold, 0.7);
    }
}
