//! Configuration loading and resolution
//!
//! Priority order for every resolvable setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is never fatal: a warning is logged and compiled
//! defaults are used. A config file that exists but does not parse or
//! validate is an error.

use crate::design::StudyDesign;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "RMSA_CONFIG";

/// Environment variable overriding the random seed
pub const SEED_ENV: &str = "RMSA_SEED";

/// Default random seed for bootstrap resampling
pub const DEFAULT_SEED: u64 = 7;

/// Fewest complete participants (and paired observations) a test may run on
pub const MIN_COMPLETE_CASES_FLOOR: usize = 3;

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (e.g. "info", "rmsa_engine=debug")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Analysis tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Base seed for every random generator in the run
    pub seed: u64,
    /// Bootstrap resamples per confidence interval
    pub bootstrap_resamples: usize,
    /// Two-sided confidence level for bootstrap intervals
    pub confidence_level: f64,
    /// Minimum complete-case participants for a hypothesis test
    pub min_complete_cases: usize,
    /// Maximum nesting depth inspected by the loader
    pub max_depth: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            bootstrap_resamples: 2000,
            confidence_level: 0.95,
            min_complete_cases: 3,
            max_depth: 64,
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(Error::Config(format!(
                "confidence_level {} out of range (0, 1)",
                self.confidence_level
            )));
        }
        if self.min_complete_cases < MIN_COMPLETE_CASES_FLOOR {
            return Err(Error::Config(format!(
                "min_complete_cases {} must be at least {}",
                self.min_complete_cases, MIN_COMPLETE_CASES_FLOOR
            )));
        }
        if self.max_depth == 0 {
            return Err(Error::Config("max_depth must be positive".to_string()));
        }
        Ok(())
    }
}

/// Parsed TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub analysis: AnalysisSettings,
    /// Optional study design replacing the compiled default entirely
    pub design: Option<StudyDesign>,
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(text)?;
        config.analysis.validate()?;
        Ok(config)
    }

    /// Validated study design (file override or compiled default)
    pub fn study_design(&self) -> Result<StudyDesign> {
        let design = self.design.clone().unwrap_or_else(StudyDesign::builtin);
        design.validate()?;
        Ok(design)
    }
}

/// Locate the config file
///
/// Explicit paths (CLI, then `RMSA_CONFIG`) are returned even when missing so
/// that the loader can warn about them; the per-user default is only returned
/// when it exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("rmsa").join("config.toml"))?;
    if user_config.exists() {
        Some(user_config)
    } else {
        None
    }
}

/// Load the config file, falling back to defaults when it is absent
pub fn load_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        debug!("No config file; using compiled defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found; using compiled defaults");
        return Ok(TomlConfig::default());
    }

    let text = std::fs::read_to_string(path)?;
    TomlConfig::from_toml_str(&text).map_err(|e| match e {
        Error::Toml(err) => Error::Config(format!("{}: {}", path.display(), err)),
        other => other,
    })
}

/// Resolve the random seed: CLI > `RMSA_SEED` > TOML > compiled default
///
/// An unparsable environment value is ignored with a warning.
pub fn resolve_seed(cli_arg: Option<u64>, config: &TomlConfig) -> u64 {
    if let Some(seed) = cli_arg {
        return seed;
    }

    if let Ok(raw) = std::env::var(SEED_ENV) {
        match raw.trim().parse::<u64>() {
            Ok(seed) => return seed,
            Err(_) => warn!(value = %raw, "Ignoring unparsable {}", SEED_ENV),
        }
    }

    config.analysis.seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_validate() {
        AnalysisSettings::default().validate().unwrap();
    }

    #[test]
    fn test_partial_analysis_table_keeps_defaults() {
        let config = TomlConfig::from_toml_str("[analysis]\nbootstrap_resamples = 500\n").unwrap();
        assert_eq!(config.analysis.bootstrap_resamples, 500);
        assert_eq!(config.analysis.seed, DEFAULT_SEED);
        assert_eq!(config.logging.level, "info");
        assert!(config.design.is_none());
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let err = TomlConfig::from_toml_str("[analysis]\nconfidence_level = 1.5\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_min_complete_cases_floor() {
        let err = TomlConfig::from_toml_str("[analysis]\nmin_complete_cases = 2\n").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("at least 3")));
        let config = TomlConfig::from_toml_str("[analysis]\nmin_complete_cases = 3\n").unwrap();
        assert_eq!(config.analysis.min_complete_cases, 3);
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(matches!(
            TomlConfig::from_toml_str("[analysis\nseed = 1"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_builtin_design_when_no_override() {
        let design = TomlConfig::default().study_design().unwrap();
        assert_eq!(design, StudyDesign::builtin());
    }
}
