//! Unit tests for configuration resolution and graceful degradation
//!
//! Covers:
//! - Missing TOML files do not cause termination
//! - Priority order for config path and seed resolution
//! - `[design]` table overriding the compiled study design
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate RMSA_CONFIG or RMSA_SEED are marked with #[serial].

use rmsa_common::config::{
    load_config, resolve_config_path, resolve_seed, TomlConfig, CONFIG_ENV, DEFAULT_SEED, SEED_ENV,
};
use rmsa_common::{Error, Phase};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

const DESIGN_TOML: &str = r#"
[logging]
level = "debug"

[analysis]
seed = 99
min_complete_cases = 4

[design]
session_sections = ["meta", "end"]
known_params = ["Tempo"]

[design.scale]
min = 1
max = 5

[[design.conditions]]
code = "X"
label = "First"

[[design.conditions]]
code = "Y"
label = "Second"

[[design.items]]
code = "Q_1"
label = "Q1"
phase = "pre"

[[design.items]]
code = "Q_2"
label = "Q2"
phase = "post"
direction = -1

[[design.constructs]]
name = "Both"
items = ["Q_1", "Q_2"]
reverse = ["Q_2"]
"#;

#[test]
#[serial]
fn test_cli_path_takes_precedence_over_env() {
    env::set_var(CONFIG_ENV, "/tmp/rmsa-from-env.toml");

    let cli = PathBuf::from("/tmp/rmsa-from-cli.toml");
    let resolved = resolve_config_path(Some(&cli));
    assert_eq!(resolved, Some(cli));

    env::remove_var(CONFIG_ENV);
}

#[test]
#[serial]
fn test_env_path_used_without_cli() {
    env::set_var(CONFIG_ENV, "/tmp/rmsa-from-env.toml");

    let resolved = resolve_config_path(None);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/rmsa-from-env.toml")));

    env::remove_var(CONFIG_ENV);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    let config = load_config(Some(&missing)).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_no_path_uses_defaults() {
    let config = load_config(None).unwrap();
    assert_eq!(config.analysis.seed, DEFAULT_SEED);
}

#[test]
fn test_invalid_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[analysis]\nseed = \"seven\"\n").unwrap();

    let err = load_config(Some(&path)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("bad.toml"));
}

#[test]
fn test_design_override_loaded_and_validated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("study.toml");
    std::fs::write(&path, DESIGN_TOML).unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.analysis.min_complete_cases, 4);

    let design = config.study_design().unwrap();
    assert_eq!(design.condition_codes(), vec!["X", "Y"]);
    assert_eq!(design.scale.max, 5);
    assert_eq!(design.item("Q_2").unwrap().phase, Phase::Post);
    assert!(design.item("Q_2").unwrap().is_reverse_keyed());
    // Defaulted fields survive a partial design table
    assert_eq!(design.order_field, "order");
    assert_eq!(design.end.rank_prefix, "rank_");
}

#[test]
fn test_design_override_with_bad_reference_fails() {
    let broken = DESIGN_TOML.replace("items = [\"Q_1\", \"Q_2\"]", "items = [\"Q_1\", \"Q_9\"]");
    let config = TomlConfig::from_toml_str(&broken).unwrap();
    assert!(config.study_design().is_err());
}

#[test]
#[serial]
fn test_seed_priority_cli_env_toml() {
    let mut config = TomlConfig::default();
    config.analysis.seed = 11;

    env::remove_var(SEED_ENV);
    assert_eq!(resolve_seed(None, &config), 11);

    env::set_var(SEED_ENV, "22");
    assert_eq!(resolve_seed(None, &config), 22);
    assert_eq!(resolve_seed(Some(33), &config), 33);

    env::remove_var(SEED_ENV);
}

#[test]
#[serial]
fn test_unparsable_seed_env_ignored() {
    env::set_var(SEED_ENV, "not-a-number");

    let config = TomlConfig::default();
    assert_eq!(resolve_seed(None, &config), DEFAULT_SEED);

    env::remove_var(SEED_ENV);
}
