//! Config Validation Tests
//!
//! Typo detection on TOML/JSON input, per-section validation and the
//! engineering sanity checks, exercised through the public config API.

use rbi_engine::config::validation::{
    known_config_keys, suggest_correction, validate_engineering_ranges, validate_sections,
    validate_unknown_keys, SECTION_NAMES,
};
use rbi_engine::config::{ConfigError, ConfigurationManager, RbiConfig};
use rbi_engine::types::CofDimension;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_interval_key_warns_with_suggestion() {
    let toml_str = r#"
[risk_matrix.inspection_intervals]
very_hihg = 6
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("very_hihg"));
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("risk_matrix.inspection_intervals.very_high")
    );
}

#[test]
fn typo_in_section_name_warns() {
    let toml_str = r#"
[learnign]
enabled = true
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.iter().any(|w| w.field == "learnign"));
    assert!(warnings
        .iter()
        .any(|w| w.suggestion.as_deref() == Some("learning")));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[risk_matrix.inspection_intervals]
low = 48
medium = 30
high = 12
very_high = 6

[risk_matrix.fallback_safety_factors]
level3_to_level2 = 1.2

[fallback]
enabled = true
emergency_interval_months = 3
confidence_penalty = 0.15

[learning]
enabled = true
accuracy_threshold = 0.85
min_feedback_samples = 20

[level1]
min_interval_months = 6
max_interval_months = 96

[level1.base_intervals]
pressure_vessel = 60
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(
        warnings.is_empty(),
        "Valid config should produce 0 warnings, got: {:?}",
        warnings.iter().map(|w| &w.field).collect::<Vec<_>>()
    );
}

#[test]
fn multiple_typos_all_warned() {
    let toml_str = r#"
[fallback]
enabeld = true

[learning]
accuracy_treshold = 0.8
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(
        warnings.len(),
        2,
        "Expected 2 warnings for 2 typos, got {}",
        warnings.len()
    );
}

#[test]
fn empty_toml_produces_zero_warnings() {
    assert!(validate_unknown_keys("").is_empty());
}

#[test]
fn known_keys_set_is_complete() {
    // Every key the default config serializes must be recognised
    let toml_str = RbiConfig::default()
        .to_toml()
        .expect("Default config should serialize");
    let warnings = validate_unknown_keys(&toml_str);
    assert!(
        warnings.is_empty(),
        "Default config serialization should produce 0 unknown-key warnings, got: {:?}",
        warnings.iter().map(|w| &w.field).collect::<Vec<_>>()
    );
}

#[test]
fn suggest_correction_finds_close_match() {
    let known = known_config_keys();
    let s = suggest_correction("fallback.confidence_penalt", &known);
    assert_eq!(s.as_deref(), Some("fallback.confidence_penalty"));
}

#[test]
fn suggest_correction_returns_none_for_garbage() {
    let known = known_config_keys();
    let s = suggest_correction("zzz_completely_invalid_xyz_12345", &known);
    assert!(s.is_none(), "Garbage string should not match anything");
}

// ============================================================================
// Section Validation
// ============================================================================

#[test]
fn default_config_is_valid_in_every_section() {
    let sections = validate_sections(&RbiConfig::default());
    assert_eq!(sections.len(), SECTION_NAMES.len());
    for (section, errors) in sections {
        assert!(errors.is_empty(), "{section}: {errors:?}");
    }
}

#[test]
fn weights_not_summing_to_one_is_error() {
    let mut config = RbiConfig::default();
    *config
        .weighting_factors
        .cof_dimensions
        .get_mut(CofDimension::Safety) = 0.9;
    let sections = validate_sections(&config);
    assert!(!sections["weighting_factors"].is_empty());
    assert!(sections["risk_matrix"].is_empty());
}

#[test]
fn zero_emergency_interval_is_error() {
    let mut config = RbiConfig::default();
    config.fallback.emergency_interval_months = 0;
    assert!(!validate_sections(&config)["fallback"].is_empty());
}

#[test]
fn accuracy_threshold_outside_unit_range_is_error() {
    let mut config = RbiConfig::default();
    config.learning.accuracy_threshold = 1.5;
    assert!(!validate_sections(&config)["learning"].is_empty());
}

#[test]
fn incomplete_matrix_is_error() {
    let mut config = RbiConfig::default();
    config.risk_matrix.cells.pop();
    assert!(!validate_sections(&config)["risk_matrix"].is_empty());
}

#[test]
fn validate_collects_all_section_errors() {
    let mut config = RbiConfig::default();
    config.fallback.emergency_interval_months = 0;
    config.learning.accuracy_threshold = -0.1;
    match config.validate() {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.starts_with("fallback:")));
            assert!(errors.iter().any(|e| e.starts_with("learning:")));
        }
        other => panic!("Expected validation errors, got {other:?}"),
    }
}

#[test]
fn invalid_toml_value_fails_to_load() {
    let toml_str = r#"
[learning]
accuracy_threshold = 2.0
"#;
    assert!(matches!(
        RbiConfig::from_toml_str(toml_str),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn partial_toml_keeps_defaults_elsewhere() {
    let toml_str = r#"
[risk_matrix.inspection_intervals]
low = 48
"#;
    let config = RbiConfig::from_toml_str(toml_str).expect("partial config should load");
    assert_eq!(config.risk_matrix.inspection_intervals.low, 48);
    assert_eq!(config.risk_matrix.inspection_intervals.very_high, 6);
    assert_eq!(config.fallback, RbiConfig::default().fallback);
}

// ============================================================================
// Engineering Sanity Checks
// ============================================================================

#[test]
fn defaults_pass_engineering_checks() {
    let warnings = validate_engineering_ranges(&RbiConfig::default());
    assert!(warnings.is_empty(), "{warnings:?}");
}

#[test]
fn safety_factor_below_one_warns_but_is_valid() {
    let mut config = RbiConfig::default();
    config
        .risk_matrix
        .fallback_safety_factors
        .insert("level3_to_level2".to_string(), 0.8);
    assert!(validate_engineering_ranges(&config)
        .iter()
        .any(|w| w.field == "risk_matrix.fallback_safety_factors"));
    assert!(config.validate().is_ok());
}

#[test]
fn health_score_drops_with_errors() {
    let manager = ConfigurationManager::default();
    let healthy = manager.get_configuration_health_score();
    assert!(healthy.score > 80);
    assert_eq!(healthy.error_count, 0);
    assert!(manager.is_configuration_valid());
}
