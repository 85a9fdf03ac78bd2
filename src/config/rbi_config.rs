//! RBI Configuration - scoring tables, risk matrix, level requirements and
//! weighting factors as operator-tunable TOML values
//!
//! Every section implements `Default` with the built-in engineering values,
//! so a missing config file or a missing section behaves exactly like the
//! shipped defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults::WEIGHT_SUM_TOLERANCE;
use crate::psv::PsvSettings;
use crate::risk_matrix::RiskMatrixConfig;
use crate::scoring::{params, ScoringTablesConfig};
use crate::types::{CofDimension, CriticalityLevel, EquipmentType, PerDimension, ServiceType};

/// Environment variable naming the config file to load.
pub const CONFIG_ENV_VAR: &str = "RBI_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "rbi_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for the RBI engine.
///
/// Load with `RbiConfig::load()` which searches:
/// 1. `$RBI_CONFIG` env var
/// 2. `./rbi_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RbiConfig {
    /// PoF and per-dimension CoF scoring tables
    #[serde(default)]
    pub scoring_tables: ScoringTablesConfig,

    /// Risk matrix, interval table and fallback safety factors
    #[serde(default)]
    pub risk_matrix: RiskMatrixConfig,

    /// Minimum data needed to run Level 2 / Level 3
    #[serde(default)]
    pub level_requirements: LevelRequirements,

    /// PoF / CoF weights
    #[serde(default)]
    pub weighting_factors: WeightingFactors,

    /// Behaviour when the requested level cannot be satisfied
    #[serde(default)]
    pub fallback: FallbackSettings,

    /// Feedback-learning settings
    #[serde(default)]
    pub learning: LearningSettings,

    /// Level 1 fixed-interval tables
    #[serde(default)]
    pub level1: Level1Settings,

    /// PSV Level 2 scoring
    #[serde(default)]
    pub psv: PsvSettings,
}

impl RbiConfig {
    /// Load configuration using the standard search order:
    /// 1. `$RBI_CONFIG` environment variable
    /// 2. `./rbi_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded RBI config from RBI_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from RBI_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "RBI_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./rbi_config.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded RBI config from ./rbi_config.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./rbi_config.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No rbi_config.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::TomlParse(None, err) => ConfigError::TomlParse(Some(path.to_path_buf()), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::TomlParse(None, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::TomlSerialize)
    }

    /// Save config to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "RBI config saved");
        Ok(())
    }

    /// Validate every section. All failures are collected before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let errors: Vec<String> = super::validation::validate_sections(self)
            .into_iter()
            .flat_map(|(section, errs)| errs.into_iter().map(move |e| format!("{section}: {e}")))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Level Requirements
// ============================================================================

/// Minimum evidence a level needs before it can run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRequirement {
    /// A measured corrosion rate must be present
    #[serde(default)]
    pub requires_corrosion_rate: bool,

    /// Minimum number of thickness readings
    #[serde(default)]
    pub min_thickness_measurements: usize,

    /// Minimum pieces of inspection evidence (findings, readings, last inspection)
    #[serde(default)]
    pub min_inspection_records: usize,
}

/// Per-level minimum data requirements. Level 1 has none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRequirements {
    #[serde(default = "default_level2_requirement")]
    pub level2: LevelRequirement,

    #[serde(default = "default_level3_requirement")]
    pub level3: LevelRequirement,
}

fn default_level2_requirement() -> LevelRequirement {
    LevelRequirement {
        requires_corrosion_rate: false,
        min_thickness_measurements: 0,
        min_inspection_records: 1,
    }
}

fn default_level3_requirement() -> LevelRequirement {
    LevelRequirement {
        requires_corrosion_rate: true,
        min_thickness_measurements: 3,
        min_inspection_records: 1,
    }
}

impl Default for LevelRequirements {
    fn default() -> Self {
        Self {
            level2: default_level2_requirement(),
            level3: default_level3_requirement(),
        }
    }
}

impl LevelRequirements {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let (l2, l3) = (&self.level2, &self.level3);

        if !l3.requires_corrosion_rate {
            errors.push("level3.requires_corrosion_rate must be true (remaining life needs a corrosion rate)".to_string());
        }
        if l3.min_thickness_measurements == 0 {
            errors.push("level3.min_thickness_measurements must be > 0".to_string());
        }
        if l3.min_thickness_measurements < l2.min_thickness_measurements {
            errors.push(format!(
                "level3.min_thickness_measurements ({}) must be >= level2 ({})",
                l3.min_thickness_measurements, l2.min_thickness_measurements
            ));
        }
        if l3.min_inspection_records < l2.min_inspection_records {
            errors.push(format!(
                "level3.min_inspection_records ({}) must be >= level2 ({})",
                l3.min_inspection_records, l2.min_inspection_records
            ));
        }
        errors
    }
}

// ============================================================================
// Weighting Factors
// ============================================================================

/// PoF parameter weights, CoF dimension weights and CoF parameter weights.
///
/// Each group must sum to 1.0. Tables may override their own weight; a
/// parameter missing from both gets weight 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightingFactors {
    #[serde(default = "default_pof_weights")]
    pub pof: BTreeMap<String, f64>,

    #[serde(default = "default_cof_dimension_weights")]
    pub cof_dimensions: PerDimension<f64>,

    #[serde(default = "default_cof_parameter_weights")]
    pub cof_parameters: PerDimension<BTreeMap<String, f64>>,
}

fn weight_map(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
}

fn default_pof_weights() -> BTreeMap<String, f64> {
    weight_map(&[
        (params::CORROSION_RATE, 0.25),
        (params::EQUIPMENT_AGE, 0.15),
        (params::DAMAGE_MECHANISMS, 0.20),
        (params::COATING_CONDITION, 0.10),
        (params::SERVICE_AGGRESSIVENESS, 0.10),
        (params::INSPECTION_EFFECTIVENESS, 0.10),
        (params::SEVERE_FINDINGS, 0.10),
    ])
}

fn default_cof_dimension_weights() -> PerDimension<f64> {
    PerDimension {
        safety: 0.4,
        environmental: 0.3,
        economic: 0.2,
        business: 0.1,
    }
}

fn default_cof_parameter_weights() -> PerDimension<BTreeMap<String, f64>> {
    PerDimension {
        safety: weight_map(&[(params::DESIGN_PRESSURE, 0.5), (params::SERVICE_HAZARD, 0.5)]),
        environmental: weight_map(&[
            (params::INVENTORY_SIZE, 0.6),
            (params::ENVIRONMENTAL_HAZARD, 0.4),
        ]),
        economic: weight_map(&[(params::CRITICALITY, 0.6), (params::EQUIPMENT_CLASS, 0.4)]),
        business: weight_map(&[(params::CRITICALITY, 0.7), (params::EQUIPMENT_CLASS, 0.3)]),
    }
}

impl Default for WeightingFactors {
    fn default() -> Self {
        Self {
            pof: default_pof_weights(),
            cof_dimensions: default_cof_dimension_weights(),
            cof_parameters: default_cof_parameter_weights(),
        }
    }
}

impl WeightingFactors {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        check_weight_group("pof", self.pof.iter().map(|(k, v)| (k.as_str(), *v)), &mut errors);
        check_weight_group(
            "cof_dimensions",
            self.cof_dimensions.iter().map(|(d, v)| (d.as_str(), *v)),
            &mut errors,
        );
        for dimension in CofDimension::ALL {
            let group = self.cof_parameters.get(dimension);
            // An empty group means "every parameter weighs 1.0"
            if group.is_empty() {
                continue;
            }
            check_weight_group(
                &format!("cof_parameters.{dimension}"),
                group.iter().map(|(k, v)| (k.as_str(), *v)),
                &mut errors,
            );
        }
        errors
    }
}

fn check_weight_group<'a>(
    name: &str,
    weights: impl Iterator<Item = (&'a str, f64)>,
    errors: &mut Vec<String>,
) {
    let mut sum = 0.0;
    for (key, w) in weights {
        if !w.is_finite() || w < 0.0 {
            errors.push(format!("{name}.{key} = {w} must be a finite value >= 0"));
            continue;
        }
        sum += w;
    }
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        errors.push(format!("{name} weights must sum to 1.0, got {sum:.3}"));
    }
}

// ============================================================================
// Fallback & Learning
// ============================================================================

/// What happens when the requested level cannot be satisfied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackSettings {
    /// Drop to the highest level the data supports
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval used when fallback is disabled and data is insufficient (months)
    #[serde(default = "default_emergency_interval")]
    pub emergency_interval_months: u32,

    /// Confidence reduction per level dropped (0-1)
    #[serde(default = "default_confidence_penalty")]
    pub confidence_penalty: f64,
}

fn default_true() -> bool { true }
fn default_emergency_interval() -> u32 { 6 }
fn default_confidence_penalty() -> f64 { 0.1 }

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            emergency_interval_months: default_emergency_interval(),
            confidence_penalty: default_confidence_penalty(),
        }
    }
}

impl FallbackSettings {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.emergency_interval_months == 0 {
            errors.push("emergency_interval_months must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence_penalty) {
            errors.push(format!(
                "confidence_penalty = {} must be within [0, 1]",
                self.confidence_penalty
            ));
        }
        errors
    }
}

/// Settings for comparing predictions against inspection outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Prediction accuracy below which recalibration is recommended (0-1)
    #[serde(default = "default_accuracy_threshold")]
    pub accuracy_threshold: f64,

    /// Inspection outcomes needed before accuracy is judged
    #[serde(default = "default_min_feedback_samples")]
    pub min_feedback_samples: u32,
}

fn default_accuracy_threshold() -> f64 { 0.8 }
fn default_min_feedback_samples() -> u32 { 10 }

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            accuracy_threshold: default_accuracy_threshold(),
            min_feedback_samples: default_min_feedback_samples(),
        }
    }
}

impl LearningSettings {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(0.0..=1.0).contains(&self.accuracy_threshold) {
            errors.push(format!(
                "accuracy_threshold = {} must be within [0, 1]",
                self.accuracy_threshold
            ));
        }
        if self.enabled && self.min_feedback_samples == 0 {
            errors.push("min_feedback_samples must be > 0 when learning is enabled".to_string());
        }
        errors
    }
}

// ============================================================================
// Level 1
// ============================================================================

/// Fixed-interval tables for Level 1.
///
/// `interval = base × service_modifier × criticality_modifier`, clamped to
/// `[min_interval_months, max_interval_months]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level1Settings {
    /// Base interval per equipment type (months)
    #[serde(default = "default_base_intervals")]
    pub base_intervals: BTreeMap<String, u32>,

    /// Base interval for types missing from `base_intervals` (months)
    #[serde(default = "default_base_interval")]
    pub default_base_interval_months: u32,

    /// Multiplier per service type (< 1 shortens the interval)
    #[serde(default = "default_service_modifiers")]
    pub service_modifiers: BTreeMap<String, f64>,

    /// Multiplier per criticality level
    #[serde(default = "default_criticality_modifiers")]
    pub criticality_modifiers: BTreeMap<String, f64>,

    #[serde(default = "default_level1_min")]
    pub min_interval_months: u32,

    #[serde(default = "default_level1_max")]
    pub max_interval_months: u32,
}

fn default_base_intervals() -> BTreeMap<String, u32> {
    [
        (EquipmentType::PressureVessel, 48),
        (EquipmentType::Piping, 36),
        (EquipmentType::HeatExchanger, 36),
        (EquipmentType::Pump, 24),
        (EquipmentType::Compressor, 24),
        (EquipmentType::Tank, 60),
    ]
    .into_iter()
    .map(|(t, m)| (t.as_str().to_string(), m))
    .collect()
}

fn default_base_interval() -> u32 { 36 }

fn default_service_modifiers() -> BTreeMap<String, f64> {
    [
        (ServiceType::SourGas, 0.5),
        (ServiceType::SweetGas, 0.9),
        (ServiceType::CrudeOil, 0.75),
        (ServiceType::RefinedProducts, 0.9),
        (ServiceType::Hydrogen, 0.6),
        (ServiceType::Steam, 0.9),
        (ServiceType::Water, 1.2),
        (ServiceType::Chemical, 0.7),
        (ServiceType::Other, 1.0),
    ]
    .into_iter()
    .map(|(s, m)| (s.as_str().to_string(), m))
    .collect()
}

fn default_criticality_modifiers() -> BTreeMap<String, f64> {
    [
        (CriticalityLevel::Critical, 0.5),
        (CriticalityLevel::High, 0.75),
        (CriticalityLevel::Medium, 1.0),
        (CriticalityLevel::Low, 1.25),
    ]
    .into_iter()
    .map(|(c, m)| (c.as_str().to_string(), m))
    .collect()
}

fn default_level1_min() -> u32 { 3 }
fn default_level1_max() -> u32 { 120 }

impl Default for Level1Settings {
    fn default() -> Self {
        Self {
            base_intervals: default_base_intervals(),
            default_base_interval_months: default_base_interval(),
            service_modifiers: default_service_modifiers(),
            criticality_modifiers: default_criticality_modifiers(),
            min_interval_months: default_level1_min(),
            max_interval_months: default_level1_max(),
        }
    }
}

impl Level1Settings {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (key, months) in &self.base_intervals {
            if !EquipmentType::ALL.iter().any(|t| t.as_str() == key) {
                errors.push(format!("base_intervals: unknown equipment type '{key}'"));
            }
            if *months == 0 {
                errors.push(format!("base_intervals.{key} must be > 0"));
            }
        }
        if self.default_base_interval_months == 0 {
            errors.push("default_base_interval_months must be > 0".to_string());
        }
        for (key, m) in &self.service_modifiers {
            if !ServiceType::ALL.iter().any(|s| s.as_str() == key) {
                errors.push(format!("service_modifiers: unknown service type '{key}'"));
            }
            if !m.is_finite() || *m <= 0.0 {
                errors.push(format!("service_modifiers.{key} = {m} must be > 0"));
            }
        }
        for (key, m) in &self.criticality_modifiers {
            if !CriticalityLevel::ALL.iter().any(|c| c.as_str() == key) {
                errors.push(format!("criticality_modifiers: unknown criticality '{key}'"));
            }
            if !m.is_finite() || *m <= 0.0 {
                errors.push(format!("criticality_modifiers.{key} = {m} must be > 0"));
            }
        }
        if self.min_interval_months == 0 {
            errors.push("min_interval_months must be > 0".to_string());
        }
        if self.min_interval_months > self.max_interval_months {
            errors.push(format!(
                "min_interval_months ({}) must be <= max_interval_months ({})",
                self.min_interval_months, self.max_interval_months
            ));
        }
        errors
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    TomlParse(Option<PathBuf>, toml::de::Error),
    TomlSerialize(toml::ser::Error),
    Json(serde_json::Error),
    UnknownSection(String),
    UnknownTemplate(String),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::TomlParse(Some(path), e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::TomlParse(None, e) => write!(f, "Config parse error: {}", e),
            ConfigError::TomlSerialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Json(e) => write!(f, "Config JSON error: {}", e),
            ConfigError::UnknownSection(section) => {
                write!(f, "Unknown config section '{}'", section)
            }
            ConfigError::UnknownTemplate(name) => write!(
                f,
                "Unknown configuration template '{}' (expected conservative, balanced or aggressive)",
                name
            ),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RbiConfig::default();
        assert!(config.validate().is_ok(), "{:?}", config.validate());
    }

    #[test]
    fn test_weights_not_summing_to_one_rejected() {
        let mut config = RbiConfig::default();
        config.weighting_factors.cof_dimensions.safety = 0.9;
        let err = config.validate().expect_err("weights sum to 1.5");
        match err {
            ConfigError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.contains("cof_dimensions")));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_zero_emergency_interval_rejected() {
        let fallback = FallbackSettings {
            emergency_interval_months: 0,
            ..Default::default()
        };
        assert_eq!(fallback.validate().len(), 1);
    }

    #[test]
    fn test_accuracy_threshold_range() {
        let learning = LearningSettings {
            accuracy_threshold: 1.5,
            ..Default::default()
        };
        assert!(!learning.validate().is_empty());
    }

    #[test]
    fn test_level1_unknown_equipment_type() {
        let mut l1 = Level1Settings::default();
        l1.base_intervals.insert("boiler".to_string(), 12);
        let errors = l1.validate();
        assert!(errors.iter().any(|e| e.contains("boiler")), "{errors:?}");
    }

    #[test]
    fn test_level_requirements_level3_needs_thickness() {
        let mut req = LevelRequirements::default();
        req.level3.min_thickness_measurements = 0;
        assert!(!req.validate().is_empty());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RbiConfig::default();
        let toml_str = config.to_toml().expect("serializes");
        let parsed = RbiConfig::from_toml_str(&toml_str).expect("parses");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[fallback]
emergency_interval_months = 4
"#;
        let config = RbiConfig::from_toml_str(toml_str).expect("valid");
        assert_eq!(config.fallback.emergency_interval_months, 4);
        assert!(config.fallback.enabled);
        assert_eq!(config.risk_matrix, RiskMatrixConfig::default());
    }

    #[test]
    fn test_invalid_toml_values_rejected() {
        let toml_str = r#"
[learning]
accuracy_threshold = 2.0
"#;
        assert!(matches!(
            RbiConfig::from_toml_str(toml_str),
            Err(ConfigError::Validation(_))
        ));
    }
}
