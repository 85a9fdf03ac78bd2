//! Scoring Tables
//!
//! Maps raw parameter values onto integer scores 1-5 for the probability and
//! consequence dimensions, and combines per-parameter scores into a weighted
//! average.
//!
//! ## Condition keys
//!
//! | Key       | Matches                  |
//! |-----------|--------------------------|
//! | `"<N"`    | value < N                |
//! | `">N"`    | value > N                |
//! | `"A-B"`   | A ≤ value ≤ B            |
//! | any other | categorical label (case-insensitive) |
//!
//! Rules are tried in order and the first match wins. A numeric value that
//! matches no range scores 3 (unknown → medium risk); an unrecognised label
//! scores the table's `default_score`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::defaults::{SCORE_RANGE, UNMATCHED_NUMERIC_SCORE};
use crate::config::{RbiConfig, WeightingFactors};
use crate::types::{CofDimension, ParameterSet, ParameterValue, PerDimension};

/// Parameter names understood by the built-in tables.
pub mod params {
    // === Probability of failure ===
    pub const CORROSION_RATE: &str = "corrosion_rate";
    pub const EQUIPMENT_AGE: &str = "equipment_age";
    pub const DAMAGE_MECHANISMS: &str = "damage_mechanisms";
    pub const COATING_CONDITION: &str = "coating_condition";
    pub const SERVICE_AGGRESSIVENESS: &str = "service_aggressiveness";
    pub const INSPECTION_EFFECTIVENESS: &str = "inspection_effectiveness";
    pub const SEVERE_FINDINGS: &str = "severe_findings";

    // === Consequence of failure ===
    pub const DESIGN_PRESSURE: &str = "design_pressure";
    pub const SERVICE_HAZARD: &str = "service_hazard";
    pub const INVENTORY_SIZE: &str = "inventory_size";
    pub const ENVIRONMENTAL_HAZARD: &str = "environmental_hazard";
    pub const CRITICALITY: &str = "criticality";
    pub const EQUIPMENT_CLASS: &str = "equipment_class";

    // === PSV ===
    pub const POP_TEST_DEVIATION: &str = "pop_test_deviation";
    pub const LEAK_TEST_DEVIATION: &str = "leak_test_deviation";
}

/// Errors raised when constructing or installing an invalid scoring table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring table parameter_name must not be empty")]
    EmptyParameterName,

    #[error("scoring table '{0}' has no rules")]
    NoRules(String),

    #[error("scoring table '{parameter}': score {score} for '{condition}' is outside 1-5")]
    ScoreOutOfRange {
        parameter: String,
        condition: String,
        score: u8,
    },

    #[error("scoring table '{parameter}': default score {score} is outside 1-5")]
    DefaultScoreOutOfRange { parameter: String, score: u8 },

    #[error("scoring table '{parameter}': weight {weight} must be a finite value > 0")]
    InvalidWeight { parameter: String, weight: f64 },
}

// ============================================================================
// Conditions
// ============================================================================

/// Parsed form of a numeric condition key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericCondition {
    LessThan(f64),
    GreaterThan(f64),
    Between(f64, f64),
}

impl NumericCondition {
    /// Parse `"<N"`, `">N"` or `"A-B"`. Returns `None` for categorical keys.
    pub fn parse(key: &str) -> Option<Self> {
        let s = key.trim();
        if let Some(rest) = s.strip_prefix('<') {
            return rest.trim().parse().ok().map(Self::LessThan);
        }
        if let Some(rest) = s.strip_prefix('>') {
            return rest.trim().parse().ok().map(Self::GreaterThan);
        }
        // Skip the first char so a negative lower bound is not taken as the separator
        let split_at = s
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '-')
            .map(|(i, _)| i)?;
        let low: f64 = s[..split_at].trim().parse().ok()?;
        let high: f64 = s[split_at + 1..].trim().parse().ok()?;
        Some(Self::Between(low, high))
    }

    pub fn matches(self, value: f64) -> bool {
        match self {
            Self::LessThan(n) => value < n,
            Self::GreaterThan(n) => value > n,
            Self::Between(a, b) => a <= value && value <= b,
        }
    }
}

// ============================================================================
// Scoring table
// ============================================================================

/// One condition → score entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRule {
    pub condition: String,
    pub score: u8,
}

fn default_table_score() -> u8 {
    3
}

/// Maps values of a single parameter to scores 1-5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTable {
    pub parameter_name: String,
    pub rules: Vec<ScoringRule>,
    /// Score for unrecognised categorical labels
    #[serde(default = "default_table_score")]
    pub default_score: u8,
    /// Explicit weight, overriding the `WeightingFactors` entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default)]
    pub description: String,
}

impl ScoringTable {
    /// Build a validated table. Any score outside 1-5 is rejected.
    pub fn new<K: Into<String>>(
        parameter_name: impl Into<String>,
        rules: impl IntoIterator<Item = (K, u8)>,
    ) -> Result<Self, ScoringError> {
        let table = Self::unchecked(parameter_name, rules);
        table.check()?;
        Ok(table)
    }

    pub(crate) fn unchecked<K: Into<String>>(
        parameter_name: impl Into<String>,
        rules: impl IntoIterator<Item = (K, u8)>,
    ) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            rules: rules
                .into_iter()
                .map(|(condition, score)| ScoringRule {
                    condition: condition.into(),
                    score,
                })
                .collect(),
            default_score: default_table_score(),
            weight: None,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set an explicit table weight. Rejects non-positive values.
    pub fn with_weight(mut self, weight: f64) -> Result<Self, ScoringError> {
        self.weight = Some(weight);
        self.check()?;
        Ok(self)
    }

    /// Set the categorical fallback score. Rejects scores outside 1-5.
    pub fn with_default_score(mut self, score: u8) -> Result<Self, ScoringError> {
        self.default_score = score;
        self.check()?;
        Ok(self)
    }

    /// Score a value with the fail-safe defaults described in the module docs.
    pub fn score(&self, value: &ParameterValue) -> u8 {
        match value {
            ParameterValue::Number(v) => self.numeric_score(*v),
            ParameterValue::Category(label) => self.categorical_score(label),
        }
    }

    fn numeric_score(&self, value: f64) -> u8 {
        self.rules
            .iter()
            .find(|rule| {
                NumericCondition::parse(&rule.condition).is_some_and(|c| c.matches(value))
            })
            .map_or(UNMATCHED_NUMERIC_SCORE, |rule| rule.score)
    }

    fn categorical_score(&self, label: &str) -> u8 {
        let label = label.trim();
        self.rules
            .iter()
            .find(|rule| rule.condition.trim().eq_ignore_ascii_case(label))
            .map_or(self.default_score, |rule| rule.score)
    }

    /// First violation, for constructors.
    fn check(&self) -> Result<(), ScoringError> {
        self.violations().into_iter().next().map_or(Ok(()), Err)
    }

    /// Every violation of the table invariants.
    pub fn violations(&self) -> Vec<ScoringError> {
        let mut errors = Vec::new();
        let (lo, hi) = SCORE_RANGE;

        if self.parameter_name.trim().is_empty() {
            errors.push(ScoringError::EmptyParameterName);
        }
        if self.rules.is_empty() {
            errors.push(ScoringError::NoRules(self.parameter_name.clone()));
        }
        for rule in &self.rules {
            if !(lo..=hi).contains(&rule.score) {
                errors.push(ScoringError::ScoreOutOfRange {
                    parameter: self.parameter_name.clone(),
                    condition: rule.condition.clone(),
                    score: rule.score,
                });
            }
        }
        if !(lo..=hi).contains(&self.default_score) {
            errors.push(ScoringError::DefaultScoreOutOfRange {
                parameter: self.parameter_name.clone(),
                score: self.default_score,
            });
        }
        if let Some(w) = self.weight {
            if !w.is_finite() || w <= 0.0 {
                errors.push(ScoringError::InvalidWeight {
                    parameter: self.parameter_name.clone(),
                    weight: w,
                });
            }
        }
        errors
    }
}

// ============================================================================
// Table collection (config section)
// ============================================================================

/// All PoF tables plus CoF tables per dimension, keyed by parameter name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTablesConfig {
    #[serde(default)]
    pub pof: BTreeMap<String, ScoringTable>,
    #[serde(default)]
    pub cof: PerDimension<BTreeMap<String, ScoringTable>>,
}

impl Default for ScoringTablesConfig {
    fn default() -> Self {
        use params::*;

        let pof = keyed([
            ScoringTable::unchecked(
                CORROSION_RATE,
                [("0-0.05", 1), ("0.05-0.1", 2), ("0.1-0.2", 3), ("0.2-0.5", 4), (">0.5", 5)],
            )
            .with_description("Corrosion rate (mm/year)"),
            ScoringTable::unchecked(
                EQUIPMENT_AGE,
                [("0-5", 1), ("5-10", 2), ("10-20", 3), ("20-30", 4), (">30", 5)],
            )
            .with_description("Equipment age (years)"),
            ScoringTable::unchecked(
                DAMAGE_MECHANISMS,
                [("0-0", 1), ("1-1", 2), ("2-2", 3), ("3-3", 4), (">3", 5)],
            )
            .with_description("Number of active damage mechanisms"),
            ScoringTable::unchecked(
                COATING_CONDITION,
                [("excellent", 1), ("good", 2), ("moderate", 3), ("poor", 5)],
            )
            .with_description("Coating condition at last inspection"),
            ScoringTable::unchecked(SERVICE_AGGRESSIVENESS, service_scores([5, 2, 4, 3, 4, 3, 2, 4, 3]))
                .with_description("Corrosivity of the process service"),
            ScoringTable::unchecked(
                INSPECTION_EFFECTIVENESS,
                [("excellent", 1), ("good", 2), ("average", 3), ("poor", 4)],
            )
            .with_description("Effectiveness of the last inspection"),
            ScoringTable::unchecked(SEVERE_FINDINGS, [("0-0", 1), ("1-1", 3), (">1", 5)])
                .with_description("Open High/Critical inspection findings"),
        ]);

        let cof = PerDimension {
            safety: keyed([
                ScoringTable::unchecked(
                    DESIGN_PRESSURE,
                    [("<10", 1), ("10-25", 2), ("25-50", 3), ("50-100", 4), (">100", 5)],
                )
                .with_description("Design pressure (bar)"),
                ScoringTable::unchecked(SERVICE_HAZARD, service_scores([5, 3, 4, 4, 5, 3, 1, 4, 3]))
                    .with_description("Toxicity / flammability of the service"),
            ]),
            environmental: keyed([
                ScoringTable::unchecked(
                    INVENTORY_SIZE,
                    [
                        ("<1000", 1),
                        ("1000-5000", 2),
                        ("5000-20000", 3),
                        ("20000-50000", 4),
                        (">50000", 5),
                    ],
                )
                .with_description("Releasable inventory (kg)"),
                ScoringTable::unchecked(
                    ENVIRONMENTAL_HAZARD,
                    service_scores([5, 2, 5, 4, 2, 1, 1, 5, 3]),
                )
                .with_description("Environmental impact of a release"),
            ]),
            economic: keyed([criticality_table(), equipment_class_table()]),
            business: keyed([criticality_table(), equipment_class_table()]),
        };

        Self { pof, cof }
    }
}

fn keyed<const N: usize>(tables: [ScoringTable; N]) -> BTreeMap<String, ScoringTable> {
    tables
        .into_iter()
        .map(|t| (t.parameter_name.clone(), t))
        .collect()
}

/// Scores in `ServiceType::ALL` order.
fn service_scores(scores: [u8; 9]) -> Vec<(&'static str, u8)> {
    crate::types::ServiceType::ALL
        .iter()
        .zip(scores)
        .map(|(s, score)| (s.as_str(), score))
        .collect()
}

fn criticality_table() -> ScoringTable {
    ScoringTable::unchecked(
        params::CRITICALITY,
        [("critical", 5), ("high", 4), ("medium", 3), ("low", 1)],
    )
    .with_description("Asset criticality ranking")
}

fn equipment_class_table() -> ScoringTable {
    ScoringTable::unchecked(
        params::EQUIPMENT_CLASS,
        [
            ("compressor", 5),
            ("heat_exchanger", 4),
            ("pressure_vessel", 4),
            ("pump", 3),
            ("piping", 3),
            ("tank", 3),
        ],
    )
    .with_description("Replacement cost / lead time of the equipment class")
}

/// Every violation across all tables, as human-readable strings.
pub fn validate_tables(tables: &ScoringTablesConfig) -> Vec<String> {
    let mut errors = Vec::new();
    let mut check = |scope: &str, key: &str, table: &ScoringTable| {
        if key != table.parameter_name {
            errors.push(format!(
                "{scope}: table key '{key}' does not match parameter_name '{}'",
                table.parameter_name
            ));
        }
        errors.extend(
            table
                .violations()
                .into_iter()
                .map(|e| format!("{scope}: {e}")),
        );
    };

    for (key, table) in &tables.pof {
        check("pof", key, table);
    }
    for (dimension, dim_tables) in tables.cof.iter() {
        let scope = format!("cof.{dimension}");
        for (key, table) in dim_tables {
            check(&scope, key, table);
        }
    }
    errors
}

// ============================================================================
// Service
// ============================================================================

/// Looks up tables and computes weighted PoF / CoF scores.
#[derive(Debug, Clone)]
pub struct ScoringTablesService {
    tables: ScoringTablesConfig,
    weights: WeightingFactors,
}

impl ScoringTablesService {
    pub fn new(tables: ScoringTablesConfig, weights: WeightingFactors) -> Self {
        Self { tables, weights }
    }

    pub fn from_config(config: &RbiConfig) -> Self {
        Self::new(config.scoring_tables.clone(), config.weighting_factors.clone())
    }

    pub fn tables(&self) -> &ScoringTablesConfig {
        &self.tables
    }

    pub fn get_pof_table(&self, name: &str) -> Option<&ScoringTable> {
        self.tables.pof.get(name)
    }

    pub fn get_cof_table(&self, dimension: CofDimension, name: &str) -> Option<&ScoringTable> {
        self.tables.cof.get(dimension).get(name)
    }

    /// Install or replace a PoF table.
    pub fn set_pof_table(&mut self, table: ScoringTable) -> Result<(), ScoringError> {
        table.check()?;
        self.tables.pof.insert(table.parameter_name.clone(), table);
        Ok(())
    }

    /// Install or replace a CoF table for one dimension.
    pub fn set_cof_table(
        &mut self,
        dimension: CofDimension,
        table: ScoringTable,
    ) -> Result<(), ScoringError> {
        table.check()?;
        self.tables
            .cof
            .get_mut(dimension)
            .insert(table.parameter_name.clone(), table);
        Ok(())
    }

    /// Weight for a table: explicit table weight, then the configured default
    /// for (dimension, parameter), then 1.0.
    pub fn parameter_weight(&self, dimension: Option<CofDimension>, table: &ScoringTable) -> f64 {
        if let Some(w) = table.weight {
            return w;
        }
        let defaults = match dimension {
            None => &self.weights.pof,
            Some(d) => self.weights.cof_parameters.get(d),
        };
        defaults.get(&table.parameter_name).copied().unwrap_or(1.0)
    }

    /// Weighted PoF score over the parameters that have a table. 0.0 if none match.
    pub fn calculate_pof_score(&self, values: &ParameterSet) -> f64 {
        self.weighted_score(None, &self.tables.pof, values)
    }

    /// Weighted CoF score for one dimension. 0.0 if no parameter matches.
    pub fn calculate_cof_score(&self, dimension: CofDimension, values: &ParameterSet) -> f64 {
        self.weighted_score(Some(dimension), self.tables.cof.get(dimension), values)
    }

    /// CoF score for every dimension.
    pub fn calculate_cof_scores(&self, values: &PerDimension<ParameterSet>) -> PerDimension<f64> {
        PerDimension::from_fn(|d| self.calculate_cof_score(d, values.get(d)))
    }

    fn weighted_score(
        &self,
        dimension: Option<CofDimension>,
        tables: &BTreeMap<String, ScoringTable>,
        values: &ParameterSet,
    ) -> f64 {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for (name, value) in values {
            let Some(table) = tables.get(name) else {
                continue;
            };
            let weight = self.parameter_weight(dimension, table);
            if !(weight > 0.0) {
                continue;
            }
            let score = table.score(value);
            debug!(
                parameter = %name,
                value = %value,
                score,
                weight,
                dimension = ?dimension,
                "Scored parameter"
            );
            weighted_sum += f64::from(score) * weight;
            total_weight += weight;
        }

        if total_weight > 0.0 {
            weighted_sum / total_weight
        } else {
            0.0
        }
    }

    /// Every table violation, one string each. Never stops at the first.
    pub fn validate_configuration(&self) -> Vec<String> {
        validate_tables(&self.tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ScoringTablesService {
        ScoringTablesService::from_config(&RbiConfig::default())
    }

    #[test]
    fn test_condition_parsing() {
        assert_eq!(NumericCondition::parse("<5"), Some(NumericCondition::LessThan(5.0)));
        assert_eq!(NumericCondition::parse("> 0.5"), Some(NumericCondition::GreaterThan(0.5)));
        assert_eq!(
            NumericCondition::parse("0-0.05"),
            Some(NumericCondition::Between(0.0, 0.05))
        );
        assert_eq!(
            NumericCondition::parse("-5-10"),
            Some(NumericCondition::Between(-5.0, 10.0))
        );
        assert_eq!(NumericCondition::parse("poor"), None);
    }

    #[test]
    fn test_score_ten_rejected() {
        let result = ScoringTable::new("corrosion_rate", [("0-1", 10)]);
        assert!(matches!(result, Err(ScoringError::ScoreOutOfRange { score: 10, .. })));
    }

    #[test]
    fn test_score_zero_rejected() {
        assert!(ScoringTable::new("x", [("a", 0)]).is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert_eq!(
            ScoringTable::new("", [("a", 2)]),
            Err(ScoringError::EmptyParameterName)
        );
    }

    #[test]
    fn test_numeric_lookup_syntaxes() {
        let table = ScoringTable::new("cr", [("<0.1", 1), ("0.1-0.5", 3), (">0.5", 5)]).expect("valid");
        assert_eq!(table.score(&0.05_f64.into()), 1);
        assert_eq!(table.score(&0.1_f64.into()), 3);
        assert_eq!(table.score(&0.5_f64.into()), 3);
        assert_eq!(table.score(&0.51_f64.into()), 5);
    }

    #[test]
    fn test_unmatched_numeric_defaults_to_three() {
        let table = ScoringTable::new("cr", [("0-1", 1)])
            .expect("valid")
            .with_default_score(5)
            .expect("valid");
        // Numeric misses ignore the categorical default
        assert_eq!(table.score(&7.0_f64.into()), 3);
    }

    #[test]
    fn test_categorical_lookup_case_insensitive_with_default() {
        let table = ScoringTable::new("coating", [("good", 2), ("poor", 5)])
            .expect("valid")
            .with_default_score(4)
            .expect("valid");
        assert_eq!(table.score(&"POOR".into()), 5);
        assert_eq!(table.score(&"unknown".into()), 4);
    }

    #[test]
    fn test_pof_score_ignores_unknown_parameters() {
        let svc = service();
        let mut values = ParameterSet::new();
        values.insert("not_a_table".to_string(), 3.0_f64.into());
        assert_eq!(svc.calculate_pof_score(&values), 0.0);

        values.insert(params::CORROSION_RATE.to_string(), 0.6_f64.into());
        assert_eq!(svc.calculate_pof_score(&values), 5.0);
    }

    #[test]
    fn test_pof_score_weighted_average() {
        let svc = service();
        let mut values = ParameterSet::new();
        // corrosion_rate weight 0.25 → score 5; equipment_age weight 0.15 → score 1
        values.insert(params::CORROSION_RATE.to_string(), 0.6_f64.into());
        values.insert(params::EQUIPMENT_AGE.to_string(), 2.0_f64.into());
        let expected = (5.0 * 0.25 + 1.0 * 0.15) / 0.40;
        assert!((svc.calculate_pof_score(&values) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_explicit_table_weight_takes_precedence() {
        let mut svc = service();
        let table = ScoringTable::new(params::CORROSION_RATE, [(">0", 5)])
            .expect("valid")
            .with_weight(9.0)
            .expect("valid");
        svc.set_pof_table(table).expect("valid");
        let table = svc.get_pof_table(params::CORROSION_RATE).expect("installed");
        assert_eq!(svc.parameter_weight(None, table), 9.0);
    }

    #[test]
    fn test_unweighted_parameter_defaults_to_one() {
        let mut svc = service();
        svc.set_pof_table(ScoringTable::new("vibration", [(">0", 4)]).expect("valid"))
            .expect("valid");
        let table = svc.get_pof_table("vibration").expect("installed");
        assert_eq!(svc.parameter_weight(None, table), 1.0);
    }

    #[test]
    fn test_cof_score_per_dimension() {
        let svc = service();
        let mut values = ParameterSet::new();
        values.insert(params::CRITICALITY.to_string(), "critical".into());
        assert_eq!(svc.calculate_cof_score(CofDimension::Economic, &values), 5.0);
        assert_eq!(svc.calculate_cof_score(CofDimension::Safety, &values), 0.0);
        assert!(svc.get_cof_table(CofDimension::Safety, params::DESIGN_PRESSURE).is_some());
    }

    #[test]
    fn test_defaults_validate_clean() {
        let errors = service().validate_configuration();
        assert!(errors.is_empty(), "Default tables should be valid: {errors:?}");
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut tables = ScoringTablesConfig::default();
        tables.pof.insert(
            "bad".to_string(),
            ScoringTable {
                parameter_name: "bad".to_string(),
                rules: vec![
                    ScoringRule { condition: "a".into(), score: 9 },
                    ScoringRule { condition: "b".into(), score: 0 },
                ],
                default_score: 3,
                weight: None,
                description: String::new(),
            },
        );
        let errors = validate_tables(&tables);
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors.iter().all(|e| e.starts_with("pof:")));
    }

    #[test]
    fn test_mismatched_key_reported() {
        let mut tables = ScoringTablesConfig::default();
        let table = ScoringTable::new("actual", [("a", 2)]).expect("valid");
        tables.cof.safety.insert("other".to_string(), table);
        let errors = validate_tables(&tables);
        assert!(errors.iter().any(|e| e.contains("does not match")));
    }
}
