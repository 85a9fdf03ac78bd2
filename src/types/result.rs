//! Calculation levels, risk levels, consequence dimensions and the result record

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// RBI calculation level, in increasing order of sophistication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CalculationLevel {
    Level1 = 1,
    Level2 = 2,
    Level3 = 3,
}

impl CalculationLevel {
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// The next simpler level, or `None` for Level 1.
    pub const fn lower(self) -> Option<Self> {
        match self {
            Self::Level3 => Some(Self::Level2),
            Self::Level2 => Some(Self::Level1),
            Self::Level1 => None,
        }
    }
}

impl std::fmt::Display for CalculationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Level {}", self.number())
    }
}

/// Qualitative risk level produced by the risk matrix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RiskLevel {
    Low = 0,
    Medium = 1,
    High = 2,
    VeryHigh = 3,
}

impl RiskLevel {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::VeryHigh];
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::VeryHigh => write!(f, "VERY HIGH"),
        }
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Medium
    }
}

// ============================================================================
// Consequence dimensions
// ============================================================================

/// Consequence-of-failure dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CofDimension {
    Safety,
    Environmental,
    Economic,
    Business,
}

impl CofDimension {
    pub const ALL: [Self; 4] = [
        Self::Safety,
        Self::Environmental,
        Self::Economic,
        Self::Business,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safety => "safety",
            Self::Environmental => "environmental",
            Self::Economic => "economic",
            Self::Business => "business",
        }
    }
}

impl std::fmt::Display for CofDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per consequence dimension.
///
/// Serialized as a plain table (`safety = ..`, `environmental = ..`) so it
/// round-trips through TOML as well as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerDimension<T> {
    #[serde(default)]
    pub safety: T,
    #[serde(default)]
    pub environmental: T,
    #[serde(default)]
    pub economic: T,
    #[serde(default)]
    pub business: T,
}

impl<T> PerDimension<T> {
    pub fn from_fn(mut f: impl FnMut(CofDimension) -> T) -> Self {
        Self {
            safety: f(CofDimension::Safety),
            environmental: f(CofDimension::Environmental),
            economic: f(CofDimension::Economic),
            business: f(CofDimension::Business),
        }
    }

    pub const fn get(&self, dimension: CofDimension) -> &T {
        match dimension {
            CofDimension::Safety => &self.safety,
            CofDimension::Environmental => &self.environmental,
            CofDimension::Economic => &self.economic,
            CofDimension::Business => &self.business,
        }
    }

    pub fn get_mut(&mut self, dimension: CofDimension) -> &mut T {
        match dimension {
            CofDimension::Safety => &mut self.safety,
            CofDimension::Environmental => &mut self.environmental,
            CofDimension::Economic => &mut self.economic,
            CofDimension::Business => &mut self.business,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CofDimension, &T)> {
        CofDimension::ALL.into_iter().map(move |d| (d, self.get(d)))
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> PerDimension<U> {
        PerDimension {
            safety: f(self.safety),
            environmental: f(self.environmental),
            economic: f(self.economic),
            business: f(self.business),
        }
    }
}

impl PerDimension<f64> {
    /// Weighted average using `weights`. Falls back to a plain mean when the
    /// weights sum to zero.
    pub fn weighted_average(&self, weights: &PerDimension<f64>) -> f64 {
        let total_weight: f64 = weights.iter().map(|(_, w)| w.max(0.0)).sum();
        if total_weight <= 0.0 {
            return self.mean();
        }
        self.iter()
            .map(|(d, v)| v * weights.get(d).max(0.0))
            .sum::<f64>()
            / total_weight
    }

    pub fn mean(&self) -> f64 {
        self.iter().map(|(_, v)| *v).sum::<f64>() / CofDimension::ALL.len() as f64
    }
}

// ============================================================================
// Parameter values
// ============================================================================

/// A raw input to a scoring table: a measured number or a categorical label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Number(f64),
    Category(String),
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Number(v)
    }
}

impl From<usize> for ParameterValue {
    fn from(v: usize) -> Self {
        ParameterValue::Number(v as f64)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::Category(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        ParameterValue::Category(v)
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Number(n) => write!(f, "{n}"),
            ParameterValue::Category(c) => f.write_str(c),
        }
    }
}

/// Named parameter values fed to the scoring tables.
pub type ParameterSet = BTreeMap<String, ParameterValue>;

// ============================================================================
// Calculation result
// ============================================================================

/// Outcome of one RBI calculation for one equipment item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbiCalculationResult {
    pub equipment_id: String,
    /// Level actually executed
    pub calculation_level: CalculationLevel,
    /// Level the caller asked for
    pub requested_level: CalculationLevel,
    pub fallback_occurred: bool,
    pub next_inspection_date: NaiveDate,
    pub risk_level: RiskLevel,
    /// Probability-of-failure score (0-5)
    pub pof_score: f64,
    /// Consequence score per dimension (0-5)
    pub cof_scores: PerDimension<f64>,
    /// Weighted by the CoF dimension weights
    pub overall_cof_score: f64,
    /// 0-1
    pub confidence_score: f64,
    /// 0-1
    pub data_quality_score: f64,
    pub calculation_timestamp: DateTime<Utc>,
    /// Audit snapshot of the inputs that drove the result
    pub input_parameters: ParameterSet,
    pub missing_data: Vec<String>,
    pub estimated_parameters: Vec<String>,
    pub inspection_interval_months: u32,
}

impl RbiCalculationResult {
    /// True when both results agree on everything except the timestamp.
    pub fn same_outcome(&self, other: &Self) -> bool {
        let mut a = self.clone();
        a.calculation_timestamp = other.calculation_timestamp;
        a == *other
    }
}
