//! Risk Matrix
//!
//! Maps (PoF band, CoF band) to a qualitative [`RiskLevel`], risk level to an
//! inspection interval, and carries the safety factors applied when a
//! calculation falls back to a simpler level.
//!
//! Lookup misses are never errors: an unmapped or unparseable band pair is
//! Medium risk, an unset interval is 24 months.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::config::defaults::{
    DEFAULT_INSPECTION_INTERVAL_MONTHS, MATRIX_INTERVAL_RANGE, MIN_INTERVAL_MONTHS,
};
use crate::types::{CalculationLevel, RiskLevel};

// ============================================================================
// Bands & presets
// ============================================================================

/// Three-level band for one matrix axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Band for a 0-5 score: up to 2.0 is Low, up to 3.5 Medium, above High.
    pub fn from_score(score: f64) -> Self {
        if score <= 2.0 {
            Self::Low
        } else if score <= 3.5 {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl std::fmt::Display for RiskBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskBand {
    type Err = RiskMatrixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(RiskMatrixError::UnknownBand(s.to_string())),
        }
    }
}

/// Named bulk configurations for the matrix and interval table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixPreset {
    Conservative,
    Balanced,
    Aggressive,
}

impl MatrixPreset {
    pub const ALL: [Self; 3] = [Self::Conservative, Self::Balanced, Self::Aggressive];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Balanced => "balanced",
            Self::Aggressive => "aggressive",
        }
    }

    /// Risk level per (PoF, CoF) pair, rows ordered Low/Medium/High PoF.
    const fn grid(self) -> [[RiskLevel; 3]; 3] {
        use RiskLevel::{High as H, Low as L, Medium as M, VeryHigh as V};
        match self {
            Self::Conservative => [[L, M, H], [M, H, V], [H, V, V]],
            Self::Balanced => [[L, L, M], [L, M, H], [M, H, V]],
            Self::Aggressive => [[L, L, L], [L, L, M], [M, M, H]],
        }
    }

    pub const fn inspection_intervals(self) -> InspectionIntervals {
        match self {
            Self::Conservative => InspectionIntervals::new(24, 18, 9, 3),
            Self::Balanced => InspectionIntervals::new(36, 24, 12, 6),
            Self::Aggressive => InspectionIntervals::new(60, 36, 18, 9),
        }
    }

    pub fn cells(self) -> Vec<RiskMatrixCell> {
        let grid = self.grid();
        let mut cells = Vec::with_capacity(9);
        for (row, pof) in RiskBand::ALL.into_iter().enumerate() {
            for (col, cof) in RiskBand::ALL.into_iter().enumerate() {
                cells.push(RiskMatrixCell {
                    pof,
                    cof,
                    risk: grid[row][col],
                });
            }
        }
        cells
    }
}

impl std::fmt::Display for MatrixPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatrixPreset {
    type Err = RiskMatrixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| RiskMatrixError::UnknownPreset(s.to_string()))
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskMatrixError {
    #[error("inspection interval for {level} risk must be > 0, got {months}")]
    InvalidInterval { level: RiskLevel, months: u32 },

    #[error("safety factor '{scenario}' must be a positive finite number, got {factor}")]
    InvalidSafetyFactor { scenario: String, factor: f64 },

    #[error("unknown risk band '{0}'")]
    UnknownBand(String),

    #[error("unknown matrix preset '{0}'")]
    UnknownPreset(String),
}

// ============================================================================
// Config section
// ============================================================================

/// One matrix entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskMatrixCell {
    pub pof: RiskBand,
    pub cof: RiskBand,
    pub risk: RiskLevel,
}

/// Inspection interval per risk level (months).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionIntervals {
    #[serde(default = "default_low_interval")]
    pub low: u32,
    #[serde(default = "default_medium_interval")]
    pub medium: u32,
    #[serde(default = "default_high_interval")]
    pub high: u32,
    #[serde(default = "default_very_high_interval")]
    pub very_high: u32,
}

fn default_low_interval() -> u32 { 36 }
fn default_medium_interval() -> u32 { 24 }
fn default_high_interval() -> u32 { 12 }
fn default_very_high_interval() -> u32 { 6 }

impl InspectionIntervals {
    pub const fn new(low: u32, medium: u32, high: u32, very_high: u32) -> Self {
        Self {
            low,
            medium,
            high,
            very_high,
        }
    }

    pub const fn get(&self, level: RiskLevel) -> u32 {
        match level {
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::VeryHigh => self.very_high,
        }
    }

    fn slot_mut(&mut self, level: RiskLevel) -> &mut u32 {
        match level {
            RiskLevel::Low => &mut self.low,
            RiskLevel::Medium => &mut self.medium,
            RiskLevel::High => &mut self.high,
            RiskLevel::VeryHigh => &mut self.very_high,
        }
    }
}

impl Default for InspectionIntervals {
    fn default() -> Self {
        MatrixPreset::Balanced.inspection_intervals()
    }
}

/// Scenario name for a fallback from `requested` to `achieved`,
/// e.g. `level3_to_level1`.
pub fn fallback_scenario(requested: CalculationLevel, achieved: CalculationLevel) -> String {
    format!("level{}_to_level{}", requested.number(), achieved.number())
}

fn default_cells() -> Vec<RiskMatrixCell> {
    MatrixPreset::Balanced.cells()
}

fn default_safety_factors() -> BTreeMap<String, f64> {
    use CalculationLevel::{Level1, Level2, Level3};
    [
        (fallback_scenario(Level3, Level2), 1.2),
        (fallback_scenario(Level3, Level1), 1.5),
        (fallback_scenario(Level2, Level1), 1.3),
    ]
    .into_iter()
    .collect()
}

/// Risk matrix section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMatrixConfig {
    #[serde(default = "default_cells")]
    pub cells: Vec<RiskMatrixCell>,

    #[serde(default)]
    pub inspection_intervals: InspectionIntervals,

    /// Scenario → divisor applied to the interval on fallback
    #[serde(default = "default_safety_factors")]
    pub fallback_safety_factors: BTreeMap<String, f64>,
}

impl Default for RiskMatrixConfig {
    fn default() -> Self {
        Self {
            cells: default_cells(),
            inspection_intervals: InspectionIntervals::default(),
            fallback_safety_factors: default_safety_factors(),
        }
    }
}

impl RiskMatrixConfig {
    /// Replace cells and intervals with a preset. Safety factors are kept.
    pub fn apply_preset(&mut self, preset: MatrixPreset) {
        self.cells = preset.cells();
        self.inspection_intervals = preset.inspection_intervals();
    }

    /// Mapped level for a band pair. The last matching cell wins.
    pub fn lookup(&self, pof: RiskBand, cof: RiskBand) -> Option<RiskLevel> {
        self.cells
            .iter()
            .rev()
            .find(|c| c.pof == pof && c.cof == cof)
            .map(|c| c.risk)
    }

    /// Band pairs with no mapping.
    pub fn validate_matrix_completeness(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for pof in RiskBand::ALL {
            for cof in RiskBand::ALL {
                if self.lookup(pof, cof).is_none() {
                    errors.push(format!("no risk level mapped for PoF {pof} / CoF {cof}"));
                }
            }
        }
        errors
    }

    /// Intervals must lie within the allowed range and never grow with risk.
    pub fn validate_interval_consistency(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let (lo, hi) = MATRIX_INTERVAL_RANGE;

        for level in RiskLevel::ALL {
            let months = self.inspection_intervals.get(level);
            if !(lo..=hi).contains(&months) {
                errors.push(format!(
                    "{level} interval {months} months is outside [{lo}, {hi}]"
                ));
            }
        }
        for pair in RiskLevel::ALL.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            let (a, b) = (
                self.inspection_intervals.get(lower),
                self.inspection_intervals.get(higher),
            );
            if b > a {
                errors.push(format!(
                    "{higher} interval ({b} months) is longer than {lower} interval ({a} months)"
                ));
            }
        }
        errors
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.validate_matrix_completeness();
        errors.extend(self.validate_interval_consistency());
        for (scenario, factor) in &self.fallback_safety_factors {
            if !factor.is_finite() || *factor <= 0.0 {
                errors.push(format!(
                    "fallback safety factor '{scenario}' = {factor} must be > 0"
                ));
            }
        }
        errors
    }
}

// ============================================================================
// Service
// ============================================================================

/// Matrix lookups and validated mutation.
#[derive(Debug, Clone, Default)]
pub struct RiskMatrixService {
    config: RiskMatrixConfig,
}

impl RiskMatrixService {
    pub fn new(config: RiskMatrixConfig) -> Self {
        Self { config }
    }

    pub fn with_preset(preset: MatrixPreset) -> Self {
        let mut config = RiskMatrixConfig::default();
        config.apply_preset(preset);
        Self { config }
    }

    pub fn config(&self) -> &RiskMatrixConfig {
        &self.config
    }

    pub fn into_config(self) -> RiskMatrixConfig {
        self.config
    }

    /// Risk level for band names, case-insensitive. Unmapped or unparseable
    /// bands resolve to Medium.
    pub fn get_risk_level(&self, pof_level: &str, cof_level: &str) -> RiskLevel {
        match (pof_level.parse::<RiskBand>(), cof_level.parse::<RiskBand>()) {
            (Ok(pof), Ok(cof)) => self.risk_level(pof, cof),
            _ => {
                warn!(pof = %pof_level, cof = %cof_level, "Unrecognised risk band, using Medium");
                RiskLevel::Medium
            }
        }
    }

    /// Risk level for a band pair, Medium when unmapped.
    pub fn risk_level(&self, pof: RiskBand, cof: RiskBand) -> RiskLevel {
        self.config.lookup(pof, cof).unwrap_or_else(|| {
            debug!(%pof, %cof, "Unmapped matrix cell, using Medium");
            RiskLevel::Medium
        })
    }

    /// Configured interval (months), 24 when unset.
    pub fn get_inspection_interval(&self, level: RiskLevel) -> u32 {
        match self.config.inspection_intervals.get(level) {
            0 => DEFAULT_INSPECTION_INTERVAL_MONTHS,
            months => months,
        }
    }

    pub fn safety_factor(&self, scenario: &str) -> f64 {
        match self.config.fallback_safety_factors.get(scenario) {
            Some(f) if f.is_finite() && *f > 0.0 => *f,
            Some(f) => {
                warn!(scenario, factor = *f, "Invalid safety factor, using 1.0");
                1.0
            }
            None => 1.0,
        }
    }

    /// `floor(base / factor)`, never below the 3-month floor. A missing or
    /// invalid factor counts as 1.0.
    pub fn calculate_adjusted_interval(&self, base_months: u32, scenario: Option<&str>) -> u32 {
        let factor = scenario.map_or(1.0, |s| self.safety_factor(s));
        let adjusted = (f64::from(base_months) / factor).floor();
        // Float → int saturates; NaN cannot occur with a positive factor
        let adjusted = adjusted as u32;
        adjusted.max(MIN_INTERVAL_MONTHS)
    }

    pub fn set_risk_mapping(&mut self, pof: RiskBand, cof: RiskBand, risk: RiskLevel) {
        self.config.cells.retain(|c| !(c.pof == pof && c.cof == cof));
        self.config.cells.push(RiskMatrixCell { pof, cof, risk });
    }

    pub fn set_inspection_interval(
        &mut self,
        level: RiskLevel,
        months: u32,
    ) -> Result<(), RiskMatrixError> {
        if months == 0 {
            return Err(RiskMatrixError::InvalidInterval { level, months });
        }
        *self.config.inspection_intervals.slot_mut(level) = months;
        Ok(())
    }

    pub fn set_fallback_safety_factor(
        &mut self,
        scenario: impl Into<String>,
        factor: f64,
    ) -> Result<(), RiskMatrixError> {
        let scenario = scenario.into();
        if !factor.is_finite() || factor <= 0.0 {
            return Err(RiskMatrixError::InvalidSafetyFactor { scenario, factor });
        }
        self.config.fallback_safety_factors.insert(scenario, factor);
        Ok(())
    }

    pub fn apply_preset(&mut self, preset: MatrixPreset) {
        self.config.apply_preset(preset);
    }

    pub fn validate_matrix_completeness(&self) -> Vec<String> {
        self.config.validate_matrix_completeness()
    }

    pub fn validate_interval_consistency(&self) -> Vec<String> {
        self.config.validate_interval_consistency()
    }
}
