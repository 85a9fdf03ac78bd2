//! Pressure Safety Valves
//!
//! Valve master data, bench-test (calibration) history and the Level 2
//! risk assessment driven by pop-test and seat-leakage deviations.
//!
//! Optional nameplate fields (bonnet type, relief service, CDTP) are
//! resolved once by serde defaults when the record is ingested. The
//! calculation never has to guess whether a field exists.

pub mod api527;
pub mod level2;

pub use api527::{leak_test_deviation, max_allowed_leakage, LeakageAllowance, LeakageUnit};
pub use level2::{calculate_level_2_risk, PsvRiskAssessment};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::defaults::WEIGHT_SUM_TOLERANCE;
use crate::scoring::{params, ScoringTable};
use crate::types::{CriticalityLevel, ServiceType};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PsvError {
    #[error("PSV tag must not be empty")]
    EmptyTag,

    #[error("set pressure must be a finite value > 0 psig (got {0})")]
    InvalidSetPressure(f64),

    #[error("orifice size must be a finite value > 0 in (got {0})")]
    InvalidOrificeSize(f64),

    #[error("inlet size must be a finite value > 0 in (got {0})")]
    InvalidInletSize(f64),
}

// ============================================================================
// Nameplate enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatType {
    #[default]
    Metal,
    Soft,
}

/// Medium used for the bench seat-tightness test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMedium {
    #[default]
    Air,
    Steam,
    Water,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonnetType {
    #[default]
    Closed,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveType {
    #[default]
    Conventional,
    BalancedBellows,
    PilotOperated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReliefService {
    #[default]
    Process,
    Boiler,
}

// ============================================================================
// Valve data
// ============================================================================

/// One bench test. Leakage is in the unit of the valve's API 527 allowance
/// (bubbles/min for air, cc/hr for water).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub date: NaiveDate,
    /// As-received pop pressure (psig)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_repair_pop_psig: Option<f64>,
    /// As-left pop pressure (psig)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_repair_pop_psig: Option<f64>,
    /// Measured seat leakage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leak_test_result: Option<f64>,
}

impl CalibrationRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            pre_repair_pop_psig: None,
            post_repair_pop_psig: None,
            leak_test_result: None,
        }
    }

    pub fn with_pre_repair_pop(mut self, psig: f64) -> Self {
        self.pre_repair_pop_psig = Some(psig);
        self
    }

    pub fn with_post_repair_pop(mut self, psig: f64) -> Self {
        self.post_repair_pop_psig = Some(psig);
        self
    }

    pub fn with_leakage(mut self, measured: f64) -> Self {
        self.leak_test_result = Some(measured);
        self
    }

    /// As-received pop if recorded, otherwise as-left.
    pub fn pop_pressure(&self) -> Option<f64> {
        self.pre_repair_pop_psig.or(self.post_repair_pop_psig)
    }
}

fn default_psv_frequency() -> u32 {
    36
}

fn default_inlet_size() -> f64 {
    1.0
}

fn default_service_type() -> ServiceType {
    ServiceType::Other
}

/// Pressure safety valve master data plus its test history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsvData {
    pub tag: String,
    pub set_pressure_psig: f64,
    /// Cold differential test pressure, when the bench setting differs from set pressure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdtp_psig: Option<f64>,
    /// Orifice size (in)
    pub orifice_size_in: f64,
    /// Nominal inlet size (in)
    #[serde(default = "default_inlet_size")]
    pub inlet_size_in: f64,
    #[serde(default)]
    pub seat_type: SeatType,
    #[serde(default)]
    pub test_medium: TestMedium,
    #[serde(default)]
    pub bonnet_type: BonnetType,
    #[serde(default)]
    pub valve_type: ValveType,
    #[serde(default)]
    pub relief_service: ReliefService,
    /// Current test frequency (months)
    #[serde(default = "default_psv_frequency")]
    pub frequency_months: u32,
    #[serde(default)]
    pub criticality: CriticalityLevel,
    #[serde(default = "default_service_type")]
    pub service_type: ServiceType,
    #[serde(default)]
    pub calibrations: Vec<CalibrationRecord>,
}

impl PsvData {
    pub fn new(
        tag: impl Into<String>,
        set_pressure_psig: f64,
        orifice_size_in: f64,
    ) -> Result<Self, PsvError> {
        let psv = Self {
            tag: tag.into(),
            set_pressure_psig,
            cdtp_psig: None,
            orifice_size_in,
            inlet_size_in: default_inlet_size(),
            seat_type: SeatType::default(),
            test_medium: TestMedium::default(),
            bonnet_type: BonnetType::default(),
            valve_type: ValveType::default(),
            relief_service: ReliefService::default(),
            frequency_months: default_psv_frequency(),
            criticality: CriticalityLevel::default(),
            service_type: default_service_type(),
            calibrations: Vec::new(),
        };
        psv.validate()?;
        Ok(psv)
    }

    pub fn validate(&self) -> Result<(), PsvError> {
        if self.tag.trim().is_empty() {
            return Err(PsvError::EmptyTag);
        }
        if !self.set_pressure_psig.is_finite() || self.set_pressure_psig <= 0.0 {
            return Err(PsvError::InvalidSetPressure(self.set_pressure_psig));
        }
        if !self.orifice_size_in.is_finite() || self.orifice_size_in <= 0.0 {
            return Err(PsvError::InvalidOrificeSize(self.orifice_size_in));
        }
        if !self.inlet_size_in.is_finite() || self.inlet_size_in <= 0.0 {
            return Err(PsvError::InvalidInletSize(self.inlet_size_in));
        }
        Ok(())
    }

    /// Pressure the pop test is judged against: CDTP when set, else set pressure.
    pub fn test_pressure(&self) -> f64 {
        self.cdtp_psig
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(self.set_pressure_psig)
    }

    /// Most recent bench test.
    pub fn latest_calibration(&self) -> Option<&CalibrationRecord> {
        self.calibrations.iter().max_by_key(|c| c.date)
    }
}

// ============================================================================
// Config section
// ============================================================================

fn default_pop_table() -> ScoringTable {
    ScoringTable::unchecked(
        params::POP_TEST_DEVIATION,
        [("0-3", 1), ("3-5", 2), ("5-10", 3), ("10-15", 4), (">15", 5)],
    )
    .with_description("Pop pressure deviation from test pressure (%)")
}

fn default_leak_table() -> ScoringTable {
    ScoringTable::unchecked(
        params::LEAK_TEST_DEVIATION,
        [("0-10", 1), ("10-25", 2), ("25-50", 3), ("50-100", 4), (">100", 5)],
    )
    .with_description("Seat leakage in excess of the API 527 allowance (%)")
}

fn default_pop_weight() -> f64 {
    0.6
}

fn default_leak_weight() -> f64 {
    0.4
}

/// PSV Level 2 scoring tables and component weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsvSettings {
    #[serde(default = "default_pop_table")]
    pub pop_test_table: ScoringTable,

    #[serde(default = "default_leak_table")]
    pub leak_test_table: ScoringTable,

    #[serde(default = "default_pop_weight")]
    pub pop_weight: f64,

    #[serde(default = "default_leak_weight")]
    pub leak_weight: f64,
}

impl Default for PsvSettings {
    fn default() -> Self {
        Self {
            pop_test_table: default_pop_table(),
            leak_test_table: default_leak_table(),
            pop_weight: default_pop_weight(),
            leak_weight: default_leak_weight(),
        }
    }
}

impl PsvSettings {
    pub fn validate(&self) -> Vec<String> {
        let mut errors: Vec<String> = self
            .pop_test_table
            .violations()
            .into_iter()
            .chain(self.leak_test_table.violations())
            .map(|e| e.to_string())
            .collect();

        for (name, w) in [("pop_weight", self.pop_weight), ("leak_weight", self.leak_weight)] {
            if !w.is_finite() || w < 0.0 {
                errors.push(format!("{name} = {w} must be a finite value >= 0"));
            }
        }
        let sum = self.pop_weight + self.leak_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            errors.push(format!("pop_weight + leak_weight must equal 1.0, got {sum:.3}"));
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_optional_fields_resolved_at_ingestion() {
        let json = r#"{ "tag": "PSV-101", "set_pressure_psig": 150.0, "orifice_size_in": 0.5 }"#;
        let psv: PsvData = serde_json::from_str(json).unwrap();
        assert_eq!(psv.bonnet_type, BonnetType::Closed);
        assert_eq!(psv.relief_service, ReliefService::Process);
        assert_eq!(psv.valve_type, ValveType::Conventional);
        assert_eq!(psv.seat_type, SeatType::Metal);
        assert_eq!(psv.test_medium, TestMedium::Air);
        assert_eq!(psv.frequency_months, 36);
        assert!(psv.calibrations.is_empty());
    }

    #[test]
    fn test_new_rejects_bad_set_pressure() {
        assert_eq!(
            PsvData::new("PSV-1", 0.0, 0.5),
            Err(PsvError::InvalidSetPressure(0.0))
        );
        assert_eq!(PsvData::new(" ", 100.0, 0.5), Err(PsvError::EmptyTag));
    }

    #[test]
    fn test_test_pressure_prefers_cdtp() {
        let mut psv = PsvData::new("PSV-1", 100.0, 0.5).unwrap();
        assert_eq!(psv.test_pressure(), 100.0);
        psv.cdtp_psig = Some(95.0);
        assert_eq!(psv.test_pressure(), 95.0);
    }

    #[test]
    fn test_latest_calibration_by_date() {
        let mut psv = PsvData::new("PSV-1", 100.0, 0.5).unwrap();
        psv.calibrations = vec![
            CalibrationRecord::new(date(2024, 3, 1)).with_pre_repair_pop(104.0),
            CalibrationRecord::new(date(2022, 3, 1)).with_pre_repair_pop(110.0),
        ];
        assert_eq!(psv.latest_calibration().map(|c| c.date), Some(date(2024, 3, 1)));
    }

    #[test]
    fn test_pop_pressure_falls_back_to_post_repair() {
        let record = CalibrationRecord::new(date(2024, 1, 1)).with_post_repair_pop(101.0);
        assert_eq!(record.pop_pressure(), Some(101.0));
    }

    #[test]
    fn test_default_settings_valid() {
        assert!(PsvSettings::default().validate().is_empty());
    }

    #[test]
    fn test_settings_weights_must_sum_to_one() {
        let settings = PsvSettings {
            pop_weight: 0.9,
            ..Default::default()
        };
        assert_eq!(settings.validate().len(), 1);
    }
}
