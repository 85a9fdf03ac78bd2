//! Equipment master data and extracted inspection evidence

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Errors raised when equipment or inspection data violates a hard invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("equipment_id must not be empty")]
    EmptyEquipmentId,

    #[error("design_pressure must be a finite value > 0 (got {0})")]
    InvalidDesignPressure(f64),

    #[error("inventory_size must be a finite value >= 0 (got {0})")]
    InvalidInventorySize(f64),

    #[error("corrosion_rate must be a finite value >= 0 (got {0})")]
    InvalidCorrosionRate(f64),

    #[error("thickness must be > 0 (got {0} mm)")]
    NonPositiveThickness(f64),

    #[error("minimum_required must be > 0 (got {0} mm)")]
    NonPositiveMinimumRequired(f64),

    #[error("thickness {thickness} mm is at or below 50% of minimum required {minimum_required} mm")]
    ThicknessBelowHalfMinimum { thickness: f64, minimum_required: f64 },
}

// ============================================================================
// Enumerations
// ============================================================================

/// Equipment class. Drives the Level 1 base interval and economic CoF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentType {
    PressureVessel,
    Piping,
    HeatExchanger,
    Pump,
    Compressor,
    Tank,
}

impl EquipmentType {
    pub const ALL: [Self; 6] = [
        Self::PressureVessel,
        Self::Piping,
        Self::HeatExchanger,
        Self::Pump,
        Self::Compressor,
        Self::Tank,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PressureVessel => "pressure_vessel",
            Self::Piping => "piping",
            Self::HeatExchanger => "heat_exchanger",
            Self::Pump => "pump",
            Self::Compressor => "compressor",
            Self::Tank => "tank",
        }
    }
}

impl std::fmt::Display for EquipmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process service the equipment operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    SourGas,
    SweetGas,
    CrudeOil,
    RefinedProducts,
    Hydrogen,
    Steam,
    Water,
    Chemical,
    Other,
}

impl ServiceType {
    pub const ALL: [Self; 9] = [
        Self::SourGas,
        Self::SweetGas,
        Self::CrudeOil,
        Self::RefinedProducts,
        Self::Hydrogen,
        Self::Steam,
        Self::Water,
        Self::Chemical,
        Self::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SourGas => "sour_gas",
            Self::SweetGas => "sweet_gas",
            Self::CrudeOil => "crude_oil",
            Self::RefinedProducts => "refined_products",
            Self::Hydrogen => "hydrogen",
            Self::Steam => "steam",
            Self::Water => "water",
            Self::Chemical => "chemical",
            Self::Other => "other",
        }
    }

    /// H2S-bearing service. Raises safety and environmental consequence.
    pub const fn is_sour(self) -> bool {
        matches!(self, Self::SourGas)
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business criticality assigned by the asset owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CriticalityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl CriticalityLevel {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl Default for CriticalityLevel {
    fn default() -> Self {
        CriticalityLevel::Medium
    }
}

impl std::fmt::Display for CriticalityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CriticalityLevel::Low => write!(f, "Low"),
            CriticalityLevel::Medium => write!(f, "Medium"),
            CriticalityLevel::High => write!(f, "High"),
            CriticalityLevel::Critical => write!(f, "Critical"),
        }
    }
}

/// Condition of the external/internal coating at last inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoatingCondition {
    Excellent,
    Good,
    Moderate,
    Poor,
}

impl CoatingCondition {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Moderate => "moderate",
            Self::Poor => "poor",
        }
    }
}

/// Effectiveness of the inspection that produced the evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionQuality {
    Poor,
    Average,
    Good,
    Excellent,
}

impl InspectionQuality {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Poor => "poor",
            Self::Average => "average",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }

    /// Quality factor in [0, 1] used by confidence blends.
    pub const fn factor(self) -> f64 {
        match self {
            Self::Poor => 0.3,
            Self::Average => 0.6,
            Self::Good => 0.8,
            Self::Excellent => 1.0,
        }
    }
}

/// Severity of an inspection finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FindingSeverity {
    Low,
    Medium,
    High,
    Critical,
}

// ============================================================================
// Equipment
// ============================================================================

/// Equipment master data as supplied by the asset register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentData {
    pub equipment_id: String,
    pub equipment_type: EquipmentType,
    pub service_type: ServiceType,
    pub installation_date: NaiveDate,
    /// Design pressure (bar)
    pub design_pressure: f64,
    /// Design temperature (°C)
    #[serde(default)]
    pub design_temperature: f64,
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub criticality_level: CriticalityLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coating_type: Option<String>,
    #[serde(default)]
    pub location: String,
    /// Hydrocarbon / fluid inventory (kg)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_size: Option<f64>,
    /// Stored base inspection frequency, already adjusted by the asset register.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_frequency_months: Option<u32>,
}

impl EquipmentData {
    /// Create equipment with the mandatory fields, validating invariants.
    pub fn new(
        equipment_id: impl Into<String>,
        equipment_type: EquipmentType,
        service_type: ServiceType,
        installation_date: NaiveDate,
        design_pressure: f64,
    ) -> Result<Self, DataError> {
        let equipment = Self {
            equipment_id: equipment_id.into(),
            equipment_type,
            service_type,
            installation_date,
            design_pressure,
            design_temperature: 0.0,
            material: String::new(),
            criticality_level: CriticalityLevel::default(),
            coating_type: None,
            location: String::new(),
            inventory_size: None,
            inspection_frequency_months: None,
        };
        equipment.validate()?;
        Ok(equipment)
    }

    pub fn with_criticality(mut self, level: CriticalityLevel) -> Self {
        self.criticality_level = level;
        self
    }

    pub fn with_design_temperature(mut self, celsius: f64) -> Self {
        self.design_temperature = celsius;
        self
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = material.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_coating_type(mut self, coating: impl Into<String>) -> Self {
        self.coating_type = Some(coating.into());
        self
    }

    /// Set the fluid inventory (kg). Rejects negative or non-finite values.
    pub fn with_inventory_size(mut self, kg: f64) -> Result<Self, DataError> {
        if !kg.is_finite() || kg < 0.0 {
            return Err(DataError::InvalidInventorySize(kg));
        }
        self.inventory_size = Some(kg);
        Ok(self)
    }

    pub fn with_inspection_frequency(mut self, months: u32) -> Self {
        self.inspection_frequency_months = Some(months);
        self
    }

    /// Check invariants. Called by `new` and by data sources after deserialization.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.equipment_id.trim().is_empty() {
            return Err(DataError::EmptyEquipmentId);
        }
        if !self.design_pressure.is_finite() || self.design_pressure <= 0.0 {
            return Err(DataError::InvalidDesignPressure(self.design_pressure));
        }
        if let Some(inv) = self.inventory_size {
            if !inv.is_finite() || inv < 0.0 {
                return Err(DataError::InvalidInventorySize(inv));
            }
        }
        Ok(())
    }

    /// Age in years at `date`. Never negative.
    pub fn age_years_at(&self, date: NaiveDate) -> f64 {
        let days = (date - self.installation_date).num_days().max(0);
        days as f64 / crate::config::defaults::DAYS_PER_YEAR
    }

    /// Age in years as of today (UTC).
    pub fn age_years(&self) -> f64 {
        self.age_years_at(Utc::now().date_naive())
    }
}

// ============================================================================
// Inspection evidence
// ============================================================================

/// A single wall-thickness reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThicknessMeasurement {
    pub location: String,
    /// Measured thickness (mm)
    pub thickness: f64,
    pub measurement_date: NaiveDate,
    /// Minimum required thickness (mm)
    pub minimum_required: f64,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub inspector: String,
}

impl ThicknessMeasurement {
    pub fn new(
        location: impl Into<String>,
        thickness: f64,
        measurement_date: NaiveDate,
        minimum_required: f64,
    ) -> Result<Self, DataError> {
        let m = Self {
            location: location.into(),
            thickness,
            measurement_date,
            minimum_required,
            method: String::new(),
            inspector: String::new(),
        };
        m.validate()?;
        Ok(m)
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_inspector(mut self, inspector: impl Into<String>) -> Self {
        self.inspector = inspector.into();
        self
    }

    /// A reading at or below half the minimum required thickness is rejected.
    pub fn validate(&self) -> Result<(), DataError> {
        if !(self.thickness > 0.0) {
            return Err(DataError::NonPositiveThickness(self.thickness));
        }
        if !(self.minimum_required > 0.0) {
            return Err(DataError::NonPositiveMinimumRequired(self.minimum_required));
        }
        if self.thickness <= self.minimum_required * 0.5 {
            return Err(DataError::ThicknessBelowHalfMinimum {
                thickness: self.thickness,
                minimum_required: self.minimum_required,
            });
        }
        Ok(())
    }
}

/// A finding recorded during an inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionFinding {
    pub finding_type: String,
    pub severity: FindingSeverity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub recommendation: String,
    pub date: NaiveDate,
}

/// Time-bound inspection evidence extracted for one equipment item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRbiData {
    /// Corrosion rate (mm/year)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrosion_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coating_condition: Option<CoatingCondition>,
    #[serde(default)]
    pub damage_mechanisms: BTreeSet<String>,
    #[serde(default)]
    pub thickness_measurements: Vec<ThicknessMeasurement>,
    #[serde(default)]
    pub inspection_findings: Vec<InspectionFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_inspection_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_quality: Option<InspectionQuality>,
}

impl ExtractedRbiData {
    /// Validate every measurement and the corrosion rate.
    pub fn validate(&self) -> Result<(), DataError> {
        if let Some(cr) = self.corrosion_rate {
            if !cr.is_finite() || cr < 0.0 {
                return Err(DataError::InvalidCorrosionRate(cr));
            }
        }
        for m in &self.thickness_measurements {
            m.validate()?;
        }
        Ok(())
    }

    /// Thinnest reading across all measurement locations.
    pub fn min_measured_thickness(&self) -> Option<f64> {
        self.thickness_measurements
            .iter()
            .map(|m| m.thickness)
            .reduce(f64::min)
    }

    /// Minimum required thickness at the thinnest location.
    pub fn governing_minimum_required(&self) -> Option<f64> {
        self.thickness_measurements
            .iter()
            .min_by(|a, b| a.thickness.total_cmp(&b.thickness))
            .map(|m| m.minimum_required)
    }

    /// Number of pieces of inspection evidence on record.
    pub fn inspection_record_count(&self) -> usize {
        self.inspection_findings.len()
            + self.thickness_measurements.len()
            + usize::from(self.last_inspection_date.is_some())
    }

    /// Count of findings rated High or Critical.
    pub fn severe_finding_count(&self) -> usize {
        self.inspection_findings
            .iter()
            .filter(|f| f.severity >= FindingSeverity::High)
            .count()
    }
}
