//! Level 3: quantitative degradation model
//!
//! Annual probability of failure from age, corrosion rate and active damage
//! mechanisms; consequence per dimension from design pressure, inventory
//! and criticality; remaining life from the thinnest reading. The interval
//! follows from the risk level and is capped by remaining life.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

use super::{CalculationContext, LevelOutcome};
use crate::config::defaults::{
    BASE_FAILURE_RATE, LEVEL3_MAX_INTERVAL_MONTHS, MIN_INTERVAL_MONTHS,
    RECOMMENDED_THICKNESS_POINTS, SHORT_REMAINING_LIFE_CAP_MONTHS, SHORT_REMAINING_LIFE_YEARS,
};
use crate::config::RbiConfig;
use crate::types::{
    CalculationLevel, CriticalityLevel, EquipmentData, ExtractedRbiData, ParameterSet,
    PerDimension, RbiCalculationResult, RiskLevel,
};

/// Quality factor assumed when the inspection quality is unknown.
const UNKNOWN_QUALITY_FACTOR: f64 = 0.5;

/// Data gaps for a Level 3 run. Gaps are recorded, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Level3InputCheck {
    pub missing_required: Vec<String>,
    pub missing_optional: Vec<String>,
}

impl Level3InputCheck {
    pub fn is_sufficient(&self) -> bool {
        self.missing_required.is_empty()
    }
}

/// Intermediate quantities of a Level 3 run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Level3Assessment {
    pub annual_pof: f64,
    pub pof_score: f64,
    pub cof_scores: PerDimension<f64>,
    pub remaining_life_years: Option<f64>,
    pub risk_value: f64,
    pub risk_level: RiskLevel,
    pub interval_months: u32,
}

#[derive(Debug, Clone)]
pub struct Level3Calculator {
    ctx: Arc<CalculationContext>,
}

impl Level3Calculator {
    pub fn new(config: Arc<RbiConfig>) -> Self {
        Self::with_context(Arc::new(CalculationContext::new(config)))
    }

    pub(crate) fn with_context(ctx: Arc<CalculationContext>) -> Self {
        Self { ctx }
    }

    pub fn validate_input_data(data: &ExtractedRbiData) -> Level3InputCheck {
        let mut check = Level3InputCheck::default();

        if data.corrosion_rate.is_none() {
            check.missing_required.push("corrosion_rate".to_string());
        }
        let readings = data.thickness_measurements.len();
        if readings == 0 {
            check
                .missing_required
                .push("thickness_measurements".to_string());
        } else if readings < RECOMMENDED_THICKNESS_POINTS {
            check.missing_optional.push(format!(
                "thickness_measurements ({readings} of {RECOMMENDED_THICKNESS_POINTS} recommended)"
            ));
        }
        if data.coating_condition.is_none() {
            check.missing_optional.push("coating_condition".to_string());
        }
        if data.inspection_quality.is_none() {
            check.missing_optional.push("inspection_quality".to_string());
        }
        if data.last_inspection_date.is_none() {
            check
                .missing_optional
                .push("last_inspection_date".to_string());
        }
        check
    }

    /// `0.001 × age factor × corrosion factor × damage factor`, within [0, 1].
    pub fn calculate_annual_pof(age_years: f64, corrosion_rate: f64, damage_mechanisms: usize) -> f64 {
        let age_factor = 1.0 + (age_years.max(0.0) / 20.0) * 0.5;
        let corrosion_factor = 1.0 + (corrosion_rate.max(0.0) / 0.5) * 2.0;
        let damage_factor = 1.0 + 0.3 * damage_mechanisms as f64;
        (BASE_FAILURE_RATE * age_factor * corrosion_factor * damage_factor).clamp(0.0, 1.0)
    }

    /// Probability category 1-5.
    pub fn pof_category_score(annual_pof: f64) -> f64 {
        if annual_pof >= 0.05 {
            5.0
        } else if annual_pof >= 0.01 {
            4.0
        } else if annual_pof >= 0.005 {
            3.0
        } else if annual_pof >= 0.002 {
            2.0
        } else {
            1.0
        }
    }

    /// Consequence per dimension, each within [1, 5].
    pub fn calculate_cof(equipment: &EquipmentData) -> PerDimension<f64> {
        let sour = if equipment.service_type.is_sour() { 1.0 } else { 0.0 };
        let inventory = equipment.inventory_size.unwrap_or(1.0).max(1.0);

        let safety = 1.0 + equipment.design_pressure / 25.0 + sour;
        let environmental = 1.0 + inventory.log10() * 0.5 + sour;
        let economic = match equipment.criticality_level {
            CriticalityLevel::Critical => 4.0,
            CriticalityLevel::High => 3.0,
            CriticalityLevel::Medium => 2.0,
            CriticalityLevel::Low => 1.0,
        };

        PerDimension {
            safety,
            environmental,
            economic,
            business: economic * 1.2,
        }
        .map(|v| v.clamp(1.0, 5.0))
    }

    /// Years until the thinnest reading reaches its minimum required
    /// thickness. `None` without readings or a positive corrosion rate.
    pub fn calculate_remaining_life(data: &ExtractedRbiData) -> Option<f64> {
        let rate = data.corrosion_rate.filter(|r| *r > 0.0)?;
        let thickness = data.min_measured_thickness()?;
        let minimum = data.governing_minimum_required()?;
        Some((thickness - minimum) / rate)
    }

    pub fn risk_level_for(risk_value: f64) -> RiskLevel {
        if risk_value <= 0.5 {
            RiskLevel::Low
        } else if risk_value <= 1.5 {
            RiskLevel::Medium
        } else if risk_value <= 3.0 {
            RiskLevel::High
        } else {
            RiskLevel::VeryHigh
        }
    }

    /// Interval by risk level, capped at 12 months when remaining life is
    /// 5 years or less, within [3, 60] months.
    pub fn optimal_interval(risk_level: RiskLevel, remaining_life_years: Option<f64>) -> u32 {
        let mut months = match risk_level {
            RiskLevel::VeryHigh => 6,
            RiskLevel::High => 12,
            RiskLevel::Medium => 24,
            RiskLevel::Low => 60,
        };
        if remaining_life_years.is_some_and(|life| life <= SHORT_REMAINING_LIFE_YEARS) {
            months = months.min(SHORT_REMAINING_LIFE_CAP_MONTHS);
        }
        months.clamp(MIN_INTERVAL_MONTHS, LEVEL3_MAX_INTERVAL_MONTHS)
    }

    pub fn assess(
        equipment: &EquipmentData,
        data: &ExtractedRbiData,
        reference_date: NaiveDate,
    ) -> Level3Assessment {
        let annual_pof = Self::calculate_annual_pof(
            equipment.age_years_at(reference_date),
            data.corrosion_rate.unwrap_or(0.0),
            data.damage_mechanisms.len(),
        );
        let cof_scores = Self::calculate_cof(equipment);
        let remaining_life_years = Self::calculate_remaining_life(data);
        let risk_value = annual_pof * cof_scores.mean();
        let risk_level = Self::risk_level_for(risk_value);

        Level3Assessment {
            annual_pof,
            pof_score: Self::pof_category_score(annual_pof),
            interval_months: Self::optimal_interval(risk_level, remaining_life_years),
            cof_scores,
            remaining_life_years,
            risk_value,
            risk_level,
        }
    }

    pub fn calculate(
        &self,
        equipment: &EquipmentData,
        data: &ExtractedRbiData,
        reference_date: NaiveDate,
    ) -> RbiCalculationResult {
        let check = Self::validate_input_data(data);
        let assessment = Self::assess(equipment, data, reference_date);

        let mut input_parameters = ParameterSet::new();
        input_parameters.insert(
            "equipment_age".to_string(),
            equipment.age_years_at(reference_date).into(),
        );
        if let Some(rate) = data.corrosion_rate {
            input_parameters.insert("corrosion_rate".to_string(), rate.into());
        }
        input_parameters.insert(
            "damage_mechanisms".to_string(),
            data.damage_mechanisms.len().into(),
        );
        input_parameters.insert("annual_pof".to_string(), assessment.annual_pof.into());
        input_parameters.insert("risk_value".to_string(), assessment.risk_value.into());
        if let Some(life) = assessment.remaining_life_years {
            input_parameters.insert("remaining_life_years".to_string(), life.into());
        }
        if let Some(thickness) = data.min_measured_thickness() {
            input_parameters.insert("min_measured_thickness".to_string(), thickness.into());
        }

        let mut estimated_parameters = Vec::new();
        if data.corrosion_rate.is_none() {
            estimated_parameters.push("corrosion_rate".to_string());
        }
        if equipment.inventory_size.is_none() {
            estimated_parameters.push("inventory_size".to_string());
        }

        let required_fraction = 1.0 - check.missing_required.len() as f64 / 2.0;
        let optional_fraction = 1.0 - check.missing_optional.len() as f64 / 4.0;
        let quality = data
            .inspection_quality
            .map_or(UNKNOWN_QUALITY_FACTOR, |q| q.factor());

        let mut missing_data = check.missing_required;
        missing_data.extend(check.missing_optional);

        self.ctx.finish(
            equipment,
            LevelOutcome {
                level: CalculationLevel::Level3,
                pof_score: assessment.pof_score,
                cof_scores: assessment.cof_scores,
                risk_level: assessment.risk_level,
                interval_months: assessment.interval_months,
                confidence: 0.3 + 0.35 * required_fraction + 0.15 * optional_fraction + 0.2 * quality,
                data_quality: 0.5 * required_fraction + 0.3 * optional_fraction + 0.2 * quality,
                input_parameters,
                missing_data,
                estimated_parameters,
            },
            reference_date,
        )
    }
}
