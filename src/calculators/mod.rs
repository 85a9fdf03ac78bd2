//! RBI Calculators
//!
//! Three calculation levels of increasing sophistication and the dispatcher
//! that picks the highest level the available data supports:
//!
//! - **Level 1**: table-driven interval from equipment type, service and
//!   criticality. Needs no inspection history and always succeeds.
//! - **Level 2**: weighted PoF / CoF scores routed through the risk matrix.
//! - **Level 3**: quantitative PoF, remaining life and a computed interval.
//!
//! Every level is a pure function of (equipment, extracted data, config
//! snapshot, reference date). The reference date anchors both equipment age
//! and the next inspection date, so repeated calls agree.

pub mod level1;
pub mod level2;
pub mod level3;

pub use level1::Level1Calculator;
pub use level2::{get_interval_from_risk_score, Level2Calculator};
pub use level3::{Level3Assessment, Level3Calculator, Level3InputCheck};

use chrono::{Days, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::defaults::DAYS_PER_MONTH;
use crate::config::{LevelRequirement, RbiConfig};
use crate::risk_matrix::{fallback_scenario, RiskMatrixService};
use crate::scoring::{params, ScoringTablesService};
use crate::types::{
    CalculationLevel, DataError, EquipmentData, ExtractedRbiData, ParameterSet, ParameterValue,
    PerDimension, RbiCalculationResult, RiskLevel,
};

// ============================================================================
// Shared context
// ============================================================================

/// Config snapshot plus the services built from it.
#[derive(Debug, Clone)]
pub struct CalculationContext {
    pub config: Arc<RbiConfig>,
    pub scoring: ScoringTablesService,
    pub matrix: RiskMatrixService,
}

impl CalculationContext {
    pub fn new(config: Arc<RbiConfig>) -> Self {
        Self {
            scoring: ScoringTablesService::from_config(&config),
            matrix: RiskMatrixService::new(config.risk_matrix.clone()),
            config,
        }
    }

    /// CoF dimension scores combined with the configured dimension weights.
    pub fn overall_cof(&self, cof_scores: &PerDimension<f64>) -> f64 {
        cof_scores.weighted_average(&self.config.weighting_factors.cof_dimensions)
    }

    fn finish(
        &self,
        equipment: &EquipmentData,
        outcome: LevelOutcome,
        reference_date: NaiveDate,
    ) -> RbiCalculationResult {
        let overall_cof_score = self.overall_cof(&outcome.cof_scores);
        RbiCalculationResult {
            equipment_id: equipment.equipment_id.clone(),
            calculation_level: outcome.level,
            requested_level: outcome.level,
            fallback_occurred: false,
            next_inspection_date: next_inspection_date(reference_date, outcome.interval_months),
            risk_level: outcome.risk_level,
            pof_score: outcome.pof_score,
            cof_scores: outcome.cof_scores,
            overall_cof_score,
            confidence_score: outcome.confidence.clamp(0.0, 1.0),
            data_quality_score: outcome.data_quality.clamp(0.0, 1.0),
            calculation_timestamp: Utc::now(),
            input_parameters: outcome.input_parameters,
            missing_data: outcome.missing_data,
            estimated_parameters: outcome.estimated_parameters,
            inspection_interval_months: outcome.interval_months,
        }
    }
}

/// What a level computes before it is packaged into a result.
#[derive(Debug, Clone)]
pub(crate) struct LevelOutcome {
    pub level: CalculationLevel,
    pub pof_score: f64,
    pub cof_scores: PerDimension<f64>,
    pub risk_level: RiskLevel,
    pub interval_months: u32,
    pub confidence: f64,
    pub data_quality: f64,
    pub input_parameters: ParameterSet,
    pub missing_data: Vec<String>,
    pub estimated_parameters: Vec<String>,
}

/// `reference_date + months × DAYS_PER_MONTH` days.
pub fn next_inspection_date(reference_date: NaiveDate, interval_months: u32) -> NaiveDate {
    let days = i64::from(interval_months) * DAYS_PER_MONTH;
    reference_date
        .checked_add_days(Days::new(days.unsigned_abs()))
        .unwrap_or(NaiveDate::MAX)
}

// ============================================================================
// Parameter extraction
// ============================================================================

/// PoF parameters available from master data alone.
pub fn equipment_pof_parameters(equipment: &EquipmentData, reference_date: NaiveDate) -> ParameterSet {
    let mut values = ParameterSet::new();
    values.insert(
        params::EQUIPMENT_AGE.to_string(),
        equipment.age_years_at(reference_date).into(),
    );
    values.insert(
        params::SERVICE_AGGRESSIVENESS.to_string(),
        equipment.service_type.as_str().into(),
    );
    values
}

/// CoF parameters per dimension. Inventory is omitted when unknown.
pub fn cof_parameters(equipment: &EquipmentData) -> PerDimension<ParameterSet> {
    let criticality = ParameterValue::from(equipment.criticality_level.as_str());
    let class = ParameterValue::from(equipment.equipment_type.as_str());
    let service = ParameterValue::from(equipment.service_type.as_str());

    let mut safety = ParameterSet::new();
    safety.insert(params::DESIGN_PRESSURE.to_string(), equipment.design_pressure.into());
    safety.insert(params::SERVICE_HAZARD.to_string(), service.clone());

    let mut environmental = ParameterSet::new();
    if let Some(inventory) = equipment.inventory_size {
        environmental.insert(params::INVENTORY_SIZE.to_string(), inventory.into());
    }
    environmental.insert(params::ENVIRONMENTAL_HAZARD.to_string(), service);

    let mut economic = ParameterSet::new();
    economic.insert(params::CRITICALITY.to_string(), criticality);
    economic.insert(params::EQUIPMENT_CLASS.to_string(), class);

    PerDimension {
        safety,
        environmental,
        business: economic.clone(),
        economic,
    }
}

/// Flatten per-dimension parameters into one audit map, prefixed by dimension.
pub(crate) fn audit_cof_parameters(target: &mut ParameterSet, values: &PerDimension<ParameterSet>) {
    for (dimension, set) in values.iter() {
        for (name, value) in set {
            target.insert(format!("{dimension}.{name}"), value.clone());
        }
    }
}

// ============================================================================
// Level requirements
// ============================================================================

/// Reasons `data` does not meet `requirement`. Empty when it does.
pub fn requirement_gaps(
    requirement: &LevelRequirement,
    data: Option<&ExtractedRbiData>,
) -> Vec<String> {
    let mut gaps = Vec::new();
    let Some(data) = data else {
        if requirement.requires_corrosion_rate
            || requirement.min_thickness_measurements > 0
            || requirement.min_inspection_records > 0
        {
            gaps.push("no extracted inspection data available".to_string());
        }
        return gaps;
    };

    if requirement.requires_corrosion_rate && data.corrosion_rate.is_none() {
        gaps.push("corrosion_rate not available".to_string());
    }
    let readings = data.thickness_measurements.len();
    if readings < requirement.min_thickness_measurements {
        gaps.push(format!(
            "{readings} thickness measurements, {} required",
            requirement.min_thickness_measurements
        ));
    }
    let records = data.inspection_record_count();
    if records < requirement.min_inspection_records {
        gaps.push(format!(
            "{records} inspection records, {} required",
            requirement.min_inspection_records
        ));
    }
    gaps
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Runs the requested level, falling back when the data cannot support it.
#[derive(Debug, Clone)]
pub struct RbiCalculator {
    ctx: Arc<CalculationContext>,
    level1: Level1Calculator,
    level2: Level2Calculator,
    level3: Level3Calculator,
}

impl RbiCalculator {
    pub fn new(config: Arc<RbiConfig>) -> Self {
        let ctx = Arc::new(CalculationContext::new(config));
        Self {
            level1: Level1Calculator::with_context(Arc::clone(&ctx)),
            level2: Level2Calculator::with_context(Arc::clone(&ctx)),
            level3: Level3Calculator::with_context(Arc::clone(&ctx)),
            ctx,
        }
    }

    pub fn config(&self) -> &RbiConfig {
        &self.ctx.config
    }

    /// Highest level not above `requested` whose requirements `data` meets,
    /// with the reasons each higher level was skipped.
    pub fn determine_level(
        &self,
        requested: CalculationLevel,
        data: Option<&ExtractedRbiData>,
    ) -> (CalculationLevel, Vec<String>) {
        let requirements = &self.ctx.config.level_requirements;
        let mut reasons = Vec::new();
        let mut level = requested;

        loop {
            let gaps = match level {
                CalculationLevel::Level3 => requirement_gaps(&requirements.level3, data),
                CalculationLevel::Level2 => requirement_gaps(&requirements.level2, data),
                CalculationLevel::Level1 => Vec::new(),
            };
            if gaps.is_empty() {
                return (level, reasons);
            }
            reasons.extend(gaps.into_iter().map(|g| format!("{level}: {g}")));
            match level.lower() {
                Some(lower) => level = lower,
                None => return (level, reasons),
            }
        }
    }

    /// Validate inputs, then calculate.
    pub fn try_calculate(
        &self,
        equipment: &EquipmentData,
        data: Option<&ExtractedRbiData>,
        requested: CalculationLevel,
        reference_date: NaiveDate,
    ) -> Result<RbiCalculationResult, DataError> {
        equipment.validate()?;
        if let Some(data) = data {
            data.validate()?;
        }
        Ok(self.calculate(equipment, data, requested, reference_date))
    }

    /// Calculate at the requested level or the best level below it.
    ///
    /// Falling back divides the interval by the scenario safety factor,
    /// lowers confidence by the configured penalty per level dropped and
    /// records why in `missing_data`. With fallback disabled, insufficient
    /// data yields a High-risk result on the emergency interval.
    pub fn calculate(
        &self,
        equipment: &EquipmentData,
        data: Option<&ExtractedRbiData>,
        requested: CalculationLevel,
        reference_date: NaiveDate,
    ) -> RbiCalculationResult {
        let (achieved, reasons) = self.determine_level(requested, data);

        if achieved == requested {
            debug!(equipment_id = %equipment.equipment_id, level = %achieved, "Running RBI calculation");
            return self.run_level(achieved, equipment, data, reference_date);
        }

        let fallback = &self.ctx.config.fallback;
        if !fallback.enabled {
            warn!(
                equipment_id = %equipment.equipment_id,
                requested = %requested,
                reasons = ?reasons,
                "Insufficient data and fallback disabled, applying emergency interval"
            );
            return self.emergency_result(equipment, requested, reasons, reference_date);
        }

        warn!(
            equipment_id = %equipment.equipment_id,
            requested = %requested,
            achieved = %achieved,
            reasons = ?reasons,
            "Falling back to a lower calculation level"
        );

        let mut result = self.run_level(achieved, equipment, data, reference_date);
        let scenario = fallback_scenario(requested, achieved);
        let factor = self.ctx.matrix.safety_factor(&scenario);
        let interval = self
            .ctx
            .matrix
            .calculate_adjusted_interval(result.inspection_interval_months, Some(&scenario));
        let dropped = f64::from(requested.number() - achieved.number());

        result.requested_level = requested;
        result.fallback_occurred = true;
        result.inspection_interval_months = interval;
        result.next_inspection_date = next_inspection_date(reference_date, interval);
        result.confidence_score =
            (result.confidence_score - fallback.confidence_penalty * dropped).clamp(0.0, 1.0);
        result
            .input_parameters
            .insert("fallback_safety_factor".to_string(), factor.into());
        result.missing_data = prepend(reasons, result.missing_data);
        result
    }

    fn run_level(
        &self,
        level: CalculationLevel,
        equipment: &EquipmentData,
        data: Option<&ExtractedRbiData>,
        reference_date: NaiveDate,
    ) -> RbiCalculationResult {
        let empty = ExtractedRbiData::default();
        let data = data.unwrap_or(&empty);
        match level {
            CalculationLevel::Level1 => self.level1.calculate(equipment, reference_date),
            CalculationLevel::Level2 => self.level2.calculate(equipment, data, reference_date),
            CalculationLevel::Level3 => self.level3.calculate(equipment, data, reference_date),
        }
    }

    fn emergency_result(
        &self,
        equipment: &EquipmentData,
        requested: CalculationLevel,
        reasons: Vec<String>,
        reference_date: NaiveDate,
    ) -> RbiCalculationResult {
        let fallback = &self.ctx.config.fallback;
        let mut result = self.level1.calculate(equipment, reference_date);
        let interval = fallback.emergency_interval_months;
        let dropped = f64::from(requested.number() - CalculationLevel::Level1.number());

        result.requested_level = requested;
        result.fallback_occurred = true;
        result.risk_level = result.risk_level.max(RiskLevel::High);
        result.inspection_interval_months = interval;
        result.next_inspection_date = next_inspection_date(reference_date, interval);
        result.confidence_score =
            (result.confidence_score - fallback.confidence_penalty * dropped).clamp(0.0, 1.0);
        result.missing_data = prepend(reasons, result.missing_data);
        result
            .missing_data
            .push("fallback disabled: emergency inspection interval applied".to_string());
        result
    }
}

fn prepend(mut head: Vec<String>, tail: Vec<String>) -> Vec<String> {
    head.extend(tail);
    head
}
