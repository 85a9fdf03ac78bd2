//! Level 2: semi-quantitative scoring
//!
//! Weighted PoF and per-dimension CoF scores are banded and looked up in
//! the risk matrix. A score never becomes a month count directly; the
//! interval always comes from the matrix.

use chrono::NaiveDate;
use std::sync::Arc;

use super::{
    audit_cof_parameters, cof_parameters, equipment_pof_parameters, CalculationContext,
    LevelOutcome,
};
use crate::config::defaults::MIN_INTERVAL_MONTHS;
use crate::config::RbiConfig;
use crate::risk_matrix::{RiskBand, RiskMatrixService};
use crate::scoring::params;
use crate::types::{
    CalculationLevel, EquipmentData, ExtractedRbiData, ParameterSet, RbiCalculationResult,
    RiskLevel,
};

/// Quality factor assumed when the inspection quality is unknown.
const UNKNOWN_QUALITY_FACTOR: f64 = 0.5;

/// Risk level and interval for a PoF / CoF score pair.
///
/// Scores are banded, the matrix gives the risk level and its interval, the
/// interval is capped by `reference_months` (the equipment's own frequency)
/// when known and floored at 3 months.
pub fn get_interval_from_risk_score(
    matrix: &RiskMatrixService,
    pof_score: f64,
    cof_score: f64,
    reference_months: Option<u32>,
) -> (RiskLevel, u32) {
    let risk = matrix.risk_level(RiskBand::from_score(pof_score), RiskBand::from_score(cof_score));
    let mut months = matrix.get_inspection_interval(risk);
    if let Some(reference) = reference_months.filter(|m| *m > 0) {
        months = months.min(reference);
    }
    (risk, months.max(MIN_INTERVAL_MONTHS))
}

#[derive(Debug, Clone)]
pub struct Level2Calculator {
    ctx: Arc<CalculationContext>,
}

impl Level2Calculator {
    pub fn new(config: Arc<RbiConfig>) -> Self {
        Self::with_context(Arc::new(CalculationContext::new(config)))
    }

    pub(crate) fn with_context(ctx: Arc<CalculationContext>) -> Self {
        Self { ctx }
    }

    /// Every PoF parameter the data supports.
    pub fn pof_parameters(
        equipment: &EquipmentData,
        data: &ExtractedRbiData,
        reference_date: NaiveDate,
    ) -> ParameterSet {
        let mut values = equipment_pof_parameters(equipment, reference_date);
        if let Some(rate) = data.corrosion_rate {
            values.insert(params::CORROSION_RATE.to_string(), rate.into());
        }
        values.insert(
            params::DAMAGE_MECHANISMS.to_string(),
            data.damage_mechanisms.len().into(),
        );
        if let Some(coating) = data.coating_condition {
            values.insert(params::COATING_CONDITION.to_string(), coating.as_str().into());
        }
        if let Some(quality) = data.inspection_quality {
            values.insert(
                params::INSPECTION_EFFECTIVENESS.to_string(),
                quality.as_str().into(),
            );
        }
        values.insert(
            params::SEVERE_FINDINGS.to_string(),
            data.severe_finding_count().into(),
        );
        values
    }

    pub fn calculate(
        &self,
        equipment: &EquipmentData,
        data: &ExtractedRbiData,
        reference_date: NaiveDate,
    ) -> RbiCalculationResult {
        let ctx = &self.ctx;

        let pof_values = Self::pof_parameters(equipment, data, reference_date);
        let cof_values = cof_parameters(equipment);
        let pof_score = ctx.scoring.calculate_pof_score(&pof_values);
        let cof_scores = ctx.scoring.calculate_cof_scores(&cof_values);
        let (risk_level, interval_months) = get_interval_from_risk_score(
            &ctx.matrix,
            pof_score,
            ctx.overall_cof(&cof_scores),
            equipment.inspection_frequency_months,
        );

        let mut missing_data = Vec::new();
        if data.corrosion_rate.is_none() {
            missing_data.push("corrosion_rate".to_string());
        }
        if data.coating_condition.is_none() {
            missing_data.push("coating_condition".to_string());
        }
        if data.inspection_quality.is_none() {
            missing_data.push("inspection_quality".to_string());
        }
        let mut estimated_parameters = Vec::new();
        if equipment.inventory_size.is_none() {
            estimated_parameters.push("inventory_size".to_string());
        }

        let available = [
            data.corrosion_rate.is_some(),
            data.coating_condition.is_some(),
            data.inspection_quality.is_some(),
            data.last_inspection_date.is_some(),
            !data.thickness_measurements.is_empty(),
        ];
        let availability =
            available.iter().filter(|a| **a).count() as f64 / available.len() as f64;
        let quality = data
            .inspection_quality
            .map_or(UNKNOWN_QUALITY_FACTOR, |q| q.factor());

        let mut input_parameters = pof_values;
        audit_cof_parameters(&mut input_parameters, &cof_values);

        ctx.finish(
            equipment,
            LevelOutcome {
                level: CalculationLevel::Level2,
                pof_score,
                cof_scores,
                risk_level,
                interval_months,
                confidence: 0.5 + 0.25 * availability + 0.15 * quality,
                data_quality: 0.6 * availability + 0.4 * quality,
                input_parameters,
                missing_data,
                estimated_parameters,
            },
            reference_date,
        )
    }
}
