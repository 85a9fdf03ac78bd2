//! Level 1: fixed-interval screening
//!
//! `interval = base × service modifier × criticality modifier`, rounded and
//! clamped to the configured bounds. The base is the equipment's stored
//! frequency when the asset register has one, otherwise the per-type table.

use chrono::NaiveDate;
use std::sync::Arc;

use super::{
    audit_cof_parameters, cof_parameters, equipment_pof_parameters, CalculationContext,
    LevelOutcome,
};
use crate::config::RbiConfig;
use crate::risk_matrix::RiskBand;
use crate::types::{CalculationLevel, EquipmentData, RbiCalculationResult};

#[derive(Debug, Clone)]
pub struct Level1Calculator {
    ctx: Arc<CalculationContext>,
}

fn modifier(table: &std::collections::BTreeMap<String, f64>, key: &str) -> f64 {
    table
        .get(key)
        .copied()
        .filter(|m| m.is_finite() && *m > 0.0)
        .unwrap_or(1.0)
}

impl Level1Calculator {
    pub fn new(config: Arc<RbiConfig>) -> Self {
        Self::with_context(Arc::new(CalculationContext::new(config)))
    }

    pub(crate) fn with_context(ctx: Arc<CalculationContext>) -> Self {
        Self { ctx }
    }

    /// Stored frequency, else the per-type base, else the default base (months).
    pub fn base_interval(&self, equipment: &EquipmentData) -> u32 {
        let settings = &self.ctx.config.level1;
        equipment
            .inspection_frequency_months
            .filter(|m| *m > 0)
            .or_else(|| {
                settings
                    .base_intervals
                    .get(equipment.equipment_type.as_str())
                    .copied()
            })
            .unwrap_or(settings.default_base_interval_months)
    }

    pub fn calculate_interval(&self, equipment: &EquipmentData) -> u32 {
        let settings = &self.ctx.config.level1;
        let service = modifier(&settings.service_modifiers, equipment.service_type.as_str());
        let criticality = modifier(
            &settings.criticality_modifiers,
            equipment.criticality_level.as_str(),
        );
        let raw = (f64::from(self.base_interval(equipment)) * service * criticality).round();
        // Saturating cast, then clamp without panicking on inverted bounds
        let months = raw as u32;
        months
            .max(settings.min_interval_months)
            .min(settings.max_interval_months.max(settings.min_interval_months))
    }

    /// Always succeeds.
    pub fn calculate(
        &self,
        equipment: &EquipmentData,
        reference_date: NaiveDate,
    ) -> RbiCalculationResult {
        let ctx = &self.ctx;
        let settings = &ctx.config.level1;

        let pof_values = equipment_pof_parameters(equipment, reference_date);
        let cof_values = cof_parameters(equipment);
        let pof_score = ctx.scoring.calculate_pof_score(&pof_values);
        let cof_scores = ctx.scoring.calculate_cof_scores(&cof_values);
        let risk_level = ctx.matrix.risk_level(
            RiskBand::from_score(pof_score),
            RiskBand::from_score(ctx.overall_cof(&cof_scores)),
        );
        let interval_months = self.calculate_interval(equipment);

        let mut input_parameters = pof_values;
        audit_cof_parameters(&mut input_parameters, &cof_values);
        input_parameters.insert(
            "base_interval_months".to_string(),
            f64::from(self.base_interval(equipment)).into(),
        );
        input_parameters.insert(
            "service_modifier".to_string(),
            modifier(&settings.service_modifiers, equipment.service_type.as_str()).into(),
        );
        input_parameters.insert(
            "criticality_modifier".to_string(),
            modifier(
                &settings.criticality_modifiers,
                equipment.criticality_level.as_str(),
            )
            .into(),
        );

        let mut estimated_parameters = vec!["pof_score".to_string()];
        if equipment.inventory_size.is_none() {
            estimated_parameters.push("inventory_size".to_string());
        }

        let known = [
            equipment.inventory_size.is_some(),
            equipment.inspection_frequency_months.is_some(),
            equipment.coating_type.is_some(),
            !equipment.material.is_empty(),
            !equipment.location.is_empty(),
        ];
        let completeness = known.iter().filter(|k| **k).count() as f64 / known.len() as f64;
        let confidence = 0.4
            + 0.1 * f64::from(u8::from(equipment.inspection_frequency_months.is_some()))
            + 0.1 * f64::from(u8::from(equipment.inventory_size.is_some()));

        ctx.finish(
            equipment,
            LevelOutcome {
                level: CalculationLevel::Level1,
                pof_score,
                cof_scores,
                risk_level,
                interval_months,
                confidence,
                data_quality: 0.3 + 0.5 * completeness,
                input_parameters,
                missing_data: Vec::new(),
                estimated_parameters,
            },
            reference_date,
        )
    }
}
