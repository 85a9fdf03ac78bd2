//! PSV Level 2 risk from bench-test history
//!
//! The latest calibration's pop-test and seat-leakage deviations are scored
//! through the configured tables, blended by weight and routed through the
//! risk matrix. A valve with no usable test history keeps its current
//! frequency.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use super::api527::{leak_test_deviation, max_allowed_leakage, LeakageAllowance};
use super::PsvData;
use crate::calculators::{get_interval_from_risk_score, next_inspection_date};
use crate::config::defaults::{MIN_INTERVAL_MONTHS, UNMATCHED_NUMERIC_SCORE};
use crate::config::RbiConfig;
use crate::risk_matrix::{RiskBand, RiskMatrixService};
use crate::scoring::params;
use crate::types::{ParameterValue, RiskLevel};

/// Risk score assigned when there is no test evidence to score.
const NO_HISTORY_RISK_SCORE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsvRiskAssessment {
    pub tag: String,
    /// Blended test score (1-5)
    pub risk_score: f64,
    pub pop_test_deviation_pct: Option<f64>,
    pub leak_test_deviation_pct: Option<f64>,
    pub pop_score: Option<u8>,
    pub leak_score: Option<u8>,
    pub allowable_leakage: LeakageAllowance,
    pub cof_score: f64,
    pub risk_level: RiskLevel,
    pub recommended_interval_months: u32,
    pub next_test_date: NaiveDate,
    /// True when the current frequency was kept for lack of test evidence
    pub fallback_to_frequency: bool,
    pub reason: String,
}

/// Consequence score from the economic criticality table.
fn criticality_cof(psv: &PsvData, config: &RbiConfig) -> f64 {
    config
        .scoring_tables
        .cof
        .economic
        .get(params::CRITICALITY)
        .map_or(f64::from(UNMATCHED_NUMERIC_SCORE), |table| {
            f64::from(table.score(&ParameterValue::from(psv.criticality.as_str())))
        })
}

pub fn calculate_level_2_risk(
    psv: &PsvData,
    config: &RbiConfig,
    reference_date: NaiveDate,
) -> PsvRiskAssessment {
    let matrix = RiskMatrixService::new(config.risk_matrix.clone());
    let settings = &config.psv;
    let allowance = max_allowed_leakage(psv);
    let cof_score = criticality_cof(psv, config);

    let latest = psv.latest_calibration();
    let pop_deviation = latest.and_then(|c| c.pop_pressure()).map(|pop| {
        let reference = psv.test_pressure();
        (pop - reference).abs() / reference * 100.0
    });
    let leak_deviation = latest
        .and_then(|c| c.leak_test_result)
        .map(|measured| leak_test_deviation(measured, &allowance));

    if pop_deviation.is_none() && leak_deviation.is_none() {
        let reason = if latest.is_none() {
            "No calibration history available; using equipment frequency"
        } else {
            "Latest calibration has no pop or leak test results; using equipment frequency"
        };
        info!(tag = %psv.tag, reason, "PSV keeps its current test frequency");

        let months = psv.frequency_months.max(MIN_INTERVAL_MONTHS);
        let risk_level = matrix.risk_level(
            RiskBand::from_score(NO_HISTORY_RISK_SCORE),
            RiskBand::from_score(cof_score),
        );
        return PsvRiskAssessment {
            tag: psv.tag.clone(),
            risk_score: NO_HISTORY_RISK_SCORE,
            pop_test_deviation_pct: None,
            leak_test_deviation_pct: None,
            pop_score: None,
            leak_score: None,
            allowable_leakage: allowance,
            cof_score,
            risk_level,
            recommended_interval_months: months,
            next_test_date: next_inspection_date(reference_date, months),
            fallback_to_frequency: true,
            reason: reason.to_string(),
        };
    }

    let pop_score = pop_deviation.map(|d| settings.pop_test_table.score(&d.into()));
    let leak_score = leak_deviation.map(|d| settings.leak_test_table.score(&d.into()));

    let components = [
        (pop_score, settings.pop_weight),
        (leak_score, settings.leak_weight),
    ];
    let (weighted, total_weight) = components
        .iter()
        .filter_map(|(score, weight)| score.map(|s| (f64::from(s), weight.max(0.0))))
        .fold((0.0, 0.0), |(sum, total), (s, w)| (sum + s * w, total + w));
    let risk_score = if total_weight > 0.0 {
        weighted / total_weight
    } else {
        // Every weight zeroed: plain mean of what was scored
        let scored: Vec<f64> = components
            .iter()
            .filter_map(|(s, _)| s.map(f64::from))
            .collect();
        scored.iter().sum::<f64>() / scored.len() as f64
    };

    let (risk_level, months) = get_interval_from_risk_score(
        &matrix,
        risk_score,
        cof_score,
        Some(psv.frequency_months),
    );

    let mut reason_parts = Vec::new();
    if let (Some(d), Some(s)) = (pop_deviation, pop_score) {
        reason_parts.push(format!("pop test deviation {d:.1}% (score {s})"));
    }
    if let (Some(d), Some(s)) = (leak_deviation, leak_score) {
        reason_parts.push(format!("leak test exceedance {d:.1}% (score {s})"));
    }
    reason_parts.push(format!("{risk_level} risk"));

    debug!(
        tag = %psv.tag,
        risk_score,
        cof_score,
        risk_level = %risk_level,
        interval_months = months,
        "PSV Level 2 assessment"
    );

    PsvRiskAssessment {
        tag: psv.tag.clone(),
        risk_score,
        pop_test_deviation_pct: pop_deviation,
        leak_test_deviation_pct: leak_deviation,
        pop_score,
        leak_score,
        allowable_leakage: allowance,
        cof_score,
        risk_level,
        recommended_interval_months: months,
        next_test_date: next_inspection_date(reference_date, months),
        fallback_to_frequency: false,
        reason: reason_parts.join("; "),
    }
}
