//! End-to-end calculation scenarios
//!
//! Drives the public API the way an inspection planner would: build
//! equipment and inspection evidence, run a level, check the interval and
//! the audit trail on the result.

use chrono::NaiveDate;
use std::sync::Arc;

use rbi_engine::calculators::{Level3Calculator, RbiCalculator};
use rbi_engine::config::{ConfigurationManager, RbiConfig};
use rbi_engine::psv::{calculate_level_2_risk, max_allowed_leakage, BonnetType, LeakageUnit, PsvData};
use rbi_engine::risk_matrix::RiskMatrixService;
use rbi_engine::scoring::ScoringTable;
use rbi_engine::types::{
    CalculationLevel, CoatingCondition, CriticalityLevel, EquipmentData, EquipmentType,
    ExtractedRbiData, InspectionQuality, RiskLevel, ServiceType, ThicknessMeasurement,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn reference() -> NaiveDate {
    date(2024, 6, 1)
}

fn vessel() -> EquipmentData {
    EquipmentData::new(
        "V-101",
        EquipmentType::PressureVessel,
        ServiceType::CrudeOil,
        date(2004, 3, 15),
        25.0,
    )
    .expect("valid equipment")
    .with_criticality(CriticalityLevel::High)
    .with_inventory_size(15_000.0)
    .expect("valid inventory")
}

fn readings(values: &[f64], minimum_required: f64) -> Vec<ThicknessMeasurement> {
    values
        .iter()
        .enumerate()
        .map(|(i, t)| {
            ThicknessMeasurement::new(format!("TML-{i}"), *t, date(2024, 1, 10), minimum_required)
                .expect("valid reading")
        })
        .collect()
}

fn full_data() -> ExtractedRbiData {
    ExtractedRbiData {
        corrosion_rate: Some(0.2),
        coating_condition: Some(CoatingCondition::Good),
        thickness_measurements: readings(&[12.1, 12.6, 13.0], 10.0),
        last_inspection_date: Some(date(2024, 1, 10)),
        inspection_quality: Some(InspectionQuality::Good),
        ..Default::default()
    }
}

fn calculator() -> RbiCalculator {
    RbiCalculator::new(Arc::new(RbiConfig::default()))
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn psv_without_calibration_history_keeps_frequency() {
    let mut psv = PsvData::new("PSV-4401", 150.0, 0.5).expect("valid PSV");
    psv.criticality = CriticalityLevel::Critical;
    psv.service_type = ServiceType::SourGas;

    let assessment = calculate_level_2_risk(&psv, &RbiConfig::default(), reference());
    assert_eq!(assessment.risk_score, 1.0);
    assert!(assessment.fallback_to_frequency);
    assert_eq!(assessment.recommended_interval_months, psv.frequency_months);
    assert!(assessment.reason.contains("No calibration history"));
}

#[test]
fn remaining_life_from_thinnest_reading() {
    let life = Level3Calculator::calculate_remaining_life(&full_data()).expect("remaining life");
    assert!((life - 10.5).abs() < 1e-9, "got {life}");
}

#[test]
fn default_matrix_high_high_is_very_high() {
    let matrix = RiskMatrixService::default();
    assert_eq!(matrix.get_risk_level("High", "High"), RiskLevel::VeryHigh);
    assert_eq!(matrix.get_inspection_interval(RiskLevel::VeryHigh), 6);
}

#[test]
fn api527_small_metal_seat_air_allowance() {
    let mut psv = PsvData::new("PSV-1", 100.0, 0.5).expect("valid PSV");
    let allowance = max_allowed_leakage(&psv);
    assert_eq!(allowance.unit, LeakageUnit::BubblesPerMinute);
    assert_eq!(allowance.max_allowed, 40.0);

    psv.bonnet_type = BonnetType::Open;
    assert_eq!(max_allowed_leakage(&psv).max_allowed, 20.0);
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn scoring_table_rejects_out_of_range_score() {
    assert!(ScoringTable::new("corrosion_rate", [("<0.1", 10)]).is_err());
    assert!(ScoringTable::new("corrosion_rate", [("<0.1", 1), (">0.1", 5)]).is_ok());
}

#[test]
fn adjusted_interval_never_below_three_months() {
    let mut matrix = RiskMatrixService::default();
    for factor in [0.5, 1.0, 1.2, 7.5, 1000.0] {
        matrix
            .set_fallback_safety_factor("level3_to_level1", factor)
            .expect("positive factor");
        for base in 1..=120 {
            let months = matrix.calculate_adjusted_interval(base, Some("level3_to_level1"));
            assert!(months >= 3, "base {base}, factor {factor} gave {months}");
        }
    }
}

#[test]
fn negative_design_pressure_rejected() {
    let result = EquipmentData::new(
        "V-102",
        EquipmentType::PressureVessel,
        ServiceType::Water,
        date(2010, 1, 1),
        -5.0,
    );
    assert!(result.is_err());
}

#[test]
fn age_increases_with_reference_date() {
    let equipment = vessel();
    let earlier = equipment.age_years_at(date(2020, 1, 1));
    let later = equipment.age_years_at(date(2024, 1, 1));
    assert!(later > earlier);
    assert!((later - earlier - 4.0).abs() < 0.01);
}

#[test]
fn thickness_at_half_minimum_is_invalid() {
    assert!(ThicknessMeasurement::new("TML-1", 5.0, date(2024, 1, 1), 10.0).is_err());
    assert!(ThicknessMeasurement::new("TML-1", 5.001, date(2024, 1, 1), 10.0).is_ok());
}

#[test]
fn every_level_is_idempotent() {
    let calc = calculator();
    let equipment = vessel();
    let data = full_data();
    for level in [
        CalculationLevel::Level1,
        CalculationLevel::Level2,
        CalculationLevel::Level3,
    ] {
        let a = calc.calculate(&equipment, Some(&data), level, reference());
        let b = calc.calculate(&equipment, Some(&data), level, reference());
        assert!(a.same_outcome(&b), "{level} not idempotent");
        assert_eq!(a.calculation_level, level);
    }
}

// ============================================================================
// Fallback
// ============================================================================

#[test]
fn level3_without_corrosion_rate_falls_back_to_level2() {
    let mut data = full_data();
    data.corrosion_rate = None;

    let result = calculator().calculate(&vessel(), Some(&data), CalculationLevel::Level3, reference());
    assert!(result.fallback_occurred);
    assert_eq!(result.requested_level, CalculationLevel::Level3);
    assert_eq!(result.calculation_level, CalculationLevel::Level2);
    assert!(result.missing_data[0].starts_with("Level 3:"));
    assert!(result.inspection_interval_months >= 3);
    assert!(result.input_parameters.contains_key("fallback_safety_factor"));
}

#[test]
fn no_data_falls_back_to_level1() {
    let result = calculator().calculate(&vessel(), None, CalculationLevel::Level3, reference());
    assert!(result.fallback_occurred);
    assert_eq!(result.calculation_level, CalculationLevel::Level1);

    let direct = calculator().calculate(&vessel(), None, CalculationLevel::Level1, reference());
    assert!(result.inspection_interval_months <= direct.inspection_interval_months);
    assert!(result.confidence_score < direct.confidence_score);
}

#[test]
fn fallback_disabled_applies_emergency_interval() {
    let mut config = RbiConfig::default();
    config.fallback.enabled = false;
    let calc = RbiCalculator::new(Arc::new(config));

    let result = calc.calculate(&vessel(), None, CalculationLevel::Level3, reference());
    assert_eq!(result.inspection_interval_months, 6);
    assert!(result.risk_level >= RiskLevel::High);
    assert!(result
        .missing_data
        .iter()
        .any(|m| m.contains("emergency inspection interval")));
}

#[test]
fn full_data_runs_level3() {
    let result = calculator().calculate(&vessel(), Some(&full_data()), CalculationLevel::Level3, reference());
    assert!(!result.fallback_occurred);
    assert_eq!(result.calculation_level, CalculationLevel::Level3);
    // 10.5 years of remaining life leaves the risk-table interval uncapped
    assert!([6, 12, 24, 60].contains(&result.inspection_interval_months));
    assert_eq!(
        result.inspection_interval_months,
        Level3Calculator::optimal_interval(result.risk_level, Some(10.5))
    );
}

#[test]
fn short_remaining_life_caps_level3_interval() {
    let mut data = full_data();
    data.thickness_measurements = readings(&[10.5, 11.0, 11.4], 10.0);
    let life = Level3Calculator::calculate_remaining_life(&data).expect("remaining life");
    assert!(life <= 5.0, "got {life}");

    let result = calculator().calculate(&vessel(), Some(&data), CalculationLevel::Level3, reference());
    assert_eq!(result.calculation_level, CalculationLevel::Level3);
    assert!((3..=12).contains(&result.inspection_interval_months));
    assert_eq!(
        result.inspection_interval_months,
        Level3Calculator::optimal_interval(result.risk_level, Some(life))
    );
}

#[test]
fn level3_interval_table() {
    let cases = [
        (RiskLevel::VeryHigh, None, 6),
        (RiskLevel::High, None, 12),
        (RiskLevel::Medium, None, 24),
        (RiskLevel::Low, None, 60),
        (RiskLevel::Low, Some(8.0), 60),
        (RiskLevel::Medium, Some(6.0), 24),
        (RiskLevel::Low, Some(5.0), 12),
        (RiskLevel::Low, Some(1.0), 12),
        (RiskLevel::Low, Some(0.1), 12),
        (RiskLevel::VeryHigh, Some(0.5), 6),
    ];
    for (risk, life, expected) in cases {
        assert_eq!(
            Level3Calculator::optimal_interval(risk, life),
            expected,
            "{risk} with remaining life {life:?}"
        );
    }
}

// ============================================================================
// Configuration round-trips
// ============================================================================

fn customised_manager() -> ConfigurationManager {
    let manager = ConfigurationManager::default();
    manager
        .apply_configuration_template("conservative")
        .expect("known template");
    manager
        .update(|config| {
            config.fallback.emergency_interval_months = 3;
            config.level1.base_intervals.insert("tank".to_string(), 72);
        })
        .expect("valid update");
    manager
}

#[test]
fn export_import_round_trip() {
    let source = customised_manager();
    let exported = source.export_configuration().expect("export");

    let target = ConfigurationManager::default();
    let summary = target.import_configuration(&exported).expect("import");
    assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);

    let (a, b) = (source.snapshot(), target.snapshot());
    assert_eq!(a.scoring_tables, b.scoring_tables);
    assert_eq!(a.risk_matrix, b.risk_matrix);
    assert_eq!(a.risk_matrix.inspection_intervals, b.risk_matrix.inspection_intervals);
    assert_eq!(*a, *b);
}

#[test]
fn file_round_trip_json_and_toml() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = customised_manager();

    for name in ["rbi_config.json", "rbi_config.toml"] {
        let path = dir.path().join(name);
        source.export_to_file(&path).expect("export to file");

        let target = ConfigurationManager::default();
        target.import_from_file(&path).expect("import from file");
        assert_eq!(*source.snapshot(), *target.snapshot(), "{name} round trip");
    }
}

#[test]
fn unknown_template_rejected() {
    let manager = ConfigurationManager::default();
    let before = manager.snapshot();
    assert!(manager.apply_configuration_template("reckless").is_err());
    assert_eq!(*before, *manager.snapshot());
}

#[test]
fn section_import_leaves_other_sections() {
    let manager = ConfigurationManager::default();
    let patch = serde_json::json!({
        "fallback": { "emergency_interval_months": 4 }
    });
    manager.import_configuration(&patch).expect("import");

    let config = manager.snapshot();
    assert_eq!(config.fallback.emergency_interval_months, 4);
    assert!(config.fallback.enabled);
    assert_eq!(config.risk_matrix, RbiConfig::default().risk_matrix);
}
