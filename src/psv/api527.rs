//! API 527 seat-tightness allowances
//!
//! Maximum permitted bench leakage for a valve, and the percentage by
//! which a measured leakage exceeds it.

use serde::{Deserialize, Serialize};

use super::{BonnetType, PsvData, ReliefService, SeatType, TestMedium, ValveType};

/// Orifice size separating the small-orifice and large-orifice columns (in).
const SMALL_ORIFICE_MAX_IN: f64 = 0.7;

/// Metal-seated valves tested with air: (max set pressure psig,
/// bubbles/min for small orifices, bubbles/min for large orifices).
const AIR_METAL_SEAT_TABLE: [(f64, f64, f64); 8] = [
    (1000.0, 40.0, 20.0),
    (1500.0, 60.0, 30.0),
    (2000.0, 80.0, 40.0),
    (2500.0, 100.0, 50.0),
    (3000.0, 100.0, 60.0),
    (4000.0, 100.0, 80.0),
    (5000.0, 100.0, 100.0),
    (6000.0, 100.0, 100.0),
];

/// Water test allowance per inch of nominal inlet size (cc/hr).
const WATER_CC_PER_HR_PER_INLET_IN: f64 = 10.0;

/// Deviation reported for any leakage against a zero allowance (%).
pub const ZERO_ALLOWANCE_EXCEEDANCE_PCT: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakageUnit {
    BubblesPerMinute,
    CubicCentimetresPerHour,
    /// No visible leakage permitted
    ZeroVisible,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeakageAllowance {
    pub max_allowed: f64,
    pub unit: LeakageUnit,
}

impl LeakageAllowance {
    const fn zero() -> Self {
        Self {
            max_allowed: 0.0,
            unit: LeakageUnit::ZeroVisible,
        }
    }
}

/// Maximum allowed seat leakage for the valve's bench test.
///
/// Boiler-service and pilot-operated valves allow no leakage. An open
/// bonnet halves the tabulated value.
pub fn max_allowed_leakage(psv: &PsvData) -> LeakageAllowance {
    if psv.relief_service == ReliefService::Boiler || psv.valve_type == ValveType::PilotOperated {
        return LeakageAllowance::zero();
    }

    let base = match (psv.test_medium, psv.seat_type) {
        (TestMedium::Steam, _) | (_, SeatType::Soft) => return LeakageAllowance::zero(),
        (TestMedium::Water, SeatType::Metal) => LeakageAllowance {
            max_allowed: (psv.inlet_size_in * WATER_CC_PER_HR_PER_INLET_IN)
                .max(WATER_CC_PER_HR_PER_INLET_IN),
            unit: LeakageUnit::CubicCentimetresPerHour,
        },
        (TestMedium::Air, SeatType::Metal) => LeakageAllowance {
            max_allowed: air_metal_seat_allowance(psv.set_pressure_psig, psv.orifice_size_in),
            unit: LeakageUnit::BubblesPerMinute,
        },
    };

    match psv.bonnet_type {
        BonnetType::Open => LeakageAllowance {
            max_allowed: base.max_allowed / 2.0,
            ..base
        },
        BonnetType::Closed => base,
    }
}

/// Table row covering `set_pressure`; pressures above the table use the last row.
fn air_metal_seat_allowance(set_pressure_psig: f64, orifice_size_in: f64) -> f64 {
    let (_, small, large) = AIR_METAL_SEAT_TABLE
        .iter()
        .copied()
        .find(|(max_psig, _, _)| set_pressure_psig <= *max_psig)
        .unwrap_or(AIR_METAL_SEAT_TABLE[AIR_METAL_SEAT_TABLE.len() - 1]);

    if orifice_size_in <= SMALL_ORIFICE_MAX_IN {
        small
    } else {
        large
    }
}

/// Percentage by which `measured` exceeds the allowance, never negative.
/// Any leakage against a zero allowance is a full-scale exceedance.
pub fn leak_test_deviation(measured: f64, allowance: &LeakageAllowance) -> f64 {
    let measured = measured.max(0.0);
    if allowance.max_allowed <= 0.0 {
        return if measured > 0.0 {
            ZERO_ALLOWANCE_EXCEEDANCE_PCT
        } else {
            0.0
        };
    }
    ((measured - allowance.max_allowed) / allowance.max_allowed * 100.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn air_valve(set_pressure: f64, orifice: f64) -> PsvData {
        PsvData::new("PSV-527", set_pressure, orifice).unwrap()
    }

    #[test]
    fn test_small_orifice_low_pressure_row() {
        let allowance = max_allowed_leakage(&air_valve(100.0, 0.5));
        assert_eq!(allowance.max_allowed, 40.0);
        assert_eq!(allowance.unit, LeakageUnit::BubblesPerMinute);
    }

    #[test]
    fn test_large_orifice_uses_second_column() {
        assert_eq!(max_allowed_leakage(&air_valve(100.0, 1.2)).max_allowed, 20.0);
        assert_eq!(max_allowed_leakage(&air_valve(1200.0, 1.2)).max_allowed, 30.0);
    }

    #[test]
    fn test_pressure_above_table_uses_last_row() {
        assert_eq!(max_allowed_leakage(&air_valve(9000.0, 0.5)).max_allowed, 100.0);
    }

    #[test]
    fn test_open_bonnet_halves_allowance() {
        let mut psv = air_valve(100.0, 0.5);
        psv.bonnet_type = BonnetType::Open;
        assert_eq!(max_allowed_leakage(&psv).max_allowed, 20.0);
    }

    #[test]
    fn test_zero_allowance_cases() {
        let mut boiler = air_valve(100.0, 0.5);
        boiler.relief_service = ReliefService::Boiler;
        assert_eq!(max_allowed_leakage(&boiler).max_allowed, 0.0);

        let mut pilot = air_valve(100.0, 0.5);
        pilot.valve_type = ValveType::PilotOperated;
        assert_eq!(max_allowed_leakage(&pilot).max_allowed, 0.0);

        let mut soft = air_valve(100.0, 0.5);
        soft.seat_type = SeatType::Soft;
        assert_eq!(max_allowed_leakage(&soft).unit, LeakageUnit::ZeroVisible);
    }

    #[test]
    fn test_water_allowance_scales_with_inlet() {
        let mut psv = air_valve(100.0, 0.5);
        psv.test_medium = TestMedium::Water;
        psv.inlet_size_in = 2.0;
        let allowance = max_allowed_leakage(&psv);
        assert_eq!(allowance.max_allowed, 20.0);
        assert_eq!(allowance.unit, LeakageUnit::CubicCentimetresPerHour);

        psv.inlet_size_in = 0.5;
        assert_eq!(max_allowed_leakage(&psv).max_allowed, 10.0);
    }

    #[test]
    fn test_deviation() {
        let allowance = LeakageAllowance {
            max_allowed: 40.0,
            unit: LeakageUnit::BubblesPerMinute,
        };
        assert_eq!(leak_test_deviation(30.0, &allowance), 0.0);
        assert_eq!(leak_test_deviation(60.0, &allowance), 50.0);
        assert_eq!(leak_test_deviation(5.0, &LeakageAllowance::zero()), 200.0);
        assert_eq!(leak_test_deviation(0.0, &LeakageAllowance::zero()), 0.0);
    }
}
