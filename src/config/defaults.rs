//! System-wide default constants.
//!
//! Centralises the conversion factors and safety limits that the calculators
//! share. Grouped by subsystem for easy discovery.

// ============================================================================
// Calendar
// ============================================================================

/// Days per month used for every interval → date conversion.
///
/// Intervals are planned in whole months; the next inspection date is
/// `reference_date + interval_months * DAYS_PER_MONTH` days.
pub const DAYS_PER_MONTH: i64 = 30;

/// Days per year used for equipment age.
pub const DAYS_PER_YEAR: f64 = 365.25;

// ============================================================================
// Interval safety limits
// ============================================================================

/// Hard floor on any adjusted inspection interval (months).
///
/// Applied after fallback safety factors. No configuration can go below it.
pub const MIN_INTERVAL_MONTHS: u32 = 3;

/// Interval returned by the risk matrix when a risk level has no configured
/// interval (months).
pub const DEFAULT_INSPECTION_INTERVAL_MONTHS: u32 = 24;

/// Valid range for configured risk-matrix intervals (months).
pub const MATRIX_INTERVAL_RANGE: (u32, u32) = (1, 120);

// ============================================================================
// Scoring
// ============================================================================

/// Score assigned when a numeric value matches no configured range.
///
/// Unknown → medium risk.
pub const UNMATCHED_NUMERIC_SCORE: u8 = 3;

/// Valid score range for every scoring table entry.
pub const SCORE_RANGE: (u8, u8) = (1, 5);

/// Allowed deviation of a weight group from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

// ============================================================================
// Level 3
// ============================================================================

/// Baseline annual probability of failure before degradation multipliers.
pub const BASE_FAILURE_RATE: f64 = 0.001;

/// Remaining life (years) at or below which the interval is capped.
pub const SHORT_REMAINING_LIFE_YEARS: f64 = 5.0;

/// Interval cap applied for short remaining life (months).
pub const SHORT_REMAINING_LIFE_CAP_MONTHS: u32 = 12;

/// Upper bound on a Level 3 computed interval (months).
pub const LEVEL3_MAX_INTERVAL_MONTHS: u32 = 60;

/// Thickness readings recommended for a trustworthy Level 3 trend.
pub const RECOMMENDED_THICKNESS_POINTS: usize = 3;

// ============================================================================
// Batch
// ============================================================================

/// Default worker concurrency for batch runs.
pub const DEFAULT_MAX_PARALLEL: usize = 10;

/// Upper bound on recommended chunk size from `optimize_batch_size`.
pub const MAX_BATCH_CHUNK: usize = 200;
