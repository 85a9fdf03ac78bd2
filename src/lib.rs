//! RBI Engine: Risk-Based Inspection planning
//!
//! Multi-level calculation of inspection intervals for pressure equipment
//! and pressure safety valves.
//!
//! ## Architecture
//!
//! - **Scoring Tables**: raw parameter values to 1-5 scores, weighted per dimension
//! - **Risk Matrix**: PoF × CoF bands to risk level, risk level to interval
//! - **Calculators**: Level 1 (screening), Level 2 (semi-quantitative),
//!   Level 3 (quantitative), with automatic fallback
//! - **PSV**: Level 2 risk from pop and leak test history (API 527 leakage)
//! - **Configuration**: TOML/JSON config with validation and atomic snapshots
//! - **Batch**: bounded-parallel calculation with a coalescing result cache

pub mod batch;
pub mod calculators;
pub mod config;
pub mod logging;
pub mod psv;
pub mod risk_matrix;
pub mod scoring;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, ConfigurationManager, RbiConfig};

// Re-export commonly used types
pub use types::{
    CalculationLevel, CofDimension, CriticalityLevel, DataError, EquipmentData, EquipmentType,
    ExtractedRbiData, RbiCalculationResult, RiskLevel, ServiceType,
};

// Re-export calculators
pub use calculators::{Level1Calculator, Level2Calculator, Level3Calculator, RbiCalculator};

// Re-export services
pub use risk_matrix::{MatrixPreset, RiskMatrixService};
pub use scoring::{ScoringTable, ScoringTablesService};

// Re-export PSV assessment
pub use psv::{calculate_level_2_risk, PsvData, PsvRiskAssessment};

// Re-export batch service
pub use batch::{
    BatchCalculationRequest, BatchCalculationResult, BatchCalculationService,
    EquipmentDataSource, ErrorHandling,
};
