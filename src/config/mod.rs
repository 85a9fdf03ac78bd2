//! RBI Configuration Module
//!
//! Scoring tables, risk matrix, level requirements and weighting factors,
//! loaded from TOML and replaceable at runtime.
//!
//! ## Loading Order
//!
//! 1. `RBI_CONFIG` environment variable (path to TOML file)
//! 2. `rbi_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! ```ignore
//! let manager = ConfigurationManager::new(RbiConfig::load())?;
//!
//! // Calculators take a consistent snapshot per calculation:
//! let config = manager.snapshot();
//! let interval = config.risk_matrix.inspection_intervals.high;
//! ```

pub mod defaults;
pub mod manager;
mod rbi_config;
pub mod validation;

pub use manager::{ConfigurationHealth, ConfigurationManager};
pub use rbi_config::*;
