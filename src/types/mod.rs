//! Shared data structures for Risk-Based Inspection
//!
//! - Equipment master data and extracted inspection evidence (inputs)
//! - Calculation levels, risk levels, CoF dimensions
//! - `RbiCalculationResult` (output of every calculator)

mod equipment;
mod result;

pub use equipment::*;
pub use result::*;
