//! Equipment data source abstraction for batch calculations.
//!
//! The batch service never talks to an asset register directly; it asks an
//! [`EquipmentDataSource`] for the equipment record and whatever inspection
//! data has been extracted for it.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::types::{EquipmentData, ExtractedRbiData};

/// Trait abstracting where equipment records come from.
#[async_trait]
pub trait EquipmentDataSource: Send + Sync {
    /// Fetch the equipment record. Unknown IDs are an error.
    async fn equipment(&self, equipment_id: &str) -> Result<EquipmentData>;

    /// Fetch extracted inspection data, `None` when nothing has been extracted.
    async fn extracted_data(&self, equipment_id: &str) -> Result<Option<ExtractedRbiData>>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str {
        "unnamed"
    }
}

// ============================================================================
// In-memory source
// ============================================================================

/// Source backed by maps, with an optional per-fetch delay.
#[derive(Debug, Default)]
pub struct InMemoryDataSource {
    equipment: HashMap<String, EquipmentData>,
    extracted: HashMap<String, ExtractedRbiData>,
    delay_ms: u64,
    fetch_log: Mutex<Vec<String>>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equipment(mut self, equipment: EquipmentData) -> Self {
        self.insert_equipment(equipment);
        self
    }

    pub fn with_extracted_data(mut self, equipment_id: &str, data: ExtractedRbiData) -> Self {
        self.extracted.insert(equipment_id.to_string(), data);
        self
    }

    /// Sleep this long on every equipment fetch.
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn insert_equipment(&mut self, equipment: EquipmentData) {
        self.equipment
            .insert(equipment.equipment_id.clone(), equipment);
    }

    /// Equipment IDs in the order they were requested.
    pub fn fetched_ids(&self) -> Vec<String> {
        self.fetch_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl EquipmentDataSource for InMemoryDataSource {
    async fn equipment(&self, equipment_id: &str) -> Result<EquipmentData> {
        self.fetch_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(equipment_id.to_string());
        if self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        self.equipment
            .get(equipment_id)
            .cloned()
            .ok_or_else(|| anyhow!("equipment {equipment_id} not found"))
    }

    async fn extracted_data(&self, equipment_id: &str) -> Result<Option<ExtractedRbiData>> {
        Ok(self.extracted.get(equipment_id).cloned())
    }

    fn source_name(&self) -> &str {
        "in-memory"
    }
}
