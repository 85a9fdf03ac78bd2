//! Read-through result cache owned by a batch service instance
//!
//! One `OnceCell` per (equipment_id, level, reference_date) key: concurrent
//! requests for the same key wait on a single computation. The whole cache is dropped when
//! the configuration version it was filled under changes.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::types::{CalculationLevel, RbiCalculationResult};

/// Results depend on the reference date through equipment age and the next
/// inspection date, so it is part of the key.
pub type CacheKey = (String, CalculationLevel, NaiveDate);

#[derive(Debug, Default)]
struct CacheState {
    config_version: u64,
    entries: HashMap<CacheKey, Arc<OnceCell<RbiCalculationResult>>>,
}

/// Where a cached lookup's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

#[derive(Debug, Default)]
pub struct ResultCache {
    state: Mutex<CacheState>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cell(&self, key: CacheKey, config_version: u64) -> Arc<OnceCell<RbiCalculationResult>> {
        let mut state = self.lock();
        if state.config_version != config_version {
            if !state.entries.is_empty() {
                debug!(
                    old_version = state.config_version,
                    new_version = config_version,
                    dropped = state.entries.len(),
                    "Configuration changed, clearing result cache"
                );
            }
            state.entries.clear();
            state.config_version = config_version;
        }
        Arc::clone(state.entries.entry(key).or_default())
    }

    /// Return the cached result for `key`, computing it at most once.
    ///
    /// A failed computation leaves the key empty so a later request retries.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: CacheKey,
        config_version: u64,
        compute: F,
    ) -> anyhow::Result<(RbiCalculationResult, CacheOutcome)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<RbiCalculationResult>>,
    {
        let cell = self.cell(key, config_version);
        let mut computed = false;
        let result = cell
            .get_or_try_init(|| {
                computed = true;
                compute()
            })
            .await?;
        let outcome = if computed {
            CacheOutcome::Miss
        } else {
            CacheOutcome::Hit
        };
        Ok((result.clone(), outcome))
    }

    /// Number of keys holding a computed result.
    pub fn len(&self) -> usize {
        self.lock()
            .entries
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }
}
