//! Batch RBI calculation
//!
//! Calculates many equipment items concurrently against one configuration
//! snapshot. Dispatch happens in priority order on the calling task; each
//! item runs as a tokio task holding a semaphore permit, so at most
//! `max_parallel` calculations are in flight. Results go through the
//! service's [`ResultCache`].

pub mod cache;
pub mod source;

pub use cache::{CacheKey, CacheOutcome, ResultCache};
pub use source::{EquipmentDataSource, InMemoryDataSource};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::calculators::RbiCalculator;
use crate::config::defaults::{DEFAULT_MAX_PARALLEL, MAX_BATCH_CHUNK};
use crate::config::ConfigurationManager;
use crate::types::{CalculationLevel, RbiCalculationResult};

/// Invoked with `(completed, total)` after each item finishes.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// What to do when an item fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    /// Record the failure and keep going
    #[default]
    Continue,
    /// Stop dispatching after the first failure; in-flight items finish
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    CompletedWithErrors,
    /// A failure under [`ErrorHandling::Stop`] halted dispatch
    Stopped,
    /// Deadline passed under [`ErrorHandling::Continue`]; partial results
    TimedOut,
    /// Deadline passed under [`ErrorHandling::Stop`]
    Aborted,
}

// ============================================================================
// Request
// ============================================================================

#[derive(Clone)]
pub struct BatchCalculationRequest {
    pub equipment_ids: Vec<String>,
    pub requested_level: CalculationLevel,
    pub max_parallel: usize,
    pub cache_enabled: bool,
    pub progress_callback: Option<ProgressCallback>,
    pub error_handling: ErrorHandling,
    /// Moved to the front of the queue, in this order
    pub priority_equipment: Vec<String>,
    pub timeout_seconds: Option<u64>,
    /// Date every interval is measured from; today (UTC) when unset
    pub reference_date: Option<NaiveDate>,
}

impl std::fmt::Debug for BatchCalculationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCalculationRequest")
            .field("equipment_ids", &self.equipment_ids)
            .field("requested_level", &self.requested_level)
            .field("max_parallel", &self.max_parallel)
            .field("cache_enabled", &self.cache_enabled)
            .field("progress_callback", &self.progress_callback.is_some())
            .field("error_handling", &self.error_handling)
            .field("priority_equipment", &self.priority_equipment)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("reference_date", &self.reference_date)
            .finish()
    }
}

impl BatchCalculationRequest {
    pub fn new<I, S>(equipment_ids: I, requested_level: CalculationLevel) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            equipment_ids: equipment_ids.into_iter().map(Into::into).collect(),
            requested_level,
            max_parallel: DEFAULT_MAX_PARALLEL,
            cache_enabled: true,
            progress_callback: None,
            error_handling: ErrorHandling::Continue,
            priority_equipment: Vec::new(),
            timeout_seconds: None,
            reference_date: None,
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_progress_callback(mut self, callback: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_error_handling(mut self, policy: ErrorHandling) -> Self {
        self.error_handling = policy;
        self
    }

    pub fn with_priority<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority_equipment = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    /// Work queue: priority IDs first (in priority order), then the rest in
    /// request order. Repeated IDs are kept.
    pub fn dispatch_order(&self) -> Vec<String> {
        let rank: HashMap<&str, usize> = self
            .priority_equipment
            .iter()
            .enumerate()
            .rev()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let mut ordered: Vec<(usize, usize, &String)> = self
            .equipment_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (rank.get(id.as_str()).copied().unwrap_or(usize::MAX), i, id))
            .collect();
        ordered.sort_by_key(|(rank, index, _)| (*rank, *index));
        ordered.into_iter().map(|(_, _, id)| id.clone()).collect()
    }
}

// ============================================================================
// Result
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub success_rate_pct: f64,
    pub throughput_per_second: f64,
    pub average_item_ms: f64,
    /// Executed level ("Level 1", ..) to count
    pub level_distribution: BTreeMap<String, usize>,
    pub fallback_rate_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchCalculationResult {
    pub total_equipment: usize,
    pub successful_calculations: usize,
    pub failed_calculations: usize,
    /// Successful results in dispatch order
    pub results: Vec<RbiCalculationResult>,
    /// (equipment_id, message) per failed item
    pub errors: Vec<(String, String)>,
    /// Items never calculated because the batch stopped or was aborted
    pub skipped_equipment: Vec<String>,
    pub status: BatchStatus,
    pub execution_time_seconds: f64,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub performance_metrics: PerformanceMetrics,
}

/// Suggested chunking for a batch of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSizeRecommendation {
    pub chunk_size: usize,
    pub max_parallel: usize,
}

/// Chunk size is a tenth of the batch, clamped to
/// `[DEFAULT_MAX_PARALLEL, MAX_BATCH_CHUNK]`; small batches run in one chunk.
pub fn optimize_batch_size(total_items: usize) -> BatchSizeRecommendation {
    if total_items <= DEFAULT_MAX_PARALLEL {
        let n = total_items.max(1);
        return BatchSizeRecommendation {
            chunk_size: n,
            max_parallel: n,
        };
    }
    let chunk_size = (total_items / 10).clamp(DEFAULT_MAX_PARALLEL, MAX_BATCH_CHUNK);
    let max_parallel = match total_items {
        0..=100 => DEFAULT_MAX_PARALLEL,
        101..=1_000 => DEFAULT_MAX_PARALLEL * 2,
        _ => DEFAULT_MAX_PARALLEL * 5,
    };
    BatchSizeRecommendation {
        chunk_size,
        max_parallel: max_parallel.min(chunk_size),
    }
}

// ============================================================================
// Service
// ============================================================================

struct ItemOutcome {
    index: usize,
    equipment_id: String,
    result: Result<(RbiCalculationResult, Option<CacheOutcome>), String>,
    elapsed: Duration,
}

/// Everything one item task needs, shared across the run.
struct RunContext {
    source: Arc<dyn EquipmentDataSource>,
    calculator: RbiCalculator,
    cache: Option<Arc<ResultCache>>,
    config_version: u64,
    level: CalculationLevel,
    reference_date: NaiveDate,
}

impl RunContext {
    async fn fetch_and_calculate(&self, equipment_id: &str) -> anyhow::Result<RbiCalculationResult> {
        let equipment = self.source.equipment(equipment_id).await?;
        let data = self.source.extracted_data(equipment_id).await?;
        let result = self.calculator.try_calculate(
            &equipment,
            data.as_ref(),
            self.level,
            self.reference_date,
        )?;
        Ok(result)
    }

    async fn run_item(
        &self,
        equipment_id: &str,
    ) -> anyhow::Result<(RbiCalculationResult, Option<CacheOutcome>)> {
        match &self.cache {
            Some(cache) => {
                let key = (equipment_id.to_string(), self.level, self.reference_date);
                let (result, outcome) = cache
                    .get_or_compute(key, self.config_version, || {
                        self.fetch_and_calculate(equipment_id)
                    })
                    .await?;
                Ok((result, Some(outcome)))
            }
            None => Ok((self.fetch_and_calculate(equipment_id).await?, None)),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

pub struct BatchCalculationService {
    source: Arc<dyn EquipmentDataSource>,
    config: Arc<ConfigurationManager>,
    cache: Arc<ResultCache>,
}

impl std::fmt::Debug for BatchCalculationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCalculationService")
            .field("source", &self.source.source_name())
            .field("config_version", &self.config.version())
            .field("cache_size", &self.cache.len())
            .finish()
    }
}

impl BatchCalculationService {
    pub fn new(source: Arc<dyn EquipmentDataSource>, config: Arc<ConfigurationManager>) -> Self {
        Self {
            source,
            config,
            cache: Arc::new(ResultCache::new()),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub async fn calculate_batch(&self, request: BatchCalculationRequest) -> BatchCalculationResult {
        let started = Instant::now();
        let deadline = request
            .timeout_seconds
            .map(|secs| started + Duration::from_secs(secs));

        // One configuration snapshot for the whole run
        let config_version = self.config.version();
        let run = Arc::new(RunContext {
            source: Arc::clone(&self.source),
            calculator: RbiCalculator::new(self.config.snapshot()),
            cache: request.cache_enabled.then(|| Arc::clone(&self.cache)),
            config_version,
            level: request.requested_level,
            reference_date: request
                .reference_date
                .unwrap_or_else(|| Utc::now().date_naive()),
        });

        let queue = request.dispatch_order();
        let total = queue.len();
        let policy = request.error_handling;
        info!(
            total,
            level = %request.requested_level,
            max_parallel = request.max_parallel,
            cache_enabled = request.cache_enabled,
            config_version,
            "Starting batch RBI calculation"
        );

        let (progress_tx, progress_task) = match request.progress_callback.clone() {
            Some(callback) => {
                let (tx, mut rx) = mpsc::unbounded_channel::<(usize, usize)>();
                let task = tokio::spawn(async move {
                    while let Some((completed, total)) = rx.recv().await {
                        callback(completed, total);
                    }
                });
                (Some(tx), Some(task))
            }
            None => (None, None),
        };

        let semaphore = Arc::new(Semaphore::new(request.max_parallel.max(1)));
        let cancel = CancellationToken::new();
        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks: JoinSet<ItemOutcome> = JoinSet::new();
        let mut pending: BTreeMap<usize, String> = BTreeMap::new();
        let mut undispatched: Vec<String> = Vec::new();
        let mut timed_out = false;

        // Dispatch
        let mut queue_iter = queue.into_iter().enumerate();
        for (index, equipment_id) in queue_iter.by_ref() {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                () = wait_until(deadline) => {
                    timed_out = true;
                    None
                }
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                undispatched.push(equipment_id);
                break;
            };

            debug!(equipment_id = %equipment_id, index, "Dispatching batch item");
            pending.insert(index, equipment_id.clone());
            let run = Arc::clone(&run);
            let cancel = cancel.clone();
            let completed = Arc::clone(&completed);
            let progress_tx = progress_tx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let item_started = Instant::now();
                let result = run
                    .run_item(&equipment_id)
                    .await
                    .map_err(|e| format!("{e:#}"));
                if result.is_err() && policy == ErrorHandling::Stop {
                    cancel.cancel();
                }
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(tx) = progress_tx {
                    let _ = tx.send((done, total));
                }
                ItemOutcome {
                    index,
                    equipment_id,
                    result,
                    elapsed: item_started.elapsed(),
                }
            });
        }
        undispatched.extend(queue_iter.map(|(_, id)| id));
        if timed_out {
            tasks.abort_all();
        }

        // Collect
        let mut outcomes = Vec::with_capacity(pending.len());
        loop {
            let joined = tokio::select! {
                biased;
                joined = tasks.join_next() => joined,
                () = wait_until(deadline), if !timed_out => {
                    timed_out = true;
                    tasks.abort_all();
                    continue;
                }
            };
            let Some(joined) = joined else { break };
            match joined {
                Ok(outcome) => {
                    pending.remove(&outcome.index);
                    outcomes.push(outcome);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(error = %e, "Batch item task failed"),
            }
        }
        drop(progress_tx);
        if let Some(task) = progress_task {
            let _ = task.await;
        }

        outcomes.sort_by_key(|o| o.index);
        let elapsed = started.elapsed();
        let result = summarize(total, outcomes, pending, undispatched, policy, timed_out, elapsed);

        info!(
            total,
            successful = result.successful_calculations,
            failed = result.failed_calculations,
            skipped = result.skipped_equipment.len(),
            cache_hits = result.cache_hits,
            cache_misses = result.cache_misses,
            status = ?result.status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch RBI calculation finished"
        );
        result
    }
}

fn summarize(
    total: usize,
    outcomes: Vec<ItemOutcome>,
    unfinished: BTreeMap<usize, String>,
    undispatched: Vec<String>,
    policy: ErrorHandling,
    timed_out: bool,
    elapsed: Duration,
) -> BatchCalculationResult {
    let mut results = Vec::new();
    let mut errors = Vec::new();
    let mut skipped_equipment = Vec::new();
    let mut cache_hits = 0;
    let mut cache_misses = 0;
    let mut item_time = Duration::ZERO;
    let finished = outcomes.len();

    for outcome in outcomes {
        item_time += outcome.elapsed;
        match outcome.result {
            Ok((result, cache)) => {
                match cache {
                    Some(CacheOutcome::Hit) => cache_hits += 1,
                    Some(CacheOutcome::Miss) => cache_misses += 1,
                    None => {}
                }
                results.push(result);
            }
            Err(message) => {
                warn!(equipment_id = %outcome.equipment_id, error = %message, "Batch item failed");
                errors.push((outcome.equipment_id, message));
            }
        }
    }

    let item_failures = errors.len();
    let leftover = unfinished.into_values().chain(undispatched);
    if timed_out && policy == ErrorHandling::Continue {
        for id in leftover {
            errors.push((id, "calculation did not finish before the batch timeout".to_string()));
        }
    } else {
        skipped_equipment.extend(leftover);
    }

    let status = match (timed_out, policy) {
        (true, ErrorHandling::Continue) => BatchStatus::TimedOut,
        (true, ErrorHandling::Stop) => BatchStatus::Aborted,
        (false, ErrorHandling::Stop) if item_failures > 0 => BatchStatus::Stopped,
        (false, _) if !errors.is_empty() || !skipped_equipment.is_empty() => {
            BatchStatus::CompletedWithErrors
        }
        (false, _) => BatchStatus::Completed,
    };

    let successful = results.len();
    let secs = elapsed.as_secs_f64();
    let mut level_distribution = BTreeMap::new();
    for result in &results {
        *level_distribution
            .entry(result.calculation_level.to_string())
            .or_insert(0) += 1;
    }
    let fallbacks = results.iter().filter(|r| r.fallback_occurred).count();
    let performance_metrics = PerformanceMetrics {
        success_rate_pct: percent(successful, total),
        throughput_per_second: if secs > 0.0 { finished as f64 / secs } else { 0.0 },
        average_item_ms: if finished > 0 {
            item_time.as_secs_f64() * 1000.0 / finished as f64
        } else {
            0.0
        },
        level_distribution,
        fallback_rate_pct: percent(fallbacks, successful),
    };

    BatchCalculationResult {
        total_equipment: total,
        successful_calculations: successful,
        failed_calculations: errors.len(),
        results,
        errors,
        skipped_equipment,
        status,
        execution_time_seconds: secs,
        cache_hits,
        cache_misses,
        performance_metrics,
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
