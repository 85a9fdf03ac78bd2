//! Batch service integration tests
//!
//! Runs the batch service against an in-memory equipment source and checks
//! caching, dispatch order, failure policy and timeouts.

use chrono::NaiveDate;
use std::sync::{Arc, Mutex};

use rbi_engine::batch::{
    BatchCalculationRequest, BatchCalculationService, BatchStatus, ErrorHandling,
    InMemoryDataSource,
};
use rbi_engine::config::ConfigurationManager;
use rbi_engine::types::{CalculationLevel, EquipmentData, EquipmentType, ServiceType};

fn equipment(id: &str) -> EquipmentData {
    EquipmentData::new(
        id,
        EquipmentType::Piping,
        ServiceType::SweetGas,
        NaiveDate::from_ymd_opt(2012, 9, 1).expect("valid date"),
        40.0,
    )
    .expect("valid equipment")
}

fn source(ids: &[&str]) -> InMemoryDataSource {
    ids.iter()
        .fold(InMemoryDataSource::new(), |s, id| s.with_equipment(equipment(id)))
}

struct Harness {
    source: Arc<InMemoryDataSource>,
    config: Arc<ConfigurationManager>,
    service: BatchCalculationService,
}

fn harness(source: InMemoryDataSource) -> Harness {
    let source = Arc::new(source);
    let config = Arc::new(ConfigurationManager::default());
    let service = BatchCalculationService::new(source.clone(), Arc::clone(&config));
    Harness {
        source,
        config,
        service,
    }
}

fn request(ids: &[&str]) -> BatchCalculationRequest {
    BatchCalculationRequest::new(ids.iter().copied(), CalculationLevel::Level1)
        .with_reference_date(NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date"))
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn repeated_batch_is_served_from_cache() {
    let ids = ["P-1", "P-2", "P-3"];
    let h = harness(source(&ids));

    let first = h.service.calculate_batch(request(&ids)).await;
    assert_eq!(first.cache_misses, 3);
    assert_eq!(first.cache_hits, 0);
    assert_eq!(first.status, BatchStatus::Completed);

    let second = h.service.calculate_batch(request(&ids)).await;
    assert_eq!(second.cache_hits, 3);
    assert_eq!(second.cache_misses, 0);
    assert_eq!(h.source.fetch_count(), 3);
    assert_eq!(h.service.cache_size(), 3);

    for (a, b) in first.results.iter().zip(&second.results) {
        assert!(a.same_outcome(b));
    }
}

#[tokio::test]
async fn cache_disabled_always_fetches() {
    let ids = ["P-1", "P-2"];
    let h = harness(source(&ids));

    for _ in 0..2 {
        let result = h.service.calculate_batch(request(&ids).with_cache(false)).await;
        assert_eq!(result.cache_hits + result.cache_misses, 0);
        assert_eq!(result.successful_calculations, 2);
    }
    assert_eq!(h.source.fetch_count(), 4);
}

#[tokio::test]
async fn repeated_ids_in_one_run_coalesce() {
    let h = harness(source(&["P-1", "P-2"]).with_delay_ms(20));

    let result = h.service.calculate_batch(request(&["P-1", "P-1", "P-2"])).await;
    assert_eq!(result.successful_calculations, 3);
    assert_eq!(result.cache_misses, 2);
    assert_eq!(result.cache_hits, 1);
    assert_eq!(h.source.fetch_count(), 2);
}

#[tokio::test]
async fn config_change_resets_cache() {
    let ids = ["P-1", "P-2", "P-3"];
    let h = harness(source(&ids));

    h.service.calculate_batch(request(&ids)).await;
    h.config
        .update(|config| config.fallback.confidence_penalty = 0.2)
        .expect("valid update");

    let after = h.service.calculate_batch(request(&ids)).await;
    assert_eq!(after.cache_misses, 3);
    assert_eq!(after.cache_hits, 0);
}

#[tokio::test]
async fn new_reference_date_recomputes() {
    let ids = ["P-1"];
    let h = harness(source(&ids));
    let later = NaiveDate::from_ymd_opt(2030, 6, 1).expect("valid date");

    let first = h.service.calculate_batch(request(&ids)).await;
    let second = h
        .service
        .calculate_batch(request(&ids).with_reference_date(later))
        .await;

    assert_eq!(second.cache_hits, 0);
    assert_eq!(second.cache_misses, 1);
    assert_eq!(h.source.fetch_count(), 2);

    let (a, b) = (&first.results[0], &second.results[0]);
    assert!(b.next_inspection_date > later);
    assert!(b.next_inspection_date > a.next_inspection_date);

    // Same reference date again is served from cache
    let third = h
        .service
        .calculate_batch(request(&ids).with_reference_date(later))
        .await;
    assert_eq!(third.cache_hits, 1);
    assert_eq!(third.results[0].next_inspection_date, b.next_inspection_date);
}

#[tokio::test]
async fn clear_cache_empties_it() {
    let ids = ["P-1"];
    let h = harness(source(&ids));
    h.service.calculate_batch(request(&ids)).await;
    assert_eq!(h.service.cache_size(), 1);
    h.service.clear_cache();
    assert_eq!(h.service.cache_size(), 0);
}

// ============================================================================
// Ordering & Progress
// ============================================================================

#[tokio::test]
async fn priority_equipment_dispatched_first() {
    let ids = ["P-1", "P-2", "P-3", "P-4"];
    let h = harness(source(&ids));

    let result = h
        .service
        .calculate_batch(
            request(&ids)
                .with_max_parallel(1)
                .with_priority(["P-4", "P-2"]),
        )
        .await;

    assert_eq!(h.source.fetched_ids(), vec!["P-4", "P-2", "P-1", "P-3"]);
    let order: Vec<&str> = result.results.iter().map(|r| r.equipment_id.as_str()).collect();
    assert_eq!(order, vec!["P-4", "P-2", "P-1", "P-3"]);
}

#[tokio::test]
async fn progress_reported_for_every_item() {
    let ids = ["P-1", "P-2", "P-3"];
    let h = harness(source(&ids));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    h.service
        .calculate_batch(request(&ids).with_progress_callback(move |completed, total| {
            sink.lock().expect("progress lock").push((completed, total));
        }))
        .await;

    let mut seen = seen.lock().expect("progress lock").clone();
    seen.sort_unstable();
    assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
}

// ============================================================================
// Failure policy
// ============================================================================

#[tokio::test]
async fn continue_policy_records_errors() {
    let h = harness(source(&["P-1", "P-2", "P-3"]));

    let result = h
        .service
        .calculate_batch(request(&["P-1", "missing", "P-2", "P-3"]))
        .await;

    assert_eq!(result.total_equipment, 4);
    assert_eq!(result.successful_calculations, 3);
    assert_eq!(result.failed_calculations, 1);
    assert_eq!(result.errors[0].0, "missing");
    assert!(result.errors[0].1.contains("not found"));
    assert_eq!(result.status, BatchStatus::CompletedWithErrors);
    assert_eq!(result.performance_metrics.success_rate_pct, 75.0);
    assert_eq!(
        result.performance_metrics.level_distribution.get("Level 1"),
        Some(&3)
    );
}

#[tokio::test]
async fn stop_policy_halts_dispatch() {
    let h = harness(source(&["P-1", "P-2", "P-3"]));

    let result = h
        .service
        .calculate_batch(
            request(&["P-1", "missing", "P-2", "P-3"])
                .with_max_parallel(1)
                .with_error_handling(ErrorHandling::Stop),
        )
        .await;

    assert_eq!(result.status, BatchStatus::Stopped);
    assert_eq!(result.successful_calculations, 1);
    assert_eq!(result.failed_calculations, 1);
    assert_eq!(result.skipped_equipment, vec!["P-2", "P-3"]);
    assert_eq!(h.source.fetched_ids(), vec!["P-1", "missing"]);
}

#[tokio::test]
async fn fallback_rate_reported() {
    let ids = ["P-1", "P-2"];
    let h = harness(source(&ids));

    let result = h
        .service
        .calculate_batch(
            BatchCalculationRequest::new(ids, CalculationLevel::Level3)
                .with_reference_date(NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")),
        )
        .await;

    assert_eq!(result.successful_calculations, 2);
    assert_eq!(result.performance_metrics.fallback_rate_pct, 100.0);
    assert!(result.results.iter().all(|r| r.fallback_occurred));
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test]
async fn timeout_continue_returns_partial_results() {
    let ids = ["P-1", "P-2", "P-3"];
    let h = harness(source(&ids).with_delay_ms(1_500));

    let result = h
        .service
        .calculate_batch(request(&ids).with_max_parallel(1).with_timeout_seconds(1))
        .await;

    assert_eq!(result.status, BatchStatus::TimedOut);
    assert_eq!(result.successful_calculations, 0);
    assert_eq!(result.failed_calculations, 3);
    assert!(result
        .errors
        .iter()
        .all(|(_, message)| message.contains("timeout")));
    assert!(result.execution_time_seconds < 1.5);
}

#[tokio::test]
async fn timeout_stop_aborts() {
    let ids = ["P-1", "P-2"];
    let h = harness(source(&ids).with_delay_ms(1_500));

    let result = h
        .service
        .calculate_batch(
            request(&ids)
                .with_max_parallel(1)
                .with_timeout_seconds(1)
                .with_error_handling(ErrorHandling::Stop),
        )
        .await;

    assert_eq!(result.status, BatchStatus::Aborted);
    assert_eq!(result.successful_calculations, 0);
    assert_eq!(result.skipped_equipment, vec!["P-1", "P-2"]);
}
