//! Prometheus metrics for the conversion pipeline.
//!
//! Collectors are created lazily and registered by whichever transport the
//! host process exposes; see [`all_metrics`].

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Finished jobs by converter and result ("completed", "failed").
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("docforge_jobs_total", "Total conversion jobs finished"),
        &["converter", "result"],
    )
    .expect("valid metric definition")
});

/// Wall-clock job duration in seconds, from start to terminal state.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "docforge_job_duration_seconds",
            "Duration of conversion jobs",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["result"],
    )
    .expect("valid metric definition")
});

// =============================================================================
// Attempts
// =============================================================================

/// Individual attempts by converter and outcome ("success" or an error kind).
pub static ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("docforge_attempts_total", "Total conversion attempts"),
        &["converter", "outcome"],
    )
    .expect("valid metric definition")
});

/// Attempts that were retried after a transient failure.
pub static RETRIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("docforge_retries_total", "Total conversion retries")
        .expect("valid metric definition")
});

// =============================================================================
// Sweep
// =============================================================================

/// Jobs moved to EXPIRED by the retention sweep.
pub static JOBS_EXPIRED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("docforge_jobs_expired_total", "Total jobs expired by the sweep")
        .expect("valid metric definition")
});

/// Returns all metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(ATTEMPTS_TOTAL.clone()),
        Box::new(RETRIES_TOTAL.clone()),
        Box::new(JOBS_EXPIRED.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        JOBS_TOTAL.with_label_values(&["json-to-csv", "completed"]).inc();
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"docforge_jobs_total".to_string()));
    }
}
