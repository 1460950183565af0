//! Observability metrics for the lifecycle pipeline.
//!
//! Metrics are exposed via the `metrics` crate facade. The binary installs
//! a Prometheus recorder; in tests and library use they are no-ops.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Pipeline runs by outcome.
    pub const RUNS_TOTAL: &str = "closeout_runs_total";
    /// Histogram: End-to-end pipeline run duration in seconds.
    pub const RUN_DURATION_SECONDS: &str = "closeout_run_duration_seconds";
    /// Counter: Work units by kind and outcome.
    pub const UNITS_TOTAL: &str = "closeout_units_total";
    /// Histogram: Per-unit processing duration in seconds.
    pub const UNIT_DURATION_SECONDS: &str = "closeout_unit_duration_seconds";
    /// Counter: Rows archived and purged, by record kind.
    pub const ARCHIVED_ROWS_TOTAL: &str = "closeout_archived_rows_total";
    /// Counter: Runs skipped because another holder owned the run lock.
    pub const LOCK_SKIPS_TOTAL: &str = "closeout_lock_skips_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Work unit kind (event, event_round, tournament, archive).
    pub const KIND: &str = "kind";
    /// Unit or run outcome (delivered, already_handled, deferred, archived, failed).
    pub const OUTCOME: &str = "outcome";
}

/// High-level interface for recording pipeline metrics.
///
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics;

impl PipelineMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records a completed pipeline run.
    pub fn record_run(&self, outcome: &str, duration_secs: f64) {
        counter!(
            names::RUNS_TOTAL,
            labels::OUTCOME => outcome.to_string(),
        )
        .increment(1);
        histogram!(names::RUN_DURATION_SECONDS).record(duration_secs);
    }

    /// Records one processed work unit.
    pub fn record_unit(&self, kind: &str, outcome: &str, duration_secs: f64) {
        counter!(
            names::UNITS_TOTAL,
            labels::KIND => kind.to_string(),
            labels::OUTCOME => outcome.to_string(),
        )
        .increment(1);
        histogram!(
            names::UNIT_DURATION_SECONDS,
            labels::KIND => kind.to_string(),
        )
        .record(duration_secs);
    }

    /// Records rows archived and purged for a record kind.
    pub fn record_archived_rows(&self, kind: &str, rows: u64) {
        counter!(
            names::ARCHIVED_ROWS_TOTAL,
            labels::KIND => kind.to_string(),
        )
        .increment(rows);
    }

    /// Records a run skipped because the run lock was held elsewhere.
    pub fn record_lock_skip(&self) {
        counter!(names::LOCK_SKIPS_TOTAL).increment(1);
    }
}
