//! Top-level pipeline: one invocation end to end.
//!
//! An invocation acquires the run lock, delivers ended rounds, events, and
//! tournament occurrences, archives expired rows of every record kind, and
//! releases the lock. Phase failures are aggregated into the summary rather
//! than propagated, so the lock is always released and one broken phase
//! never starves the others.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use closeout_core::{ObjectStore, RunLock, DEFAULT_LOCK_TTL};
use tracing::Instrument;

use crate::archive::{ArchiveRunner, ArchiveStats};
use crate::client::ResultsDelivery;
use crate::delivery::{DeliveryRunner, PhaseStats};
use crate::error::Result;
use crate::interval::RotationSchedule;
use crate::metrics::PipelineMetrics;
use crate::middleware::Observers;
use crate::store::LiveStore;

/// Tuning knobs for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum leaderboard rows delivered per candidate.
    pub top_limit: u32,
    /// Page size for candidate scans and archive batches.
    pub batch_limit: u32,
    /// Object-store prefix for archive artifacts.
    pub archive_root: String,
    /// Tournament rotation boundaries.
    pub schedule: RotationSchedule,
    /// Bounded parallelism for candidates within a page.
    pub workers: usize,
    /// Object-store path of the run lock.
    pub lock_path: String,
    /// Run lock time to live; a crashed holder is taken over after this.
    pub lock_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_limit: 100,
            batch_limit: 1000,
            archive_root: "archive".to_string(),
            schedule: RotationSchedule::default(),
            workers: 4,
            lock_path: "locks/closeout.json".to_string(),
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }
}

/// What one invocation accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// True when another holder owned the run lock and nothing ran.
    pub lock_skipped: bool,
    /// Ended event rounds.
    pub rounds: PhaseStats,
    /// Ended events.
    pub events: PhaseStats,
    /// Ended tournament occurrences.
    pub tournaments: PhaseStats,
    /// Archival across all record kinds.
    pub archive: ArchiveStats,
    /// Phase-level failures (scan errors, archive aborts). Unit-level
    /// failures are tallied in the phase stats instead.
    pub errors: Vec<String>,
    /// Wall-clock duration of the invocation.
    pub duration: Duration,
}

impl RunSummary {
    /// Total candidates delivered across all delivery phases.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.rounds.delivered + self.events.delivered + self.tournaments.delivered
    }

    /// Total failed units across all phases.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.rounds.failed + self.events.failed + self.tournaments.failed + self.archive.failed
    }

    fn outcome_label(&self) -> &'static str {
        if self.lock_skipped {
            "skipped"
        } else if self.errors.is_empty() && self.failed() == 0 {
            "ok"
        } else {
            "partial"
        }
    }
}

/// The lifecycle pipeline.
pub struct Pipeline {
    store: Arc<dyn LiveStore>,
    objects: Arc<dyn ObjectStore>,
    delivery: Arc<dyn ResultsDelivery>,
    config: PipelineConfig,
    observers: Observers,
    metrics: PipelineMetrics,
}

impl Pipeline {
    /// Creates a pipeline with the standard observer chain (tracing and
    /// metrics).
    #[must_use]
    pub fn new(
        store: Arc<dyn LiveStore>,
        objects: Arc<dyn ObjectStore>,
        delivery: Arc<dyn ResultsDelivery>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            objects,
            delivery,
            config,
            observers: Observers::standard(),
            metrics: PipelineMetrics::new(),
        }
    }

    /// Replaces the observer chain. Useful for tests and embedders with
    /// their own telemetry.
    #[must_use]
    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    /// Runs one invocation.
    ///
    /// Returns an error only when the run lock cannot be acquired or
    /// released; everything downstream is aggregated into the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let now = Utc::now();

        let lock = RunLock::new(
            self.objects.clone(),
            self.config.lock_path.clone(),
            self.config.lock_ttl,
        );
        let Some(guard) = lock.try_acquire().await? else {
            tracing::info!("run lock held elsewhere, skipping invocation");
            self.metrics.record_lock_skip();
            let mut summary = RunSummary {
                lock_skipped: true,
                ..RunSummary::default()
            };
            summary.duration = started.elapsed();
            self.metrics
                .record_run(summary.outcome_label(), summary.duration.as_secs_f64());
            return Ok(summary);
        };

        let mut summary = RunSummary::default();

        let runner = DeliveryRunner::new(
            self.store.clone(),
            self.delivery.clone(),
            self.observers.clone(),
            self.config.schedule,
            self.config.batch_limit,
            self.config.top_limit,
            self.config.workers,
        );

        match runner
            .run_rounds()
            .instrument(closeout_core::observability::phase_span("rounds"))
            .await
        {
            Ok(stats) => summary.rounds = stats,
            Err(err) => summary.errors.push(format!("rounds: {err}")),
        }
        match runner
            .run_events()
            .instrument(closeout_core::observability::phase_span("events"))
            .await
        {
            Ok(stats) => summary.events = stats,
            Err(err) => summary.errors.push(format!("events: {err}")),
        }
        match runner
            .run_tournaments(now)
            .instrument(closeout_core::observability::phase_span("tournaments"))
            .await
        {
            Ok(stats) => summary.tournaments = stats,
            Err(err) => summary.errors.push(format!("tournaments: {err}")),
        }

        let archiver = ArchiveRunner::new(
            self.store.clone(),
            self.objects.clone(),
            self.observers.clone(),
            self.config.archive_root.clone(),
            self.config.batch_limit,
        );
        match archiver
            .run(now)
            .instrument(closeout_core::observability::phase_span("archive"))
            .await
        {
            Ok(stats) => summary.archive = stats,
            Err(err) => summary.errors.push(format!("archive: {err}")),
        }

        guard.release().await?;

        summary.duration = started.elapsed();
        self.metrics
            .record_run(summary.outcome_label(), summary.duration.as_secs_f64());
        tracing::info!(
            delivered = summary.delivered(),
            archived_rows = summary.archive.rows,
            failed = summary.failed(),
            errors = summary.errors.len(),
            duration_ms = summary.duration.as_millis() as u64,
            "invocation complete"
        );
        Ok(summary)
    }
}
