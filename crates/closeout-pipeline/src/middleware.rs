//! Per-unit observation hooks.
//!
//! Every work unit the pipeline processes (one ended event, one ended round,
//! one tournament occurrence, one archive batch) is reported to a chain of
//! observers after it settles. Observers see the unit, its outcome, and the
//! wall-clock time it took; they never influence the outcome.

use std::sync::Arc;
use std::time::Duration;

use crate::metrics::PipelineMetrics;
use crate::model::RecordKind;

/// What kind of work unit was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Delivery of an ended event's final leaderboard.
    Event,
    /// Delivery of an ended event round's final leaderboard.
    EventRound,
    /// Delivery of an ended tournament occurrence.
    Tournament,
    /// Archival of one batch of expired rows.
    Archive(RecordKind),
}

impl UnitKind {
    /// Stable label value for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::EventRound => "event_round",
            Self::Tournament => "tournament",
            Self::Archive(_) => "archive",
        }
    }
}

/// Identifies one work unit.
#[derive(Debug, Clone)]
pub struct UnitDescriptor {
    /// The kind of unit.
    pub kind: UnitKind,
    /// Identifying key, e.g. `event-12` or an archive artifact key.
    pub key: String,
}

impl UnitDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(kind: UnitKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

/// How a work unit settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Marked and acknowledged by the receiver.
    Delivered,
    /// Already marked by a concurrent or earlier run; nothing sent.
    AlreadyHandled,
    /// Left unmarked for a later run (receiver rejected or was unreachable).
    Deferred,
    /// Batch written to the object store and purged from the live store.
    Archived {
        /// Rows in the batch.
        rows: u64,
    },
    /// The unit errored; other units were not affected.
    Failed {
        /// Rendered error.
        message: String,
    },
}

impl UnitOutcome {
    /// Stable label value for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::AlreadyHandled => "already_handled",
            Self::Deferred => "deferred",
            Self::Archived { .. } => "archived",
            Self::Failed { .. } => "failed",
        }
    }

    /// Whether the unit left the candidate set (its flag is committed, or a
    /// concurrent run committed it). Deferred and failed units remain
    /// candidates and a scan cursor must step past them.
    #[must_use]
    pub fn clears_candidate(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::AlreadyHandled | Self::Archived { .. }
        )
    }
}

/// Observes settled work units.
pub trait UnitObserver: Send + Sync {
    /// Called once per unit after it settles.
    fn observe(&self, unit: &UnitDescriptor, outcome: &UnitOutcome, elapsed: Duration);
}

/// Logs each unit through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl UnitObserver for TracingObserver {
    fn observe(&self, unit: &UnitDescriptor, outcome: &UnitOutcome, elapsed: Duration) {
        let kind = unit.kind.as_str();
        let key = unit.key.as_str();
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            UnitOutcome::Delivered => {
                tracing::info!(kind, key, elapsed_ms, "delivered");
            }
            UnitOutcome::Archived { rows } => {
                tracing::info!(kind, key, rows, elapsed_ms, "archived");
            }
            UnitOutcome::AlreadyHandled => {
                tracing::debug!(kind, key, "already handled, skipping");
            }
            UnitOutcome::Deferred => {
                tracing::warn!(kind, key, elapsed_ms, "deferred to a later run");
            }
            UnitOutcome::Failed { message } => {
                tracing::error!(kind, key, error = %message, "unit failed");
            }
        }
    }
}

/// Records each unit into the metrics facade.
#[derive(Debug, Default)]
pub struct MetricsObserver {
    metrics: PipelineMetrics,
}

impl MetricsObserver {
    /// Creates an observer backed by the global metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UnitObserver for MetricsObserver {
    fn observe(&self, unit: &UnitDescriptor, outcome: &UnitOutcome, elapsed: Duration) {
        self.metrics
            .record_unit(unit.kind.as_str(), outcome.as_str(), elapsed.as_secs_f64());
        if let (UnitKind::Archive(kind), UnitOutcome::Archived { rows }) = (unit.kind, outcome) {
            self.metrics.record_archived_rows(kind.segment(), *rows);
        }
    }
}

/// A fan-out chain of observers, applied in registration order.
#[derive(Clone, Default)]
pub struct Observers {
    chain: Vec<Arc<dyn UnitObserver>>,
}

impl Observers {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The default production chain: tracing plus metrics.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with(Arc::new(TracingObserver))
            .with(Arc::new(MetricsObserver::new()))
    }

    /// Appends an observer.
    #[must_use]
    pub fn with(mut self, observer: Arc<dyn UnitObserver>) -> Self {
        self.chain.push(observer);
        self
    }
}

impl UnitObserver for Observers {
    fn observe(&self, unit: &UnitDescriptor, outcome: &UnitOutcome, elapsed: Duration) {
        for observer in &self.chain {
            observer.observe(unit, outcome, elapsed);
        }
    }
}
