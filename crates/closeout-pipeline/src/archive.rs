//! Archival export of expired rows.
//!
//! Expired rows are drained in contiguous id-range batches, oldest ids
//! first. Each batch is encoded to gzip CSV, written to the object store
//! under a key derived purely from the id range, and only then deleted from
//! the live store. The delete's rows-affected count must equal the batch
//! size; any mismatch or failure rolls the delete back and compensates by
//! removing the just-written artifact. If that removal fails too, the
//! artifact is orphaned and reported as a compensation failure for
//! out-of-band cleanup.
//!
//! The write-then-delete order means a crash can leave an artifact without
//! its purge. That is safe: the rows are still live, the next run re-reads
//! the same batch, derives the identical key, and overwrites the artifact.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use closeout_core::ObjectStore;

use crate::encode;
use crate::error::{Error, Result};
use crate::middleware::{Observers, UnitDescriptor, UnitKind, UnitObserver, UnitOutcome};
use crate::model::RecordKind;
use crate::paths;
use crate::store::LiveStore;

/// Outcome tallies for the archival phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Batches archived and purged.
    pub batches: u64,
    /// Rows archived and purged.
    pub rows: u64,
    /// Batches that failed and were left in the live store.
    pub failed: u64,
    /// Artifact keys orphaned by failed compensation. Non-empty means
    /// out-of-band cleanup is required.
    pub orphaned_artifacts: Vec<String>,
}

impl ArchiveStats {
    /// Folds another kind's tallies into this one.
    pub fn merge(&mut self, other: ArchiveStats) {
        self.batches += other.batches;
        self.rows += other.rows;
        self.failed += other.failed;
        self.orphaned_artifacts.extend(other.orphaned_artifacts);
    }
}

/// One successfully archived batch.
struct BatchReport {
    artifact: String,
    rows: u64,
}

/// Runs the archival phase of one pipeline invocation.
pub struct ArchiveRunner {
    store: Arc<dyn LiveStore>,
    objects: Arc<dyn ObjectStore>,
    observers: Observers,
    archive_root: String,
    batch_limit: u32,
}

impl ArchiveRunner {
    /// Creates a runner writing artifacts under `archive_root`.
    #[must_use]
    pub fn new(
        store: Arc<dyn LiveStore>,
        objects: Arc<dyn ObjectStore>,
        observers: Observers,
        archive_root: impl Into<String>,
        batch_limit: u32,
    ) -> Self {
        Self {
            store,
            objects,
            observers,
            archive_root: archive_root.into(),
            batch_limit: batch_limit.max(1),
        }
    }

    /// Archives every record kind, one kind at a time, in the order of
    /// [`RecordKind::ALL`].
    pub async fn run(&self, run_started_at: DateTime<Utc>) -> Result<ArchiveStats> {
        let mut stats = ArchiveStats::default();
        for kind in RecordKind::ALL {
            stats.merge(self.archive_kind(kind, run_started_at).await?);
        }
        Ok(stats)
    }

    /// Drains one record kind batch by batch until no expired rows remain
    /// or a batch fails. A failed batch would only repeat, so the kind
    /// stops there and the next run retries it.
    pub async fn archive_kind(
        &self,
        kind: RecordKind,
        run_started_at: DateTime<Utc>,
    ) -> Result<ArchiveStats> {
        let mut stats = ArchiveStats::default();
        loop {
            let start = Instant::now();
            match self.settle_batch(kind, run_started_at).await {
                Ok(None) => break,
                Ok(Some(report)) => {
                    let unit =
                        UnitDescriptor::new(UnitKind::Archive(kind), report.artifact.clone());
                    self.observers.observe(
                        &unit,
                        &UnitOutcome::Archived { rows: report.rows },
                        start.elapsed(),
                    );
                    stats.batches += 1;
                    stats.rows += report.rows;
                }
                Err(err) => {
                    let unit = UnitDescriptor::new(UnitKind::Archive(kind), kind.segment());
                    self.observers.observe(
                        &unit,
                        &UnitOutcome::Failed {
                            message: err.to_string(),
                        },
                        start.elapsed(),
                    );
                    stats.failed += 1;
                    if let Error::CompensationFailed { artifact, .. } = &err {
                        stats.orphaned_artifacts.push(artifact.clone());
                    }
                    break;
                }
            }
        }
        Ok(stats)
    }

    /// Archives and purges one batch. Returns `Ok(None)` when the kind has
    /// no expired rows left.
    async fn settle_batch(
        &self,
        kind: RecordKind,
        run_started_at: DateTime<Utc>,
    ) -> Result<Option<BatchReport>> {
        let mut tx = self.store.begin().await?;
        let rows = tx.expired_batch(kind, self.batch_limit).await?;
        let Some((first, last)) = rows.first().zip(rows.last()) else {
            tx.rollback().await?;
            return Ok(None);
        };
        let (min_id, max_id) = (first.id, last.id);
        let expected = rows.len() as u64;

        let data = encode::encode_batch(kind, &rows)?;
        let artifact = paths::artifact_key(&self.archive_root, run_started_at, kind, min_id, max_id);
        self.objects.put(&artifact, data).await.map_err(Error::Core)?;

        let affected = match tx.delete_expired(kind, min_id, max_id).await {
            Ok(affected) => affected,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(self.compensate(&artifact, err).await);
            }
        };
        if affected != expected {
            tx.rollback().await?;
            let cause = Error::ArchiveInconsistent {
                kind,
                expected,
                actual: affected,
            };
            return Err(self.compensate(&artifact, cause).await);
        }

        if let Err(err) = tx.commit().await {
            return Err(self.compensate(&artifact, err).await);
        }
        Ok(Some(BatchReport {
            artifact,
            rows: expected,
        }))
    }

    /// Removes the artifact written for a batch whose purge did not commit.
    /// Returns the original cause, or a compensation failure naming the
    /// orphaned artifact when the removal itself fails.
    async fn compensate(&self, artifact: &str, cause: Error) -> Error {
        match self.objects.delete(artifact).await {
            Ok(()) => {
                tracing::warn!(artifact, error = %cause, "batch rolled back, artifact removed");
                cause
            }
            Err(delete_err) => {
                tracing::error!(
                    artifact,
                    error = %cause,
                    delete_error = %delete_err,
                    "compensation failed, artifact orphaned"
                );
                Error::CompensationFailed {
                    artifact: artifact.to_string(),
                    message: format!("{cause}; artifact removal failed: {delete_err}"),
                }
            }
        }
    }
}
