//! Live-store contracts consumed by the pipeline.
//!
//! The relational store itself is an external collaborator; the pipeline
//! only depends on these traits. Page scans live on [`LiveStore`] and never
//! hold a transaction; everything that mutates (or reads rows it is about to
//! mutate) goes through an explicit [`LiveTransaction`], whose terminal
//! states are exactly commit and rollback. Dropping an uncommitted
//! transaction is equivalent to rollback.
//!
//! ## Design Principles
//!
//! - **Rows-affected guards**: `mark_*_sent` and `delete_expired` report how
//!   many rows they touched; the pipeline's idempotency and compensation
//!   logic is built on those counts, never on read-then-write.
//! - **Scan predicates exclude handled rows**: every `ended_*` scan omits
//!   rows whose sent flag is already set, so re-scans after a crash see only
//!   unfinished work.
//! - **Testability**: [`memory::MemoryLiveStore`] provides staged-write
//!   transactions for tests and local runs.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{ArchiveRow, Event, EventRound, IntervalKind, LeaderboardRow, PeriodKey, RecordKind};

/// One bounded page of a candidate scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Maximum rows to return.
    pub limit: u32,
    /// Rows to skip from the head of the candidate set.
    pub offset: u32,
}

impl Page {
    /// Creates a page.
    #[must_use]
    pub const fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }
}

/// The live relational store, as consumed by the pipeline.
#[async_trait]
pub trait LiveStore: Send + Sync {
    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn LiveTransaction>>;

    /// Ended events not yet sent to the third party, ordered by id.
    async fn ended_events(&self, page: Page) -> Result<Vec<Event>>;

    /// Ended event rounds not yet sent to the third party, ordered by id.
    async fn ended_event_rounds(&self, page: Page) -> Result<Vec<EventRound>>;

    /// Tournament occurrences of `interval` that started strictly before
    /// `started_before` and were not yet sent, ordered by period start then
    /// name.
    async fn ended_tournaments(
        &self,
        interval: IntervalKind,
        started_before: DateTime<Utc>,
        page: Page,
    ) -> Result<Vec<PeriodKey>>;
}

/// An open transaction against the live store.
///
/// All reads made through a transaction observe its own staged writes.
#[async_trait]
pub trait LiveTransaction: Send {
    /// Top-ranked rows for an ended event, ascending by rank, at most `top`.
    async fn event_leaderboard(&mut self, event_id: i64, top: u32) -> Result<Vec<LeaderboardRow>>;

    /// Top-ranked rows for an ended event round, ascending by rank.
    async fn round_leaderboard(&mut self, round_id: i64, top: u32) -> Result<Vec<LeaderboardRow>>;

    /// Top-ranked rows for a tournament occurrence, ascending by rank.
    async fn tournament_leaderboard(
        &mut self,
        key: &PeriodKey,
        top: u32,
    ) -> Result<Vec<LeaderboardRow>>;

    /// Sets the sent flag on an event. Returns rows affected; zero means a
    /// concurrent run already handled it.
    async fn mark_event_sent(&mut self, event_id: i64) -> Result<u64>;

    /// Sets the sent flag on an event round. Returns rows affected.
    async fn mark_round_sent(&mut self, round_id: i64) -> Result<u64>;

    /// Sets the sent flag on every row of a tournament occurrence. Returns
    /// rows affected.
    async fn mark_tournament_sent(&mut self, key: &PeriodKey) -> Result<u64>;

    /// Up to `limit` expired rows of `kind`, ascending by id, projected onto
    /// the kind's column set.
    ///
    /// What "expired" means is per kind: event rows age out by retention
    /// cutoff, while [`RecordKind::Tournament`] rows expire once their
    /// occurrence's period has closed and the occurrence was sent.
    async fn expired_batch(&mut self, kind: RecordKind, limit: u32) -> Result<Vec<ArchiveRow>>;

    /// Deletes expired rows of `kind` with ids in `[min_id, max_id]`.
    /// Returns rows affected.
    async fn delete_expired(&mut self, kind: RecordKind, min_id: i64, max_id: i64) -> Result<u64>;

    /// Commits the transaction, making staged writes visible.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rolls the transaction back, discarding staged writes.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
