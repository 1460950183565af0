//! In-memory live store for tests and local runs.
//!
//! Transactions stage their writes and apply them only on commit, so a
//! rollback (or a dropped transaction) is indistinguishable from the
//! transaction never having run. Reads through a transaction observe its own
//! staged writes.
//!
//! Not suitable for production: single-process, no durability. The store
//! also carries a fail-next-delete switch so tests can force the archival
//! compensation path.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use closeout_core::Error as CoreError;

use super::{LiveStore, LiveTransaction, Page};
use crate::error::{Error, Result};
use crate::model::{ArchiveRow, Event, EventRound, IntervalKind, LeaderboardRow, PeriodKey, RecordKind};

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Core(CoreError::storage("lock poisoned"))
}

#[derive(Debug, Default)]
struct Inner {
    events: BTreeMap<i64, (Event, bool)>,
    event_rounds: BTreeMap<i64, (EventRound, bool)>,
    event_leaderboards: HashMap<i64, Vec<LeaderboardRow>>,
    round_leaderboards: HashMap<i64, Vec<LeaderboardRow>>,
    tournaments: BTreeMap<(DateTime<Utc>, String), (PeriodKey, Vec<LeaderboardRow>, bool)>,
    archive: HashMap<RecordKind, BTreeMap<i64, ArchiveRow>>,
    fail_next_delete: bool,
}

#[derive(Debug, Clone)]
enum StagedOp {
    MarkEvent(i64),
    MarkRound(i64),
    MarkTournament(PeriodKey),
    DeleteExpired(RecordKind, i64, i64),
}

/// In-memory implementation of [`LiveStore`].
#[derive(Debug, Default)]
pub struct MemoryLiveStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryLiveStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an ended event and its final leaderboard.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned (test harness only).
    pub fn seed_event(&self, event: Event, leaderboard: Vec<LeaderboardRow>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.event_leaderboards.insert(event.id, leaderboard);
        inner.events.insert(event.id, (event, false));
    }

    /// Seeds an ended event round and its final leaderboard.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned (test harness only).
    pub fn seed_event_round(&self, round: EventRound, leaderboard: Vec<LeaderboardRow>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.round_leaderboards.insert(round.id, leaderboard);
        inner.event_rounds.insert(round.id, (round, false));
    }

    /// Seeds a tournament occurrence and its ranked user rows.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned (test harness only).
    pub fn seed_tournament(&self, key: PeriodKey, users: Vec<LeaderboardRow>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .tournaments
            .insert((key.period_start, key.name.clone()), (key, users, false));
    }

    /// Seeds expired rows awaiting archival.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned (test harness only).
    pub fn seed_archive_rows(&self, kind: RecordKind, rows: Vec<ArchiveRow>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let table = inner.archive.entry(kind).or_default();
        for row in rows {
            table.insert(row.id, row);
        }
    }

    /// Makes the next `delete_expired` call fail with a storage error,
    /// exercising the compensation path.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned (test harness only).
    pub fn fail_next_delete(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.fail_next_delete = true;
    }

    /// Whether the event's sent flag is set.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned (test harness only).
    #[must_use]
    pub fn is_event_sent(&self, event_id: i64) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.events.get(&event_id).is_some_and(|(_, sent)| *sent)
    }

    /// Whether the round's sent flag is set.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned (test harness only).
    #[must_use]
    pub fn is_round_sent(&self, round_id: i64) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .event_rounds
            .get(&round_id)
            .is_some_and(|(_, sent)| *sent)
    }

    /// Whether the tournament occurrence's sent flag is set.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned (test harness only).
    #[must_use]
    pub fn is_tournament_sent(&self, key: &PeriodKey) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .tournaments
            .get(&(key.period_start, key.name.clone()))
            .is_some_and(|(_, _, sent)| *sent)
    }

    /// Number of expired rows of `kind` still in the live store.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned (test harness only).
    #[must_use]
    pub fn archive_rows_remaining(&self, kind: RecordKind) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.archive.get(&kind).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl LiveStore for MemoryLiveStore {
    async fn begin(&self) -> Result<Box<dyn LiveTransaction>> {
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
        }))
    }

    async fn ended_events(&self, page: Page) -> Result<Vec<Event>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner
            .events
            .values()
            .filter(|(_, sent)| !sent)
            .map(|(event, _)| event.clone())
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn ended_event_rounds(&self, page: Page) -> Result<Vec<EventRound>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner
            .event_rounds
            .values()
            .filter(|(_, sent)| !sent)
            .map(|(round, _)| round.clone())
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn ended_tournaments(
        &self,
        interval: IntervalKind,
        started_before: DateTime<Utc>,
        page: Page,
    ) -> Result<Vec<PeriodKey>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner
            .tournaments
            .values()
            .filter(|(key, _, sent)| {
                !sent && key.interval == interval && key.period_start < started_before
            })
            .map(|(key, _, _)| key.clone())
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }
}

struct MemoryTransaction {
    inner: Arc<RwLock<Inner>>,
    staged: Vec<StagedOp>,
}

impl MemoryTransaction {
    fn staged_mark_event(&self, event_id: i64) -> bool {
        self.staged
            .iter()
            .any(|op| matches!(op, StagedOp::MarkEvent(id) if *id == event_id))
    }

    fn staged_mark_round(&self, round_id: i64) -> bool {
        self.staged
            .iter()
            .any(|op| matches!(op, StagedOp::MarkRound(id) if *id == round_id))
    }

    fn staged_mark_tournament(&self, key: &PeriodKey) -> bool {
        self.staged
            .iter()
            .any(|op| matches!(op, StagedOp::MarkTournament(k) if k == key))
    }

    fn staged_deleted(&self, kind: RecordKind, id: i64) -> bool {
        self.staged.iter().any(|op| {
            matches!(op, StagedOp::DeleteExpired(k, min, max)
                if *k == kind && (*min..=*max).contains(&id))
        })
    }
}

#[async_trait]
impl LiveTransaction for MemoryTransaction {
    async fn event_leaderboard(&mut self, event_id: i64, top: u32) -> Result<Vec<LeaderboardRow>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner
            .event_leaderboards
            .get(&event_id)
            .map(|rows| rows.iter().take(top as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn round_leaderboard(&mut self, round_id: i64, top: u32) -> Result<Vec<LeaderboardRow>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner
            .round_leaderboards
            .get(&round_id)
            .map(|rows| rows.iter().take(top as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn tournament_leaderboard(
        &mut self,
        key: &PeriodKey,
        top: u32,
    ) -> Result<Vec<LeaderboardRow>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner
            .tournaments
            .get(&(key.period_start, key.name.clone()))
            .map(|(_, users, _)| users.iter().take(top as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn mark_event_sent(&mut self, event_id: i64) -> Result<u64> {
        let already = {
            let inner = self.inner.read().map_err(poison_err)?;
            inner.events.get(&event_id).is_none_or(|(_, sent)| *sent)
        };
        if already || self.staged_mark_event(event_id) {
            return Ok(0);
        }
        self.staged.push(StagedOp::MarkEvent(event_id));
        Ok(1)
    }

    async fn mark_round_sent(&mut self, round_id: i64) -> Result<u64> {
        let already = {
            let inner = self.inner.read().map_err(poison_err)?;
            inner
                .event_rounds
                .get(&round_id)
                .is_none_or(|(_, sent)| *sent)
        };
        if already || self.staged_mark_round(round_id) {
            return Ok(0);
        }
        self.staged.push(StagedOp::MarkRound(round_id));
        Ok(1)
    }

    async fn mark_tournament_sent(&mut self, key: &PeriodKey) -> Result<u64> {
        let rows = {
            let inner = self.inner.read().map_err(poison_err)?;
            match inner.tournaments.get(&(key.period_start, key.name.clone())) {
                Some((_, _, true)) | None => 0,
                Some((_, users, false)) => users.len().max(1) as u64,
            }
        };
        if rows == 0 || self.staged_mark_tournament(key) {
            return Ok(0);
        }
        self.staged.push(StagedOp::MarkTournament(key.clone()));
        Ok(rows)
    }

    async fn expired_batch(&mut self, kind: RecordKind, limit: u32) -> Result<Vec<ArchiveRow>> {
        let rows = {
            let inner = self.inner.read().map_err(poison_err)?;
            inner
                .archive
                .get(&kind)
                .map(|table| {
                    table
                        .values()
                        .filter(|row| !self.staged_deleted(kind, row.id))
                        .take(limit as usize)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(rows)
    }

    async fn delete_expired(&mut self, kind: RecordKind, min_id: i64, max_id: i64) -> Result<u64> {
        let affected = {
            let mut inner = self.inner.write().map_err(poison_err)?;
            if inner.fail_next_delete {
                inner.fail_next_delete = false;
                return Err(Error::Core(CoreError::storage(
                    "injected delete failure",
                )));
            }
            inner
                .archive
                .get(&kind)
                .map(|table| table.range(min_id..=max_id).count() as u64)
                .unwrap_or(0)
        };
        self.staged.push(StagedOp::DeleteExpired(kind, min_id, max_id));
        Ok(affected)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        for op in self.staged {
            match op {
                StagedOp::MarkEvent(id) => {
                    if let Some((_, sent)) = inner.events.get_mut(&id) {
                        *sent = true;
                    }
                }
                StagedOp::MarkRound(id) => {
                    if let Some((_, sent)) = inner.event_rounds.get_mut(&id) {
                        *sent = true;
                    }
                }
                StagedOp::MarkTournament(key) => {
                    if let Some((_, _, sent)) =
                        inner.tournaments.get_mut(&(key.period_start, key.name))
                    {
                        *sent = true;
                    }
                }
                StagedOp::DeleteExpired(kind, min_id, max_id) => {
                    if let Some(table) = inner.archive.get_mut(&kind) {
                        table.retain(|id, _| !(min_id..=max_id).contains(id));
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        // Staged writes are simply dropped.
        Ok(())
    }
}
