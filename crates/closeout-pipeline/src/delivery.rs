//! Outbound delivery of final leaderboards.
//!
//! Each candidate is settled in its own transaction: the sent flag is set
//! first (zero rows affected means a concurrent run got there, roll back and
//! move on), the final leaderboard is read, the payload is handed to the
//! receiver, and the transaction commits only on acceptance. Anything else
//! rolls the flag back so a later invocation retries the candidate.
//!
//! Candidates within a page settle concurrently with bounded parallelism;
//! one failing candidate never aborts its siblings.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::client::{DeliveryStatus, ResultsDelivery};
use crate::error::Result;
use crate::interval::{period_start, RotationSchedule};
use crate::middleware::{Observers, UnitDescriptor, UnitKind, UnitObserver, UnitOutcome};
use crate::model::{Event, EventRound, IntervalKind, PeriodKey};
use crate::payload::{self, DeliveryKey};
use crate::scanner::PageCursor;
use crate::store::{LiveStore, LiveTransaction};

/// Outcome tallies for one delivery phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseStats {
    /// Candidates acknowledged and committed.
    pub delivered: u64,
    /// Candidates a concurrent or earlier run had already marked.
    pub already_handled: u64,
    /// Candidates left unmarked for a later invocation.
    pub deferred: u64,
    /// Candidates that errored.
    pub failed: u64,
}

impl PhaseStats {
    fn tally(&mut self, outcome: &UnitOutcome) {
        match outcome {
            UnitOutcome::Delivered => self.delivered += 1,
            UnitOutcome::AlreadyHandled => self.already_handled += 1,
            UnitOutcome::Deferred => self.deferred += 1,
            UnitOutcome::Failed { .. } => self.failed += 1,
            UnitOutcome::Archived { .. } => {}
        }
    }

    /// Folds another phase's tallies into this one.
    pub fn merge(&mut self, other: PhaseStats) {
        self.delivered += other.delivered;
        self.already_handled += other.already_handled;
        self.deferred += other.deferred;
        self.failed += other.failed;
    }
}

/// Runs the delivery phases of one pipeline invocation.
pub struct DeliveryRunner {
    store: Arc<dyn LiveStore>,
    delivery: Arc<dyn ResultsDelivery>,
    observers: Observers,
    schedule: RotationSchedule,
    page_limit: u32,
    leaderboard_top: u32,
    workers: usize,
}

impl DeliveryRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(
        store: Arc<dyn LiveStore>,
        delivery: Arc<dyn ResultsDelivery>,
        observers: Observers,
        schedule: RotationSchedule,
        page_limit: u32,
        leaderboard_top: u32,
        workers: usize,
    ) -> Self {
        Self {
            store,
            delivery,
            observers,
            schedule,
            page_limit,
            leaderboard_top,
            workers: workers.max(1),
        }
    }

    /// Delivers every ended event round.
    ///
    /// Rounds go before their parent events so a consumer never sees an
    /// event's final state ahead of its rounds'.
    pub async fn run_rounds(&self) -> Result<PhaseStats> {
        let mut cursor = PageCursor::new(self.page_limit);
        let mut stats = PhaseStats::default();
        loop {
            let page = cursor.page();
            let batch = self.store.ended_event_rounds(page).await?;
            if batch.is_empty() {
                break;
            }
            let fetched = batch.len();
            let outcomes: Vec<UnitOutcome> = stream::iter(batch)
                .map(|round| self.settle_round(round))
                .buffer_unordered(self.workers)
                .collect()
                .await;
            let handled = outcomes.iter().filter(|o| o.clears_candidate()).count();
            for outcome in &outcomes {
                stats.tally(outcome);
            }
            cursor.advance(fetched, handled);
            if fetched < page.limit as usize {
                break;
            }
        }
        Ok(stats)
    }

    /// Delivers every ended event.
    pub async fn run_events(&self) -> Result<PhaseStats> {
        let mut cursor = PageCursor::new(self.page_limit);
        let mut stats = PhaseStats::default();
        loop {
            let page = cursor.page();
            let batch = self.store.ended_events(page).await?;
            if batch.is_empty() {
                break;
            }
            let fetched = batch.len();
            let outcomes: Vec<UnitOutcome> = stream::iter(batch)
                .map(|event| self.settle_event(event))
                .buffer_unordered(self.workers)
                .collect()
                .await;
            let handled = outcomes.iter().filter(|o| o.clears_candidate()).count();
            for outcome in &outcomes {
                stats.tally(outcome);
            }
            cursor.advance(fetched, handled);
            if fetched < page.limit as usize {
                break;
            }
        }
        Ok(stats)
    }

    /// Delivers every tournament occurrence whose period has closed.
    ///
    /// For each rotating interval, an occurrence is a candidate only when it
    /// started strictly before the current period's start as of `now`.
    pub async fn run_tournaments(&self, now: DateTime<Utc>) -> Result<PhaseStats> {
        let mut stats = PhaseStats::default();
        for interval in IntervalKind::ROTATING {
            let started_before = period_start(now, interval, &self.schedule);
            let mut cursor = PageCursor::new(self.page_limit);
            loop {
                let page = cursor.page();
                let batch = self
                    .store
                    .ended_tournaments(interval, started_before, page)
                    .await?;
                if batch.is_empty() {
                    break;
                }
                let fetched = batch.len();
                let outcomes: Vec<UnitOutcome> = stream::iter(batch)
                    .map(|key| self.settle_tournament(key))
                    .buffer_unordered(self.workers)
                    .collect()
                    .await;
                let handled = outcomes.iter().filter(|o| o.clears_candidate()).count();
                for outcome in &outcomes {
                    stats.tally(outcome);
                }
                cursor.advance(fetched, handled);
                if fetched < page.limit as usize {
                    break;
                }
            }
        }
        Ok(stats)
    }

    async fn settle_event(&self, event: Event) -> UnitOutcome {
        let key = DeliveryKey::event(event.id);
        let unit = UnitDescriptor::new(UnitKind::Event, key.as_str());
        self.observe(unit, async {
            let mut tx = self.store.begin().await?;
            if tx.mark_event_sent(event.id).await? == 0 {
                tx.rollback().await?;
                return Ok(UnitOutcome::AlreadyHandled);
            }
            let leaderboard = tx.event_leaderboard(event.id, self.leaderboard_top).await?;
            let payload = payload::event_payload(&event, &leaderboard);
            self.finish(tx, &key, &payload).await
        })
        .await
    }

    async fn settle_round(&self, round: EventRound) -> UnitOutcome {
        let key = DeliveryKey::event_round(round.event_id, round.id);
        let unit = UnitDescriptor::new(UnitKind::EventRound, key.as_str());
        self.observe(unit, async {
            let mut tx = self.store.begin().await?;
            if tx.mark_round_sent(round.id).await? == 0 {
                tx.rollback().await?;
                return Ok(UnitOutcome::AlreadyHandled);
            }
            let leaderboard = tx.round_leaderboard(round.id, self.leaderboard_top).await?;
            let payload = payload::event_round_payload(&round, &leaderboard);
            self.finish(tx, &key, &payload).await
        })
        .await
    }

    async fn settle_tournament(&self, period: PeriodKey) -> UnitOutcome {
        let key = DeliveryKey::tournament(&period);
        let unit = UnitDescriptor::new(UnitKind::Tournament, key.as_str());
        self.observe(unit, async {
            let mut tx = self.store.begin().await?;
            if tx.mark_tournament_sent(&period).await? == 0 {
                tx.rollback().await?;
                return Ok(UnitOutcome::AlreadyHandled);
            }
            let users = tx
                .tournament_leaderboard(&period, self.leaderboard_top)
                .await?;
            let payload = payload::tournament_payload(&period, &users);
            self.finish(tx, &key, &payload).await
        })
        .await
    }

    /// Hands the payload to the receiver and settles the transaction: commit
    /// on acceptance, rollback on rejection or transport failure so the
    /// candidate stays available for a later run.
    async fn finish(
        &self,
        tx: Box<dyn LiveTransaction>,
        key: &DeliveryKey,
        payload: &Value,
    ) -> Result<UnitOutcome> {
        match self.delivery.deliver(key, payload).await {
            Ok(DeliveryStatus::Accepted) => {
                tx.commit().await?;
                Ok(UnitOutcome::Delivered)
            }
            Ok(DeliveryStatus::Rejected(status)) => {
                tracing::warn!(key = %key, status, "receiver rejected payload");
                tx.rollback().await?;
                Ok(UnitOutcome::Deferred)
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "delivery transport failed");
                tx.rollback().await?;
                Ok(UnitOutcome::Deferred)
            }
        }
    }

    async fn observe<F>(&self, unit: UnitDescriptor, work: F) -> UnitOutcome
    where
        F: std::future::Future<Output = Result<UnitOutcome>>,
    {
        let start = Instant::now();
        let outcome = match work.await {
            Ok(outcome) => outcome,
            Err(err) => UnitOutcome::Failed {
                message: err.to_string(),
            },
        };
        self.observers.observe(&unit, &outcome, start.elapsed());
        outcome
    }
}
