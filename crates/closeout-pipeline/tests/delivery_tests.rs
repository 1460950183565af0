//! Delivery semantics: outbox marking, rollback, ordering.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use closeout_core::MemoryObjectStore;
use closeout_pipeline::model::{IntervalKind, PeriodKey};
use closeout_pipeline::pipeline::{Pipeline, PipelineConfig};
use closeout_pipeline::store::memory::MemoryLiveStore;

use common::{event, round, row, RecordingDelivery, Script};

fn pipeline(
    store: Arc<MemoryLiveStore>,
    delivery: Arc<RecordingDelivery>,
) -> Pipeline {
    let config = PipelineConfig {
        workers: 1,
        ..PipelineConfig::default()
    };
    Pipeline::new(store, Arc::new(MemoryObjectStore::new()), delivery, config)
}

#[tokio::test]
async fn marking_is_idempotent_across_runs() {
    let store = Arc::new(MemoryLiveStore::new());
    store.seed_event(event(1), vec![row(1, 1, 1)]);
    store.seed_event(event(2), vec![row(2, 2, 1)]);
    store.seed_event_round(round(10, 1), vec![row(3, 10, 1)]);

    let delivery = Arc::new(RecordingDelivery::accepting());
    let pipeline = pipeline(Arc::clone(&store), Arc::clone(&delivery));

    let first = pipeline.run().await.unwrap();
    assert_eq!(first.delivered(), 3);
    assert!(store.is_event_sent(1));
    assert!(store.is_event_sent(2));
    assert!(store.is_round_sent(10));

    // Everything is marked; a second run must not call out again.
    let second = pipeline.run().await.unwrap();
    assert_eq!(second.delivered(), 0);
    assert_eq!(delivery.call_count(), 3);
}

#[tokio::test]
async fn rejection_rolls_the_flag_back() {
    let store = Arc::new(MemoryLiveStore::new());
    store.seed_event(event(1), vec![row(1, 1, 1)]);

    let delivery = Arc::new(RecordingDelivery::scripted(vec![Script::Reject(500)]));
    let pipeline = pipeline(Arc::clone(&store), Arc::clone(&delivery));

    let first = pipeline.run().await.unwrap();
    assert_eq!(first.events.deferred, 1);
    assert!(!store.is_event_sent(1));

    // The script is exhausted, so the retry is accepted.
    let second = pipeline.run().await.unwrap();
    assert_eq!(second.delivered(), 1);
    assert!(store.is_event_sent(1));
    assert_eq!(delivery.call_count(), 2);
}

#[tokio::test]
async fn transport_failure_defers_like_rejection() {
    let store = Arc::new(MemoryLiveStore::new());
    store.seed_event(event(1), vec![row(1, 1, 1)]);

    let delivery = Arc::new(RecordingDelivery::scripted(vec![Script::TransportError]));
    let pipeline = pipeline(Arc::clone(&store), Arc::clone(&delivery));

    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.events.deferred, 1);
    assert_eq!(summary.events.failed, 0);
    assert!(!store.is_event_sent(1));
}

#[tokio::test]
async fn one_failing_candidate_does_not_abort_siblings() {
    let store = Arc::new(MemoryLiveStore::new());
    store.seed_event(event(1), vec![row(1, 1, 1)]);
    store.seed_event(event(2), vec![row(2, 2, 1)]);

    let delivery = Arc::new(RecordingDelivery::scripted(vec![Script::Reject(503)]));
    let pipeline = pipeline(Arc::clone(&store), Arc::clone(&delivery));

    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.events.deferred, 1);
    assert_eq!(summary.events.delivered, 1);
    assert!(!store.is_event_sent(1));
    assert!(store.is_event_sent(2));
}

#[tokio::test]
async fn rounds_are_delivered_before_events() {
    let store = Arc::new(MemoryLiveStore::new());
    store.seed_event(event(1), vec![row(1, 1, 1)]);
    store.seed_event_round(round(10, 1), vec![row(2, 10, 1)]);

    let delivery = Arc::new(RecordingDelivery::accepting());
    let pipeline = pipeline(Arc::clone(&store), Arc::clone(&delivery));
    pipeline.run().await.unwrap();

    assert_eq!(delivery.keys(), vec!["event-1-round-10", "event-1"]);
}

#[tokio::test]
async fn only_closed_tournament_periods_are_delivered() {
    let store = Arc::new(MemoryLiveStore::new());
    let today = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();

    let closed = PeriodKey::new("winter-cup", IntervalKind::Daily, today - Duration::days(1));
    let current = PeriodKey::new("winter-cup", IntervalKind::Daily, today);
    store.seed_tournament(closed.clone(), vec![row(1, 0, 1), row(2, 0, 2)]);
    store.seed_tournament(current.clone(), vec![row(3, 0, 1)]);

    let delivery = Arc::new(RecordingDelivery::accepting());
    let pipeline = pipeline(Arc::clone(&store), Arc::clone(&delivery));

    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.tournaments.delivered, 1);
    assert!(store.is_tournament_sent(&closed));
    assert!(!store.is_tournament_sent(&current));

    let keys = delivery.keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("tournament-winter-cup-"));
    assert!(keys[0].ends_with("-DAILY"));
}

#[tokio::test]
async fn leaderboard_rides_along_in_the_payload() {
    let store = Arc::new(MemoryLiveStore::new());
    store.seed_event(event(1), vec![row(1, 1, 1), row(2, 1, 2)]);

    let delivery = Arc::new(RecordingDelivery::accepting());
    let pipeline = pipeline(Arc::clone(&store), Arc::clone(&delivery));
    pipeline.run().await.unwrap();

    let payloads = delivery.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["id"], 1);
    let users = payloads[0]["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["ranking"], 1);
    assert_eq!(users[1]["ranking"], 2);
}
