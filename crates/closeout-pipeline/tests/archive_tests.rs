//! Archival semantics: batching, compensation, key determinism.

mod common;

use std::io::Read;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use flate2::read::GzDecoder;

use closeout_core::{MemoryObjectStore, ObjectStore};
use closeout_pipeline::archive::ArchiveRunner;
use closeout_pipeline::middleware::{Observers, UnitDescriptor, UnitKind, UnitObserver, UnitOutcome};
use closeout_pipeline::model::RecordKind;
use closeout_pipeline::paths;
use closeout_pipeline::store::memory::MemoryLiveStore;
use closeout_pipeline::store::LiveStore;

use common::archive_row;

fn runner(
    store: Arc<MemoryLiveStore>,
    objects: Arc<MemoryObjectStore>,
    batch_limit: u32,
) -> ArchiveRunner {
    ArchiveRunner::new(store, objects, Observers::new(), "archive", batch_limit)
}

fn gunzip(data: &[u8]) -> String {
    let mut out = String::new();
    GzDecoder::new(data).read_to_string(&mut out).unwrap();
    out
}

#[tokio::test]
async fn drains_a_kind_in_ascending_id_batches() {
    let store = Arc::new(MemoryLiveStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let columns = RecordKind::Event.columns().len();
    store.seed_archive_rows(
        RecordKind::Event,
        (1..=5).map(|id| archive_row(id, columns)).collect(),
    );

    let run_started_at = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
    let stats = runner(Arc::clone(&store), Arc::clone(&objects), 2)
        .archive_kind(RecordKind::Event, run_started_at)
        .await
        .unwrap();

    assert_eq!(stats.batches, 3);
    assert_eq!(stats.rows, 5);
    assert_eq!(stats.failed, 0);
    assert_eq!(store.archive_rows_remaining(RecordKind::Event), 0);

    let mut paths: Vec<String> = objects
        .list("archive/")
        .await
        .unwrap()
        .into_iter()
        .map(|meta| meta.path)
        .collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            "archive/2024-03-01T06:00:00Z/event/1-2.csv.gz",
            "archive/2024-03-01T06:00:00Z/event/3-4.csv.gz",
            "archive/2024-03-01T06:00:00Z/event/5-5.csv.gz",
        ]
    );
}

#[tokio::test]
async fn artifact_holds_header_and_rows() {
    let store = Arc::new(MemoryLiveStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let columns = RecordKind::EventUser.columns().len();
    store.seed_archive_rows(
        RecordKind::EventUser,
        vec![archive_row(7, columns), archive_row(8, columns)],
    );

    let run_started_at = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
    runner(Arc::clone(&store), Arc::clone(&objects), 10)
        .archive_kind(RecordKind::EventUser, run_started_at)
        .await
        .unwrap();

    let key = paths::artifact_key("archive", run_started_at, RecordKind::EventUser, 7, 8);
    let data = objects.get(&key).await.unwrap();
    let text = gunzip(&data);
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        RecordKind::EventUser.columns().join(",")
    );
    assert!(lines.next().unwrap().starts_with("7-0,"));
    assert!(lines.next().unwrap().starts_with("8-0,"));
    assert!(lines.next().is_none());
}

#[tokio::test]
async fn failed_delete_compensates_by_removing_the_artifact() {
    let store = Arc::new(MemoryLiveStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let columns = RecordKind::Event.columns().len();
    store.seed_archive_rows(RecordKind::Event, vec![archive_row(1, columns)]);
    store.fail_next_delete();

    let run_started_at = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
    let stats = runner(Arc::clone(&store), Arc::clone(&objects), 10)
        .archive_kind(RecordKind::Event, run_started_at)
        .await
        .unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.batches, 0);
    assert!(stats.orphaned_artifacts.is_empty());
    // Rows stay live, no artifact remains: the batch is retryable as-is.
    assert_eq!(store.archive_rows_remaining(RecordKind::Event), 1);
    assert!(objects.list("archive/").await.unwrap().is_empty());
}

#[tokio::test]
async fn rerun_after_crash_overwrites_the_same_key() {
    let store = Arc::new(MemoryLiveStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let columns = RecordKind::Event.columns().len();
    store.seed_archive_rows(
        RecordKind::Event,
        (1..=3).map(|id| archive_row(id, columns)).collect(),
    );

    let run_started_at = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
    let key = paths::artifact_key("archive", run_started_at, RecordKind::Event, 1, 3);

    // A crash between artifact write and delete leaves a stale artifact.
    objects
        .put(&key, bytes::Bytes::from_static(b"stale"))
        .await
        .unwrap();

    let stats = runner(Arc::clone(&store), Arc::clone(&objects), 10)
        .archive_kind(RecordKind::Event, run_started_at)
        .await
        .unwrap();

    assert_eq!(stats.batches, 1);
    assert_eq!(store.archive_rows_remaining(RecordKind::Event), 0);

    let artifacts = objects.list("archive/").await.unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].path, key);
    let text = gunzip(&objects.get(&key).await.unwrap());
    assert!(text.starts_with(&RecordKind::Event.columns().join(",")));
}

#[tokio::test]
async fn closed_tournament_rows_are_exported_and_purged() {
    let store = Arc::new(MemoryLiveStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let columns = RecordKind::Tournament.columns().len();
    store.seed_archive_rows(
        RecordKind::Tournament,
        (1..=3).map(|id| archive_row(id, columns)).collect(),
    );

    let run_started_at = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
    let stats = runner(Arc::clone(&store), Arc::clone(&objects), 10)
        .archive_kind(RecordKind::Tournament, run_started_at)
        .await
        .unwrap();

    assert_eq!(stats.rows, 3);
    assert_eq!(store.archive_rows_remaining(RecordKind::Tournament), 0);

    let key = paths::artifact_key("archive", run_started_at, RecordKind::Tournament, 1, 3);
    assert_eq!(key, "archive/2024-03-01T06:00:00Z/tournament/1-3.csv.gz");
    let text = gunzip(&objects.get(&key).await.unwrap());
    assert!(text.starts_with(&RecordKind::Tournament.columns().join(",")));
    assert_eq!(text.lines().count(), 4);
}

struct KindOrder(Mutex<Vec<RecordKind>>);

impl UnitObserver for KindOrder {
    fn observe(&self, unit: &UnitDescriptor, outcome: &UnitOutcome, _elapsed: Duration) {
        if let (UnitKind::Archive(kind), UnitOutcome::Archived { .. }) = (unit.kind, outcome) {
            self.0.lock().unwrap().push(kind);
        }
    }
}

#[tokio::test]
async fn kinds_are_drained_in_fixed_order() {
    let store = Arc::new(MemoryLiveStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    for kind in RecordKind::ALL {
        store.seed_archive_rows(kind, vec![archive_row(1, kind.columns().len())]);
    }

    let order = Arc::new(KindOrder(Mutex::new(Vec::new())));
    let observers = Observers::new().with(Arc::clone(&order) as Arc<dyn UnitObserver>);
    let runner = ArchiveRunner::new(
        Arc::clone(&store) as Arc<dyn LiveStore>,
        Arc::clone(&objects) as Arc<dyn ObjectStore>,
        observers,
        "archive",
        10,
    );

    let run_started_at = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
    let stats = runner.run(run_started_at).await.unwrap();

    assert_eq!(stats.batches, 5);
    assert_eq!(order.0.lock().unwrap().as_slice(), &RecordKind::ALL);
}
