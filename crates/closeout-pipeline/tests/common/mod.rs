//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use closeout_pipeline::client::{DeliveryStatus, ResultsDelivery};
use closeout_pipeline::error::{Error, Result};
use closeout_pipeline::model::{ArchiveRow, Event, EventRound, LeaderboardRow};
use closeout_pipeline::payload::DeliveryKey;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

pub fn event(id: i64) -> Event {
    Event {
        id,
        name: format!("event-{id}"),
        data: json!({}),
        started_at: t0(),
        created_at: t0(),
        updated_at: t0(),
    }
}

pub fn round(id: i64, event_id: i64) -> EventRound {
    EventRound {
        id,
        event_id,
        name: format!("round-{id}"),
        scoring: json!("points"),
        data: json!({}),
        ended_at: t0(),
        created_at: t0(),
        updated_at: t0(),
    }
}

pub fn row(id: i64, parent_id: i64, rank: u64) -> LeaderboardRow {
    LeaderboardRow {
        id,
        parent_id,
        owner_id: 1000 + id,
        score: 1000 - i64::try_from(rank).unwrap_or(0),
        rank,
        data: json!({}),
        created_at: t0(),
        updated_at: t0(),
    }
}

pub fn archive_row(id: i64, columns: usize) -> ArchiveRow {
    ArchiveRow::new(id, (0..columns).map(|c| format!("{id}-{c}")).collect())
}

/// One scripted response of a [`RecordingDelivery`].
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Accept,
    Reject(u16),
    TransportError,
}

/// Delivery double that records every call and plays back a script.
/// An exhausted (or empty) script accepts everything.
pub struct RecordingDelivery {
    calls: Mutex<Vec<(String, Value)>>,
    script: Mutex<VecDeque<Script>>,
}

impl RecordingDelivery {
    pub fn accepting() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<Script>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ResultsDelivery for RecordingDelivery {
    async fn deliver(&self, key: &DeliveryKey, payload: &Value) -> Result<DeliveryStatus> {
        self.calls
            .lock()
            .unwrap()
            .push((key.to_string(), payload.clone()));
        match self.script.lock().unwrap().pop_front() {
            None | Some(Script::Accept) => Ok(DeliveryStatus::Accepted),
            Some(Script::Reject(status)) => Ok(DeliveryStatus::Rejected(status)),
            Some(Script::TransportError) => Err(Error::delivery("connection refused")),
        }
    }
}
