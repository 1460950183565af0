//! Delivery payloads and identifying keys.
//!
//! The identifying key names exactly one candidate (entity kind + ids +
//! period) and is what the downstream consumer dedupes on: redelivery after
//! a crash inside the at-least-once window carries the same key.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::model::{Event, EventRound, LeaderboardRow, PeriodKey};

/// Identifying key for one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryKey(String);

impl DeliveryKey {
    /// Key for an ended event.
    #[must_use]
    pub fn event(event_id: i64) -> Self {
        Self(format!("event-{event_id}"))
    }

    /// Key for an ended event round.
    #[must_use]
    pub fn event_round(event_id: i64, round_id: i64) -> Self {
        Self(format!("event-{event_id}-round-{round_id}"))
    }

    /// Key for an ended tournament occurrence.
    #[must_use]
    pub fn tournament(key: &PeriodKey) -> Self {
        Self(format!(
            "tournament-{}-{}-{}",
            key.name,
            key.period_start.to_rfc3339_opts(SecondsFormat::Secs, true),
            key.interval
        ))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn leaderboard_json(rows: &[LeaderboardRow]) -> Value {
    rows.iter()
        .map(|row| {
            json!({
                "id": row.id,
                "parent_id": row.parent_id,
                "user_id": row.owner_id,
                "score": row.score,
                "ranking": row.rank,
                "data": row.data,
                "created_at": rfc3339(row.created_at),
                "updated_at": rfc3339(row.updated_at),
            })
        })
        .collect()
}

/// Payload for an ended event: the event plus its final leaderboard.
#[must_use]
pub fn event_payload(event: &Event, leaderboard: &[LeaderboardRow]) -> Value {
    json!({
        "id": event.id,
        "name": event.name,
        "users": leaderboard_json(leaderboard),
        "data": event.data,
        "started_at": rfc3339(event.started_at),
        "created_at": rfc3339(event.created_at),
        "updated_at": rfc3339(event.updated_at),
    })
}

/// Payload for an ended event round.
#[must_use]
pub fn event_round_payload(round: &EventRound, leaderboard: &[LeaderboardRow]) -> Value {
    json!({
        "id": round.id,
        "event_id": round.event_id,
        "name": round.name,
        "scoring": round.scoring,
        "users": leaderboard_json(leaderboard),
        "data": round.data,
        "ended_at": rfc3339(round.ended_at),
        "created_at": rfc3339(round.created_at),
        "updated_at": rfc3339(round.updated_at),
    })
}

/// Payload for an ended tournament occurrence: the ranked user rows.
#[must_use]
pub fn tournament_payload(key: &PeriodKey, users: &[LeaderboardRow]) -> Value {
    json!({
        "name": key.name,
        "tournament_interval": key.interval,
        "tournament_started_at": rfc3339(key.period_start),
        "users": leaderboard_json(users),
    })
}
