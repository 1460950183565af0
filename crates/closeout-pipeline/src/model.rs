//! Data model for ended candidates and their ranked children.
//!
//! Candidates are created by the normal write-path services; this pipeline
//! only ever sets their sent flag or deletes them. Opaque `data` payloads are
//! carried through unchanged.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rotation interval of a recurring tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntervalKind {
    /// Rotates every UTC day.
    Daily,
    /// Rotates every week on a configured weekday.
    Weekly,
    /// Rotates every calendar month on a configured day.
    Monthly,
    /// Never rotates.
    Unlimited,
}

impl IntervalKind {
    /// The three intervals that actually rotate (and therefore end).
    pub const ROTATING: [Self; 3] = [Self::Daily, Self::Weekly, Self::Monthly];

    /// Wire/name form of the interval.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Unlimited => "UNLIMITED",
        }
    }
}

impl std::fmt::Display for IntervalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one occurrence of a recurring tournament.
///
/// Immutable once computed: the start timestamp comes from the interval
/// boundary calculator, which is deterministic for a fixed
/// `(current_time, interval, schedule)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    /// Tournament name.
    pub name: String,
    /// Rotation interval.
    pub interval: IntervalKind,
    /// Computed start of the occurrence's period.
    pub period_start: DateTime<Utc>,
}

impl PeriodKey {
    /// Creates a period key.
    #[must_use]
    pub fn new(name: impl Into<String>, interval: IntervalKind, period_start: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            interval,
            period_start,
        }
    }
}

impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.name,
            self.period_start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.interval
        )
    }
}

/// An ended competitive event awaiting result delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonically assigned identifier.
    pub id: i64,
    /// Event name.
    pub name: String,
    /// Opaque payload, carried through unchanged.
    pub data: Value,
    /// When the event started.
    pub started_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// An ended round within an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRound {
    /// Monotonically assigned identifier.
    pub id: i64,
    /// Parent event.
    pub event_id: i64,
    /// Round name.
    pub name: String,
    /// Scoring rule description.
    pub scoring: Value,
    /// Opaque payload, carried through unchanged.
    pub data: Value,
    /// When the round's period closed.
    pub ended_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One ranked row of a candidate's final leaderboard.
///
/// Rank is dense and scoped to the parent; extraction is capped at the
/// configured top limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardRow {
    /// Child row identifier.
    pub id: i64,
    /// Parent candidate identifier (event id, round id, or 0 for
    /// tournaments, which are parented by period key).
    pub parent_id: i64,
    /// Owning user.
    pub owner_id: i64,
    /// Final score.
    pub score: i64,
    /// Dense rank, ascending from 1.
    pub rank: u64,
    /// Opaque payload, carried through unchanged.
    pub data: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// The record kinds subject to archival export, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Top-level events.
    Event,
    /// Event membership rows.
    EventUser,
    /// Rounds within events.
    EventRound,
    /// Per-round result rows.
    EventRoundUser,
    /// Per-user rows of ended tournament occurrences.
    Tournament,
}

impl RecordKind {
    /// Fixed processing order for one archival invocation.
    pub const ALL: [Self; 5] = [
        Self::Event,
        Self::EventUser,
        Self::EventRound,
        Self::EventRoundUser,
        Self::Tournament,
    ];

    /// Path segment used in artifact keys.
    #[must_use]
    pub const fn segment(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::EventUser => "event_user",
            Self::EventRound => "event_round",
            Self::EventRoundUser => "event_round_user",
            Self::Tournament => "tournament",
        }
    }

    /// CSV column set for this kind. Fixed; the encoder rejects rows whose
    /// value count disagrees.
    #[must_use]
    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Event => &["id", "name", "data", "started_at", "created_at", "updated_at"],
            Self::EventUser => &["id", "event_id", "user_id", "data", "created_at", "updated_at"],
            Self::EventRound => &[
                "id",
                "event_id",
                "name",
                "scoring",
                "data",
                "ended_at",
                "created_at",
                "updated_at",
            ],
            Self::EventRoundUser => &[
                "id",
                "event_user_id",
                "event_round_id",
                "result",
                "data",
                "created_at",
                "updated_at",
            ],
            Self::Tournament => &[
                "id",
                "name",
                "tournament_interval",
                "user_id",
                "score",
                "ranking",
                "data",
                "tournament_started_at",
                "created_at",
                "updated_at",
            ],
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.segment())
    }
}

/// One expired row fetched for archival, already projected onto its kind's
/// column set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRow {
    /// Monotonically assigned identifier; batches are contiguous `[min, max]`
    /// ranges over it.
    pub id: i64,
    /// Column values aligned with [`RecordKind::columns`].
    pub values: Vec<String>,
}

impl ArchiveRow {
    /// Creates an archive row.
    #[must_use]
    pub fn new(id: i64, values: Vec<String>) -> Self {
        Self { id, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_key_display_is_stable() {
        let key = PeriodKey::new(
            "spring-cup",
            IntervalKind::Weekly,
            Utc.with_ymd_and_hms(2020, 1, 6, 0, 0, 0).unwrap(),
        );
        assert_eq!(key.to_string(), "spring-cup-2020-01-06T00:00:00Z-WEEKLY");
    }

    #[test]
    fn record_kind_columns_start_with_id() {
        for kind in RecordKind::ALL {
            assert_eq!(kind.columns()[0], "id", "{kind}");
        }
    }

    #[test]
    fn interval_round_trips_through_serde() {
        for interval in [
            IntervalKind::Daily,
            IntervalKind::Weekly,
            IntervalKind::Monthly,
            IntervalKind::Unlimited,
        ] {
            let json = serde_json::to_string(&interval).unwrap();
            assert_eq!(json, format!("\"{interval}\""));
        }
    }
}
