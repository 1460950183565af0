//! Artifact key construction for archive exports.
//!
//! Keys are a pure function of `(root, run timestamp, kind, id range)`:
//! re-running a batch after a crash-before-delete regenerates the identical
//! key, so the overwrite is safe and no duplicate artifact appears.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::RecordKind;

/// Deterministic key for one batch's artifact.
#[must_use]
pub fn artifact_key(
    root: &str,
    run_started_at: DateTime<Utc>,
    kind: RecordKind,
    min_id: i64,
    max_id: i64,
) -> String {
    let root = root.trim_end_matches('/');
    let stamp = run_started_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    format!("{root}/{stamp}/{}/{min_id}-{max_id}.csv.gz", kind.segment())
}
