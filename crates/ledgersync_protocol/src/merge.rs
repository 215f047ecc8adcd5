//! Record merge engine.
//!
//! Reconciles a local and a remote record set into one. Every id present in
//! either input ends up in exactly one of [`MergeResult::merged`] or
//! [`MergeResult::true_conflicts`].
//!
//! Classification per id:
//!
//! - present on one side only: merged, recorded as added from that side
//! - present on both with the same content: the newer `updated_at` is kept
//!   (local on a tie), nothing is recorded
//! - present on both with different content: if the `updated_at` distance
//!   is within the threshold the pairing is a [`TrueConflict`] and is held
//!   back; otherwise the newer side wins as an [`AutoResolvedConflict`]

use crate::record::{sort_newest_first, Record};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default window within which differing edits count as a true conflict.
pub const DEFAULT_CONFLICT_THRESHOLD_MS: i64 = 1000;

/// Which replica a version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// This device.
    Local,
    /// The remote store.
    Remote,
}

/// Per-id choices for pending true conflicts.
pub type Resolutions = BTreeMap<String, Side>;

/// Why a same-id pairing was classified the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// One side is newer by more than the threshold.
    NewerTimestamp,
    /// Both sides carry the same `updated_at`.
    EqualTimestamps,
    /// The timestamps differ, but by no more than the threshold.
    WithinThreshold,
}

/// A differing pairing resolved by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoResolvedConflict {
    /// Record id.
    pub expense_id: String,
    /// Local version.
    pub local: Record,
    /// Remote version.
    pub remote: Record,
    /// The side whose version was kept.
    pub winner: Side,
    /// Always [`ConflictReason::NewerTimestamp`].
    pub reason: ConflictReason,
}

/// A differing pairing too close in time to resolve automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrueConflict {
    /// Record id.
    pub expense_id: String,
    /// Local version.
    pub local: Record,
    /// Remote version.
    pub remote: Record,
    /// [`ConflictReason::EqualTimestamps`] or [`ConflictReason::WithinThreshold`].
    pub reason: ConflictReason,
}

impl TrueConflict {
    /// Returns the version for the chosen side.
    pub fn version(&self, side: Side) -> &Record {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }
}

/// Merge tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Maximum `updated_at` distance that still counts as a true conflict.
    pub conflict_threshold: Duration,
}

impl MergeOptions {
    /// Creates options with the given threshold in milliseconds.
    pub fn with_threshold_ms(ms: i64) -> Self {
        Self {
            conflict_threshold: Duration::milliseconds(ms.max(0)),
        }
    }
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self::with_threshold_ms(DEFAULT_CONFLICT_THRESHOLD_MS)
    }
}

/// The outcome of [`merge`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    /// Unique by id, newest `created_at` first.
    pub merged: Vec<Record>,
    /// Ids present only locally.
    pub added_from_local: Vec<String>,
    /// Ids present only remotely.
    pub added_from_remote: Vec<String>,
    /// Ids where the local version replaced the remote one.
    pub updated_from_local: Vec<String>,
    /// Ids where the remote version replaced the local one.
    pub updated_from_remote: Vec<String>,
    /// Pairings resolved by timestamp.
    pub auto_resolved: Vec<AutoResolvedConflict>,
    /// Pairings withheld from `merged` until resolved.
    pub true_conflicts: Vec<TrueConflict>,
}

/// Counts of a [`MergeResult`], for logs and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    /// Records in `merged`.
    pub merged: usize,
    /// Local-only additions.
    pub added_from_local: usize,
    /// Remote-only additions.
    pub added_from_remote: usize,
    /// Local versions that won.
    pub updated_from_local: usize,
    /// Remote versions that won.
    pub updated_from_remote: usize,
    /// Timestamp resolutions.
    pub auto_resolved: usize,
    /// Pending conflicts.
    pub true_conflicts: usize,
}

impl MergeResult {
    /// Returns the counts of each classification.
    pub fn summary(&self) -> MergeSummary {
        MergeSummary {
            merged: self.merged.len(),
            added_from_local: self.added_from_local.len(),
            added_from_remote: self.added_from_remote.len(),
            updated_from_local: self.updated_from_local.len(),
            updated_from_remote: self.updated_from_remote.len(),
            auto_resolved: self.auto_resolved.len(),
            true_conflicts: self.true_conflicts.len(),
        }
    }

    /// Returns true if either side receives something from the other.
    pub fn has_changes(&self) -> bool {
        !(self.added_from_local.is_empty()
            && self.added_from_remote.is_empty()
            && self.updated_from_local.is_empty()
            && self.updated_from_remote.is_empty()
            && self.true_conflicts.is_empty())
    }

    /// Returns true if true conflicts are still pending.
    pub fn has_conflicts(&self) -> bool {
        !self.true_conflicts.is_empty()
    }
}

/// Indexes records by id; a duplicate id keeps the newest `updated_at`
/// (later element on a tie).
fn index_by_id(records: &[Record]) -> BTreeMap<&str, &Record> {
    let mut index: BTreeMap<&str, &Record> = BTreeMap::new();
    for record in records {
        match index.get(record.id.as_str()) {
            Some(existing) if existing.updated_at > record.updated_at => {}
            _ => {
                index.insert(record.id.as_str(), record);
            }
        }
    }
    index
}

fn distance(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

/// Merges two record sets.
///
/// Pure and total: never fails, performs no I/O, and returns the same result
/// for the same inputs. See the module docs for the classification rules.
pub fn merge(local: &[Record], remote: &[Record], options: &MergeOptions) -> MergeResult {
    let local_index = index_by_id(local);
    let remote_index = index_by_id(remote);
    let ids: BTreeSet<&str> = local_index
        .keys()
        .chain(remote_index.keys())
        .copied()
        .collect();

    let mut result = MergeResult::default();

    for id in ids {
        match (local_index.get(id), remote_index.get(id)) {
            (Some(local), None) => {
                result.merged.push((*local).clone());
                result.added_from_local.push(id.to_string());
            }
            (None, Some(remote)) => {
                result.merged.push((*remote).clone());
                result.added_from_remote.push(id.to_string());
            }
            (Some(local), Some(remote)) => {
                merge_pair(local, remote, options, &mut result);
            }
            (None, None) => {}
        }
    }

    sort_newest_first(&mut result.merged);
    result
}

fn merge_pair(local: &Record, remote: &Record, options: &MergeOptions, result: &mut MergeResult) {
    if local.same_content(remote) {
        let keep = if remote.updated_at > local.updated_at {
            remote
        } else {
            local
        };
        result.merged.push(keep.clone());
        return;
    }

    let delta = distance(local.updated_at, remote.updated_at);
    if delta <= options.conflict_threshold {
        let reason = if delta == Duration::zero() {
            ConflictReason::EqualTimestamps
        } else {
            ConflictReason::WithinThreshold
        };
        result.true_conflicts.push(TrueConflict {
            expense_id: local.id.clone(),
            local: local.clone(),
            remote: remote.clone(),
            reason,
        });
        return;
    }

    let winner = if local.updated_at > remote.updated_at {
        result.updated_from_local.push(local.id.clone());
        result.merged.push(local.clone());
        Side::Local
    } else {
        result.updated_from_remote.push(remote.id.clone());
        result.merged.push(remote.clone());
        Side::Remote
    };

    result.auto_resolved.push(AutoResolvedConflict {
        expense_id: local.id.clone(),
        local: local.clone(),
        remote: remote.clone(),
        winner,
        reason: ConflictReason::NewerTimestamp,
    });
}

/// Moves resolved true conflicts into `merged`.
///
/// Each conflict whose id appears in `resolutions` is merged using the
/// chosen side; the rest stay pending. Resolutions for ids that are not
/// pending conflicts are ignored.
pub fn apply_conflict_resolutions(mut result: MergeResult, resolutions: &Resolutions) -> MergeResult {
    let pending = std::mem::take(&mut result.true_conflicts);

    for conflict in pending {
        match resolutions.get(&conflict.expense_id) {
            Some(&side) => {
                match side {
                    Side::Local => result.updated_from_local.push(conflict.expense_id.clone()),
                    Side::Remote => result.updated_from_remote.push(conflict.expense_id.clone()),
                }
                result.merged.push(conflict.version(side).clone());
            }
            None => result.true_conflicts.push(conflict),
        }
    }

    sort_newest_first(&mut result.merged);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal::Decimal;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn record(id: &str, amount: i64, updated_ms: i64) -> Record {
        let mut r = Record::new(
            id,
            Decimal::new(amount, 0),
            "Food",
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            t(0),
        );
        r.updated_at = t(updated_ms);
        r
    }

    #[test]
    fn newer_remote_wins_outside_threshold() {
        let local = vec![record("1", 100, 0)];
        let remote = vec![record("1", 150, 2000)];

        let result = merge(&local, &remote, &MergeOptions::default());

        assert_eq!(result.merged.len(), 1);
        assert_eq!(result.merged[0].amount, Decimal::new(150, 0));
        assert_eq!(result.auto_resolved.len(), 1);
        assert_eq!(result.auto_resolved[0].reason, ConflictReason::NewerTimestamp);
        assert_eq!(result.auto_resolved[0].winner, Side::Remote);
        assert_eq!(result.updated_from_remote, vec!["1"]);
        assert!(result.true_conflicts.is_empty());
    }

    #[test]
    fn newer_local_wins_outside_threshold() {
        let local = vec![record("1", 100, 5000)];
        let remote = vec![record("1", 150, 0)];

        let result = merge(&local, &remote, &MergeOptions::default());

        assert_eq!(result.merged[0].amount, Decimal::new(100, 0));
        assert_eq!(result.updated_from_local, vec!["1"]);
        assert_eq!(result.auto_resolved[0].winner, Side::Local);
    }

    #[test]
    fn equal_timestamps_are_a_true_conflict() {
        let local = vec![record("1", 100, 0)];
        let remote = vec![record("1", 150, 0)];

        let result = merge(&local, &remote, &MergeOptions::default());

        assert!(result.merged.is_empty());
        assert_eq!(result.true_conflicts.len(), 1);
        let conflict = &result.true_conflicts[0];
        assert_eq!(conflict.reason, ConflictReason::EqualTimestamps);
        assert_eq!(conflict.local.amount, Decimal::new(100, 0));
        assert_eq!(conflict.remote.amount, Decimal::new(150, 0));
    }

    #[test]
    fn near_timestamps_are_within_threshold() {
        let local = vec![record("1", 100, 0)];
        let remote = vec![record("1", 150, 1000)];

        let result = merge(&local, &remote, &MergeOptions::default());
        assert_eq!(result.true_conflicts[0].reason, ConflictReason::WithinThreshold);

        let result = merge(&local, &remote, &MergeOptions::with_threshold_ms(999));
        assert!(result.true_conflicts.is_empty());
        assert_eq!(result.auto_resolved.len(), 1);
    }

    #[test]
    fn identical_content_keeps_newer_without_classification() {
        let local = vec![record("1", 100, 0)];
        let remote = vec![record("1", 100, 50)];

        let result = merge(&local, &remote, &MergeOptions::default());

        assert_eq!(result.merged.len(), 1);
        assert_eq!(result.merged[0].updated_at, t(50));
        assert!(!result.has_changes());
        assert_eq!(result.summary().auto_resolved, 0);
    }

    #[test]
    fn identical_content_tie_keeps_local() {
        let local = vec![record("1", 100, 0).with_note("local")];
        let mut remote_version = record("1", 100, 0).with_note("local");
        remote_version.created_at = t(-10);
        let result = merge(&local, &[remote_version], &MergeOptions::default());

        assert_eq!(result.merged[0].created_at, t(0));
    }

    #[test]
    fn one_sided_records_are_added() {
        let local = vec![record("a", 1, 0)];
        let remote = vec![record("b", 2, 0)];

        let result = merge(&local, &remote, &MergeOptions::default());

        assert_eq!(result.merged.len(), 2);
        assert_eq!(result.added_from_local, vec!["a"]);
        assert_eq!(result.added_from_remote, vec!["b"]);
    }

    #[test]
    fn soft_delete_propagates_when_newer() {
        let local = vec![record("1", 100, 0)];
        let mut deleted = record("1", 100, 0);
        deleted.soft_delete(t(10_000));

        let result = merge(&local, &[deleted.clone()], &MergeOptions::default());

        assert_eq!(result.merged[0].deleted_at, deleted.deleted_at);
        assert_eq!(result.updated_from_remote, vec!["1"]);
    }

    #[test]
    fn resolutions_move_conflicts_into_merged() {
        let local = vec![record("1", 100, 0), record("2", 5, 0)];
        let remote = vec![record("1", 150, 0), record("2", 6, 0)];
        let result = merge(&local, &remote, &MergeOptions::default());
        assert_eq!(result.true_conflicts.len(), 2);

        let mut resolutions = Resolutions::new();
        resolutions.insert("1".into(), Side::Remote);
        resolutions.insert("unknown".into(), Side::Local);

        let resolved = apply_conflict_resolutions(result, &resolutions);

        assert_eq!(resolved.merged.len(), 1);
        assert_eq!(resolved.merged[0].amount, Decimal::new(150, 0));
        assert_eq!(resolved.true_conflicts.len(), 1);
        assert_eq!(resolved.true_conflicts[0].expense_id, "2");
        assert_eq!(resolved.updated_from_remote, vec!["1"]);
    }

    #[test]
    fn duplicate_ids_within_one_side_collapse() {
        let local = vec![record("1", 100, 0), record("1", 120, 10)];
        let result = merge(&local, &[], &MergeOptions::default());

        assert_eq!(result.merged.len(), 1);
        assert_eq!(result.merged[0].amount, Decimal::new(120, 0));
    }

    #[test]
    fn reasons_serialize_in_snake_case() {
        let json = serde_json::to_string(&ConflictReason::WithinThreshold).unwrap();
        assert_eq!(json, "\"within_threshold\"");
        let side: Side = serde_json::from_str("\"remote\"").unwrap();
        assert_eq!(side, Side::Remote);
    }
}
