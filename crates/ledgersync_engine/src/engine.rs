//! Unified fetch → merge → push operation.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::queue::SyncQueue;
use crate::transport::RemoteStore;
use ledgersync_protocol::{
    apply_conflict_resolutions, apply_to_records, apply_to_settings, changed_days, group_by_day,
    merge, sort_newest_first, DayKey, MergeSummary, OpPayload, Record, Resolutions, Settings, Side,
    SyncQueueOp, TrueConflict,
};
use ledgersync_storage::StorageBackend;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Input of one sync attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncRequest {
    /// The full local record set, soft-deleted records included.
    pub local_records: Vec<Record>,
    /// Local settings, used as the baseline when the remote has none.
    pub settings: Option<Settings>,
    /// Choices for conflicts found by an earlier attempt.
    pub resolutions: Resolutions,
}

impl SyncRequest {
    /// Creates a request for the given local records.
    pub fn new(local_records: Vec<Record>) -> Self {
        Self {
            local_records,
            ..Self::default()
        }
    }

    /// Sets the local settings.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Sets the conflict resolutions.
    #[must_use]
    pub fn with_resolutions(mut self, resolutions: Resolutions) -> Self {
        self.resolutions = resolutions;
        self
    }
}

/// What a successful push did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// The converged record set; the caller persists it locally.
    pub records: Vec<Record>,
    /// The converged settings, when either side has any.
    pub settings: Option<Settings>,
    /// Day units rewritten on the remote.
    pub uploaded_days: Vec<DayKey>,
    /// Whether the settings document was rewritten.
    pub settings_uploaded: bool,
    /// Merge classification counts.
    pub summary: MergeSummary,
    /// Queued ops replayed onto the merged baseline.
    pub replayed_ops: usize,
    /// Queued upserts dropped because the merged version superseded them.
    pub superseded_ops: usize,
    /// Watermark the queue was cleared up to.
    pub cleared_up_to: u64,
}

/// Result of [`SyncEngine::sync`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// True conflicts need a per-id choice; nothing was written.
    Conflicts(Vec<TrueConflict>),
    /// Both replicas already agree; nothing was written.
    InSync,
    /// Changes were pushed.
    Synced(SyncReport),
}

/// Reconciles the local ledger with a remote store.
///
/// One call to [`sync`](Self::sync) is one attempt: fetch the authoritative
/// remote copy, merge it with the local records, replay queued mutations
/// and write back only the day units that changed. The queue is cleared up
/// to the watermark captured at the start, and only after every write
/// succeeded, so ops enqueued while the attempt runs are kept.
pub struct SyncEngine<R: RemoteStore, B: StorageBackend> {
    config: SyncConfig,
    remote: Arc<R>,
    queue: Arc<SyncQueue<B>>,
}

impl<R: RemoteStore, B: StorageBackend> SyncEngine<R, B> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, remote: Arc<R>, queue: Arc<SyncQueue<B>>) -> Self {
        Self {
            config,
            remote,
            queue,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Returns the sync queue.
    pub fn queue(&self) -> &Arc<SyncQueue<B>> {
        &self.queue
    }

    /// Runs one fetch → merge → push attempt.
    pub fn sync(&self, request: &SyncRequest) -> SyncResult<SyncOutcome> {
        let watermark = self.queue.watermark()?;

        let remote_records = self.remote.fetch_records().map_err(|e| {
            error!(component = "sync_engine", operation = "fetch", error = %e, "fetch failed");
            e
        })?;
        let remote_settings = self.remote.fetch_settings().map_err(|e| {
            error!(component = "sync_engine", operation = "fetch", error = %e, "settings fetch failed");
            e
        })?;
        info!(
            component = "sync_engine",
            operation = "fetch",
            remote = remote_records.len(),
            local = request.local_records.len(),
            watermark,
            "fetched remote ledger"
        );

        let merged = merge(
            &request.local_records,
            &remote_records,
            &self.config.merge_options(),
        );
        let merged = apply_conflict_resolutions(merged, &request.resolutions);
        let summary = merged.summary();
        debug!(component = "sync_engine", operation = "merge", ?summary, "merged");

        if merged.has_conflicts() {
            info!(
                component = "sync_engine",
                operation = "merge",
                conflicts = merged.true_conflicts.len(),
                "sync paused on conflicts"
            );
            return Ok(SyncOutcome::Conflicts(merged.true_conflicts));
        }

        let pending: Vec<SyncQueueOp> = self
            .queue
            .ops_since(0)?
            .into_iter()
            .filter(|op| op.id <= watermark)
            .collect();
        let (replayable, superseded) =
            drop_superseded(&pending, &merged.merged, &request.resolutions);

        let records = apply_to_records(&merged.merged, &replayable);
        let settings = remote_settings
            .as_ref()
            .or(request.settings.as_ref())
            .map(|baseline| apply_to_settings(baseline, &replayable));

        let days = changed_days(&remote_records, &records);
        let settings_changed = settings.is_some() && settings != remote_settings;

        if days.is_empty()
            && !settings_changed
            && same_records(&records, &request.local_records)
            && (request.settings.is_none() || settings == request.settings)
        {
            self.queue.clear_up_to(watermark)?;
            info!(component = "sync_engine", operation = "push", "already in sync");
            return Ok(SyncOutcome::InSync);
        }

        self.push(&records, &days, settings.as_ref().filter(|_| settings_changed))?;
        self.queue.clear_up_to(watermark)?;

        info!(
            component = "sync_engine",
            operation = "push",
            days = days.len(),
            settings = settings_changed,
            replayed = replayable.len(),
            "sync complete"
        );

        Ok(SyncOutcome::Synced(SyncReport {
            records,
            settings,
            uploaded_days: days,
            settings_uploaded: settings_changed,
            summary,
            replayed_ops: replayable.len(),
            superseded_ops: superseded,
            cleared_up_to: watermark,
        }))
    }

    /// Runs [`sync`](Self::sync), retrying transient failures with backoff.
    pub fn sync_with_retry(&self, request: &SyncRequest) -> SyncResult<SyncOutcome> {
        let retry_config = &self.config.retry;
        let mut last_error = None;

        for attempt in 0..retry_config.max_attempts {
            if attempt > 0 {
                let delay = retry_config.delay_for_attempt(attempt);
                debug!(component = "sync_engine", operation = "retry", attempt, ?delay, "retrying");
                std::thread::sleep(delay);
            }

            match self.sync(request) {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && attempt + 1 < retry_config.max_attempts => {
                    warn!(component = "sync_engine", operation = "retry", attempt, error = %e, "transient failure");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(SyncError::Timeout))
    }

    fn push(&self, records: &[Record], days: &[DayKey], settings: Option<&Settings>) -> SyncResult<()> {
        let mut buckets = group_by_day(records);
        for day in days {
            let bucket = buckets.remove(day).unwrap_or_default();
            self.remote.write_day(*day, &bucket).map_err(|e| {
                error!(component = "sync_engine", operation = "push", day = %day, error = %e, "day write failed");
                e
            })?;
        }

        if let Some(settings) = settings {
            self.remote.write_settings(settings).map_err(|e| {
                error!(component = "sync_engine", operation = "push", error = %e, "settings write failed");
                e
            })?;
        }
        Ok(())
    }
}

/// Filters queued upserts that the merged baseline already supersedes:
/// versions strictly older than the merged one, and ids the user resolved
/// to the remote side. Returns the ops to replay and how many record
/// versions were dropped.
fn drop_superseded(
    ops: &[SyncQueueOp],
    merged: &[Record],
    resolutions: &Resolutions,
) -> (Vec<SyncQueueOp>, usize) {
    let merged_by_id: BTreeMap<&str, &Record> = merged.iter().map(|r| (r.id.as_str(), r)).collect();
    let keep = |record: &Record| {
        if resolutions.get(&record.id) == Some(&Side::Remote) {
            return false;
        }
        merged_by_id
            .get(record.id.as_str())
            .map_or(true, |current| record.updated_at >= current.updated_at)
    };

    let mut dropped = 0;
    let mut replayable = Vec::with_capacity(ops.len());
    for op in ops {
        let payload = match &op.payload {
            OpPayload::ExpenseUpsert { expense } => {
                if !keep(expense) {
                    dropped += 1;
                    continue;
                }
                op.payload.clone()
            }
            OpPayload::ExpenseUpsertBatch { expenses } => {
                let kept: Vec<Record> = expenses.iter().filter(|r| keep(r)).cloned().collect();
                dropped += expenses.len() - kept.len();
                if kept.is_empty() {
                    continue;
                }
                OpPayload::ExpenseUpsertBatch { expenses: kept }
            }
            other => other.clone(),
        };
        replayable.push(SyncQueueOp {
            id: op.id,
            timestamp: op.timestamp,
            payload,
        });
    }
    (replayable, dropped)
}

fn same_records(a: &[Record], b: &[Record]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    sort_newest_first(&mut a);
    sort_newest_first(&mut b);
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::transport::MemoryRemote;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use ledgersync_protocol::{Category, SyncOpInput};
    use ledgersync_storage::InMemoryBackend;
    use rust_decimal::Decimal;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn record(id: &str, day: u32, amount: i64, updated_ms: i64) -> Record {
        let mut r = Record::new(
            id,
            Decimal::new(amount, 0),
            "Food",
            NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            t(0),
        );
        r.updated_at = t(updated_ms);
        r
    }

    fn engine(remote: MemoryRemote) -> SyncEngine<MemoryRemote, InMemoryBackend> {
        SyncEngine::new(
            SyncConfig::new().with_retry(RetryConfig::no_retry()),
            Arc::new(remote),
            Arc::new(SyncQueue::new(InMemoryBackend::new())),
        )
    }

    #[test]
    fn local_addition_uploads_only_its_day() {
        let remote = MemoryRemote::with_records(&[record("a", 1, 10, 0)]).unwrap();
        let engine = engine(remote);
        let local = vec![record("a", 1, 10, 0), record("b", 3, 5, 0)];

        let outcome = engine.sync(&SyncRequest::new(local)).unwrap();
        let SyncOutcome::Synced(report) = outcome else {
            panic!("expected a push, got {outcome:?}");
        };

        assert_eq!(report.uploaded_days.len(), 1);
        assert_eq!(report.uploaded_days[0].to_string(), "2024-02-03");
        assert_eq!(report.summary.added_from_local, 1);
        assert_eq!(report.records.len(), 2);
    }

    #[test]
    fn identical_sides_are_in_sync() {
        let records = vec![record("a", 1, 10, 0), record("b", 2, 20, 0)];
        let engine = engine(MemoryRemote::with_records(&records).unwrap());

        let outcome = engine.sync(&SyncRequest::new(records)).unwrap();
        assert_eq!(outcome, SyncOutcome::InSync);
        assert!(engine.remote().written_days().is_empty());
    }

    #[test]
    fn remote_only_change_is_not_in_sync() {
        let engine = engine(MemoryRemote::with_records(&[record("a", 1, 10, 0)]).unwrap());

        let outcome = engine.sync(&SyncRequest::new(Vec::new())).unwrap();
        let SyncOutcome::Synced(report) = outcome else {
            panic!("expected new data from remote, got {outcome:?}");
        };
        assert!(report.uploaded_days.is_empty());
        assert_eq!(report.records.len(), 1);
    }

    #[test]
    fn close_edits_stop_before_writing() {
        let engine = engine(MemoryRemote::with_records(&[record("a", 1, 10, 0)]).unwrap());
        engine
            .queue()
            .enqueue(SyncOpInput::upsert(record("a", 1, 99, 500)))
            .unwrap();

        let outcome = engine
            .sync(&SyncRequest::new(vec![record("a", 1, 99, 500)]))
            .unwrap();

        let SyncOutcome::Conflicts(conflicts) = outcome else {
            panic!("expected conflicts, got {outcome:?}");
        };
        assert_eq!(conflicts.len(), 1);
        assert!(engine.remote().written_days().is_empty());
        assert_eq!(engine.queue().state().unwrap().len(), 1);
    }

    #[test]
    fn resolving_to_remote_drops_queued_local_edit() {
        let engine = engine(MemoryRemote::with_records(&[record("a", 1, 10, 0)]).unwrap());
        engine
            .queue()
            .enqueue(SyncOpInput::upsert(record("a", 1, 99, 500)))
            .unwrap();

        let resolutions: Resolutions = [("a".to_string(), Side::Remote)].into_iter().collect();
        let request = SyncRequest::new(vec![record("a", 1, 99, 500)]).with_resolutions(resolutions);

        let SyncOutcome::Synced(report) = engine.sync(&request).unwrap() else {
            panic!("expected a push");
        };
        assert_eq!(report.records[0].amount, Decimal::new(10, 0));
        assert_eq!(report.superseded_ops, 1);
        assert!(report.uploaded_days.is_empty());
        assert!(engine.queue().state().unwrap().is_empty());
    }

    #[test]
    fn stale_queued_upsert_does_not_override_newer_remote() {
        let engine = engine(MemoryRemote::with_records(&[record("a", 1, 50, 9_000)]).unwrap());
        engine
            .queue()
            .enqueue(SyncOpInput::upsert(record("a", 1, 10, 0)))
            .unwrap();

        let SyncOutcome::Synced(report) = engine
            .sync(&SyncRequest::new(vec![record("a", 1, 10, 0)]))
            .unwrap()
        else {
            panic!("expected remote version to come down");
        };
        assert_eq!(report.records[0].amount, Decimal::new(50, 0));
        assert_eq!(report.superseded_ops, 1);
    }

    #[test]
    fn queued_settings_ops_are_pushed() {
        let engine = engine(MemoryRemote::new());
        engine
            .queue()
            .enqueue(
                SyncOpInput::new(OpPayload::CategoryAdd {
                    category: Category::new("Travel"),
                })
                .at(t(100)),
            )
            .unwrap();

        let request = SyncRequest::new(Vec::new()).with_settings(Settings::default());
        let SyncOutcome::Synced(report) = engine.sync(&request).unwrap() else {
            panic!("expected settings push");
        };

        assert!(report.settings_uploaded);
        let settings = engine.remote().fetch_settings().unwrap().unwrap();
        assert!(settings.category("travel").is_some());
        assert_eq!(settings.updated_at, Some(t(100)));
    }

    #[test]
    fn moving_a_record_rewrites_both_days() {
        let engine = engine(MemoryRemote::with_records(&[record("a", 1, 10, 0)]).unwrap());
        let mut moved = record("a", 4, 10, 5_000);
        moved.note = "moved".into();

        let SyncOutcome::Synced(report) = engine.sync(&SyncRequest::new(vec![moved])).unwrap() else {
            panic!("expected a push");
        };
        let days: Vec<String> = report.uploaded_days.iter().map(ToString::to_string).collect();
        assert_eq!(days, vec!["2024-02-01", "2024-02-04"]);
        assert_eq!(engine.remote().days().len(), 1);
    }

    #[test]
    fn retry_exhausts_attempts_on_transient_errors() {
        let engine = SyncEngine::new(
            SyncConfig::new().with_retry(RetryConfig::new(3).with_initial_delay(std::time::Duration::ZERO)),
            Arc::new(MemoryRemote::new()),
            Arc::new(SyncQueue::new(InMemoryBackend::new())),
        );
        engine.remote().set_connected(false);

        assert!(engine.sync_with_retry(&SyncRequest::default()).is_err());
        assert_eq!(engine.remote().fetch_count(), 3);
    }
}
