//! Sync queue state.

use crate::error::{ProtocolResult, QueueDecodeError};
use crate::operation::{SyncOpInput, SyncQueueOp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version of the persisted queue document.
pub const SYNC_QUEUE_VERSION: u32 = 1;

/// The persisted queue document: `{version, nextId, ops}`.
///
/// # Invariants
///
/// - `ops` are in ascending id order
/// - every op id is below `next_id`
/// - `next_id - 1` is the watermark (the last id ever assigned)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueState {
    /// Schema version.
    pub version: u32,
    /// Id the next enqueued op receives.
    pub next_id: u64,
    /// Pending operations.
    pub ops: Vec<SyncQueueOp>,
}

impl SyncQueueState {
    /// Creates an empty queue.
    pub fn empty() -> Self {
        Self {
            version: SYNC_QUEUE_VERSION,
            next_id: 1,
            ops: Vec::new(),
        }
    }

    /// Appends an operation, assigning the next id.
    ///
    /// `now` stamps inputs that carry no timestamp.
    pub fn enqueue(&mut self, input: SyncOpInput, now: DateTime<Utc>) -> SyncQueueOp {
        let op = SyncQueueOp {
            id: self.next_id,
            timestamp: input.timestamp.unwrap_or(now),
            payload: input.payload,
        };
        self.next_id = self.next_id.saturating_add(1);
        self.ops.push(op.clone());
        op
    }

    /// Returns the last assigned id (0 if none was ever assigned).
    pub fn watermark(&self) -> u64 {
        self.next_id.saturating_sub(1)
    }

    /// Returns ops with `id > watermark`, ascending.
    pub fn ops_since(&self, watermark: u64) -> Vec<SyncQueueOp> {
        self.ops
            .iter()
            .filter(|op| op.id > watermark)
            .cloned()
            .collect()
    }

    /// Removes ops with `id <= watermark`. Returns how many were removed.
    ///
    /// `next_id` is untouched, so ids are never reused.
    pub fn clear_up_to(&mut self, watermark: u64) -> usize {
        let before = self.ops.len();
        self.ops.retain(|op| op.id > watermark);
        before - self.ops.len()
    }

    /// Returns the number of pending ops.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if no ops are pending.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Encodes the document as JSON.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a persisted document.
    ///
    /// Out-of-order ops are sorted and a `next_id` that does not exceed the
    /// largest op id is raised past it, so a hand-edited document cannot make
    /// the queue reuse ids. Ids with no successor left in `u64` are malformed.
    pub fn from_json(bytes: &[u8]) -> Result<Self, QueueDecodeError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| QueueDecodeError::Malformed(e.to_string()))?;

        let found = value.get("version").and_then(serde_json::Value::as_u64);
        if found != Some(u64::from(SYNC_QUEUE_VERSION)) {
            return Err(QueueDecodeError::VersionMismatch {
                found,
                expected: SYNC_QUEUE_VERSION,
            });
        }

        let mut state: Self = serde_json::from_value(value)
            .map_err(|e| QueueDecodeError::Malformed(e.to_string()))?;

        state.ops.sort_by_key(|op| op.id);
        let max_id = state.ops.last().map_or(0, |op| op.id);
        let after_max = max_id
            .checked_add(1)
            .ok_or_else(|| QueueDecodeError::Malformed(format!("op id {max_id} out of range")))?;
        state.next_id = state.next_id.max(after_max).max(1);
        if state.next_id == u64::MAX {
            return Err(QueueDecodeError::Malformed("nextId out of range".into()));
        }
        Ok(state)
    }
}

impl Default for SyncQueueState {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OpPayload;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn delete(label: &str) -> SyncOpInput {
        SyncOpInput::new(OpPayload::CategoryDelete {
            label: label.into(),
        })
    }

    #[test]
    fn enqueue_assigns_increasing_ids() {
        let mut state = SyncQueueState::empty();

        let a = state.enqueue(delete("a"), now());
        let b = state.enqueue(delete("b"), now());
        let c = state.enqueue(delete("c"), now());

        assert_eq!((a.id, b.id, c.id), (1, 2, 3));
        assert_eq!(state.watermark(), 3);
    }

    #[test]
    fn enqueue_keeps_explicit_timestamp() {
        let mut state = SyncQueueState::empty();
        let earlier = Utc.timestamp_opt(1_600_000_000, 0).unwrap();

        let op = state.enqueue(delete("a").at(earlier), now());
        assert_eq!(op.timestamp, earlier);

        let op = state.enqueue(delete("b"), now());
        assert_eq!(op.timestamp, now());
    }

    #[test]
    fn clear_up_to_removes_acknowledged_and_keeps_ids() {
        let mut state = SyncQueueState::empty();
        for label in ["a", "b", "c"] {
            state.enqueue(delete(label), now());
        }

        assert_eq!(state.clear_up_to(2), 2);
        assert_eq!(state.ops_since(0).len(), 1);
        assert_eq!(state.ops_since(0)[0].id, 3);

        let next = state.enqueue(delete("d"), now());
        assert_eq!(next.id, 4);
    }

    #[test]
    fn ops_since_filters_by_watermark() {
        let mut state = SyncQueueState::empty();
        for label in ["a", "b", "c"] {
            state.enqueue(delete(label), now());
        }

        let ids: Vec<_> = state.ops_since(1).iter().map(|op| op.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(state.ops_since(3).is_empty());
    }

    #[test]
    fn json_round_trip_uses_camel_case() {
        let mut state = SyncQueueState::empty();
        state.enqueue(delete("a"), now());

        let bytes = state.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["nextId"], 2);
        assert_eq!(value["version"], SYNC_QUEUE_VERSION);

        assert_eq!(SyncQueueState::from_json(&bytes).unwrap(), state);
    }

    #[test]
    fn from_json_rejects_other_versions() {
        let result = SyncQueueState::from_json(br#"{"version":99,"nextId":1,"ops":[]}"#);
        assert!(matches!(
            result,
            Err(QueueDecodeError::VersionMismatch {
                found: Some(99),
                ..
            })
        ));

        let result = SyncQueueState::from_json(br#"{"nextId":1,"ops":[]}"#);
        assert!(matches!(
            result,
            Err(QueueDecodeError::VersionMismatch { found: None, .. })
        ));
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(matches!(
            SyncQueueState::from_json(b"{not json"),
            Err(QueueDecodeError::Malformed(_))
        ));
        assert!(matches!(
            SyncQueueState::from_json(br#"{"version":1,"nextId":"x","ops":[]}"#),
            Err(QueueDecodeError::Malformed(_))
        ));
    }

    #[test]
    fn from_json_repairs_stale_next_id() {
        let json = br#"{"version":1,"nextId":1,"ops":[
            {"id":5,"timestamp":"2024-01-01T00:00:00Z","type":"category.delete","payload":{"label":"a"}}
        ]}"#;
        let state = SyncQueueState::from_json(json).unwrap();
        assert_eq!(state.next_id, 6);
        assert_eq!(state.watermark(), 5);
    }

    #[test]
    fn from_json_rejects_ids_without_successor() {
        let max_op = format!(
            r#"{{"version":1,"nextId":1,"ops":[
                {{"id":{},"timestamp":"2024-01-01T00:00:00Z","type":"category.delete","payload":{{"label":"a"}}}}
            ]}}"#,
            u64::MAX
        );
        assert!(matches!(
            SyncQueueState::from_json(max_op.as_bytes()),
            Err(QueueDecodeError::Malformed(_))
        ));

        let max_next = format!(r#"{{"version":1,"nextId":{},"ops":[]}}"#, u64::MAX);
        assert!(matches!(
            SyncQueueState::from_json(max_next.as_bytes()),
            Err(QueueDecodeError::Malformed(_))
        ));
    }
}
