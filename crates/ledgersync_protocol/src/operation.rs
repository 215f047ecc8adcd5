//! Sync queue operations.

use crate::record::Record;
use crate::settings::{Category, CategoryPatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A local mutation waiting to be synchronized.
///
/// Serialized as `{"id", "timestamp", "type", "payload"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum OpPayload {
    /// Insert or replace one record.
    #[serde(rename = "expense.upsert")]
    ExpenseUpsert {
        /// The full record after the mutation.
        expense: Record,
    },
    /// Insert or replace several records.
    #[serde(rename = "expense.upsert_batch")]
    ExpenseUpsertBatch {
        /// Records after the mutation.
        expenses: Vec<Record>,
    },
    /// Shallow-merge fields into the settings document.
    #[serde(rename = "settings.patch")]
    SettingsPatch {
        /// Top-level settings fields to overwrite.
        patch: Map<String, Value>,
    },
    /// Append a category.
    #[serde(rename = "category.add")]
    CategoryAdd {
        /// The new category.
        category: Category,
    },
    /// Patch a category by label.
    #[serde(rename = "category.update")]
    CategoryUpdate {
        /// Current label.
        label: String,
        /// Fields to change.
        patch: CategoryPatch,
    },
    /// Remove a category by label.
    #[serde(rename = "category.delete")]
    CategoryDelete {
        /// Label to remove.
        label: String,
    },
    /// Reorder categories by label.
    #[serde(rename = "category.reorder")]
    CategoryReorder {
        /// Labels in their new order.
        labels: Vec<String>,
    },
}

impl OpPayload {
    /// Returns the wire name of the operation type.
    pub fn kind(&self) -> &'static str {
        match self {
            OpPayload::ExpenseUpsert { .. } => "expense.upsert",
            OpPayload::ExpenseUpsertBatch { .. } => "expense.upsert_batch",
            OpPayload::SettingsPatch { .. } => "settings.patch",
            OpPayload::CategoryAdd { .. } => "category.add",
            OpPayload::CategoryUpdate { .. } => "category.update",
            OpPayload::CategoryDelete { .. } => "category.delete",
            OpPayload::CategoryReorder { .. } => "category.reorder",
        }
    }

    /// Returns true for operations that touch records.
    pub fn is_record_op(&self) -> bool {
        matches!(
            self,
            OpPayload::ExpenseUpsert { .. } | OpPayload::ExpenseUpsertBatch { .. }
        )
    }

    /// Returns the records carried by a record operation.
    pub fn records(&self) -> &[Record] {
        match self {
            OpPayload::ExpenseUpsert { expense } => std::slice::from_ref(expense),
            OpPayload::ExpenseUpsertBatch { expenses } => expenses,
            _ => &[],
        }
    }
}

/// An operation in the sync queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueOp {
    /// Sequence number, strictly increasing across the queue's lifetime.
    pub id: u64,
    /// When the mutation happened.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    #[serde(flatten)]
    pub payload: OpPayload,
}

/// Input to enqueue: the payload plus an optional explicit timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOpInput {
    /// What happened.
    pub payload: OpPayload,
    /// When it happened; `None` means "now" at enqueue time.
    pub timestamp: Option<DateTime<Utc>>,
}

impl SyncOpInput {
    /// Creates an input stamped at enqueue time.
    pub fn new(payload: OpPayload) -> Self {
        Self {
            payload,
            timestamp: None,
        }
    }

    /// Sets an explicit timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Upserts one record, stamped with the record's `updated_at`.
    pub fn upsert(record: Record) -> Self {
        let timestamp = record.updated_at;
        Self::new(OpPayload::ExpenseUpsert { expense: record }).at(timestamp)
    }
}

impl From<OpPayload> for SyncOpInput {
    fn from(payload: OpPayload) -> Self {
        Self::new(payload)
    }
}
