//! Ledger records.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Currency assumed for records persisted before currency tracking existed.
pub const FALLBACK_CURRENCY: &str = "USD";

pub(crate) fn default_currency() -> String {
    FALLBACK_CURRENCY.to_string()
}

/// How a record was paid for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    /// Method type (`cash`, `card`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Method-specific identifier (e.g. last card digits).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Reference to a stored payment instrument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,
}

impl PaymentMethod {
    /// Creates a payment method of the given type.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            identifier: None,
            instrument_id: None,
        }
    }

    /// Sets the identifier.
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Sets the instrument reference.
    #[must_use]
    pub fn with_instrument(mut self, instrument_id: impl Into<String>) -> Self {
        self.instrument_id = Some(instrument_id.into());
        self
    }
}

/// A ledger entry.
///
/// # Invariants
///
/// - `id` is unique within a replica and never changes
/// - `updated_at` moves to "now" on every mutation, soft delete included
/// - records are never physically removed; `deleted_at` marks deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique record ID.
    pub id: String,
    /// Amount in `currency`.
    pub amount: Decimal,
    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Category label.
    pub category: String,
    /// Calendar day the expense belongs to.
    pub date: NaiveDate,
    /// Free-text note.
    #[serde(default)]
    pub note: String,
    /// Optional payment method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete time; `None` while the record is live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Creates a live record in the fallback currency with an empty note.
    pub fn new(
        id: impl Into<String>,
        amount: Decimal,
        category: impl Into<String>,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            amount,
            currency: default_currency(),
            category: category.into(),
            date,
            note: String::new(),
            payment_method: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Sets the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Sets the note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Sets the payment method.
    #[must_use]
    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    /// Returns true if the record is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Stamps a mutation.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Marks the record deleted. Deletion is itself a mutation.
    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    /// Compares user-visible content, ignoring `created_at`/`updated_at`.
    ///
    /// Deletion state counts as content; the exact deletion time does not.
    pub fn same_content(&self, other: &Record) -> bool {
        fn payment(r: &Record) -> Option<(&str, Option<&str>, Option<&str>)> {
            r.payment_method
                .as_ref()
                .map(|p| (p.kind.as_str(), p.identifier.as_deref(), p.instrument_id.as_deref()))
        }

        self.amount == other.amount
            && self.currency == other.currency
            && self.category == other.category
            && self.date == other.date
            && self.note == other.note
            && payment(self) == payment(other)
            && self.is_deleted() == other.is_deleted()
    }
}

fn newest_first(a: &Record, b: &Record) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts records newest `created_at` first; equal times order by id.
pub fn sort_newest_first(records: &mut [Record]) {
    records.sort_by(newest_first);
}
