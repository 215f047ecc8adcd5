//! CSV codec for per-day transfer units.
//!
//! Column order is stable and matches [`TRANSFER_COLUMNS`]. Decoding looks
//! columns up by header name so files written before a column existed still
//! load: a missing or empty `currency` falls back to [`FALLBACK_CURRENCY`],
//! an empty `paymentMethodType` means no payment method, an empty
//! `deletedAt` means live, and an empty `updatedAt` falls back to
//! `createdAt`.

use crate::error::{ProtocolError, ProtocolResult};
use crate::record::{PaymentMethod, Record, FALLBACK_CURRENCY};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Header of every transfer unit, in write order.
pub const TRANSFER_COLUMNS: [&str; 12] = [
    "id",
    "amount",
    "currency",
    "category",
    "date",
    "note",
    "paymentMethodType",
    "paymentMethodId",
    "paymentInstrumentId",
    "createdAt",
    "updatedAt",
    "deletedAt",
];

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Encodes records as one transfer unit.
pub fn encode_day(records: &[Record]) -> ProtocolResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TRANSFER_COLUMNS)?;

    for record in records {
        let payment = record.payment_method.as_ref();
        let row = [
            record.id.clone(),
            record.amount.to_string(),
            record.currency.clone(),
            record.category.clone(),
            record.date.format("%Y-%m-%d").to_string(),
            record.note.clone(),
            payment.map(|p| p.kind.clone()).unwrap_or_default(),
            payment.and_then(|p| p.identifier.clone()).unwrap_or_default(),
            payment.and_then(|p| p.instrument_id.clone()).unwrap_or_default(),
            timestamp(&record.created_at),
            timestamp(&record.updated_at),
            record.deleted_at.as_ref().map(timestamp).unwrap_or_default(),
        ];
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| ProtocolError::Encoding(e.to_string()))
}

struct Columns {
    index: [Option<usize>; 12],
}

impl Columns {
    fn from_header(header: &csv::StringRecord) -> ProtocolResult<Self> {
        let mut index = [None; 12];
        for (slot, name) in index.iter_mut().zip(TRANSFER_COLUMNS) {
            *slot = header.iter().position(|h| h.trim() == name);
        }

        for required in ["id", "amount", "category", "date", "createdAt"] {
            let pos = TRANSFER_COLUMNS.iter().position(|c| *c == required);
            if pos.and_then(|p| index[p]).is_none() {
                return Err(ProtocolError::MissingColumn(required));
            }
        }

        Ok(Self { index })
    }

    fn get<'r>(&self, row: &'r csv::StringRecord, column: &str) -> &'r str {
        TRANSFER_COLUMNS
            .iter()
            .position(|c| *c == column)
            .and_then(|p| self.index[p])
            .and_then(|i| row.get(i))
            .map(str::trim)
            .unwrap_or("")
    }
}

fn parse_time(row: usize, column: &'static str, value: &str) -> ProtocolResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ProtocolError::invalid_field(row, column, e.to_string()))
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Decodes one transfer unit.
///
/// # Errors
///
/// Fails on a missing required column, an empty id, or a value that does
/// not parse; the error names the row and column.
pub fn decode_day(data: &[u8]) -> ProtocolResult<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let columns = Columns::from_header(reader.headers()?)?;
    let mut records = Vec::new();

    for (i, row) in reader.records().enumerate() {
        let row = row?;
        let n = i + 1;
        let field = |column: &str| columns.get(&row, column);

        let id = field("id");
        if id.is_empty() {
            return Err(ProtocolError::invalid_field(n, "id", "empty id"));
        }

        let amount = Decimal::from_str(field("amount"))
            .map_err(|e| ProtocolError::invalid_field(n, "amount", e.to_string()))?;
        let date = NaiveDate::parse_from_str(field("date"), "%Y-%m-%d")
            .map_err(|e| ProtocolError::invalid_field(n, "date", e.to_string()))?;
        let created_at = parse_time(n, "createdAt", field("createdAt"))?;
        let updated_at = match field("updatedAt") {
            "" => created_at,
            value => parse_time(n, "updatedAt", value)?,
        };
        let deleted_at = match field("deletedAt") {
            "" => None,
            value => Some(parse_time(n, "deletedAt", value)?),
        };

        let payment_method = optional(field("paymentMethodType")).map(|kind| PaymentMethod {
            kind,
            identifier: optional(field("paymentMethodId")),
            instrument_id: optional(field("paymentInstrumentId")),
        });

        let currency = match field("currency") {
            "" => FALLBACK_CURRENCY.to_string(),
            value => value.to_string(),
        };

        records.push(Record {
            id: id.to_string(),
            amount,
            currency,
            category: field("category").to_string(),
            date,
            note: field("note").to_string(),
            payment_method,
            created_at,
            updated_at,
            deleted_at,
        });
    }

    Ok(records)
}
