//! Add command implementation.

use crate::local::LocalLedger;
use chrono::{NaiveDate, Utc};
use clap::Args;
use ledgersync_protocol::{PaymentMethod, Record, SyncOpInput};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::info;

/// Arguments of `add`.
#[derive(Debug, Args)]
pub struct AddArgs {
    /// Amount, negative for money going out
    #[arg(allow_hyphen_values = true)]
    pub amount: Decimal,

    /// Category label
    #[arg(short, long, default_value = "Other")]
    pub category: String,

    /// Day of the expense (yyyy-mm-dd), today if omitted
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Free-text note
    #[arg(short, long, default_value = "")]
    pub note: String,

    /// Currency code, the settings currency if omitted
    #[arg(long)]
    pub currency: Option<String>,

    /// Payment method kind (card, cash, transfer, ...)
    #[arg(long)]
    pub payment: Option<String>,

    /// Explicit id, a random UUID if omitted
    #[arg(long)]
    pub id: Option<String>,
}

/// Builds the record described by `args`.
pub fn build_record(args: AddArgs, default_currency: &str) -> Record {
    let now = Utc::now();
    let id = args
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let date = args.date.unwrap_or_else(|| now.date_naive());

    let mut record = Record::new(id, args.amount, args.category, date, now)
        .with_currency(args.currency.unwrap_or_else(|| default_currency.to_string()))
        .with_note(args.note);
    if let Some(kind) = args.payment {
        record = record.with_payment_method(PaymentMethod::new(kind));
    }
    record
}

/// Runs the add command.
pub fn run(data: &Path, args: AddArgs) -> Result<(), Box<dyn std::error::Error>> {
    info!("Adding expense to {:?}", data);

    let ledger = LocalLedger::open(data)?;
    let currency = ledger
        .settings()?
        .map(|s| s.currency)
        .unwrap_or_else(|| ledgersync_protocol::FALLBACK_CURRENCY.to_string());

    let record = build_record(args, &currency);
    if ledger.records()?.iter().any(|r| r.id == record.id) {
        return Err(format!("An expense with id {} already exists", record.id).into());
    }

    let queue = ledger.queue()?;
    ledger.upsert(record.clone())?;
    let op = queue.enqueue(SyncOpInput::upsert(record.clone()))?;

    println!("✓ Added {}", record.id);
    println!("  Amount: {} {}", record.amount, record.currency);
    println!("  Category: {}", record.category);
    println!("  Date: {}", record.date);
    println!("  Queued as op #{}", op.id);

    Ok(())
}
