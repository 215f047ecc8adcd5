//! Delete command implementation.

use crate::local::LocalLedger;
use chrono::Utc;
use ledgersync_protocol::SyncOpInput;
use std::path::Path;
use tracing::info;

/// Runs the delete command.
///
/// The record stays in the ledger with `deletedAt` set, so the deletion
/// merges like any other edit.
pub fn run(data: &Path, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("Deleting expense {} from {:?}", id, data);

    let ledger = LocalLedger::open(data)?;
    let mut record = ledger
        .records()?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| format!("No expense with id {id}"))?;

    if record.is_deleted() {
        println!("Expense {id} is already deleted");
        return Ok(());
    }

    let queue = ledger.queue()?;
    record.soft_delete(Utc::now());
    ledger.upsert(record.clone())?;
    let op = queue.enqueue(SyncOpInput::upsert(record))?;

    println!("✓ Deleted {id}");
    println!("  Queued as op #{}", op.id);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::add::{self, AddArgs};
    use rust_decimal::Decimal;

    #[test]
    fn delete_marks_and_queues() {
        let dir = tempfile::tempdir().unwrap();
        add::run(
            dir.path(),
            AddArgs {
                amount: Decimal::ONE,
                category: "Food".into(),
                date: None,
                note: String::new(),
                currency: None,
                payment: None,
                id: Some("gone".into()),
            },
        )
        .unwrap();

        run(dir.path(), "gone").unwrap();

        let ledger = LocalLedger::open(dir.path()).unwrap();
        assert!(ledger.records().unwrap()[0].is_deleted());
        assert_eq!(ledger.queue().unwrap().watermark().unwrap(), 2);
        assert!(run(dir.path(), "missing").is_err());
    }
}
