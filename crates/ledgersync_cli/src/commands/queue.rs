//! Queue inspection commands.

use crate::local::LocalLedger;
use ledgersync_protocol::{OpPayload, SyncQueueOp};
use std::path::Path;
use tracing::info;

/// One-line description of an op's payload.
pub fn describe(op: &SyncQueueOp) -> String {
    match &op.payload {
        OpPayload::ExpenseUpsert { expense } => {
            let verb = if expense.is_deleted() { "delete" } else { "save" };
            format!("{verb} {} ({} {})", expense.id, expense.amount, expense.currency)
        }
        OpPayload::ExpenseUpsertBatch { expenses } => format!("save {} expenses", expenses.len()),
        OpPayload::SettingsPatch { patch } => {
            let keys: Vec<&str> = patch.keys().map(String::as_str).collect();
            format!("patch settings [{}]", keys.join(", "))
        }
        OpPayload::CategoryAdd { category } => format!("add category {}", category.label),
        OpPayload::CategoryUpdate { label, .. } => format!("update category {label}"),
        OpPayload::CategoryDelete { label } => format!("delete category {label}"),
        OpPayload::CategoryReorder { labels } => format!("reorder {} categories", labels.len()),
    }
}

/// Runs `queue show`.
pub fn show(data: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("Reading sync queue in {:?}", data);

    let ledger = LocalLedger::open(data)?;
    let state = ledger.queue()?.state()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        _ => {
            println!("Watermark: {}", state.watermark());
            println!("Pending:   {}", state.len());
            for op in &state.ops {
                println!(
                    "  #{:<5} {}  {:<22} {}",
                    op.id,
                    op.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    op.payload.kind(),
                    describe(op)
                );
            }
        }
    }

    Ok(())
}

/// Runs `queue clear`.
pub fn clear(data: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Clearing sync queue in {:?}", data);

    let ledger = LocalLedger::open(data)?;
    let queue = ledger.queue()?;
    let removed = queue.clear_up_to(queue.watermark()?)?;

    println!("✓ Cleared {removed} operation(s)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_protocol::Category;

    #[test]
    fn describe_names_the_target() {
        let op = SyncQueueOp {
            id: 3,
            timestamp: chrono::Utc::now(),
            payload: OpPayload::CategoryAdd {
                category: Category::new("Travel"),
            },
        };
        assert_eq!(describe(&op), "add category Travel");
    }

    #[test]
    fn clear_empties_queue() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = LocalLedger::open(dir.path()).unwrap();
            let queue = ledger.queue().unwrap();
            queue
                .enqueue(ledgersync_protocol::SyncOpInput::new(OpPayload::CategoryDelete {
                    label: "Food".into(),
                }))
                .unwrap();
        }

        clear(dir.path()).unwrap();

        let ledger = LocalLedger::open(dir.path()).unwrap();
        let state = ledger.queue().unwrap().state().unwrap();
        assert!(state.is_empty());
        assert_eq!(state.watermark(), 1);
    }
}
