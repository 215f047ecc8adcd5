//! Merge dry-run command implementation.

use crate::local::read_record_file;
use ledgersync_protocol::{merge, MergeOptions, MergeResult, DEFAULT_CONFLICT_THRESHOLD_MS};
use std::path::Path;
use tracing::info;

/// Runs the merge command. Nothing is written.
pub fn run(
    local: &Path,
    remote: &Path,
    threshold_ms: Option<i64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Merging {:?} with {:?}", local, remote);

    let local_records = read_record_file(local)?;
    let remote_records = read_record_file(remote)?;
    let options =
        MergeOptions::with_threshold_ms(threshold_ms.unwrap_or(DEFAULT_CONFLICT_THRESHOLD_MS));

    let result = merge(&local_records, &remote_records, &options);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &MergeResult) {
    let summary = result.summary();

    println!("Merge Result");
    println!("============");
    println!("Merged:              {}", summary.merged);
    println!("Added from local:    {}", summary.added_from_local);
    println!("Added from remote:   {}", summary.added_from_remote);
    println!("Updated from local:  {}", summary.updated_from_local);
    println!("Updated from remote: {}", summary.updated_from_remote);
    println!("Auto-resolved:       {}", summary.auto_resolved);
    println!("True conflicts:      {}", summary.true_conflicts);

    if !result.auto_resolved.is_empty() {
        println!();
        println!("Auto-resolved:");
        for resolved in &result.auto_resolved {
            println!("  {} -> {:?}", resolved.expense_id, resolved.winner);
        }
    }

    if !result.true_conflicts.is_empty() {
        println!();
        println!("Conflicts:");
        for conflict in &result.true_conflicts {
            println!(
                "  {} ({:?}): local {} {} @ {} | remote {} {} @ {}",
                conflict.expense_id,
                conflict.reason,
                conflict.local.amount,
                conflict.local.category,
                conflict.local.updated_at.to_rfc3339(),
                conflict.remote.amount,
                conflict.remote.category,
                conflict.remote.updated_at.to_rfc3339(),
            );
        }
    }

    if !result.has_changes() {
        println!();
        println!("✓ Both sides already agree");
    }
}
