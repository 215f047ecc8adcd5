//! Days command implementation.

use crate::local::LocalLedger;
use ledgersync_protocol::{filename_for_day, group_by_day, DayKey, Record};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// One day unit of the local ledger.
#[derive(Debug, Serialize, PartialEq)]
pub struct DayInfo {
    /// The day.
    pub day: DayKey,
    /// Transfer unit file name.
    pub file: String,
    /// Records in the unit.
    pub records: usize,
    /// Soft-deleted records among them.
    pub deleted: usize,
}

/// Summarizes `records` per day, ascending.
pub fn summarize(records: &[Record]) -> Vec<DayInfo> {
    group_by_day(records)
        .into_iter()
        .map(|(day, bucket)| DayInfo {
            day,
            file: filename_for_day(day),
            records: bucket.len(),
            deleted: bucket.iter().filter(|r| r.is_deleted()).count(),
        })
        .collect()
}

/// Runs the days command.
pub fn run(data: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("Listing day units of {:?}", data);

    let ledger = LocalLedger::open(data)?;
    let days = summarize(&ledger.records()?);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&days)?);
        }
        _ => {
            if days.is_empty() {
                println!("No expenses recorded");
            }
            for info in &days {
                println!(
                    "{}  {:>4} record(s)  {:>3} deleted",
                    info.file, info.records, info.deleted
                );
            }
        }
    }

    Ok(())
}
