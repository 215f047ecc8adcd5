//! Sync command implementation.

use crate::dir_remote::DirectoryRemote;
use crate::local::LocalLedger;
use ledgersync_engine::{
    RecordingObserver, SyncConfig, SyncEngine, SyncEvent, SyncNotice, SyncOrchestrator,
    SyncReport, SyncRequest, SyncState,
};
use ledgersync_protocol::{Record, Resolutions, Side, TrueConflict};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Runs the sync command.
///
/// Conflicts are resolved with `prefer` when given, otherwise by asking on
/// stdin. Ending input cancels the sync without writing anything.
pub fn run(
    data: &Path,
    remote: &Path,
    prefer: Option<Side>,
    threshold_ms: Option<i64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Syncing {:?} with {:?}", data, remote);

    let ledger = LocalLedger::open(data)?;
    let queue = Arc::new(ledger.queue()?);

    let mut config = SyncConfig::new();
    if let Some(ms) = threshold_ms {
        config = config.with_conflict_threshold_ms(ms);
    }
    let engine = SyncEngine::new(config, Arc::new(DirectoryRemote::new(remote)), queue);

    let observer = Arc::new(RecordingObserver::new());
    let mut orchestrator = SyncOrchestrator::new(Arc::new(engine));
    orchestrator.subscribe(observer.clone());

    let mut request = SyncRequest::new(ledger.records()?);
    if let Some(settings) = ledger.settings()? {
        request = request.with_settings(settings);
    }

    let mut state = orchestrator.send(SyncEvent::Sync(request));
    if state == SyncState::Conflict {
        let conflicts = orchestrator.context().conflicts.clone();
        let resolutions = match prefer {
            Some(side) => Some(resolve_all(&conflicts, side)),
            None => ask(&conflicts, &mut io::stdin().lock(), &mut io::stdout())?,
        };
        state = match resolutions {
            Some(resolutions) => orchestrator.send(SyncEvent::ResolveConflicts(resolutions)),
            None => orchestrator.send(SyncEvent::Cancel),
        };
    }

    for notice in observer.take() {
        match notice {
            SyncNotice::Success(report) => {
                ledger.save_records(&report.records)?;
                if let Some(settings) = &report.settings {
                    ledger.save_settings(settings)?;
                }
                print_report(&report, format)?;
            }
            SyncNotice::InSync => println!("✓ Already in sync"),
            SyncNotice::Conflict(conflicts) => {
                println!("! {} conflict(s) needed a decision", conflicts.len());
            }
            SyncNotice::Error(message) => return Err(message.into()),
        }
    }

    if state == SyncState::Idle {
        println!("Sync cancelled; nothing was written");
    }

    Ok(())
}

/// Resolves every conflict to `side`.
pub fn resolve_all(conflicts: &[TrueConflict], side: Side) -> Resolutions {
    conflicts
        .iter()
        .map(|c| (c.expense_id.clone(), side))
        .collect()
}

fn describe(record: &Record) -> String {
    let mut text = format!(
        "{} {} | {} | {}",
        record.amount, record.currency, record.category, record.date
    );
    if !record.note.is_empty() {
        text.push_str(&format!(" | {}", record.note));
    }
    if record.is_deleted() {
        text.push_str(" | deleted");
    }
    text
}

/// Asks for a side per conflict. Returns `None` when the user cancels or
/// input ends.
pub fn ask(
    conflicts: &[TrueConflict],
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> io::Result<Option<Resolutions>> {
    let mut resolutions = Resolutions::new();

    for conflict in conflicts {
        writeln!(output, "Conflict on {}:", conflict.expense_id)?;
        writeln!(output, "  [l] local:  {}", describe(&conflict.local))?;
        writeln!(output, "  [r] remote: {}", describe(&conflict.remote))?;

        let side = loop {
            write!(output, "Keep [l]ocal, [r]emote, or [c]ancel? ")?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "l" | "local" => break Side::Local,
                "r" | "remote" => break Side::Remote,
                "c" | "cancel" => return Ok(None),
                _ => continue,
            }
        };
        resolutions.insert(conflict.expense_id.clone(), side);
    }

    Ok(Some(resolutions))
}

fn print_report(report: &SyncReport, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        _ => {
            println!("✓ Sync complete");
            println!("  Records: {}", report.records.len());
            println!(
                "  From remote: {} new, {} updated",
                report.summary.added_from_remote, report.summary.updated_from_remote
            );
            println!(
                "  From local:  {} new, {} updated",
                report.summary.added_from_local, report.summary.updated_from_local
            );
            println!("  Replayed ops: {}", report.replayed_ops);
            if report.uploaded_days.is_empty() {
                println!("  Uploaded days: none");
            } else {
                let days: Vec<String> = report.uploaded_days.iter().map(ToString::to_string).collect();
                println!("  Uploaded days: {}", days.join(", "));
            }
            if report.settings_uploaded {
                println!("  Settings uploaded");
            }
        }
    }
    Ok(())
}
