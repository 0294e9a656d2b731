//! Garbage collection command implementation.

use super::{print_json, Layout, OutputFormat, Session};
use crate::error::CliResult;
use fds_core::{StoreEvent, StoreStat};
use serde::Serialize;
use std::path::Path;

/// Garbage collection result.
#[derive(Debug, Serialize)]
pub struct GcResult {
    /// Image path.
    pub path: String,
    /// Usage before collecting.
    pub before: StoreStat,
    /// Usage after collecting.
    pub after: StoreStat,
    /// Pages exchanged with the swap page.
    pub pages_compacted: u32,
    /// Words reclaimed.
    pub words_freed: u32,
}

/// Runs the gc command.
pub fn run(path: &Path, layout: Layout, format: OutputFormat) -> CliResult<()> {
    let result = collect(path, layout)?;
    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => {
            println!("Collected: {}", result.path);
            println!();
            println!("Pages compacted: {}", result.pages_compacted);
            println!("Words freed:     {}", result.words_freed);
            println!(
                "Words used:      {} -> {}",
                result.before.words_used, result.after.words_used
            );
            println!(
                "Largest free:    {} -> {}",
                result.before.largest_contig, result.after.largest_contig
            );
        }
    }
    Ok(())
}

pub(crate) fn collect(path: &Path, layout: Layout) -> CliResult<GcResult> {
    let session = Session::mount(path, layout)?;
    let before = session.store.stat()?;
    session.store.gc()?;

    let mut result = GcResult {
        path: path.display().to_string(),
        before,
        after: StoreStat::default(),
        pages_compacted: 0,
        words_freed: 0,
    };
    for event in session.settle()? {
        if let StoreEvent::Gc {
            pages_compacted,
            words_freed,
            ..
        } = event
        {
            result.pages_compacted += pages_compacted;
            result.words_freed += words_freed;
        }
    }
    result.after = session.store.stat()?;
    tracing::info!(
        pages = result.pages_compacted,
        words = result.words_freed,
        "garbage collection finished"
    );
    Ok(result)
}
