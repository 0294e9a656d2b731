//! Verify command implementation.

use super::dump::{read_pages, walk, RecordState};
use super::{open_image, print_json, Layout, OutputFormat};
use crate::error::{CliError, CliResult};
use fds_core::{PageTag, RecordHeader};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Verification result.
#[derive(Debug, Serialize)]
pub struct VerifyResult {
    /// Image path.
    pub path: String,
    /// Pages checked.
    pub pages_checked: u32,
    /// Records checked.
    pub records_checked: usize,
    /// Valid records whose CRC was checked.
    pub crcs_checked: usize,
    /// Corruption the store cannot repair.
    pub problems: Vec<String>,
    /// Conditions the next mount repairs.
    pub notes: Vec<String>,
}

impl VerifyResult {
    /// Whether no problem was found.
    pub fn passed(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, layout: Layout, format: OutputFormat) -> CliResult<()> {
    let result = verify(path, layout)?;
    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_text_output(&result),
    }
    if result.passed() {
        Ok(())
    } else {
        Err(CliError::VerifyFailed(result.problems.len()))
    }
}

pub(crate) fn verify(path: &Path, layout: Layout) -> CliResult<VerifyResult> {
    let flash = open_image(path, layout)?;
    let pages = read_pages(&flash, layout)?;
    let mut result = VerifyResult {
        path: path.display().to_string(),
        pages_checked: layout.pages,
        records_checked: 0,
        crcs_checked: 0,
        problems: Vec::new(),
        notes: Vec::new(),
    };

    let mut swaps = 0;
    let mut seen: HashMap<u32, u32> = HashMap::new();
    for page in &pages {
        match page.tag {
            PageTag::Undefined if page.is_erased() => {
                result.notes.push(format!("page {}: erased, not tagged", page.index));
                continue;
            }
            PageTag::Undefined => {
                result.problems.push(format!("page {}: foreign content", page.index));
                continue;
            }
            PageTag::Swap => swaps += 1,
            PageTag::Valid => {}
        }

        let entries = walk(page);
        if page.tag == PageTag::Swap {
            if !entries.is_empty() {
                result.notes.push(format!(
                    "page {}: swap holds {} record(s) from an interrupted collection",
                    page.index,
                    entries.len()
                ));
            }
            continue;
        }

        for entry in entries {
            result.records_checked += 1;
            let at = format!("page {} offset {}", entry.page, entry.offset);
            match entry.state {
                RecordState::Truncated => {
                    result.problems.push(format!("{at}: record runs past the page end"));
                }
                RecordState::Incomplete => {
                    result.notes.push(format!(
                        "{at}: record {} was never completed",
                        entry.record_id
                    ));
                }
                RecordState::Cleared | RecordState::IdMarker => {}
                RecordState::Valid => {
                    if let Some(first) = seen.insert(entry.record_id, entry.page) {
                        result.problems.push(format!(
                            "{at}: record id {} also valid on page {first}",
                            entry.record_id
                        ));
                    }
                    if layout.crc {
                        result.crcs_checked += 1;
                        let header = RecordHeader {
                            record_type: entry.record_type,
                            length_words: entry.length_words,
                            instance: entry.instance,
                            crc16: entry.crc16,
                            record_id: entry.record_id,
                        };
                        let crc = header.compute_crc(&entry.payload);
                        if crc != entry.crc16 {
                            result.problems.push(format!(
                                "{at}: record {} crc {:#06x}, expected {:#06x}",
                                entry.record_id, entry.crc16, crc
                            ));
                        }
                    }
                }
            }
        }
    }

    match swaps {
        1 => {}
        0 => result.notes.push("no swap page".to_string()),
        n => result.problems.push(format!("{n} swap pages")),
    }
    Ok(result)
}

fn print_text_output(result: &VerifyResult) {
    println!("Verifying: {}", result.path);
    println!();
    println!("Pages checked:   {}", result.pages_checked);
    println!("Records checked: {}", result.records_checked);
    println!("CRCs checked:    {}", result.crcs_checked);
    for note in &result.notes {
        println!("  note: {note}");
    }
    for problem in &result.problems {
        println!("  problem: {problem}");
    }
    println!();
    if result.passed() {
        println!("Image is consistent");
    } else {
        println!("{} problem(s) found", result.problems.len());
    }
}
