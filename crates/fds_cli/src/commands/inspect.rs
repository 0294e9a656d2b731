//! Inspect command implementation.

use super::{open_image, print_json, Layout, OutputFormat};
use crate::error::CliResult;
use fds_core::{survey, PageInfo, PageRole};
use serde::Serialize;
use std::path::Path;

/// Image inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Image path.
    pub path: String,
    /// Virtual page size in words.
    pub page_words: u32,
    /// Per-page summary.
    pub pages: Vec<PageInfo>,
    /// Valid records on data pages.
    pub valid_records: u32,
    /// Dirty records on data pages.
    pub dirty_records: u32,
    /// Words garbage collection would reclaim.
    pub freeable_words: u32,
    /// Highest record id found.
    pub latest_id: Option<u32>,
}

/// Runs the inspect command. The image is not modified.
pub fn run(path: &Path, layout: Layout, format: OutputFormat) -> CliResult<()> {
    let result = inspect(path, layout)?;
    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

pub(crate) fn inspect(path: &Path, layout: Layout) -> CliResult<InspectResult> {
    let flash = open_image(path, layout)?;
    let pages = survey(&flash, &layout.config())?;

    let data = pages.iter().filter(|p| p.role == PageRole::Data);
    let mut result = InspectResult {
        path: path.display().to_string(),
        page_words: layout.page_words,
        valid_records: 0,
        dirty_records: 0,
        freeable_words: 0,
        latest_id: pages.iter().filter_map(|p| p.max_id).max(),
        pages: Vec::new(),
    };
    for page in data {
        result.valid_records += page.valid_records;
        result.dirty_records += page.dirty_records;
        result.freeable_words += page.dirty_words;
    }
    result.pages = pages;
    Ok(result)
}

fn role_name(role: PageRole) -> &'static str {
    match role {
        PageRole::Erased => "erased",
        PageRole::Data => "data",
        PageRole::SwapEmpty => "swap",
        PageRole::SwapDirty => "swap (dirty)",
        PageRole::Foreign => "foreign",
    }
}

fn print_text_output(result: &InspectResult) {
    println!("FDS Image: {}", result.path);
    println!("==========");
    println!();
    println!(
        "{:>4}  {:>10}  {:<12}  {:>8}  {:>6}  {:>6}  {:>6}",
        "page", "address", "role", "offset", "valid", "dirty", "free"
    );
    for page in &result.pages {
        let free = if page.role == PageRole::Data {
            result.page_words.saturating_sub(page.write_offset)
        } else {
            0
        };
        println!(
            "{:>4}  {:#010x}  {:<12}  {:>8}  {:>6}  {:>6}  {:>6}",
            page.index,
            page.address,
            role_name(page.role),
            page.write_offset,
            page.valid_records,
            page.dirty_records,
            free
        );
    }
    println!();
    println!("Valid records:  {}", result.valid_records);
    println!("Dirty records:  {}", result.dirty_records);
    println!("Freeable words: {}", result.freeable_words);
    match result.latest_id {
        Some(id) => println!("Latest id:      {id}"),
        None => println!("Latest id:      none"),
    }
}
