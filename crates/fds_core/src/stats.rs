//! Store statistics.
//!
//! A [`StoreStat`] is a point-in-time snapshot computed by walking every data
//! page. It is what [`crate::FlashStore::stat`] returns and what a
//! [`crate::GcPolicy`] looks at when deciding whether to collect.

use crate::error::StoreResult;
use crate::page::{PageKind, PageTable};
use crate::scan::scan_page;
use fds_flash::FlashDriver;
use serde::Serialize;

/// Snapshot of store usage. All sizes are in words.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStat {
    /// Data pages, excluding the swap page.
    pub pages_available: u32,
    /// Records currently open.
    pub open_records: u32,
    /// Valid records.
    pub valid_records: u32,
    /// Cleared or partially written records.
    pub dirty_records: u32,
    /// Words written on data pages, tags included.
    pub words_used: u32,
    /// Words reserved by queued writes and open reservations.
    pub words_reserved: u32,
    /// Words garbage collection would reclaim.
    pub freeable_words: u32,
    /// Largest free run on a single page.
    pub largest_contig: u32,
    /// Completed garbage collection passes.
    pub gc_generation: u32,
}

impl StoreStat {
    /// Whether any page holds reclaimable space.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty_records > 0
    }
}

pub(crate) fn collect<F: FlashDriver + ?Sized>(
    flash: &F,
    table: &PageTable,
    gc_generation: u32,
) -> StoreResult<StoreStat> {
    let mut stat = StoreStat {
        pages_available: table.len() as u32,
        open_records: table.open_records(),
        words_reserved: table.words_reserved(),
        gc_generation,
        ..StoreStat::default()
    };
    for page in &table.pages {
        let scan = scan_page(flash, page.address, table.page_words)?;
        stat.valid_records += scan.valid_records;
        stat.dirty_records += scan.dirty_records;
        stat.freeable_words += scan.dirty_words;
        // In-memory offset also covers records whose first word never landed.
        stat.words_used += page.write_offset.max(scan.write_offset);
        if page.kind == PageKind::Valid {
            stat.largest_contig = stat.largest_contig.max(table.free_words(page));
        }
    }
    Ok(stat)
}
