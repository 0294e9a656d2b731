//! Copy-on-write garbage collection over one swap page.
//!
//! ```text
//! begin -> select-page -> copy-record* -> swap-roles -> erase-swap
//!       -> tag-new-valid -> tag-swap -> select-page -> ... -> done
//! ```
//!
//! Live records of a page are copied one write at a time to the swap page.
//! The page and the swap then exchange roles in memory, the old page is
//! erased to become the new swap, the old swap's tag is rewritten to the
//! data role and the new swap is tagged. The order makes every crash point
//! recoverable at mount:
//!
//! - before the erase, flash holds the original page and a dirty swap,
//!   which mount discards
//! - after the erase, flash holds a dirty swap and an erased page, which
//!   mount promotes
//!
//! When the page holds the highest record id on flash and that record is
//! not live, an id marker carrying the id is copied along with the live
//! records. Mount takes the next id from the highest one it finds.
//!
//! If a record on the page is opened while it is being copied, the swap is
//! discarded and the page is left for a later sweep. Any failure marks the
//! swap for erasure; the next sweep starts by cleaning it up.

use crate::command::{GcCommand, GcStep};
use crate::error::{StoreError, StoreResult};
use crate::events::StoreEvent;
use crate::page::PageKind;
use crate::processor::Progress;
use crate::record::{PageTag, RecordHeader, PAGE_TAG_VALID, PAGE_TAG_WORDS};
use crate::scan;
use crate::store::Inner;
use crate::types::RecordId;
use fds_flash::{FlashDriver, FlashResult, WORD_SIZE};
use tracing::{debug, info, warn};

impl<F: FlashDriver> Inner<F> {
    pub(crate) fn gc_step(&mut self, cmd: &mut GcCommand, outcome: Option<FlashResult<()>>) -> Progress {
        if let Some(Err(err)) = outcome {
            return self.gc_failed(cmd, err.into());
        }

        loop {
            let issued = match cmd.step {
                GcStep::Begin => {
                    cmd.worklist = self
                        .table
                        .pages
                        .iter()
                        .enumerate()
                        .filter(|(_, p)| p.kind == PageKind::Valid)
                        .map(|(index, _)| index)
                        .collect();
                    debug!(pages = cmd.worklist.len(), needs_erase = self.table.swap.needs_erase, "gc started");
                    cmd.step = if self.table.swap.needs_erase {
                        GcStep::EraseSwap
                    } else {
                        GcStep::SelectPage
                    };
                    continue;
                }
                GcStep::SelectPage => {
                    cmd.current = None;
                    while let Some(index) = cmd.worklist.pop_front() {
                        let eligible = self.table.get(index).is_ok_and(|p| {
                            p.kind == PageKind::Valid && p.records_open == 0 && p.can_gc
                        });
                        if eligible {
                            cmd.current = Some(index);
                            break;
                        }
                    }
                    cmd.step = match cmd.current {
                        Some(index) => {
                            debug!(page = index, "compacting page");
                            cmd.cursor = PAGE_TAG_WORDS;
                            cmd.marked = false;
                            GcStep::CopyRecord
                        }
                        None => GcStep::Done,
                    };
                    continue;
                }
                GcStep::CopyRecord => match self.copy_next_record(cmd) {
                    Ok(true) => Ok(()),
                    Ok(false) => continue,
                    Err(err) => Err(err),
                },
                GcStep::SwapRoles => match self.swap_roles(cmd) {
                    Ok(()) => continue,
                    Err(err) => Err(err),
                },
                GcStep::EraseSwap => {
                    cmd.step = GcStep::SwapErased;
                    self.erase_page(self.table.swap.address)
                }
                GcStep::SwapErased => {
                    self.table.swap.needs_erase = false;
                    self.table.swap.write_offset = PAGE_TAG_WORDS;
                    cmd.step = GcStep::TagNewValid;
                    continue;
                }
                GcStep::TagNewValid => {
                    let pending = self
                        .table
                        .pages
                        .iter()
                        .find(|p| p.kind == PageKind::Erased)
                        .map(|p| p.address);
                    let Some(address) = pending else {
                        cmd.step = GcStep::TagSwap;
                        continue;
                    };
                    cmd.promoting = Some(address);
                    cmd.step = GcStep::Promoted;
                    self.write_words(address + WORD_SIZE, &[PAGE_TAG_VALID])
                }
                GcStep::Promoted => {
                    if let Some(address) = cmd.promoting.take() {
                        if let Some(page) = self.table.find_by_address(address) {
                            page.kind = PageKind::Valid;
                        }
                    }
                    cmd.step = GcStep::TagNewValid;
                    continue;
                }
                GcStep::TagSwap => {
                    cmd.step = GcStep::SelectPage;
                    self.write_words(self.table.swap.address, &PageTag::swap_words())
                }
                GcStep::Done => {
                    self.gc_generation = self.gc_generation.wrapping_add(1);
                    info!(
                        pages_compacted = cmd.pages_compacted,
                        words_freed = cmd.words_freed,
                        generation = self.gc_generation,
                        "gc finished"
                    );
                    return Progress::Done(StoreEvent::Gc {
                        result: Ok(()),
                        pages_compacted: cmd.pages_compacted,
                        words_freed: cmd.words_freed,
                    });
                }
            };
            return match issued {
                Ok(()) => Progress::Executing,
                Err(err) => self.gc_failed(cmd, err),
            };
        }
    }

    /// Issues the copy of the next valid record. Returns `false` when no
    /// operation was issued and `cmd.step` moved on.
    fn copy_next_record(&mut self, cmd: &mut GcCommand) -> StoreResult<bool> {
        let index = cmd.current.ok_or(StoreError::Internal("no page selected"))?;
        let page = self.table.get(index)?;
        if page.records_open > 0 {
            self.discard_swap(cmd, index);
            return Ok(false);
        }

        let words = scan::read_page(&self.flash, page.address, self.table.page_words)?;
        let Some(entry) = scan::find_next_valid(&words, cmd.cursor) else {
            if !cmd.marked {
                cmd.marked = true;
                if let Some(id) = self.dropped_highest_id(index, &words)? {
                    debug!(id, "keeping id marker");
                    let marker = RecordHeader::id_marker(RecordId::new(id)).to_words();
                    self.copy_to_swap(&marker)?;
                    return Ok(true);
                }
            }
            cmd.step = GcStep::SwapRoles;
            return Ok(false);
        };

        let start = entry.offset as usize;
        let total = entry.header.total_words();
        cmd.cursor = entry.offset + total;
        debug!(id = entry.header.record_id, words = total, "copying record");
        self.copy_to_swap(&words[start..start + total as usize])?;
        Ok(true)
    }

    fn copy_to_swap(&mut self, words: &[u32]) -> StoreResult<()> {
        let total = words.len() as u32;
        let swap = &mut self.table.swap;
        if swap.write_offset + total > self.table.page_words {
            return Err(StoreError::Internal("swap page overflow"));
        }
        let address = swap.word_address(swap.write_offset);
        swap.write_offset += total;
        swap.needs_erase = true;
        self.write_words(address, words)
    }

    /// Returns the highest id on page `index` if compacting the page drops
    /// it and no other page holds an id at least as high.
    fn dropped_highest_id(&self, index: usize, words: &[u32]) -> StoreResult<Option<u32>> {
        let Some(last) = scan::highest_id(words) else {
            return Ok(None);
        };
        if last.is_valid() {
            return Ok(None);
        }
        let id = last.header.record_id;
        for (other, page) in self.table.pages.iter().enumerate() {
            if other == index {
                continue;
            }
            let scan = scan::scan_page(&self.flash, page.address, self.table.page_words)?;
            if scan.max_id.is_some_and(|max| max >= id) {
                return Ok(None);
            }
        }
        Ok(Some(id))
    }

    fn swap_roles(&mut self, cmd: &mut GcCommand) -> StoreResult<()> {
        let index = cmd.current.ok_or(StoreError::Internal("no page selected"))?;
        if self.table.get(index)?.records_open > 0 {
            self.discard_swap(cmd, index);
            return Ok(());
        }
        let freed = self.table.exchange_with_swap(index)?;
        self.gc_generation = self.gc_generation.wrapping_add(1);
        cmd.pages_compacted += 1;
        cmd.words_freed += freed;
        info!(page = index, words_freed = freed, "page compacted");
        cmd.current = None;
        cmd.step = GcStep::EraseSwap;
        Ok(())
    }

    fn discard_swap(&mut self, cmd: &mut GcCommand, index: usize) {
        warn!(page = index, "record opened during gc, discarding swap");
        self.table.swap.needs_erase = true;
        cmd.current = None;
        cmd.step = GcStep::EraseSwap;
    }

    fn gc_failed(&mut self, cmd: &GcCommand, err: StoreError) -> Progress {
        warn!(step = ?cmd.step, %err, "gc failed");
        self.table.swap.needs_erase = true;
        self.gc_generation = self.gc_generation.wrapping_add(1);
        Progress::Done(StoreEvent::Gc {
            result: Err(err),
            pages_compacted: cmd.pages_compacted,
            words_freed: cmd.words_freed,
        })
    }
}
