//! In-memory page table.
//!
//! ## Invariants
//!
//! - `write_offset + words_reserved <= page_words` for every data page
//! - Reservations are unsigned and released with checked arithmetic; a
//!   release that would underflow is an internal error, never a wrap
//! - Exactly one swap page exists once the store is mounted
//! - A page's index is stable for the lifetime of the mount; garbage
//!   collection exchanges the physical address behind it with the swap page

use crate::error::{StoreError, StoreResult};
use crate::record::PAGE_TAG_WORDS;
use fds_flash::WORD_SIZE;

/// Role of a data page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageKind {
    /// Waiting for its data tag: erased during initialization, or a former
    /// swap page after garbage collection.
    Erased,
    /// Tagged as a data page.
    Valid,
}

/// Descriptor of one data page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Page {
    pub(crate) kind: PageKind,
    pub(crate) address: u32,
    pub(crate) write_offset: u32,
    pub(crate) words_reserved: u32,
    pub(crate) records_open: u32,
    pub(crate) can_gc: bool,
}

impl Page {
    pub(crate) fn new(kind: PageKind, address: u32, write_offset: u32, can_gc: bool) -> Self {
        Self {
            kind,
            address,
            write_offset,
            words_reserved: 0,
            records_open: 0,
            can_gc,
        }
    }

    /// Byte address of the word at `offset`.
    pub(crate) fn word_address(&self, offset: u32) -> u32 {
        self.address + offset * WORD_SIZE
    }
}

/// The page reserved for garbage collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SwapPage {
    pub(crate) address: u32,
    pub(crate) write_offset: u32,
    /// Set when the swap content is unknown, e.g. after a failed collection.
    pub(crate) needs_erase: bool,
}

impl SwapPage {
    pub(crate) fn new(address: u32) -> Self {
        Self {
            address,
            write_offset: PAGE_TAG_WORDS,
            needs_erase: false,
        }
    }

    pub(crate) fn word_address(&self, offset: u32) -> u32 {
        self.address + offset * WORD_SIZE
    }
}

/// All data pages plus the swap page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageTable {
    pub(crate) pages: Vec<Page>,
    pub(crate) swap: SwapPage,
    pub(crate) page_words: u32,
}

impl PageTable {
    pub(crate) fn new(pages: Vec<Page>, swap: SwapPage, page_words: u32) -> Self {
        Self {
            pages,
            swap,
            page_words,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pages.len()
    }

    pub(crate) fn get(&self, index: usize) -> StoreResult<&Page> {
        self.pages
            .get(index)
            .ok_or(StoreError::Internal("page index out of range"))
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> StoreResult<&mut Page> {
        self.pages
            .get_mut(index)
            .ok_or(StoreError::Internal("page index out of range"))
    }

    pub(crate) fn find_by_address(&mut self, address: u32) -> Option<&mut Page> {
        self.pages.iter_mut().find(|p| p.address == address)
    }

    /// Words still free on a page, not counting reservations.
    pub(crate) fn free_words(&self, page: &Page) -> u32 {
        self.page_words
            .saturating_sub(page.write_offset)
            .saturating_sub(page.words_reserved)
    }

    /// Reserves `words` on the first data page with room.
    pub(crate) fn reserve(&mut self, words: u32) -> StoreResult<usize> {
        let page_words = self.page_words;
        let (index, page) = self
            .pages
            .iter_mut()
            .enumerate()
            .find(|(_, p)| {
                p.kind == PageKind::Valid
                    && u64::from(p.write_offset) + u64::from(p.words_reserved) + u64::from(words)
                        <= u64::from(page_words)
            })
            .ok_or(StoreError::NoSpaceInFlash)?;
        page.words_reserved += words;
        Ok(index)
    }

    /// Releases a reservation that will not be written.
    pub(crate) fn release(&mut self, index: usize, words: u32) -> StoreResult<()> {
        let page = self.get_mut(index)?;
        page.words_reserved = page
            .words_reserved
            .checked_sub(words)
            .ok_or(StoreError::Internal("reservation underflow"))?;
        Ok(())
    }

    /// Turns a reservation of `reserved` words into `used` written words.
    ///
    /// Returns the offset at which the record starts.
    pub(crate) fn commit(&mut self, index: usize, reserved: u32, used: u32) -> StoreResult<u32> {
        if used > reserved {
            return Err(StoreError::Internal("record larger than its reservation"));
        }
        self.release(index, reserved)?;
        let page_words = self.page_words;
        let page = self.get_mut(index)?;
        let start = page.write_offset;
        if start + used > page_words {
            return Err(StoreError::Internal("record overruns page"));
        }
        page.write_offset = start + used;
        Ok(start)
    }

    /// Undoes a commit whose first word never reached flash.
    ///
    /// Only possible while the record is still the last one on the page.
    pub(crate) fn rollback(&mut self, index: usize, start: u32, used: u32) -> StoreResult<()> {
        let page = self.get_mut(index)?;
        if page.write_offset == start + used {
            page.write_offset = start;
        } else {
            page.can_gc = true;
        }
        Ok(())
    }

    /// Exchanges a data page with the swap page after its live records were
    /// copied. Returns the number of words freed.
    ///
    /// The page keeps its index and takes over the swap's address. It stays
    /// out of reservations until its tag is rewritten.
    pub(crate) fn exchange_with_swap(&mut self, index: usize) -> StoreResult<u32> {
        let swap_address = self.swap.address;
        let swap_offset = self.swap.write_offset;
        let page = self
            .pages
            .get_mut(index)
            .ok_or(StoreError::Internal("page index out of range"))?;

        let freed = page.write_offset.saturating_sub(swap_offset);
        let old_address = page.address;
        page.address = swap_address;
        page.write_offset = swap_offset;
        page.can_gc = false;
        // Still carries the swap tag until promoted.
        page.kind = PageKind::Erased;

        self.swap.address = old_address;
        self.swap.write_offset = PAGE_TAG_WORDS;
        self.swap.needs_erase = true;
        Ok(freed)
    }

    pub(crate) fn open_records(&self) -> u32 {
        self.pages.iter().map(|p| p.records_open).sum()
    }

    pub(crate) fn words_reserved(&self) -> u32 {
        self.pages.iter().map(|p| p.words_reserved).sum()
    }
}
