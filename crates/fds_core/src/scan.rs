//! Stateless page walkers.
//!
//! Pages are read into memory once and walked from the first word after the
//! tag. The walk stops at the first erased word or at the end of the page.
//! Every header, valid or not, advances the walk by `3 + length_words`.
//! Id markers count toward the highest id but are neither live nor dirty.

use crate::error::StoreResult;
use crate::page::PageTable;
use crate::record::{RecordHeader, HEADER_WORDS, ID_UNWRITTEN, PAGE_TAG_WORDS};
use crate::types::{FindToken, RecordId};
use fds_flash::{FlashDriver, ERASED_WORD};

/// One header found while walking a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry {
    /// Word offset of the header within the page.
    pub(crate) offset: u32,
    pub(crate) header: RecordHeader,
    /// The header's length runs past the end of the page.
    pub(crate) truncated: bool,
}

impl Entry {
    pub(crate) fn is_valid(&self) -> bool {
        !self.truncated && self.header.is_valid()
    }
}

/// Iterator over the headers of an in-memory page image.
pub(crate) struct Entries<'a> {
    words: &'a [u32],
    offset: u32,
}

impl<'a> Entries<'a> {
    pub(crate) fn new(words: &'a [u32]) -> Self {
        Self::from_offset(words, PAGE_TAG_WORDS)
    }

    pub(crate) fn from_offset(words: &'a [u32], offset: u32) -> Self {
        Self {
            words,
            offset: offset.max(PAGE_TAG_WORDS),
        }
    }

    /// Offset of the next header to be read.
    pub(crate) fn offset(&self) -> u32 {
        self.offset
    }
}

impl Iterator for Entries<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        let page_words = self.words.len() as u32;
        let start = self.offset as usize;
        if self.offset >= page_words || self.words[start] == ERASED_WORD {
            return None;
        }

        let offset = self.offset;
        if offset + HEADER_WORDS > page_words {
            // Header cut short by the page end.
            let mut words = [ERASED_WORD; 3];
            for (slot, word) in words.iter_mut().zip(&self.words[start..]) {
                *slot = *word;
            }
            self.offset = page_words;
            return Some(Entry {
                offset,
                header: RecordHeader::from_words(words),
                truncated: true,
            });
        }

        let header = RecordHeader::from_words([
            self.words[start],
            self.words[start + 1],
            self.words[start + 2],
        ]);
        let end = u64::from(offset) + u64::from(header.total_words());
        let truncated = end > u64::from(page_words);
        self.offset = if truncated { page_words } else { end as u32 };
        Some(Entry {
            offset,
            header,
            truncated,
        })
    }
}

/// Summary of one data page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PageScan {
    pub(crate) write_offset: u32,
    pub(crate) can_gc: bool,
    pub(crate) max_id: Option<u32>,
    pub(crate) valid_records: u32,
    pub(crate) valid_words: u32,
    pub(crate) dirty_records: u32,
    pub(crate) dirty_words: u32,
}

/// Walks a page image and summarizes it.
pub(crate) fn scan_words(words: &[u32]) -> PageScan {
    let page_words = words.len() as u32;
    let mut scan = PageScan {
        write_offset: PAGE_TAG_WORDS.min(page_words),
        ..PageScan::default()
    };
    let mut entries = Entries::new(words);
    for entry in entries.by_ref() {
        let id = entry.header.record_id;
        if id != ID_UNWRITTEN {
            scan.max_id = Some(scan.max_id.map_or(id, |max| max.max(id)));
        }
        if !entry.truncated && entry.header.is_id_marker() {
            continue;
        }
        let span = if entry.truncated {
            page_words - entry.offset
        } else {
            entry.header.total_words()
        };
        if entry.is_valid() {
            scan.valid_records += 1;
            scan.valid_words += span;
        } else {
            scan.can_gc = true;
            scan.dirty_records += 1;
            scan.dirty_words += span;
        }
    }
    scan.write_offset = entries.offset().min(page_words);
    scan
}

/// Reads a whole page.
pub(crate) fn read_page<F: FlashDriver + ?Sized>(
    flash: &F,
    address: u32,
    page_words: u32,
) -> StoreResult<Vec<u32>> {
    let mut words = vec![ERASED_WORD; page_words as usize];
    flash.read(address, &mut words)?;
    Ok(words)
}

/// Reads and summarizes a page.
pub(crate) fn scan_page<F: FlashDriver + ?Sized>(
    flash: &F,
    address: u32,
    page_words: u32,
) -> StoreResult<PageScan> {
    Ok(scan_words(&read_page(flash, address, page_words)?))
}

/// Returns the next valid header at or after `offset`.
pub(crate) fn find_next_valid(words: &[u32], offset: u32) -> Option<Entry> {
    Entries::from_offset(words, offset).find(Entry::is_valid)
}

/// Returns the header with the highest id on a page, ignoring headers cut
/// short by the page end.
pub(crate) fn highest_id(words: &[u32]) -> Option<Entry> {
    Entries::new(words)
        .filter(|e| !e.truncated && e.header.record_id != ID_UNWRITTEN)
        .max_by_key(|e| e.header.record_id)
}

/// A record located on flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Located {
    pub(crate) page: usize,
    pub(crate) offset: u32,
    pub(crate) header: RecordHeader,
}

impl Located {
    /// Byte address of the record's first header word.
    pub(crate) fn address(&self, table: &PageTable) -> StoreResult<u32> {
        Ok(table.get(self.page)?.word_address(self.offset))
    }
}

/// Optional halves of a search key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct KeyFilter {
    pub(crate) record_type: Option<u16>,
    pub(crate) instance: Option<u16>,
}

impl KeyFilter {
    pub(crate) fn matches(&self, header: &RecordHeader) -> bool {
        self.record_type.map_or(true, |t| t == header.record_type)
            && self.instance.map_or(true, |i| i == header.instance)
    }
}

/// Finds a header, valid or not, carrying `id`.
pub(crate) fn locate_id<F: FlashDriver + ?Sized>(
    flash: &F,
    table: &PageTable,
    id: RecordId,
) -> StoreResult<Option<Located>> {
    for (index, page) in table.pages.iter().enumerate() {
        let words = read_page(flash, page.address, table.page_words)?;
        let found = Entries::new(&words)
            .filter(|e| !e.truncated)
            .find(|e| e.header.record_id == id.as_u32());
        if let Some(entry) = found {
            return Ok(Some(Located {
                page: index,
                offset: entry.offset,
                header: entry.header,
            }));
        }
    }
    Ok(None)
}

/// Reads the header at a cached location if it still carries `id`.
pub(crate) fn header_at<F: FlashDriver + ?Sized>(
    flash: &F,
    table: &PageTable,
    page: usize,
    offset: u32,
    id: RecordId,
) -> StoreResult<Option<RecordHeader>> {
    let Ok(descriptor) = table.get(page) else {
        return Ok(None);
    };
    if offset < PAGE_TAG_WORDS || offset + HEADER_WORDS > table.page_words {
        return Ok(None);
    }
    let mut words = [0u32; 3];
    flash.read(descriptor.word_address(offset), &mut words)?;
    let header = RecordHeader::from_words(words);
    Ok((header.record_id == id.as_u32()).then_some(header))
}

/// Resumes a key search from `token`.
///
/// On a match the token points just past the returned record. On
/// exhaustion the token is reset and `None` is returned.
pub(crate) fn find_by_key<F: FlashDriver + ?Sized>(
    flash: &F,
    table: &PageTable,
    filter: KeyFilter,
    token: &mut FindToken,
) -> StoreResult<Option<Located>> {
    let (first_page, mut offset) = if token.magic == FindToken::MAGIC {
        (token.page as usize, token.offset)
    } else {
        (0, PAGE_TAG_WORDS)
    };

    for index in first_page..table.len() {
        let page = table.get(index)?;
        let words = read_page(flash, page.address, table.page_words)?;
        let found = Entries::from_offset(&words, offset)
            .filter(Entry::is_valid)
            .find(|e| filter.matches(&e.header));
        if let Some(entry) = found {
            token.page = index as u32;
            token.offset = entry.offset + entry.header.total_words();
            token.magic = FindToken::MAGIC;
            return Ok(Some(Located {
                page: index,
                offset: entry.offset,
                header: entry.header,
            }));
        }
        offset = PAGE_TAG_WORDS;
    }

    token.reset();
    Ok(None)
}

/// Whether every word of a page image is erased.
pub(crate) fn is_erased(words: &[u32]) -> bool {
    words.iter().all(|&w| w == ERASED_WORD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PageTag;
    use crate::types::RecordKey;

    /// Builds a page image from records given as (header, payload).
    fn page(records: &[(RecordHeader, Vec<u32>)], page_words: usize) -> Vec<u32> {
        let mut words = PageTag::valid_words().to_vec();
        for (header, payload) in records {
            words.extend_from_slice(&header.to_words());
            words.extend_from_slice(payload);
        }
        words.resize(page_words, ERASED_WORD);
        words
    }

    fn header(key: (u16, u16), len: u16, id: u32) -> RecordHeader {
        RecordHeader::new(RecordKey::new(key.0, key.1), len, RecordId::new(id))
    }

    #[test]
    fn scan_empty_page() {
        let scan = scan_words(&page(&[], 16));
        assert_eq!(scan.write_offset, PAGE_TAG_WORDS);
        assert!(!scan.can_gc);
        assert_eq!(scan.max_id, None);
    }

    #[test]
    fn scan_counts_valid_and_invalid() {
        let mut cleared = header((1, 1), 1, 4);
        cleared.record_type = 0;
        let words = page(
            &[
                (header((1, 1), 2, 3), vec![0, 0]),
                (cleared, vec![9]),
                (header((2, 1), 1, 7), vec![1]),
            ],
            32,
        );
        let scan = scan_words(&words);
        assert_eq!(scan.write_offset, 2 + 5 + 4 + 4);
        assert!(scan.can_gc);
        assert_eq!(scan.max_id, Some(7));
        assert_eq!(scan.valid_records, 2);
        assert_eq!(scan.dirty_records, 1);
        assert_eq!(scan.dirty_words, 4);
    }

    #[test]
    fn scan_partial_record_counts_its_length() {
        // Crash before the instance/crc word: instance stays 0xFFFF.
        let mut words = page(&[], 16);
        words[2] = header((1, 1), 3, 1).type_length_word();
        words[4] = 1;
        let scan = scan_words(&words);
        assert_eq!(scan.write_offset, 2 + 6);
        assert!(scan.can_gc);
        assert_eq!(scan.max_id, Some(1));
    }

    #[test]
    fn scan_overrunning_length_ends_at_page_end() {
        let words = page(&[(header((1, 1), 40, 2), vec![0, 0])], 16);
        let scan = scan_words(&words);
        assert_eq!(scan.write_offset, 16);
        assert!(scan.can_gc);
    }

    #[test]
    fn find_next_valid_skips_invalid() {
        let mut cleared = header((1, 1), 1, 1);
        cleared.record_type = 0;
        let words = page(&[(cleared, vec![0]), (header((1, 2), 1, 2), vec![5])], 16);
        let entry = find_next_valid(&words, PAGE_TAG_WORDS).unwrap();
        assert_eq!(entry.offset, 6);
        assert_eq!(entry.header.record_id, 2);
        assert_eq!(find_next_valid(&words, 10), None);
    }

    #[test]
    fn id_marker_keeps_id_without_dirtying() {
        let mut cleared = header((1, 1), 2, 5);
        cleared.record_type = 0;
        let words = page(
            &[
                (header((1, 1), 1, 3), vec![1]),
                (RecordHeader::id_marker(RecordId::new(9)), vec![]),
            ],
            32,
        );
        let scan = scan_words(&words);
        assert_eq!(scan.write_offset, 2 + 4 + 3);
        assert_eq!(scan.max_id, Some(9));
        assert_eq!(scan.valid_records, 1);
        assert_eq!(scan.dirty_records, 0);
        assert!(!scan.can_gc);

        let words = page(&[(header((1, 1), 1, 3), vec![1]), (cleared, vec![0, 0])], 32);
        let last = highest_id(&words).unwrap();
        assert_eq!(last.header.record_id, 5);
        assert!(!last.is_valid());
        assert_eq!(highest_id(&page(&[], 16)), None);
    }

    #[test]
    fn key_filter_wildcards() {
        let h = header((5, 7), 1, 1);
        let any = KeyFilter {
            record_type: None,
            instance: None,
        };
        assert!(any.matches(&h));
        assert!(KeyFilter {
            record_type: Some(5),
            instance: None
        }
        .matches(&h));
        assert!(!KeyFilter {
            record_type: Some(5),
            instance: Some(8)
        }
        .matches(&h));
        assert!(!KeyFilter {
            record_type: Some(6),
            instance: Some(7)
        }
        .matches(&h));
    }

    #[test]
    fn erased_detection() {
        assert!(is_erased(&[ERASED_WORD; 4]));
        assert!(!is_erased(&[ERASED_WORD, 0]));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn scan_accounts_for_every_record(
                records in proptest::collection::vec((1u16..6, any::<bool>()), 0..10)
            ) {
                let mut built = Vec::new();
                for (i, (len, valid)) in records.iter().enumerate() {
                    let mut h = header((1, 1), *len, i as u32 + 1);
                    if !valid {
                        h.record_type = 0;
                    }
                    built.push((h, vec![0; usize::from(*len)]));
                }
                let words = page(&built, 128);
                let scan = scan_words(&words);

                let total: u32 = records.iter().map(|(len, _)| HEADER_WORDS + u32::from(*len)).sum();
                let dirty = records.iter().filter(|(_, valid)| !valid).count() as u32;
                prop_assert_eq!(scan.write_offset, PAGE_TAG_WORDS + total);
                prop_assert_eq!(scan.valid_records + scan.dirty_records, records.len() as u32);
                prop_assert_eq!(scan.dirty_records, dirty);
                prop_assert_eq!(scan.valid_words + scan.dirty_words, total);
                prop_assert_eq!(scan.can_gc, dirty > 0);
                prop_assert_eq!(scan.max_id, (!records.is_empty()).then_some(records.len() as u32));
            }
        }
    }
}
