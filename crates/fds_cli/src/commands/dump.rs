//! Dump command implementation.

use super::{open_image, print_json, Layout, OutputFormat};
use crate::error::{CliError, CliResult};
use fds_core::{
    PageTag, RecordHeader, HEADER_WORDS, INSTANCE_INVALID, PAGE_TAG_WORDS, TYPE_INVALID,
};
use fds_flash::{FlashDriver, ERASED_WORD, WORD_SIZE};
use serde::Serialize;
use std::path::Path;

/// State of a record header found on flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Fully written and not cleared.
    Valid,
    /// Cleared by the store.
    Cleared,
    /// Empty header left by garbage collection to keep the highest id.
    IdMarker,
    /// The final header word was never written.
    Incomplete,
    /// The record runs past the end of its page.
    Truncated,
}

/// One record header.
#[derive(Debug, Clone, Serialize)]
pub struct RecordEntry {
    /// Virtual page index.
    pub page: u32,
    /// Word offset of the header within the page.
    pub offset: u32,
    /// Record state.
    pub state: RecordState,
    /// Record type.
    pub record_type: u16,
    /// Record instance.
    pub instance: u16,
    /// Payload length in words.
    pub length_words: u16,
    /// Stored CRC.
    pub crc16: u16,
    /// Record id.
    pub record_id: u32,
    /// Payload words, absent for truncated records.
    #[serde(skip)]
    pub payload: Vec<u32>,
}

/// Words of one virtual page with its tag decoded.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Virtual page index.
    pub index: u32,
    /// Page tag.
    pub tag: PageTag,
    /// Every word of the page, tag included.
    pub words: Vec<u32>,
}

impl PageImage {
    /// Whether every word is erased.
    pub fn is_erased(&self) -> bool {
        self.words.iter().all(|&w| w == ERASED_WORD)
    }
}

/// Reads every virtual page of an opened image.
pub fn read_pages<F: FlashDriver>(flash: &F, layout: Layout) -> CliResult<Vec<PageImage>> {
    let base = flash.geometry().base_address;
    let mut pages = Vec::with_capacity(layout.pages as usize);
    for index in 0..layout.pages {
        let address = base + index * layout.page_words * WORD_SIZE;
        let mut words = vec![0u32; layout.page_words as usize];
        flash.read(address, &mut words)?;
        let tag = PageTag::decode([words[0], words[1]]);
        pages.push(PageImage { index, tag, words });
    }
    Ok(pages)
}

/// Walks the records of a tagged page.
pub fn walk(page: &PageImage) -> Vec<RecordEntry> {
    let words = &page.words;
    let page_words = words.len() as u32;
    let mut entries = Vec::new();
    let mut offset = PAGE_TAG_WORDS;

    while offset < page_words && words[offset as usize] != ERASED_WORD {
        let start = offset as usize;
        let mut raw = [ERASED_WORD; 3];
        for (slot, word) in raw.iter_mut().zip(&words[start..]) {
            *slot = *word;
        }
        let header = RecordHeader::from_words(raw);
        let end = offset + header.total_words();

        let state = if offset + HEADER_WORDS > page_words || end > page_words {
            RecordState::Truncated
        } else if header.is_id_marker() {
            RecordState::IdMarker
        } else if header.record_type == TYPE_INVALID {
            RecordState::Cleared
        } else if header.instance == INSTANCE_INVALID {
            RecordState::Incomplete
        } else {
            RecordState::Valid
        };
        let payload = if state == RecordState::Truncated {
            Vec::new()
        } else {
            words[start + HEADER_WORDS as usize..end as usize].to_vec()
        };

        entries.push(RecordEntry {
            page: page.index,
            offset,
            state,
            record_type: header.record_type,
            instance: header.instance,
            length_words: header.length_words,
            crc16: header.crc16,
            record_id: header.record_id,
            payload,
        });
        offset = end;
    }
    entries
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    layout: Layout,
    page: Option<u32>,
    all: bool,
    limit: Option<usize>,
    format: OutputFormat,
) -> CliResult<()> {
    let entries = dump(path, layout, page, all, limit)?;
    match format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Text => print_text_output(&entries),
    }
    Ok(())
}

pub(crate) fn dump(
    path: &Path,
    layout: Layout,
    page: Option<u32>,
    all: bool,
    limit: Option<usize>,
) -> CliResult<Vec<RecordEntry>> {
    if let Some(index) = page {
        if index >= layout.pages {
            return Err(CliError::Input(format!(
                "page {index} out of range (0..{})",
                layout.pages
            )));
        }
    }
    let flash = open_image(path, layout)?;
    let pages = read_pages(&flash, layout)?;

    let entries = pages
        .iter()
        .filter(|p| page.map_or(true, |index| p.index == index))
        .filter(|p| p.tag != PageTag::Undefined)
        .flat_map(walk)
        .filter(|e| all || e.state == RecordState::Valid)
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    Ok(entries)
}

fn print_text_output(entries: &[RecordEntry]) {
    println!(
        "{:>4}  {:>6}  {:<10}  {:>6}  {:>8}  {:>6}  {:>6}  {:>10}",
        "page", "offset", "state", "type", "instance", "words", "crc", "id"
    );
    for entry in entries {
        let state = match entry.state {
            RecordState::Valid => "valid",
            RecordState::Cleared => "cleared",
            RecordState::IdMarker => "id marker",
            RecordState::Incomplete => "incomplete",
            RecordState::Truncated => "truncated",
        };
        println!(
            "{:>4}  {:>6}  {:<10}  {:#06x}  {:#08x}  {:>6}  {:#06x}  {:>10}",
            entry.page,
            entry.offset,
            state,
            entry.record_type,
            entry.instance,
            entry.length_words,
            entry.crc16,
            entry.record_id
        );
    }
    println!();
    println!("{} record(s)", entries.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::record;
    use crate::commands::testing::{formatted, LAYOUT};

    fn page(words: &[u32]) -> PageImage {
        let mut all = vec![ERASED_WORD; 20];
        all[..words.len()].copy_from_slice(words);
        PageImage {
            index: 0,
            tag: PageTag::decode([all[0], all[1]]),
            words: all,
        }
    }

    #[test]
    fn walk_classifies_headers() {
        let [m, v] = PageTag::valid_words();
        let entries = walk(&page(&[
            m, v, // tag
            0x0001_0005, 0xABCD_0007, 1, 0x11, // valid
            0x0001_0000, 0xABCD_0007, 2, 0x22, // cleared
            0x0001_0005, ERASED_WORD, 3, 0x33, // incomplete
            0, ERASED_WORD, 4, // id marker
            0x0004_0005, // runs off the page
        ]));
        let states: Vec<_> = entries.iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![
                RecordState::Valid,
                RecordState::Cleared,
                RecordState::Incomplete,
                RecordState::IdMarker,
                RecordState::Truncated
            ]
        );
        assert_eq!(entries[0].payload, vec![0x11]);
        assert_eq!(entries[0].crc16, 0xABCD);
        assert_eq!(entries[3].record_id, 4);
        assert_eq!(entries[4].offset, 17);
    }

    #[test]
    fn walk_stops_at_erased_word() {
        let [m, v] = PageTag::valid_words();
        assert!(walk(&page(&[m, v])).is_empty());
    }

    #[test]
    fn dump_filters_and_limits() {
        let (_dir, path) = formatted();
        record::write(&path, LAYOUT, 3, 1, &[1, 0, 0, 0]).unwrap();
        record::write(&path, LAYOUT, 3, 2, &[2, 0, 0, 0]).unwrap();
        record::clear(&path, LAYOUT, Some(1), None).unwrap();

        let valid = dump(&path, LAYOUT, None, false, None).unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].record_id, 2);

        let all = dump(&path, LAYOUT, None, true, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].state, RecordState::Cleared);

        assert_eq!(dump(&path, LAYOUT, None, true, Some(1)).unwrap().len(), 1);
        assert!(dump(&path, LAYOUT, Some(0), true, None).unwrap().is_empty());
        assert!(dump(&path, LAYOUT, Some(9), true, None).is_err());
    }
}
