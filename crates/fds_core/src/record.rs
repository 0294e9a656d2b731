//! On-flash layout: page tags and record headers.
//!
//! ## Page Tag
//!
//! ```text
//! | magic (1 word) | role (1 word) |
//! ```
//!
//! ## Record
//!
//! ```text
//! | type (16) | length_words (16) | instance (16) | crc16 (16) | id (32) | payload (length_words) |
//! ```
//!
//! The first word of each pair is the low half of the 32-bit word. A record
//! is written in the order word0, word2, payload, word1, so the instance only
//! becomes valid once everything else has landed.

use crate::types::{RecordId, RecordKey};

/// Size of the page tag in words.
pub const PAGE_TAG_WORDS: u32 = 2;

/// First tag word of every page owned by the store.
pub const PAGE_TAG_MAGIC: u32 = 0xDEAD_C0DE;

/// Second tag word of the swap page.
pub const PAGE_TAG_SWAP: u32 = 0xF11E_01FF;

/// Second tag word of a data page. Differs from [`PAGE_TAG_SWAP`] only by
/// cleared bits, so a swap page can be promoted in place.
pub const PAGE_TAG_VALID: u32 = 0xF11E_01FE;

/// Size of a record header in words.
pub const HEADER_WORDS: u32 = 3;

/// Record type of cleared records.
pub const TYPE_INVALID: u16 = 0x0000;

/// Instance of records whose final header word has not been written.
pub const INSTANCE_INVALID: u16 = 0xFFFF;

/// CRC value stored when CRC checking is disabled.
pub const CRC_UNUSED: u16 = 0xFFFF;

/// Record id value meaning "never written".
pub const ID_UNWRITTEN: u32 = 0xFFFF_FFFF;

/// Role encoded in a page tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTag {
    /// Data page.
    Valid,
    /// Swap page.
    Swap,
    /// No recognizable tag.
    Undefined,
}

impl PageTag {
    /// Decodes the two tag words.
    #[must_use]
    pub fn decode(words: [u32; 2]) -> Self {
        match words {
            [PAGE_TAG_MAGIC, PAGE_TAG_VALID] => Self::Valid,
            [PAGE_TAG_MAGIC, PAGE_TAG_SWAP] => Self::Swap,
            _ => Self::Undefined,
        }
    }

    /// Words of a swap tag.
    #[must_use]
    pub const fn swap_words() -> [u32; 2] {
        [PAGE_TAG_MAGIC, PAGE_TAG_SWAP]
    }

    /// Words of a data page tag.
    #[must_use]
    pub const fn valid_words() -> [u32; 2] {
        [PAGE_TAG_MAGIC, PAGE_TAG_VALID]
    }
}

/// A record header as stored in flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Record type, first half of the key.
    pub record_type: u16,
    /// Payload length in words.
    pub length_words: u16,
    /// Record instance, second half of the key.
    pub instance: u16,
    /// CRC16 over word0, the id and the payload.
    pub crc16: u16,
    /// Record id.
    pub record_id: u32,
}

impl RecordHeader {
    /// Creates a header for a new record. The CRC is left unused.
    #[must_use]
    pub const fn new(key: RecordKey, length_words: u16, id: RecordId) -> Self {
        Self {
            record_type: key.record_type,
            length_words,
            instance: key.instance,
            crc16: CRC_UNUSED,
            record_id: id.as_u32(),
        }
    }

    /// Header that only carries a record id.
    ///
    /// Garbage collection leaves one behind when it drops the record with
    /// the highest id on flash, so a later mount does not hand that id out
    /// again. It reads as cleared with an empty payload.
    #[must_use]
    pub const fn id_marker(id: RecordId) -> Self {
        Self {
            record_type: TYPE_INVALID,
            length_words: 0,
            instance: INSTANCE_INVALID,
            crc16: CRC_UNUSED,
            record_id: id.as_u32(),
        }
    }

    /// Whether this is an [`RecordHeader::id_marker`]. Records always have a
    /// payload, so an empty cleared header can only be a marker.
    #[must_use]
    pub const fn is_id_marker(&self) -> bool {
        self.record_type == TYPE_INVALID && self.length_words == 0
    }

    /// Decodes a header from its three words.
    #[must_use]
    pub const fn from_words(words: [u32; 3]) -> Self {
        Self {
            record_type: (words[0] & 0xFFFF) as u16,
            length_words: (words[0] >> 16) as u16,
            instance: (words[1] & 0xFFFF) as u16,
            crc16: (words[1] >> 16) as u16,
            record_id: words[2],
        }
    }

    /// Encodes the header into its three words.
    #[must_use]
    pub const fn to_words(&self) -> [u32; 3] {
        [self.type_length_word(), self.instance_crc_word(), self.record_id]
    }

    /// First header word: type and length.
    #[must_use]
    pub const fn type_length_word(&self) -> u32 {
        self.record_type as u32 | (self.length_words as u32) << 16
    }

    /// Second header word: instance and CRC.
    #[must_use]
    pub const fn instance_crc_word(&self) -> u32 {
        self.instance as u32 | (self.crc16 as u32) << 16
    }

    /// First header word after the record has been cleared.
    #[must_use]
    pub const fn invalidated_word(&self) -> u32 {
        TYPE_INVALID as u32 | (self.length_words as u32) << 16
    }

    /// Whether the record is visible: neither cleared nor partially written.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.record_type != TYPE_INVALID && self.instance != INSTANCE_INVALID
    }

    /// Size of the record including its header, in words.
    #[must_use]
    pub const fn total_words(&self) -> u32 {
        HEADER_WORDS + self.length_words as u32
    }

    /// The record's key.
    #[must_use]
    pub const fn key(&self) -> RecordKey {
        RecordKey::new(self.record_type, self.instance)
    }

    /// The record's id.
    #[must_use]
    pub const fn id(&self) -> RecordId {
        RecordId::new(self.record_id)
    }

    /// Computes the CRC of this header combined with `payload`.
    #[must_use]
    pub fn compute_crc(&self, payload: &[u32]) -> u16 {
        let mut crc = Crc16::new();
        crc.update_word(self.type_length_word());
        crc.update_word(self.record_id);
        for &word in payload {
            crc.update_word(word);
        }
        crc.finish()
    }
}

/// Incremental CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF).
#[derive(Debug, Clone, Copy)]
pub struct Crc16(u16);

impl Crc16 {
    const TABLE: [u16; 256] = {
        let mut table = [0u16; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = (i as u16) << 8;
            let mut j = 0;
            while j < 8 {
                if crc & 0x8000 != 0 {
                    crc = (crc << 1) ^ 0x1021;
                } else {
                    crc <<= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    /// Starts a new checksum.
    #[must_use]
    pub const fn new() -> Self {
        Self(0xFFFF)
    }

    /// Feeds bytes.
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let index = ((self.0 >> 8) ^ u16::from(byte)) & 0xFF;
            self.0 = (self.0 << 8) ^ Self::TABLE[index as usize];
        }
    }

    /// Feeds one word in its little-endian flash representation.
    pub fn update_word(&mut self, word: u32) {
        self.update(&word.to_le_bytes());
    }

    /// Returns the checksum.
    #[must_use]
    pub const fn finish(self) -> u16 {
        self.0
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes CRC-16/CCITT-FALSE over `data`.
#[must_use]
pub fn compute_crc16(data: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    crc.update(data);
    crc.finish()
}

/// Converts word-aligned bytes to little-endian words.
pub(crate) fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Converts words to their little-endian byte representation.
pub(crate) fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_check_value() {
        // Standard check value for CRC-16/CCITT-FALSE.
        assert_eq!(compute_crc16(b"123456789"), 0x29B1);
        assert_eq!(compute_crc16(b""), 0xFFFF);
    }

    #[test]
    fn header_word_layout() {
        let header = RecordHeader {
            record_type: 0x0005,
            length_words: 0x0008,
            instance: 0x0007,
            crc16: 0xBEEF,
            record_id: 42,
        };
        assert_eq!(header.to_words(), [0x0008_0005, 0xBEEF_0007, 42]);
        assert_eq!(RecordHeader::from_words(header.to_words()), header);
        assert_eq!(header.total_words(), 11);
    }

    #[test]
    fn validity_rules() {
        let header = RecordHeader::new(RecordKey::new(1, 1), 2, RecordId::new(1));
        assert!(header.is_valid());

        let cleared = RecordHeader::from_words([header.invalidated_word(), header.to_words()[1], 1]);
        assert!(!cleared.is_valid());
        assert_eq!(cleared.length_words, 2);

        // Instance/CRC word not yet written.
        let partial = RecordHeader::from_words([header.to_words()[0], ID_UNWRITTEN, 1]);
        assert!(!partial.is_valid());
    }

    #[test]
    fn id_marker_layout() {
        let marker = RecordHeader::id_marker(RecordId::new(17));
        assert_eq!(marker.to_words(), [0, 0xFFFF_FFFF, 17]);
        assert!(marker.is_id_marker());
        assert!(!marker.is_valid());
        assert_eq!(marker.total_words(), HEADER_WORDS);

        let cleared = RecordHeader::new(RecordKey::new(3, 3), 1, RecordId::new(2));
        let cleared = RecordHeader::from_words([cleared.invalidated_word(), 3, 2]);
        assert!(!cleared.is_id_marker());
    }

    #[test]
    fn invalidation_only_clears_bits() {
        let header = RecordHeader::new(RecordKey::new(0xFFFF, 3), 0x1234, RecordId::new(9));
        let word = header.type_length_word();
        assert_eq!(header.invalidated_word() & !word, 0);
    }

    #[test]
    fn tags_decode() {
        assert_eq!(PageTag::decode(PageTag::valid_words()), PageTag::Valid);
        assert_eq!(PageTag::decode(PageTag::swap_words()), PageTag::Swap);
        assert_eq!(PageTag::decode([0xFFFF_FFFF; 2]), PageTag::Undefined);
        assert_eq!(PageTag::decode([PAGE_TAG_MAGIC, 0]), PageTag::Undefined);
        // Promotion rewrites only the second word and only clears bits.
        assert_eq!(PAGE_TAG_VALID & !PAGE_TAG_SWAP, 0);
    }

    #[test]
    fn crc_covers_payload_and_id() {
        let header = RecordHeader::new(RecordKey::new(5, 7), 2, RecordId::new(1));
        let a = header.compute_crc(&[1, 2]);
        assert_ne!(a, header.compute_crc(&[1, 3]));

        let other = RecordHeader::new(RecordKey::new(5, 7), 2, RecordId::new(2));
        assert_ne!(a, other.compute_crc(&[1, 2]));
    }

    #[test]
    fn word_byte_conversion() {
        let words = bytes_to_words(&[1, 0, 0, 0, 0xFF, 0xEE, 0xDD, 0xCC]);
        assert_eq!(words, vec![1, 0xCCDD_EEFF]);
        assert_eq!(words_to_bytes(&words), vec![1, 0, 0, 0, 0xFF, 0xEE, 0xDD, 0xCC]);
    }
}
