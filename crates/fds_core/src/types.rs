//! Core type definitions for the record store.

use crate::record::{RecordHeader, INSTANCE_INVALID, TYPE_INVALID};
use std::fmt;

/// Unique identifier of a stored record version.
///
/// Record ids are monotonically increasing and never reused, including
/// across updates: an update produces a record with a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u32);

impl RecordId {
    /// Creates a record id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec:{}", self.0)
    }
}

/// Application key of a record: a type and an instance.
///
/// Keys are not unique; several records may share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    /// Record type. `0x0000` is reserved.
    pub record_type: u16,
    /// Record instance. `0xFFFF` is reserved.
    pub instance: u16,
}

impl RecordKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(record_type: u16, instance: u16) -> Self {
        Self {
            record_type,
            instance,
        }
    }

    /// Whether neither half uses its reserved value.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.record_type != TYPE_INVALID && self.instance != INSTANCE_INVALID
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}/{:#06x}", self.record_type, self.instance)
    }
}

/// Cached location of a record, valid for one GC generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CachedLocation {
    pub(crate) page: usize,
    pub(crate) offset: u32,
    pub(crate) generation: u32,
}

/// Handle to a specific record version.
///
/// A descriptor always identifies its record by id. It may additionally cache
/// the record's location; the cache is only trusted while no garbage
/// collection has completed since it was filled, otherwise the store scans
/// for the id again and refreshes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub(crate) record_id: RecordId,
    pub(crate) location: Option<CachedLocation>,
}

impl Descriptor {
    /// Creates a descriptor that knows only the record id.
    #[must_use]
    pub const fn from_id(record_id: RecordId) -> Self {
        Self {
            record_id,
            location: None,
        }
    }

    /// The record id.
    #[must_use]
    pub const fn record_id(&self) -> RecordId {
        self.record_id
    }

    /// Whether a location is cached.
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        self.location.is_some()
    }
}

/// Resumable cursor for key searches.
///
/// Start every search with [`FindToken::default`]. A token must not be reused
/// with a different key. When a search is exhausted the token is reset so it
/// can start over. A garbage collection between two calls moves records, so a
/// search spanning a collection may skip or repeat records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindToken {
    pub(crate) page: u32,
    pub(crate) offset: u32,
    pub(crate) magic: u32,
}

impl FindToken {
    pub(crate) const MAGIC: u32 = 0x0F1D_70CE;

    /// Creates a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the token is in its initial state.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.magic == 0
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Handle to flash space reserved with [`crate::FlashStore::reserve`].
///
/// The token is neither `Clone` nor `Copy`: it is consumed by exactly one
/// call to [`crate::FlashStore::write_reserved`] or
/// [`crate::FlashStore::reserve_cancel`]. A rejected `write_reserved` hands
/// the token back inside [`crate::ReservedWriteError`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ReserveToken {
    pub(crate) id: u32,
    pub(crate) length_words: u16,
}

impl ReserveToken {
    /// Reserved payload length in words.
    #[must_use]
    pub const fn length_words(&self) -> u16 {
        self.length_words
    }
}

/// A record read by [`crate::FlashStore::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordView {
    /// The record header.
    pub header: RecordHeader,
    /// The payload bytes, a whole number of words.
    pub data: Vec<u8>,
}

impl RecordView {
    /// The record key.
    #[must_use]
    pub const fn key(&self) -> RecordKey {
        self.header.key()
    }

    /// The record id.
    #[must_use]
    pub const fn record_id(&self) -> RecordId {
        self.header.id()
    }
}
