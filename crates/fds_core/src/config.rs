//! Store configuration.

use crate::error::{StoreError, StoreResult};
use crate::record::{HEADER_WORDS, PAGE_TAG_WORDS};
use fds_flash::FlashGeometry;

/// Configuration for a [`crate::FlashStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of virtual pages, including the swap page.
    pub virtual_pages: u32,

    /// Size of a virtual page in words. Must be a multiple of the physical page size.
    pub virtual_page_words: u32,

    /// Number of command slots.
    pub command_queue_size: usize,

    /// Number of chunk slots shared by all queued writes.
    pub chunk_queue_size: usize,

    /// Maximum number of registered subscribers.
    pub max_users: usize,

    /// Whether records carry a CRC16 that is verified on open.
    pub crc_check: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            virtual_pages: 3,
            virtual_page_words: 1024, // 4 KiB
            command_queue_size: 4,
            chunk_queue_size: 8,
            max_users: 8,
            crc_check: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of virtual pages.
    #[must_use]
    pub const fn virtual_pages(mut self, pages: u32) -> Self {
        self.virtual_pages = pages;
        self
    }

    /// Sets the virtual page size in words.
    #[must_use]
    pub const fn virtual_page_words(mut self, words: u32) -> Self {
        self.virtual_page_words = words;
        self
    }

    /// Sets the command queue size.
    #[must_use]
    pub const fn command_queue_size(mut self, size: usize) -> Self {
        self.command_queue_size = size;
        self
    }

    /// Sets the chunk queue size.
    #[must_use]
    pub const fn chunk_queue_size(mut self, size: usize) -> Self {
        self.chunk_queue_size = size;
        self
    }

    /// Sets the maximum number of subscribers.
    #[must_use]
    pub const fn max_users(mut self, users: usize) -> Self {
        self.max_users = users;
        self
    }

    /// Enables or disables record CRCs.
    #[must_use]
    pub const fn crc_check(mut self, enabled: bool) -> Self {
        self.crc_check = enabled;
        self
    }

    /// Largest record payload that fits in one page, in words.
    #[must_use]
    pub const fn max_record_words(&self) -> u32 {
        self.virtual_page_words
            .saturating_sub(PAGE_TAG_WORDS + HEADER_WORDS)
    }

    /// Checks the configuration against the flash geometry.
    ///
    /// Returns the number of physical pages per virtual page.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidParameter`] describing the first problem.
    pub fn validate(&self, geometry: &FlashGeometry) -> StoreResult<u32> {
        if geometry.page_words == 0 {
            return Err(StoreError::InvalidParameter("flash page size is zero"));
        }
        if self.virtual_page_words == 0 || self.virtual_page_words % geometry.page_words != 0 {
            return Err(StoreError::InvalidParameter(
                "virtual page size must be a multiple of the flash page size",
            ));
        }
        if self.virtual_page_words <= PAGE_TAG_WORDS + HEADER_WORDS {
            return Err(StoreError::InvalidParameter("virtual page too small"));
        }
        if u64::from(self.virtual_page_words) * u64::from(self.virtual_pages)
            > u64::from(geometry.total_words())
        {
            return Err(StoreError::InvalidParameter(
                "virtual pages exceed the flash region",
            ));
        }
        if self.command_queue_size == 0 || self.chunk_queue_size == 0 {
            return Err(StoreError::InvalidParameter("queue size is zero"));
        }
        Ok(self.virtual_page_words / geometry.page_words)
    }
}
