//! Flash driver trait definition.

use crate::error::{FlashError, FlashResult};

/// Size of a flash word in bytes.
pub const WORD_SIZE: u32 = 4;

/// Value of a word after erase.
pub const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Physical layout of a driver's flash region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashGeometry {
    /// Byte address of the first page.
    pub base_address: u32,
    /// Size of one physical page in words.
    pub page_words: u32,
    /// Number of physical pages in the region.
    pub page_count: u32,
}

impl FlashGeometry {
    /// Creates a new geometry.
    #[must_use]
    pub const fn new(base_address: u32, page_words: u32, page_count: u32) -> Self {
        Self {
            base_address,
            page_words,
            page_count,
        }
    }

    /// Size of one physical page in bytes.
    #[must_use]
    pub const fn page_bytes(&self) -> u32 {
        self.page_words * WORD_SIZE
    }

    /// Total number of words in the region.
    #[must_use]
    pub const fn total_words(&self) -> u32 {
        self.page_words * self.page_count
    }

    /// Total size of the region in bytes.
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.total_words() as u64 * WORD_SIZE as u64
    }

    /// Converts a byte address into a word index relative to the region start.
    ///
    /// # Errors
    ///
    /// Fails if the address is unaligned or the access of `len_words` words
    /// does not fit inside the region.
    pub fn word_index(&self, address: u32, len_words: usize) -> FlashResult<usize> {
        if address % WORD_SIZE != 0 {
            return Err(FlashError::Unaligned { address });
        }
        let out_of_bounds = FlashError::OutOfBounds { address, len_words };
        let rel = address
            .checked_sub(self.base_address)
            .ok_or_else(|| out_of_bounds.clone())?;
        let index = (rel / WORD_SIZE) as usize;
        let end = index.checked_add(len_words).ok_or_else(|| out_of_bounds.clone())?;
        if end > self.total_words() as usize {
            return Err(out_of_bounds);
        }
        Ok(index)
    }

    /// Validates an erase request and returns the word range it covers.
    ///
    /// # Errors
    ///
    /// Fails if the address is not page aligned or the pages do not fit.
    pub fn erase_range(&self, address: u32, pages: u32) -> FlashResult<std::ops::Range<usize>> {
        let len_words = (pages * self.page_words) as usize;
        let start = self.word_index(address, len_words)?;
        if start % self.page_words as usize != 0 {
            return Err(FlashError::NotPageAligned { address });
        }
        Ok(start..start + len_words)
    }
}

/// A flash operation accepted by a driver and not yet completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashOp {
    /// Store words starting at a byte address.
    Write {
        /// Destination byte address.
        address: u32,
        /// Words to store.
        words: Vec<u32>,
    },
    /// Erase whole pages starting at a page-aligned byte address.
    Erase {
        /// First page byte address.
        address: u32,
        /// Number of physical pages.
        pages: u32,
    },
}

/// A low-level flash driver.
///
/// Drivers accept **one** write or erase at a time. `start_*` validates the
/// request and returns immediately; the outcome is reported by a later call to
/// [`FlashDriver::poll`]. Reads never wait.
///
/// # Invariants
///
/// - `poll` returns `Some` exactly once per accepted operation
/// - `start_*` while an operation is in flight fails with [`FlashError::Busy`]
/// - A completed write leaves `old & new` in each word (NOR semantics)
/// - A completed erase leaves every word of the pages at [`ERASED_WORD`]
///
/// # Implementors
///
/// - [`super::SimFlash`] - For testing
/// - [`super::FileFlash`] - For persistent images
/// - [`super::RetryFlash`] - Retry wrapper around another driver
pub trait FlashDriver: Send {
    /// Returns the layout of the flash region.
    fn geometry(&self) -> FlashGeometry;

    /// Reads `out.len()` words starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is unaligned or out of bounds.
    fn read(&self, address: u32, out: &mut [u32]) -> FlashResult<()>;

    /// Starts writing `words` at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if another operation is in flight or the request is invalid.
    fn start_write(&mut self, address: u32, words: &[u32]) -> FlashResult<()>;

    /// Starts erasing `pages` physical pages at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if another operation is in flight or the request is invalid.
    fn start_erase(&mut self, address: u32, pages: u32) -> FlashResult<()>;

    /// Returns the outcome of the in-flight operation once it has completed.
    fn poll(&mut self) -> Option<FlashResult<()>>;

    /// Returns whether an operation is in flight.
    fn is_busy(&self) -> bool;

    /// Reads a single word.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is unaligned or out of bounds.
    fn read_word(&self, address: u32) -> FlashResult<u32> {
        let mut word = [0u32; 1];
        self.read(address, &mut word)?;
        Ok(word[0])
    }
}

impl<T: FlashDriver + ?Sized> FlashDriver for Box<T> {
    fn geometry(&self) -> FlashGeometry {
        (**self).geometry()
    }

    fn read(&self, address: u32, out: &mut [u32]) -> FlashResult<()> {
        (**self).read(address, out)
    }

    fn start_write(&mut self, address: u32, words: &[u32]) -> FlashResult<()> {
        (**self).start_write(address, words)
    }

    fn start_erase(&mut self, address: u32, pages: u32) -> FlashResult<()> {
        (**self).start_erase(address, pages)
    }

    fn poll(&mut self) -> Option<FlashResult<()>> {
        (**self).poll()
    }

    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }
}

/// Checks that `words` only clear bits of `current`.
///
/// Returns the index of the first conflicting word.
pub(crate) fn first_conflict(current: &[u32], words: &[u32]) -> Option<usize> {
    current
        .iter()
        .zip(words)
        .position(|(&old, &new)| new & !old != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_sizes() {
        let geometry = FlashGeometry::new(0x1000, 256, 4);
        assert_eq!(geometry.page_bytes(), 1024);
        assert_eq!(geometry.total_words(), 1024);
        assert_eq!(geometry.total_bytes(), 4096);
    }

    #[test]
    fn word_index_checks_alignment_and_bounds() {
        let geometry = FlashGeometry::new(0x1000, 16, 2);
        assert_eq!(geometry.word_index(0x1000, 1).unwrap(), 0);
        assert_eq!(geometry.word_index(0x1004, 31).unwrap(), 1);
        assert!(matches!(
            geometry.word_index(0x1002, 1),
            Err(FlashError::Unaligned { .. })
        ));
        assert!(matches!(
            geometry.word_index(0x0FFC, 1),
            Err(FlashError::OutOfBounds { .. })
        ));
        assert!(matches!(
            geometry.word_index(0x1004, 32),
            Err(FlashError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn erase_range_requires_page_alignment() {
        let geometry = FlashGeometry::new(0, 16, 4);
        assert_eq!(geometry.erase_range(64, 2).unwrap(), 16..48);
        assert!(matches!(
            geometry.erase_range(4, 1),
            Err(FlashError::NotPageAligned { .. })
        ));
        assert!(geometry.erase_range(128, 2).is_err());
    }

    #[test]
    fn conflict_detection() {
        assert_eq!(first_conflict(&[0xFFFF_FFFF, 0x0F], &[0x1234, 0x0E]), None);
        assert_eq!(first_conflict(&[0xFFFF_FFFF, 0x0F], &[0x1234, 0x1F]), Some(1));
    }
}
