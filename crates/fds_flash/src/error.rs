//! Error types for flash operations.

use thiserror::Error;

/// Result type for flash operations.
pub type FlashResult<T> = Result<T, FlashError>;

/// Errors that can occur during flash operations.
///
/// The type is `Clone` so that an operation's outcome can be handed to every
/// subscriber of the store that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlashError {
    /// Address or length is not a multiple of the word size.
    #[error("unaligned flash address {address:#010x}")]
    Unaligned {
        /// The offending byte address.
        address: u32,
    },

    /// Erase address is not the start of a physical page.
    #[error("address {address:#010x} is not page aligned")]
    NotPageAligned {
        /// The offending byte address.
        address: u32,
    },

    /// The access falls outside the driver's flash region.
    #[error("flash access out of bounds: address {address:#010x}, {len_words} words")]
    OutOfBounds {
        /// Start byte address of the access.
        address: u32,
        /// Length of the access in words.
        len_words: usize,
    },

    /// A write would set a bit that is currently cleared.
    #[error("word at {address:#010x} must be erased before it can be written")]
    NotErased {
        /// Byte address of the first conflicting word.
        address: u32,
    },

    /// Another operation is still in flight.
    #[error("flash busy: an operation is already in flight")]
    Busy,

    /// The operation was rejected or failed in hardware. Retryable.
    #[error("flash operation failed")]
    OperationFailed,

    /// The retry budget was exhausted.
    #[error("flash operation timed out")]
    Timeout,

    /// Power was lost; no further operation is applied.
    #[error("flash power lost")]
    PowerLost,

    /// The backing image has the wrong size for the configured geometry.
    #[error("flash image is {actual} bytes, geometry requires {expected}")]
    ImageSize {
        /// Required image size in bytes.
        expected: u64,
        /// Actual image size in bytes.
        actual: u64,
    },

    /// An I/O error from a file-backed driver.
    #[error("I/O error: {0}")]
    Io(String),
}

impl FlashError {
    /// Returns whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::OperationFailed)
    }
}

impl From<std::io::Error> for FlashError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
