//! Error types for the record store.

use crate::types::ReserveToken;
use fds_flash::FlashError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
///
/// Argument and resource errors are returned synchronously by the API call
/// that detected them. Flash errors reach callers through the
/// [`crate::StoreEvent`] of the command that ran into them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store has not been initialized.
    #[error("store is not initialized")]
    NotInitialized,

    /// Initialization is already in progress.
    #[error("store is already initializing")]
    AlreadyInitializing,

    /// A record type or instance uses its reserved invalid value.
    #[error("record key uses a reserved value")]
    InvalidKeys,

    /// A chunk is not a whole number of words.
    #[error("chunk length is not word aligned")]
    Unaligned,

    /// A parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// A descriptor does not refer to a record this store can track.
    #[error("invalid record descriptor")]
    InvalidDescriptor,

    /// A required input is empty.
    #[error("missing parameter: {0}")]
    NullParameter(&'static str),

    /// No page has room for the record.
    #[error("no space in flash")]
    NoSpaceInFlash,

    /// The command or chunk queue is full. Retry later.
    #[error("no space in command queues")]
    NoSpaceInQueues,

    /// The record cannot fit in a single page.
    #[error("record of {words} words exceeds the page capacity of {max} words")]
    RecordTooLarge {
        /// Record size including its header, in words.
        words: u32,
        /// Largest record that fits in one page, in words.
        max: u32,
    },

    /// The record does not exist or has been cleared.
    #[error("record not found")]
    NotFound,

    /// Flash has no usable pages. Fatal until the flash region is reconfigured.
    #[error("no usable flash pages")]
    NoPages,

    /// The record's checksum does not match its content.
    #[error("record CRC check failed: stored {stored:#06x}, computed {computed:#06x}")]
    CrcCheckFailed {
        /// CRC stored in the header.
        stored: u16,
        /// CRC computed over the record.
        computed: u16,
    },

    /// A flash operation did not complete within its retry budget.
    #[error("flash operation timed out")]
    Timeout,

    /// The flash was transiently unavailable.
    #[error("flash busy")]
    Busy,

    /// Every subscriber slot is taken.
    #[error("subscriber limit of {0} reached")]
    UserLimitReached(usize),

    /// An unexpected flash driver error.
    #[error("flash error: {0}")]
    Flash(FlashError),

    /// Internal bookkeeping is inconsistent.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl From<FlashError> for StoreError {
    fn from(err: FlashError) -> Self {
        match err {
            FlashError::Timeout => Self::Timeout,
            FlashError::Busy => Self::Busy,
            other => Self::Flash(other),
        }
    }
}

impl StoreError {
    /// Returns whether the caller may retry the same call later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NoSpaceInQueues | Self::Busy | Self::Timeout)
    }
}

/// A rejected [`crate::FlashStore::write_reserved`] call.
///
/// The reservation is still held by the returned token: retry the write
/// with it or release it with [`crate::FlashStore::reserve_cancel`].
#[derive(Debug, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct ReservedWriteError {
    /// Why the write was rejected.
    pub error: StoreError,
    /// The token, still holding its reservation.
    pub token: ReserveToken,
}

impl ReservedWriteError {
    /// Splits the error into its cause and the token.
    #[must_use]
    pub fn into_parts(self) -> (StoreError, ReserveToken) {
        (self.error, self.token)
    }
}
