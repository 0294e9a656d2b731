//! # FDS Flash
//!
//! Flash driver adapter trait and implementations for the FDS record store.
//!
//! This crate provides the lowest-level flash abstraction. Drivers are
//! **opaque word stores** with NOR semantics: they do not interpret page
//! tags, record headers or anything else the store writes.
//!
//! ## Design Principles
//!
//! - One operation in flight at a time; a second start reports [`FlashError::Busy`]
//! - Writes and erases complete asynchronously and are observed through [`FlashDriver::poll`]
//! - Reads are synchronous (NOR flash is memory mapped)
//! - A write may only clear bits; erase sets a whole page back to `0xFFFF_FFFF`
//!
//! ## Available Drivers
//!
//! - [`SimFlash`] - In-memory NOR flash with fault and power-loss injection
//! - [`FileFlash`] - Flash image persisted in a file
//! - [`RetryFlash`] - Wrapper that retries failed operations a fixed number of times
//!
//! ## Example
//!
//! ```rust
//! use fds_flash::{FlashDriver, FlashGeometry, SimFlash};
//!
//! let mut flash = SimFlash::new(FlashGeometry::new(0, 64, 4));
//! flash.start_write(0, &[0xDEAD_C0DE]).unwrap();
//! assert_eq!(flash.poll(), Some(Ok(())));
//! assert_eq!(flash.read_word(0).unwrap(), 0xDEAD_C0DE);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod file;
mod retry;
mod sim;

pub use driver::{FlashDriver, FlashGeometry, FlashOp, ERASED_WORD, WORD_SIZE};
pub use error::{FlashError, FlashResult};
pub use file::FileFlash;
pub use retry::RetryFlash;
pub use sim::{FaultPlan, SimFlash};
