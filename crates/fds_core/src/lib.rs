//! # FDS Core
//!
//! Log-structured record store for NOR flash.
//!
//! This crate provides:
//! - Keyed, variable-length records written as whole words
//! - A queued, non-blocking command pipeline driven by flash completions
//! - Power-loss recovery at mount
//! - Copy-on-write garbage collection through a single swap page
//! - Completion events delivered to callbacks or channels
//!
//! ## Flash Layout
//!
//! The region is split into virtual pages. Each page starts with a two-word
//! tag marking it as data or swap. Records follow back to back:
//!
//! ```text
//! +-----------------+--------------------+----------+------------------+
//! | type | length   | instance | crc16   | id       | payload words... |
//! +-----------------+--------------------+----------+------------------+
//! ```
//!
//! A record is cleared by rewriting its first header word with type `0`.
//! Cleared records keep their space until garbage collection runs.
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use fds_core::{Config, FindToken, FlashStore, RecordKey, StoreEvent};
//! use fds_flash::{FlashGeometry, SimFlash};
//!
//! let flash = SimFlash::new(FlashGeometry::new(0, 128, 3));
//! let store = FlashStore::new(flash, Config::new().virtual_page_words(128)).unwrap();
//! let events = store.subscribe().unwrap();
//!
//! store.init().unwrap();
//! store.run_until_idle().unwrap();
//! assert!(matches!(events.try_recv(), Ok(StoreEvent::Init { result: Ok(_) })));
//!
//! let desc = store
//!     .write(RecordKey::new(1, 2), &[Bytes::from_static(b"abcd")])
//!     .unwrap();
//! store.run_until_idle().unwrap();
//!
//! store.clear(&desc).unwrap();
//! store.run_until_idle().unwrap();
//! assert!(store.find(1, 2, &mut FindToken::default()).is_err());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod config;
mod error;
mod events;
mod gc;
mod mount;
mod page;
mod policy;
mod processor;
mod queue;
mod record;
mod scan;
mod stats;
mod store;
mod types;

pub use bytes::Bytes;
pub use config::Config;
pub use error::{ReservedWriteError, StoreError, StoreResult};
pub use events::{EventHandler, EventKind, StoreEvent};
pub use mount::{survey, MountDecision, PageInfo, PageRole};
pub use policy::{DirtyThresholdGc, GcPolicy, ManualGc};
pub use record::{
    compute_crc16, Crc16, PageTag, RecordHeader, CRC_UNUSED, HEADER_WORDS, ID_UNWRITTEN,
    INSTANCE_INVALID, PAGE_TAG_MAGIC, PAGE_TAG_SWAP, PAGE_TAG_VALID, PAGE_TAG_WORDS,
    TYPE_INVALID,
};
pub use stats::StoreStat;
pub use store::FlashStore;
pub use types::{Descriptor, FindToken, RecordId, RecordKey, RecordView, ReserveToken};
