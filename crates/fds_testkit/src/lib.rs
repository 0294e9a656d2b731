//! # FDS Testkit
//!
//! Test utilities for the FDS record store.
//!
//! This crate provides:
//! - Mounted stores over simulated and file-backed flash
//! - Property-based generators for keys, payloads and command sequences
//! - A reference model that mirrors acknowledged store state
//! - A power-loss harness that cuts power after every flash operation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fds_testkit::prelude::*;
//!
//! #[test]
//! fn survives_power_loss() {
//!     let harness = CrashHarness::new(64, vec![Op::Gc]);
//!     for report in harness.run_all() {
//!         assert!(report.passed(), "{}", report.to_json());
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod model;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use model::*;
