//! Shared helpers for the FDS benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
