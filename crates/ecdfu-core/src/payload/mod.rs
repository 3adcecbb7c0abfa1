//! Payload handling module.
//!
//! Provides trimming, block planning and checksums for section payloads.

pub mod block;

pub use block::{BlockInfo, BlockIterator, elan_checksum, trim_trailing};
