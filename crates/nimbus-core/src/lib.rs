//! Foundational low-level utilities shared across Nimbus crates.
//!
//! Provides the atomic snapshot-write helper used by the durable stores and
//! small wall-clock helpers used for temp-file naming and timestamps.

pub mod snapshot_io;
pub mod time_utils;

pub use snapshot_io::write_snapshot_atomic;
pub use time_utils::current_unix_timestamp;
