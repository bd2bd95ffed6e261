//! Utility functions shared by the segment store and the translog.
//!
//! - [`encoding`] - varint/zigzag encoding, little-endian helpers and a
//!   bounds-checked [`ByteCursor`] for decoding mmap'ed files
//! - [`fsync`] helpers for atomic file replacement

pub mod encoding;
pub mod fsync;

pub use encoding::*;
pub use fsync::*;
