//! Destination file I/O for the byte loop.
//!
//! The destination is opened for random access without truncation so a
//! resumed run writes past the bytes a previous run already stored.

mod writer;

pub use writer::StorageWriter;
