//! Binary serialization primitives.
//!
//! Everything structured that crosses the wire or lands on disk goes through
//! this crate: fixed-width little-endian integers, var-int length prefixes,
//! and the [`Serializable`] trait implemented by ledger and consensus types.

mod binary_writer;
mod error;
mod memory_reader;
mod serializable;

pub use binary_writer::BinaryWriter;
pub use error::{IoError, IoResult};
pub use memory_reader::MemoryReader;
pub use serializable::{helper, Serializable, SerializableExt};
