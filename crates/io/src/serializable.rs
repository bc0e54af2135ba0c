//! The [`Serializable`] trait and array helpers.

use crate::{BinaryWriter, IoResult, MemoryReader};

/// A value with a canonical binary encoding.
///
/// `size` must return exactly the number of bytes `serialize` produces; the
/// ledger relies on it for fee-per-byte and block-size accounting without
/// serializing twice.
pub trait Serializable {
    /// Serialized size in bytes.
    fn size(&self) -> usize;

    /// Writes the value to `writer`.
    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()>;

    /// Reads a value from `reader`.
    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self>
    where
        Self: Sized;
}

/// Convenience conversions between serializable values and byte vectors.
pub trait SerializableExt: Serializable {
    /// Serializes to a fresh byte vector.
    fn to_array(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize(&mut writer)
            .expect("in-memory serialization cannot fail");
        writer.into_bytes()
    }

    /// Deserializes from a byte slice, requiring it to be fully consumed.
    fn from_array(data: &[u8]) -> IoResult<Self>
    where
        Self: Sized,
    {
        let mut reader = MemoryReader::new(data);
        let value = Self::deserialize(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(crate::IoError::invalid_format(format!(
                "{} trailing bytes after value",
                reader.remaining()
            )));
        }
        Ok(value)
    }
}

impl<T: Serializable> SerializableExt for T {}

/// Array helpers shared by ledger and consensus encodings.
pub mod helper {
    use super::Serializable;
    use crate::{BinaryWriter, IoResult, MemoryReader};

    /// Writes `var_int(count)` followed by each item.
    pub fn serialize_array<T: Serializable>(
        items: &[T],
        writer: &mut BinaryWriter,
    ) -> IoResult<()> {
        writer.write_var_int(items.len() as u64)?;
        for item in items {
            item.serialize(writer)?;
        }
        Ok(())
    }

    /// Reads an array, rejecting counts above `max`.
    pub fn deserialize_array<T: Serializable>(
        reader: &mut MemoryReader,
        max: usize,
    ) -> IoResult<Vec<T>> {
        let count = reader.read_var_int(max as u64)? as usize;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(T::deserialize(reader)?);
        }
        Ok(items)
    }

    /// Serialized size of an array including its count prefix.
    pub fn array_size<T: Serializable>(items: &[T]) -> usize {
        var_int_size(items.len() as u64) + items.iter().map(Serializable::size).sum::<usize>()
    }

    /// Serialized size of a var-int.
    pub fn var_int_size(value: u64) -> usize {
        match value {
            v if v < 0xFD => 1,
            v if v <= 0xFFFF => 3,
            v if v <= 0xFFFF_FFFF => 5,
            _ => 9,
        }
    }

    /// Serialized size of a var-bytes value including its prefix.
    pub fn var_bytes_size(bytes: &[u8]) -> usize {
        var_int_size(bytes.len() as u64) + bytes.len()
    }
}
