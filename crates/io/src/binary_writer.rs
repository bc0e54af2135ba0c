//! Growable binary writer producing the project's wire encoding.

use crate::error::IoResult;
use bytes::{BufMut, BytesMut};

/// Serializes primitives and var-length values into an in-memory buffer.
#[derive(Default)]
pub struct BinaryWriter {
    buffer: BytesMut,
}

impl BinaryWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Creates a writer with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes the writer and returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    /// Returns a copy of the written bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    pub fn write_u8(&mut self, value: u8) -> IoResult<()> {
        self.buffer.put_u8(value);
        Ok(())
    }

    pub fn write_i8(&mut self, value: i8) -> IoResult<()> {
        self.write_u8(value as u8)
    }

    pub fn write_bool(&mut self, value: bool) -> IoResult<()> {
        self.write_u8(u8::from(value))
    }

    pub fn write_u16(&mut self, value: u16) -> IoResult<()> {
        self.buffer.put_u16_le(value);
        Ok(())
    }

    pub fn write_i16(&mut self, value: i16) -> IoResult<()> {
        self.buffer.put_i16_le(value);
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> IoResult<()> {
        self.buffer.put_u32_le(value);
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> IoResult<()> {
        self.buffer.put_i32_le(value);
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> IoResult<()> {
        self.buffer.put_u64_le(value);
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> IoResult<()> {
        self.buffer.put_i64_le(value);
        Ok(())
    }

    /// Writes raw bytes with no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> IoResult<()> {
        self.buffer.put_slice(bytes);
        Ok(())
    }

    /// Writes a var-int length value.
    pub fn write_var_int(&mut self, value: u64) -> IoResult<()> {
        if value < 0xFD {
            self.write_u8(value as u8)
        } else if value <= 0xFFFF {
            self.write_u8(0xFD)?;
            self.write_u16(value as u16)
        } else if value <= 0xFFFF_FFFF {
            self.write_u8(0xFE)?;
            self.write_u32(value as u32)
        } else {
            self.write_u8(0xFF)?;
            self.write_u64(value)
        }
    }

    /// Writes a var-int length prefix followed by the bytes.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) -> IoResult<()> {
        self.write_var_int(bytes.len() as u64)?;
        self.write_bytes(bytes)
    }

    /// Writes a UTF-8 string under a var-bytes encoding.
    pub fn write_var_string(&mut self, value: &str) -> IoResult<()> {
        self.write_var_bytes(value.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryReader;

    #[test]
    fn round_trips_primitives() {
        let mut writer = BinaryWriter::new();
        writer.write_u8(0xAB).unwrap();
        writer.write_u32(0xDEADBEEF).unwrap();
        writer.write_i64(-42).unwrap();
        writer.write_bool(true).unwrap();

        let mut reader = MemoryReader::new(&writer.into_bytes());
        assert_eq!(reader.read_u8().unwrap(), 0xAB);
        assert_eq!(reader.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(reader.read_i64().unwrap(), -42);
        assert!(reader.read_bool().unwrap());
    }

    #[test]
    fn var_int_sizes_match_thresholds() {
        for (value, expected) in [
            (0u64, 1usize),
            (0xFC, 1),
            (0xFD, 3),
            (0xFFFF, 3),
            (0x1_0000, 5),
            (0xFFFF_FFFF, 5),
            (0x1_0000_0000, 9),
        ] {
            let mut writer = BinaryWriter::new();
            writer.write_var_int(value).unwrap();
            assert_eq!(writer.len(), expected, "size for {value:#x}");
        }
    }

    #[test]
    fn var_string_round_trip() {
        let mut writer = BinaryWriter::new();
        writer.write_var_string("hello neo").unwrap();
        let mut reader = MemoryReader::new(&writer.into_bytes());
        assert_eq!(reader.read_var_string(256).unwrap(), "hello neo");
    }
}
