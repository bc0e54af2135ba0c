//! Sequential reader over an in-memory byte slice.

use crate::error::{IoError, IoResult};

/// Reads little-endian primitives and var-length values from a byte buffer.
///
/// The reader owns a copy of the input so deserialized values never borrow
/// from network buffers.
pub struct MemoryReader {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryReader {
    /// Creates a reader over a copy of `data`.
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            pos: 0,
        }
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total length of the underlying data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the underlying data is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Moves the read position. Fails if `position` is past the end.
    pub fn set_position(&mut self, position: usize) -> IoResult<()> {
        if position > self.data.len() {
            return Err(IoError::invalid_operation(format!(
                "position {position} is out of bounds ({})",
                self.data.len()
            )));
        }
        self.pos = position;
        Ok(())
    }

    fn ensure(&self, count: usize) -> IoResult<()> {
        if self.pos + count > self.data.len() {
            return Err(IoError::EndOfStream {
                needed: self.pos + count - self.data.len(),
                position: self.pos,
            });
        }
        Ok(())
    }

    /// Returns the next byte without advancing.
    pub fn peek(&self) -> IoResult<u8> {
        self.ensure(1)?;
        Ok(self.data[self.pos])
    }

    pub fn read_u8(&mut self) -> IoResult<u8> {
        self.ensure(1)?;
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn read_i8(&mut self) -> IoResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a boolean encoded as a single `0x00`/`0x01` byte. Any other
    /// value is a malformed-input error.
    pub fn read_bool(&mut self) -> IoResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(IoError::invalid_format(format!(
                "invalid boolean byte {other:#04x}"
            ))),
        }
    }

    pub fn read_u16(&mut self) -> IoResult<u16> {
        Ok(u16::from_le_bytes(self.read_array::<2>()?))
    }

    pub fn read_i16(&mut self) -> IoResult<i16> {
        Ok(i16::from_le_bytes(self.read_array::<2>()?))
    }

    pub fn read_u32(&mut self) -> IoResult<u32> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    pub fn read_i32(&mut self) -> IoResult<i32> {
        Ok(i32::from_le_bytes(self.read_array::<4>()?))
    }

    pub fn read_u64(&mut self) -> IoResult<u64> {
        Ok(u64::from_le_bytes(self.read_array::<8>()?))
    }

    pub fn read_i64(&mut self) -> IoResult<i64> {
        Ok(i64::from_le_bytes(self.read_array::<8>()?))
    }

    /// Reads exactly `N` bytes into a fixed array.
    pub fn read_array<const N: usize>(&mut self) -> IoResult<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Reads exactly `count` bytes.
    pub fn read_bytes(&mut self, count: usize) -> IoResult<Vec<u8>> {
        self.ensure(count)?;
        let out = self.data[self.pos..self.pos + count].to_vec();
        self.pos += count;
        Ok(out)
    }

    /// Reads a var-int and fails if it exceeds `max`.
    ///
    /// Encoding: values below `0xFD` are a single byte; `0xFD` prefixes a
    /// u16, `0xFE` a u32, `0xFF` a u64, all little-endian.
    pub fn read_var_int(&mut self, max: u64) -> IoResult<u64> {
        let prefix = self.read_u8()?;
        let value = match prefix {
            0xFD => self.read_u16()? as u64,
            0xFE => self.read_u32()? as u64,
            0xFF => self.read_u64()?,
            b => b as u64,
        };
        if value > max {
            return Err(IoError::ExceedsLimit {
                what: "var-int",
                value,
                max,
            });
        }
        Ok(value)
    }

    /// Reads a var-int length prefix followed by that many bytes.
    pub fn read_var_bytes(&mut self, max: usize) -> IoResult<Vec<u8>> {
        let len = self.read_var_int(max as u64)? as usize;
        self.read_bytes(len)
    }

    /// Reads a UTF-8 string under a var-bytes encoding.
    pub fn read_var_string(&mut self, max: usize) -> IoResult<String> {
        let bytes = self.read_var_bytes(max)?;
        String::from_utf8(bytes)
            .map_err(|_| IoError::invalid_format("var-string is not valid UTF-8"))
    }
}
