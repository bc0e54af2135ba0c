//! Instruction decoding.

use crate::op_code::{OpCode, OperandSize};
use crate::{VmError, VmResult};
use num_bigint::BigInt;

/// A decoded instruction: opcode plus immediate operand bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the opcode byte within the script.
    pub pointer: usize,
    pub opcode: OpCode,
    /// Immediate operand, excluding any length prefix.
    pub operand: Vec<u8>,
    /// Total encoded length: opcode, prefix and operand.
    size: usize,
}

impl Instruction {
    /// Decodes the instruction starting at `position` in `script`.
    pub fn parse(script: &[u8], position: usize) -> VmResult<Self> {
        let Some(&opcode_byte) = script.get(position) else {
            return Err(VmError::invalid_script(format!(
                "instruction pointer {position} out of bounds"
            )));
        };
        let opcode = OpCode::from_byte(opcode_byte)?;
        let operand_start = position + 1;
        let (operand, size) = match opcode.operand_size() {
            OperandSize::None => (Vec::new(), 1),
            OperandSize::Fixed(len) => {
                let end = operand_start + len;
                if end > script.len() {
                    return Err(VmError::invalid_script(format!(
                        "{opcode} operand truncated at {position}"
                    )));
                }
                (script[operand_start..end].to_vec(), 1 + len)
            }
            OperandSize::Prefixed(prefix_len) => {
                let data_start = operand_start + prefix_len;
                if data_start > script.len() {
                    return Err(VmError::invalid_script(format!(
                        "{opcode} length prefix truncated at {position}"
                    )));
                }
                let mut prefix = [0u8; 8];
                prefix[..prefix_len].copy_from_slice(&script[operand_start..data_start]);
                let len = u64::from_le_bytes(prefix) as usize;
                let end = data_start + len;
                if end > script.len() {
                    return Err(VmError::invalid_script(format!(
                        "{opcode} payload of {len} bytes truncated at {position}"
                    )));
                }
                (script[data_start..end].to_vec(), 1 + prefix_len + len)
            }
        };
        Ok(Self {
            pointer: position,
            opcode,
            operand,
            size,
        })
    }

    /// Total encoded length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Offset of the next instruction.
    pub fn next_position(&self) -> usize {
        self.pointer + self.size
    }

    // Operand accessors. Each asserts the operand width its opcode
    // guarantees, so the unwraps below cannot fire after `parse`.

    pub fn operand_u8(&self) -> u8 {
        self.operand[0]
    }

    pub fn operand_i8(&self) -> i8 {
        self.operand[0] as i8
    }

    pub fn operand_u16(&self) -> u16 {
        u16::from_le_bytes(self.operand[..2].try_into().expect("2-byte operand"))
    }

    pub fn operand_i32(&self) -> i32 {
        i32::from_le_bytes(self.operand[..4].try_into().expect("4-byte operand"))
    }

    pub fn operand_u32(&self) -> u32 {
        u32::from_le_bytes(self.operand[..4].try_into().expect("4-byte operand"))
    }

    /// Second 4-byte slot of an 8-byte operand (`TRY_L`).
    pub fn operand_second_i32(&self) -> i32 {
        i32::from_le_bytes(self.operand[4..8].try_into().expect("8-byte operand"))
    }

    /// The operand interpreted as a signed little-endian integer
    /// (`PUSHINT8` … `PUSHINT256`).
    pub fn operand_int(&self) -> BigInt {
        BigInt::from_signed_bytes_le(&self.operand)
    }

    /// Jump target for 1-byte offset opcodes, relative to this instruction.
    pub fn jump_target_i8(&self) -> VmResult<usize> {
        Self::checked_target(self.pointer, self.operand_i8() as i32)
    }

    /// Jump target for 4-byte offset opcodes, relative to this instruction.
    pub fn jump_target_i32(&self) -> VmResult<usize> {
        Self::checked_target(self.pointer, self.operand_i32())
    }

    fn checked_target(pointer: usize, offset: i32) -> VmResult<usize> {
        let target = pointer as i64 + offset as i64;
        usize::try_from(target)
            .map_err(|_| VmError::out_of_range(format!("jump target {target}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_no_operand() {
        let instruction = Instruction::parse(&[OpCode::ADD as u8], 0).unwrap();
        assert_eq!(instruction.opcode, OpCode::ADD);
        assert_eq!(instruction.size(), 1);
    }

    #[test]
    fn parses_fixed_operand() {
        let instruction = Instruction::parse(&[OpCode::PUSHINT16 as u8, 0x39, 0x05], 0).unwrap();
        assert_eq!(instruction.operand_int(), BigInt::from(0x0539));
        assert_eq!(instruction.size(), 3);
    }

    #[test]
    fn parses_prefixed_operand() {
        let script = [OpCode::PUSHDATA1 as u8, 3, b'a', b'b', b'c'];
        let instruction = Instruction::parse(&script, 0).unwrap();
        assert_eq!(instruction.operand, b"abc");
        assert_eq!(instruction.size(), 5);
    }

    #[test]
    fn truncated_operand_is_invalid() {
        assert!(Instruction::parse(&[OpCode::PUSHINT32 as u8, 1, 2], 0).is_err());
        assert!(Instruction::parse(&[OpCode::PUSHDATA1 as u8, 9, 1], 0).is_err());
    }

    #[test]
    fn negative_jump_target() {
        // JMP back to offset 2 from position 5.
        let script = [
            OpCode::NOP as u8,
            OpCode::NOP as u8,
            OpCode::NOP as u8,
            OpCode::NOP as u8,
            OpCode::NOP as u8,
            OpCode::JMP as u8,
            (-3i8) as u8,
        ];
        let instruction = Instruction::parse(&script, 5).unwrap();
        assert_eq!(instruction.jump_target_i8().unwrap(), 2);
    }
}
