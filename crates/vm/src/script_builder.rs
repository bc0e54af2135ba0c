//! Builder emitting well-formed scripts.
//!
//! Used by tests, the multisig contract constructors and the native
//! contract stubs.

use crate::op_code::OpCode;
use crate::{VmError, VmResult};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

/// Accumulates script bytes.
#[derive(Default)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length of the script being built.
    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    /// Finishes and returns the script bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.script.clone()
    }

    /// Emits a bare opcode.
    pub fn emit(&mut self, opcode: OpCode) -> &mut Self {
        self.script.push(opcode as u8);
        self
    }

    /// Emits an opcode with raw operand bytes.
    pub fn emit_with(&mut self, opcode: OpCode, operand: &[u8]) -> &mut Self {
        self.script.push(opcode as u8);
        self.script.extend_from_slice(operand);
        self
    }

    /// Emits the shortest push for an integer.
    pub fn emit_push_int(&mut self, value: impl Into<BigInt>) -> VmResult<&mut Self> {
        let value: BigInt = value.into();
        if let Some(small) = value.to_i64() {
            if (-1..=16).contains(&small) {
                let opcode = if small == -1 {
                    OpCode::PUSHM1
                } else {
                    OpCode::from_byte(OpCode::PUSH0 as u8 + small as u8)
                        .expect("PUSH0..PUSH16 are defined")
                };
                return Ok(self.emit(opcode));
            }
        }
        let bytes = value.to_signed_bytes_le();
        let (opcode, width) = match bytes.len() {
            0..=1 => (OpCode::PUSHINT8, 1),
            2 => (OpCode::PUSHINT16, 2),
            3..=4 => (OpCode::PUSHINT32, 4),
            5..=8 => (OpCode::PUSHINT64, 8),
            9..=16 => (OpCode::PUSHINT128, 16),
            17..=32 => (OpCode::PUSHINT256, 32),
            len => {
                return Err(VmError::out_of_range(format!("integer of {len} bytes")));
            }
        };
        let mut operand = bytes;
        // Sign-extend to the fixed operand width.
        let fill = if value.is_negative() { 0xFF } else { 0x00 };
        operand.resize(width, fill);
        Ok(self.emit_with(opcode, &operand))
    }

    /// Emits a boolean push.
    pub fn emit_push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(if value { OpCode::PUSHT } else { OpCode::PUSHF })
    }

    /// Emits a data push with the narrowest PUSHDATA form.
    pub fn emit_push_bytes(&mut self, data: &[u8]) -> VmResult<&mut Self> {
        match data.len() {
            len if len < 0x100 => {
                self.script.push(OpCode::PUSHDATA1 as u8);
                self.script.push(len as u8);
            }
            len if len < 0x1_0000 => {
                self.script.push(OpCode::PUSHDATA2 as u8);
                self.script.extend_from_slice(&(len as u16).to_le_bytes());
            }
            len if len <= u32::MAX as usize => {
                self.script.push(OpCode::PUSHDATA4 as u8);
                self.script.extend_from_slice(&(len as u32).to_le_bytes());
            }
            len => {
                return Err(VmError::out_of_range(format!("push of {len} bytes")));
            }
        }
        self.script.extend_from_slice(data);
        Ok(self)
    }

    /// Emits `PUSHNULL`.
    pub fn emit_push_null(&mut self) -> &mut Self {
        self.emit(OpCode::PUSHNULL)
    }

    /// Emits a `SYSCALL` with the given interop id.
    pub fn emit_syscall(&mut self, id: u32) -> &mut Self {
        self.emit_with(OpCode::SYSCALL, &id.to_le_bytes())
    }

    /// Emits a jump with a 4-byte offset.
    pub fn emit_jump(&mut self, opcode: OpCode, offset: i32) -> &mut Self {
        self.emit_with(opcode, &offset.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExecutionEngine, VMState};

    fn run(script: Vec<u8>) -> ExecutionEngine {
        let mut engine = ExecutionEngine::default();
        engine.load_script(script, -1, 0).unwrap();
        engine.execute();
        engine
    }

    #[test]
    fn small_ints_use_one_byte() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(5).unwrap();
        assert_eq!(builder.to_bytes(), vec![OpCode::PUSH5 as u8]);
    }

    #[test]
    fn negative_ints_sign_extend() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(-200).unwrap();
        let engine = run(builder.to_bytes());
        assert_eq!(engine.state(), VMState::Halt);
        assert_eq!(
            engine.result_stack()[0].as_int().unwrap(),
            BigInt::from(-200)
        );
    }

    #[test]
    fn large_int_round_trips_through_vm() {
        let value = BigInt::parse_bytes(b"123456789012345678901234567890", 10).unwrap();
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(value.clone()).unwrap();
        let engine = run(builder.to_bytes());
        assert_eq!(engine.result_stack()[0].as_int().unwrap(), value);
    }

    #[test]
    fn pushdata_width_tracks_payload() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_bytes(&[0xAB; 300]).unwrap();
        assert_eq!(builder.to_bytes()[0], OpCode::PUSHDATA2 as u8);
    }
}
