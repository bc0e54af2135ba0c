//! Opcode dispatch table.
//!
//! A fixed 256-entry array maps opcode bytes to handlers. Handlers pop
//! their inputs, compute, push outputs and may redirect the instruction
//! pointer; the engine advances the pointer past the instruction before
//! dispatching, so control-flow handlers simply overwrite it.

pub mod bitwise;
pub mod compound;
pub mod control;
pub mod numeric;
pub mod push;
pub mod slot;
pub mod splice;
pub mod stack;
pub mod types;

use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::{VmError, VmResult};

/// An instruction handler.
pub type Handler = fn(&mut ExecutionEngine, &Instruction) -> VmResult<()>;

/// The dispatch table.
pub struct JumpTable {
    handlers: [Option<Handler>; 256],
}

impl JumpTable {
    /// An empty table; every dispatch faults.
    pub fn new() -> Self {
        Self {
            handlers: [None; 256],
        }
    }

    /// The standard table with every defined opcode registered.
    pub fn default_table() -> Self {
        let mut table = Self::new();
        push::register(&mut table);
        control::register(&mut table);
        stack::register(&mut table);
        slot::register(&mut table);
        splice::register(&mut table);
        bitwise::register(&mut table);
        numeric::register(&mut table);
        compound::register(&mut table);
        types::register(&mut table);
        table
    }

    pub fn set(&mut self, opcode: OpCode, handler: Handler) {
        self.handlers[opcode as usize] = Some(handler);
    }

    /// Looks up the handler for `opcode`.
    pub fn handler(&self, opcode: OpCode) -> VmResult<Handler> {
        self.handlers[opcode as usize].ok_or(VmError::InvalidOpCode {
            opcode: opcode as u8,
        })
    }
}

impl Default for JumpTable {
    fn default() -> Self {
        Self::default_table()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_defined_opcode_has_a_handler() {
        let table = JumpTable::default_table();
        for byte in 0u8..=0xFF {
            if let Ok(opcode) = OpCode::from_byte(byte) {
                assert!(
                    table.handler(opcode).is_ok(),
                    "no handler for {opcode}"
                );
            }
        }
    }
}
