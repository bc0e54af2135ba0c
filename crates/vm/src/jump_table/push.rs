//! Constant-pushing opcodes.

use super::JumpTable;
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};
use std::rc::Rc;

pub(super) fn register(table: &mut JumpTable) {
    use OpCode::*;
    for opcode in [PUSHINT8, PUSHINT16, PUSHINT32, PUSHINT64, PUSHINT128, PUSHINT256] {
        table.set(opcode, push_int);
    }
    table.set(PUSHT, |engine, _| engine.push(StackItem::from_bool(true)));
    table.set(PUSHF, |engine, _| engine.push(StackItem::from_bool(false)));
    table.set(PUSHA, push_a);
    table.set(PUSHNULL, |engine, _| engine.push(StackItem::Null));
    for opcode in [PUSHDATA1, PUSHDATA2, PUSHDATA4] {
        table.set(opcode, push_data);
    }
    table.set(PUSHM1, push_small_int);
    for byte in (PUSH0 as u8)..=(PUSH16 as u8) {
        table.set(OpCode::from_byte(byte).expect("PUSH0..PUSH16 are defined"), push_small_int);
    }
}

fn push_int(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    engine.push(StackItem::Integer(instruction.operand_int()))
}

fn push_small_int(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let value = instruction.opcode as i32 - OpCode::PUSH0 as i32;
    engine.push(StackItem::from_int(value))
}

fn push_a(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let position = instruction.jump_target_i32()?;
    let script = Rc::clone(engine.current_context()?.script());
    if position >= script.len() {
        return Err(VmError::out_of_range(format!(
            "pointer target {position} outside script"
        )));
    }
    engine.push(StackItem::Pointer { script, position })
}

fn push_data(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    if instruction.operand.len() > engine.limits().max_item_size {
        return Err(VmError::ItemTooLarge {
            limit: engine.limits().max_item_size,
        });
    }
    engine.push(StackItem::from_bytes(instruction.operand.clone()))
}

#[cfg(test)]
mod tests {
    use crate::{ExecutionEngine, OpCode, VMState};
    use num_bigint::BigInt;

    fn run(script: Vec<u8>) -> ExecutionEngine {
        let mut engine = ExecutionEngine::default();
        engine.load_script(script, -1, 0).unwrap();
        engine.execute();
        engine
    }

    #[test]
    fn small_ints_cover_minus_one_to_sixteen() {
        let engine = run(vec![
            OpCode::PUSHM1 as u8,
            OpCode::PUSH0 as u8,
            OpCode::PUSH16 as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        let values: Vec<BigInt> = engine
            .result_stack()
            .iter()
            .map(|item| item.as_int().unwrap())
            .collect();
        assert_eq!(values, vec![(-1).into(), 0.into(), 16.into()]);
    }

    #[test]
    fn pushint_reads_signed_little_endian() {
        let engine = run(vec![OpCode::PUSHINT8 as u8, 0xFF]);
        assert_eq!(engine.result_stack()[0].as_int().unwrap(), (-1).into());
    }

    #[test]
    fn pushdata_pushes_byte_string() {
        let engine = run(vec![OpCode::PUSHDATA1 as u8, 2, 0xAA, 0xBB]);
        assert_eq!(
            engine.result_stack()[0].as_bytes().unwrap(),
            vec![0xAA, 0xBB]
        );
    }

    #[test]
    fn pusha_outside_script_faults() {
        let engine = run(vec![OpCode::PUSHA as u8, 0x40, 0, 0, 0]);
        assert_eq!(engine.state(), VMState::Fault);
    }
}
