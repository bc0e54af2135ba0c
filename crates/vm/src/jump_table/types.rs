//! Type predicate and conversion opcodes.

use super::JumpTable;
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::stack_item::{StackItem, StackItemType};
use crate::{VmError, VmResult};

pub(super) fn register(table: &mut JumpTable) {
    use OpCode::*;
    table.set(ISNULL, |engine, _| {
        let item = engine.pop()?;
        engine.push(StackItem::from_bool(item.is_null()))
    });
    table.set(ISTYPE, execute_istype);
    table.set(CONVERT, execute_convert);
}

fn execute_istype(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = StackItemType::from_byte(instruction.operand_u8())?;
    if target == StackItemType::Any {
        return Err(VmError::invalid_script("ISTYPE with type Any"));
    }
    let item = engine.pop()?;
    engine.push(StackItem::from_bool(item.item_type() == target))
}

fn execute_convert(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = StackItemType::from_byte(instruction.operand_u8())?;
    if target == StackItemType::Any {
        return Err(VmError::invalid_script("CONVERT to type Any"));
    }
    let item = engine.pop()?;
    let converted = item.convert_to(target, engine.limits().max_item_size)?;
    engine.push(converted)
}

#[cfg(test)]
mod tests {
    use crate::{ExecutionEngine, OpCode, StackItemType, VMState};

    fn run(script: Vec<u8>) -> ExecutionEngine {
        let mut engine = ExecutionEngine::default();
        engine.load_script(script, -1, 0).unwrap();
        engine.execute();
        engine
    }

    #[test]
    fn isnull_detects_null() {
        let engine = run(vec![OpCode::PUSHNULL as u8, OpCode::ISNULL as u8]);
        assert!(engine.result_stack()[0].as_bool().unwrap());

        let engine = run(vec![OpCode::PUSH1 as u8, OpCode::ISNULL as u8]);
        assert!(!engine.result_stack()[0].as_bool().unwrap());
    }

    #[test]
    fn istype_checks_exact_type() {
        let engine = run(vec![
            OpCode::NEWARRAY0 as u8,
            OpCode::ISTYPE as u8,
            StackItemType::Array as u8,
        ]);
        assert!(engine.result_stack()[0].as_bool().unwrap());
    }

    #[test]
    fn convert_integer_to_bytes_and_back() {
        let engine = run(vec![
            OpCode::PUSH5 as u8,
            OpCode::CONVERT as u8,
            StackItemType::ByteString as u8,
            OpCode::CONVERT as u8,
            StackItemType::Integer as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        assert_eq!(engine.result_stack()[0].as_int().unwrap(), 5.into());
    }

    #[test]
    fn convert_to_any_is_invalid() {
        let engine = run(vec![OpCode::PUSH1 as u8, OpCode::CONVERT as u8, 0x00]);
        assert_eq!(engine.state(), VMState::Fault);
    }
}
