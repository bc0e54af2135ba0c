//! Bitwise logic and item equality opcodes.

use super::JumpTable;
use crate::op_code::OpCode;
use crate::stack_item::{check_int_size, StackItem};

pub(super) fn register(table: &mut JumpTable) {
    use OpCode::*;
    table.set(INVERT, |engine, _| {
        let value = engine.pop_int()?;
        engine.push(StackItem::Integer(!value))
    });
    table.set(AND, |engine, _| {
        let b = engine.pop_int()?;
        let a = engine.pop_int()?;
        engine.push(StackItem::Integer(a & b))
    });
    table.set(OR, |engine, _| {
        let b = engine.pop_int()?;
        let a = engine.pop_int()?;
        engine.push(StackItem::Integer(a | b))
    });
    table.set(XOR, |engine, _| {
        let b = engine.pop_int()?;
        let a = engine.pop_int()?;
        let result = a ^ b;
        check_int_size(&result, engine.limits().max_integer_size)?;
        engine.push(StackItem::Integer(result))
    });
    table.set(EQUAL, |engine, _| {
        let b = engine.pop()?;
        let a = engine.pop()?;
        let equal = a.equals(&b)?;
        engine.push(StackItem::from_bool(equal))
    });
    table.set(NOTEQUAL, |engine, _| {
        let b = engine.pop()?;
        let a = engine.pop()?;
        let equal = a.equals(&b)?;
        engine.push(StackItem::from_bool(!equal))
    });
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
    fn and_or_xor_invert() {
        let engine = run(vec![
            OpCode::PUSH6 as u8, // 0b110
            OpCode::PUSH5 as u8, // 0b101
            OpCode::AND as u8,
        ]);
        assert_eq!(engine.result_stack()[0].as_int().unwrap(), 4.into());

        let engine = run(vec![
            OpCode::PUSH6 as u8,
            OpCode::PUSH5 as u8,
            OpCode::XOR as u8,
        ]);
        assert_eq!(engine.result_stack()[0].as_int().unwrap(), 3.into());

        // Two's-complement NOT: ~5 == -6.
        let engine = run(vec![OpCode::PUSH5 as u8, OpCode::INVERT as u8]);
        assert_eq!(
            engine.result_stack()[0].as_int().unwrap(),
            BigInt::from(-6)
        );
    }

    #[test]
    fn equal_compares_byte_strings_by_value() {
        let engine = run(vec![
            OpCode::PUSHDATA1 as u8,
            2,
            1,
            2,
            OpCode::PUSHDATA1 as u8,
            2,
            1,
            2,
            OpCode::EQUAL as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        assert!(engine.result_stack()[0].as_bool().unwrap());
    }

    #[test]
    fn notequal_on_distinct_arrays() {
        let engine = run(vec![
            OpCode::NEWARRAY0 as u8,
            OpCode::NEWARRAY0 as u8,
            OpCode::NOTEQUAL as u8,
        ]);
        assert!(engine.result_stack()[0].as_bool().unwrap());
    }
}
