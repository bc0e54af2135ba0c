//! Byte-range opcodes: buffers, concatenation and slicing.

use super::JumpTable;
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

pub(super) fn register(table: &mut JumpTable) {
    use OpCode::*;
    table.set(NEWBUFFER, execute_newbuffer);
    table.set(MEMCPY, execute_memcpy);
    table.set(CAT, execute_cat);
    table.set(SUBSTR, execute_substr);
    table.set(LEFT, execute_left);
    table.set(RIGHT, execute_right);
}

fn execute_newbuffer(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let size = engine.pop_index()?;
    if size > engine.limits().max_item_size {
        return Err(VmError::ItemTooLarge {
            limit: engine.limits().max_item_size,
        });
    }
    engine.push(StackItem::buffer(vec![0u8; size]))
}

fn execute_memcpy(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let count = engine.pop_index()?;
    let src_index = engine.pop_index()?;
    let src = engine.pop_bytes()?;
    let dst_index = engine.pop_index()?;
    let dst = engine.pop()?.as_buffer()?;
    if src_index + count > src.len() {
        return Err(VmError::out_of_range(format!(
            "source range {src_index}+{count} of {}",
            src.len()
        )));
    }
    let mut dst = dst.borrow_mut();
    if dst_index + count > dst.len() {
        return Err(VmError::out_of_range(format!(
            "destination range {dst_index}+{count} of {}",
            dst.len()
        )));
    }
    dst[dst_index..dst_index + count].copy_from_slice(&src[src_index..src_index + count]);
    Ok(())
}

fn execute_cat(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let b = engine.pop_bytes()?;
    let a = engine.pop_bytes()?;
    if a.len() + b.len() > engine.limits().max_item_size {
        return Err(VmError::ItemTooLarge {
            limit: engine.limits().max_item_size,
        });
    }
    let mut result = a;
    result.extend_from_slice(&b);
    engine.push(StackItem::buffer(result))
}

fn execute_substr(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let count = engine.pop_index()?;
    let index = engine.pop_index()?;
    let data = engine.pop_bytes()?;
    if index + count > data.len() {
        return Err(VmError::out_of_range(format!(
            "substring {index}+{count} of {}",
            data.len()
        )));
    }
    engine.push(StackItem::buffer(data[index..index + count].to_vec()))
}

fn execute_left(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let count = engine.pop_index()?;
    let data = engine.pop_bytes()?;
    if count > data.len() {
        return Err(VmError::out_of_range(format!(
            "left {count} of {}",
            data.len()
        )));
    }
    engine.push(StackItem::buffer(data[..count].to_vec()))
}

fn execute_right(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let count = engine.pop_index()?;
    let data = engine.pop_bytes()?;
    if count > data.len() {
        return Err(VmError::out_of_range(format!(
            "right {count} of {}",
            data.len()
        )));
    }
    engine.push(StackItem::buffer(data[data.len() - count..].to_vec()))
}

#[cfg(test)]
mod tests {
    use crate::{ExecutionEngine, OpCode, VMState};

    fn run(script: Vec<u8>) -> ExecutionEngine {
        let mut engine = ExecutionEngine::default();
        engine.load_script(script, -1, 0).unwrap();
        engine.execute();
        engine
    }

    #[test]
    fn cat_concatenates() {
        let engine = run(vec![
            OpCode::PUSHDATA1 as u8,
            2,
            b'a',
            b'b',
            OpCode::PUSHDATA1 as u8,
            1,
            b'c',
            OpCode::CAT as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        assert_eq!(engine.result_stack()[0].as_bytes().unwrap(), b"abc");
    }

    #[test]
    fn substr_left_right() {
        let engine = run(vec![
            OpCode::PUSHDATA1 as u8,
            4,
            b'n',
            b'e',
            b'o',
            b'3',
            OpCode::PUSH1 as u8,
            OpCode::PUSH2 as u8,
            OpCode::SUBSTR as u8,
        ]);
        assert_eq!(engine.result_stack()[0].as_bytes().unwrap(), b"eo");

        let engine = run(vec![
            OpCode::PUSHDATA1 as u8,
            3,
            b'a',
            b'b',
            b'c',
            OpCode::PUSH2 as u8,
            OpCode::RIGHT as u8,
        ]);
        assert_eq!(engine.result_stack()[0].as_bytes().unwrap(), b"bc");
    }

    #[test]
    fn substr_past_end_faults() {
        let engine = run(vec![
            OpCode::PUSHDATA1 as u8,
            2,
            b'a',
            b'b',
            OpCode::PUSH2 as u8,
            OpCode::PUSH2 as u8,
            OpCode::SUBSTR as u8,
        ]);
        assert_eq!(engine.state(), VMState::Fault);
    }

    #[test]
    fn memcpy_into_buffer() {
        // NEWBUFFER 3; (buffer) DUP; 0; "ab"; 0; 2; MEMCPY
        let engine = run(vec![
            OpCode::PUSH3 as u8,
            OpCode::NEWBUFFER as u8,
            OpCode::DUP as u8,
            OpCode::PUSH0 as u8,
            OpCode::PUSHDATA1 as u8,
            2,
            b'a',
            b'b',
            OpCode::PUSH0 as u8,
            OpCode::PUSH2 as u8,
            OpCode::MEMCPY as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        assert_eq!(
            engine.result_stack()[0].as_bytes().unwrap(),
            vec![b'a', b'b', 0]
        );
    }
}
