//! Evaluation-stack manipulation opcodes.

use super::JumpTable;
use crate::execution_engine::ExecutionEngine;
use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use crate::VmResult;

pub(super) fn register(table: &mut JumpTable) {
    use OpCode::*;
    table.set(DEPTH, |engine, _| {
        let depth = engine.current_context()?.evaluation_stack.borrow().len();
        engine.push(StackItem::from_int(depth as i64))
    });
    table.set(DROP, |engine, _| engine.pop().map(|_| ()));
    table.set(NIP, |engine, _| {
        with_stack(engine, |stack| stack.remove(1).map(|_| ()))
    });
    table.set(XDROP, |engine, _| {
        let n = engine.pop_index()?;
        with_stack(engine, |stack| stack.remove(n).map(|_| ()))
    });
    table.set(CLEAR, |engine, _| {
        with_stack(engine, |stack| {
            stack.clear();
            Ok(())
        })
    });
    table.set(DUP, |engine, _| {
        let top = engine.peek(0)?;
        engine.push(top)
    });
    table.set(OVER, |engine, _| {
        let item = engine.peek(1)?;
        engine.push(item)
    });
    table.set(PICK, |engine, _| {
        let n = engine.pop_index()?;
        let item = engine.peek(n)?;
        engine.push(item)
    });
    table.set(TUCK, |engine, _| {
        let top = engine.peek(0)?;
        with_stack(engine, |stack| stack.insert(2, top))
    });
    table.set(SWAP, |engine, _| {
        with_stack(engine, |stack| {
            let item = stack.remove(1)?;
            stack.push(item);
            Ok(())
        })
    });
    table.set(ROT, |engine, _| {
        with_stack(engine, |stack| {
            let item = stack.remove(2)?;
            stack.push(item);
            Ok(())
        })
    });
    table.set(ROLL, |engine, _| {
        let n = engine.pop_index()?;
        if n == 0 {
            return Ok(());
        }
        with_stack(engine, |stack| {
            let item = stack.remove(n)?;
            stack.push(item);
            Ok(())
        })
    });
    table.set(REVERSE3, |engine, _| {
        with_stack(engine, |stack| stack.reverse(3))
    });
    table.set(REVERSE4, |engine, _| {
        with_stack(engine, |stack| stack.reverse(4))
    });
    table.set(REVERSEN, |engine, _| {
        let n = engine.pop_index()?;
        with_stack(engine, |stack| stack.reverse(n))
    });
}

fn with_stack<F>(engine: &mut ExecutionEngine, f: F) -> VmResult<()>
where
    F: FnOnce(&mut crate::EvaluationStack) -> VmResult<()>,
{
    let context = engine.current_context()?;
    let stack = context.evaluation_stack.clone();
    let mut stack = stack.borrow_mut();
    f(&mut stack)
}

#[cfg(test)]
mod tests {
    use crate::{ExecutionEngine, OpCode, VMState};
    use num_bigint::BigInt;

    fn run_values(script: Vec<u8>) -> Vec<BigInt> {
        let mut engine = ExecutionEngine::default();
        engine.load_script(script, -1, 0).unwrap();
        assert_eq!(engine.execute(), VMState::Halt);
        engine
            .result_stack()
            .iter()
            .map(|item| item.as_int().unwrap())
            .collect()
    }

    #[test]
    fn depth_counts_items() {
        let values = run_values(vec![
            OpCode::PUSH1 as u8,
            OpCode::PUSH1 as u8,
            OpCode::DEPTH as u8,
        ]);
        assert_eq!(values, vec![1.into(), 1.into(), 2.into()]);
    }

    #[test]
    fn swap_rot_roll() {
        let values = run_values(vec![
            OpCode::PUSH1 as u8,
            OpCode::PUSH2 as u8,
            OpCode::SWAP as u8,
        ]);
        assert_eq!(values, vec![2.into(), 1.into()]);

        let values = run_values(vec![
            OpCode::PUSH1 as u8,
            OpCode::PUSH2 as u8,
            OpCode::PUSH3 as u8,
            OpCode::ROT as u8,
        ]);
        assert_eq!(values, vec![2.into(), 3.into(), 1.into()]);

        let values = run_values(vec![
            OpCode::PUSH1 as u8,
            OpCode::PUSH2 as u8,
            OpCode::PUSH3 as u8,
            OpCode::PUSH2 as u8,
            OpCode::ROLL as u8,
        ]);
        assert_eq!(values, vec![2.into(), 3.into(), 1.into()]);
    }

    #[test]
    fn tuck_inserts_below_second() {
        let values = run_values(vec![
            OpCode::PUSH1 as u8,
            OpCode::PUSH2 as u8,
            OpCode::TUCK as u8,
        ]);
        assert_eq!(values, vec![2.into(), 1.into(), 2.into()]);
    }

    #[test]
    fn xdrop_removes_nth() {
        let values = run_values(vec![
            OpCode::PUSH1 as u8,
            OpCode::PUSH2 as u8,
            OpCode::PUSH3 as u8,
            OpCode::PUSH2 as u8,
            OpCode::XDROP as u8,
        ]);
        assert_eq!(values, vec![2.into(), 3.into()]);
    }

    #[test]
    fn underflow_faults() {
        let mut engine = ExecutionEngine::default();
        engine
            .load_script(vec![OpCode::DROP as u8], -1, 0)
            .unwrap();
        assert_eq!(engine.execute(), VMState::Fault);
    }
}
