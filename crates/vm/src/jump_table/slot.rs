//! Static, local and argument slot opcodes.

use super::JumpTable;
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::slot::Slot;
use crate::{VmError, VmResult};
use std::cell::RefCell;
use std::rc::Rc;

pub(super) fn register(table: &mut JumpTable) {
    use OpCode::*;
    table.set(INITSSLOT, init_static_slot);
    table.set(INITSLOT, init_slot);

    for opcode in [LDSFLD0, LDSFLD1, LDSFLD2, LDSFLD3, LDSFLD4, LDSFLD5, LDSFLD6] {
        table.set(opcode, load_static_fixed);
    }
    table.set(LDSFLD, |engine, instruction| {
        load_static(engine, instruction.operand_u8() as usize)
    });
    for opcode in [STSFLD0, STSFLD1, STSFLD2, STSFLD3, STSFLD4, STSFLD5, STSFLD6] {
        table.set(opcode, store_static_fixed);
    }
    table.set(STSFLD, |engine, instruction| {
        store_static(engine, instruction.operand_u8() as usize)
    });

    for opcode in [LDLOC0, LDLOC1, LDLOC2, LDLOC3, LDLOC4, LDLOC5, LDLOC6] {
        table.set(opcode, load_local_fixed);
    }
    table.set(LDLOC, |engine, instruction| {
        load_local(engine, instruction.operand_u8() as usize)
    });
    for opcode in [STLOC0, STLOC1, STLOC2, STLOC3, STLOC4, STLOC5, STLOC6] {
        table.set(opcode, store_local_fixed);
    }
    table.set(STLOC, |engine, instruction| {
        store_local(engine, instruction.operand_u8() as usize)
    });

    for opcode in [LDARG0, LDARG1, LDARG2, LDARG3, LDARG4, LDARG5, LDARG6] {
        table.set(opcode, load_argument_fixed);
    }
    table.set(LDARG, |engine, instruction| {
        load_argument(engine, instruction.operand_u8() as usize)
    });
    for opcode in [STARG0, STARG1, STARG2, STARG3, STARG4, STARG5, STARG6] {
        table.set(opcode, store_argument_fixed);
    }
    table.set(STARG, |engine, instruction| {
        store_argument(engine, instruction.operand_u8() as usize)
    });
}

// The xxx0..xxx6 opcodes encode their slot index in the opcode byte.

fn load_static_fixed(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    load_static(
        engine,
        instruction.opcode as usize - OpCode::LDSFLD0 as usize,
    )
}

fn store_static_fixed(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    store_static(
        engine,
        instruction.opcode as usize - OpCode::STSFLD0 as usize,
    )
}

fn load_local_fixed(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    load_local(engine, instruction.opcode as usize - OpCode::LDLOC0 as usize)
}

fn store_local_fixed(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    store_local(engine, instruction.opcode as usize - OpCode::STLOC0 as usize)
}

fn load_argument_fixed(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    load_argument(engine, instruction.opcode as usize - OpCode::LDARG0 as usize)
}

fn store_argument_fixed(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    store_argument(engine, instruction.opcode as usize - OpCode::STARG0 as usize)
}

fn init_static_slot(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let count = instruction.operand_u8() as usize;
    if count == 0 {
        return Err(VmError::invalid_script("INITSSLOT with zero fields"));
    }
    let counter = engine.reference_counter().clone();
    let context = engine.current_context_mut()?;
    if context.static_fields.is_some() {
        return Err(VmError::invalid_operation("static slot already initialized"));
    }
    context.static_fields = Some(Rc::new(RefCell::new(Slot::new(count, counter))));
    Ok(())
}

fn init_slot(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let local_count = instruction.operand[0] as usize;
    let argument_count = instruction.operand[1] as usize;
    if local_count == 0 && argument_count == 0 {
        return Err(VmError::invalid_script("INITSLOT with zero slots"));
    }
    {
        let context = engine.current_context()?;
        if context.local_variables.is_some() || context.arguments.is_some() {
            return Err(VmError::invalid_operation("slots already initialized"));
        }
    }
    let counter = engine.reference_counter().clone();
    // The top of the stack becomes argument 0.
    let mut arguments = Vec::with_capacity(argument_count);
    for _ in 0..argument_count {
        arguments.push(engine.pop()?);
    }
    let context = engine.current_context_mut()?;
    if local_count > 0 {
        context.local_variables = Some(Slot::new(local_count, counter.clone()));
    }
    if argument_count > 0 {
        context.arguments = Some(Slot::with_items(arguments, counter));
    }
    Ok(())
}

fn load_static(engine: &mut ExecutionEngine, index: usize) -> VmResult<()> {
    let statics = engine
        .current_context()?
        .static_fields
        .clone()
        .ok_or_else(|| VmError::invalid_operation("static slot not initialized"))?;
    let item = statics.borrow().get(index)?;
    engine.push(item)
}

fn store_static(engine: &mut ExecutionEngine, index: usize) -> VmResult<()> {
    let item = engine.pop()?;
    let statics = engine
        .current_context()?
        .static_fields
        .clone()
        .ok_or_else(|| VmError::invalid_operation("static slot not initialized"))?;
    let result = statics.borrow_mut().set(index, item);
    result
}

fn load_local(engine: &mut ExecutionEngine, index: usize) -> VmResult<()> {
    let item = {
        let context = engine.current_context()?;
        let locals = context
            .local_variables
            .as_ref()
            .ok_or_else(|| VmError::invalid_operation("local slot not initialized"))?;
        locals.get(index)?
    };
    engine.push(item)
}

fn store_local(engine: &mut ExecutionEngine, index: usize) -> VmResult<()> {
    let item = engine.pop()?;
    let context = engine.current_context_mut()?;
    let locals = context
        .local_variables
        .as_mut()
        .ok_or_else(|| VmError::invalid_operation("local slot not initialized"))?;
    locals.set(index, item)
}

fn load_argument(engine: &mut ExecutionEngine, index: usize) -> VmResult<()> {
    let item = {
        let context = engine.current_context()?;
        let arguments = context
            .arguments
            .as_ref()
            .ok_or_else(|| VmError::invalid_operation("argument slot not initialized"))?;
        arguments.get(index)?
    };
    engine.push(item)
}

fn store_argument(engine: &mut ExecutionEngine, index: usize) -> VmResult<()> {
    let item = engine.pop()?;
    let context = engine.current_context_mut()?;
    let arguments = context
        .arguments
        .as_mut()
        .ok_or_else(|| VmError::invalid_operation("argument slot not initialized"))?;
    arguments.set(index, item)
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
    fn locals_round_trip() {
        // INITSLOT 1 local, 0 args; PUSH7 STLOC0 LDLOC0
        let engine = run(vec![
            OpCode::INITSLOT as u8,
            1,
            0,
            OpCode::PUSH7 as u8,
            OpCode::STLOC0 as u8,
            OpCode::LDLOC0 as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        assert_eq!(engine.result_stack()[0].as_int().unwrap(), 7.into());
    }

    #[test]
    fn arguments_load_top_of_stack_first() {
        // PUSH1 PUSH2; INITSLOT 0 locals, 2 args; LDARG0 -> 2 (top of stack).
        let engine = run(vec![
            OpCode::PUSH1 as u8,
            OpCode::PUSH2 as u8,
            OpCode::INITSLOT as u8,
            0,
            2,
            OpCode::LDARG0 as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        assert_eq!(engine.result_stack()[0].as_int().unwrap(), 2.into());
    }

    #[test]
    fn statics_are_shared_with_same_script_calls() {
        // 0: INITSSLOT 1; 2: PUSH5; 3: STSFLD0; 4: CALL +3 (-> 7); 6: RET;
        // 7: LDSFLD0; 8: RET
        let engine = run(vec![
            OpCode::INITSSLOT as u8,
            1,
            OpCode::PUSH5 as u8,
            OpCode::STSFLD0 as u8,
            OpCode::CALL as u8,
            3,
            OpCode::RET as u8,
            OpCode::LDSFLD0 as u8,
            OpCode::RET as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        assert_eq!(engine.result_stack()[0].as_int().unwrap(), 5.into());
    }

    #[test]
    fn uninitialized_slot_faults() {
        let engine = run(vec![OpCode::LDLOC0 as u8]);
        assert_eq!(engine.state(), VMState::Fault);
    }

    #[test]
    fn double_initsslot_faults() {
        let engine = run(vec![
            OpCode::INITSSLOT as u8,
            1,
            OpCode::INITSSLOT as u8,
            1,
        ]);
        assert_eq!(engine.state(), VMState::Fault);
    }
}
