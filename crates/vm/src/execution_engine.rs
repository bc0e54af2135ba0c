//! The execution engine: invocation stack, dispatch loop and exception
//! unwinding.

use crate::evaluation_stack::EvaluationStack;
use crate::exception_handling::{TryContext, TryState};
use crate::execution_context::ExecutionContext;
use crate::execution_limits::ExecutionLimits;
use crate::instruction::Instruction;
use crate::jump_table::JumpTable;
use crate::reference_counter::{exact_count, ReferenceCounter};
use crate::script::Script;
use crate::stack_item::StackItem;
use crate::vm_state::VMState;
use crate::{VmError, VmResult};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// A deterministic script interpreter.
///
/// The engine never returns errors to the host from [`execute`]; failures
/// transition it to [`VMState::Fault`] with the reason recorded in
/// [`fault_error`]. Hosts wrap the engine and drive [`step`] themselves
/// when they need per-instruction accounting.
///
/// [`execute`]: ExecutionEngine::execute
/// [`step`]: ExecutionEngine::step
/// [`fault_error`]: ExecutionEngine::fault_error
pub struct ExecutionEngine {
    state: VMState,
    invocation_stack: Vec<ExecutionContext>,
    result_stack: EvaluationStack,
    reference_counter: ReferenceCounter,
    jump_table: Rc<JumpTable>,
    limits: ExecutionLimits,
    uncaught_exception: Option<StackItem>,
    fault_error: Option<VmError>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(ExecutionLimits::default())
    }
}

impl ExecutionEngine {
    pub fn new(limits: ExecutionLimits) -> Self {
        let reference_counter = ReferenceCounter::new();
        Self {
            state: VMState::None,
            invocation_stack: Vec::new(),
            result_stack: EvaluationStack::new(reference_counter.clone()),
            reference_counter,
            jump_table: Rc::new(JumpTable::default_table()),
            limits,
            uncaught_exception: None,
            fault_error: None,
        }
    }

    // ---- accessors ----

    pub fn state(&self) -> VMState {
        self.state
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    pub fn reference_counter(&self) -> &ReferenceCounter {
        &self.reference_counter
    }

    /// The error that faulted the engine, if any.
    pub fn fault_error(&self) -> Option<&VmError> {
        self.fault_error.as_ref()
    }

    /// The thrown item that nothing caught, if the fault came from `THROW`.
    pub fn uncaught_exception(&self) -> Option<&StackItem> {
        self.uncaught_exception.as_ref()
    }

    /// Items left on the result stack after `HALT`, bottom-to-top.
    pub fn result_stack(&self) -> &[StackItem] {
        self.result_stack.items()
    }

    pub fn invocation_stack_len(&self) -> usize {
        self.invocation_stack.len()
    }

    pub fn current_context(&self) -> VmResult<&ExecutionContext> {
        self.invocation_stack
            .last()
            .ok_or_else(|| VmError::invalid_operation("no context loaded"))
    }

    pub fn current_context_mut(&mut self) -> VmResult<&mut ExecutionContext> {
        self.invocation_stack
            .last_mut()
            .ok_or_else(|| VmError::invalid_operation("no context loaded"))
    }

    // ---- stack access through the current context ----

    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        let context = self.current_context()?;
        context.evaluation_stack.borrow_mut().push(item);
        Ok(())
    }

    pub fn pop(&mut self) -> VmResult<StackItem> {
        let context = self.current_context()?;
        let item = context.evaluation_stack.borrow_mut().pop()?;
        Ok(item)
    }

    /// Pops an item and coerces it to an integer.
    pub fn pop_int(&mut self) -> VmResult<num_bigint::BigInt> {
        self.pop()?.as_int()
    }

    /// Pops an item and coerces it to a boolean.
    pub fn pop_bool(&mut self) -> VmResult<bool> {
        self.pop()?.as_bool()
    }

    /// Pops an item and coerces it to bytes.
    pub fn pop_bytes(&mut self) -> VmResult<Vec<u8>> {
        self.pop()?.as_bytes()
    }

    /// Pops an integer and converts it to `usize`, faulting on negatives
    /// and overflow.
    pub fn pop_index(&mut self) -> VmResult<usize> {
        let value = self.pop_int()?;
        usize::try_from(&value).map_err(|_| VmError::out_of_range(format!("index {value}")))
    }

    pub fn peek(&self, n: usize) -> VmResult<StackItem> {
        let context = self.current_context()?;
        let item = context.evaluation_stack.borrow().peek(n)?;
        Ok(item)
    }

    // ---- script loading ----

    /// Loads `script_bytes` as a new entry context with its own evaluation
    /// stack.
    pub fn load_script(
        &mut self,
        script_bytes: Vec<u8>,
        rv_count: isize,
        initial_position: usize,
    ) -> VmResult<()> {
        let script = Rc::new(Script::new(script_bytes, self.limits.max_script_length)?);
        if script.is_empty() {
            return Err(VmError::invalid_script("empty script"));
        }
        let stack = Rc::new(RefCell::new(EvaluationStack::new(
            self.reference_counter.clone(),
        )));
        let mut context = ExecutionContext::new(script, rv_count, stack);
        context.jump(initial_position)?;
        self.load_context(context)?;
        if self.state == VMState::None {
            self.state = VMState::Break;
        }
        Ok(())
    }

    /// Pushes a prepared context, enforcing invocation depth.
    pub fn load_context(&mut self, context: ExecutionContext) -> VmResult<()> {
        if self.invocation_stack.len() >= self.limits.max_invocation_stack_size {
            return Err(VmError::InvocationOverflow {
                limit: self.limits.max_invocation_stack_size,
            });
        }
        self.invocation_stack.push(context);
        Ok(())
    }

    // ---- the dispatch loop ----

    /// Runs until the engine halts or faults.
    pub fn execute(&mut self) -> VMState {
        if self.state == VMState::Break || self.state == VMState::None {
            self.state = VMState::Running;
        }
        while self.state == VMState::Running {
            self.step();
        }
        self.state
    }

    /// The instruction the next [`step`](Self::step) will execute, or
    /// `None` at an implicit RET position.
    pub fn peek_instruction(&self) -> VmResult<Option<Instruction>> {
        let context = self.current_context()?;
        if context.at_end() {
            return Ok(None);
        }
        context.current_instruction().map(Some)
    }

    /// Moves the current context past `instruction` without executing it.
    /// Hosts that intercept an opcode (SYSCALL, CALLT) advance this way
    /// before running their own handler.
    pub fn skip_instruction(&mut self, instruction: &Instruction) -> VmResult<()> {
        if self.state == VMState::Break || self.state == VMState::None {
            self.state = VMState::Running;
        }
        self.current_context_mut()?.move_next(instruction);
        Ok(())
    }

    /// Executes a single instruction (or the implicit RET at script end),
    /// then enforces the item-count limit.
    pub fn step(&mut self) {
        if self.state == VMState::Break || self.state == VMState::None {
            self.state = VMState::Running;
        }
        if self.state != VMState::Running {
            return;
        }
        let result = self.step_inner();
        if let Err(error) = result {
            self.fault(error);
            return;
        }
        if let Err(error) = self.check_reference_limit() {
            self.fault(error);
        }
    }

    fn step_inner(&mut self) -> VmResult<()> {
        let context = self.current_context()?;
        if context.at_end() {
            return self.execute_ret();
        }
        let instruction = context.current_instruction()?;
        // The pointer moves before dispatch; control-flow handlers
        // overwrite it with their target.
        self.current_context_mut()?.move_next(&instruction);
        let handler = self.jump_table.handler(instruction.opcode)?;
        handler(self, &instruction)
    }

    // ---- debugger stepping ----

    /// Executes one instruction, entering calls.
    pub fn step_into(&mut self) {
        self.step();
        if self.state == VMState::Running {
            self.state = VMState::Break;
        }
    }

    /// Executes until control returns to the current frame depth.
    pub fn step_over(&mut self) {
        let depth = self.invocation_stack.len();
        loop {
            self.step();
            if self.state != VMState::Running || self.invocation_stack.len() <= depth {
                break;
            }
        }
        if self.state == VMState::Running {
            self.state = VMState::Break;
        }
    }

    /// Executes until the current frame returns.
    pub fn step_out(&mut self) {
        let depth = self.invocation_stack.len();
        loop {
            self.step();
            if self.state != VMState::Running || self.invocation_stack.len() < depth {
                break;
            }
        }
        if self.state == VMState::Running {
            self.state = VMState::Break;
        }
    }

    /// Records a fault. Idempotent; the first error wins.
    pub fn fault(&mut self, error: VmError) {
        if self.state != VMState::Fault {
            self.state = VMState::Fault;
            self.fault_error.get_or_insert(error);
        }
    }

    fn check_reference_limit(&mut self) -> VmResult<()> {
        if self.reference_counter.count() <= self.limits.max_stack_size {
            return Ok(());
        }
        // The running total includes references that may only be held by
        // unreachable cycles; recount precisely before deciding to fault.
        let exact = self.exact_reference_count();
        if exact > self.limits.max_stack_size {
            return Err(VmError::StackOverflow {
                limit: self.limits.max_stack_size,
            });
        }
        self.reference_counter.set_count(exact);
        Ok(())
    }

    fn exact_reference_count(&self) -> usize {
        let mut seen_stacks: HashSet<usize> = HashSet::new();
        let mut seen_slots: HashSet<usize> = HashSet::new();
        let mut roots: Vec<StackItem> = Vec::new();
        roots.extend(self.result_stack.items().iter().cloned());
        for context in &self.invocation_stack {
            if seen_stacks.insert(Rc::as_ptr(&context.evaluation_stack) as usize) {
                roots.extend(context.evaluation_stack.borrow().items().iter().cloned());
            }
            if let Some(statics) = &context.static_fields {
                if seen_slots.insert(Rc::as_ptr(statics) as usize) {
                    roots.extend(statics.borrow().items().iter().cloned());
                }
            }
            if let Some(locals) = &context.local_variables {
                roots.extend(locals.items().iter().cloned());
            }
            if let Some(arguments) = &context.arguments {
                roots.extend(arguments.items().iter().cloned());
            }
        }
        exact_count(roots.iter())
    }

    // ---- control transfer, shared by the jump table ----

    /// Jumps the current context to an absolute position.
    pub fn jump(&mut self, position: usize) -> VmResult<()> {
        self.current_context_mut()?.jump(position)
    }

    /// Same-script call: clones the current frame at `position`.
    pub fn call(&mut self, position: usize) -> VmResult<()> {
        let context = self.current_context()?.call_clone(position);
        context.script().instruction_at(position)?;
        self.load_context(context)
    }

    /// Returns from the current context, moving return values to the
    /// caller (or the result stack for the entry context).
    pub fn execute_ret(&mut self) -> VmResult<()> {
        let context = self
            .invocation_stack
            .pop()
            .ok_or_else(|| VmError::invalid_operation("return without context"))?;

        let shared_with_caller = self
            .invocation_stack
            .last()
            .map(|parent| Rc::ptr_eq(&parent.evaluation_stack, &context.evaluation_stack))
            .unwrap_or(false);

        if !shared_with_caller {
            let mut stack = context.evaluation_stack.borrow_mut();
            if context.rv_count >= 0 && stack.len() != context.rv_count as usize {
                return Err(VmError::invalid_operation(format!(
                    "context left {} items, declared {}",
                    stack.len(),
                    context.rv_count
                )));
            }
            match self.invocation_stack.last() {
                Some(parent) => {
                    let mut parent_stack = parent.evaluation_stack.borrow_mut();
                    stack.drain_to(&mut parent_stack);
                }
                None => stack.drain_to(&mut self.result_stack),
            }
        }

        if self.invocation_stack.is_empty() {
            self.state = VMState::Halt;
        }
        Ok(())
    }

    // ---- exception handling ----

    /// Pushes a try frame for the current context.
    pub fn execute_try(
        &mut self,
        catch_position: Option<usize>,
        finally_position: Option<usize>,
    ) -> VmResult<()> {
        if catch_position.is_none() && finally_position.is_none() {
            return Err(VmError::invalid_script("TRY with neither catch nor finally"));
        }
        let max_depth = self.limits.max_try_nesting_depth;
        let context = self.current_context_mut()?;
        if context.try_stack.len() >= max_depth {
            return Err(VmError::out_of_range(format!(
                "try nesting depth {max_depth}"
            )));
        }
        if let Some(position) = catch_position {
            context.script().instruction_at(position)?;
        }
        if let Some(position) = finally_position {
            context.script().instruction_at(position)?;
        }
        context
            .try_stack
            .push(TryContext::new(catch_position, finally_position));
        Ok(())
    }

    /// `ENDTRY target`: leave the innermost try or catch body, running the
    /// finally body on the way if there is one.
    pub fn execute_endtry(&mut self, target: usize) -> VmResult<()> {
        let context = self.current_context_mut()?;
        let frame = context
            .try_stack
            .last_mut()
            .ok_or_else(|| VmError::invalid_operation("ENDTRY outside try"))?;
        if frame.state == TryState::Finally {
            return Err(VmError::invalid_operation("ENDTRY inside finally"));
        }
        if let Some(finally_position) = frame.finally_position {
            frame.state = TryState::Finally;
            frame.end_position = Some(target);
            context.jump(finally_position)
        } else {
            context.try_stack.pop();
            context.jump(target)
        }
    }

    /// `ENDFINALLY`: resume the pending action — rethrow an in-flight
    /// exception or continue at the recorded leave target.
    pub fn execute_endfinally(&mut self) -> VmResult<()> {
        let context = self.current_context_mut()?;
        let frame = context
            .try_stack
            .pop()
            .ok_or_else(|| VmError::invalid_operation("ENDFINALLY outside try"))?;
        if frame.state != TryState::Finally {
            return Err(VmError::invalid_operation("ENDFINALLY outside finally"));
        }
        if self.uncaught_exception.is_some() {
            return self.unwind_exception();
        }
        let target = frame
            .end_position
            .ok_or_else(|| VmError::invalid_operation("finally without continuation"))?;
        self.current_context_mut()?.jump(target)
    }

    /// Throws `item`, unwinding to the innermost live catch.
    pub fn throw_exception(&mut self, item: StackItem) -> VmResult<()> {
        self.uncaught_exception = Some(item);
        self.unwind_exception()
    }

    fn unwind_exception(&mut self) -> VmResult<()> {
        while let Some(context) = self.invocation_stack.last_mut() {
            while let Some(frame) = context.try_stack.last_mut() {
                match frame.state {
                    TryState::Try if frame.has_catch() => {
                        let catch_position =
                            frame.catch_position.expect("has_catch checked");
                        frame.state = TryState::Catch;
                        context.jump(catch_position)?;
                        let exception = self
                            .uncaught_exception
                            .take()
                            .ok_or_else(|| VmError::invalid_operation("no exception in flight"))?;
                        return self.push(exception);
                    }
                    TryState::Try | TryState::Catch => {
                        if let Some(finally_position) = frame.finally_position {
                            // Run the finally body; ENDFINALLY resumes the
                            // unwind because the exception stays in flight.
                            frame.state = TryState::Finally;
                            frame.end_position = None;
                            return context.jump(finally_position);
                        }
                        context.try_stack.pop();
                    }
                    TryState::Finally => {
                        // An exception inside a finally body abandons the
                        // frame's pending action.
                        context.try_stack.pop();
                    }
                }
            }
            // No handler in this context: unload it and keep unwinding.
            self.invocation_stack.pop();
        }
        Err(VmError::UncaughtException)
    }
}

impl Drop for ExecutionEngine {
    fn drop(&mut self) {
        // Compound interiors are Rc-shared and may form cycles; clearing
        // the tracked compounds lets everything deallocate.
        self.reference_counter.break_cycles();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OpCode;

    fn run(script: Vec<u8>) -> ExecutionEngine {
        let mut engine = ExecutionEngine::default();
        engine.load_script(script, -1, 0).unwrap();
        engine.execute();
        engine
    }

    #[test]
    fn push_add_halts_with_result() {
        // PUSH2 PUSH3 ADD RET
        let engine = run(vec![
            OpCode::PUSH2 as u8,
            OpCode::PUSH3 as u8,
            OpCode::ADD as u8,
            OpCode::RET as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        let result = engine.result_stack();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].as_int().unwrap(), 5.into());
    }

    #[test]
    fn missing_ret_is_an_implicit_ret() {
        let engine = run(vec![OpCode::PUSH1 as u8]);
        assert_eq!(engine.state(), VMState::Halt);
        assert_eq!(engine.result_stack().len(), 1);
    }

    #[test]
    fn unknown_opcode_faults() {
        let engine = run(vec![0x42]);
        assert_eq!(engine.state(), VMState::Fault);
        assert!(matches!(
            engine.fault_error(),
            Some(VmError::InvalidOpCode { opcode: 0x42 })
        ));
    }

    #[test]
    fn declared_return_arity_is_enforced() {
        let mut engine = ExecutionEngine::default();
        engine
            .load_script(vec![OpCode::PUSH1 as u8, OpCode::PUSH2 as u8], 1, 0)
            .unwrap();
        engine.execute();
        assert_eq!(engine.state(), VMState::Fault);
    }

    #[test]
    fn invocation_depth_is_bounded() {
        // CALL 0 loops into itself, overflowing the invocation stack.
        let engine = run(vec![OpCode::CALL as u8, 0x00]);
        assert_eq!(engine.state(), VMState::Fault);
        assert!(matches!(
            engine.fault_error(),
            Some(VmError::InvocationOverflow { .. })
        ));
    }
}
