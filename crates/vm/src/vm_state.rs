//! Engine execution states.

/// The state of an [`crate::ExecutionEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VMState {
    /// No script loaded or execution not started.
    #[default]
    None,
    /// Executing instructions.
    Running,
    /// Terminated successfully; results are on the result stack.
    Halt,
    /// Terminated on an error; the fault reason is recorded on the engine.
    Fault,
    /// Paused at a debugger breakpoint.
    Break,
}

impl VMState {
    /// Whether execution has stopped for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Halt | Self::Fault)
    }
}
