//! Resource limits enforced during execution.

use neo3_config as config;

/// The bounds a script runs under. Violating any of them faults the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Maximum length of a loaded script in bytes.
    pub max_script_length: usize,
    /// Maximum depth of the invocation stack.
    pub max_invocation_stack_size: usize,
    /// Maximum total of stack references and tracked compound children.
    pub max_stack_size: usize,
    /// Maximum serialized size of a single item in bytes.
    pub max_item_size: usize,
    /// Maximum magnitude of a VM integer in bytes.
    pub max_integer_size: usize,
    /// Maximum shift distance for SHL and SHR.
    pub max_shift: u32,
    /// Maximum nesting depth of try frames per context.
    pub max_try_nesting_depth: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_script_length: config::MAX_SCRIPT_LENGTH,
            max_invocation_stack_size: config::MAX_INVOCATION_STACK_SIZE,
            max_stack_size: config::MAX_STACK_SIZE,
            max_item_size: config::MAX_ITEM_SIZE,
            max_integer_size: 32,
            max_shift: config::MAX_SHIFT,
            max_try_nesting_depth: config::MAX_TRY_NESTING_DEPTH,
        }
    }
}
