//! VM error values.
//!
//! Every variant faults the engine; the catchable ones can also be caught
//! by an in-script `TRY` frame.

use thiserror::Error;

/// Errors raised during script parsing and execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// A script or instruction could not be decoded.
    #[error("invalid script: {message}")]
    InvalidScript { message: String },

    /// The byte at the instruction pointer is not a defined opcode.
    #[error("invalid opcode {opcode:#04x}")]
    InvalidOpCode { opcode: u8 },

    /// An operation was applied to an item of the wrong type.
    #[error("invalid type: expected {expected}, found {found}")]
    InvalidType { expected: String, found: String },

    /// An operand or item index was out of range.
    #[error("out of range: {message}")]
    OutOfRange { message: String },

    /// The evaluation stack had too few items.
    #[error("stack underflow: needed {needed}, had {available}")]
    StackUnderflow { needed: usize, available: usize },

    /// The total item count exceeded the stack size limit.
    #[error("stack overflow: limit {limit}")]
    StackOverflow { limit: usize },

    /// The invocation stack exceeded its depth limit.
    #[error("invocation stack overflow: limit {limit}")]
    InvocationOverflow { limit: usize },

    /// An item grew past the per-item size limit.
    #[error("item exceeds size limit {limit}")]
    ItemTooLarge { limit: usize },

    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A shift distance exceeded the shift limit.
    #[error("shift out of range: {shift}")]
    ShiftOutOfRange { shift: i64 },

    /// An explicit `ABORT` or a failed `ASSERT`; never catchable.
    #[error("abort: {message}")]
    Abort { message: String },

    /// A script-thrown exception that no try frame caught.
    #[error("uncaught exception")]
    UncaughtException,

    /// An operation is not valid in the engine's current state.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl VmError {
    pub fn invalid_script(message: impl Into<String>) -> Self {
        Self::InvalidScript {
            message: message.into(),
        }
    }

    pub fn invalid_type(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::InvalidType {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::OutOfRange {
            message: message.into(),
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    pub fn abort(message: impl Into<String>) -> Self {
        Self::Abort {
            message: message.into(),
        }
    }

    /// Whether an in-script catch block may observe this error. `ABORT`
    /// and resource-limit violations always tear the engine down.
    pub fn is_catchable(&self) -> bool {
        !matches!(
            self,
            Self::Abort { .. }
                | Self::StackOverflow { .. }
                | Self::InvocationOverflow { .. }
                | Self::InvalidOpCode { .. }
                | Self::InvalidScript { .. }
        )
    }
}

/// Result alias for VM operations.
pub type VmResult<T> = Result<T, VmError>;
