//! Contract-layer error values.

use thiserror::Error;

/// Errors raised by the application engine, interop services and native
/// contracts. Inside an execution they fault the engine; outside (deploy
/// validation, witness checks) they surface to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// Gas consumed passed the execution's limit.
    #[error("out of gas: consumed {consumed} of {limit}")]
    OutOfGas { consumed: i64, limit: i64 },

    /// A syscall was invoked without the flags it requires.
    #[error("missing call flags: required {required:#04x}, held {held:#04x}")]
    MissingCallFlags { required: u8, held: u8 },

    /// The syscall id is not in the table.
    #[error("unknown syscall {id:#010x}")]
    UnknownSyscall { id: u32 },

    /// A contract or method could not be resolved.
    #[error("contract not found: {message}")]
    ContractNotFound { message: String },

    /// A method argument or state value was malformed.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// An operation is not allowed in the current trigger or context.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// A NEF file failed its structural checks.
    #[error("invalid NEF: {message}")]
    InvalidNef { message: String },

    /// The VM faulted underneath the engine.
    #[error(transparent)]
    Vm(#[from] neo3_vm::VmError),

    /// Storage access failed.
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl ContractError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    pub fn contract_not_found(message: impl Into<String>) -> Self {
        Self::ContractNotFound {
            message: message.into(),
        }
    }

    pub fn invalid_nef(message: impl Into<String>) -> Self {
        Self::InvalidNef {
            message: message.into(),
        }
    }
}

impl From<neo3_persistence::StorageError> for ContractError {
    fn from(error: neo3_persistence::StorageError) -> Self {
        Self::Storage {
            message: error.to_string(),
        }
    }
}

impl From<neo3_io::IoError> for ContractError {
    fn from(error: neo3_io::IoError) -> Self {
        Self::InvalidArgument {
            message: error.to_string(),
        }
    }
}

/// Result alias for contract operations.
pub type ContractResult<T> = Result<T, ContractError>;
