//! Transaction admission outcomes.

/// The result of verifying a transaction for mempool admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyResult {
    /// Accepted into the pool.
    Succeed,
    /// The hash is already pooled or on the ledger.
    AlreadyExists,
    /// The pool is full and the fee does not beat the current minimum.
    OutOfMemory,
    /// Structural validation failed.
    Invalid,
    /// A witness failed to verify.
    InvalidWitness,
    /// `valid_until_block` is outside the acceptance window.
    Expired,
    /// The sender cannot cover the declared fees.
    InsufficientFunds,
    /// A policy rule rejected the transaction (blocked account, fee floor).
    PolicyFail,
    /// An unresolved conflict with a pooled transaction.
    HasConflicts,
}

impl VerifyResult {
    pub fn is_ok(self) -> bool {
        self == Self::Succeed
    }
}
