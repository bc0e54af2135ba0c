//! Ledger data model.
//!
//! Value types shared by every layer above the codec: fixed-width hashes,
//! signers and witness scopes, transactions with their attributes, and
//! blocks. All wire encodings live here next to the types they encode.

mod block;
mod error;
mod signer;
mod transaction;
mod uint160;
mod uint256;
mod witness;
mod witness_scope;

pub use block::{Block, BlockHeader};
pub use error::{CoreError, CoreResult};
pub use signer::Signer;
pub use transaction::{OracleResponseCode, Transaction, TransactionAttribute};
pub use uint160::{UInt160, UINT160_SIZE};
pub use uint256::{UInt256, UINT256_SIZE};
pub use witness::Witness;
pub use witness_scope::WitnessScope;
