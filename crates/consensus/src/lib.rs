//! dBFT consensus.
//!
//! A fixed committee of `n` validators (`f = (n-1)/3` tolerated faults)
//! agrees on each block through PrepareRequest / PrepareResponse / Commit
//! rounds, with ChangeView and Recovery for faulty views. The network
//! transport is abstract: the engine hands signed payloads to a
//! [`ConsensusNetwork`] and the node feeds received payloads back in.

mod context;
mod engine;
mod error;
mod messages;

pub use context::{ConsensusContext, ConsensusPhase};
pub use engine::{ConsensusNetwork, DbftEngine};
pub use error::{ConsensusError, ConsensusResult};
pub use messages::{
    ChangeView, ChangeViewReason, Commit, ConsensusMessage, ConsensusPayload, PrepareRequest,
    PrepareResponse, RecoveryMessage, RecoveryRequest,
};
