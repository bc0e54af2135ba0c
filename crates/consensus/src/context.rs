//! Per-round consensus state.

use crate::messages::{ConsensusPayload, PrepareRequest};
use crate::{ConsensusError, ConsensusResult};
use neo3_config::ProtocolSettings;
use neo3_core::{Block, BlockHeader, Transaction, UInt160, UInt256, Witness};
use neo3_cryptography::{ECPoint, KeyPair};
use neo3_smart_contract::{create_multisig_redeem_script, next_consensus_address};
use neo3_vm::ScriptBuilder;
use std::collections::HashMap;

/// Where a validator stands within the current `(index, view)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsensusPhase {
    /// Nothing sent or received for this view yet.
    #[default]
    Initial,
    /// Primary: proposal broadcast. Backup: proposal received.
    RequestSent,
    RequestReceived,
    /// Our commit signature is out; we are locked on this proposal.
    CommitSent,
    /// Collecting change-view votes.
    ViewChanging,
    /// The block for this height is committed.
    Committed,
}

/// The state a validator keeps for one block height.
pub struct ConsensusContext {
    pub settings: ProtocolSettings,
    pub validators: Vec<ECPoint>,
    /// This node's validator slot, if it is in the committee.
    pub my_index: Option<usize>,
    key_pair: Option<KeyPair>,

    pub block_index: u32,
    pub view_number: u8,
    pub phase: ConsensusPhase,

    /// The previous block's fields the proposal builds on.
    pub prev_hash: UInt256,
    pub prev_timestamp_ms: u64,

    pub prepare_request: Option<PrepareRequest>,
    /// Hash of the prepare-request payload backups echo in responses.
    pub preparation_hash: Option<UInt256>,
    /// Per-validator prepare evidence (the request or a response).
    pub preparations: Vec<Option<ConsensusPayload>>,
    /// Per-validator commit signatures over the proposed header.
    pub commits: Vec<Option<Vec<u8>>>,
    /// Per-validator change-view votes (the requested new view).
    pub change_views: Vec<Option<u8>>,

    /// Proposal transactions once resolved from the mempool.
    pub transactions: HashMap<UInt256, Transaction>,
}

impl ConsensusContext {
    pub fn new(
        settings: ProtocolSettings,
        validators: Vec<ECPoint>,
        key_pair: Option<KeyPair>,
    ) -> Self {
        let my_index = key_pair
            .as_ref()
            .and_then(|pair| validators.iter().position(|v| v == pair.public_key()));
        let n = validators.len();
        Self {
            settings,
            validators,
            my_index,
            key_pair,
            block_index: 0,
            view_number: 0,
            phase: ConsensusPhase::Initial,
            prev_hash: UInt256::zero(),
            prev_timestamp_ms: 0,
            prepare_request: None,
            preparation_hash: None,
            preparations: vec![None; n],
            commits: vec![None; n],
            change_views: vec![None; n],
            transactions: HashMap::new(),
        }
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Tolerated Byzantine faults `f = (n - 1) / 3`.
    pub fn f(&self) -> usize {
        (self.validator_count() - 1) / 3
    }

    /// Quorum `m = n - f`.
    pub fn m(&self) -> usize {
        self.validator_count() - self.f()
    }

    /// The primary for `(block_index, view)`: validator
    /// `(block_index - view) mod n`.
    pub fn primary_index(&self, view_number: u8) -> usize {
        let n = self.validator_count() as i64;
        let p = (self.block_index as i64 - view_number as i64) % n;
        ((p + n) % n) as usize
    }

    pub fn is_primary(&self) -> bool {
        self.my_index == Some(self.primary_index(self.view_number))
    }

    pub fn is_backup(&self) -> bool {
        self.my_index.is_some() && !self.is_primary()
    }

    pub fn commit_sent(&self) -> bool {
        matches!(
            self.phase,
            ConsensusPhase::CommitSent | ConsensusPhase::Committed
        )
    }

    /// Prepares state for a new height.
    pub fn reset_for_block(&mut self, block_index: u32, prev_hash: UInt256, prev_timestamp_ms: u64) {
        self.block_index = block_index;
        self.prev_hash = prev_hash;
        self.prev_timestamp_ms = prev_timestamp_ms;
        self.reset_view(0);
    }

    /// Clears per-view state when entering `view_number`.
    pub fn reset_view(&mut self, view_number: u8) {
        let n = self.validator_count();
        self.view_number = view_number;
        self.phase = ConsensusPhase::Initial;
        self.prepare_request = None;
        self.preparation_hash = None;
        self.preparations = vec![None; n];
        self.commits = vec![None; n];
        // Change-view votes below the new view are stale.
        for vote in self.change_views.iter_mut() {
            if vote.is_some_and(|v| v <= view_number) {
                *vote = None;
            }
        }
        self.transactions.clear();
    }

    pub fn preparation_count(&self) -> usize {
        self.preparations.iter().filter(|p| p.is_some()).count()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.iter().filter(|c| c.is_some()).count()
    }

    pub fn change_view_count(&self, view_number: u8) -> usize {
        self.change_views
            .iter()
            .filter(|vote| vote.is_some_and(|v| v >= view_number))
            .count()
    }

    /// Signs a payload with this node's validator key.
    pub fn sign_payload(&self, payload: &mut ConsensusPayload) -> ConsensusResult<()> {
        let pair = self
            .key_pair
            .as_ref()
            .ok_or(ConsensusError::NotAValidator)?;
        payload.sign(pair, self.settings.network);
        Ok(())
    }

    /// Signs the proposed block header, producing this node's commit
    /// signature.
    pub fn sign_header(&self, header: &BlockHeader) -> ConsensusResult<Vec<u8>> {
        let pair = self
            .key_pair
            .as_ref()
            .ok_or(ConsensusError::NotAValidator)?;
        Ok(pair.sign(&header.sign_data(self.settings.network)))
    }

    /// The unsigned header for the current proposal.
    pub fn proposed_header(&self) -> ConsensusResult<BlockHeader> {
        let request = self
            .prepare_request
            .as_ref()
            .ok_or_else(|| ConsensusError::invalid_payload("no prepare request"))?;
        let transactions = self.proposal_transactions()?;
        let block = Block {
            header: BlockHeader {
                version: 0,
                prev_hash: self.prev_hash,
                merkle_root: UInt256::zero(),
                timestamp_ms: request.timestamp_ms,
                nonce: request.nonce,
                index: self.block_index,
                primary_index: self.primary_index(self.view_number) as u8,
                next_consensus: self.next_consensus()?,
                witness: Witness::empty(),
            },
            transactions,
        };
        let mut header = block.header.clone();
        header.merkle_root = block.compute_merkle_root();
        Ok(header)
    }

    fn proposal_transactions(&self) -> ConsensusResult<Vec<Transaction>> {
        let request = self
            .prepare_request
            .as_ref()
            .ok_or_else(|| ConsensusError::invalid_payload("no prepare request"))?;
        request
            .tx_hashes
            .iter()
            .map(|hash| {
                self.transactions
                    .get(hash)
                    .cloned()
                    .ok_or_else(|| {
                        ConsensusError::invalid_payload(format!("missing transaction {hash}"))
                    })
            })
            .collect()
    }

    /// The consensus address for the next round. The validator set only
    /// changes through governance, so this is the multisig over the
    /// current validators.
    pub fn next_consensus(&self) -> ConsensusResult<UInt160> {
        next_consensus_address(&self.validators)
            .map_err(|e| ConsensusError::crypto(e.to_string()))
    }

    /// Assembles the final block once `m` commit signatures are in,
    /// embedding the multisig witness.
    pub fn assemble_block(&self) -> ConsensusResult<Block> {
        let mut header = self.proposed_header()?;
        header.witness = self.multisig_witness(&header)?;
        Ok(Block {
            header,
            transactions: self.proposal_transactions()?,
        })
    }

    fn multisig_witness(&self, _header: &BlockHeader) -> ConsensusResult<Witness> {
        let m = self.m();
        let verification = create_multisig_redeem_script(m, &self.validators)
            .map_err(|e| ConsensusError::crypto(e.to_string()))?;

        // CheckMultisig verifies signatures against keys in sorted-key
        // order, so collect (key, signature) pairs and sort by key.
        let mut pairs: Vec<(&ECPoint, &Vec<u8>)> = self
            .validators
            .iter()
            .zip(self.commits.iter())
            .filter_map(|(key, commit)| commit.as_ref().map(|sig| (key, sig)))
            .collect();
        if pairs.len() < m {
            return Err(ConsensusError::invalid_payload(format!(
                "{} of {m} commit signatures",
                pairs.len()
            )));
        }
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs.truncate(m);

        let mut invocation = ScriptBuilder::new();
        for (_, signature) in &pairs {
            invocation
                .emit_push_bytes(signature)
                .map_err(|e| ConsensusError::crypto(e.to_string()))?;
        }
        Ok(Witness::new(invocation.to_bytes(), verification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with(n: usize) -> ConsensusContext {
        let validators: Vec<ECPoint> =
            (0..n).map(|_| *KeyPair::generate().public_key()).collect();
        ConsensusContext::new(ProtocolSettings::default_private(), validators, None)
    }

    #[test]
    fn quorum_math() {
        let context = context_with(4);
        assert_eq!(context.f(), 1);
        assert_eq!(context.m(), 3);
        let context = context_with(7);
        assert_eq!(context.f(), 2);
        assert_eq!(context.m(), 5);
    }

    #[test]
    fn primary_rotates_with_view() {
        let mut context = context_with(4);
        context.block_index = 8;
        assert_eq!(context.primary_index(0), 0);
        assert_eq!(context.primary_index(1), 3);
        assert_eq!(context.primary_index(2), 2);
    }

    #[test]
    fn view_reset_clears_round_but_keeps_future_votes() {
        let mut context = context_with(4);
        context.change_views[2] = Some(3);
        context.change_views[1] = Some(1);
        context.reset_view(1);
        assert_eq!(context.change_views[2], Some(3));
        assert_eq!(context.change_views[1], None);
        assert_eq!(context.preparation_count(), 0);
    }
}
