//! The dBFT state machine.

use crate::context::{ConsensusContext, ConsensusPhase};
use crate::messages::{
    ChangeView, ChangeViewReason, Commit, ConsensusMessage, ConsensusPayload, PrepareRequest,
    PrepareResponse, RecoveryMessage, RecoveryRequest,
};
use crate::{ConsensusError, ConsensusResult};
use neo3_core::{Block, UInt256};
use neo3_cryptography::KeyPair;
use neo3_ledger::{Blockchain, MemoryPool};
use neo3_smart_contract::native::policy_contract;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The consensus engine's view of the peer network. Implemented by the
/// P2P layer; a loopback suffices for tests.
pub trait ConsensusNetwork: Send + Sync {
    /// Gossips a signed payload to the other validators.
    fn broadcast(&self, payload: ConsensusPayload);

    /// Asks peers for transactions missing from the local mempool.
    fn request_transactions(&self, hashes: &[UInt256]);
}

/// A dBFT validator (or observer) for one chain.
///
/// The engine is synchronous and single-threaded; the node's consensus
/// actor feeds it timer ticks and verified payloads and forwards its
/// broadcasts.
pub struct DbftEngine {
    context: ConsensusContext,
    blockchain: Arc<Blockchain>,
    mempool: Arc<MemoryPool>,
    network: Arc<dyn ConsensusNetwork>,
}

impl DbftEngine {
    pub fn new(
        blockchain: Arc<Blockchain>,
        mempool: Arc<MemoryPool>,
        network: Arc<dyn ConsensusNetwork>,
        key_pair: Option<KeyPair>,
    ) -> ConsensusResult<Self> {
        let validators = blockchain.next_block_validators()?;
        let settings = blockchain.settings().clone();
        let mut engine = Self {
            context: ConsensusContext::new(settings, validators, key_pair),
            blockchain,
            mempool,
            network,
        };
        engine.reset_to_chain_tip()?;
        Ok(engine)
    }

    pub fn context(&self) -> &ConsensusContext {
        &self.context
    }

    /// The timer for the current view; doubles with every view change.
    pub fn view_timeout(&self) -> Duration {
        let base = self.context.settings.milliseconds_per_block;
        Duration::from_millis(base << self.context.view_number.min(16))
    }

    fn reset_to_chain_tip(&mut self) -> ConsensusResult<()> {
        let height = self
            .blockchain
            .height()
            .ok_or_else(|| ConsensusError::invalid_payload("chain not initialized"))?;
        let tip = self
            .blockchain
            .block_by_index(height)
            .ok_or_else(|| ConsensusError::invalid_payload("missing tip block"))?;
        self.context
            .reset_for_block(height + 1, tip.hash(), tip.header.timestamp_ms);
        debug!(index = height + 1, "consensus round initialized");
        Ok(())
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    // ---- outbound ----

    fn broadcast(&mut self, message: ConsensusMessage) -> ConsensusResult<ConsensusPayload> {
        let my_index = self
            .context
            .my_index
            .ok_or(ConsensusError::NotAValidator)? as u8;
        let mut payload = ConsensusPayload::new(
            self.context.block_index,
            my_index,
            self.context.view_number,
            message,
        );
        self.context.sign_payload(&mut payload)?;
        self.network.broadcast(payload.clone());
        Ok(payload)
    }

    /// Timer expiry: the primary proposes, backups demand a view change.
    pub fn on_timer(&mut self) -> ConsensusResult<()> {
        if self.context.commit_sent() {
            return Ok(());
        }
        if self.context.is_primary() && self.context.phase == ConsensusPhase::Initial {
            self.send_prepare_request()
        } else if self.context.my_index.is_some() {
            self.request_change_view(ChangeViewReason::Timeout)
        } else {
            Ok(())
        }
    }

    fn send_prepare_request(&mut self) -> ConsensusResult<()> {
        let snapshot = self.blockchain.snapshot();
        let transactions = self.mempool.select_for_block(
            policy_contract::max_transactions_per_block(&snapshot),
            policy_contract::max_block_size(&snapshot),
            policy_contract::max_block_system_fee(&snapshot),
        );
        let request = PrepareRequest {
            timestamp_ms: Self::now_ms().max(self.context.prev_timestamp_ms + 1),
            nonce: u64::from_le_bytes(
                neo3_cryptography::sha256(self.context.prev_hash.as_bytes())[..8]
                    .try_into()
                    .expect("8 bytes"),
            ),
            tx_hashes: transactions.iter().map(|tx| tx.hash()).collect(),
        };
        for tx in &transactions {
            self.context
                .transactions
                .insert(tx.hash(), (**tx).clone());
        }
        self.context.prepare_request = Some(request.clone());
        let payload = self.broadcast(ConsensusMessage::PrepareRequest(request))?;
        self.context.preparation_hash = Some(payload.hash());
        let index = payload.validator_index as usize;
        self.context.preparations[index] = Some(payload);
        self.context.phase = ConsensusPhase::RequestSent;
        info!(
            index = self.context.block_index,
            view = self.context.view_number,
            "prepare request sent"
        );
        self.check_commit()
    }

    fn request_change_view(&mut self, reason: ChangeViewReason) -> ConsensusResult<()> {
        let new_view = self.context.view_number + 1;
        let payload = self.broadcast(ConsensusMessage::ChangeView(ChangeView {
            new_view_number: new_view,
            timestamp_ms: Self::now_ms(),
            reason,
        }))?;
        let index = payload.validator_index as usize;
        self.context.change_views[index] = Some(new_view);
        self.context.phase = ConsensusPhase::ViewChanging;
        debug!(new_view, ?reason, "change view requested");
        self.check_change_view(new_view)
    }

    /// Asks the round's peers for the evidence this node is missing.
    pub fn send_recovery_request(&mut self) -> ConsensusResult<()> {
        self.broadcast(ConsensusMessage::RecoveryRequest(RecoveryRequest {
            timestamp_ms: Self::now_ms(),
        }))?;
        Ok(())
    }

    // ---- inbound ----

    /// Validates and processes a payload received from the network.
    pub fn on_payload(&mut self, payload: &ConsensusPayload) -> ConsensusResult<()> {
        if payload.block_index != self.context.block_index {
            return Err(ConsensusError::WrongRound {
                index: payload.block_index,
                view: payload.view_number,
                expected_index: self.context.block_index,
                expected_view: self.context.view_number,
            });
        }
        let sender = payload.validator_index as usize;
        let Some(sender_key) = self.context.validators.get(sender) else {
            return Err(ConsensusError::invalid_payload(format!(
                "validator index {sender}"
            )));
        };
        if Some(sender) == self.context.my_index {
            // Our own gossip loops back; evidence is already recorded.
            return Ok(());
        }
        if !payload.verify(sender_key, self.context.settings.network) {
            return Err(ConsensusError::invalid_payload("bad payload signature"));
        }
        // Change-view and recovery cross views; the rest must match.
        match &payload.message {
            ConsensusMessage::ChangeView(cv) => {
                return self.on_change_view(sender, cv.clone());
            }
            ConsensusMessage::RecoveryRequest(_) => return self.on_recovery_request(),
            ConsensusMessage::RecoveryMessage(rm) => {
                return self.on_recovery_message(payload, rm.clone());
            }
            _ => {}
        }
        if payload.view_number != self.context.view_number {
            return Err(ConsensusError::WrongRound {
                index: payload.block_index,
                view: payload.view_number,
                expected_index: self.context.block_index,
                expected_view: self.context.view_number,
            });
        }
        match payload.message.clone() {
            ConsensusMessage::PrepareRequest(request) => {
                self.on_prepare_request(payload, sender, request)
            }
            ConsensusMessage::PrepareResponse(response) => {
                self.on_prepare_response(payload, sender, response)
            }
            ConsensusMessage::Commit(commit) => self.on_commit(sender, commit),
            _ => unreachable!("cross-view messages handled above"),
        }
    }

    fn on_prepare_request(
        &mut self,
        payload: &ConsensusPayload,
        sender: usize,
        request: PrepareRequest,
    ) -> ConsensusResult<()> {
        if sender != self.context.primary_index(self.context.view_number) {
            return Err(ConsensusError::invalid_payload(
                "prepare request from a non-primary",
            ));
        }
        if self.context.prepare_request.is_some() || self.context.commit_sent() {
            return Ok(());
        }
        if request.timestamp_ms <= self.context.prev_timestamp_ms {
            self.request_change_view(ChangeViewReason::TxInvalid)?;
            return Err(ConsensusError::invalid_payload("stale proposal timestamp"));
        }
        if request.tx_hashes.len()
            > policy_contract::max_transactions_per_block(&self.blockchain.snapshot())
        {
            self.request_change_view(ChangeViewReason::BlockRejectedByPolicy)?;
            return Err(ConsensusError::invalid_payload("oversized proposal"));
        }

        // Resolve the proposal's transactions from the pool; missing ones
        // are re-requested and the proposal waits.
        let mut missing = Vec::new();
        for hash in &request.tx_hashes {
            match self.mempool.get(hash) {
                Some(tx) => {
                    self.context.transactions.insert(*hash, (*tx).clone());
                }
                None if self.blockchain.contains_transaction(hash) => {
                    return Err(ConsensusError::invalid_payload(
                        "proposal includes a committed transaction",
                    ));
                }
                None => missing.push(*hash),
            }
        }
        if !missing.is_empty() {
            self.network.request_transactions(&missing);
            self.request_change_view(ChangeViewReason::TxNotFound)?;
            return Err(ConsensusError::invalid_payload(format!(
                "{} proposal transactions missing",
                missing.len()
            )));
        }

        self.context.prepare_request = Some(request);
        self.context.preparation_hash = Some(payload.hash());
        self.context.preparations[sender] = Some(payload.clone());
        self.context.phase = ConsensusPhase::RequestReceived;

        if self.context.is_backup() {
            let response = ConsensusMessage::PrepareResponse(PrepareResponse {
                preparation_hash: payload.hash(),
            });
            let response_payload = self.broadcast(response)?;
            let my_index = response_payload.validator_index as usize;
            self.context.preparations[my_index] = Some(response_payload);
        }
        self.check_commit()
    }

    fn on_prepare_response(
        &mut self,
        payload: &ConsensusPayload,
        sender: usize,
        response: PrepareResponse,
    ) -> ConsensusResult<()> {
        if let Some(expected) = self.context.preparation_hash {
            if response.preparation_hash != expected {
                return Err(ConsensusError::invalid_payload(
                    "response for a different proposal",
                ));
            }
        } else {
            // The response arrived ahead of the request; remember the hash
            // so the request can be cross-checked when it lands.
            self.context.preparation_hash = Some(response.preparation_hash);
        }
        if self.context.preparations[sender].is_none() {
            self.context.preparations[sender] = Some(payload.clone());
        }
        self.check_commit()
    }

    fn check_commit(&mut self) -> ConsensusResult<()> {
        if self.context.commit_sent()
            || self.context.prepare_request.is_none()
            || self.context.preparation_count() < self.context.m()
            || self.context.my_index.is_none()
        {
            return Ok(());
        }
        let header = self.context.proposed_header()?;
        let signature = self.context.sign_header(&header)?;
        let my_index = self.context.my_index.expect("checked above");
        self.context.commits[my_index] = Some(signature.clone());
        self.context.phase = ConsensusPhase::CommitSent;
        self.broadcast(ConsensusMessage::Commit(Commit { signature }))?;
        info!(
            index = self.context.block_index,
            view = self.context.view_number,
            "commit sent"
        );
        self.check_committed()
    }

    fn on_commit(&mut self, sender: usize, commit: Commit) -> ConsensusResult<()> {
        if self.context.commits[sender].is_some() {
            return Ok(());
        }
        // With the proposal at hand the signature is checked now; without
        // it the witness check at block assembly is the backstop.
        if self.context.prepare_request.is_some() {
            let header = self.context.proposed_header()?;
            let sender_key = &self.context.validators[sender];
            if !neo3_cryptography::verify_signature(
                &header.sign_data(self.context.settings.network),
                &commit.signature,
                sender_key,
            ) {
                return Err(ConsensusError::invalid_payload("bad commit signature"));
            }
        }
        self.context.commits[sender] = Some(commit.signature);
        self.check_committed()
    }

    fn check_committed(&mut self) -> ConsensusResult<()> {
        if self.context.commit_count() < self.context.m()
            || self.context.prepare_request.is_none()
        {
            return Ok(());
        }
        let block = self.context.assemble_block()?;
        info!(
            index = block.index(),
            hash = %block.hash(),
            "consensus reached, applying block"
        );
        self.context.phase = ConsensusPhase::Committed;
        match self.blockchain.apply_block(&block) {
            Ok(_) => {
                self.mempool.update_after_block(&block, block.index());
                self.block_persisted(&block)
            }
            Err(error) => {
                warn!(%error, "assembled block failed to apply");
                Err(error.into())
            }
        }
    }

    fn on_change_view(&mut self, sender: usize, change_view: ChangeView) -> ConsensusResult<()> {
        if change_view.new_view_number <= self.context.view_number {
            return Ok(());
        }
        self.context.change_views[sender] = Some(change_view.new_view_number);
        self.check_change_view(change_view.new_view_number)
    }

    fn check_change_view(&mut self, new_view: u8) -> ConsensusResult<()> {
        if self.context.commit_sent() {
            // A committed node never abandons its view.
            return Ok(());
        }
        if self.context.change_view_count(new_view) >= self.context.m()
            && new_view > self.context.view_number
        {
            info!(
                index = self.context.block_index,
                new_view, "view change agreed"
            );
            self.context.reset_view(new_view);
        }
        Ok(())
    }

    fn on_recovery_request(&mut self) -> ConsensusResult<()> {
        if self.context.my_index.is_none() {
            return Ok(());
        }
        let message = RecoveryMessage {
            prepare_request: self.context.prepare_request.clone(),
            preparation_hash: self.context.preparation_hash,
            preparations: self
                .context
                .preparations
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_some())
                .map(|(i, _)| i as u8)
                .collect(),
            commits: self
                .context
                .commits
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.as_ref().map(|sig| (i as u8, sig.clone())))
                .collect(),
            change_views: self
                .context
                .change_views
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.map(|view| (i as u8, view)))
                .collect(),
        };
        self.broadcast(ConsensusMessage::RecoveryMessage(message))?;
        Ok(())
    }

    fn on_recovery_message(
        &mut self,
        payload: &ConsensusPayload,
        message: RecoveryMessage,
    ) -> ConsensusResult<()> {
        if payload.view_number < self.context.view_number {
            return Ok(());
        }
        for (index, view) in &message.change_views {
            let index = *index as usize;
            if index < self.context.change_views.len()
                && self.context.change_views[index].map_or(true, |v| v < *view)
            {
                self.context.change_views[index] = Some(*view);
            }
        }
        if self.context.prepare_request.is_none() {
            if let Some(request) = message.prepare_request {
                // Adopt the bundled proposal when its transactions resolve.
                let mut resolved = true;
                for hash in &request.tx_hashes {
                    match self.mempool.get(hash) {
                        Some(tx) => {
                            self.context.transactions.insert(*hash, (*tx).clone());
                        }
                        None => {
                            self.network.request_transactions(&[*hash]);
                            resolved = false;
                        }
                    }
                }
                if resolved {
                    self.context.prepare_request = Some(request);
                    self.context.preparation_hash = message.preparation_hash;
                    for index in &message.preparations {
                        let index = *index as usize;
                        if index < self.context.preparations.len()
                            && self.context.preparations[index].is_none()
                        {
                            // Evidence of preparation; the original payload
                            // is not rebroadcast, so record the recovery
                            // payload as a stand-in.
                            self.context.preparations[index] = Some(payload.clone());
                        }
                    }
                }
            }
        }
        for (index, signature) in message.commits {
            let index = index as usize;
            if index < self.context.commits.len() && self.context.commits[index].is_none() {
                self.context.commits[index] = Some(signature);
            }
        }
        let target_view = payload.view_number.max(self.context.view_number);
        self.check_change_view(target_view)?;
        self.check_commit()?;
        self.check_committed()
    }

    /// A block for our height (or beyond) persisted, from this engine or
    /// from synchronization; tear down the round and start the next.
    pub fn block_persisted(&mut self, block: &Block) -> ConsensusResult<()> {
        if block.index() + 1 <= self.context.block_index {
            return Ok(());
        }
        self.context
            .reset_for_block(block.index() + 1, block.hash(), block.header.timestamp_ms);
        Ok(())
    }
}
