//! System composition.

use crate::shutdown::ShutdownToken;
use neo3_config::ProtocolSettings;
use neo3_consensus::{ConsensusNetwork, ConsensusPayload, DbftEngine};
use neo3_core::{Block, Transaction, UInt256};
use neo3_cryptography::KeyPair;
use neo3_ledger::{Blockchain, LedgerEventBus, LedgerResult, MemoryPool, MempoolConfig,
    VerifyResult};
use neo3_persistence::Store;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Outcome of relaying a transaction into the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayResult {
    Accepted,
    Rejected(VerifyResult),
}

/// The composed node: storage, ledger, mempool, event buses and the
/// consensus actor. All cross-component links are explicit handles; the
/// system owns them and nothing is process-global.
pub struct NeoSystem {
    settings: ProtocolSettings,
    blockchain: Arc<Blockchain>,
    mempool: Arc<MemoryPool>,
    events: LedgerEventBus,
    shutdown: ShutdownToken,
}

impl NeoSystem {
    /// Builds the system over `store`, creating genesis if needed.
    pub fn new(settings: ProtocolSettings, store: Arc<dyn Store>) -> LedgerResult<Self> {
        let events = LedgerEventBus::default();
        let blockchain = Arc::new(Blockchain::new(
            store,
            settings.clone(),
            events.clone(),
        )?);
        let mempool = Arc::new(MemoryPool::new(
            MempoolConfig::new(settings.clone()),
            events.clone(),
        ));
        Ok(Self {
            settings,
            blockchain,
            mempool,
            events,
            shutdown: ShutdownToken::new(),
        })
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn blockchain(&self) -> &Arc<Blockchain> {
        &self.blockchain
    }

    pub fn mempool(&self) -> &Arc<MemoryPool> {
        &self.mempool
    }

    pub fn events(&self) -> &LedgerEventBus {
        &self.events
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// A transaction arrived from the network or RPC: verify and pool it.
    pub fn relay_transaction(&self, tx: Transaction) -> RelayResult {
        let snapshot = self.blockchain.snapshot();
        let height = self.blockchain.height().unwrap_or(0);
        match self.mempool.try_add(tx, &snapshot, height) {
            VerifyResult::Succeed => RelayResult::Accepted,
            other => RelayResult::Rejected(other),
        }
    }

    /// A block arrived from synchronization: apply it and notify.
    pub fn relay_block(&self, block: Block) -> LedgerResult<()> {
        self.blockchain.apply_block(&block)?;
        self.mempool.update_after_block(&block, block.index());
        // What survives the cull is re-checked against the new state.
        self.mempool
            .revalidate(&self.blockchain.snapshot(), block.index());
        Ok(())
    }

    /// Spawns the consensus actor: one task owning the dBFT engine,
    /// driven by the view timer and the payload queue.
    ///
    /// Returns the sender the network layer feeds verified consensus
    /// payloads into.
    pub fn start_consensus(
        &self,
        key_pair: Option<KeyPair>,
        network: Arc<dyn ConsensusNetwork>,
    ) -> LedgerResult<mpsc::Sender<ConsensusPayload>> {
        let (sender, mut receiver) = mpsc::channel::<ConsensusPayload>(1024);
        let mut engine = DbftEngine::new(
            Arc::clone(&self.blockchain),
            Arc::clone(&self.mempool),
            network,
            key_pair,
        )
        .map_err(|e| neo3_ledger::LedgerError::SystemExecution {
            message: e.to_string(),
        })?;
        let shutdown = self.shutdown.clone();
        let mut blocks = self.events.subscribe();

        tokio::spawn(async move {
            let mut deadline = tokio::time::Instant::now() + engine.view_timeout();
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("consensus actor draining");
                        break;
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        if let Err(error) = engine.on_timer() {
                            warn!(%error, "consensus timer handling failed");
                        }
                        deadline = tokio::time::Instant::now() + engine.view_timeout();
                    }
                    payload = receiver.recv() => {
                        let Some(payload) = payload else { break };
                        // Mismatched rounds and stale gossip just drop.
                        if let Err(error) = engine.on_payload(&payload) {
                            tracing::debug!(%error, "consensus payload dropped");
                        }
                        deadline = tokio::time::Instant::now() + engine.view_timeout();
                    }
                    event = blocks.recv() => {
                        if let Ok(neo3_ledger::LedgerEvent::BlockCommitted(block)) = event {
                            let _ = engine.block_persisted(&block);
                            deadline = tokio::time::Instant::now() + engine.view_timeout();
                        }
                    }
                }
            }
        });
        Ok(sender)
    }

    /// Requests shutdown. Actors drain in order: consensus first (stops
    /// producing blocks), then the mempool goes quiet, then the
    /// blockchain applier finishes, and the store flushes on drop.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.shutdown.trigger();
    }

    /// Convenience queries forwarded to the ledger.
    pub fn height(&self) -> Option<u32> {
        self.blockchain.height()
    }

    pub fn contains_transaction(&self, hash: &UInt256) -> bool {
        self.mempool.contains(hash) || self.blockchain.contains_transaction(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_core::{Signer, UInt160, Witness};
    use neo3_persistence::MemoryStore;

    fn system() -> NeoSystem {
        NeoSystem::new(
            ProtocolSettings::default_private(),
            Arc::new(MemoryStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn boots_to_genesis() {
        let system = system();
        assert_eq!(system.height(), Some(0));
    }

    #[test]
    fn relay_rejects_invalid_transactions() {
        let system = system();
        let tx = Transaction {
            version: 0,
            nonce: 1,
            system_fee: -5,
            network_fee: 0,
            valid_until_block: 10,
            signers: vec![Signer::called_by_entry(UInt160::zero())],
            attributes: vec![],
            script: vec![0x40],
            witnesses: vec![Witness::empty()],
        };
        assert_eq!(
            system.relay_transaction(tx),
            RelayResult::Rejected(VerifyResult::Invalid)
        );
    }

    #[tokio::test]
    async fn shutdown_token_reaches_subscribers() {
        let system = system();
        let token = system.shutdown_token();
        system.shutdown();
        token.cancelled().await;
    }
}
