//! The blockchain: ordered, atomic block application.

mod genesis;

pub use genesis::genesis_block;

use crate::events::{LedgerEvent, LedgerEventBus};
use crate::{LedgerError, LedgerResult};
use neo3_config::ProtocolSettings;
use neo3_core::{Block, Transaction, UInt256};
use neo3_io::SerializableExt;
use neo3_persistence::{DataCache, DataPrefix, Store};
use neo3_smart_contract::native::{ledger_contract, neo_token, policy_contract, NativeRegistry};
use neo3_smart_contract::{
    verify_witness, AppExecResult, ApplicationEngine, CallFlags, TriggerType,
};
use neo3_vm::VMState;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The block-persistence driver.
///
/// One blockchain owns one store. Blocks apply strictly in height order
/// under a single mutex; consensus and synchronization wait on the
/// applier.
pub struct Blockchain {
    store: Arc<dyn Store>,
    settings: ProtocolSettings,
    events: LedgerEventBus,
    /// Serializes block application.
    apply_lock: Mutex<()>,
}

impl Blockchain {
    /// Opens the chain over `store`, creating and persisting the genesis
    /// block if the store is empty.
    pub fn new(
        store: Arc<dyn Store>,
        settings: ProtocolSettings,
        events: LedgerEventBus,
    ) -> LedgerResult<Self> {
        let chain = Self {
            store,
            settings,
            events,
            apply_lock: Mutex::new(()),
        };
        if chain.height().is_none() {
            chain.persist_genesis()?;
        }
        Ok(chain)
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn events(&self) -> &LedgerEventBus {
        &self.events
    }

    /// A fresh snapshot of the committed state.
    pub fn snapshot(&self) -> DataCache {
        DataCache::from_store(self.store.as_ref())
    }

    /// The best height, `None` before genesis persists.
    pub fn height(&self) -> Option<u32> {
        ledger_contract::current_index(&self.snapshot())
    }

    /// The best block hash.
    pub fn current_hash(&self) -> Option<UInt256> {
        ledger_contract::current_hash(&self.snapshot())
    }

    pub fn block_by_index(&self, index: u32) -> Option<Block> {
        let snapshot = self.snapshot();
        let hash = ledger_contract::block_hash_by_index(&snapshot, index)?;
        ledger_contract::block_by_hash(&snapshot, &hash)
    }

    pub fn block_by_hash(&self, hash: &UInt256) -> Option<Block> {
        ledger_contract::block_by_hash(&self.snapshot(), hash)
    }

    pub fn transaction(&self, hash: &UInt256) -> Option<(u32, Transaction)> {
        ledger_contract::transaction_by_hash(&self.snapshot(), hash)
    }

    pub fn contains_transaction(&self, hash: &UInt256) -> bool {
        ledger_contract::contains_transaction(&self.snapshot(), hash)
    }

    /// The validators expected to sign the next block.
    pub fn next_block_validators(
        &self,
    ) -> LedgerResult<Vec<neo3_cryptography::ECPoint>> {
        neo_token::next_block_validators(&self.snapshot(), &self.settings)
            .map_err(|e| LedgerError::system(e.to_string()))
    }

    // ---- genesis ----

    fn persist_genesis(&self) -> LedgerResult<()> {
        let block = genesis_block(&self.settings)?;
        info!(hash = %block.hash(), "persisting genesis block");
        let snapshot = Arc::new(self.snapshot());

        // Native initialization runs once, under the genesis block.
        let mut engine = ApplicationEngine::new(
            TriggerType::System,
            None,
            Arc::clone(&snapshot),
            Some(block.clone()),
            self.settings.clone(),
            -1,
        );
        let natives = NativeRegistry::new();
        natives
            .initialize_all(&mut engine)
            .map_err(|e| LedgerError::system(e.to_string()))?;

        Self::stage_block_records(&snapshot, &block, &[]);
        snapshot.commit(self.store.as_ref())?;
        self.events
            .publish(LedgerEvent::BlockCommitted(Arc::new(block)));
        Ok(())
    }

    // ---- validation ----

    /// Full validation of `block` against the current chain tip:
    /// structure, linkage and the header witness against the stored
    /// `next_consensus`.
    pub fn verify_block(&self, block: &Block) -> LedgerResult<()> {
        let current = self
            .height()
            .ok_or_else(|| LedgerError::invalid_block("chain not initialized"))?;
        if block.index() != current + 1 {
            return Err(LedgerError::OutOfOrder {
                index: block.index(),
                current,
            });
        }
        let prev = self
            .block_by_index(current)
            .ok_or_else(|| LedgerError::invalid_block("missing previous block"))?;
        if block.header.prev_hash != prev.hash() {
            return Err(LedgerError::invalid_block("previous hash mismatch"));
        }
        if block.header.timestamp_ms <= prev.header.timestamp_ms {
            return Err(LedgerError::invalid_block("timestamp not increasing"));
        }
        block
            .verify_structure(self.settings.max_valid_until_block_increment)
            .map_err(LedgerError::from)?;

        // The header witness must answer for the consensus address the
        // previous block committed to.
        let sign_data = block.header.sign_data(self.settings.network);
        if !verify_witness(
            &self.settings,
            Arc::new(self.snapshot()),
            None,
            sign_data,
            &prev.header.next_consensus,
            &block.header.witness,
            neo3_config::MAX_VERIFICATION_GAS,
        ) {
            return Err(LedgerError::invalid_block("header witness failed"));
        }
        Ok(())
    }

    // ---- the apply pipeline ----

    /// Validates and applies `block` atomically, returning the per-tx
    /// execution results.
    pub fn apply_block(&self, block: &Block) -> LedgerResult<Vec<AppExecResult>> {
        let _guard = self.apply_lock.lock();
        self.verify_block(block)?;
        self.apply_verified(block)
    }

    /// Applies blocks that were already fully verified (synchronization
    /// import path). Blocks must arrive in height order.
    pub fn import(&self, blocks: &[Block]) -> LedgerResult<()> {
        for block in blocks {
            self.apply_block(block)?;
        }
        Ok(())
    }

    fn apply_verified(&self, block: &Block) -> LedgerResult<Vec<AppExecResult>> {
        let snapshot = Arc::new(self.snapshot());
        let natives = NativeRegistry::new();

        // OnPersist: fees burn, native bookkeeping advances.
        let mut on_persist = ApplicationEngine::new(
            TriggerType::OnPersist,
            None,
            Arc::clone(&snapshot),
            Some(block.clone()),
            self.settings.clone(),
            -1,
        );
        natives
            .on_persist_all(&mut on_persist)
            .map_err(|e| LedgerError::system(format!("OnPersist: {e}")))?;
        drop(on_persist);

        // Per-transaction execution against nested snapshots.
        let mut results = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            results.push(self.execute_transaction(&snapshot, block, tx));
        }

        // PostPersist: oracle payouts, committee rewards.
        let mut post_persist = ApplicationEngine::new(
            TriggerType::PostPersist,
            None,
            Arc::clone(&snapshot),
            Some(block.clone()),
            self.settings.clone(),
            -1,
        );
        natives
            .post_persist_all(&mut post_persist)
            .map_err(|e| LedgerError::system(format!("PostPersist: {e}")))?;
        // An oracle callback loads a context; drive it to completion.
        if post_persist.has_loaded_context() && !post_persist.state().is_terminal() {
            post_persist.execute();
        }
        drop(post_persist);

        Self::stage_block_records(&snapshot, block, &results);

        self.events.publish(LedgerEvent::BlockCommitting {
            block: Arc::new(block.clone()),
            execution_results: Arc::new(results.clone()),
        });

        // Atomic durability point. On failure the snapshot is discarded
        // and the committed state stays at the previous height.
        snapshot.commit(self.store.as_ref())?;

        info!(
            index = block.index(),
            hash = %block.hash(),
            transactions = block.transactions.len(),
            "block committed"
        );
        self.events
            .publish(LedgerEvent::BlockCommitted(Arc::new(block.clone())));
        Ok(results)
    }

    fn execute_transaction(
        &self,
        block_snapshot: &Arc<DataCache>,
        block: &Block,
        tx: &Transaction,
    ) -> AppExecResult {
        let nested = Arc::new(block_snapshot.nested());
        let mut engine = ApplicationEngine::new(
            TriggerType::Application,
            Some(tx.clone()),
            Arc::clone(&nested),
            Some(block.clone()),
            self.settings.clone(),
            tx.system_fee,
        );
        engine.set_fee_factors(
            policy_contract::exec_fee_factor(&nested),
            policy_contract::storage_price(&nested),
        );
        let state = match engine.load_script(tx.script.clone(), CallFlags::ALL, -1) {
            Ok(()) => engine.execute(),
            Err(_) => VMState::Fault,
        };
        let halted = state == VMState::Halt;
        if halted {
            nested.commit_into(block_snapshot);
        } else {
            // Discard the nested writes; the fees were already burned in
            // OnPersist, so a fault still costs the sender.
            debug!(hash = %tx.hash(), reason = ?engine.fault_message(), "transaction faulted");
        }
        AppExecResult {
            tx_hash: tx.hash(),
            halted,
            gas_consumed: engine.gas_consumed(),
            exception: engine.fault_message(),
        }
    }

    /// Writes the block, header, transaction and pointer records into the
    /// snapshot.
    fn stage_block_records(snapshot: &DataCache, block: &Block, results: &[AppExecResult]) {
        let hash = block.hash();
        snapshot.put(
            DataPrefix::Header.key(hash.as_bytes()),
            block.header.to_array(),
        );
        snapshot.put(DataPrefix::Block.key(hash.as_bytes()), block.to_array());
        snapshot.put(
            DataPrefix::BlockHashByIndex.key(&block.index().to_le_bytes()),
            hash.to_array().to_vec(),
        );
        for tx in &block.transactions {
            let mut record = block.index().to_le_bytes().to_vec();
            record.extend_from_slice(&tx.to_array());
            snapshot.put(DataPrefix::Transaction.key(tx.hash().as_bytes()), record);
        }
        for result in results {
            if !result.halted {
                warn!(hash = %result.tx_hash, "faulted transaction recorded");
            }
        }
        snapshot.put(
            DataPrefix::CurrentIndex.key(&[]),
            block.index().to_le_bytes().to_vec(),
        );
        snapshot.put(DataPrefix::CurrentHash.key(&[]), hash.to_array().to_vec());
    }
}
