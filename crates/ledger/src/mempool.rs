//! The memory pool: unconfirmed transactions ordered by priority.

use crate::events::{LedgerEvent, LedgerEventBus, RemovalReason};
use crate::verify_result::VerifyResult;
use neo3_config::ProtocolSettings;
use neo3_core::{Transaction, UInt256};
use neo3_io::Serializable;
use neo3_persistence::DataCache;
use neo3_smart_contract::native::{gas_token::GasToken, ledger_contract, neo_token,
    policy_contract};
use neo3_smart_contract::verify_witness;
use num_bigint::BigInt;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Mempool configuration.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    pub capacity: usize,
    /// Witness scripts run during admission; tests disable this to build
    /// pools from unsigned transactions.
    pub verify_witnesses: bool,
    pub settings: ProtocolSettings,
}

impl MempoolConfig {
    pub fn new(settings: ProtocolSettings) -> Self {
        Self {
            capacity: settings.memory_pool_max_transactions,
            verify_witnesses: true,
            settings,
        }
    }
}

/// A pooled transaction with its priority metadata.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub tx: Arc<Transaction>,
    pub fee_per_byte: i64,
    pub high_priority: bool,
    /// Admission order; earlier wins within equal fees.
    pub sequence: u64,
}

/// Ordering key: better entries compare greater.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PriorityKey {
    high_priority: bool,
    fee_per_byte: i64,
    sequence: u64,
    hash: UInt256,
}

impl PriorityKey {
    fn of(entry: &PoolEntry) -> Self {
        Self {
            high_priority: entry.high_priority,
            fee_per_byte: entry.fee_per_byte,
            sequence: entry.sequence,
            hash: entry.tx.hash(),
        }
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.high_priority
            .cmp(&other.high_priority)
            .then(self.fee_per_byte.cmp(&other.fee_per_byte))
            // Earlier arrivals outrank later ones at the same fee.
            .then(other.sequence.cmp(&self.sequence))
            .then(self.hash.cmp(&other.hash))
    }
}

#[derive(Default)]
struct PoolInner {
    by_hash: HashMap<UInt256, PoolEntry>,
    ordered: BTreeSet<PriorityKey>,
    next_sequence: u64,
}

impl PoolInner {
    fn insert(&mut self, entry: PoolEntry) {
        self.ordered.insert(PriorityKey::of(&entry));
        self.by_hash.insert(entry.tx.hash(), entry);
    }

    fn remove(&mut self, hash: &UInt256) -> Option<PoolEntry> {
        let entry = self.by_hash.remove(hash)?;
        self.ordered.remove(&PriorityKey::of(&entry));
        Some(entry)
    }

    /// The lowest-priority entry.
    fn minimum(&self) -> Option<&PriorityKey> {
        self.ordered.iter().next()
    }
}

/// Unconfirmed, fully validated transactions.
///
/// Two indices over one set: a hash map for lookups and an ordered index
/// over `(high-priority, fee-per-byte desc, arrival asc)` for selection
/// and eviction. A single mutex guards both; critical sections stay short
/// and selection snapshots the order before walking it.
pub struct MemoryPool {
    config: MempoolConfig,
    inner: Mutex<PoolInner>,
    events: LedgerEventBus,
}

impl MemoryPool {
    pub fn new(config: MempoolConfig, events: LedgerEventBus) -> Self {
        Self {
            config,
            inner: Mutex::new(PoolInner::default()),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_hash.is_empty()
    }

    pub fn contains(&self, hash: &UInt256) -> bool {
        self.inner.lock().by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &UInt256) -> Option<Arc<Transaction>> {
        self.inner.lock().by_hash.get(hash).map(|e| Arc::clone(&e.tx))
    }

    /// Pool contents ordered best-first.
    pub fn sorted_transactions(&self) -> Vec<Arc<Transaction>> {
        let inner = self.inner.lock();
        inner
            .ordered
            .iter()
            .rev()
            .filter_map(|key| inner.by_hash.get(&key.hash))
            .map(|entry| Arc::clone(&entry.tx))
            .collect()
    }

    /// Verifies and admits a transaction.
    pub fn try_add(
        &self,
        tx: Transaction,
        snapshot: &DataCache,
        height: u32,
    ) -> VerifyResult {
        let hash = tx.hash();

        // Stateless structure first; nothing else matters if this fails.
        if tx.verify_structure().is_err() {
            return VerifyResult::Invalid;
        }

        if self.contains(&hash) || ledger_contract::contains_transaction(snapshot, &hash) {
            return VerifyResult::AlreadyExists;
        }

        // Acceptance window.
        if tx.valid_until_block <= height
            || tx.valid_until_block
                > height + self.config.settings.max_valid_until_block_increment
        {
            return VerifyResult::Expired;
        }
        if let Some(not_before) = tx.not_valid_before() {
            if not_before > height + 1 {
                return VerifyResult::Expired;
            }
        }

        // Policy: blocked accounts and the per-byte fee floor.
        for signer in &tx.signers {
            if policy_contract::is_blocked(snapshot, &signer.account) {
                return VerifyResult::PolicyFail;
            }
        }
        // Only the committee may mark transactions high-priority.
        if tx.is_high_priority() {
            let committee =
                neo_token::committee_address(snapshot, &self.config.settings);
            match committee {
                Ok(address) if tx.signers.iter().any(|s| s.account == address) => {}
                _ => return VerifyResult::PolicyFail,
            }
        }
        let minimum_network_fee =
            policy_contract::fee_per_byte(snapshot) * tx.size() as i64;
        if tx.network_fee < minimum_network_fee {
            return VerifyResult::PolicyFail;
        }

        // The sender must cover its declared fees.
        let balance = GasToken::balance_of(snapshot, &tx.sender());
        if balance < BigInt::from(tx.system_fee + tx.network_fee) {
            return VerifyResult::InsufficientFunds;
        }

        // Conflict resolution: the candidate must outbid the network fees
        // of everything it displaces.
        let conflicting = self.conflicting_entries(&tx);
        if !conflicting.is_empty() {
            let displaced_fees: i64 = {
                let inner = self.inner.lock();
                conflicting
                    .iter()
                    .filter_map(|hash| inner.by_hash.get(hash))
                    .map(|entry| entry.tx.network_fee)
                    .sum()
            };
            if tx.network_fee <= displaced_fees {
                return VerifyResult::HasConflicts;
            }
        }

        // Witness verification against a read-only snapshot.
        if self.config.verify_witnesses && !self.verify_witnesses(&tx, snapshot) {
            return VerifyResult::InvalidWitness;
        }

        let entry_fee_per_byte = tx.fee_per_byte();
        let high_priority = tx.is_high_priority();

        let mut removed: Vec<(UInt256, RemovalReason)> = Vec::new();
        {
            let mut inner = self.inner.lock();
            let sequence = inner.next_sequence;

            // Capacity: reject unless strictly better than the minimum.
            if inner.by_hash.len() >= self.config.capacity {
                let candidate_key = PriorityKey {
                    high_priority,
                    fee_per_byte: entry_fee_per_byte,
                    sequence,
                    hash,
                };
                match inner.minimum() {
                    Some(minimum) if candidate_key > *minimum => {
                        let minimum_hash = minimum.hash;
                        inner.remove(&minimum_hash);
                        removed.push((minimum_hash, RemovalReason::LowPriority));
                    }
                    _ => return VerifyResult::OutOfMemory,
                }
            }

            for conflict in &conflicting {
                if inner.remove(conflict).is_some() {
                    removed.push((*conflict, RemovalReason::Conflict));
                }
            }

            inner.next_sequence += 1;
            inner.insert(PoolEntry {
                tx: Arc::new(tx.clone()),
                fee_per_byte: entry_fee_per_byte,
                high_priority,
                sequence,
            });
        }

        for (hash, reason) in removed {
            self.events
                .publish(LedgerEvent::TransactionRemoved { hash, reason });
        }
        self.events
            .publish(LedgerEvent::TransactionAdded(Arc::new(tx)));
        VerifyResult::Succeed
    }

    /// Hashes pooled on either side of a `Conflicts` attribute with `tx`.
    fn conflicting_entries(&self, tx: &Transaction) -> Vec<UInt256> {
        let hash = tx.hash();
        let declared: Vec<UInt256> = tx.conflicts();
        let inner = self.inner.lock();
        let mut conflicting = Vec::new();
        for declared_hash in declared {
            if inner.by_hash.contains_key(&declared_hash) {
                conflicting.push(declared_hash);
            }
        }
        for (pooled_hash, entry) in &inner.by_hash {
            if entry.tx.conflicts().contains(&hash) {
                conflicting.push(*pooled_hash);
            }
        }
        conflicting
    }

    fn verify_witnesses(&self, tx: &Transaction, snapshot: &DataCache) -> bool {
        let sign_data = tx.sign_data(self.config.settings.network);
        tx.signers.iter().zip(tx.witnesses.iter()).all(|(signer, witness)| {
            verify_witness(
                &self.config.settings,
                Arc::new(snapshot.nested()),
                Some(tx.clone()),
                sign_data.clone(),
                &signer.account,
                witness,
                neo3_config::MAX_VERIFICATION_GAS,
            )
        })
    }

    /// Ordered block-candidate selection under the three budgets, skipping
    /// transactions that conflict with an earlier pick.
    pub fn select_for_block(
        &self,
        max_count: usize,
        max_size: usize,
        max_system_fee: i64,
    ) -> Vec<Arc<Transaction>> {
        let candidates = self.sorted_transactions();
        let mut picked: Vec<Arc<Transaction>> = Vec::new();
        let mut picked_hashes: Vec<UInt256> = Vec::new();
        let mut total_size = 0usize;
        let mut total_system_fee = 0i64;
        for tx in candidates {
            if picked.len() >= max_count {
                break;
            }
            let size = tx.size();
            if total_size + size > max_size {
                continue;
            }
            if total_system_fee + tx.system_fee > max_system_fee {
                continue;
            }
            // A candidate conflicting with an earlier pick loses.
            let conflicts = tx.conflicts();
            if picked_hashes.iter().any(|hash| conflicts.contains(hash)) {
                continue;
            }
            let hash = tx.hash();
            if picked.iter().any(|p| p.conflicts().contains(&hash)) {
                continue;
            }
            total_size += size;
            total_system_fee += tx.system_fee;
            picked_hashes.push(hash);
            picked.push(tx);
        }
        picked
    }

    /// Culls the pool after a block persists: included transactions,
    /// transactions they conflict with, and everything expired at the new
    /// height.
    pub fn update_after_block(&self, block: &neo3_core::Block, new_height: u32) {
        let mut removed: Vec<(UInt256, RemovalReason)> = Vec::new();
        {
            let mut inner = self.inner.lock();
            for tx in &block.transactions {
                let hash = tx.hash();
                if inner.remove(&hash).is_some() {
                    removed.push((hash, RemovalReason::IncludedInBlock));
                }
                for conflict in tx.conflicts() {
                    if inner.remove(&conflict).is_some() {
                        removed.push((conflict, RemovalReason::Conflict));
                    }
                }
            }
            let expired: Vec<UInt256> = inner
                .by_hash
                .values()
                .filter(|entry| entry.tx.valid_until_block <= new_height)
                .map(|entry| entry.tx.hash())
                .collect();
            for hash in expired {
                inner.remove(&hash);
                removed.push((hash, RemovalReason::Expired));
            }
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), height = new_height, "mempool culled");
        }
        for (hash, reason) in removed {
            self.events
                .publish(LedgerEvent::TransactionRemoved { hash, reason });
        }
    }

    /// Re-verifies the remaining entries against a fresh snapshot,
    /// dropping transactions the new state no longer supports (spent
    /// balances, new policy blocks).
    pub fn revalidate(&self, snapshot: &DataCache, height: u32) {
        let entries: Vec<Arc<Transaction>> = self.sorted_transactions();
        let mut removed: Vec<UInt256> = Vec::new();
        for tx in entries {
            let balance = GasToken::balance_of(snapshot, &tx.sender());
            let blocked = tx
                .signers
                .iter()
                .any(|signer| policy_contract::is_blocked(snapshot, &signer.account));
            let expired = tx.valid_until_block <= height;
            if blocked || expired || balance < BigInt::from(tx.system_fee + tx.network_fee) {
                removed.push(tx.hash());
            }
        }
        if removed.is_empty() {
            return;
        }
        {
            let mut inner = self.inner.lock();
            for hash in &removed {
                inner.remove(hash);
            }
        }
        for hash in removed {
            self.events.publish(LedgerEvent::TransactionRemoved {
                hash,
                reason: RemovalReason::NoLongerValid,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_core::{Signer, TransactionAttribute, UInt160, Witness};
    use neo3_persistence::MemoryStore;

    fn test_pool(capacity: usize) -> (MemoryPool, LedgerEventBus) {
        let events = LedgerEventBus::default();
        let mut config = MempoolConfig::new(ProtocolSettings::default_private());
        config.capacity = capacity;
        config.verify_witnesses = false;
        (MemoryPool::new(config, events.clone()), events)
    }

    fn snapshot_with_rich_sender(sender: UInt160) -> DataCache {
        // The pool checks GAS balances and fee floors against state; give
        // the sender plenty and set no extra policy.
        let cache = DataCache::from_store(&MemoryStore::new());
        let key = neo3_persistence::StorageKey::new(
            neo3_smart_contract::native::gas_token::GAS_ID,
            {
                let mut k = vec![neo3_smart_contract::native::fungible_token::PREFIX_BALANCE];
                k.extend_from_slice(sender.as_bytes());
                k
            },
        )
        .to_store_key();
        cache.put(key, BigInt::from(1_000_000_000i64).to_signed_bytes_le());
        cache
    }

    fn tx_with_fee(nonce: u32, fee_per_byte: i64, sender: UInt160) -> Transaction {
        let mut tx = Transaction {
            version: 0,
            nonce,
            system_fee: 0,
            network_fee: 0,
            valid_until_block: 100,
            signers: vec![Signer::called_by_entry(sender)],
            attributes: vec![],
            script: vec![0x40],
            witnesses: vec![Witness::empty()],
        };
        tx.network_fee = fee_per_byte * tx.size() as i64;
        tx
    }

    fn sender() -> UInt160 {
        UInt160::from_script(b"pool sender")
    }

    #[test]
    fn ordering_is_fee_descending_then_arrival() {
        let (pool, _) = test_pool(10);
        let snapshot = snapshot_with_rich_sender(sender());
        for (nonce, fee) in [(1u32, 2000i64), (2, 5000), (3, 2000)] {
            assert_eq!(
                pool.try_add(tx_with_fee(nonce, fee, sender()), &snapshot, 0),
                VerifyResult::Succeed
            );
        }
        let sorted = pool.sorted_transactions();
        let fees: Vec<i64> = sorted.iter().map(|tx| tx.fee_per_byte()).collect();
        assert!(fees.windows(2).all(|w| w[0] >= w[1]));
        // Equal fees: the earlier arrival (nonce 1) first.
        assert_eq!(sorted[1].nonce, 1);
        assert_eq!(sorted[2].nonce, 3);
    }

    #[test]
    fn eviction_drops_the_minimum_and_fires_event() {
        let (pool, events) = test_pool(3);
        let mut receiver = events.subscribe();
        let snapshot = snapshot_with_rich_sender(sender());
        for (nonce, fee) in [(1u32, 1000i64), (2, 2000), (3, 3000)] {
            assert!(pool
                .try_add(tx_with_fee(nonce, fee, sender()), &snapshot, 0)
                .is_ok());
        }
        let evicted_hash = tx_with_fee(1, 1000, sender()).hash();

        // A better-paying fourth transaction evicts the minimum.
        assert_eq!(
            pool.try_add(tx_with_fee(4, 2500, sender()), &snapshot, 0),
            VerifyResult::Succeed
        );
        assert_eq!(pool.len(), 3);
        assert!(!pool.contains(&evicted_hash));

        let mut saw_low_priority = false;
        while let Ok(event) = receiver.try_recv() {
            if let LedgerEvent::TransactionRemoved { hash, reason } = event {
                if hash == evicted_hash {
                    assert_eq!(reason, RemovalReason::LowPriority);
                    saw_low_priority = true;
                }
            }
        }
        assert!(saw_low_priority);
    }

    #[test]
    fn full_pool_rejects_non_improving_fee() {
        let (pool, _) = test_pool(2);
        let snapshot = snapshot_with_rich_sender(sender());
        assert!(pool
            .try_add(tx_with_fee(1, 2000, sender()), &snapshot, 0)
            .is_ok());
        assert!(pool
            .try_add(tx_with_fee(2, 3000, sender()), &snapshot, 0)
            .is_ok());
        assert_eq!(
            pool.try_add(tx_with_fee(3, 1000, sender()), &snapshot, 0),
            VerifyResult::OutOfMemory
        );
    }

    #[test]
    fn duplicate_hash_is_rejected() {
        let (pool, _) = test_pool(10);
        let snapshot = snapshot_with_rich_sender(sender());
        let tx = tx_with_fee(1, 2000, sender());
        assert!(pool.try_add(tx.clone(), &snapshot, 0).is_ok());
        assert_eq!(
            pool.try_add(tx, &snapshot, 0),
            VerifyResult::AlreadyExists
        );
    }

    #[test]
    fn expired_transactions_are_rejected_and_culled() {
        let (pool, _) = test_pool(10);
        let snapshot = snapshot_with_rich_sender(sender());
        let tx = tx_with_fee(1, 2000, sender());
        // Height beyond valid_until_block.
        assert_eq!(
            pool.try_add(tx, &snapshot, 200),
            VerifyResult::Expired
        );
    }

    #[test]
    fn conflicting_transaction_needs_higher_fee() {
        let (pool, _) = test_pool(10);
        let snapshot = snapshot_with_rich_sender(sender());
        let victim = tx_with_fee(1, 2000, sender());
        let victim_hash = victim.hash();
        assert!(pool.try_add(victim, &snapshot, 0).is_ok());

        let mut cheap_attacker = tx_with_fee(2, 1000, sender());
        cheap_attacker.attributes = vec![TransactionAttribute::Conflicts { hash: victim_hash }];
        assert_eq!(
            pool.try_add(cheap_attacker, &snapshot, 0),
            VerifyResult::HasConflicts
        );

        let mut rich_attacker = tx_with_fee(3, 50_000, sender());
        rich_attacker.attributes = vec![TransactionAttribute::Conflicts { hash: victim_hash }];
        assert_eq!(
            pool.try_add(rich_attacker, &snapshot, 0),
            VerifyResult::Succeed
        );
        assert!(!pool.contains(&victim_hash));
    }

    #[test]
    fn selection_respects_budgets_and_conflicts() {
        let (pool, _) = test_pool(10);
        let snapshot = snapshot_with_rich_sender(sender());
        for nonce in 1u32..=5 {
            assert!(pool
                .try_add(
                    tx_with_fee(nonce, 1000 * nonce as i64, sender()),
                    &snapshot,
                    0
                )
                .is_ok());
        }
        let picked = pool.select_for_block(3, usize::MAX, i64::MAX);
        assert_eq!(picked.len(), 3);
        // Best fees first.
        assert!(picked[0].fee_per_byte() >= picked[1].fee_per_byte());
    }
}
