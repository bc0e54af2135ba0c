//! Read-only ledger queries exposed to contracts.

use super::{NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::error::{ContractError, ContractResult};
use neo3_core::{Block, Transaction, UInt256};
use neo3_io::SerializableExt;
use neo3_persistence::{DataCache, DataPrefix};
use neo3_vm::StackItem;

/// Contract id of the ledger contract.
pub const LEDGER_ID: i32 = -4;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("currentHash", 1 << 15),
    NativeMethod::safe("currentIndex", 1 << 15),
    NativeMethod::safe("getBlock", 1 << 15),
    NativeMethod::safe("getTransaction", 1 << 15),
    NativeMethod::safe("getTransactionHeight", 1 << 15),
];

/// The best block height, or `None` before genesis.
pub fn current_index(snapshot: &DataCache) -> Option<u32> {
    snapshot
        .get(&DataPrefix::CurrentIndex.key(&[]))
        .map(|bytes| u32::from_le_bytes(bytes[..4].try_into().unwrap_or_default()))
}

/// The best block hash.
pub fn current_hash(snapshot: &DataCache) -> Option<UInt256> {
    snapshot
        .get(&DataPrefix::CurrentHash.key(&[]))
        .and_then(|bytes| UInt256::from_bytes(&bytes).ok())
}

/// A block by hash.
pub fn block_by_hash(snapshot: &DataCache, hash: &UInt256) -> Option<Block> {
    snapshot
        .get(&DataPrefix::Block.key(hash.as_bytes()))
        .and_then(|bytes| Block::from_array(&bytes).ok())
}

/// A block hash by height.
pub fn block_hash_by_index(snapshot: &DataCache, index: u32) -> Option<UInt256> {
    snapshot
        .get(&DataPrefix::BlockHashByIndex.key(&index.to_le_bytes()))
        .and_then(|bytes| UInt256::from_bytes(&bytes).ok())
}

/// A transaction with the height it landed at.
pub fn transaction_by_hash(
    snapshot: &DataCache,
    hash: &UInt256,
) -> Option<(u32, Transaction)> {
    let bytes = snapshot.get(&DataPrefix::Transaction.key(hash.as_bytes()))?;
    if bytes.len() < 4 {
        return None;
    }
    let height = u32::from_le_bytes(bytes[..4].try_into().expect("4 bytes"));
    let tx = Transaction::from_array(&bytes[4..]).ok()?;
    Some((height, tx))
}

/// Whether `hash` is already on the ledger within the traceability window.
pub fn contains_transaction(snapshot: &DataCache, hash: &UInt256) -> bool {
    snapshot.contains(&DataPrefix::Transaction.key(hash.as_bytes()))
}

fn block_to_item(block: &Block) -> StackItem {
    StackItem::array(vec![
        StackItem::from_bytes(block.hash().to_array().to_vec()),
        StackItem::from_int(block.header.version),
        StackItem::from_bytes(block.header.prev_hash.to_array().to_vec()),
        StackItem::from_bytes(block.header.merkle_root.to_array().to_vec()),
        StackItem::from_int(block.header.timestamp_ms),
        StackItem::from_int(block.header.nonce),
        StackItem::from_int(block.header.index),
        StackItem::from_int(block.header.primary_index),
        StackItem::from_bytes(block.header.next_consensus.to_array().to_vec()),
        StackItem::from_int(block.transactions.len() as i64),
    ])
}

fn tx_to_item(height: u32, tx: &Transaction) -> StackItem {
    StackItem::array(vec![
        StackItem::from_bytes(tx.hash().to_array().to_vec()),
        StackItem::from_int(tx.version),
        StackItem::from_int(tx.nonce),
        StackItem::from_bytes(tx.sender().to_array().to_vec()),
        StackItem::from_int(tx.system_fee),
        StackItem::from_int(tx.network_fee),
        StackItem::from_int(tx.valid_until_block),
        StackItem::from_bytes(tx.script.clone()),
        StackItem::from_int(height),
    ])
}

/// The ledger native contract.
pub struct LedgerContract;

impl NativeContract for LedgerContract {
    fn id(&self) -> i32 {
        LEDGER_ID
    }

    fn name(&self) -> &'static str {
        "LedgerContract"
    }

    fn methods(&self) -> &'static [NativeMethod] {
        METHODS
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: &[StackItem],
    ) -> ContractResult<StackItem> {
        let snapshot = engine.snapshot().clone();
        match method {
            "currentHash" => Ok(current_hash(&snapshot)
                .map(|h| StackItem::from_bytes(h.to_array().to_vec()))
                .unwrap_or(StackItem::Null)),
            "currentIndex" => Ok(current_index(&snapshot)
                .map(StackItem::from_int)
                .unwrap_or(StackItem::Null)),
            "getBlock" => {
                let argument = args
                    .first()
                    .ok_or_else(|| ContractError::invalid_argument("missing block id"))?;
                let bytes = argument.as_bytes()?;
                // Either a 32-byte hash or a little-endian height.
                let hash = if bytes.len() == 32 {
                    UInt256::from_bytes(&bytes)
                        .map_err(|e| ContractError::invalid_argument(e.to_string()))?
                } else {
                    let index = argument.as_int()?;
                    let index = u32::try_from(&index).map_err(|_| {
                        ContractError::invalid_argument(format!("block index {index}"))
                    })?;
                    match block_hash_by_index(&snapshot, index) {
                        Some(hash) => hash,
                        None => return Ok(StackItem::Null),
                    }
                };
                Ok(block_by_hash(&snapshot, &hash)
                    .map(|block| block_to_item(&block))
                    .unwrap_or(StackItem::Null))
            }
            "getTransaction" => {
                let hash = parse_hash(args)?;
                Ok(transaction_by_hash(&snapshot, &hash)
                    .map(|(height, tx)| tx_to_item(height, &tx))
                    .unwrap_or(StackItem::Null))
            }
            "getTransactionHeight" => {
                let hash = parse_hash(args)?;
                Ok(transaction_by_hash(&snapshot, &hash)
                    .map(|(height, _)| StackItem::from_int(height))
                    .unwrap_or_else(|| StackItem::from_int(-1)))
            }
            other => Err(ContractError::contract_not_found(format!(
                "LedgerContract::{other}"
            ))),
        }
    }
}

fn parse_hash(args: &[StackItem]) -> ContractResult<UInt256> {
    let bytes = args
        .first()
        .ok_or_else(|| ContractError::invalid_argument("missing hash"))?
        .as_bytes()?;
    UInt256::from_bytes(&bytes).map_err(|e| ContractError::invalid_argument(e.to_string()))
}
