//! Block application against an in-memory chain.

use neo3_config::ProtocolSettings;
use neo3_core::{Block, BlockHeader, UInt256, Witness};
use neo3_cryptography::KeyPair;
use neo3_ledger::{Blockchain, LedgerEvent, LedgerEventBus};
use neo3_persistence::MemoryStore;
use neo3_smart_contract::create_multisig_redeem_script;
use neo3_vm::ScriptBuilder;
use std::sync::Arc;

/// A single-validator network whose private key the test holds.
fn single_validator_settings(pair: &KeyPair) -> ProtocolSettings {
    ProtocolSettings {
        standby_committee: vec![pair.public_key().to_string()],
        validators_count: 1,
        ..ProtocolSettings::default_private()
    }
}

fn chain(pair: &KeyPair) -> (Blockchain, LedgerEventBus) {
    let events = LedgerEventBus::default();
    let chain = Blockchain::new(
        Arc::new(MemoryStore::new()),
        single_validator_settings(pair),
        events.clone(),
    )
    .unwrap();
    (chain, events)
}

fn next_block(chain: &Blockchain, pair: &KeyPair) -> Block {
    let height = chain.height().unwrap();
    let prev = chain.block_by_index(height).unwrap();
    let mut block = Block {
        header: BlockHeader {
            version: 0,
            prev_hash: prev.hash(),
            merkle_root: UInt256::zero(),
            timestamp_ms: prev.header.timestamp_ms + 15_000,
            nonce: 7,
            index: height + 1,
            primary_index: 0,
            next_consensus: prev.header.next_consensus,
            witness: Witness::empty(),
        },
        transactions: Vec::new(),
    };
    block.header.merkle_root = block.compute_merkle_root();

    // 1-of-1 multisig witness over the header.
    let verification =
        create_multisig_redeem_script(1, &[*pair.public_key()]).unwrap();
    let signature = pair.sign(&block.header.sign_data(chain.settings().network));
    let mut invocation = ScriptBuilder::new();
    invocation.emit_push_bytes(&signature).unwrap();
    block.header.witness = Witness::new(invocation.to_bytes(), verification);
    block
}

#[test]
fn genesis_initializes_height_zero() {
    let pair = KeyPair::generate();
    let (chain, _) = chain(&pair);
    assert_eq!(chain.height(), Some(0));
    let genesis = chain.block_by_index(0).unwrap();
    assert!(genesis.header.prev_hash.is_zero());
    assert_eq!(chain.current_hash(), Some(genesis.hash()));
}

#[test]
fn applying_a_signed_block_advances_the_chain() {
    let pair = KeyPair::generate();
    let (chain, events) = chain(&pair);
    let mut receiver = events.subscribe();

    let block = next_block(&chain, &pair);
    chain.apply_block(&block).unwrap();

    assert_eq!(chain.height(), Some(1));
    assert_eq!(chain.current_hash(), Some(block.hash()));
    assert_eq!(chain.block_by_index(1).unwrap().hash(), block.hash());

    let mut committing = false;
    let mut committed = false;
    while let Ok(event) = receiver.try_recv() {
        match event {
            LedgerEvent::BlockCommitting { block: b, .. } if b.index() == 1 => {
                committing = true;
                assert!(!committed, "Committing must precede Committed");
            }
            LedgerEvent::BlockCommitted(b) if b.index() == 1 => committed = true,
            _ => {}
        }
    }
    assert!(committing && committed);
}

#[test]
fn replaying_a_block_is_rejected() {
    let pair = KeyPair::generate();
    let (chain, _) = chain(&pair);
    let block = next_block(&chain, &pair);
    chain.apply_block(&block).unwrap();
    assert!(chain.apply_block(&block).is_err());
    assert_eq!(chain.height(), Some(1));
}

#[test]
fn bad_witness_leaves_state_untouched() {
    let pair = KeyPair::generate();
    let (chain, _) = chain(&pair);
    let mut block = next_block(&chain, &pair);
    // Replace the signature with garbage.
    let mut invocation = ScriptBuilder::new();
    invocation.emit_push_bytes(&[0u8; 64]).unwrap();
    block.header.witness.invocation_script = invocation.to_bytes();

    assert!(chain.apply_block(&block).is_err());
    assert_eq!(chain.height(), Some(0));
}

#[test]
fn stale_timestamp_is_rejected() {
    let pair = KeyPair::generate();
    let (chain, _) = chain(&pair);
    let mut block = next_block(&chain, &pair);
    block.header.timestamp_ms = 0;
    // Re-sign after mutating the header.
    let signature = pair.sign(&block.header.sign_data(chain.settings().network));
    let mut invocation = ScriptBuilder::new();
    invocation.emit_push_bytes(&signature).unwrap();
    block.header.witness.invocation_script = invocation.to_bytes();

    assert!(chain.apply_block(&block).is_err());
    assert_eq!(chain.height(), Some(0));
}

#[test]
fn import_applies_blocks_in_order() {
    let pair = KeyPair::generate();
    let (chain, _) = chain(&pair);
    let first = next_block(&chain, &pair);
    chain.apply_block(&first).unwrap();
    let second = next_block(&chain, &pair);
    chain.import(std::slice::from_ref(&second)).unwrap();
    assert_eq!(chain.height(), Some(2));
}
