//! Token scenarios against a fresh snapshot.

use neo3_config::ProtocolSettings;
use neo3_core::{Signer, Transaction, UInt160, Witness};
use neo3_persistence::{DataCache, MemoryStore};
use neo3_smart_contract::native::{gas_token, GasToken, NativeContract, NativeRegistry};
use neo3_smart_contract::{ApplicationEngine, CallFlags, TriggerType};
use neo3_vm::{OpCode, StackItem};
use num_bigint::BigInt;
use std::sync::Arc;

fn account(tag: &[u8]) -> UInt160 {
    UInt160::from_script(tag)
}

fn engine_with_signer(signer: UInt160) -> ApplicationEngine {
    let tx = Transaction {
        version: 0,
        nonce: 7,
        system_fee: 0,
        network_fee: 0,
        valid_until_block: 100,
        signers: vec![Signer::global(signer)],
        attributes: vec![],
        script: vec![OpCode::RET as u8],
        witnesses: vec![Witness::empty()],
    };
    let snapshot = Arc::new(DataCache::from_store(&MemoryStore::new()));
    let mut engine = ApplicationEngine::new(
        TriggerType::Application,
        Some(tx),
        snapshot,
        None,
        ProtocolSettings::default_private(),
        i64::MAX,
    );
    // An entry context so native calls have somewhere to return values.
    engine
        .load_script(vec![OpCode::RET as u8], CallFlags::ALL, -1)
        .unwrap();
    engine
}

#[test]
fn gas_transfer_round_trip() {
    let a = account(b"account-a");
    let b = account(b"account-b");
    let mut engine = engine_with_signer(a);

    // Mint 1000 GAS to A.
    GasToken::mint(&mut engine, &a, &BigInt::from(1000)).unwrap();
    let supply_before = GasToken::total_supply(engine.snapshot());

    // Transfer 300 from A to B through the NEP-17 surface.
    let registry = NativeRegistry::new();
    let gas_hash = registry.by_id(gas_token::GAS_ID).unwrap().hash();
    engine
        .call_contract(
            gas_hash,
            "transfer",
            CallFlags::ALL,
            vec![
                StackItem::from_bytes(a.to_array().to_vec()),
                StackItem::from_bytes(b.to_array().to_vec()),
                StackItem::from_int(300),
            ],
        )
        .unwrap();

    assert_eq!(
        GasToken::balance_of(engine.snapshot(), &a),
        BigInt::from(700)
    );
    assert_eq!(
        GasToken::balance_of(engine.snapshot(), &b),
        BigInt::from(300)
    );
    assert_eq!(GasToken::total_supply(engine.snapshot()), supply_before);

    // Exactly one Transfer(A, B, 300) notification beyond the mint's.
    let transfers: Vec<_> = engine
        .notifications()
        .iter()
        .filter(|n| n.name == "Transfer")
        .collect();
    assert_eq!(transfers.len(), 2);
    let state = transfers[1].state.as_array().unwrap();
    let state = state.borrow();
    assert_eq!(state[0].as_bytes().unwrap(), a.to_array().to_vec());
    assert_eq!(state[1].as_bytes().unwrap(), b.to_array().to_vec());
    assert_eq!(state[2].as_int().unwrap(), BigInt::from(300));
}

#[test]
fn transfer_without_witness_returns_false() {
    let a = account(b"account-a");
    let b = account(b"account-b");
    // The container is signed by B, not A.
    let mut engine = engine_with_signer(b);
    GasToken::mint(&mut engine, &a, &BigInt::from(1000)).unwrap();

    let registry = NativeRegistry::new();
    let gas_hash = registry.by_id(gas_token::GAS_ID).unwrap().hash();
    engine
        .call_contract(
            gas_hash,
            "transfer",
            CallFlags::ALL,
            vec![
                StackItem::from_bytes(a.to_array().to_vec()),
                StackItem::from_bytes(b.to_array().to_vec()),
                StackItem::from_int(300),
            ],
        )
        .unwrap();
    // The call pushes `false` and moves nothing.
    assert_eq!(
        GasToken::balance_of(engine.snapshot(), &a),
        BigInt::from(1000)
    );
}

#[test]
fn transfer_beyond_balance_returns_false() {
    let a = account(b"account-a");
    let b = account(b"account-b");
    let mut engine = engine_with_signer(a);
    GasToken::mint(&mut engine, &a, &BigInt::from(100)).unwrap();

    let registry = NativeRegistry::new();
    let gas_hash = registry.by_id(gas_token::GAS_ID).unwrap().hash();
    engine
        .call_contract(
            gas_hash,
            "transfer",
            CallFlags::ALL,
            vec![
                StackItem::from_bytes(a.to_array().to_vec()),
                StackItem::from_bytes(b.to_array().to_vec()),
                StackItem::from_int(300),
            ],
        )
        .unwrap();
    assert_eq!(
        GasToken::balance_of(engine.snapshot(), &a),
        BigInt::from(100)
    );
    assert_eq!(GasToken::balance_of(engine.snapshot(), &b), BigInt::from(0));
}

#[test]
fn out_of_gas_faults_the_engine() {
    let snapshot = Arc::new(DataCache::from_store(&MemoryStore::new()));
    let mut engine = ApplicationEngine::new(
        TriggerType::Application,
        None,
        snapshot,
        None,
        ProtocolSettings::default_private(),
        // Far below the price of even a handful of instructions.
        10,
    );
    // An infinite loop must stop on the gas meter, not run forever.
    engine
        .load_script(
            vec![OpCode::NOP as u8, OpCode::JMP as u8, (-1i8) as u8],
            CallFlags::ALL,
            -1,
        )
        .unwrap();
    let state = engine.execute();
    assert_eq!(state, neo3_vm::VMState::Fault);
    assert!(engine.fault_message().unwrap().contains("out of gas"));
}

#[test]
fn notifications_are_rejected_during_verification() {
    let snapshot = Arc::new(DataCache::from_store(&MemoryStore::new()));
    let mut engine = ApplicationEngine::new(
        TriggerType::Verification,
        None,
        snapshot,
        None,
        ProtocolSettings::default_private(),
        1_000_000,
    );
    engine
        .load_script(vec![OpCode::RET as u8], CallFlags::ALL, -1)
        .unwrap();
    assert!(engine
        .notify("Event".to_string(), StackItem::Null)
        .is_err());
}
