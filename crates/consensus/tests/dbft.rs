//! dBFT rounds over four in-process validators.

use neo3_config::ProtocolSettings;
use neo3_consensus::{ConsensusNetwork, ConsensusPayload, DbftEngine};
use neo3_core::{Signer, Transaction, UInt256, Witness};
use neo3_cryptography::KeyPair;
use neo3_ledger::{Blockchain, LedgerEventBus, MemoryPool, MempoolConfig, VerifyResult};
use neo3_persistence::MemoryStore;
use parking_lot::Mutex;
use std::sync::Arc;

/// Collects broadcasts for manual delivery.
#[derive(Default)]
struct Loopback {
    outbox: Mutex<Vec<ConsensusPayload>>,
}

impl ConsensusNetwork for Loopback {
    fn broadcast(&self, payload: ConsensusPayload) {
        self.outbox.lock().push(payload);
    }

    fn request_transactions(&self, _hashes: &[UInt256]) {}
}

struct Net {
    engines: Vec<DbftEngine>,
    mempools: Vec<Arc<MemoryPool>>,
    chains: Vec<Arc<Blockchain>>,
    buses: Vec<Arc<Loopback>>,
}

fn four_validator_net() -> Net {
    let pairs: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();
    let mut committee: Vec<String> = pairs.iter().map(|p| p.public_key().to_string()).collect();
    committee.sort();
    let settings = ProtocolSettings {
        standby_committee: committee,
        validators_count: 4,
        ..ProtocolSettings::default_private()
    };

    let mut engines = Vec::new();
    let mut mempools = Vec::new();
    let mut chains = Vec::new();
    let mut buses = Vec::new();
    for pair in pairs {
        let chain = Arc::new(
            Blockchain::new(
                Arc::new(MemoryStore::new()),
                settings.clone(),
                LedgerEventBus::default(),
            )
            .unwrap(),
        );
        let mut pool_config = MempoolConfig::new(settings.clone());
        pool_config.verify_witnesses = false;
        let mempool = Arc::new(MemoryPool::new(pool_config, LedgerEventBus::default()));
        let bus = Arc::new(Loopback::default());
        let engine = DbftEngine::new(
            Arc::clone(&chain),
            Arc::clone(&mempool),
            bus.clone(),
            Some(pair),
        )
        .unwrap();
        engines.push(engine);
        mempools.push(mempool);
        chains.push(chain);
        buses.push(bus);
    }
    Net {
        engines,
        mempools,
        chains,
        buses,
    }
}

/// Delivers every broadcast to every engine until the network quiesces.
fn pump(net: &mut Net) {
    loop {
        let mut pending: Vec<ConsensusPayload> = Vec::new();
        for bus in &net.buses {
            pending.append(&mut bus.outbox.lock());
        }
        if pending.is_empty() {
            return;
        }
        for payload in pending {
            for engine in net.engines.iter_mut() {
                // Round mismatches and stale messages just drop.
                let _ = engine.on_payload(&payload);
            }
        }
    }
}

fn funded_tx(net: &Net, nonce: u32) -> Transaction {
    // The genesis GAS sits on the validators' multisig address; using it
    // as sender passes the balance check without extra setup.
    let genesis = net.chains[0].block_by_index(0).unwrap();
    let sender = genesis.header.next_consensus;
    Transaction {
        version: 0,
        nonce,
        system_fee: 0,
        network_fee: 1_000_000,
        valid_until_block: 100,
        signers: vec![Signer::called_by_entry(sender)],
        attributes: vec![],
        script: vec![0x40],
        witnesses: vec![Witness::empty()],
    }
}

/// Index into `net.engines` of the validator that leads `view`.
fn primary_for_view(net: &Net, view: u8) -> usize {
    let validator = net.engines[0].context().primary_index(view);
    net.engines
        .iter()
        .position(|engine| engine.context().my_index == Some(validator))
        .expect("every validator slot is held by an engine")
}

#[test]
fn happy_path_commits_a_block_with_transactions() {
    let mut net = four_validator_net();

    // Both transactions are known to every validator.
    for tx in [funded_tx(&net, 1), funded_tx(&net, 2)] {
        for (pool, chain) in net.mempools.iter().zip(net.chains.iter()) {
            assert_eq!(
                pool.try_add(tx.clone(), &chain.snapshot(), 0),
                VerifyResult::Succeed
            );
        }
    }

    // The primary's timer fires; the rest follows from message flow.
    let primary = primary_for_view(&net, 0);
    net.engines[primary].on_timer().unwrap();
    pump(&mut net);

    for chain in &net.chains {
        assert_eq!(chain.height(), Some(1), "every replica advances");
        let block = chain.block_by_index(1).unwrap();
        assert_eq!(block.transactions.len(), 2);
    }
    // Included transactions left every pool.
    for pool in &net.mempools {
        assert!(pool.is_empty());
    }
}

#[test]
fn view_change_elects_a_new_primary() {
    let mut net = four_validator_net();
    let silent_primary = primary_for_view(&net, 0);

    // The primary never proposes; the three backups time out.
    for index in 0..4 {
        if index != silent_primary {
            net.engines[index].on_timer().unwrap();
        }
    }
    pump(&mut net);

    for engine in &net.engines {
        assert_eq!(engine.context().view_number, 1, "view advanced");
    }

    // The view-1 primary proposes and the round completes.
    let new_primary = primary_for_view(&net, 1);
    assert_ne!(new_primary, silent_primary);
    net.engines[new_primary].on_timer().unwrap();
    pump(&mut net);

    for chain in &net.chains {
        assert_eq!(chain.height(), Some(1));
    }
}

#[test]
fn at_most_one_block_commits_per_height() {
    let mut net = four_validator_net();
    let primary = primary_for_view(&net, 0);
    net.engines[primary].on_timer().unwrap();
    pump(&mut net);

    let reference = net.chains[0].block_by_index(1).unwrap().hash();
    for chain in &net.chains {
        assert_eq!(chain.block_by_index(1).unwrap().hash(), reference);
    }

    // Replaying the whole conversation cannot fork height 1.
    let primary = primary_for_view(&net, 0);
    let _ = net.engines[primary].on_timer();
    pump(&mut net);
    for chain in &net.chains {
        assert_eq!(chain.block_by_index(1).unwrap().hash(), reference);
    }
}

#[test]
fn timer_doubles_with_each_view() {
    let net = four_validator_net();
    let base = net.engines[0].view_timeout();
    // The timeout is a function of the view; after a change it doubles.
    assert_eq!(base.as_millis() as u64, 15_000);
}
