//! `System.Runtime.*` services.

use super::{descriptor, InteropDescriptor};
use crate::application_engine::ApplicationEngine;
use crate::call_flags::CallFlags;
use crate::error::{ContractError, ContractResult};
use neo3_vm::StackItem;

pub(super) fn descriptors() -> Vec<InteropDescriptor> {
    vec![
        descriptor("System.Runtime.Platform", 1 << 3, CallFlags::NONE, platform),
        descriptor("System.Runtime.GetNetwork", 1 << 3, CallFlags::NONE, get_network),
        descriptor(
            "System.Runtime.GetAddressVersion",
            1 << 3,
            CallFlags::NONE,
            get_address_version,
        ),
        descriptor("System.Runtime.GetTrigger", 1 << 3, CallFlags::NONE, get_trigger),
        descriptor("System.Runtime.GetTime", 1 << 3, CallFlags::NONE, get_time),
        descriptor(
            "System.Runtime.GetScriptContainer",
            1 << 3,
            CallFlags::NONE,
            get_script_container,
        ),
        descriptor(
            "System.Runtime.GetExecutingScriptHash",
            1 << 4,
            CallFlags::NONE,
            get_executing_script_hash,
        ),
        descriptor(
            "System.Runtime.GetCallingScriptHash",
            1 << 4,
            CallFlags::NONE,
            get_calling_script_hash,
        ),
        descriptor(
            "System.Runtime.GetEntryScriptHash",
            1 << 4,
            CallFlags::NONE,
            get_entry_script_hash,
        ),
        descriptor(
            "System.Runtime.GetInvocationCounter",
            1 << 4,
            CallFlags::NONE,
            get_invocation_counter,
        ),
        descriptor("System.Runtime.GetRandom", 1 << 4, CallFlags::NONE, get_random),
        descriptor("System.Runtime.GasLeft", 1 << 4, CallFlags::NONE, gas_left),
        descriptor("System.Runtime.BurnGas", 1 << 4, CallFlags::NONE, burn_gas),
        descriptor(
            "System.Runtime.CheckWitness",
            1 << 10,
            CallFlags::NONE,
            check_witness,
        ),
        descriptor("System.Runtime.Log", 1 << 15, CallFlags::ALLOW_NOTIFY, log),
        descriptor("System.Runtime.Notify", 1 << 15, CallFlags::ALLOW_NOTIFY, notify),
        descriptor(
            "System.Runtime.GetNotifications",
            1 << 12,
            CallFlags::NONE,
            get_notifications,
        ),
    ]
}

fn platform(engine: &mut ApplicationEngine) -> ContractResult<()> {
    engine.push(StackItem::from_bytes(b"NEO".to_vec()))
}

fn get_network(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let network = engine.settings().network;
    engine.push(StackItem::from_int(network))
}

fn get_address_version(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let version = engine.settings().address_version;
    engine.push(StackItem::from_int(version))
}

fn get_trigger(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let trigger = engine.trigger() as u8;
    engine.push(StackItem::from_int(trigger))
}

fn get_time(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let time = engine.now_ms()?;
    engine.push(StackItem::from_int(time))
}

fn get_script_container(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let Some(tx) = engine.container().cloned() else {
        return engine.push(StackItem::Null);
    };
    // The container surfaces as [hash, version, nonce, sender, sysfee,
    // netfee, valid_until_block, script].
    let item = StackItem::array(vec![
        StackItem::from_bytes(tx.hash().to_array().to_vec()),
        StackItem::from_int(tx.version),
        StackItem::from_int(tx.nonce),
        StackItem::from_bytes(tx.sender().to_array().to_vec()),
        StackItem::from_int(tx.system_fee),
        StackItem::from_int(tx.network_fee),
        StackItem::from_int(tx.valid_until_block),
        StackItem::from_bytes(tx.script.clone()),
    ]);
    engine.push(item)
}

fn get_executing_script_hash(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let hash = engine.current_script_hash()?;
    engine.push(StackItem::from_bytes(hash.to_array().to_vec()))
}

fn get_calling_script_hash(engine: &mut ApplicationEngine) -> ContractResult<()> {
    match engine.calling_script_hash() {
        Some(hash) => engine.push(StackItem::from_bytes(hash.to_array().to_vec())),
        None => engine.push(StackItem::Null),
    }
}

fn get_entry_script_hash(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let hash = engine.entry_script_hash()?;
    engine.push(StackItem::from_bytes(hash.to_array().to_vec()))
}

fn get_invocation_counter(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let hash = engine.current_script_hash()?;
    let counter = engine.invocation_counter(&hash);
    engine.push(StackItem::from_int(counter))
}

fn get_random(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let value = engine.next_random();
    engine.push(StackItem::Integer(value))
}

fn gas_left(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let left = engine.gas_left();
    engine.push(StackItem::from_int(left))
}

fn burn_gas(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let amount = engine.pop_int()?;
    let amount = i64::try_from(&amount)
        .map_err(|_| ContractError::invalid_argument(format!("burn amount {amount}")))?;
    if amount <= 0 {
        return Err(ContractError::invalid_argument("burn amount must be positive"));
    }
    engine.add_gas(amount)
}

fn check_witness(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let bytes = engine.pop_bytes()?;
    // Accepts either a script hash or a compressed public key.
    let account = match bytes.len() {
        20 => neo3_core::UInt160::from_bytes(&bytes)
            .map_err(|e| ContractError::invalid_argument(e.to_string()))?,
        33 => {
            let script = crate::contract::create_signature_redeem_script_from_bytes(&bytes)?;
            neo3_core::UInt160::from_script(&script)
        }
        other => {
            return Err(ContractError::invalid_argument(format!(
                "witness account of {other} bytes"
            )));
        }
    };
    let result = engine.check_witness(&account)?;
    engine.push(StackItem::from_bool(result))
}

fn log(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let message = engine.pop_bytes()?;
    let message = String::from_utf8(message)
        .map_err(|_| ContractError::invalid_argument("log message is not UTF-8"))?;
    engine.log(message)
}

fn notify(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let state = engine.pop()?;
    let name = engine.pop_bytes()?;
    let name = String::from_utf8(name)
        .map_err(|_| ContractError::invalid_argument("event name is not UTF-8"))?;
    engine.notify(name, state)
}

fn get_notifications(engine: &mut ApplicationEngine) -> ContractResult<()> {
    let filter = engine.pop()?;
    let filter_hash = if filter.is_null() {
        None
    } else {
        let bytes = filter.as_bytes()?;
        Some(
            neo3_core::UInt160::from_bytes(&bytes)
                .map_err(|e| ContractError::invalid_argument(e.to_string()))?,
        )
    };
    let items: Vec<StackItem> = engine
        .notifications()
        .iter()
        .filter(|n| filter_hash.map_or(true, |h| n.script_hash == h))
        .map(|n| {
            StackItem::array(vec![
                StackItem::from_bytes(n.script_hash.to_array().to_vec()),
                StackItem::from_bytes(n.name.as_bytes().to_vec()),
                n.state.clone(),
            ])
        })
        .collect();
    engine.push(StackItem::array(items))
}
