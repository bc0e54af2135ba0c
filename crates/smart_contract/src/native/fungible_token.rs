//! Shared NEP-17 state plugin.
//!
//! Token natives are the configuration of this plugin plus their own
//! hooks: a descriptor names the owning native and an optional callback
//! runs before any balance change (the NEO token settles GAS there).

use crate::application_engine::ApplicationEngine;
use crate::error::{ContractError, ContractResult};
use crate::native;
use neo3_core::UInt160;
use neo3_persistence::DataCache;
use neo3_vm::StackItem;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};

/// Storage prefix of the total supply record.
pub const PREFIX_TOTAL_SUPPLY: u8 = 11;
/// Storage prefix of per-account balance records.
pub const PREFIX_BALANCE: u8 = 20;

/// Static token configuration.
#[derive(Debug, Clone, Copy)]
pub struct TokenDescriptor {
    pub contract_id: i32,
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Hook invoked before an account's balance changes.
pub type BalanceHook<'a> =
    &'a dyn Fn(&mut ApplicationEngine, &UInt160) -> ContractResult<()>;

pub fn total_supply(snapshot: &DataCache, token: &TokenDescriptor) -> BigInt {
    native::get_int(snapshot, token.contract_id, PREFIX_TOTAL_SUPPLY, &[])
}

pub fn balance_of(snapshot: &DataCache, token: &TokenDescriptor, account: &UInt160) -> BigInt {
    native::get_int(
        snapshot,
        token.contract_id,
        PREFIX_BALANCE,
        account.as_bytes(),
    )
}

fn set_balance(snapshot: &DataCache, token: &TokenDescriptor, account: &UInt160, value: &BigInt) {
    if value.is_zero() {
        native::delete_key(
            snapshot,
            token.contract_id,
            PREFIX_BALANCE,
            account.as_bytes(),
        );
    } else {
        native::put_int(
            snapshot,
            token.contract_id,
            PREFIX_BALANCE,
            account.as_bytes(),
            value,
        );
    }
}

fn notify_transfer(
    engine: &mut ApplicationEngine,
    from: Option<&UInt160>,
    to: Option<&UInt160>,
    amount: &BigInt,
) -> ContractResult<()> {
    let state = StackItem::array(vec![
        from.map_or(StackItem::Null, |a| {
            StackItem::from_bytes(a.to_array().to_vec())
        }),
        to.map_or(StackItem::Null, |a| {
            StackItem::from_bytes(a.to_array().to_vec())
        }),
        StackItem::Integer(amount.clone()),
    ]);
    engine.notify("Transfer".to_string(), state)
}

/// Creates `amount` tokens on `account`.
pub fn mint(
    engine: &mut ApplicationEngine,
    token: &TokenDescriptor,
    account: &UInt160,
    amount: &BigInt,
    hook: Option<BalanceHook>,
) -> ContractResult<()> {
    if amount.is_negative() {
        return Err(ContractError::invalid_argument("negative mint amount"));
    }
    if amount.is_zero() {
        return Ok(());
    }
    if let Some(hook) = hook {
        hook(engine, account)?;
    }
    let snapshot = engine.snapshot().clone();
    let balance = balance_of(&snapshot, token, account) + amount;
    set_balance(&snapshot, token, account, &balance);
    let supply = total_supply(&snapshot, token) + amount;
    native::put_int(&snapshot, token.contract_id, PREFIX_TOTAL_SUPPLY, &[], &supply);
    notify_transfer(engine, None, Some(account), amount)
}

/// Destroys `amount` tokens held by `account`.
pub fn burn(
    engine: &mut ApplicationEngine,
    token: &TokenDescriptor,
    account: &UInt160,
    amount: &BigInt,
    hook: Option<BalanceHook>,
) -> ContractResult<()> {
    if amount.is_negative() {
        return Err(ContractError::invalid_argument("negative burn amount"));
    }
    if amount.is_zero() {
        return Ok(());
    }
    if let Some(hook) = hook {
        hook(engine, account)?;
    }
    let snapshot = engine.snapshot().clone();
    let balance = balance_of(&snapshot, token, account);
    if balance < *amount {
        return Err(ContractError::invalid_operation(format!(
            "burn of {amount} exceeds balance {balance}"
        )));
    }
    set_balance(&snapshot, token, account, &(balance - amount));
    let supply = total_supply(&snapshot, token) - amount;
    native::put_int(&snapshot, token.contract_id, PREFIX_TOTAL_SUPPLY, &[], &supply);
    notify_transfer(engine, Some(account), None, amount)
}

/// NEP-17 transfer. Returns `false` (without error) when the sender's
/// witness is missing or the balance is insufficient.
pub fn transfer(
    engine: &mut ApplicationEngine,
    token: &TokenDescriptor,
    from: &UInt160,
    to: &UInt160,
    amount: &BigInt,
    hook: Option<BalanceHook>,
) -> ContractResult<bool> {
    if amount.is_negative() {
        return Err(ContractError::invalid_argument("negative transfer amount"));
    }
    // The sender must have witnessed the transaction, unless the caller is
    // the sender account itself (a contract moving its own funds).
    let authorized =
        engine.calling_script_hash() == Some(*from) || engine.check_witness(from)?;
    if !authorized {
        return Ok(false);
    }
    if let Some(hook) = hook.as_ref() {
        hook(engine, from)?;
        if from != to {
            hook(engine, to)?;
        }
    }
    let snapshot = engine.snapshot().clone();
    let from_balance = balance_of(&snapshot, token, from);
    if from_balance < *amount {
        return Ok(false);
    }
    if from != to && !amount.is_zero() {
        set_balance(&snapshot, token, from, &(&from_balance - amount));
        let to_balance = balance_of(&snapshot, token, to) + amount;
        set_balance(&snapshot, token, to, &to_balance);
    }
    notify_transfer(engine, Some(from), Some(to), amount)?;
    Ok(true)
}

/// Shared argument decoding for the NEP-17 surface.
pub fn parse_account(item: &StackItem) -> ContractResult<UInt160> {
    let bytes = item.as_bytes()?;
    UInt160::from_bytes(&bytes).map_err(|e| ContractError::invalid_argument(e.to_string()))
}

pub fn parse_amount(item: &StackItem) -> ContractResult<BigInt> {
    Ok(item.as_int()?)
}
