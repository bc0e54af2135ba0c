//! The policy contract: network-wide tunables.

use super::{neo_token, NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::error::{ContractError, ContractResult};
use neo3_core::UInt160;
use neo3_persistence::DataCache;
use neo3_vm::StackItem;
use num_traits::Zero;

/// Contract id of the policy contract.
pub const POLICY_ID: i32 = -7;

const PREFIX_BLOCKED_ACCOUNT: u8 = 15;
const PREFIX_FEE_PER_BYTE: u8 = 10;
const PREFIX_EXEC_FEE_FACTOR: u8 = 18;
const PREFIX_STORAGE_PRICE: u8 = 19;
const PREFIX_MAX_TRANSACTIONS_PER_BLOCK: u8 = 23;
const PREFIX_MAX_BLOCK_SIZE: u8 = 12;
const PREFIX_MAX_BLOCK_SYSTEM_FEE: u8 = 17;

/// Upper bound accepted by `setExecFeeFactor`.
const MAX_EXEC_FEE_FACTOR: i64 = 100;
/// Upper bound accepted by `setStoragePrice`.
const MAX_STORAGE_PRICE: i64 = 10_000_000;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("getFeePerByte", 1 << 15),
    NativeMethod::safe("getExecFeeFactor", 1 << 15),
    NativeMethod::safe("getStoragePrice", 1 << 15),
    NativeMethod::safe("getMaxTransactionsPerBlock", 1 << 15),
    NativeMethod::safe("getMaxBlockSize", 1 << 15),
    NativeMethod::safe("getMaxBlockSystemFee", 1 << 15),
    NativeMethod::safe("isBlocked", 1 << 15),
    NativeMethod::state_changing("setFeePerByte", 1 << 15, false),
    NativeMethod::state_changing("setExecFeeFactor", 1 << 15, false),
    NativeMethod::state_changing("setStoragePrice", 1 << 15, false),
    NativeMethod::state_changing("setMaxTransactionsPerBlock", 1 << 15, false),
    NativeMethod::state_changing("setMaxBlockSize", 1 << 15, false),
    NativeMethod::state_changing("setMaxBlockSystemFee", 1 << 15, false),
    NativeMethod::state_changing("blockAccount", 1 << 15, true),
    NativeMethod::state_changing("unblockAccount", 1 << 15, true),
];

fn get_or(snapshot: &DataCache, prefix: u8, default: i64) -> i64 {
    let stored = super::get_int(snapshot, POLICY_ID, prefix, &[]);
    if stored.is_zero() {
        default
    } else {
        i64::try_from(&stored).unwrap_or(default)
    }
}

/// The network fee charged per transaction byte.
pub fn fee_per_byte(snapshot: &DataCache) -> i64 {
    get_or(snapshot, PREFIX_FEE_PER_BYTE, neo3_config::DEFAULT_FEE_PER_BYTE)
}

/// The multiplier applied to opcode base prices.
pub fn exec_fee_factor(snapshot: &DataCache) -> u32 {
    get_or(
        snapshot,
        PREFIX_EXEC_FEE_FACTOR,
        neo3_config::DEFAULT_EXEC_FEE_FACTOR as i64,
    ) as u32
}

/// The price per byte of contract storage.
pub fn storage_price(snapshot: &DataCache) -> u32 {
    get_or(
        snapshot,
        PREFIX_STORAGE_PRICE,
        neo3_config::DEFAULT_STORAGE_PRICE as i64,
    ) as u32
}

pub fn max_transactions_per_block(snapshot: &DataCache) -> usize {
    get_or(
        snapshot,
        PREFIX_MAX_TRANSACTIONS_PER_BLOCK,
        neo3_config::MAX_TRANSACTIONS_PER_BLOCK as i64,
    ) as usize
}

pub fn max_block_size(snapshot: &DataCache) -> usize {
    get_or(
        snapshot,
        PREFIX_MAX_BLOCK_SIZE,
        neo3_config::MAX_BLOCK_SIZE as i64,
    ) as usize
}

pub fn max_block_system_fee(snapshot: &DataCache) -> i64 {
    // Default: 9000 whole GAS of system fees per block.
    get_or(snapshot, PREFIX_MAX_BLOCK_SYSTEM_FEE, 9000 * 100_000_000)
}

/// Whether `account` is on the blocked list.
pub fn is_blocked(snapshot: &DataCache, account: &UInt160) -> bool {
    super::get_bytes(snapshot, POLICY_ID, PREFIX_BLOCKED_ACCOUNT, account.as_bytes()).is_some()
}

fn require_committee(engine: &ApplicationEngine) -> ContractResult<()> {
    if !neo_token::check_committee(engine)? {
        return Err(ContractError::invalid_operation(
            "policy changes require the committee witness",
        ));
    }
    Ok(())
}

fn arg_int(args: &[StackItem], index: usize) -> ContractResult<i64> {
    let value = args
        .get(index)
        .ok_or_else(|| ContractError::invalid_argument("missing argument"))?
        .as_int()?;
    i64::try_from(&value).map_err(|_| ContractError::invalid_argument(format!("value {value}")))
}

fn arg_account(args: &[StackItem], index: usize) -> ContractResult<UInt160> {
    let bytes = args
        .get(index)
        .ok_or_else(|| ContractError::invalid_argument("missing account"))?
        .as_bytes()?;
    UInt160::from_bytes(&bytes).map_err(|e| ContractError::invalid_argument(e.to_string()))
}

/// The policy native contract.
pub struct PolicyContract;

impl NativeContract for PolicyContract {
    fn id(&self) -> i32 {
        POLICY_ID
    }

    fn name(&self) -> &'static str {
        "PolicyContract"
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
            "getFeePerByte" => Ok(StackItem::from_int(fee_per_byte(&snapshot))),
            "getExecFeeFactor" => Ok(StackItem::from_int(exec_fee_factor(&snapshot))),
            "getStoragePrice" => Ok(StackItem::from_int(storage_price(&snapshot))),
            "getMaxTransactionsPerBlock" => Ok(StackItem::from_int(
                max_transactions_per_block(&snapshot) as i64,
            )),
            "getMaxBlockSize" => Ok(StackItem::from_int(max_block_size(&snapshot) as i64)),
            "getMaxBlockSystemFee" => {
                Ok(StackItem::from_int(max_block_system_fee(&snapshot)))
            }
            "isBlocked" => {
                let account = arg_account(args, 0)?;
                Ok(StackItem::from_bool(is_blocked(&snapshot, &account)))
            }
            "setFeePerByte" => {
                let value = arg_int(args, 0)?;
                if !(0..=100_000_000).contains(&value) {
                    return Err(ContractError::invalid_argument(format!(
                        "fee per byte {value}"
                    )));
                }
                require_committee(engine)?;
                super::put_int(&snapshot, POLICY_ID, PREFIX_FEE_PER_BYTE, &[], &value.into());
                Ok(StackItem::Null)
            }
            "setExecFeeFactor" => {
                let value = arg_int(args, 0)?;
                if value <= 0 || value > MAX_EXEC_FEE_FACTOR {
                    return Err(ContractError::invalid_argument(format!(
                        "exec fee factor {value}"
                    )));
                }
                require_committee(engine)?;
                super::put_int(
                    &snapshot,
                    POLICY_ID,
                    PREFIX_EXEC_FEE_FACTOR,
                    &[],
                    &value.into(),
                );
                Ok(StackItem::Null)
            }
            "setStoragePrice" => {
                let value = arg_int(args, 0)?;
                if value <= 0 || value > MAX_STORAGE_PRICE {
                    return Err(ContractError::invalid_argument(format!(
                        "storage price {value}"
                    )));
                }
                require_committee(engine)?;
                super::put_int(
                    &snapshot,
                    POLICY_ID,
                    PREFIX_STORAGE_PRICE,
                    &[],
                    &value.into(),
                );
                Ok(StackItem::Null)
            }
            "setMaxTransactionsPerBlock" => {
                let value = arg_int(args, 0)?;
                if value <= 0 || value > u16::MAX as i64 {
                    return Err(ContractError::invalid_argument(format!(
                        "max transactions {value}"
                    )));
                }
                require_committee(engine)?;
                super::put_int(
                    &snapshot,
                    POLICY_ID,
                    PREFIX_MAX_TRANSACTIONS_PER_BLOCK,
                    &[],
                    &value.into(),
                );
                Ok(StackItem::Null)
            }
            "setMaxBlockSize" => {
                let value = arg_int(args, 0)?;
                if value <= 0 || value > neo3_config::MAX_BLOCK_SIZE as i64 {
                    return Err(ContractError::invalid_argument(format!(
                        "max block size {value}"
                    )));
                }
                require_committee(engine)?;
                super::put_int(
                    &snapshot,
                    POLICY_ID,
                    PREFIX_MAX_BLOCK_SIZE,
                    &[],
                    &value.into(),
                );
                Ok(StackItem::Null)
            }
            "setMaxBlockSystemFee" => {
                let value = arg_int(args, 0)?;
                if value <= 0 {
                    return Err(ContractError::invalid_argument(format!(
                        "max block system fee {value}"
                    )));
                }
                require_committee(engine)?;
                super::put_int(
                    &snapshot,
                    POLICY_ID,
                    PREFIX_MAX_BLOCK_SYSTEM_FEE,
                    &[],
                    &value.into(),
                );
                Ok(StackItem::Null)
            }
            "blockAccount" => {
                require_committee(engine)?;
                let account = arg_account(args, 0)?;
                if is_blocked(&snapshot, &account) {
                    return Ok(StackItem::from_bool(false));
                }
                super::put_bytes(
                    &snapshot,
                    POLICY_ID,
                    PREFIX_BLOCKED_ACCOUNT,
                    account.as_bytes(),
                    vec![1],
                );
                Ok(StackItem::from_bool(true))
            }
            "unblockAccount" => {
                require_committee(engine)?;
                let account = arg_account(args, 0)?;
                if !is_blocked(&snapshot, &account) {
                    return Ok(StackItem::from_bool(false));
                }
                super::delete_key(
                    &snapshot,
                    POLICY_ID,
                    PREFIX_BLOCKED_ACCOUNT,
                    account.as_bytes(),
                );
                Ok(StackItem::from_bool(true))
            }
            other => Err(ContractError::contract_not_found(format!(
                "PolicyContract::{other}"
            ))),
        }
    }
}
