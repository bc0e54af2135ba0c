//! The oracle contract: external data requests and response settlement.

use super::gas_token::GasToken;
use super::role_management::{self, Role};
use super::{NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::call_flags::CallFlags;
use crate::error::{ContractError, ContractResult};
use neo3_core::UInt160;
use neo3_persistence::DataCache;
use neo3_vm::StackItem;
use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Contract id of the oracle contract.
pub const ORACLE_ID: i32 = -9;

const PREFIX_REQUEST: u8 = 7;
const PREFIX_NEXT_ID: u8 = 6;
const PREFIX_PRICE: u8 = 5;

/// Default request price: 0.5 GAS.
const DEFAULT_PRICE: i64 = 50_000_000;
/// Floor for the caller-provided response gas deposit: 0.1 GAS.
const MIN_RESPONSE_GAS: i64 = 10_000_000;
/// Bound on request URLs.
const MAX_URL_LENGTH: usize = 256;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("getPrice", 1 << 15),
    NativeMethod::state_changing("setPrice", 1 << 15, false),
    NativeMethod {
        name: "request",
        price: 0,
        required_flags: CallFlags::STATES,
        has_return: false,
    },
    NativeMethod {
        name: "finish",
        price: 0,
        required_flags: CallFlags::STATES,
        has_return: false,
    },
];

/// A pending oracle request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    pub original_tx_hash: neo3_core::UInt256,
    pub gas_for_response: i64,
    pub url: String,
    pub filter: Option<String>,
    pub callback_contract: UInt160,
    pub callback_method: String,
    pub user_data: Vec<u8>,
}

fn request_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

/// The pending request with the given id.
pub fn get_request(snapshot: &DataCache, id: u64) -> ContractResult<Option<OracleRequest>> {
    match super::get_bytes(snapshot, ORACLE_ID, PREFIX_REQUEST, &request_key(id)) {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ContractError::invalid_argument(format!("oracle request: {e}"))),
        None => Ok(None),
    }
}

fn put_request(snapshot: &DataCache, id: u64, request: &OracleRequest) {
    super::put_bytes(
        snapshot,
        ORACLE_ID,
        PREFIX_REQUEST,
        &request_key(id),
        serde_json::to_vec(request).expect("request serializes"),
    );
}

/// The configured request price.
pub fn price(snapshot: &DataCache) -> i64 {
    let stored = super::get_int(snapshot, ORACLE_ID, PREFIX_PRICE, &[]);
    if stored.is_zero() {
        DEFAULT_PRICE
    } else {
        i64::try_from(&stored).unwrap_or(DEFAULT_PRICE)
    }
}

/// The oracle native contract.
pub struct OracleContract;

impl NativeContract for OracleContract {
    fn id(&self) -> i32 {
        ORACLE_ID
    }

    fn name(&self) -> &'static str {
        "OracleContract"
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
        match method {
            "getPrice" => Ok(StackItem::from_int(price(engine.snapshot()))),
            "setPrice" => {
                let value = args
                    .first()
                    .ok_or_else(|| ContractError::invalid_argument("missing price"))?
                    .as_int()?;
                let value = i64::try_from(&value)
                    .map_err(|_| ContractError::invalid_argument(format!("price {value}")))?;
                if value <= 0 {
                    return Err(ContractError::invalid_argument("price must be positive"));
                }
                if !super::neo_token::check_committee(engine)? {
                    return Err(ContractError::invalid_operation(
                        "setPrice requires the committee witness",
                    ));
                }
                let snapshot = engine.snapshot().clone();
                super::put_int(&snapshot, ORACLE_ID, PREFIX_PRICE, &[], &value.into());
                Ok(StackItem::Null)
            }
            "request" => self.request(engine, args),
            "finish" => self.finish(engine),
            other => Err(ContractError::contract_not_found(format!(
                "OracleContract::{other}"
            ))),
        }
    }

    /// Responses settle after the block's transactions: each one burns its
    /// request record and splits the deposit across the designated oracle
    /// nodes, the integer-division remainder going to the first node.
    fn post_persist(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        let Some(block) = engine.persisting_block().cloned() else {
            return Ok(());
        };
        let height = block.header.index;
        for tx in &block.transactions {
            let Some((id, _code, _result)) = tx.oracle_response() else {
                continue;
            };
            let snapshot = engine.snapshot().clone();
            let Some(request) = get_request(&snapshot, id)? else {
                continue;
            };
            super::delete_key(&snapshot, ORACLE_ID, PREFIX_REQUEST, &request_key(id));

            let nodes = role_management::designated_by_role(&snapshot, Role::Oracle, height)?;
            if nodes.is_empty() {
                continue;
            }
            let total = BigInt::from(request.gas_for_response);
            let share = &total / BigInt::from(nodes.len() as u64);
            let remainder = &total - &share * BigInt::from(nodes.len() as u64);
            for (index, node) in nodes.iter().enumerate() {
                let mut amount = share.clone();
                if index == 0 {
                    amount += &remainder;
                }
                if amount.is_zero() {
                    continue;
                }
                let address = UInt160::from_script(
                    &crate::contract::create_signature_redeem_script(node),
                );
                GasToken::mint(engine, &address, &amount)?;
            }
        }
        Ok(())
    }
}

impl OracleContract {
    /// `request(url, filter, callback_method, user_data, gas_for_response)`
    /// invoked by a contract; the deposit burns from the caller here and
    /// pays nodes and the callback later.
    fn request(
        &self,
        engine: &mut ApplicationEngine,
        args: &[StackItem],
    ) -> ContractResult<StackItem> {
        if args.len() < 5 {
            return Err(ContractError::invalid_argument("request takes 5 arguments"));
        }
        let url = String::from_utf8(args[0].as_bytes()?)
            .map_err(|_| ContractError::invalid_argument("url is not UTF-8"))?;
        if url.is_empty() || url.len() > MAX_URL_LENGTH {
            return Err(ContractError::invalid_argument(format!(
                "url of {} bytes",
                url.len()
            )));
        }
        let filter = if args[1].is_null() {
            None
        } else {
            Some(
                String::from_utf8(args[1].as_bytes()?)
                    .map_err(|_| ContractError::invalid_argument("filter is not UTF-8"))?,
            )
        };
        let callback_method = String::from_utf8(args[2].as_bytes()?)
            .map_err(|_| ContractError::invalid_argument("callback is not UTF-8"))?;
        if callback_method.starts_with('_') {
            return Err(ContractError::invalid_argument(
                "callback must be a public method",
            ));
        }
        let user_data = crate::binary_serializer::serialize_item(
            &args[3],
            neo3_config::MAX_ITEM_SIZE,
        )?;
        let gas_for_response = args[4].as_int()?;
        let gas_for_response = i64::try_from(&gas_for_response).map_err(|_| {
            ContractError::invalid_argument(format!("response gas {gas_for_response}"))
        })?;
        if gas_for_response < MIN_RESPONSE_GAS {
            return Err(ContractError::invalid_argument(
                "response gas below the minimum deposit",
            ));
        }

        let callback_contract = engine
            .calling_script_hash()
            .ok_or_else(|| ContractError::invalid_operation("request without caller"))?;
        let tx_hash = engine
            .container()
            .map(|tx| tx.hash())
            .ok_or_else(|| ContractError::invalid_operation("request outside a transaction"))?;

        // The requester pays the oracle fee and deposits the response gas.
        engine.add_gas(price(engine.snapshot()))?;
        GasToken::burn(
            engine,
            &callback_contract,
            &BigInt::from(gas_for_response),
        )?;

        let snapshot = engine.snapshot().clone();
        let id = {
            let next = super::get_int(&snapshot, ORACLE_ID, PREFIX_NEXT_ID, &[]);
            let id = u64::try_from(&next).unwrap_or(0);
            super::put_int(
                &snapshot,
                ORACLE_ID,
                PREFIX_NEXT_ID,
                &[],
                &BigInt::from(id + 1),
            );
            id
        };
        put_request(
            &snapshot,
            id,
            &OracleRequest {
                original_tx_hash: tx_hash,
                gas_for_response,
                url: url.clone(),
                filter,
                callback_contract,
                callback_method,
                user_data,
            },
        );
        engine.notify(
            "OracleRequest".to_string(),
            StackItem::array(vec![
                StackItem::from_int(id),
                StackItem::from_bytes(callback_contract.to_array().to_vec()),
                StackItem::from_bytes(url.into_bytes()),
            ]),
        )?;
        Ok(StackItem::Null)
    }

    /// `finish()` is the script of every oracle response transaction: it
    /// resolves the request named by the `OracleResponse` attribute and
    /// invokes the requesting contract's callback.
    fn finish(&self, engine: &mut ApplicationEngine) -> ContractResult<StackItem> {
        let tx = engine
            .container()
            .cloned()
            .ok_or_else(|| ContractError::invalid_operation("finish outside a transaction"))?;
        let (id, code, result) = tx
            .oracle_response()
            .map(|(id, code, result)| (id, code, result.to_vec()))
            .ok_or_else(|| {
                ContractError::invalid_operation("finish without an OracleResponse attribute")
            })?;
        let request = get_request(engine.snapshot(), id)?
            .ok_or_else(|| ContractError::invalid_argument(format!("unknown request {id}")))?;
        let user_data = crate::binary_serializer::deserialize_item(&request.user_data)?;
        let arguments = vec![
            StackItem::from_bytes(request.url.into_bytes()),
            user_data,
            StackItem::from_int(code as u8),
            StackItem::from_bytes(result),
        ];
        engine.call_contract(
            request.callback_contract,
            &request.callback_method,
            CallFlags::ALL,
            arguments,
        )?;
        Ok(StackItem::Null)
    }
}
