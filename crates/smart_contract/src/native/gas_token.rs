//! The GAS utility token.

use super::fungible_token::{self, TokenDescriptor};
use super::{NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::call_flags::CallFlags;
use crate::error::{ContractError, ContractResult};
use neo3_core::UInt160;
use neo3_vm::StackItem;
use num_bigint::BigInt;
use num_traits::Zero;

/// Contract id of the GAS token.
pub const GAS_ID: i32 = -6;

/// GAS token configuration: eight decimals, fees burn in it.
pub const GAS: TokenDescriptor = TokenDescriptor {
    contract_id: GAS_ID,
    symbol: "GAS",
    decimals: 8,
};

/// One whole GAS in fractions.
pub const GAS_FACTOR: i64 = 100_000_000;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("symbol", 0),
    NativeMethod::safe("decimals", 0),
    NativeMethod::safe("totalSupply", 1 << 15),
    NativeMethod::safe("balanceOf", 1 << 15),
    NativeMethod {
        name: "transfer",
        price: 1 << 17,
        required_flags: CallFlags::STATES,
        has_return: true,
    },
];

/// The GAS native contract.
pub struct GasToken;

impl GasToken {
    pub fn balance_of(snapshot: &neo3_persistence::DataCache, account: &UInt160) -> BigInt {
        fungible_token::balance_of(snapshot, &GAS, account)
    }

    pub fn total_supply(snapshot: &neo3_persistence::DataCache) -> BigInt {
        fungible_token::total_supply(snapshot, &GAS)
    }

    /// Mints GAS outside the NEP-17 surface (genesis, NEO claims, oracle
    /// refunds).
    pub fn mint(
        engine: &mut ApplicationEngine,
        account: &UInt160,
        amount: &BigInt,
    ) -> ContractResult<()> {
        fungible_token::mint(engine, &GAS, account, amount, None)
    }

    /// Burns GAS (transaction fees, oracle deposits).
    pub fn burn(
        engine: &mut ApplicationEngine,
        account: &UInt160,
        amount: &BigInt,
    ) -> ContractResult<()> {
        fungible_token::burn(engine, &GAS, account, amount, None)
    }
}

impl NativeContract for GasToken {
    fn id(&self) -> i32 {
        GAS_ID
    }

    fn name(&self) -> &'static str {
        "GasToken"
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
            "symbol" => Ok(StackItem::from_bytes(GAS.symbol.as_bytes().to_vec())),
            "decimals" => Ok(StackItem::from_int(GAS.decimals)),
            "totalSupply" => Ok(StackItem::Integer(Self::total_supply(engine.snapshot()))),
            "balanceOf" => {
                let account = fungible_token::parse_account(
                    args.first()
                        .ok_or_else(|| ContractError::invalid_argument("missing account"))?,
                )?;
                Ok(StackItem::Integer(Self::balance_of(
                    engine.snapshot(),
                    &account,
                )))
            }
            "transfer" => {
                if args.len() < 3 {
                    return Err(ContractError::invalid_argument("transfer takes 3 arguments"));
                }
                let from = fungible_token::parse_account(&args[0])?;
                let to = fungible_token::parse_account(&args[1])?;
                let amount = fungible_token::parse_amount(&args[2])?;
                let ok = fungible_token::transfer(engine, &GAS, &from, &to, &amount, None)?;
                Ok(StackItem::from_bool(ok))
            }
            other => Err(ContractError::contract_not_found(format!(
                "GasToken::{other}"
            ))),
        }
    }

    /// Genesis: the initial GAS distribution goes to the standby
    /// validators' multisig address.
    fn initialize(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        let validators = super::neo_token::standby_validators(engine.settings())?;
        let address = crate::contract::next_consensus_address(&validators)?;
        let initial = BigInt::from(engine.settings().initial_gas_distribution);
        Self::mint(engine, &address, &initial)
    }

    /// Before the block's transactions: burn every transaction's fees from
    /// its sender.
    fn on_persist(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        let Some(block) = engine.persisting_block().cloned() else {
            return Ok(());
        };
        for tx in &block.transactions {
            let total = BigInt::from(tx.system_fee + tx.network_fee);
            if !total.is_zero() {
                Self::burn(engine, &tx.sender(), &total)?;
            }
        }
        Ok(())
    }

    /// After the block's transactions: the primary collects the block's
    /// network fees.
    fn post_persist(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        let Some(block) = engine.persisting_block().cloned() else {
            return Ok(());
        };
        let network_fees: i64 = block.transactions.iter().map(|tx| tx.network_fee).sum();
        if network_fees == 0 {
            return Ok(());
        }
        let validators = super::neo_token::next_block_validators(
            engine.snapshot(),
            engine.settings(),
        )?;
        let primary = validators
            .get(block.header.primary_index as usize)
            .ok_or_else(|| ContractError::invalid_operation("primary index out of range"))?;
        let address = UInt160::from_script(&crate::contract::create_signature_redeem_script(
            primary,
        ));
        Self::mint(engine, &address, &BigInt::from(network_fees))
    }
}
