//! The NEO governance token: balances, voting, committee selection and
//! GAS distribution.

use super::fungible_token::{self, TokenDescriptor};
use super::gas_token::{GasToken, GAS_FACTOR};
use super::{NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::call_flags::CallFlags;
use crate::error::{ContractError, ContractResult};
use neo3_config::ProtocolSettings;
use neo3_core::UInt160;
use neo3_cryptography::ECPoint;
use neo3_persistence::DataCache;
use neo3_vm::StackItem;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};

/// Contract id of the NEO token.
pub const NEO_ID: i32 = -5;

/// NEO token configuration.
pub const NEO: TokenDescriptor = TokenDescriptor {
    contract_id: NEO_ID,
    symbol: "NEO",
    decimals: 2,
};

/// Total supply in token units.
pub const TOTAL_SUPPLY: i64 = 100_000_000 * 100;

/// Default GAS generated per block, in fractions.
pub const DEFAULT_GAS_PER_BLOCK: i64 = 5 * GAS_FACTOR;

/// Share of the per-block generation that rewards the committee, percent.
const COMMITTEE_REWARD_PERCENT: i64 = 10;

const PREFIX_VOTERS_COUNT: u8 = 1;
const PREFIX_CANDIDATE: u8 = 33;
const PREFIX_GAS_PER_BLOCK: u8 = 29;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("symbol", 0),
    NativeMethod::safe("decimals", 0),
    NativeMethod::safe("totalSupply", 1 << 15),
    NativeMethod::safe("balanceOf", 1 << 15),
    NativeMethod::safe("unclaimedGas", 1 << 15),
    NativeMethod::safe("getCandidates", 1 << 15),
    NativeMethod::safe("getCommittee", 1 << 15),
    NativeMethod::safe("getNextBlockValidators", 1 << 15),
    NativeMethod::safe("getGasPerBlock", 1 << 15),
    NativeMethod {
        name: "transfer",
        price: 1 << 17,
        required_flags: CallFlags::STATES,
        has_return: true,
    },
    NativeMethod::state_changing("registerCandidate", 1 << 20, true),
    NativeMethod::state_changing("unregisterCandidate", 1 << 16, true),
    NativeMethod::state_changing("vote", 1 << 16, true),
    NativeMethod::state_changing("setGasPerBlock", 1 << 15, false),
];

/// Per-account NEO state: balance, the height it last changed, and the
/// candidate the account votes for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeoAccountState {
    pub balance: BigInt,
    pub balance_height: u32,
    pub vote_to: Option<Vec<u8>>,
}

impl NeoAccountState {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(38);
        bytes.extend_from_slice(&self.balance_height.to_le_bytes());
        match &self.vote_to {
            Some(key) => {
                bytes.push(1);
                bytes.extend_from_slice(key);
            }
            None => bytes.push(0),
        }
        bytes.extend_from_slice(&self.balance.to_signed_bytes_le());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> ContractResult<Self> {
        if bytes.len() < 5 {
            return Err(ContractError::invalid_argument("account state too short"));
        }
        let balance_height = u32::from_le_bytes(bytes[..4].try_into().expect("4 bytes"));
        let (vote_to, rest) = if bytes[4] == 1 {
            if bytes.len() < 38 {
                return Err(ContractError::invalid_argument("account state too short"));
            }
            (Some(bytes[5..38].to_vec()), &bytes[38..])
        } else {
            (None, &bytes[5..])
        };
        Ok(Self {
            balance: BigInt::from_signed_bytes_le(rest),
            balance_height,
            vote_to,
        })
    }
}

/// Candidate registry entry.
#[derive(Debug, Clone, Default)]
pub struct CandidateState {
    pub registered: bool,
    pub votes: BigInt,
}

impl CandidateState {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![u8::from(self.registered)];
        bytes.extend_from_slice(&self.votes.to_signed_bytes_le());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::default();
        }
        Self {
            registered: bytes[0] == 1,
            votes: BigInt::from_signed_bytes_le(&bytes[1..]),
        }
    }
}

// ---- free functions used across the node ----

/// The standby committee from protocol settings.
pub fn standby_committee(settings: &ProtocolSettings) -> ContractResult<Vec<ECPoint>> {
    settings
        .standby_committee
        .iter()
        .map(|hex| {
            ECPoint::from_hex(hex).map_err(|e| ContractError::invalid_argument(e.to_string()))
        })
        .collect()
}

/// The standby validators: the first `validators_count` committee members.
pub fn standby_validators(settings: &ProtocolSettings) -> ContractResult<Vec<ECPoint>> {
    let mut committee = standby_committee(settings)?;
    committee.truncate(settings.validators_count);
    Ok(committee)
}

fn account_state(snapshot: &DataCache, account: &UInt160) -> ContractResult<NeoAccountState> {
    match super::get_bytes(
        snapshot,
        NEO_ID,
        fungible_token::PREFIX_BALANCE,
        account.as_bytes(),
    ) {
        Some(bytes) => NeoAccountState::from_bytes(&bytes),
        None => Ok(NeoAccountState::default()),
    }
}

fn put_account_state(snapshot: &DataCache, account: &UInt160, state: &NeoAccountState) {
    if state.balance.is_zero() && state.vote_to.is_none() {
        super::delete_key(
            snapshot,
            NEO_ID,
            fungible_token::PREFIX_BALANCE,
            account.as_bytes(),
        );
    } else {
        super::put_bytes(
            snapshot,
            NEO_ID,
            fungible_token::PREFIX_BALANCE,
            account.as_bytes(),
            state.to_bytes(),
        );
    }
}

fn candidate_state(snapshot: &DataCache, key: &[u8]) -> CandidateState {
    super::get_bytes(snapshot, NEO_ID, PREFIX_CANDIDATE, key)
        .map(|bytes| CandidateState::from_bytes(&bytes))
        .unwrap_or_default()
}

fn put_candidate_state(snapshot: &DataCache, key: &[u8], state: &CandidateState) {
    if !state.registered && state.votes.is_zero() {
        super::delete_key(snapshot, NEO_ID, PREFIX_CANDIDATE, key);
    } else {
        super::put_bytes(snapshot, NEO_ID, PREFIX_CANDIDATE, key, state.to_bytes());
    }
}

/// Registered candidates and their votes.
pub fn candidates(snapshot: &DataCache) -> Vec<(ECPoint, BigInt)> {
    let prefix = super::storage_key(NEO_ID, PREFIX_CANDIDATE, &[]);
    snapshot
        .seek(&prefix, neo3_persistence::SeekDirection::Forward)
        .into_iter()
        .filter_map(|(key, value)| {
            let key_bytes = &key[prefix.len()..];
            let state = CandidateState::from_bytes(&value);
            if !state.registered {
                return None;
            }
            ECPoint::decode(key_bytes).ok().map(|p| (p, state.votes))
        })
        .collect()
}

/// The committee: top candidates by votes, falling back to the standby
/// committee while too few candidates are registered.
pub fn committee(snapshot: &DataCache, settings: &ProtocolSettings) -> ContractResult<Vec<ECPoint>> {
    let committee_size = settings.standby_committee.len();
    let mut registered = candidates(snapshot);
    if registered.len() < committee_size {
        return standby_committee(settings);
    }
    // Most votes first; ties break on key order for determinism.
    registered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    Ok(registered
        .into_iter()
        .take(committee_size)
        .map(|(key, _)| key)
        .collect())
}

/// The validators for the next block.
pub fn next_block_validators(
    snapshot: &DataCache,
    settings: &ProtocolSettings,
) -> ContractResult<Vec<ECPoint>> {
    let mut committee = committee(snapshot, settings)?;
    committee.truncate(settings.validators_count);
    Ok(committee)
}

/// The committee's multisig address (majority threshold).
pub fn committee_address(
    snapshot: &DataCache,
    settings: &ProtocolSettings,
) -> ContractResult<UInt160> {
    let committee = committee(snapshot, settings)?;
    let m = committee.len() - (committee.len() - 1) / 2;
    let script = crate::contract::create_multisig_redeem_script(m, &committee)?;
    Ok(UInt160::from_script(&script))
}

/// Requires the committee's witness on the current transaction.
pub fn check_committee(engine: &ApplicationEngine) -> ContractResult<bool> {
    let address = committee_address(engine.snapshot(), engine.settings())?;
    engine.check_witness(&address)
}

fn gas_per_block(snapshot: &DataCache) -> BigInt {
    let stored = super::get_int(snapshot, NEO_ID, PREFIX_GAS_PER_BLOCK, &[]);
    if stored.is_zero() {
        BigInt::from(DEFAULT_GAS_PER_BLOCK)
    } else {
        stored
    }
}

/// GAS accrued by `balance` across `(start, end]`.
fn accrued_gas(snapshot: &DataCache, balance: &BigInt, start: u32, end: u32) -> BigInt {
    if balance.is_zero() || end <= start {
        return BigInt::zero();
    }
    let blocks = BigInt::from(end - start);
    balance * gas_per_block(snapshot) * blocks / BigInt::from(TOTAL_SUPPLY)
}

/// Unclaimed GAS of `account` up to height `end`.
pub fn unclaimed_gas(
    snapshot: &DataCache,
    account: &UInt160,
    end: u32,
) -> ContractResult<BigInt> {
    let state = account_state(snapshot, account)?;
    Ok(accrued_gas(snapshot, &state.balance, state.balance_height, end))
}

/// Settles accrued GAS into the account before its NEO balance changes.
fn settle(engine: &mut ApplicationEngine, account: &UInt160) -> ContractResult<()> {
    let Some(height) = engine.persisting_block().map(|b| b.header.index) else {
        return Ok(());
    };
    let snapshot = engine.snapshot().clone();
    let mut state = account_state(&snapshot, account)?;
    let gas = accrued_gas(&snapshot, &state.balance, state.balance_height, height);
    state.balance_height = height;
    put_account_state(&snapshot, account, &state);
    if !gas.is_zero() {
        GasToken::mint(engine, account, &gas)?;
    }
    Ok(())
}

fn adjust_candidate_votes(snapshot: &DataCache, candidate: &[u8], delta: &BigInt) {
    let mut state = candidate_state(snapshot, candidate);
    state.votes += delta;
    put_candidate_state(snapshot, candidate, &state);
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

/// The NEO native contract.
///
/// NEO balances carry voting state alongside the amount, so the token
/// keeps its own account records instead of the plain fungible-token
/// balance codec.
pub struct NeoToken;

impl NeoToken {
    pub fn balance_of(snapshot: &DataCache, account: &UInt160) -> BigInt {
        account_state(snapshot, account)
            .map(|state| state.balance)
            .unwrap_or_default()
    }

    fn transfer(
        &self,
        engine: &mut ApplicationEngine,
        from: &UInt160,
        to: &UInt160,
        amount: &BigInt,
    ) -> ContractResult<bool> {
        if amount.is_negative() {
            return Err(ContractError::invalid_argument("negative transfer amount"));
        }
        let authorized =
            engine.calling_script_hash() == Some(*from) || engine.check_witness(from)?;
        if !authorized {
            return Ok(false);
        }
        // Accrued GAS settles before either balance moves.
        settle(engine, from)?;
        if from != to {
            settle(engine, to)?;
        }
        let snapshot = engine.snapshot().clone();
        let mut from_state = account_state(&snapshot, from)?;
        if from_state.balance < *amount {
            return Ok(false);
        }
        if from != to && !amount.is_zero() {
            from_state.balance -= amount;
            put_account_state(&snapshot, from, &from_state);
            let mut to_state = account_state(&snapshot, to)?;
            to_state.balance += amount;
            put_account_state(&snapshot, to, &to_state);
            // Votes follow balances.
            if let Some(candidate) = &from_state.vote_to {
                adjust_candidate_votes(&snapshot, candidate, &-amount.clone());
            }
            if let Some(candidate) = &to_state.vote_to {
                adjust_candidate_votes(&snapshot, candidate, amount);
            }
        }
        notify_transfer(engine, Some(from), Some(to), amount)?;
        Ok(true)
    }

    fn vote(
        &self,
        engine: &mut ApplicationEngine,
        account: &UInt160,
        candidate: Option<Vec<u8>>,
    ) -> ContractResult<bool> {
        if !engine.check_witness(account)? {
            return Ok(false);
        }
        let snapshot = engine.snapshot().clone();
        let mut state = account_state(&snapshot, account)?;
        if let Some(key) = &candidate {
            let target = candidate_state(&snapshot, key);
            if !target.registered {
                return Ok(false);
            }
        }
        let voters_delta = match (&state.vote_to, &candidate) {
            (None, Some(_)) => 1i64,
            (Some(_), None) => -1i64,
            _ => 0,
        };
        if let Some(previous) = &state.vote_to {
            adjust_candidate_votes(&snapshot, previous, &-state.balance.clone());
        }
        if let Some(next) = &candidate {
            adjust_candidate_votes(&snapshot, next, &state.balance);
        }
        state.vote_to = candidate;
        put_account_state(&snapshot, account, &state);
        if voters_delta != 0 {
            let count = super::get_int(&snapshot, NEO_ID, PREFIX_VOTERS_COUNT, &[])
                + BigInt::from(voters_delta);
            super::put_int(&snapshot, NEO_ID, PREFIX_VOTERS_COUNT, &[], &count);
        }
        Ok(true)
    }
}

impl NativeContract for NeoToken {
    fn id(&self) -> i32 {
        NEO_ID
    }

    fn name(&self) -> &'static str {
        "NeoToken"
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
            "symbol" => Ok(StackItem::from_bytes(NEO.symbol.as_bytes().to_vec())),
            "decimals" => Ok(StackItem::from_int(NEO.decimals)),
            "totalSupply" => Ok(StackItem::from_int(TOTAL_SUPPLY)),
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
            "unclaimedGas" => {
                if args.len() < 2 {
                    return Err(ContractError::invalid_argument(
                        "unclaimedGas takes account and height",
                    ));
                }
                let account = fungible_token::parse_account(&args[0])?;
                let end = args[1].as_int()?;
                let end = u32::try_from(&end)
                    .map_err(|_| ContractError::invalid_argument(format!("height {end}")))?;
                Ok(StackItem::Integer(unclaimed_gas(
                    engine.snapshot(),
                    &account,
                    end,
                )?))
            }
            "transfer" => {
                if args.len() < 3 {
                    return Err(ContractError::invalid_argument("transfer takes 3 arguments"));
                }
                let from = fungible_token::parse_account(&args[0])?;
                let to = fungible_token::parse_account(&args[1])?;
                let amount = fungible_token::parse_amount(&args[2])?;
                Ok(StackItem::from_bool(
                    self.transfer(engine, &from, &to, &amount)?,
                ))
            }
            "registerCandidate" => {
                let key = args
                    .first()
                    .ok_or_else(|| ContractError::invalid_argument("missing public key"))?
                    .as_bytes()?;
                let point = ECPoint::decode(&key)
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                let address = UInt160::from_script(
                    &crate::contract::create_signature_redeem_script(&point),
                );
                if !engine.check_witness(&address)? {
                    return Ok(StackItem::from_bool(false));
                }
                let snapshot = engine.snapshot().clone();
                let mut state = candidate_state(&snapshot, &key);
                state.registered = true;
                put_candidate_state(&snapshot, &key, &state);
                Ok(StackItem::from_bool(true))
            }
            "unregisterCandidate" => {
                let key = args
                    .first()
                    .ok_or_else(|| ContractError::invalid_argument("missing public key"))?
                    .as_bytes()?;
                let point = ECPoint::decode(&key)
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                let address = UInt160::from_script(
                    &crate::contract::create_signature_redeem_script(&point),
                );
                if !engine.check_witness(&address)? {
                    return Ok(StackItem::from_bool(false));
                }
                let snapshot = engine.snapshot().clone();
                let mut state = candidate_state(&snapshot, &key);
                state.registered = false;
                put_candidate_state(&snapshot, &key, &state);
                Ok(StackItem::from_bool(true))
            }
            "vote" => {
                if args.len() < 2 {
                    return Err(ContractError::invalid_argument(
                        "vote takes account and candidate",
                    ));
                }
                let account = fungible_token::parse_account(&args[0])?;
                let candidate = if args[1].is_null() {
                    None
                } else {
                    Some(args[1].as_bytes()?)
                };
                Ok(StackItem::from_bool(self.vote(engine, &account, candidate)?))
            }
            "getCandidates" => {
                let items: Vec<StackItem> = candidates(engine.snapshot())
                    .into_iter()
                    .map(|(key, votes)| {
                        StackItem::struct_(vec![
                            StackItem::from_bytes(key.to_bytes()),
                            StackItem::Integer(votes),
                        ])
                    })
                    .collect();
                Ok(StackItem::array(items))
            }
            "getCommittee" => {
                let members = committee(engine.snapshot(), engine.settings())?;
                Ok(StackItem::array(
                    members
                        .into_iter()
                        .map(|key| StackItem::from_bytes(key.to_bytes()))
                        .collect(),
                ))
            }
            "getNextBlockValidators" => {
                let validators =
                    next_block_validators(engine.snapshot(), engine.settings())?;
                Ok(StackItem::array(
                    validators
                        .into_iter()
                        .map(|key| StackItem::from_bytes(key.to_bytes()))
                        .collect(),
                ))
            }
            "getGasPerBlock" => Ok(StackItem::Integer(gas_per_block(engine.snapshot()))),
            "setGasPerBlock" => {
                let value = args
                    .first()
                    .ok_or_else(|| ContractError::invalid_argument("missing value"))?
                    .as_int()?;
                if value.is_negative() || value > BigInt::from(10 * GAS_FACTOR) {
                    return Err(ContractError::invalid_argument(format!(
                        "gas per block {value}"
                    )));
                }
                if !check_committee(engine)? {
                    return Err(ContractError::invalid_operation(
                        "setGasPerBlock requires the committee witness",
                    ));
                }
                let snapshot = engine.snapshot().clone();
                super::put_int(&snapshot, NEO_ID, PREFIX_GAS_PER_BLOCK, &[], &value);
                Ok(StackItem::Null)
            }
            other => Err(ContractError::contract_not_found(format!(
                "NeoToken::{other}"
            ))),
        }
    }

    /// Genesis: the full supply goes to the standby validators' multisig
    /// address.
    fn initialize(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        let validators = standby_validators(engine.settings())?;
        let address = crate::contract::next_consensus_address(&validators)?;
        let snapshot = engine.snapshot().clone();
        let state = NeoAccountState {
            balance: BigInt::from(TOTAL_SUPPLY),
            balance_height: 0,
            vote_to: None,
        };
        put_account_state(&snapshot, &address, &state);
        super::put_int(
            &snapshot,
            NEO_ID,
            fungible_token::PREFIX_TOTAL_SUPPLY,
            &[],
            &BigInt::from(TOTAL_SUPPLY),
        );
        notify_transfer(engine, None, Some(&address), &BigInt::from(TOTAL_SUPPLY))
    }

    /// After the block: one committee member in rotation collects the
    /// committee share of the block's GAS generation.
    fn post_persist(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        let Some(index) = engine.persisting_block().map(|b| b.header.index) else {
            return Ok(());
        };
        let snapshot = engine.snapshot().clone();
        let members = committee(&snapshot, engine.settings())?;
        if members.is_empty() {
            return Ok(());
        }
        let member = &members[index as usize % members.len()];
        let address =
            UInt160::from_script(&crate::contract::create_signature_redeem_script(member));
        let reward = gas_per_block(&snapshot) * BigInt::from(COMMITTEE_REWARD_PERCENT)
            / BigInt::from(100);
        if !reward.is_zero() {
            GasToken::mint(engine, &address, &reward)?;
        }
        Ok(())
    }
}
