//! The metered VM driving all contract execution.

use crate::call_flags::CallFlags;
use crate::contract_state::ContractState;
use crate::error::{ContractError, ContractResult};
use crate::interop;
use crate::native::NativeRegistry;
use crate::trigger::TriggerType;
use neo3_config::{ProtocolSettings, MAX_VERIFICATION_GAS};
use neo3_core::{Block, Transaction, UInt160};
use neo3_cryptography::sha256;
use neo3_persistence::DataCache;
use neo3_vm::{ExecutionEngine, Instruction, OpCode, StackItem, VMState, VmError};
use std::sync::Arc;

/// A `System.Runtime.Notify` event captured during execution.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub script_hash: UInt160,
    pub name: String,
    pub state: StackItem,
}

/// A `System.Runtime.Log` line captured during execution.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub script_hash: UInt160,
    pub message: String,
}

/// Per-context contract frame, parallel to the VM's invocation stack.
#[derive(Clone)]
pub(crate) struct Frame {
    pub script_hash: UInt160,
    pub call_flags: CallFlags,
    pub calling_script_hash: Option<UInt160>,
}

/// The VM wrapped with gas metering, the syscall table, a snapshot and a
/// notification buffer.
///
/// On success the staged snapshot writes, notifications and consumed gas
/// are the committed effects; on fault the caller discards the snapshot.
pub struct ApplicationEngine {
    pub(crate) vm: ExecutionEngine,
    trigger: TriggerType,
    settings: ProtocolSettings,
    snapshot: Arc<DataCache>,
    container: Option<Transaction>,
    persisting_block: Option<Block>,
    gas_limit: i64,
    gas_consumed: i64,
    exec_fee_factor: u32,
    storage_price: u32,
    notifications: Vec<NotificationEvent>,
    logs: Vec<LogEntry>,
    pub(crate) frames: Vec<Frame>,
    natives: Arc<NativeRegistry>,
    invocation_counters: std::collections::HashMap<UInt160, u32>,
    random_counter: u64,
    sign_data_override: Option<Vec<u8>>,
}

impl ApplicationEngine {
    /// Creates an engine for one execution. `gas_limit` is the transaction
    /// system fee for `Application`, the fixed ceiling for `Verification`,
    /// and effectively unlimited for the per-block system triggers.
    pub fn new(
        trigger: TriggerType,
        container: Option<Transaction>,
        snapshot: Arc<DataCache>,
        persisting_block: Option<Block>,
        settings: ProtocolSettings,
        gas_limit: i64,
    ) -> Self {
        let gas_limit = match trigger {
            TriggerType::Verification => gas_limit.min(MAX_VERIFICATION_GAS),
            _ => gas_limit,
        };
        Self {
            vm: ExecutionEngine::default(),
            trigger,
            settings,
            snapshot,
            container,
            persisting_block,
            gas_limit,
            gas_consumed: 0,
            exec_fee_factor: neo3_config::DEFAULT_EXEC_FEE_FACTOR,
            storage_price: neo3_config::DEFAULT_STORAGE_PRICE,
            notifications: Vec::new(),
            logs: Vec::new(),
            frames: Vec::new(),
            natives: Arc::new(NativeRegistry::new()),
            invocation_counters: std::collections::HashMap::new(),
            random_counter: 0,
            sign_data_override: None,
        }
    }

    /// Overrides the message `System.Crypto.CheckSig` verifies against,
    /// used when the witness container is not a transaction (block
    /// headers, consensus payloads).
    pub fn set_sign_data(&mut self, sign_data: Vec<u8>) {
        self.sign_data_override = Some(sign_data);
    }

    /// The message witnesses sign for this execution.
    pub fn sign_data(&self) -> ContractResult<Vec<u8>> {
        if let Some(data) = &self.sign_data_override {
            return Ok(data.clone());
        }
        let tx = self
            .container
            .as_ref()
            .ok_or_else(|| ContractError::invalid_operation("no script container"))?;
        Ok(tx.sign_data(self.settings.network))
    }

    // ---- accessors ----

    pub fn trigger(&self) -> TriggerType {
        self.trigger
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn snapshot(&self) -> &Arc<DataCache> {
        &self.snapshot
    }

    pub fn container(&self) -> Option<&Transaction> {
        self.container.as_ref()
    }

    pub fn persisting_block(&self) -> Option<&Block> {
        self.persisting_block.as_ref()
    }

    pub fn natives(&self) -> Arc<NativeRegistry> {
        Arc::clone(&self.natives)
    }

    pub fn gas_consumed(&self) -> i64 {
        self.gas_consumed
    }

    pub fn gas_left(&self) -> i64 {
        self.gas_limit - self.gas_consumed
    }

    pub fn exec_fee_factor(&self) -> u32 {
        self.exec_fee_factor
    }

    pub fn storage_price(&self) -> u32 {
        self.storage_price
    }

    /// Applies the policy-contract fee settings for this execution.
    pub fn set_fee_factors(&mut self, exec_fee_factor: u32, storage_price: u32) {
        self.exec_fee_factor = exec_fee_factor;
        self.storage_price = storage_price;
    }

    pub fn state(&self) -> VMState {
        self.vm.state()
    }

    /// Whether a script context is loaded and not yet run to completion.
    pub fn has_loaded_context(&self) -> bool {
        self.vm.invocation_stack_len() > 0
    }

    pub fn result_stack(&self) -> &[StackItem] {
        self.vm.result_stack()
    }

    pub fn fault_message(&self) -> Option<String> {
        self.vm.fault_error().map(|e| e.to_string())
    }

    pub fn notifications(&self) -> &[NotificationEvent] {
        &self.notifications
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    /// The contract hash of the currently executing context.
    pub fn current_script_hash(&self) -> ContractResult<UInt160> {
        self.frames
            .last()
            .map(|f| f.script_hash)
            .ok_or_else(|| ContractError::invalid_operation("no frame loaded"))
    }

    /// The hash of the contract that called the current one.
    pub fn calling_script_hash(&self) -> Option<UInt160> {
        self.frames.last().and_then(|f| f.calling_script_hash)
    }

    /// The hash of the entry script.
    pub fn entry_script_hash(&self) -> ContractResult<UInt160> {
        self.frames
            .first()
            .map(|f| f.script_hash)
            .ok_or_else(|| ContractError::invalid_operation("no frame loaded"))
    }

    pub fn current_call_flags(&self) -> CallFlags {
        self.frames
            .last()
            .map(|f| f.call_flags)
            .unwrap_or(CallFlags::NONE)
    }

    /// Fails unless the current context holds every flag in `required`.
    pub fn check_call_flags(&self, required: CallFlags) -> ContractResult<()> {
        let held = self.current_call_flags();
        if !held.contains(required) {
            return Err(ContractError::MissingCallFlags {
                required: required.bits(),
                held: held.bits(),
            });
        }
        Ok(())
    }

    // ---- stack access ----

    pub fn push(&mut self, item: StackItem) -> ContractResult<()> {
        self.vm.push(item).map_err(ContractError::from)
    }

    pub fn pop(&mut self) -> ContractResult<StackItem> {
        self.vm.pop().map_err(ContractError::from)
    }

    pub fn pop_bytes(&mut self) -> ContractResult<Vec<u8>> {
        self.vm.pop_bytes().map_err(ContractError::from)
    }

    pub fn pop_int(&mut self) -> ContractResult<num_bigint::BigInt> {
        self.vm.pop_int().map_err(ContractError::from)
    }

    pub fn pop_u160(&mut self) -> ContractResult<UInt160> {
        let bytes = self.pop_bytes()?;
        UInt160::from_bytes(&bytes)
            .map_err(|e| ContractError::invalid_argument(e.to_string()))
    }

    // ---- gas ----

    /// Pre-decrements the gas meter; consuming past the limit faults.
    pub fn add_gas(&mut self, gas: i64) -> ContractResult<()> {
        self.gas_consumed = self.gas_consumed.saturating_add(gas.max(0));
        if self.gas_limit >= 0 && self.gas_consumed > self.gas_limit {
            return Err(ContractError::OutOfGas {
                consumed: self.gas_consumed,
                limit: self.gas_limit,
            });
        }
        Ok(())
    }

    /// Charges `units` scaled by the execution fee factor.
    pub fn charge_units(&mut self, units: i64) -> ContractResult<()> {
        self.add_gas(units.saturating_mul(self.exec_fee_factor as i64))
    }

    fn instruction_units(instruction: &Instruction) -> i64 {
        use OpCode::*;
        match instruction.opcode {
            // Data pushes scale with payload size.
            PUSHDATA1 | PUSHDATA2 | PUSHDATA4 => 8 + (instruction.operand.len() as i64) / 8,
            // Calls, throws and compound construction.
            CALL | CALL_L | CALLA | CALLT | THROW | PACK | PACKSTRUCT | PACKMAP | UNPACK
            | NEWARRAY | NEWARRAY_T | NEWSTRUCT | VALUES | KEYS => 1 << 9,
            // Byte-range work.
            CAT | SUBSTR | LEFT | RIGHT | MEMCPY | NEWBUFFER | REVERSEITEMS => 1 << 11,
            // Writes into compound items and conversions.
            APPEND | SETITEM | REMOVE | CONVERT => 1 << 13,
            // Heavy arithmetic.
            POW | SQRT | MODMUL | MODPOW => 1 << 11,
            // Slot initialization.
            INITSLOT | INITSSLOT => 1 << 4,
            // Item lookups.
            PICKITEM | HASKEY | CLEARITEMS | POPITEM => 1 << 6,
            // Everything else: simple stack and arithmetic work.
            _ => 2,
        }
    }

    // ---- loading ----

    /// Loads an entry script.
    pub fn load_script(
        &mut self,
        script: Vec<u8>,
        call_flags: CallFlags,
        rv_count: isize,
    ) -> ContractResult<()> {
        let script_hash = UInt160::from_script(&script);
        self.vm.load_script(script, rv_count, 0)?;
        self.frames.push(Frame {
            script_hash,
            call_flags,
            calling_script_hash: None,
        });
        *self.invocation_counters.entry(script_hash).or_insert(0) += 1;
        Ok(())
    }

    /// Loads a deployed contract's method as a sub-invocation.
    pub fn load_contract_method(
        &mut self,
        contract: &ContractState,
        method_offset: usize,
        rv_count: isize,
        call_flags: CallFlags,
        arguments: Vec<StackItem>,
    ) -> ContractResult<()> {
        let calling = self.current_script_hash().ok();
        self.vm
            .load_script(contract.nef.script.clone(), rv_count, method_offset)?;
        // Arguments land with the first argument on top.
        for argument in arguments.into_iter().rev() {
            self.vm.push(argument)?;
        }
        self.frames.push(Frame {
            script_hash: contract.hash,
            call_flags,
            calling_script_hash: calling,
        });
        *self
            .invocation_counters
            .entry(contract.hash)
            .or_insert(0) += 1;
        Ok(())
    }

    pub fn invocation_counter(&self, script_hash: &UInt160) -> u32 {
        self.invocation_counters
            .get(script_hash)
            .copied()
            .unwrap_or(0)
    }

    // ---- the metered loop ----

    /// Runs to completion, returning the final state.
    pub fn execute(&mut self) -> VMState {
        while !self.vm.state().is_terminal() {
            if let Err(error) = self.step() {
                self.vm
                    .fault(VmError::invalid_operation(error.to_string()));
            }
            self.sync_frames();
        }
        self.vm.state()
    }

    fn step(&mut self) -> ContractResult<()> {
        let Some(instruction) = self.vm.peek_instruction()? else {
            // Implicit RET at the end of a script.
            self.vm.step();
            return Ok(());
        };
        self.charge_units(Self::instruction_units(&instruction))?;
        match instruction.opcode {
            OpCode::SYSCALL => {
                self.vm.skip_instruction(&instruction)?;
                let id = instruction.operand_u32();
                interop::dispatch(self, id)?;
            }
            OpCode::CALLT => {
                self.vm.skip_instruction(&instruction)?;
                self.call_token(instruction.operand_u16())?;
            }
            _ => self.vm.step(),
        }
        Ok(())
    }

    fn sync_frames(&mut self) {
        let depth = self.vm.invocation_stack_len();
        while self.frames.len() > depth {
            self.frames.pop();
        }
        while self.frames.len() < depth {
            // Same-script CALL cloned a context inside the VM.
            let top = self
                .frames
                .last()
                .cloned()
                .expect("call requires a loaded frame");
            self.frames.push(top);
        }
    }

    /// Pushes a synthetic frame for host-initiated native work (genesis
    /// initialization, OnPersist / PostPersist hooks).
    pub(crate) fn push_native_frame(&mut self, script_hash: UInt160) {
        self.frames.push(Frame {
            script_hash,
            call_flags: CallFlags::ALL,
            calling_script_hash: None,
        });
    }

    pub(crate) fn pop_frame(&mut self) {
        self.frames.pop();
    }

    // ---- contract calls ----

    /// `System.Contract.Call` and native method dispatch.
    pub fn call_contract(
        &mut self,
        hash: UInt160,
        method: &str,
        requested_flags: CallFlags,
        arguments: Vec<StackItem>,
    ) -> ContractResult<()> {
        if method.starts_with('_') {
            return Err(ContractError::invalid_argument(format!(
                "method {method} is not callable"
            )));
        }
        let flags = self.current_call_flags().intersect(requested_flags);

        let natives = self.natives();
        if let Some(native) = natives.by_hash(&hash) {
            let method_info = native.method(method).ok_or_else(|| {
                ContractError::contract_not_found(format!(
                    "{}::{method}",
                    native.name()
                ))
            })?;
            if !flags.contains(method_info.required_flags) {
                return Err(ContractError::MissingCallFlags {
                    required: method_info.required_flags.bits(),
                    held: flags.bits(),
                });
            }
            self.add_gas(method_info.price)?;
            // Native methods execute in the host with a synthetic frame so
            // CheckWitness and storage scoping see the native as current.
            self.frames.push(Frame {
                script_hash: hash,
                call_flags: flags,
                calling_script_hash: self.current_script_hash().ok(),
            });
            let result = native.invoke(self, method, &arguments);
            self.frames.pop();
            let value = result?;
            if method_info.has_return {
                self.push(value)?;
            }
            return Ok(());
        }

        let contract = crate::native::contract_management::get_contract(&self.snapshot, &hash)?
            .ok_or_else(|| {
                ContractError::contract_not_found(format!("contract {hash}"))
            })?;
        let method_info = contract
            .manifest
            .method(method, arguments.len() as isize)
            .ok_or_else(|| {
                ContractError::contract_not_found(format!("{hash}::{method}"))
            })?;
        let rv_count = if method_info.return_type.is_empty()
            || method_info.return_type == "Void"
        {
            0
        } else {
            1
        };
        let flags = if method_info.safe {
            flags.intersect(CallFlags::READ_ONLY)
        } else {
            flags
        };
        let offset = method_info.offset as usize;
        self.load_contract_method(&contract, offset, rv_count, flags, arguments)
    }

    /// `CALLT`: static call through the current contract's token table.
    fn call_token(&mut self, token_index: u16) -> ContractResult<()> {
        let current = self.current_script_hash()?;
        let contract = crate::native::contract_management::get_contract(&self.snapshot, &current)?
            .ok_or_else(|| {
                ContractError::invalid_operation("CALLT outside a deployed contract")
            })?;
        let token = contract
            .nef
            .tokens
            .get(token_index as usize)
            .cloned()
            .ok_or_else(|| {
                ContractError::invalid_argument(format!("method token {token_index}"))
            })?;
        let mut arguments = Vec::with_capacity(token.parameters_count as usize);
        for _ in 0..token.parameters_count {
            arguments.push(self.pop()?);
        }
        let flags = CallFlags::from_bits(token.call_flags)
            .ok_or_else(|| ContractError::invalid_argument("token call flags"))?;
        self.call_contract(token.hash, &token.method, flags, arguments)
    }

    // ---- runtime services ----

    pub fn notify(&mut self, name: String, state: StackItem) -> ContractResult<()> {
        if self.trigger == TriggerType::Verification {
            return Err(ContractError::invalid_operation(
                "notifications are not allowed during verification",
            ));
        }
        let script_hash = self.current_script_hash()?;
        self.notifications.push(NotificationEvent {
            script_hash,
            name,
            state,
        });
        Ok(())
    }

    pub fn log(&mut self, message: String) -> ContractResult<()> {
        let script_hash = self.current_script_hash()?;
        tracing::debug!(contract = %script_hash, "{message}");
        self.logs.push(LogEntry {
            script_hash,
            message,
        });
        Ok(())
    }

    /// Deterministic per-execution randomness derived from the container
    /// hash and an invocation counter.
    pub fn next_random(&mut self) -> num_bigint::BigInt {
        let mut seed = Vec::with_capacity(44);
        if let Some(tx) = &self.container {
            seed.extend_from_slice(tx.hash().as_bytes());
        } else if let Some(block) = &self.persisting_block {
            seed.extend_from_slice(block.hash().as_bytes());
        }
        seed.extend_from_slice(&self.settings.network.to_le_bytes());
        seed.extend_from_slice(&self.random_counter.to_le_bytes());
        self.random_counter += 1;
        let digest = sha256(&seed);
        num_bigint::BigInt::from_bytes_le(num_bigint::Sign::Plus, &digest[..16])
    }

    /// The timestamp visible to scripts: the persisting block's.
    pub fn now_ms(&self) -> ContractResult<u64> {
        self.persisting_block
            .as_ref()
            .map(|b| b.header.timestamp_ms)
            .ok_or_else(|| ContractError::invalid_operation("no persisting block"))
    }

    // ---- witness checking ----

    /// True iff `account` signed the container and its scope authorizes
    /// the currently executing contract.
    pub fn check_witness(&self, account: &UInt160) -> ContractResult<bool> {
        use neo3_core::WitnessScope;
        let Some(tx) = &self.container else {
            return Ok(false);
        };
        let Some(signer) = tx.signers.iter().find(|s| s.account == *account) else {
            return Ok(false);
        };
        if signer.scopes.has_flag(WitnessScope::GLOBAL) {
            return Ok(true);
        }
        if signer.scopes.has_flag(WitnessScope::CALLED_BY_ENTRY) {
            // Valid in the entry context and in calls made directly by it.
            let entry = self.entry_script_hash()?;
            let current = self.current_script_hash()?;
            if current == entry || self.calling_script_hash() == Some(entry) {
                return Ok(true);
            }
        }
        if signer.scopes.has_flag(WitnessScope::CUSTOM_CONTRACTS) {
            let current = self.current_script_hash()?;
            if signer.allowed_contracts.contains(&current) {
                return Ok(true);
            }
        }
        if signer.scopes.has_flag(WitnessScope::CUSTOM_GROUPS) {
            let current = self.current_script_hash()?;
            if let Some(contract) =
                crate::native::contract_management::get_contract(&self.snapshot, &current)?
            {
                let group_hit = contract.manifest.groups.iter().any(|group| {
                    signer
                        .allowed_groups
                        .iter()
                        .any(|allowed| hex::encode(allowed) == group.pubkey)
                });
                if group_hit {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
