//! End-to-end script scenarios.

use neo3_vm::{ExecutionEngine, OpCode, ScriptBuilder, VMState};
use num_bigint::BigInt;

fn run(script: Vec<u8>) -> ExecutionEngine {
    let mut engine = ExecutionEngine::default();
    engine.load_script(script, -1, 0).unwrap();
    engine.execute();
    engine
}

#[test]
fn arithmetic_sanity() {
    // PUSH2 PUSH3 ADD RET -> HALT with [5].
    let engine = run(vec![
        OpCode::PUSH2 as u8,
        OpCode::PUSH3 as u8,
        OpCode::ADD as u8,
        OpCode::RET as u8,
    ]);
    assert_eq!(engine.state(), VMState::Halt);
    assert_eq!(engine.result_stack().len(), 1);
    assert_eq!(engine.result_stack()[0].as_int().unwrap(), 5.into());
}

#[test]
fn factorial_of_five() {
    // product = 1; counter = 5; loop: product *= counter; counter -= 1.
    let engine = run(vec![
        OpCode::PUSH1 as u8,
        OpCode::PUSH5 as u8,
        OpCode::DUP as u8,
        OpCode::ROT as u8,
        OpCode::MUL as u8,
        OpCode::SWAP as u8,
        OpCode::DEC as u8,
        OpCode::DUP as u8,
        OpCode::JMPIF as u8,
        (-6i8) as u8,
        OpCode::DROP as u8,
        OpCode::RET as u8,
    ]);
    assert_eq!(engine.state(), VMState::Halt);
    assert_eq!(engine.result_stack()[0].as_int().unwrap(), 120.into());
}

#[test]
fn null_is_not_comparable() {
    // PUSHNULL PUSH1 LE -> FAULT.
    let engine = run(vec![
        OpCode::PUSHNULL as u8,
        OpCode::PUSH1 as u8,
        OpCode::LE as u8,
    ]);
    assert_eq!(engine.state(), VMState::Fault);
}

#[test]
fn execution_is_deterministic() {
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(1234567i64).unwrap();
    builder.emit_push_int(7654321i64).unwrap();
    builder.emit(OpCode::MUL);
    builder.emit_push_bytes(b"salt").unwrap();
    builder.emit(OpCode::CAT);
    builder.emit(OpCode::RET);
    let script = builder.to_bytes();

    let reference: Vec<Vec<u8>> = {
        let engine = run(script.clone());
        assert_eq!(engine.state(), VMState::Halt);
        engine
            .result_stack()
            .iter()
            .map(|item| item.as_bytes().unwrap())
            .collect()
    };
    for _ in 0..10 {
        let engine = run(script.clone());
        let results: Vec<Vec<u8>> = engine
            .result_stack()
            .iter()
            .map(|item| item.as_bytes().unwrap())
            .collect();
        assert_eq!(results, reference);
    }
}

#[test]
fn reference_count_matches_reachable_items_after_halt() {
    // Build [1, 2] and leave it as the only result.
    let engine = run(vec![
        OpCode::PUSH2 as u8,
        OpCode::PUSH1 as u8,
        OpCode::PUSH2 as u8,
        OpCode::PACK as u8,
        OpCode::RET as u8,
    ]);
    assert_eq!(engine.state(), VMState::Halt);
    // One result-stack reference plus two child slots.
    assert_eq!(engine.reference_counter().count(), 3);
}

#[test]
fn stack_limit_faults_on_runaway_growth() {
    // An unbounded DUP loop must hit the stack-size cap, not run forever.
    let engine = run(vec![
        OpCode::PUSH1 as u8,
        OpCode::DUP as u8,
        OpCode::JMP as u8,
        (-1i8) as u8,
    ]);
    assert_eq!(engine.state(), VMState::Fault);
}

#[test]
fn large_integers_stay_exact() {
    let a = BigInt::parse_bytes(b"98765432109876543210", 10).unwrap();
    let b = BigInt::parse_bytes(b"12345678901234567890", 10).unwrap();
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(a.clone()).unwrap();
    builder.emit_push_int(b.clone()).unwrap();
    builder.emit(OpCode::ADD);
    builder.emit(OpCode::RET);
    let engine = run(builder.to_bytes());
    assert_eq!(engine.state(), VMState::Halt);
    assert_eq!(engine.result_stack()[0].as_int().unwrap(), a + b);
}
