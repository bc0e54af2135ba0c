//! Arithmetic opcodes over arbitrary-precision integers.
//!
//! Every result is bounded by the engine's integer size limit (32 bytes of
//! magnitude); growing past it faults.

use super::JumpTable;
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::stack_item::{check_int_size, StackItem};
use crate::{VmError, VmResult};
use num_bigint::BigInt;
use num_traits::{One, Pow, Signed, ToPrimitive, Zero};

macro_rules! unary_int {
    ($table:expr, $opcode:expr, |$v:ident| $body:expr) => {
        $table.set($opcode, |engine: &mut ExecutionEngine, _: &Instruction| {
            let $v = engine.pop_int()?;
            let result: BigInt = $body;
            check_int_size(&result, engine.limits().max_integer_size)?;
            engine.push(StackItem::Integer(result))
        });
    };
}

macro_rules! binary_int {
    ($table:expr, $opcode:expr, |$a:ident, $b:ident| $body:expr) => {
        $table.set($opcode, |engine: &mut ExecutionEngine, _: &Instruction| {
            let $b = engine.pop_int()?;
            let $a = engine.pop_int()?;
            let result: BigInt = $body;
            check_int_size(&result, engine.limits().max_integer_size)?;
            engine.push(StackItem::Integer(result))
        });
    };
}

macro_rules! compare_int {
    ($table:expr, $opcode:expr, |$a:ident, $b:ident| $body:expr) => {
        $table.set($opcode, |engine: &mut ExecutionEngine, _: &Instruction| {
            let $b = engine.pop_int()?;
            let $a = engine.pop_int()?;
            engine.push(StackItem::from_bool($body))
        });
    };
}

pub(super) fn register(table: &mut JumpTable) {
    use OpCode::*;
    unary_int!(table, SIGN, |v| v.signum());
    unary_int!(table, ABS, |v| v.abs());
    unary_int!(table, NEGATE, |v| -v);
    unary_int!(table, INC, |v| v + 1);
    unary_int!(table, DEC, |v| v - 1);
    binary_int!(table, ADD, |a, b| a + b);
    binary_int!(table, SUB, |a, b| a - b);
    binary_int!(table, MUL, |a, b| a * b);
    binary_int!(table, DIV, |a, b| {
        if b.is_zero() {
            return Err(VmError::DivisionByZero);
        }
        a / b
    });
    binary_int!(table, MOD, |a, b| {
        if b.is_zero() {
            return Err(VmError::DivisionByZero);
        }
        a % b
    });
    table.set(POW, execute_pow);
    table.set(SQRT, execute_sqrt);
    table.set(MODMUL, execute_modmul);
    table.set(MODPOW, execute_modpow);
    table.set(SHL, execute_shl);
    table.set(SHR, execute_shr);
    table.set(NOT, |engine, _| {
        let value = engine.pop_bool()?;
        engine.push(StackItem::from_bool(!value))
    });
    table.set(BOOLAND, |engine, _| {
        let b = engine.pop_bool()?;
        let a = engine.pop_bool()?;
        engine.push(StackItem::from_bool(a && b))
    });
    table.set(BOOLOR, |engine, _| {
        let b = engine.pop_bool()?;
        let a = engine.pop_bool()?;
        engine.push(StackItem::from_bool(a || b))
    });
    table.set(NZ, |engine, _| {
        let value = engine.pop_int()?;
        engine.push(StackItem::from_bool(!value.is_zero()))
    });
    compare_int!(table, NUMEQUAL, |a, b| a == b);
    compare_int!(table, NUMNOTEQUAL, |a, b| a != b);
    compare_int!(table, LT, |a, b| a < b);
    compare_int!(table, LE, |a, b| a <= b);
    compare_int!(table, GT, |a, b| a > b);
    compare_int!(table, GE, |a, b| a >= b);
    binary_int!(table, MIN, |a, b| a.min(b));
    binary_int!(table, MAX, |a, b| a.max(b));
    table.set(WITHIN, |engine, _| {
        let upper = engine.pop_int()?;
        let lower = engine.pop_int()?;
        let value = engine.pop_int()?;
        engine.push(StackItem::from_bool(lower <= value && value < upper))
    });
}

fn execute_pow(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let exponent = engine.pop_int()?;
    let base = engine.pop_int()?;
    let exponent = exponent
        .to_u32()
        .ok_or_else(|| VmError::out_of_range(format!("exponent {exponent}")))?;
    let result = base.pow(exponent);
    check_int_size(&result, engine.limits().max_integer_size)?;
    engine.push(StackItem::Integer(result))
}

fn execute_sqrt(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let value = engine.pop_int()?;
    if value.is_negative() {
        return Err(VmError::out_of_range("square root of a negative"));
    }
    engine.push(StackItem::Integer(value.sqrt()))
}

fn execute_modmul(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let modulus = engine.pop_int()?;
    let b = engine.pop_int()?;
    let a = engine.pop_int()?;
    if modulus.is_zero() {
        return Err(VmError::DivisionByZero);
    }
    engine.push(StackItem::Integer((a * b) % modulus))
}

fn execute_modpow(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let modulus = engine.pop_int()?;
    let exponent = engine.pop_int()?;
    let base = engine.pop_int()?;
    if modulus.is_zero() {
        return Err(VmError::DivisionByZero);
    }
    // Exponent -1 requests the modular inverse; other negatives fault.
    let result = if exponent == BigInt::from(-1) {
        mod_inverse(&base, &modulus)
            .ok_or_else(|| VmError::out_of_range("no modular inverse"))?
    } else if exponent.is_negative() {
        return Err(VmError::out_of_range(format!("exponent {exponent}")));
    } else {
        base.modpow(&exponent, &modulus)
    };
    check_int_size(&result, engine.limits().max_integer_size)?;
    engine.push(StackItem::Integer(result))
}

/// Extended-Euclid modular inverse; `None` when gcd(a, m) != 1.
fn mod_inverse(a: &BigInt, modulus: &BigInt) -> Option<BigInt> {
    let modulus = modulus.abs();
    if modulus.is_one() {
        return Some(BigInt::zero());
    }
    let (mut old_r, mut r) = (mod_floor(a, &modulus), modulus.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());
    while !r.is_zero() {
        let quotient = &old_r / &r;
        let next_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &quotient * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }
    if !old_r.is_one() {
        return None;
    }
    let mut inverse = old_s % &modulus;
    if inverse.is_negative() {
        inverse += &modulus;
    }
    Some(inverse)
}

fn mod_floor(value: &BigInt, modulus: &BigInt) -> BigInt {
    let mut value = value % modulus;
    if value.is_negative() {
        value += modulus;
    }
    value
}

fn execute_shl(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let shift = engine.pop_int()?;
    let value = engine.pop_int()?;
    let shift = validate_shift(engine, &shift)?;
    if shift == 0 {
        return engine.push(StackItem::Integer(value));
    }
    let result = value << shift;
    check_int_size(&result, engine.limits().max_integer_size)?;
    engine.push(StackItem::Integer(result))
}

fn execute_shr(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let shift = engine.pop_int()?;
    let value = engine.pop_int()?;
    let shift = validate_shift(engine, &shift)?;
    if shift == 0 {
        return engine.push(StackItem::Integer(value));
    }
    engine.push(StackItem::Integer(value >> shift))
}

fn validate_shift(engine: &ExecutionEngine, shift: &BigInt) -> VmResult<u32> {
    let shift = shift
        .to_i64()
        .ok_or_else(|| VmError::ShiftOutOfRange { shift: i64::MAX })?;
    if shift < 0 || shift as u64 > engine.limits().max_shift as u64 {
        return Err(VmError::ShiftOutOfRange { shift });
    }
    Ok(shift as u32)
}

#[cfg(test)]
mod tests {
    use crate::{ExecutionEngine, OpCode, VMState, VmError};
    use num_bigint::BigInt;

    fn run(script: Vec<u8>) -> ExecutionEngine {
        let mut engine = ExecutionEngine::default();
        engine.load_script(script, -1, 0).unwrap();
        engine.execute();
        engine
    }

    fn top(engine: &ExecutionEngine) -> BigInt {
        engine
            .result_stack()
            .last()
            .unwrap()
            .as_int()
            .unwrap()
    }

    #[test]
    fn division_truncates_toward_zero() {
        let engine = run(vec![
            OpCode::PUSHINT8 as u8,
            0xF9, // -7
            OpCode::PUSH2 as u8,
            OpCode::DIV as u8,
        ]);
        assert_eq!(top(&engine), (-3).into());
    }

    #[test]
    fn division_by_zero_faults() {
        let engine = run(vec![
            OpCode::PUSH1 as u8,
            OpCode::PUSH0 as u8,
            OpCode::DIV as u8,
        ]);
        assert_eq!(engine.state(), VMState::Fault);
        assert!(matches!(
            engine.fault_error(),
            Some(VmError::DivisionByZero)
        ));
    }

    #[test]
    fn comparison_with_null_faults() {
        // PUSHNULL PUSH1 LE must fault: null is not comparable.
        let engine = run(vec![
            OpCode::PUSHNULL as u8,
            OpCode::PUSH1 as u8,
            OpCode::LE as u8,
        ]);
        assert_eq!(engine.state(), VMState::Fault);
    }

    #[test]
    fn pow_and_sqrt() {
        let engine = run(vec![
            OpCode::PUSH2 as u8,
            OpCode::PUSH10 as u8,
            OpCode::POW as u8,
        ]);
        assert_eq!(top(&engine), 1024.into());

        let engine = run(vec![OpCode::PUSH9 as u8, OpCode::SQRT as u8]);
        assert_eq!(top(&engine), 3.into());
    }

    #[test]
    fn modpow_minus_one_is_modular_inverse() {
        // 3^-1 mod 7 == 5
        let engine = run(vec![
            OpCode::PUSH3 as u8,
            OpCode::PUSHM1 as u8,
            OpCode::PUSH7 as u8,
            OpCode::MODPOW as u8,
        ]);
        assert_eq!(top(&engine), 5.into());
    }

    #[test]
    fn shift_limit_faults() {
        let engine = run(vec![
            OpCode::PUSH1 as u8,
            OpCode::PUSHINT16 as u8,
            0x01,
            0x02, // 513 > 256
            OpCode::SHL as u8,
        ]);
        assert_eq!(engine.state(), VMState::Fault);
    }

    #[test]
    fn oversized_product_faults() {
        // (1 << 255) * (1 << 255) exceeds 32-byte magnitude.
        let mut big = vec![OpCode::PUSHINT256 as u8];
        let mut bytes = [0u8; 32];
        bytes[31] = 0x40; // large positive
        big.extend_from_slice(&bytes);
        big.push(OpCode::DUP as u8);
        big.push(OpCode::MUL as u8);
        let engine = run(big);
        assert_eq!(engine.state(), VMState::Fault);
    }

    #[test]
    fn within_checks_half_open_range() {
        // 5 within [5, 10) -> true; 10 within [5, 10) -> false
        let engine = run(vec![
            OpCode::PUSH5 as u8,
            OpCode::PUSH5 as u8,
            OpCode::PUSH10 as u8,
            OpCode::WITHIN as u8,
        ]);
        assert!(engine.result_stack()[0].as_bool().unwrap());

        let engine = run(vec![
            OpCode::PUSH10 as u8,
            OpCode::PUSH5 as u8,
            OpCode::PUSH10 as u8,
            OpCode::WITHIN as u8,
        ]);
        assert!(!engine.result_stack()[0].as_bool().unwrap());
    }
}
