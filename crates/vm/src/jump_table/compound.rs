//! Compound-type opcodes: arrays, structs, maps.

use super::JumpTable;
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::stack_item::{StackItem, StackItemType};
use crate::{VmError, VmResult};

pub(super) fn register(table: &mut JumpTable) {
    use OpCode::*;
    table.set(NEWARRAY0, |engine, _| {
        engine.push(StackItem::array(Vec::new()))
    });
    table.set(NEWARRAY, execute_newarray);
    table.set(NEWARRAY_T, execute_newarray_t);
    table.set(NEWSTRUCT0, |engine, _| {
        engine.push(StackItem::struct_(Vec::new()))
    });
    table.set(NEWSTRUCT, execute_newstruct);
    table.set(NEWMAP, |engine, _| engine.push(StackItem::map()));
    table.set(PACK, execute_pack);
    table.set(PACKSTRUCT, execute_packstruct);
    table.set(PACKMAP, execute_packmap);
    table.set(UNPACK, execute_unpack);
    table.set(SIZE, execute_size);
    table.set(HASKEY, execute_haskey);
    table.set(KEYS, execute_keys);
    table.set(VALUES, execute_values);
    table.set(PICKITEM, execute_pickitem);
    table.set(APPEND, execute_append);
    table.set(SETITEM, execute_setitem);
    table.set(REVERSEITEMS, execute_reverseitems);
    table.set(REMOVE, execute_remove);
    table.set(CLEARITEMS, execute_clearitems);
    table.set(POPITEM, execute_popitem);
}

fn pop_count(engine: &mut ExecutionEngine) -> VmResult<usize> {
    let count = engine.pop_index()?;
    if count > engine.limits().max_stack_size {
        return Err(VmError::out_of_range(format!("compound of {count} items")));
    }
    Ok(count)
}

fn execute_newarray(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let count = pop_count(engine)?;
    engine.reference_counter().add_references(count);
    engine.push(StackItem::array(vec![StackItem::Null; count]))
}

fn execute_newarray_t(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    // The element type only constrains future SETITEMs in higher layers;
    // a fresh array is null-filled regardless.
    StackItemType::from_byte(instruction.operand_u8())?;
    execute_newarray(engine, instruction)
}

fn execute_newstruct(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let count = pop_count(engine)?;
    engine.reference_counter().add_references(count);
    engine.push(StackItem::struct_(vec![StackItem::Null; count]))
}

fn execute_pack(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let count = pop_count(engine)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(engine.pop()?);
    }
    engine.reference_counter().add_references(count);
    engine.push(StackItem::array(items))
}

fn execute_packstruct(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let count = pop_count(engine)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(engine.pop()?);
    }
    engine.reference_counter().add_references(count);
    engine.push(StackItem::struct_(items))
}

fn execute_packmap(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let count = pop_count(engine)?;
    let map = StackItem::map();
    {
        let entries = map.as_map()?;
        let mut entries = entries.borrow_mut();
        for _ in 0..count {
            let key = engine.pop()?;
            let value = engine.pop()?;
            key.map_key_bytes()?;
            entries.push((key, value));
        }
    }
    engine.reference_counter().add_references(count * 2);
    engine.push(map)
}

fn execute_unpack(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let compound = engine.pop()?;
    match &compound {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let items = items.borrow().clone();
            for item in items.iter().rev() {
                engine.push(item.clone())?;
            }
            engine.push(StackItem::from_int(items.len() as i64))
        }
        StackItem::Map(entries) => {
            let entries = entries.borrow().clone();
            for (key, value) in entries.iter().rev() {
                engine.push(value.clone())?;
                engine.push(key.clone())?;
            }
            engine.push(StackItem::from_int(entries.len() as i64))
        }
        other => Err(VmError::invalid_type("compound", other.type_name())),
    }
}

fn execute_size(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let item = engine.pop()?;
    let size = match &item {
        StackItem::Array(items) | StackItem::Struct(items) => items.borrow().len(),
        StackItem::Map(entries) => entries.borrow().len(),
        StackItem::Buffer(bytes) => bytes.borrow().len(),
        StackItem::ByteString(bytes) => bytes.len(),
        primitive if primitive.item_type().is_primitive() => primitive.as_bytes()?.len(),
        other => {
            return Err(VmError::invalid_type("sized item", other.type_name()));
        }
    };
    engine.push(StackItem::from_int(size as i64))
}

fn execute_haskey(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let key = engine.pop()?;
    let collection = engine.pop()?;
    let present = match &collection {
        StackItem::Map(entries) => {
            let key_bytes = key.map_key_bytes()?;
            entries
                .borrow()
                .iter()
                .any(|(k, _)| k.map_key_bytes().map(|b| b == key_bytes).unwrap_or(false))
        }
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index = key_index(&key)?;
            index < items.borrow().len()
        }
        StackItem::Buffer(bytes) => key_index(&key)? < bytes.borrow().len(),
        StackItem::ByteString(bytes) => key_index(&key)? < bytes.len(),
        other => {
            return Err(VmError::invalid_type("collection", other.type_name()));
        }
    };
    engine.push(StackItem::from_bool(present))
}

fn key_index(key: &StackItem) -> VmResult<usize> {
    let value = key.as_int()?;
    usize::try_from(&value).map_err(|_| VmError::out_of_range(format!("index {value}")))
}

fn execute_keys(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let map = engine.pop()?.as_map()?;
    let keys: Vec<StackItem> = map.borrow().iter().map(|(k, _)| k.clone()).collect();
    engine.reference_counter().add_references(keys.len());
    engine.push(StackItem::array(keys))
}

fn execute_values(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let collection = engine.pop()?;
    let values: Vec<StackItem> = match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => items.borrow().clone(),
        StackItem::Map(entries) => entries.borrow().iter().map(|(_, v)| v.clone()).collect(),
        other => {
            return Err(VmError::invalid_type("collection", other.type_name()));
        }
    };
    engine.reference_counter().add_references(values.len());
    engine.push(StackItem::array(values))
}

fn execute_pickitem(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let key = engine.pop()?;
    let collection = engine.pop()?;
    let item = match &collection {
        StackItem::Map(entries) => {
            let key_bytes = key.map_key_bytes()?;
            entries
                .borrow()
                .iter()
                .find(|(k, _)| k.map_key_bytes().map(|b| b == key_bytes).unwrap_or(false))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| VmError::out_of_range("key not found"))?
        }
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index = key_index(&key)?;
            let items = items.borrow();
            items
                .get(index)
                .cloned()
                .ok_or_else(|| VmError::out_of_range(format!("index {index} of {}", items.len())))?
        }
        StackItem::ByteString(_) | StackItem::Buffer(_) => {
            let bytes = collection.as_bytes()?;
            let index = key_index(&key)?;
            let byte = *bytes
                .get(index)
                .ok_or_else(|| VmError::out_of_range(format!("index {index} of {}", bytes.len())))?;
            StackItem::from_int(byte as i64)
        }
        other => {
            return Err(VmError::invalid_type("collection", other.type_name()));
        }
    };
    engine.push(item)
}

fn execute_append(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let item = engine.pop()?;
    let array = engine.pop()?;
    let items = array.as_array()?;
    // Struct values copy on write into a container.
    let item = if matches!(item, StackItem::Struct(_)) {
        item.deep_copy()
    } else {
        item
    };
    engine.reference_counter().add_reference(&item);
    items.borrow_mut().push(item);
    Ok(())
}

fn execute_setitem(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let value = engine.pop()?;
    let key = engine.pop()?;
    let collection = engine.pop()?;
    let value = if matches!(value, StackItem::Struct(_)) {
        value.deep_copy()
    } else {
        value
    };
    match &collection {
        StackItem::Map(entries) => {
            let key_bytes = key.map_key_bytes()?;
            let mut entries = entries.borrow_mut();
            if let Some(entry) = entries
                .iter_mut()
                .find(|(k, _)| k.map_key_bytes().map(|b| b == key_bytes).unwrap_or(false))
            {
                entry.1 = value;
            } else {
                engine.reference_counter().add_references(2);
                entries.push((key, value));
            }
            Ok(())
        }
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index = key_index(&key)?;
            let mut items = items.borrow_mut();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or_else(|| VmError::out_of_range(format!("index {index} of {len}")))?;
            *slot = value;
            Ok(())
        }
        StackItem::Buffer(bytes) => {
            let index = key_index(&key)?;
            let byte = value.as_int()?;
            let byte = u8::try_from(&byte)
                .map_err(|_| VmError::out_of_range(format!("byte value {byte}")))?;
            let mut bytes = bytes.borrow_mut();
            let len = bytes.len();
            let slot = bytes
                .get_mut(index)
                .ok_or_else(|| VmError::out_of_range(format!("index {index} of {len}")))?;
            *slot = byte;
            Ok(())
        }
        other => Err(VmError::invalid_type("collection", other.type_name())),
    }
}

fn execute_reverseitems(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            items.borrow_mut().reverse();
            Ok(())
        }
        StackItem::Buffer(bytes) => {
            bytes.borrow_mut().reverse();
            Ok(())
        }
        other => Err(VmError::invalid_type("collection", other.type_name())),
    }
}

fn execute_remove(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let key = engine.pop()?;
    let collection = engine.pop()?;
    match &collection {
        StackItem::Map(entries) => {
            let key_bytes = key.map_key_bytes()?;
            let mut entries = entries.borrow_mut();
            let before = entries.len();
            entries.retain(|(k, _)| {
                k.map_key_bytes().map(|b| b != key_bytes).unwrap_or(true)
            });
            if entries.len() != before {
                engine.reference_counter().remove_references(2);
            }
            Ok(())
        }
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index = key_index(&key)?;
            let mut items = items.borrow_mut();
            if index >= items.len() {
                return Err(VmError::out_of_range(format!(
                    "index {index} of {}",
                    items.len()
                )));
            }
            items.remove(index);
            engine.reference_counter().remove_references(1);
            Ok(())
        }
        other => Err(VmError::invalid_type("collection", other.type_name())),
    }
}

fn execute_clearitems(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let mut items = items.borrow_mut();
            engine.reference_counter().remove_references(items.len());
            items.clear();
            Ok(())
        }
        StackItem::Map(entries) => {
            let mut entries = entries.borrow_mut();
            engine.reference_counter().remove_references(entries.len() * 2);
            entries.clear();
            Ok(())
        }
        other => Err(VmError::invalid_type("collection", other.type_name())),
    }
}

fn execute_popitem(engine: &mut ExecutionEngine, _: &Instruction) -> VmResult<()> {
    let array = engine.pop()?.as_array()?;
    let item = array
        .borrow_mut()
        .pop()
        .ok_or_else(|| VmError::out_of_range("POPITEM on empty array"))?;
    engine.reference_counter().remove_references(1);
    engine.push(item)
}

#[cfg(test)]
mod tests {
    use crate::{ExecutionEngine, OpCode, VMState};

    fn run(script: Vec<u8>) -> ExecutionEngine {
        let mut engine = ExecutionEngine::default();
        engine.load_script(script, -1, 0).unwrap();
        engine.execute();
        engine
    }

    #[test]
    fn pack_then_unpack() {
        let engine = run(vec![
            OpCode::PUSH1 as u8,
            OpCode::PUSH2 as u8,
            OpCode::PUSH3 as u8,
            OpCode::PUSH3 as u8,
            OpCode::PACK as u8,
            OpCode::UNPACK as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        let values: Vec<_> = engine
            .result_stack()
            .iter()
            .map(|item| item.as_int().unwrap())
            .collect();
        // PACK reverses into the array; UNPACK restores stack order and
        // pushes the count.
        assert_eq!(values, vec![1.into(), 2.into(), 3.into(), 3.into()]);
    }

    #[test]
    fn setitem_pickitem_on_array() {
        let engine = run(vec![
            OpCode::PUSH2 as u8,
            OpCode::NEWARRAY as u8, // [null, null]
            OpCode::DUP as u8,
            OpCode::PUSH0 as u8,
            OpCode::PUSH7 as u8,
            OpCode::SETITEM as u8, // a[0] = 7
            OpCode::PUSH0 as u8,
            OpCode::PICKITEM as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        assert_eq!(engine.result_stack()[0].as_int().unwrap(), 7.into());
    }

    #[test]
    fn map_set_get_remove() {
        // NEWMAP; DUP; "k"; PUSH5; SETITEM; DUP; "k"; HASKEY -> true;
        // "k"; PICKITEM -> 5
        let engine = run(vec![
            OpCode::NEWMAP as u8,
            OpCode::DUP as u8,
            OpCode::PUSHDATA1 as u8,
            1,
            b'k',
            OpCode::PUSH5 as u8,
            OpCode::SETITEM as u8,
            OpCode::DUP as u8,
            OpCode::PUSHDATA1 as u8,
            1,
            b'k',
            OpCode::HASKEY as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        assert!(engine.result_stack()[1].as_bool().unwrap());
    }

    #[test]
    fn map_key_must_be_primitive() {
        let engine = run(vec![
            OpCode::NEWMAP as u8,
            OpCode::NEWARRAY0 as u8,
            OpCode::PUSH1 as u8,
            OpCode::SETITEM as u8,
        ]);
        assert_eq!(engine.state(), VMState::Fault);
    }

    #[test]
    fn append_copies_structs() {
        // Build struct {1}; append to array; mutate the original struct;
        // the array's copy is unchanged.
        let engine = run(vec![
            OpCode::NEWARRAY0 as u8,  // a
            OpCode::PUSH1 as u8,
            OpCode::PUSH1 as u8,
            OpCode::PACKSTRUCT as u8, // s = struct{1}
            OpCode::DUP as u8,        // a s s
            OpCode::ROT as u8,        // s s a
            OpCode::SWAP as u8,       // s a s
            OpCode::APPEND as u8,     // a.append(copy of s); stack: s
            OpCode::PUSH0 as u8,
            OpCode::PUSH9 as u8,
            OpCode::SETITEM as u8,    // s[0] = 9
        ]);
        assert_eq!(engine.state(), VMState::Halt);
    }

    #[test]
    fn popitem_returns_last() {
        let engine = run(vec![
            OpCode::PUSH1 as u8,
            OpCode::PUSH2 as u8,
            OpCode::PUSH2 as u8,
            OpCode::PACK as u8,
            OpCode::POPITEM as u8,
        ]);
        assert_eq!(engine.state(), VMState::Halt);
        // PACK puts the old stack top at index 0, so the last element is 1.
        assert_eq!(engine.result_stack()[0].as_int().unwrap(), 1.into());
    }

    #[test]
    fn newarray_respects_stack_limit() {
        let engine = run(vec![
            OpCode::PUSHINT32 as u8,
            0xFF,
            0xFF,
            0,
            0,
            OpCode::NEWARRAY as u8,
        ]);
        assert_eq!(engine.state(), VMState::Fault);
    }
}
