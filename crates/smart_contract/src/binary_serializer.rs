//! Canonical binary encoding of stack items.
//!
//! Used by `System.Storage` values, `StdLib.serialize` and the execution
//! logs. Interop interfaces and pointers have no durable form and cannot
//! be serialized.

use crate::{ContractError, ContractResult};
use neo3_vm::{StackItem, StackItemType};
use num_bigint::BigInt;

/// Serializes `item`, failing on unserializable types, reference cycles
/// deeper than `max_nesting`, or output larger than `max_size`.
pub fn serialize_item(item: &StackItem, max_size: usize) -> ContractResult<Vec<u8>> {
    let mut out = Vec::new();
    write_item(item, &mut out, 16)?;
    if out.len() > max_size {
        return Err(ContractError::invalid_argument(format!(
            "serialized item of {} bytes",
            out.len()
        )));
    }
    Ok(out)
}

fn write_item(item: &StackItem, out: &mut Vec<u8>, depth: usize) -> ContractResult<()> {
    if depth == 0 {
        return Err(ContractError::invalid_argument("item nesting too deep"));
    }
    match item {
        StackItem::Null => out.push(StackItemType::Any as u8),
        StackItem::Boolean(value) => {
            out.push(StackItemType::Boolean as u8);
            out.push(u8::from(*value));
        }
        StackItem::Integer(value) => {
            out.push(StackItemType::Integer as u8);
            write_var_bytes(&value.to_signed_bytes_le(), out);
        }
        StackItem::ByteString(bytes) => {
            out.push(StackItemType::ByteString as u8);
            write_var_bytes(bytes, out);
        }
        StackItem::Buffer(bytes) => {
            out.push(StackItemType::Buffer as u8);
            write_var_bytes(&bytes.borrow(), out);
        }
        StackItem::Array(items) | StackItem::Struct(items) => {
            out.push(item.item_type() as u8);
            let items = items.borrow();
            write_count(items.len(), out);
            for child in items.iter() {
                write_item(child, out, depth - 1)?;
            }
        }
        StackItem::Map(entries) => {
            out.push(StackItemType::Map as u8);
            let entries = entries.borrow();
            write_count(entries.len(), out);
            for (key, value) in entries.iter() {
                write_item(key, out, depth - 1)?;
                write_item(value, out, depth - 1)?;
            }
        }
        StackItem::Pointer { .. } | StackItem::InteropInterface(_) => {
            return Err(ContractError::invalid_argument(format!(
                "{} is not serializable",
                item.type_name()
            )));
        }
    }
    Ok(())
}

/// Deserializes an item previously produced by [`serialize_item`].
pub fn deserialize_item(bytes: &[u8]) -> ContractResult<StackItem> {
    let mut position = 0;
    let item = read_item(bytes, &mut position, 16)?;
    if position != bytes.len() {
        return Err(ContractError::invalid_argument("trailing bytes after item"));
    }
    Ok(item)
}

fn read_item(bytes: &[u8], position: &mut usize, depth: usize) -> ContractResult<StackItem> {
    if depth == 0 {
        return Err(ContractError::invalid_argument("item nesting too deep"));
    }
    let tag = *bytes
        .get(*position)
        .ok_or_else(|| ContractError::invalid_argument("truncated item"))?;
    *position += 1;
    match tag {
        t if t == StackItemType::Any as u8 => Ok(StackItem::Null),
        t if t == StackItemType::Boolean as u8 => {
            let byte = read_byte(bytes, position)?;
            Ok(StackItem::from_bool(byte != 0))
        }
        t if t == StackItemType::Integer as u8 => {
            let data = read_var_bytes(bytes, position)?;
            Ok(StackItem::Integer(BigInt::from_signed_bytes_le(&data)))
        }
        t if t == StackItemType::ByteString as u8 => {
            Ok(StackItem::from_bytes(read_var_bytes(bytes, position)?))
        }
        t if t == StackItemType::Buffer as u8 => {
            Ok(StackItem::buffer(read_var_bytes(bytes, position)?))
        }
        t if t == StackItemType::Array as u8 || t == StackItemType::Struct as u8 => {
            let count = read_count(bytes, position)?;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_item(bytes, position, depth - 1)?);
            }
            Ok(if t == StackItemType::Array as u8 {
                StackItem::array(items)
            } else {
                StackItem::struct_(items)
            })
        }
        t if t == StackItemType::Map as u8 => {
            let count = read_count(bytes, position)?;
            let map = StackItem::map();
            {
                let entries = map.as_map().expect("fresh map");
                let mut entries = entries.borrow_mut();
                for _ in 0..count {
                    let key = read_item(bytes, position, depth - 1)?;
                    let value = read_item(bytes, position, depth - 1)?;
                    key.map_key_bytes()
                        .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                    entries.push((key, value));
                }
            }
            Ok(map)
        }
        other => Err(ContractError::invalid_argument(format!(
            "unknown item tag {other:#04x}"
        ))),
    }
}

fn write_count(count: usize, out: &mut Vec<u8>) {
    out.extend_from_slice(&(count as u32).to_le_bytes());
}

fn read_count(bytes: &[u8], position: &mut usize) -> ContractResult<usize> {
    let end = *position + 4;
    let slice = bytes
        .get(*position..end)
        .ok_or_else(|| ContractError::invalid_argument("truncated count"))?;
    *position = end;
    Ok(u32::from_le_bytes(slice.try_into().expect("4 bytes")) as usize)
}

fn write_var_bytes(data: &[u8], out: &mut Vec<u8>) {
    write_count(data.len(), out);
    out.extend_from_slice(data);
}

fn read_var_bytes(bytes: &[u8], position: &mut usize) -> ContractResult<Vec<u8>> {
    let len = read_count(bytes, position)?;
    let end = *position + len;
    let slice = bytes
        .get(*position..end)
        .ok_or_else(|| ContractError::invalid_argument("truncated bytes"))?;
    *position = end;
    Ok(slice.to_vec())
}

fn read_byte(bytes: &[u8], position: &mut usize) -> ContractResult<u8> {
    let byte = *bytes
        .get(*position)
        .ok_or_else(|| ContractError::invalid_argument("truncated byte"))?;
    *position += 1;
    Ok(byte)
}
