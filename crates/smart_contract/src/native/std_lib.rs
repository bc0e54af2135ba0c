//! Encoding helpers exposed to contracts.

use super::{NativeContract, NativeMethod};
use crate::application_engine::ApplicationEngine;
use crate::binary_serializer::{deserialize_item, serialize_item};
use crate::error::{ContractError, ContractResult};
use base64::Engine as _;
use neo3_cryptography::{base58check_decode, base58check_encode};
use neo3_vm::{StackItem, StackItemType};
use num_bigint::BigInt;
use num_traits::Num;

/// Contract id of the standard library.
pub const STD_LIB_ID: i32 = -2;

/// Input ceiling for the encoding helpers.
const MAX_INPUT_LENGTH: usize = 1024;

static METHODS: &[NativeMethod] = &[
    NativeMethod::safe("serialize", 1 << 12),
    NativeMethod::safe("deserialize", 1 << 14),
    NativeMethod::safe("jsonSerialize", 1 << 12),
    NativeMethod::safe("jsonDeserialize", 1 << 14),
    NativeMethod::safe("itoa", 1 << 12),
    NativeMethod::safe("atoi", 1 << 6),
    NativeMethod::safe("base64Encode", 1 << 5),
    NativeMethod::safe("base64Decode", 1 << 5),
    NativeMethod::safe("base58Encode", 1 << 13),
    NativeMethod::safe("base58Decode", 1 << 10),
    NativeMethod::safe("base58CheckEncode", 1 << 16),
    NativeMethod::safe("base58CheckDecode", 1 << 16),
    NativeMethod::safe("memoryCompare", 1 << 5),
    NativeMethod::safe("memorySearch", 1 << 6),
    NativeMethod::safe("stringSplit", 1 << 8),
];

fn arg(args: &[StackItem], index: usize) -> ContractResult<&StackItem> {
    args.get(index)
        .ok_or_else(|| ContractError::invalid_argument("missing argument"))
}

fn arg_bytes(args: &[StackItem], index: usize) -> ContractResult<Vec<u8>> {
    Ok(arg(args, index)?.as_bytes()?)
}

fn arg_string(args: &[StackItem], index: usize) -> ContractResult<String> {
    String::from_utf8(arg_bytes(args, index)?)
        .map_err(|_| ContractError::invalid_argument("argument is not UTF-8"))
}

fn json_from_item(item: &StackItem, depth: usize) -> ContractResult<serde_json::Value> {
    if depth == 0 {
        return Err(ContractError::invalid_argument("json nesting too deep"));
    }
    Ok(match item {
        StackItem::Null => serde_json::Value::Null,
        StackItem::Boolean(value) => serde_json::Value::Bool(*value),
        StackItem::Integer(value) => {
            let value = i64::try_from(value).map_err(|_| {
                ContractError::invalid_argument("integer outside the json-safe range")
            })?;
            serde_json::Value::from(value)
        }
        StackItem::ByteString(_) | StackItem::Buffer(_) => {
            let bytes = item.as_bytes()?;
            let text = String::from_utf8(bytes)
                .map_err(|_| ContractError::invalid_argument("string is not UTF-8"))?;
            serde_json::Value::String(text)
        }
        StackItem::Array(items) | StackItem::Struct(items) => serde_json::Value::Array(
            items
                .borrow()
                .iter()
                .map(|child| json_from_item(child, depth - 1))
                .collect::<ContractResult<_>>()?,
        ),
        StackItem::Map(entries) => {
            let mut object = serde_json::Map::new();
            for (key, value) in entries.borrow().iter() {
                let key = String::from_utf8(key.as_bytes()?)
                    .map_err(|_| ContractError::invalid_argument("map key is not UTF-8"))?;
                object.insert(key, json_from_item(value, depth - 1)?);
            }
            serde_json::Value::Object(object)
        }
        other => {
            return Err(ContractError::invalid_argument(format!(
                "{} has no json form",
                other.type_name()
            )));
        }
    })
}

fn item_from_json(value: &serde_json::Value, depth: usize) -> ContractResult<StackItem> {
    if depth == 0 {
        return Err(ContractError::invalid_argument("json nesting too deep"));
    }
    Ok(match value {
        serde_json::Value::Null => StackItem::Null,
        serde_json::Value::Bool(b) => StackItem::from_bool(*b),
        serde_json::Value::Number(number) => {
            let value = number
                .as_i64()
                .ok_or_else(|| ContractError::invalid_argument("non-integer json number"))?;
            StackItem::from_int(value)
        }
        serde_json::Value::String(text) => StackItem::from_bytes(text.as_bytes().to_vec()),
        serde_json::Value::Array(values) => StackItem::array(
            values
                .iter()
                .map(|child| item_from_json(child, depth - 1))
                .collect::<ContractResult<_>>()?,
        ),
        serde_json::Value::Object(object) => {
            let map = StackItem::map();
            {
                let entries = map.as_map().expect("fresh map");
                let mut entries = entries.borrow_mut();
                for (key, child) in object {
                    entries.push((
                        StackItem::from_bytes(key.as_bytes().to_vec()),
                        item_from_json(child, depth - 1)?,
                    ));
                }
            }
            map
        }
    })
}

/// The standard-library native contract.
pub struct StdLib;

impl NativeContract for StdLib {
    fn id(&self) -> i32 {
        STD_LIB_ID
    }

    fn name(&self) -> &'static str {
        "StdLib"
    }

    fn methods(&self) -> &'static [NativeMethod] {
        METHODS
    }

    fn invoke(
        &self,
        _engine: &mut ApplicationEngine,
        method: &str,
        args: &[StackItem],
    ) -> ContractResult<StackItem> {
        match method {
            "serialize" => {
                let bytes = serialize_item(arg(args, 0)?, neo3_config::MAX_ITEM_SIZE)?;
                Ok(StackItem::from_bytes(bytes))
            }
            "deserialize" => deserialize_item(&arg_bytes(args, 0)?),
            "jsonSerialize" => {
                let value = json_from_item(arg(args, 0)?, 10)?;
                let text = serde_json::to_string(&value)
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                Ok(StackItem::from_bytes(text.into_bytes()))
            }
            "jsonDeserialize" => {
                let text = arg_string(args, 0)?;
                let value: serde_json::Value = serde_json::from_str(&text)
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                item_from_json(&value, 10)
            }
            "itoa" => {
                let value = arg(args, 0)?.as_int()?;
                let base = match args.get(1) {
                    Some(item) => i64::try_from(&item.as_int()?).unwrap_or(10),
                    None => 10,
                };
                let text = match base {
                    10 => value.to_str_radix(10),
                    16 => value.to_str_radix(16),
                    other => {
                        return Err(ContractError::invalid_argument(format!(
                            "base {other}"
                        )));
                    }
                };
                Ok(StackItem::from_bytes(text.into_bytes()))
            }
            "atoi" => {
                let text = arg_string(args, 0)?;
                if text.len() > MAX_INPUT_LENGTH {
                    return Err(ContractError::invalid_argument("input too long"));
                }
                let base = match args.get(1) {
                    Some(item) => i64::try_from(&item.as_int()?).unwrap_or(10),
                    None => 10,
                };
                let value = match base {
                    10 => BigInt::from_str_radix(&text, 10),
                    16 => BigInt::from_str_radix(&text, 16),
                    other => {
                        return Err(ContractError::invalid_argument(format!(
                            "base {other}"
                        )));
                    }
                }
                .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                Ok(StackItem::Integer(value))
            }
            "base64Encode" => {
                let bytes = arg_bytes(args, 0)?;
                let text = base64::engine::general_purpose::STANDARD.encode(bytes);
                Ok(StackItem::from_bytes(text.into_bytes()))
            }
            "base64Decode" => {
                let text = arg_string(args, 0)?;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(text.as_bytes())
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                Ok(StackItem::from_bytes(bytes))
            }
            "base58Encode" => {
                let bytes = arg_bytes(args, 0)?;
                Ok(StackItem::from_bytes(
                    bs58::encode(bytes).into_string().into_bytes(),
                ))
            }
            "base58Decode" => {
                let text = arg_string(args, 0)?;
                let bytes = bs58::decode(&text)
                    .into_vec()
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                Ok(StackItem::from_bytes(bytes))
            }
            "base58CheckEncode" => {
                let bytes = arg_bytes(args, 0)?;
                Ok(StackItem::from_bytes(
                    base58check_encode(&bytes).into_bytes(),
                ))
            }
            "base58CheckDecode" => {
                let text = arg_string(args, 0)?;
                let bytes = base58check_decode(&text)
                    .map_err(|e| ContractError::invalid_argument(e.to_string()))?;
                Ok(StackItem::from_bytes(bytes))
            }
            "memoryCompare" => {
                let a = arg_bytes(args, 0)?;
                let b = arg_bytes(args, 1)?;
                let ordering = a.cmp(&b) as i8;
                Ok(StackItem::from_int(ordering))
            }
            "memorySearch" => {
                let haystack = arg_bytes(args, 0)?;
                let needle = arg_bytes(args, 1)?;
                let start = match args.get(2) {
                    Some(item) => usize::try_from(&item.as_int()?).unwrap_or(0),
                    None => 0,
                };
                let position = if needle.is_empty() || start > haystack.len() {
                    None
                } else {
                    haystack[start..]
                        .windows(needle.len())
                        .position(|window| window == needle)
                        .map(|p| p + start)
                };
                Ok(StackItem::from_int(
                    position.map(|p| p as i64).unwrap_or(-1),
                ))
            }
            "stringSplit" => {
                let text = arg_string(args, 0)?;
                let separator = arg_string(args, 1)?;
                if separator.is_empty() {
                    return Err(ContractError::invalid_argument("empty separator"));
                }
                Ok(StackItem::array(
                    text.split(&separator)
                        .map(|part| StackItem::from_bytes(part.as_bytes().to_vec()))
                        .collect(),
                ))
            }
            other => Err(ContractError::contract_not_found(format!(
                "StdLib::{other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeContract as _;

    fn invoke(method: &str, args: Vec<StackItem>) -> ContractResult<StackItem> {
        // StdLib never touches the engine; a dummy is enough.
        let mut engine = crate::test_support::application_engine();
        StdLib.invoke(&mut engine, method, &args)
    }

    #[test]
    fn itoa_atoi_round_trip() {
        let out = invoke("itoa", vec![StackItem::from_int(-42)]).unwrap();
        assert_eq!(out.as_bytes().unwrap(), b"-42");
        let back = invoke("atoi", vec![StackItem::from_bytes(b"-42".to_vec())]).unwrap();
        assert_eq!(back.as_int().unwrap(), (-42).into());
    }

    #[test]
    fn base64_round_trip() {
        let encoded = invoke(
            "base64Encode",
            vec![StackItem::from_bytes(b"neo3".to_vec())],
        )
        .unwrap();
        let decoded = invoke("base64Decode", vec![encoded]).unwrap();
        assert_eq!(decoded.as_bytes().unwrap(), b"neo3");
    }

    #[test]
    fn json_round_trip() {
        let map = StackItem::map();
        map.as_map().unwrap().borrow_mut().push((
            StackItem::from_bytes(b"k".to_vec()),
            StackItem::from_int(5),
        ));
        let text = invoke("jsonSerialize", vec![map]).unwrap();
        assert_eq!(text.as_bytes().unwrap(), br#"{"k":5}"#);
        let back = invoke("jsonDeserialize", vec![text]).unwrap();
        assert_eq!(back.item_type(), StackItemType::Map);
    }

    #[test]
    fn memory_search_finds_offset() {
        let result = invoke(
            "memorySearch",
            vec![
                StackItem::from_bytes(b"hello neo".to_vec()),
                StackItem::from_bytes(b"neo".to_vec()),
            ],
        )
        .unwrap();
        assert_eq!(result.as_int().unwrap(), 6.into());
    }
}
