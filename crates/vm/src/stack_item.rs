//! Stack items: the values scripts compute over.
//!
//! Compound items (`Array`, `Struct`, `Map`, `Buffer`) have shared interior
//! state; cloning a `StackItem` clones the handle, not the contents, so the
//! same item can sit in several containers at once. The reference counter
//! tracks how many such handles the engine holds.

use crate::script::Script;
use crate::{VmError, VmResult};
use num_bigint::BigInt;
use num_traits::Zero;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Wire tag of a stack item type, used by `ISTYPE`, `CONVERT` and item
/// serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StackItemType {
    Any = 0x00,
    Pointer = 0x10,
    Boolean = 0x20,
    Integer = 0x21,
    ByteString = 0x28,
    Buffer = 0x30,
    Array = 0x40,
    Struct = 0x41,
    Map = 0x48,
    InteropInterface = 0x60,
}

impl StackItemType {
    pub fn from_byte(byte: u8) -> VmResult<Self> {
        match byte {
            0x00 => Ok(Self::Any),
            0x10 => Ok(Self::Pointer),
            0x20 => Ok(Self::Boolean),
            0x21 => Ok(Self::Integer),
            0x28 => Ok(Self::ByteString),
            0x30 => Ok(Self::Buffer),
            0x40 => Ok(Self::Array),
            0x41 => Ok(Self::Struct),
            0x48 => Ok(Self::Map),
            0x60 => Ok(Self::InteropInterface),
            other => Err(VmError::out_of_range(format!(
                "stack item type {other:#04x}"
            ))),
        }
    }

    /// Primitive types have a byte representation and may key maps.
    pub fn is_primitive(self) -> bool {
        matches!(self, Self::Boolean | Self::Integer | Self::ByteString)
    }
}

/// An opaque host object handed to scripts through interop services.
pub struct InteropValue {
    /// Short kind tag used in diagnostics and type checks.
    pub kind: &'static str,
    /// The wrapped host value.
    pub value: Box<dyn Any>,
}

impl InteropValue {
    pub fn new(kind: &'static str, value: Box<dyn Any>) -> Self {
        Self { kind, value }
    }
}

impl fmt::Debug for InteropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InteropValue({})", self.kind)
    }
}

/// A value on the evaluation stack.
#[derive(Clone)]
pub enum StackItem {
    Null,
    Boolean(bool),
    Integer(BigInt),
    ByteString(Rc<Vec<u8>>),
    Buffer(Rc<RefCell<Vec<u8>>>),
    Array(Rc<RefCell<Vec<StackItem>>>),
    Struct(Rc<RefCell<Vec<StackItem>>>),
    Map(Rc<RefCell<Vec<(StackItem, StackItem)>>>),
    Pointer { script: Rc<Script>, position: usize },
    InteropInterface(Rc<InteropValue>),
}

impl StackItem {
    // ---- constructors ----

    pub fn null() -> Self {
        Self::Null
    }

    pub fn from_bool(value: bool) -> Self {
        Self::Boolean(value)
    }

    pub fn from_int(value: impl Into<BigInt>) -> Self {
        Self::Integer(value.into())
    }

    pub fn from_bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::ByteString(Rc::new(value.into()))
    }

    pub fn buffer(value: Vec<u8>) -> Self {
        Self::Buffer(Rc::new(RefCell::new(value)))
    }

    pub fn array(items: Vec<StackItem>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    pub fn struct_(items: Vec<StackItem>) -> Self {
        Self::Struct(Rc::new(RefCell::new(items)))
    }

    pub fn map() -> Self {
        Self::Map(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn interop(kind: &'static str, value: Box<dyn Any>) -> Self {
        Self::InteropInterface(Rc::new(InteropValue::new(kind, value)))
    }

    // ---- type queries ----

    pub fn item_type(&self) -> StackItemType {
        match self {
            Self::Null => StackItemType::Any,
            Self::Boolean(_) => StackItemType::Boolean,
            Self::Integer(_) => StackItemType::Integer,
            Self::ByteString(_) => StackItemType::ByteString,
            Self::Buffer(_) => StackItemType::Buffer,
            Self::Array(_) => StackItemType::Array,
            Self::Struct(_) => StackItemType::Struct,
            Self::Map(_) => StackItemType::Map,
            Self::Pointer { .. } => StackItemType::Pointer,
            Self::InteropInterface(_) => StackItemType::InteropInterface,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the item shares interior state and is tracked by the
    /// reference counter.
    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            Self::Array(_) | Self::Struct(_) | Self::Map(_) | Self::Buffer(_)
        )
    }

    /// Number of direct child references held by a compound item.
    pub fn sub_item_count(&self) -> usize {
        match self {
            Self::Array(items) | Self::Struct(items) => items.borrow().len(),
            Self::Map(entries) => entries.borrow().len() * 2,
            _ => 0,
        }
    }

    // ---- coercions ----

    /// Truthiness under the VM's rules: null and zero-like primitives are
    /// false, every compound and pointer is true.
    pub fn as_bool(&self) -> VmResult<bool> {
        Ok(match self {
            Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Integer(i) => !i.is_zero(),
            Self::ByteString(bytes) => bytes.iter().any(|&b| b != 0),
            Self::Buffer(_)
            | Self::Array(_)
            | Self::Struct(_)
            | Self::Map(_)
            | Self::Pointer { .. }
            | Self::InteropInterface(_) => true,
        })
    }

    /// Numeric value. Byte strings read as little-endian signed integers
    /// bounded by the integer size limit; compounds and null fault.
    pub fn as_int(&self) -> VmResult<BigInt> {
        match self {
            Self::Boolean(b) => Ok(BigInt::from(u8::from(*b))),
            Self::Integer(i) => Ok(i.clone()),
            Self::ByteString(bytes) => Self::bytes_to_int(bytes),
            Self::Buffer(bytes) => Self::bytes_to_int(&bytes.borrow()),
            other => Err(VmError::invalid_type("Integer", other.type_name())),
        }
    }

    fn bytes_to_int(bytes: &[u8]) -> VmResult<BigInt> {
        if bytes.len() > 32 {
            return Err(VmError::out_of_range(format!(
                "integer from {} bytes",
                bytes.len()
            )));
        }
        Ok(BigInt::from_signed_bytes_le(bytes))
    }

    /// Byte representation of a primitive or buffer item.
    pub fn as_bytes(&self) -> VmResult<Vec<u8>> {
        match self {
            Self::Boolean(b) => Ok(vec![u8::from(*b)]),
            Self::Integer(i) => Ok(int_to_bytes(i)),
            Self::ByteString(bytes) => Ok(bytes.as_ref().clone()),
            Self::Buffer(bytes) => Ok(bytes.borrow().clone()),
            other => Err(VmError::invalid_type("ByteString", other.type_name())),
        }
    }

    /// Shared element vector of an `Array` or `Struct`.
    pub fn as_array(&self) -> VmResult<Rc<RefCell<Vec<StackItem>>>> {
        match self {
            Self::Array(items) | Self::Struct(items) => Ok(Rc::clone(items)),
            other => Err(VmError::invalid_type("Array", other.type_name())),
        }
    }

    /// Shared entry vector of a `Map`.
    pub fn as_map(&self) -> VmResult<Rc<RefCell<Vec<(StackItem, StackItem)>>>> {
        match self {
            Self::Map(entries) => Ok(Rc::clone(entries)),
            other => Err(VmError::invalid_type("Map", other.type_name())),
        }
    }

    /// Shared byte vector of a `Buffer`.
    pub fn as_buffer(&self) -> VmResult<Rc<RefCell<Vec<u8>>>> {
        match self {
            Self::Buffer(bytes) => Ok(Rc::clone(bytes)),
            other => Err(VmError::invalid_type("Buffer", other.type_name())),
        }
    }

    /// The wrapped host object of an `InteropInterface`.
    pub fn as_interop(&self) -> VmResult<Rc<InteropValue>> {
        match self {
            Self::InteropInterface(value) => Ok(Rc::clone(value)),
            other => Err(VmError::invalid_type(
                "InteropInterface",
                other.type_name(),
            )),
        }
    }

    pub fn type_name(&self) -> String {
        format!("{:?}", self.item_type())
    }

    // ---- identity and equality ----

    /// Value equality for primitives (by byte representation, regardless of
    /// primitive type), reference identity for arrays, maps, buffers and
    /// interop handles, and bounded deep equality for structs.
    pub fn equals(&self, other: &StackItem) -> VmResult<bool> {
        // Limit struct recursion; two struct trees larger than this cannot
        // be compared without exceeding execution limits anyway.
        self.equals_bounded(other, &mut 2048)
    }

    fn equals_bounded(&self, other: &StackItem, budget: &mut usize) -> VmResult<bool> {
        if *budget == 0 {
            return Err(VmError::out_of_range("comparison too deep"));
        }
        *budget -= 1;
        Ok(match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b),
            (Self::Buffer(a), Self::Buffer(b)) => Rc::ptr_eq(a, b),
            (Self::InteropInterface(a), Self::InteropInterface(b)) => Rc::ptr_eq(a, b),
            (
                Self::Pointer { script: s1, position: p1 },
                Self::Pointer { script: s2, position: p2 },
            ) => Rc::ptr_eq(s1, s2) && p1 == p2,
            (Self::Struct(a), Self::Struct(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.equals_bounded(y, budget)? {
                        return Ok(false);
                    }
                }
                true
            }
            (a, b) if a.item_type().is_primitive() && b.item_type().is_primitive() => {
                a.as_bytes()? == b.as_bytes()?
            }
            _ => false,
        })
    }

    /// Key identity for map lookups: the raw byte representation of a
    /// primitive item. Non-primitive keys are a type error.
    pub fn map_key_bytes(&self) -> VmResult<Vec<u8>> {
        if !self.item_type().is_primitive() {
            return Err(VmError::invalid_type("primitive key", self.type_name()));
        }
        self.as_bytes()
    }

    // ---- copying and conversion ----

    /// Deep copy used by struct cloning and `CONVERT`. Shared nodes stay
    /// shared within the copy and cycles are preserved.
    pub fn deep_copy(&self) -> StackItem {
        let mut seen: HashMap<usize, StackItem> = HashMap::new();
        self.deep_copy_inner(&mut seen)
    }

    fn deep_copy_inner(&self, seen: &mut HashMap<usize, StackItem>) -> StackItem {
        match self {
            Self::Array(items) => {
                let key = Rc::as_ptr(items) as usize;
                if let Some(copy) = seen.get(&key) {
                    return copy.clone();
                }
                let copy = Self::array(Vec::new());
                seen.insert(key, copy.clone());
                let children: Vec<StackItem> = items
                    .borrow()
                    .iter()
                    .map(|item| item.deep_copy_inner(seen))
                    .collect();
                if let Self::Array(target) = &copy {
                    *target.borrow_mut() = children;
                }
                copy
            }
            Self::Struct(items) => {
                let key = Rc::as_ptr(items) as usize;
                if let Some(copy) = seen.get(&key) {
                    return copy.clone();
                }
                let copy = Self::struct_(Vec::new());
                seen.insert(key, copy.clone());
                let children: Vec<StackItem> = items
                    .borrow()
                    .iter()
                    .map(|item| item.deep_copy_inner(seen))
                    .collect();
                if let Self::Struct(target) = &copy {
                    *target.borrow_mut() = children;
                }
                copy
            }
            Self::Map(entries) => {
                let key = Rc::as_ptr(entries) as usize;
                if let Some(copy) = seen.get(&key) {
                    return copy.clone();
                }
                let copy = Self::map();
                seen.insert(key, copy.clone());
                let children: Vec<(StackItem, StackItem)> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy_inner(seen)))
                    .collect();
                if let Self::Map(target) = &copy {
                    *target.borrow_mut() = children;
                }
                copy
            }
            Self::Buffer(bytes) => Self::buffer(bytes.borrow().clone()),
            other => other.clone(),
        }
    }

    /// Type conversion for `CONVERT`.
    pub fn convert_to(&self, target: StackItemType, max_item_size: usize) -> VmResult<StackItem> {
        if target == self.item_type() {
            return Ok(self.clone());
        }
        match target {
            StackItemType::Boolean => Ok(Self::Boolean(self.as_bool()?)),
            StackItemType::Integer => Ok(Self::Integer(self.as_int()?)),
            StackItemType::ByteString => {
                let bytes = self.as_bytes()?;
                if bytes.len() > max_item_size {
                    return Err(VmError::ItemTooLarge {
                        limit: max_item_size,
                    });
                }
                Ok(Self::from_bytes(bytes))
            }
            StackItemType::Buffer => {
                let bytes = self.as_bytes()?;
                if bytes.len() > max_item_size {
                    return Err(VmError::ItemTooLarge {
                        limit: max_item_size,
                    });
                }
                Ok(Self::buffer(bytes))
            }
            StackItemType::Array => match self {
                Self::Struct(items) => Ok(Self::array(items.borrow().clone())),
                other => Err(VmError::invalid_type("Struct", other.type_name())),
            },
            StackItemType::Struct => match self {
                Self::Array(items) => Ok(Self::struct_(items.borrow().clone())),
                other => Err(VmError::invalid_type("Array", other.type_name())),
            },
            _ => Err(VmError::invalid_type(
                format!("{target:?}"),
                self.type_name(),
            )),
        }
    }
}

/// Minimal little-endian signed encoding of a big integer; zero is empty.
pub fn int_to_bytes(value: &BigInt) -> Vec<u8> {
    if value.is_zero() {
        return Vec::new();
    }
    value.to_signed_bytes_le()
}

/// Size in bytes of the minimal signed encoding.
pub fn int_byte_len(value: &BigInt) -> usize {
    if value.is_zero() {
        0
    } else {
        value.to_signed_bytes_le().len()
    }
}

/// Faults when an integer result grows past the integer size limit.
pub fn check_int_size(value: &BigInt, max_size: usize) -> VmResult<()> {
    let len = int_byte_len(value);
    if len > max_size {
        return Err(VmError::out_of_range(format!(
            "integer magnitude {len} bytes"
        )));
    }
    Ok(())
}

impl fmt::Debug for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Boolean(b) => write!(f, "Boolean({b})"),
            Self::Integer(i) => write!(f, "Integer({i})"),
            Self::ByteString(bytes) => write!(f, "ByteString({} bytes)", bytes.len()),
            Self::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.borrow().len()),
            Self::Array(items) => write!(f, "Array({} items)", items.borrow().len()),
            Self::Struct(items) => write!(f, "Struct({} items)", items.borrow().len()),
            Self::Map(entries) => write!(f, "Map({} entries)", entries.borrow().len()),
            Self::Pointer { position, .. } => write!(f, "Pointer({position})"),
            Self::InteropInterface(value) => write!(f, "Interop({})", value.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!StackItem::Null.as_bool().unwrap());
        assert!(!StackItem::from_int(0).as_bool().unwrap());
        assert!(StackItem::from_int(-1).as_bool().unwrap());
        assert!(!StackItem::from_bytes(vec![0, 0]).as_bool().unwrap());
        assert!(StackItem::from_bytes(vec![0, 1]).as_bool().unwrap());
        assert!(StackItem::array(vec![]).as_bool().unwrap());
    }

    #[test]
    fn integer_coercion_is_little_endian_signed() {
        let item = StackItem::from_bytes(vec![0xFF]);
        assert_eq!(item.as_int().unwrap(), BigInt::from(-1));
        let item = StackItem::from_bytes(vec![0xFF, 0x00]);
        assert_eq!(item.as_int().unwrap(), BigInt::from(255));
    }

    #[test]
    fn oversized_integer_faults() {
        let item = StackItem::from_bytes(vec![1u8; 33]);
        assert!(item.as_int().is_err());
    }

    #[test]
    fn primitive_equality_ignores_primitive_kind() {
        let int = StackItem::from_int(1);
        let bytes = StackItem::from_bytes(vec![1]);
        assert!(int.equals(&bytes).unwrap());
        assert!(StackItem::from_bool(true).equals(&int).unwrap());
    }

    #[test]
    fn arrays_compare_by_reference() {
        let a = StackItem::array(vec![StackItem::from_int(1)]);
        let b = StackItem::array(vec![StackItem::from_int(1)]);
        assert!(!a.equals(&b).unwrap());
        assert!(a.equals(&a.clone()).unwrap());
    }

    #[test]
    fn structs_compare_by_value() {
        let a = StackItem::struct_(vec![StackItem::from_int(1), StackItem::from_bool(true)]);
        let b = StackItem::struct_(vec![StackItem::from_int(1), StackItem::from_bool(true)]);
        assert!(a.equals(&b).unwrap());
    }

    #[test]
    fn shared_child_is_visible_through_both_parents() {
        let child = StackItem::array(vec![]);
        let parent_a = StackItem::array(vec![child.clone()]);
        let parent_b = StackItem::array(vec![child.clone()]);
        child.as_array().unwrap().borrow_mut().push(StackItem::from_int(7));
        for parent in [parent_a, parent_b] {
            let inner = parent.as_array().unwrap().borrow()[0].clone();
            assert_eq!(inner.sub_item_count(), 1);
        }
    }

    #[test]
    fn deep_copy_preserves_cycles() {
        let outer = StackItem::array(vec![]);
        outer
            .as_array()
            .unwrap()
            .borrow_mut()
            .push(outer.clone());
        let copy = outer.deep_copy();
        let copied_child = copy.as_array().unwrap().borrow()[0].clone();
        // The copy is self-referential but distinct from the original.
        assert!(copied_child.equals(&copy).unwrap());
        assert!(!copied_child.equals(&outer).unwrap());
    }

    #[test]
    fn convert_between_array_and_struct() {
        let array = StackItem::array(vec![StackItem::from_int(5)]);
        let converted = array.convert_to(StackItemType::Struct, 1024).unwrap();
        assert_eq!(converted.item_type(), StackItemType::Struct);
        assert!(array
            .convert_to(StackItemType::Integer, 1024)
            .is_err());
    }
}
