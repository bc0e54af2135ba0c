//! Executable scripts.

use crate::instruction::Instruction;
use crate::{VmError, VmResult};
use std::collections::BTreeMap;

/// An immutable byte sequence of instructions.
///
/// Instructions are decoded lazily and cached by offset; a script is shared
/// between contexts through `Rc`, so the cache is built once per script.
#[derive(Debug)]
pub struct Script {
    bytes: Vec<u8>,
    instructions: std::cell::RefCell<BTreeMap<usize, Instruction>>,
}

impl Script {
    /// Wraps script bytes, enforcing the length limit.
    pub fn new(bytes: Vec<u8>, max_script_length: usize) -> VmResult<Self> {
        if bytes.len() > max_script_length {
            return Err(VmError::invalid_script(format!(
                "script length {} exceeds {max_script_length}",
                bytes.len()
            )));
        }
        Ok(Self {
            bytes,
            instructions: std::cell::RefCell::new(BTreeMap::new()),
        })
    }

    /// Length of the script in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the script has no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The raw bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decodes the instruction at `position`.
    pub fn instruction_at(&self, position: usize) -> VmResult<Instruction> {
        if let Some(cached) = self.instructions.borrow().get(&position) {
            return Ok(cached.clone());
        }
        let instruction = Instruction::parse(&self.bytes, position)?;
        self.instructions
            .borrow_mut()
            .insert(position, instruction.clone());
        Ok(instruction)
    }
}

impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Script {}
