//! Variable slots for static fields, locals and arguments.

use crate::reference_counter::ReferenceCounter;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

/// A fixed-size array of items initialized to `Null`.
pub struct Slot {
    items: Vec<StackItem>,
    reference_counter: ReferenceCounter,
}

impl Slot {
    /// Creates a slot of `count` null entries.
    pub fn new(count: usize, reference_counter: ReferenceCounter) -> Self {
        reference_counter.add_references(count);
        Self {
            items: vec![StackItem::Null; count],
            reference_counter,
        }
    }

    /// Creates a slot holding `items` (used for call arguments).
    pub fn with_items(items: Vec<StackItem>, reference_counter: ReferenceCounter) -> Self {
        for item in &items {
            reference_counter.add_reference(item);
        }
        Self {
            items,
            reference_counter,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> VmResult<StackItem> {
        self.items
            .get(index)
            .cloned()
            .ok_or_else(|| VmError::out_of_range(format!("slot index {index} of {}", self.items.len())))
    }

    pub fn set(&mut self, index: usize, item: StackItem) -> VmResult<()> {
        if index >= self.items.len() {
            return Err(VmError::out_of_range(format!(
                "slot index {index} of {}",
                self.items.len()
            )));
        }
        self.reference_counter.add_reference(&item);
        let old = std::mem::replace(&mut self.items[index], item);
        self.reference_counter.remove_reference(&old);
        Ok(())
    }

    /// The stored items, for root walks.
    pub fn items(&self) -> &[StackItem] {
        &self.items
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.reference_counter.remove_references(self.items.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_initialize_to_null() {
        let slot = Slot::new(3, ReferenceCounter::new());
        assert!(slot.get(0).unwrap().is_null());
        assert!(slot.get(3).is_err());
    }

    #[test]
    fn set_replaces_and_keeps_count() {
        let counter = ReferenceCounter::new();
        let mut slot = Slot::new(2, counter.clone());
        assert_eq!(counter.count(), 2);
        slot.set(0, StackItem::from_int(5)).unwrap();
        assert_eq!(counter.count(), 2);
        assert_eq!(slot.get(0).unwrap().as_int().unwrap(), 5.into());
        drop(slot);
        assert_eq!(counter.count(), 0);
    }
}
