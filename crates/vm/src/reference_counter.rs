//! Reference counting for shared compound items.
//!
//! The counter keeps a running total of references held by the engine:
//! one per evaluation-stack and slot entry, plus one per child slot inside
//! a compound item. Handlers adjust the total as they move items; when the
//! running total crosses the stack-size limit the engine performs an exact
//! recount from its roots (see [`exact_count`]) so that unreachable cycles
//! do not count against the script.
//!
//! Compound interiors are `Rc`-shared, so an unreachable cycle would
//! otherwise outlive the execution; every compound is registered here by
//! weak handle and [`ReferenceCounter::break_cycles`] clears survivors when
//! the engine is dropped.

use crate::stack_item::StackItem;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

enum TrackedCompound {
    List(Weak<RefCell<Vec<StackItem>>>),
    Map(Weak<RefCell<Vec<(StackItem, StackItem)>>>),
}

#[derive(Default)]
struct Inner {
    count: usize,
    tracked: Vec<TrackedCompound>,
    tracked_ptrs: HashSet<usize>,
}

/// Shared counter of live item references.
#[derive(Clone, Default)]
pub struct ReferenceCounter {
    inner: Rc<RefCell<Inner>>,
}

impl ReferenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The running reference total.
    pub fn count(&self) -> usize {
        self.inner.borrow().count
    }

    /// Records `n` new references.
    pub fn add_references(&self, n: usize) {
        self.inner.borrow_mut().count += n;
    }

    /// Records one new reference to `item` and registers compounds for
    /// end-of-execution cycle breaking.
    pub fn add_reference(&self, item: &StackItem) {
        self.track(item);
        self.add_references(1);
    }

    /// Releases `n` references.
    pub fn remove_references(&self, n: usize) {
        let mut inner = self.inner.borrow_mut();
        inner.count = inner.count.saturating_sub(n);
    }

    /// Releases one reference.
    pub fn remove_reference(&self, _item: &StackItem) {
        self.remove_references(1);
    }

    /// Replaces the running total with an exact figure computed from roots.
    pub fn set_count(&self, count: usize) {
        self.inner.borrow_mut().count = count;
    }

    fn track(&self, item: &StackItem) {
        let mut inner = self.inner.borrow_mut();
        match item {
            StackItem::Array(items) | StackItem::Struct(items) => {
                if inner.tracked_ptrs.insert(Rc::as_ptr(items) as usize) {
                    inner.tracked.push(TrackedCompound::List(Rc::downgrade(items)));
                }
            }
            StackItem::Map(entries) => {
                if inner.tracked_ptrs.insert(Rc::as_ptr(entries) as usize) {
                    inner.tracked.push(TrackedCompound::Map(Rc::downgrade(entries)));
                }
            }
            _ => {}
        }
    }

    /// Clears the contents of every still-reachable tracked compound,
    /// breaking reference cycles so their memory can be reclaimed.
    pub fn break_cycles(&self) {
        let tracked = std::mem::take(&mut self.inner.borrow_mut().tracked);
        for compound in tracked {
            match compound {
                TrackedCompound::List(weak) => {
                    if let Some(items) = weak.upgrade() {
                        items.borrow_mut().clear();
                    }
                }
                TrackedCompound::Map(weak) => {
                    if let Some(entries) = weak.upgrade() {
                        entries.borrow_mut().clear();
                    }
                }
            }
        }
        self.inner.borrow_mut().tracked_ptrs.clear();
    }
}

/// Exact reference count reachable from `roots`: one per root entry plus
/// one per child slot of every distinct reachable compound.
pub fn exact_count<'a>(roots: impl Iterator<Item = &'a StackItem>) -> usize {
    let mut visited: HashSet<usize> = HashSet::new();
    let mut pending: Vec<StackItem> = Vec::new();
    let mut count = 0usize;

    for root in roots {
        count += 1;
        pending.push(root.clone());
    }

    while let Some(item) = pending.pop() {
        match &item {
            StackItem::Array(items) | StackItem::Struct(items) => {
                if visited.insert(Rc::as_ptr(items) as usize) {
                    let children = items.borrow();
                    count += children.len();
                    pending.extend(children.iter().cloned());
                }
            }
            StackItem::Map(entries) => {
                if visited.insert(Rc::as_ptr(entries) as usize) {
                    let children = entries.borrow();
                    count += children.len() * 2;
                    for (key, value) in children.iter() {
                        pending.push(key.clone());
                        pending.push(value.clone());
                    }
                }
            }
            _ => {}
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_total_tracks_adds_and_removes() {
        let counter = ReferenceCounter::new();
        let item = StackItem::from_int(1);
        counter.add_reference(&item);
        counter.add_reference(&item);
        assert_eq!(counter.count(), 2);
        counter.remove_reference(&item);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn exact_count_counts_children_once_per_slot() {
        let shared = StackItem::array(vec![StackItem::from_int(1)]);
        let parent = StackItem::array(vec![shared.clone(), shared.clone()]);
        // Roots: parent (1). Children: two slots in parent (2), the shared
        // array's single child counted once (1).
        assert_eq!(exact_count([parent].iter()), 4);
    }

    #[test]
    fn exact_count_handles_cycles() {
        let cyclic = StackItem::array(vec![]);
        cyclic.as_array().unwrap().borrow_mut().push(cyclic.clone());
        // Root (1) + one child slot (1).
        assert_eq!(exact_count([cyclic.clone()].iter()), 2);
        // Unreferenced from roots, a cycle contributes nothing.
        assert_eq!(exact_count([].iter()), 0);
        cyclic.as_array().unwrap().borrow_mut().clear();
    }

    #[test]
    fn break_cycles_clears_tracked_compounds() {
        let counter = ReferenceCounter::new();
        let cyclic = StackItem::array(vec![]);
        cyclic.as_array().unwrap().borrow_mut().push(cyclic.clone());
        counter.add_reference(&cyclic);
        counter.break_cycles();
        assert_eq!(cyclic.sub_item_count(), 0);
    }
}
