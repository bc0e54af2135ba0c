//! Header lookahead cache for block synchronization.

use neo3_core::BlockHeader;
use parking_lot::RwLock;
use std::collections::VecDeque;

/// Headers received ahead of their blocks, in height order.
pub struct HeaderCache {
    headers: RwLock<VecDeque<BlockHeader>>,
    max_size: usize,
}

impl Default for HeaderCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl HeaderCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            headers: RwLock::new(VecDeque::new()),
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.headers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.read().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_size
    }

    /// Appends a header; it must extend the cached chain by exactly one.
    pub fn push(&self, header: BlockHeader) -> bool {
        let mut headers = self.headers.write();
        if headers.len() >= self.max_size {
            return false;
        }
        if let Some(last) = headers.back() {
            if header.index != last.index + 1 || header.prev_hash != last.hash() {
                return false;
            }
        }
        headers.push_back(header);
        true
    }

    /// The header at `index`, if cached.
    pub fn get(&self, index: u32) -> Option<BlockHeader> {
        let headers = self.headers.read();
        let first = headers.front()?.index;
        if index < first {
            return None;
        }
        headers.get((index - first) as usize).cloned()
    }

    /// The highest cached header.
    pub fn last(&self) -> Option<BlockHeader> {
        self.headers.read().back().cloned()
    }

    /// Drops every header at or below `index` (they persisted).
    pub fn prune_to(&self, index: u32) {
        let mut headers = self.headers.write();
        while headers.front().is_some_and(|h| h.index <= index) {
            headers.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_core::{UInt160, UInt256, Witness};

    fn header(index: u32, prev_hash: UInt256) -> BlockHeader {
        BlockHeader {
            version: 0,
            prev_hash,
            merkle_root: UInt256::zero(),
            timestamp_ms: 1000 + index as u64,
            nonce: 0,
            index,
            primary_index: 0,
            next_consensus: UInt160::zero(),
            witness: Witness::empty(),
        }
    }

    #[test]
    fn chains_headers_in_order() {
        let cache = HeaderCache::new(10);
        let first = header(1, UInt256::from_data(b"genesis"));
        assert!(cache.push(first.clone()));
        let second = header(2, first.hash());
        assert!(cache.push(second));
        // A gap is rejected.
        assert!(!cache.push(header(5, UInt256::zero())));
        assert_eq!(cache.get(2).unwrap().index, 2);
    }

    #[test]
    fn prune_drops_persisted_headers() {
        let cache = HeaderCache::new(10);
        let first = header(1, UInt256::from_data(b"genesis"));
        let second = header(2, first.hash());
        cache.push(first);
        cache.push(second);
        cache.prune_to(1);
        assert!(cache.get(1).is_none());
        assert_eq!(cache.get(2).unwrap().index, 2);
    }
}
