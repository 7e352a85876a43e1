//! LRU cache of device blocks keyed by block index.

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};

/// Block cache with LRU eviction.
///
/// Blocks are stored as [`Bytes`] so lookups hand out cheap reference
/// counted views instead of copies.
pub(crate) struct BlockCache {
    blocks: HashMap<u64, Bytes>,
    lru_queue: VecDeque<u64>,
    max_blocks: usize,
}

impl BlockCache {
    pub fn new(max_blocks: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            lru_queue: VecDeque::new(),
            max_blocks: max_blocks.max(1),
        }
    }

    pub fn get(&mut self, index: u64) -> Option<Bytes> {
        let block = self.blocks.get(&index)?.clone();
        self.touch(index);
        Some(block)
    }

    pub fn contains(&self, index: u64) -> bool {
        self.blocks.contains_key(&index)
    }

    pub fn insert(&mut self, index: u64, block: Bytes) {
        if self.blocks.insert(index, block).is_some() {
            self.touch(index);
            return;
        }

        if self.blocks.len() > self.max_blocks {
            if let Some(oldest) = self.lru_queue.pop_back() {
                self.blocks.remove(&oldest);
            }
        }
        self.lru_queue.push_front(index);
    }

    /// Drops every cached block overlapping `first..=last`.
    pub fn invalidate(&mut self, first: u64, last: u64) {
        self.blocks.retain(|&index, _| index < first || index > last);
        self.lru_queue
            .retain(|&index| index < first || index > last);
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.lru_queue.clear();
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    fn touch(&mut self, index: u64) {
        self.lru_queue.retain(|&x| x != index);
        self.lru_queue.push_front(index);
    }
}
