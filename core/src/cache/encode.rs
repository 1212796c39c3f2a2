//! cache/encode.rs
//! Encoder-side identity table: value identity -> sequence index.
//!
//! `P` pins the keyed value so its address cannot be reused by a new
//! allocation while the entry is live.

use std::collections::HashMap;

#[derive(Debug)]
pub struct InternCache<P> {
    index: HashMap<usize, u32>,
    pins: Vec<P>,
    len: u32,
}

impl<P> Default for InternCache<P> {
    fn default() -> Self {
        Self { index: HashMap::new(), pins: Vec::new(), len: 0 }
    }
}

impl<P> InternCache<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sequence slots handed out, including invalidated ones.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn lookup(&self, key: usize) -> Option<u32> {
        self.index.get(&key).copied()
    }

    /// Take the next slot for `key`, replacing any earlier mapping.
    pub fn push(&mut self, key: usize, pin: P) -> u32 {
        let i = self.len;
        self.len += 1;
        self.index.insert(key, i);
        self.pins.push(pin);
        i
    }

    /// Map `key` onto an existing slot.
    pub fn alias(&mut self, key: usize, index: u32, pin: P) {
        self.index.insert(key, index);
        self.pins.push(pin);
    }

    /// Forget `key` while keeping its slot occupied.
    pub fn invalidate(&mut self, key: usize) {
        self.index.remove(&key);
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.pins.clear();
        self.len = 0;
    }
}
