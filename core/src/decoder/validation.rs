//! decoder/validation.rs
//! Post-decode validation callbacks.
//!
//! Callbacks registered during one top-level read run after it completes,
//! highest priority first, registration order within a priority.

use std::fmt;

use crate::types::Result;

type Callback = Box<dyn FnOnce() -> Result<()>>;

#[derive(Default)]
pub struct ValidationQueue {
    entries: Vec<(i32, u64, Callback)>,
    seq: u64,
}

impl ValidationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, callback: Callback, priority: i32) {
        self.entries.push((priority, self.seq, callback));
        self.seq += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.seq = 0;
    }

    /// Drain and run every callback; the first failure stops the run and
    /// drops the rest.
    pub fn run(&mut self) -> Result<()> {
        let mut entries = std::mem::take(&mut self.entries);
        self.seq = 0;
        entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        for (_, _, cb) in entries {
            cb()?;
        }
        Ok(())
    }
}

impl fmt::Debug for ValidationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationQueue").field("pending", &self.entries.len()).finish()
    }
}
