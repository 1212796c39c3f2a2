//! cache/decode.rs
//! Decoder-side slot table: sequence index -> value.

use crate::types::{Result, WireError};

#[derive(Debug, Clone)]
pub enum Slot<T> {
    Filled(T),
    /// Reserved for an instance still under construction.
    Pending,
    /// Occupied by an unshared value; never addressable.
    Unshared,
}

#[derive(Debug)]
pub struct SlotCache<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Default for SlotCache<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> SlotCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn push(&mut self, v: T) -> u32 {
        self.slots.push(Slot::Filled(v));
        self.len() - 1
    }

    pub fn reserve(&mut self) -> u32 {
        self.slots.push(Slot::Pending);
        self.len() - 1
    }

    pub fn push_unshared(&mut self) -> u32 {
        self.slots.push(Slot::Unshared);
        self.len() - 1
    }

    /// Fill or replace slot `index`.
    pub fn set(&mut self, index: u32, v: T) -> Result<()> {
        let len = self.len();
        let slot = self.slots.get_mut(index as usize).ok_or(WireError::InvalidBackReference {
            index: index as u64,
            len: len as u64,
            reason: "out of range",
        })?;
        *slot = Slot::Filled(v);
        Ok(())
    }

    pub fn mark_unshared(&mut self, index: u32) {
        if let Some(slot) = self.slots.get_mut(index as usize) {
            *slot = Slot::Unshared;
        }
    }

    pub fn get(&self, index: u32) -> Result<&T> {
        let err = |reason| WireError::InvalidBackReference {
            index: index as u64,
            len: self.slots.len() as u64,
            reason,
        };
        match self.slots.get(index as usize) {
            Some(Slot::Filled(v)) => Ok(v),
            Some(Slot::Pending) => Err(err("instance still under construction")),
            Some(Slot::Unshared) => Err(err("unshared")),
            None => Err(err("out of range")),
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
