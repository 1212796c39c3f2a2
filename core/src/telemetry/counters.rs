//! telemetry/counters.rs
//! Mutable counters collected while a session runs.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::cache::BackRef;

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub new_objects: u64,
    pub back_refs_near: u64,
    pub back_refs_nearish: u64,
    pub back_refs_far: u64,
    pub new_descriptors: u64,
    pub descriptor_back_refs: u64,
    pub blocks: u64,
    pub block_bytes: u64,
    pub bytes: u64,
    pub cache_clears: u64,
    /// Scope bytes skipped because hook logic did not consume them.
    pub drained_bytes: u64,
}

impl SessionCounters {
    pub fn add_back_ref(&mut self, r: BackRef) {
        match r {
            BackRef::Near(_) => self.back_refs_near += 1,
            BackRef::Nearish(_) => self.back_refs_nearish += 1,
            BackRef::Far(_) => self.back_refs_far += 1,
        }
    }

    pub fn back_refs(&self) -> u64 {
        self.back_refs_near + self.back_refs_nearish + self.back_refs_far
    }

    pub fn merge(&mut self, other: &SessionCounters) {
        self.new_objects += other.new_objects;
        self.back_refs_near += other.back_refs_near;
        self.back_refs_nearish += other.back_refs_nearish;
        self.back_refs_far += other.back_refs_far;
        self.new_descriptors += other.new_descriptors;
        self.descriptor_back_refs += other.descriptor_back_refs;
        self.blocks += other.blocks;
        self.block_bytes += other.block_bytes;
        self.bytes += other.bytes;
        self.cache_clears += other.cache_clears;
        self.drained_bytes += other.drained_bytes;
    }
}

impl AddAssign for SessionCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(&rhs);
    }
}
