//! telemetry/snapshot.rs
//! Immutable copy of a session's counters with derived figures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::telemetry::counters::SessionCounters;
use crate::telemetry::timers::SessionTimer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u8,
    pub counters: SessionCounters,
    pub back_refs: u64,
    /// Back-references per newly written object; 0 when nothing was written.
    pub sharing_ratio: f64,
    /// Share of stream bytes carried inside block segments.
    pub block_ratio: f64,
    pub elapsed: Duration,
}

impl SessionSnapshot {
    pub fn from(version: u8, counters: &SessionCounters, timer: &SessionTimer) -> Self {
        let back_refs = counters.back_refs();
        let sharing_ratio = if counters.new_objects > 0 {
            back_refs as f64 / counters.new_objects as f64
        } else {
            0.0
        };
        let block_ratio = if counters.bytes > 0 {
            (counters.block_bytes as f64 / counters.bytes as f64).min(1.0)
        } else {
            0.0
        };
        Self {
            version,
            counters: counters.clone(),
            back_refs,
            sharing_ratio,
            block_ratio,
            elapsed: timer.elapsed(),
        }
    }

    /// Internal consistency: block payload never exceeds stream size.
    pub fn sanity_check(&self) -> bool {
        self.counters.block_bytes <= self.counters.bytes && self.block_ratio <= 1.0
    }
}
