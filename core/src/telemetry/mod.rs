//! telemetry/mod.rs
//! Per-session counters, a wall-clock timer, and immutable snapshots.
//!
//! Both engines own one `SessionCounters` and one `SessionTimer`, reset by
//! `start()`. Snapshots are plain serde data for logs and dashboards.

pub mod counters;
pub mod snapshot;
pub mod timers;

pub use counters::*;
pub use snapshot::*;
pub use timers::*;
