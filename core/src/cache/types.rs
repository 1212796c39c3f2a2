//! cache/types.rs
//! Back-reference addressing shared by the instance and type sequences.
//!
//! Design notes:
//! - `diff = index - len` is always negative: references only target
//!   entries written earlier in the same sequence.
//! - Near and nearish forms carry the low bits of `diff`; the decoder
//!   re-biases them by 256 / 65536. Far carries the absolute index.
//! - Width selection is a size optimization only; all three forms resolve
//!   to the same absolute index.

use crate::constants::{NEARISH_MIN_DELTA, NEAR_MIN_DELTA};
use crate::types::{Result, WireError};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BackRef {
    Near(u8),
    Nearish(u16),
    Far(u32),
}

impl BackRef {
    /// Narrowest form addressing `index` when the sequence holds `len` entries.
    pub fn select(index: u32, len: u32) -> BackRef {
        debug_assert!(index < len, "back-reference to unwritten entry");
        let diff = index as i64 - len as i64;
        if diff >= NEAR_MIN_DELTA {
            BackRef::Near(diff as u8)
        } else if diff >= NEARISH_MIN_DELTA {
            BackRef::Nearish(diff as u16)
        } else {
            BackRef::Far(index)
        }
    }

    /// Absolute index addressed by this form against a sequence of `len` entries.
    pub fn resolve(self, len: u32) -> Result<u32> {
        let index = match self {
            BackRef::Near(b) => len as i64 + (b as i64 - 0x100),
            BackRef::Nearish(v) => len as i64 + (v as i64 - 0x1_0000),
            BackRef::Far(i) => i as i64,
        };
        if index < 0 || index >= len as i64 {
            return Err(WireError::InvalidBackReference {
                index: index.max(0) as u64,
                len: len as u64,
                reason: "out of range",
            });
        }
        Ok(index as u32)
    }

    pub fn width(self) -> usize {
        match self {
            BackRef::Near(_) => 1,
            BackRef::Nearish(_) => 2,
            BackRef::Far(_) => 4,
        }
    }
}
