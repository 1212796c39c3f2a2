//! framing/types.rs
//! Block segment headers.
//!
//! Segment layout:
//!   StartBlockEmpty                      (v3+, no payload)
//!   StartBlockSmall  | u8 len  (0 = 256) | payload
//!   StartBlockMedium | u16 len (0 = 65536) | payload
//!   StartBlockLarge  | i32 len (>= 0)    | payload
//! A hook scope is a run of segments and nested objects closed by EndBlockData.

use crate::constants::{SizeClass, Tag, VERSION_CONTAINERS};
use crate::types::{Result, WireError};
use crate::utils::{encode_size, size_class};

/// Encode the header for a segment carrying `len` bytes.
pub fn encode_segment_header(len: usize, version: u8) -> Result<Vec<u8>> {
    let class = match size_class(len) {
        SizeClass::Empty if version < VERSION_CONTAINERS => {
            return Err(WireError::NotEncodable(format!(
                "empty block segment requires protocol version {}",
                VERSION_CONTAINERS
            )))
        }
        class => class,
    };
    let mut out = Vec::with_capacity(5);
    out.push(Tag::block_tag(class).byte());
    encode_size(class, len, &mut out)?;
    Ok(out)
}

/// What the block reader found at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockNext {
    /// Bytes available in the current segment.
    Data(usize),
    /// A nested object record; its tag is left unread.
    Object,
    /// The scope's end marker was consumed.
    End,
}
