//! framing/decode.rs
//! Hook-scope cursor on the decode side.
//!
//! Invariants:
//! - Primitive reads span segment boundaries transparently.
//! - Once the end marker is consumed the scope is `Ended` and every further
//!   read fails with `NoMoreHookData` without touching the stream.
//! - A nested object inside a scope is only legal at a segment boundary.

use std::io::Read;

use crate::constants::Tag;
use crate::framing::types::BlockNext;
use crate::io::RawInput;
use crate::telemetry::SessionCounters;
use crate::types::{Result, WireError};
use crate::utils::{large_len, medium_len, small_len};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Not inside a hook scope: reads go straight to the stream.
    Raw,
    Active { remaining: usize },
    Ended,
}

#[derive(Debug)]
pub struct BlockReader {
    state: ScopeState,
}

impl Default for BlockReader {
    fn default() -> Self {
        Self { state: ScopeState::Raw }
    }
}

impl BlockReader {
    pub fn state(&self) -> ScopeState {
        self.state
    }

    pub fn is_raw(&self) -> bool {
        self.state == ScopeState::Raw
    }

    pub fn remaining(&self) -> usize {
        match self.state {
            ScopeState::Active { remaining } => remaining,
            _ => 0,
        }
    }

    /// Enter a fresh scope; returns the state to restore on exit.
    pub fn enter(&mut self) -> ScopeState {
        std::mem::replace(&mut self.state, ScopeState::Active { remaining: 0 })
    }

    /// Leave block mode for a nested object; returns the state to restore.
    pub fn suspend(&mut self) -> ScopeState {
        std::mem::replace(&mut self.state, ScopeState::Raw)
    }

    pub fn restore(&mut self, saved: ScopeState) {
        self.state = saved;
    }

    /// Position the cursor on data, a nested object, or the scope end.
    pub fn advance<R: Read>(
        &mut self,
        input: &mut RawInput<R>,
        version: u8,
        counters: &mut SessionCounters,
    ) -> Result<BlockNext> {
        loop {
            match self.state {
                ScopeState::Raw => {
                    return Err(WireError::Hook("no active hook scope".into()))
                }
                ScopeState::Ended => return Ok(BlockNext::End),
                ScopeState::Active { remaining } if remaining > 0 => {
                    return Ok(BlockNext::Data(remaining))
                }
                ScopeState::Active { .. } => {}
            }
            let tag = input.peek_tag(version)?;
            let len = match tag {
                Tag::EndBlockData => {
                    input.read_u8()?;
                    self.state = ScopeState::Ended;
                    return Ok(BlockNext::End);
                }
                Tag::StartBlockEmpty => 0,
                Tag::StartBlockSmall => {
                    input.read_u8()?;
                    small_len(input.read_u8()?)
                }
                Tag::StartBlockMedium => {
                    input.read_u8()?;
                    medium_len(input.read_u16()?)
                }
                Tag::StartBlockLarge => {
                    input.read_u8()?;
                    large_len(input.read_i32()?)?
                }
                _ => return Ok(BlockNext::Object),
            };
            if tag == Tag::StartBlockEmpty {
                input.read_u8()?;
            }
            counters.blocks += 1;
            counters.block_bytes += len as u64;
            self.state = ScopeState::Active { remaining: len };
        }
    }

    /// Fill `buf` from the scope, crossing segment headers as needed.
    pub fn read<R: Read>(
        &mut self,
        input: &mut RawInput<R>,
        buf: &mut [u8],
        version: u8,
        counters: &mut SessionCounters,
    ) -> Result<()> {
        let mut off = 0;
        while off < buf.len() {
            match self.advance(input, version, counters)? {
                BlockNext::Data(avail) => {
                    let n = avail.min(buf.len() - off);
                    input.read_exact(&mut buf[off..off + n])?;
                    off += n;
                    self.state = ScopeState::Active { remaining: avail - n };
                }
                BlockNext::End => return Err(WireError::NoMoreHookData),
                BlockNext::Object => {
                    return Err(WireError::CorruptStream(
                        "primitive read hit a nested object inside a hook scope".into(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Discard `len` bytes of the current segment.
    pub fn skip_data<R: Read>(&mut self, input: &mut RawInput<R>, len: usize) -> Result<()> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(WireError::CorruptStream(format!(
                "skip of {} exceeds {} remaining block bytes",
                len, remaining
            )));
        }
        input.skip(len)?;
        self.state = ScopeState::Active { remaining: remaining - len };
        Ok(())
    }
}
