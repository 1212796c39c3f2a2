//! framing/encode.rs
//! Hook-scope buffering on the encode side.
//!
//! Primitive writes inside an active scope are buffered and emitted as
//! segments when the buffer reaches `block_size`. Writing a nested object
//! flushes the buffer and suspends block mode until the object is complete.

use std::io::Write;

use tracing::trace;

use crate::constants::Tag;
use crate::framing::types::encode_segment_header;
use crate::io::RawOutput;
use crate::telemetry::SessionCounters;
use crate::types::{Result, WireError};

#[derive(Debug)]
pub struct BlockWriter {
    buf: Vec<u8>,
    block_size: usize,
    active: bool,
    depth: usize,
}

impl BlockWriter {
    pub fn new(block_size: usize) -> Self {
        Self { buf: Vec::new(), block_size, active: false, depth: 0 }
    }

    /// Open hook scopes, including suspended ones.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn reset(&mut self, block_size: usize) {
        self.buf.clear();
        self.block_size = block_size;
        self.active = false;
        self.depth = 0;
    }

    /// Route `bytes` to the scope buffer when active, else straight out.
    pub fn write<W: Write>(
        &mut self,
        out: &mut RawOutput<W>,
        bytes: &[u8],
        version: u8,
        counters: &mut SessionCounters,
    ) -> Result<()> {
        if !self.active {
            return out.put(bytes);
        }
        self.buf.extend_from_slice(bytes);
        if self.buf.len() >= self.block_size {
            self.flush(out, version, counters)?;
        }
        Ok(())
    }

    /// Emit buffered bytes as one segment.
    pub fn flush<W: Write>(
        &mut self,
        out: &mut RawOutput<W>,
        version: u8,
        counters: &mut SessionCounters,
    ) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let header = encode_segment_header(self.buf.len(), version)?;
        out.put(&header)?;
        out.put(&self.buf)?;
        counters.blocks += 1;
        counters.block_bytes += self.buf.len() as u64;
        trace!(len = self.buf.len(), "block segment");
        self.buf.clear();
        Ok(())
    }

    pub fn enter(&mut self) -> Result<()> {
        if self.active {
            return Err(WireError::Hook("hook scope already active at this level".into()));
        }
        self.active = true;
        self.depth += 1;
        Ok(())
    }

    /// Flush and close the scope with its end marker.
    pub fn exit<W: Write>(
        &mut self,
        out: &mut RawOutput<W>,
        version: u8,
        counters: &mut SessionCounters,
    ) -> Result<()> {
        if !self.active {
            return Err(WireError::Hook("no active hook scope to exit".into()));
        }
        self.flush(out, version, counters)?;
        out.put_tag(Tag::EndBlockData)?;
        self.active = false;
        self.depth -= 1;
        Ok(())
    }

    /// Leave block mode for a nested object; returns the mode to restore.
    pub fn suspend<W: Write>(
        &mut self,
        out: &mut RawOutput<W>,
        version: u8,
        counters: &mut SessionCounters,
    ) -> Result<bool> {
        let was = self.active;
        if was {
            self.flush(out, version, counters)?;
            self.active = false;
        }
        Ok(was)
    }

    pub fn resume(&mut self, was_active: bool) {
        self.active = was_active;
    }
}
