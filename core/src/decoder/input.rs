//! decoder/input.rs
//! `ObjectInput` for the decoder: raw at top level, through the block
//! cursor inside a hook scope.

use std::io::Read;

use byteorder::{BigEndian, ByteOrder};

use crate::collab::ObjectInput;
use crate::decoder::Decoder;
use crate::framing::BlockNext;
use crate::framing::ScopeState;
use crate::model::Value;
use crate::types::{Result, WireError};

impl<R: Read> Decoder<R> {
    fn take(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_started()?;
        if self.blocks.is_raw() {
            self.input.read_exact(buf)
        } else {
            self.blocks.read(&mut self.input, buf, self.version, &mut self.counters)
        }
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.take(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read> ObjectInput for Decoder<R> {
    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.take_array::<1>()?[0] != 0)
    }

    fn read_byte(&mut self) -> Result<i8> {
        Ok(self.take_array::<1>()?[0] as i8)
    }

    fn read_char(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(&self.take_array::<2>()?))
    }

    fn read_short(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(&self.take_array::<2>()?))
    }

    fn read_int(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(&self.take_array::<4>()?))
    }

    fn read_long(&mut self) -> Result<i64> {
        Ok(BigEndian::read_i64(&self.take_array::<8>()?))
    }

    fn read_float(&mut self) -> Result<f32> {
        Ok(BigEndian::read_f32(&self.take_array::<4>()?))
    }

    fn read_double(&mut self) -> Result<f64> {
        Ok(BigEndian::read_f64(&self.take_array::<8>()?))
    }

    fn read_fully(&mut self, buf: &mut [u8]) -> Result<()> {
        self.take(buf)
    }

    fn read_utf(&mut self) -> Result<String> {
        let len = self.read_char()? as usize;
        let mut buf = vec![0u8; len];
        self.take(&mut buf)?;
        String::from_utf8(buf).map_err(|e| WireError::CorruptStream(format!("invalid UTF-8: {}", e)))
    }

    fn read_object(&mut self) -> Result<Value> {
        self.read_root(false)
    }

    fn read_object_unshared(&mut self) -> Result<Value> {
        self.read_root(true)
    }

    fn default_read_fields(&mut self) -> Result<()> {
        let frame = self
            .frame
            .clone()
            .ok_or_else(|| WireError::Hook("default_read_fields outside a read hook".into()))?;
        self.read_fields(Some(&frame.obj), &frame.level)
    }

    fn remaining(&self) -> usize {
        self.blocks.remaining()
    }

    fn end_of_scope(&mut self) -> Result<bool> {
        match self.blocks.state() {
            ScopeState::Raw => Ok(false),
            ScopeState::Ended => Ok(true),
            ScopeState::Active { .. } => {
                let next = self.blocks.advance(&mut self.input, self.version, &mut self.counters)?;
                Ok(next == BlockNext::End)
            }
        }
    }

    fn skip_to_scope_end(&mut self) -> Result<()> {
        if self.blocks.is_raw() {
            return Err(WireError::Hook("skip_to_scope_end outside a hook scope".into()));
        }
        self.drain_scope()
    }

    fn register_validation(&mut self, callback: Box<dyn FnOnce() -> Result<()>>, priority: i32) -> Result<()> {
        if self.depth == 0 {
            return Err(WireError::Hook("validation registered outside an object read".into()));
        }
        self.validations.push(callback, priority);
        Ok(())
    }
}
