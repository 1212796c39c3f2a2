//! encoder/output.rs
//! `ObjectOutput` for the encoder: raw at top level, buffered into block
//! segments inside a hook scope.

use std::io::Write;

use crate::collab::ObjectOutput;
use crate::encoder::Encoder;
use crate::model::Value;
use crate::types::{Result, WireError};

impl<W: Write> Encoder<W> {
    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_started()?;
        self.blocks.write(&mut self.out, bytes, self.config.version, &mut self.counters)
    }
}

impl<W: Write> ObjectOutput for Encoder<W> {
    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.emit(&[v as u8])
    }

    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.emit(&[v as u8])
    }

    fn write_char(&mut self, v: u16) -> Result<()> {
        self.emit(&v.to_be_bytes())
    }

    fn write_short(&mut self, v: i16) -> Result<()> {
        self.emit(&v.to_be_bytes())
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.emit(&v.to_be_bytes())
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.emit(&v.to_be_bytes())
    }

    fn write_float(&mut self, v: f32) -> Result<()> {
        self.emit(&v.to_bits().to_be_bytes())
    }

    fn write_double(&mut self, v: f64) -> Result<()> {
        self.emit(&v.to_bits().to_be_bytes())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.emit(bytes)
    }

    fn write_utf(&mut self, s: &str) -> Result<()> {
        let len = u16::try_from(s.len())
            .map_err(|_| WireError::NotEncodable(format!("UTF string of {} bytes exceeds 65535", s.len())))?;
        self.emit(&len.to_be_bytes())?;
        self.emit(s.as_bytes())
    }

    fn write_object(&mut self, v: &Value) -> Result<()> {
        self.write_value(v, false)
    }

    fn write_object_unshared(&mut self, v: &Value) -> Result<()> {
        self.write_value(v, true)
    }

    fn default_write_fields(&mut self) -> Result<()> {
        let frame = self
            .frame
            .clone()
            .ok_or_else(|| WireError::Hook("default_write_fields outside a write hook".into()))?;
        self.write_fields(&frame.obj, &frame.level)
    }
}
