//! io.rs
//! Byte-level transport wrappers used by both engines.
//!
//! - `RawOutput` counts bytes written to the underlying writer.
//! - `RawInput` counts bytes read and supports a one-byte tag peek, which the
//!   block reader uses to tell segment headers from nested objects.
//! - All integers are big-endian.

use std::io::{Read, Write};

use byteorder::{BigEndian, ByteOrder};

use crate::constants::Tag;
use crate::types::{Result, WireError};

#[derive(Debug)]
pub struct RawOutput<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> RawOutput<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    #[inline]
    pub fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) -> Result<()> {
        self.put(&[v])
    }

    #[inline]
    pub fn put_tag(&mut self, tag: Tag) -> Result<()> {
        self.put_u8(tag.byte())
    }

    pub fn put_u16(&mut self, v: u16) -> Result<()> {
        let mut b = [0u8; 2];
        BigEndian::write_u16(&mut b, v);
        self.put(&b)
    }

    pub fn put_i32(&mut self, v: i32) -> Result<()> {
        let mut b = [0u8; 4];
        BigEndian::write_i32(&mut b, v);
        self.put(&b)
    }

    pub fn put_u32(&mut self, v: u32) -> Result<()> {
        let mut b = [0u8; 4];
        BigEndian::write_u32(&mut b, v);
        self.put(&b)
    }

    pub fn put_i64(&mut self, v: i64) -> Result<()> {
        let mut b = [0u8; 8];
        BigEndian::write_i64(&mut b, v);
        self.put(&b)
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn reset_count(&mut self) {
        self.written = 0;
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[derive(Debug)]
pub struct RawInput<R: Read> {
    inner: R,
    peeked: Option<u8>,
    read: u64,
}

impl<R: Read> RawInput<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, peeked: None, read: 0 }
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let start = match self.peeked.take() {
            Some(b) => {
                buf[0] = b;
                1
            }
            None => 0,
        };
        self.inner.read_exact(&mut buf[start..]).map_err(WireError::from_read)?;
        self.read += (buf.len() - start) as u64;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    pub fn peek_u8(&mut self) -> Result<u8> {
        match self.peeked {
            Some(b) => Ok(b),
            None => {
                let b = self.read_u8()?;
                self.peeked = Some(b);
                Ok(b)
            }
        }
    }

    pub fn read_tag(&mut self, version: u8) -> Result<Tag> {
        let raw = self.read_u8()?;
        Tag::decode(raw, version)
    }

    pub fn peek_tag(&mut self, version: u8) -> Result<Tag> {
        let raw = self.peek_u8()?;
        Tag::decode(raw, version)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(BigEndian::read_u16(&b))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(BigEndian::read_i32(&b))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(BigEndian::read_u32(&b))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(BigEndian::read_i64(&b))
    }

    /// Read `len` bytes into a fresh buffer, in bounded chunks so a corrupt
    /// length cannot force a huge allocation up front.
    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        const CHUNK: usize = 64 * 1024;
        let mut out = Vec::with_capacity(len.min(CHUNK));
        let mut chunk = [0u8; 4096];
        let mut left = len;
        while left > 0 {
            let n = left.min(chunk.len());
            self.read_exact(&mut chunk[..n])?;
            out.extend_from_slice(&chunk[..n]);
            left -= n;
        }
        Ok(out)
    }

    pub fn skip(&mut self, mut len: usize) -> Result<()> {
        let mut chunk = [0u8; 4096];
        while len > 0 {
            let n = len.min(chunk.len());
            self.read_exact(&mut chunk[..n])?;
            len -= n;
        }
        Ok(())
    }

    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn reset_count(&mut self) {
        self.read = 0;
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
