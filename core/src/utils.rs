//! utils.rs
//! Size-class arithmetic, structural fingerprints and byte formatting.

use crate::constants::{SizeClass, MEDIUM_LIMIT, SMALL_LIMIT};
use crate::types::{Result, WireError};

/// Pick the narrowest size class for a run of `len` items.
#[inline]
pub fn size_class(len: usize) -> SizeClass {
    if len == 0 {
        SizeClass::Empty
    } else if len <= SMALL_LIMIT {
        SizeClass::Small
    } else if len <= MEDIUM_LIMIT {
        SizeClass::Medium
    } else {
        SizeClass::Large
    }
}

/// Encode the length prefix for `class`. Small and medium wrap their limit to 0.
pub fn encode_size(class: SizeClass, len: usize, out: &mut Vec<u8>) -> Result<()> {
    match class {
        SizeClass::Empty => {
            if len != 0 {
                return Err(WireError::NotEncodable(format!("empty size class with length {}", len)));
            }
        }
        SizeClass::Small => out.push((len & 0xff) as u8),
        SizeClass::Medium => out.extend_from_slice(&((len & 0xffff) as u16).to_be_bytes()),
        SizeClass::Large => {
            let v = i32::try_from(len)
                .map_err(|_| WireError::NotEncodable(format!("length {} exceeds i32::MAX", len)))?;
            out.extend_from_slice(&v.to_be_bytes());
        }
    }
    Ok(())
}

/// Interpret a small-class length byte (0 means 256).
#[inline]
pub fn small_len(raw: u8) -> usize {
    if raw == 0 { SMALL_LIMIT } else { raw as usize }
}

/// Interpret a medium-class length (0 means 65536).
#[inline]
pub fn medium_len(raw: u16) -> usize {
    if raw == 0 { MEDIUM_LIMIT } else { raw as usize }
}

/// Interpret a large-class length; negative values are corruption.
#[inline]
pub fn large_len(raw: i32) -> Result<usize> {
    if raw < 0 {
        return Err(WireError::CorruptStream(format!("negative length {}", raw)));
    }
    Ok(raw as usize)
}

/// Structural-compatibility fingerprint of a type layout.
///
/// CRC32 over the canonical `name;field:kind;...` form, spread into 64 bits
/// with the field count so layouts that collide on the CRC alone still differ.
pub fn structural_fingerprint<'a, I>(name: &str, fields: I) -> i64
where
    I: IntoIterator<Item = (&'a str, char)>,
{
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(name.as_bytes());
    let mut count: u32 = 0;
    for (field, code) in fields {
        hasher.update(b";");
        hasher.update(field.as_bytes());
        hasher.update(b":");
        let mut buf = [0u8; 4];
        hasher.update(code.encode_utf8(&mut buf).as_bytes());
        count += 1;
    }
    let crc = hasher.finalize();
    (((count as u64) << 32) | crc as u64) as i64
}

/// Short printable rendering of raw bytes for error messages.
pub fn fmt_bytes(b: &[u8]) -> String {
    if b.iter().all(|&c| c.is_ascii_graphic() || c == b' ') {
        format!("b\"{}\"", String::from_utf8_lossy(b))
    } else {
        format!("0x{}", hex::encode(b))
    }
}
