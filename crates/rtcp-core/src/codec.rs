//! Network byte order primitives
//!
//! Every multi-byte RTCP field is big-endian on the wire. Decoders read
//! through [`bytes::Buf`] and encoders write through [`bytes::BufMut`], whose
//! `get_*`/`put_*` methods are big-endian regardless of the host. `Buf`
//! panics on short input, so callers check [`ensure_remaining`] first and
//! surface the shortfall as [`Error::TruncatedInput`].

use bytes::{Buf, BufMut};

use crate::error::Error;
use crate::Result;

/// Fail with `TruncatedInput` unless `buf` still holds `required` bytes
pub fn ensure_remaining(buf: &impl Buf, required: usize) -> Result<()> {
    if buf.remaining() < required {
        return Err(Error::truncated(required, buf.remaining()));
    }
    Ok(())
}

fn field_at(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let field = buf.get(offset..).unwrap_or(&[]);
    ensure_remaining(&field, len)?;
    Ok(field)
}

fn field_at_mut(buf: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8]> {
    let available = buf.len().saturating_sub(offset);
    if available < len {
        return Err(Error::truncated(len, available));
    }
    Ok(&mut buf[offset..offset + len])
}

/// Read a big-endian u16 at `offset`
pub fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    Ok(field_at(buf, offset, 2)?.get_u16())
}

/// Read a big-endian u32 at `offset`
pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    Ok(field_at(buf, offset, 4)?.get_u32())
}

/// Read a big-endian u64 at `offset`
pub fn read_u64(buf: &[u8], offset: usize) -> Result<u64> {
    Ok(field_at(buf, offset, 8)?.get_u64())
}

/// Write `value` big-endian at `offset`
pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) -> Result<()> {
    field_at_mut(buf, offset, 2)?.put_u16(value);
    Ok(())
}

/// Write `value` big-endian at `offset`
pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) -> Result<()> {
    field_at_mut(buf, offset, 4)?.put_u32(value);
    Ok(())
}

/// Write `value` big-endian at `offset`
pub fn write_u64(buf: &mut [u8], offset: usize, value: u64) -> Result<()> {
    field_at_mut(buf, offset, 8)?.put_u64(value);
    Ok(())
}

/// Number of zero bytes needed to bring `len` to a 32-bit boundary
pub fn padding_for(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

/// Space separated hex rendering used in trace output
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
