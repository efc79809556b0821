//! Unsigned LEB128-style varints: 7 data bits per byte, least significant
//! group first, high bit set on every byte except the last.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// A 32-bit value never needs more than this many bytes.
pub const MAX_VARINT_LEN: usize = 5;

const DATA_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

/// Number of bytes `put_varint` will write for `value`.
pub fn varint_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0xFFF_FFFF => 4,
        _ => 5,
    }
}

pub fn put_varint<B: BufMut>(buf: &mut B, mut value: u32) {
    loop {
        if value & !(DATA_BITS as u32) == 0 {
            buf.put_u8(value as u8);
            return;
        }
        buf.put_u8((value as u8 & DATA_BITS) | CONTINUE_BIT);
        value >>= 7;
    }
}

/// Reads a varint from the front of `buf`, consuming it.
pub fn get_varint<B: Buf>(buf: &mut B) -> Result<u32, ProtocolError> {
    let mut value: u32 = 0;
    for position in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(ProtocolError::UnexpectedEof("varint"));
        }
        let byte = buf.get_u8();
        value |= ((byte & DATA_BITS) as u32) << (7 * position);
        if byte & CONTINUE_BIT == 0 {
            return Ok(value);
        }
    }
    Err(ProtocolError::VarIntTooLong)
}

/// Decodes a varint at the start of `src` without consuming anything.
///
/// Returns `Ok(None)` while the varint is still incomplete, otherwise the
/// value together with the number of bytes it occupies.
pub fn peek_varint(src: &[u8]) -> Result<Option<(u32, usize)>, ProtocolError> {
    let mut value: u32 = 0;
    for (position, byte) in src.iter().take(MAX_VARINT_LEN).enumerate() {
        value |= ((byte & DATA_BITS) as u32) << (7 * position);
        if byte & CONTINUE_BIT == 0 {
            return Ok(Some((value, position + 1)));
        }
    }

    if src.len() >= MAX_VARINT_LEN {
        Err(ProtocolError::VarIntTooLong)
    } else {
        Ok(None)
    }
}

/// Reads a varint one byte at a time from an async reader.
pub async fn read_varint<R>(reader: &mut R) -> Result<u32, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut value: u32 = 0;
    for position in 0..MAX_VARINT_LEN {
        let byte = reader.read_u8().await?;
        value |= ((byte & DATA_BITS) as u32) << (7 * position);
        if byte & CONTINUE_BIT == 0 {
            return Ok(value);
        }
    }
    Err(ProtocolError::VarIntTooLong)
}
