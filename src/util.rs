//! # MQTT-SN Serialization Utilities
//!
//! This module provides helper functions for reading and writing MQTT-SN
//! wire fields from and to byte buffers: big-endian integers, trailing
//! strings, and the one- or three-octet frame length header.

use crate::error::ProtocolError;

/// Reads a single octet from the buffer, advancing the cursor.
pub fn read_u8(cursor: &mut usize, buf: &[u8]) -> Result<u8, ProtocolError> {
    let b = *buf.get(*cursor).ok_or(ProtocolError::MalformedMessage)?;
    *cursor += 1;
    Ok(b)
}

/// Reads a big-endian `u16` from the buffer, advancing the cursor.
pub fn read_u16(cursor: &mut usize, buf: &[u8]) -> Result<u16, ProtocolError> {
    let bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(ProtocolError::MalformedMessage)?;
    *cursor += 2;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Returns the remainder of the buffer as a byte slice.
///
/// MQTT-SN carries variable-length fields (topic names, payloads, client
/// ids) as the trailing bytes of a message, with no inner length prefix.
pub fn read_rest<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a [u8], ProtocolError> {
    let rest = buf.get(*cursor..).ok_or(ProtocolError::MalformedMessage)?;
    *cursor = buf.len();
    Ok(rest)
}

/// Returns the remainder of the buffer as a UTF-8 string.
pub fn read_rest_str<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a str, ProtocolError> {
    core::str::from_utf8(read_rest(cursor, buf)?).map_err(|_| ProtocolError::InvalidUtf8String)
}

/// Writes a single octet, advancing the cursor.
pub fn write_u8(cursor: &mut usize, buf: &mut [u8], val: u8) -> Result<(), ProtocolError> {
    *buf.get_mut(*cursor).ok_or(ProtocolError::BufferTooSmall)? = val;
    *cursor += 1;
    Ok(())
}

/// Writes a big-endian `u16`, advancing the cursor.
pub fn write_u16(cursor: &mut usize, buf: &mut [u8], val: u16) -> Result<(), ProtocolError> {
    let slice = buf
        .get_mut(*cursor..*cursor + 2)
        .ok_or(ProtocolError::BufferTooSmall)?;
    slice.copy_from_slice(&val.to_be_bytes());
    *cursor += 2;
    Ok(())
}

/// Writes a raw byte slice, advancing the cursor.
pub fn write_bytes(cursor: &mut usize, buf: &mut [u8], data: &[u8]) -> Result<(), ProtocolError> {
    let slice = buf
        .get_mut(*cursor..*cursor + data.len())
        .ok_or(ProtocolError::BufferTooSmall)?;
    slice.copy_from_slice(data);
    *cursor += data.len();
    Ok(())
}

/// Space reserved in front of a message body for the frame length header.
///
/// Encoders write the body starting at this offset; [`finish_frame`] then
/// prepends the real header and compacts the buffer when the short form
/// fits.
pub const FRAME_HEADER_RESERVE: usize = 3;

/// Parses the frame length header at the start of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed to know the frame length,
/// and `Ok(Some((total, header)))` with the total frame length and the
/// header size otherwise. A leading zero octet escapes to the three-octet
/// extended form (`0x00` followed by a big-endian `u16`).
pub fn frame_header(buf: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    if first != 0 {
        let total = first as usize;
        if total < 2 {
            return Err(ProtocolError::MalformedMessage);
        }
        return Ok(Some((total, 1)));
    }
    let Some(bytes) = buf.get(1..3) else {
        return Ok(None);
    };
    let total = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    if total < 4 {
        return Err(ProtocolError::MalformedMessage);
    }
    Ok(Some((total, 3)))
}

/// Finalizes a frame whose body occupies `buf[FRAME_HEADER_RESERVE..end]`.
///
/// Writes the length header in front of the body and compacts the buffer
/// when the one-octet form suffices. Returns the total frame length.
pub fn finish_frame(buf: &mut [u8], end: usize) -> Result<usize, ProtocolError> {
    let body_len = end - FRAME_HEADER_RESERVE;
    if body_len + 1 <= 0xFF {
        buf.copy_within(FRAME_HEADER_RESERVE..end, 1);
        buf[0] = (body_len + 1) as u8;
        Ok(body_len + 1)
    } else {
        let total = body_len + 3;
        if total > u16::MAX as usize {
            return Err(ProtocolError::BufferTooSmall);
        }
        buf[0] = 0;
        buf[1..3].copy_from_slice(&(total as u16).to_be_bytes());
        Ok(total)
    }
}
