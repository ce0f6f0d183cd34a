//! Record-separator and length-prefix framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// ASCII "Information Separator Two", terminating every text-framed record.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// Largest payload a length prefix may announce (~2 GiB).
const MAX_MESSAGE_LENGTH: u64 = i32::MAX as u64;

/// Longest legal length prefix in bytes.
const MAX_PREFIX_LEN: usize = 5;

/// Append `payload` followed by the record separator.
pub fn write_record(payload: &[u8], out: &mut BytesMut) {
    out.reserve(payload.len() + 1);
    out.put_slice(payload);
    out.put_u8(RECORD_SEPARATOR);
}

/// Split one whole record off the front of `buf`.
///
/// Returns the record without its separator, or `None` when no separator is
/// present — in which case `buf` is left intact. Never returns a partial
/// record.
pub fn try_read_record(buf: &mut BytesMut) -> Option<Bytes> {
    let position = buf.iter().position(|&b| b == RECORD_SEPARATOR)?;
    let record = buf.split_to(position).freeze();
    buf.advance(1);
    Some(record)
}

/// Append a 7-bit varint length prefix for `len`.
///
/// The low seven bits of each byte carry the value, least significant group
/// first; bit 7 marks continuation.
pub fn write_length_prefix(len: usize, out: &mut BytesMut) {
    let mut remaining = len;
    loop {
        let mut byte = (remaining & 0x7f) as u8;
        remaining >>= 7;
        if remaining > 0 {
            byte |= 0x80;
        }
        out.put_u8(byte);
        if remaining == 0 {
            break;
        }
    }
}

/// Decode a length prefix from the front of `buf` without consuming it.
///
/// Returns `Ok(Some((length, prefix_len)))` when a complete prefix is
/// present, `Ok(None)` when more bytes are needed.
///
/// # Errors
///
/// [`ProtocolError::MessageTooLarge`] when the prefix runs past five bytes
/// or announces a payload over ~2 GiB.
pub fn try_read_length_prefix(buf: &[u8]) -> ProtocolResult<Option<(usize, usize)>> {
    let mut length: u64 = 0;
    for (index, &byte) in buf.iter().take(MAX_PREFIX_LEN).enumerate() {
        length |= u64::from(byte & 0x7f) << (7 * index);
        if byte & 0x80 == 0 {
            if length > MAX_MESSAGE_LENGTH {
                return Err(ProtocolError::MessageTooLarge);
            }
            return Ok(Some((length as usize, index + 1)));
        }
    }
    if buf.len() >= MAX_PREFIX_LEN {
        return Err(ProtocolError::MessageTooLarge);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let mut buf = BytesMut::new();
        write_record(b"hello", &mut buf);
        assert_eq!(buf.as_ref(), b"hello\x1e");

        let record = try_read_record(&mut buf).unwrap();
        assert_eq!(record.as_ref(), b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_record_is_left_intact() {
        let mut buf = BytesMut::from(&b"incomplete"[..]);
        assert!(try_read_record(&mut buf).is_none());
        assert_eq!(buf.as_ref(), b"incomplete");
    }

    #[test]
    fn test_multiple_records_split_in_order() {
        let mut buf = BytesMut::from(&b"one\x1etwo\x1etail"[..]);
        assert_eq!(try_read_record(&mut buf).unwrap().as_ref(), b"one");
        assert_eq!(try_read_record(&mut buf).unwrap().as_ref(), b"two");
        assert!(try_read_record(&mut buf).is_none());
        assert_eq!(buf.as_ref(), b"tail");
    }

    #[test]
    fn test_empty_record() {
        let mut buf = BytesMut::from(&b"\x1e"[..]);
        assert_eq!(try_read_record(&mut buf).unwrap().as_ref(), b"");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_length_prefix_single_byte() {
        let mut buf = BytesMut::new();
        write_length_prefix(0, &mut buf);
        assert_eq!(buf.as_ref(), &[0x00]);

        let mut buf = BytesMut::new();
        write_length_prefix(127, &mut buf);
        assert_eq!(buf.as_ref(), &[0x7f]);
        assert_eq!(try_read_length_prefix(&buf).unwrap(), Some((127, 1)));
    }

    #[test]
    fn test_length_prefix_multi_byte() {
        let mut buf = BytesMut::new();
        write_length_prefix(128, &mut buf);
        assert_eq!(buf.as_ref(), &[0x80, 0x01]);
        assert_eq!(try_read_length_prefix(&buf).unwrap(), Some((128, 2)));

        let mut buf = BytesMut::new();
        write_length_prefix(300, &mut buf);
        assert_eq!(buf.as_ref(), &[0xac, 0x02]);
        assert_eq!(try_read_length_prefix(&buf).unwrap(), Some((300, 2)));
    }

    #[test]
    fn test_length_prefix_roundtrip_boundaries() {
        for len in [0usize, 1, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152] {
            let mut buf = BytesMut::new();
            write_length_prefix(len, &mut buf);
            let (decoded, consumed) = try_read_length_prefix(&buf).unwrap().unwrap();
            assert_eq!(decoded, len);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn test_length_prefix_incomplete() {
        // All continuation bits set, fewer than five bytes: need more data.
        assert_eq!(try_read_length_prefix(&[0x80]).unwrap(), None);
        assert_eq!(try_read_length_prefix(&[0xff, 0xff]).unwrap(), None);
        assert_eq!(try_read_length_prefix(&[]).unwrap(), None);
    }

    #[test]
    fn test_length_prefix_too_long() {
        // Five bytes all with the continuation bit set.
        let err = try_read_length_prefix(&[0xff, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert_eq!(err, ProtocolError::MessageTooLarge);
    }

    #[test]
    fn test_length_prefix_over_two_gib() {
        // 0xffffffff (4 GiB - 1) encodes in five bytes but exceeds the cap.
        let mut buf = BytesMut::new();
        write_length_prefix(u32::MAX as usize, &mut buf);
        let err = try_read_length_prefix(&buf).unwrap_err();
        assert_eq!(err, ProtocolError::MessageTooLarge);
    }

    #[test]
    fn test_length_prefix_max_supported() {
        let mut buf = BytesMut::new();
        write_length_prefix(i32::MAX as usize, &mut buf);
        let (decoded, consumed) = try_read_length_prefix(&buf).unwrap().unwrap();
        assert_eq!(decoded, i32::MAX as usize);
        assert_eq!(consumed, 5);
    }
}
