// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Tidemark Write-Ahead Log - Record framing
//
// Every record is stored as one self-describing frame. The frame carries its
// own log index so a segment can be validated against its file name on open.
//
// On-disk frame format (all integers little-endian):
//   [4 bytes: frame_length (u32)]   -- length of everything after this field
//   [4 bytes: crc32 checksum]       -- CRC32 of all bytes after this field
//   [8 bytes: index (u64)]
//   [N bytes: payload]

use crc32fast::Hasher as Crc32Hasher;

use crate::error::{WalError, WalResult};

/// Maximum allowed frame size: 64 MiB. Any frame declaring a larger size
/// is treated as corrupted.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the fixed fields covered by `frame_length` before the payload
/// (crc32 + index).
pub const FRAME_HEADER_SIZE: usize = 4 + 8;

/// Encode one record into `buffer`, returning the number of bytes appended.
pub fn encode_frame(index: u64, payload: &[u8], buffer: &mut Vec<u8>) -> usize {
    let mut inner = Vec::with_capacity(8 + payload.len());
    inner.extend_from_slice(&index.to_le_bytes());
    inner.extend_from_slice(payload);

    let crc = compute_crc32(&inner);
    let frame_length = (4 + inner.len()) as u32;

    let start = buffer.len();
    buffer.extend_from_slice(&frame_length.to_le_bytes());
    buffer.extend_from_slice(&crc.to_le_bytes());
    buffer.extend_from_slice(&inner);
    buffer.len() - start
}

/// Total on-disk size of a frame carrying `payload_len` bytes.
pub fn frame_size(payload_len: usize) -> usize {
    LENGTH_PREFIX_SIZE + FRAME_HEADER_SIZE + payload_len
}

/// Decode the body of a frame (the bytes after `frame_length`), verifying
/// the CRC. Returns the record index and its payload.
pub fn decode_frame(body: &[u8]) -> WalResult<(u64, Vec<u8>)> {
    if body.len() < FRAME_HEADER_SIZE {
        return Err(WalError::Corrupt {
            segment: String::from("<frame>"),
            reason: format!("frame body of {} bytes is shorter than its header", body.len()),
        });
    }

    let stored_crc = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    let inner = &body[4..];
    let mut index_bytes = [0u8; 8];
    index_bytes.copy_from_slice(&inner[..8]);
    let index = u64::from_le_bytes(index_bytes);

    let computed_crc = compute_crc32(inner);
    if stored_crc != computed_crc {
        return Err(WalError::CrcMismatch {
            index,
            expected: stored_crc,
            actual: computed_crc,
        });
    }

    Ok((index, inner[8..].to_vec()))
}

/// Read the `frame_length` prefix at `offset`, if the buffer holds one.
pub fn read_length(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + LENGTH_PREFIX_SIZE)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Compute a CRC32 checksum over the given byte slice using the IEEE
/// polynomial (same as zlib/gzip).
pub fn compute_crc32(data: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let mut buffer = Vec::new();
        let written = encode_frame(7, br#"{"title":"hello"}"#, &mut buffer);
        assert_eq!(written, buffer.len());
        assert_eq!(written, frame_size(17));

        let length = read_length(&buffer, 0).unwrap() as usize;
        let (index, payload) = decode_frame(&buffer[4..4 + length]).unwrap();
        assert_eq!(index, 7);
        assert_eq!(payload, br#"{"title":"hello"}"#.to_vec());
    }

    #[test]
    fn test_crc_mismatch_detection() {
        let mut buffer = Vec::new();
        encode_frame(42, b"payload", &mut buffer);

        let last = buffer.len() - 1;
        buffer[last] ^= 0xFF;

        match decode_frame(&buffer[4..]) {
            Err(WalError::CrcMismatch {
                index,
                expected,
                actual,
            }) => {
                assert_eq!(index, 42);
                assert_ne!(expected, actual);
            }
            other => panic!("Expected CrcMismatch, got: {other:?}"),
        }
    }

    #[test]
    fn test_empty_payload() {
        let mut buffer = Vec::new();
        encode_frame(1, b"", &mut buffer);
        let (index, payload) = decode_frame(&buffer[4..]).unwrap();
        assert_eq!(index, 1);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_short_body_rejected() {
        assert!(decode_frame(&[0u8; 5]).is_err());
    }

    #[test]
    fn test_read_length_past_end() {
        assert_eq!(read_length(&[1, 2], 0), None);
    }
}
