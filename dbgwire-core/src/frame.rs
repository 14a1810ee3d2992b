//! Length-prefixed framing for debug events.
//!
//! ## Wire format
//!
//! ```text
//! marker:   u8   (1)   always 0xCE
//! length:   u32  (4)   payload byte count, little-endian
//! payload:  [u8] (length)
//! ```
//!
//! The length field is always little-endian regardless of the host
//! architecture. Payloads must fit in a signed 31-bit length.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::DebugError;

// ── Constants ────────────────────────────────────────────────────

/// Leading byte of every frame.
pub const FRAME_MARKER: u8 = 0xCE;

/// Marker plus length prefix.
pub const HEADER_SIZE: usize = 5;

/// Largest payload the length field may announce.
pub const MAX_PAYLOAD_SIZE: usize = i32::MAX as usize;

// ── FrameHeader ──────────────────────────────────────────────────

/// The fixed 5-byte prefix of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Byte length of the payload that follows.
    pub length: u32,
}

impl FrameHeader {
    /// Header for a payload of `len` bytes.
    pub fn for_payload(len: usize) -> Result<Self, DebugError> {
        if len > MAX_PAYLOAD_SIZE {
            return Err(DebugError::PayloadTooLarge {
                size: len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self { length: len as u32 })
    }

    /// Serialize to bytes.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = FRAME_MARKER;
        buf[1..5].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// Parse the header at the start of `src`.
    pub fn decode(src: &[u8]) -> Result<Self, DebugError> {
        if let Some(&first) = src.first() {
            if first != FRAME_MARKER {
                return Err(DebugError::InvalidMarker(first));
            }
        }
        if src.len() < HEADER_SIZE {
            return Err(DebugError::FrameTruncated {
                needed: HEADER_SIZE,
                available: src.len(),
            });
        }
        let length = u32::from_le_bytes([src[1], src[2], src[3], src[4]]);
        if length as usize > MAX_PAYLOAD_SIZE {
            return Err(DebugError::PayloadTooLarge {
                size: length as usize,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self { length })
    }

    /// Total frame size: header plus payload.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE.saturating_add(self.length as usize)
    }
}

// ── Encode / decode ──────────────────────────────────────────────

/// Wrap `payload` in a frame.
pub fn encode(payload: &[u8]) -> Result<Bytes, DebugError> {
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_into(payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Append a frame carrying `payload` to `dst`.
pub fn encode_into(payload: &[u8], dst: &mut BytesMut) -> Result<(), DebugError> {
    let header = FrameHeader::for_payload(payload.len())?;
    dst.reserve(header.frame_len());
    dst.put_slice(&header.encode());
    dst.put_slice(payload);
    Ok(())
}

/// Decode the frame at the start of `src`.
///
/// Returns the payload and the number of bytes the frame occupies.
/// Trailing bytes after the frame are left untouched.
pub fn decode(src: &[u8]) -> Result<(&[u8], usize), DebugError> {
    let header = FrameHeader::decode(src)?;
    let total = header.frame_len();
    if src.len() < total {
        return Err(DebugError::FrameTruncated {
            needed: total,
            available: src.len(),
        });
    }
    Ok((&src[HEADER_SIZE..total], total))
}

// ── Tests ────────────────────────────────────────────────────────
