//! `tokio_util` codec for the debug frame format.
//!
//! The writer side ships pre-encoded frames and never needs this; it is
//! used by listeners reading a debug stream with `FramedRead`.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::DebugError;
use crate::frame::{self, FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Frame codec yielding raw payloads.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }

    /// Reject frames announcing more than `max_payload` bytes.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.min(MAX_PAYLOAD_SIZE),
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = DebugError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let header = match FrameHeader::decode(&src[..]) {
            Ok(h) => h,
            Err(DebugError::FrameTruncated { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let len = header.length as usize;
        if len > self.max_payload {
            return Err(DebugError::PayloadTooLarge {
                size: len,
                max: self.max_payload,
            });
        }

        let total = header.frame_len();
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = DebugError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame::encode_into(&item, dst)
    }
}
