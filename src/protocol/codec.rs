//! Codec for encoding/decoding protocol messages to/from frames
//!
//! This module provides the bridge between typed messages and binary frames.

use super::frame::{Frame, FrameKind};
use super::messages::*;
use bytes::Bytes;
use std::io::{self, Error as IoError, ErrorKind};

/// Trait for messages that can be encoded to frames
pub trait Encodable {
    /// Get the frame kind for this message
    fn frame_kind(&self) -> FrameKind;

    /// Encode the message payload to bytes
    fn encode_payload(&self) -> io::Result<Bytes>;

    /// Encode the complete frame
    fn encode_frame(&self) -> io::Result<Frame> {
        Ok(Frame::new(self.frame_kind(), self.encode_payload()?))
    }
}

/// Trait for messages that can be decoded from frames
pub trait Decodable: Sized {
    /// Expected frame kind for this message
    fn expected_frame_kind() -> FrameKind;

    /// Decode the message from a payload
    fn decode_payload(payload: &[u8]) -> io::Result<Self>;

    /// Decode from a complete frame, validating the frame kind
    fn decode_frame(frame: &Frame) -> io::Result<Self> {
        if frame.kind() != Some(Self::expected_frame_kind()) {
            return Err(IoError::new(
                ErrorKind::InvalidData,
                format!(
                    "Expected frame kind {:?}, got tag 0x{:02X}",
                    Self::expected_frame_kind(),
                    frame.tag
                ),
            ));
        }
        Self::decode_payload(&frame.payload)
    }
}

/// Helper macro to implement Encodable and Decodable for a message type
macro_rules! impl_codec {
    ($type:ty, $frame_kind:expr) => {
        impl Encodable for $type {
            fn frame_kind(&self) -> FrameKind {
                $frame_kind
            }

            fn encode_payload(&self) -> io::Result<Bytes> {
                serde_json::to_vec(self)
                    .map(Bytes::from)
                    .map_err(|e| IoError::new(ErrorKind::InvalidData, e))
            }
        }

        impl Decodable for $type {
            fn expected_frame_kind() -> FrameKind {
                $frame_kind
            }

            fn decode_payload(payload: &[u8]) -> io::Result<Self> {
                serde_json::from_slice(payload).map_err(|e| IoError::new(ErrorKind::InvalidData, e))
            }
        }
    };
}

impl_codec!(Text, FrameKind::Text);
impl_codec!(ChatLine, FrameKind::ChatLine);
impl_codec!(SystemNotice, FrameKind::SystemNotice);
impl_codec!(Roster, FrameKind::Roster);
