//! Binary frame protocol with length-prefixed messages
//!
//! Frame format:
//! ```text
//! +---------+---------------+------------------+
//! | kind    | length        | payload          |
//! | (1 byte)| (4 bytes, BE) | (variable)       |
//! +---------+---------------+------------------+
//! ```
//!
//! Raw stream bytes do not self-delimit, so every message crosses the wire
//! inside one of these frames. A frame with an unknown kind byte is still
//! decodable (header and payload are consumed); whether to drop it is the
//! receiver's decision, not the codec's.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{self, Cursor};

/// Frame header size: 1 byte kind + 4 bytes length
pub const FRAME_HEADER_SIZE: usize = 5;

/// Maximum frame payload size (64 KiB, chat lines and rosters are short)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Frame kinds carried on a chat connection
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    // Client -> server (0x01 - 0x0F)
    /// Plain text from the client. The first one on a connection registers
    /// the display name; every later one is a chat line.
    Text = 0x01,

    // Server -> client (0x10 - 0x1F)
    /// A chat line to render on the message board
    ChatLine = 0x10,
    /// A system notice (connect/disconnect announcements)
    SystemNotice = 0x11,
    /// The current ordered participant roster
    Roster = 0x12,
}

impl FrameKind {
    /// Convert from u8, returns None for unknown kinds
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(FrameKind::Text),
            0x10 => Some(FrameKind::ChatLine),
            0x11 => Some(FrameKind::SystemNotice),
            0x12 => Some(FrameKind::Roster),
            _ => None,
        }
    }

    /// Check if this kind travels client -> server
    pub fn is_client_to_server(&self) -> bool {
        (*self as u8) < 0x10
    }

    /// Check if this kind travels server -> client
    pub fn is_server_to_client(&self) -> bool {
        (*self as u8) >= 0x10
    }
}

/// A single protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw kind byte; may not map to a known [`FrameKind`]
    pub tag: u8,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with the given kind and payload
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            tag: kind as u8,
            payload: payload.into(),
        }
    }

    /// Create an empty frame (no payload)
    pub fn empty(kind: FrameKind) -> Self {
        Self {
            tag: kind as u8,
            payload: Bytes::new(),
        }
    }

    /// The decoded kind, if the tag byte is known
    pub fn kind(&self) -> Option<FrameKind> {
        FrameKind::from_u8(self.tag)
    }

    /// Get the total encoded size of this frame
    pub fn encoded_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Encode this frame into a buffer
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_size());
        buf.put_u8(self.tag);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
    }

    /// Encode this frame into a new Bytes
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Try to decode a frame from a buffer
    /// Returns Ok(Some(frame)) if successful, Ok(None) if more data needed
    ///
    /// An advertised payload length above [`MAX_FRAME_SIZE`] is an error: past
    /// that point the stream can no longer be trusted to be frame-aligned.
    pub fn decode(buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        // Check if we have enough data for the header
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the header without consuming
        let mut cursor = Cursor::new(&buf[..]);
        let tag = cursor.get_u8();
        let payload_len = cursor.get_u32() as usize;

        if payload_len > MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame payload too large: {} bytes (max: {})",
                    payload_len, MAX_FRAME_SIZE
                ),
            ));
        }

        // Check if we have the full frame
        let total_size = FRAME_HEADER_SIZE + payload_len;
        if buf.len() < total_size {
            return Ok(None);
        }

        // Consume the header
        buf.advance(FRAME_HEADER_SIZE);

        // Extract payload
        let payload = buf.split_to(payload_len).freeze();

        Ok(Some(Frame { tag, payload }))
    }

    /// Decode a single frame from a complete buffer (no streaming)
    pub fn decode_complete(data: &[u8]) -> io::Result<Frame> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Incomplete frame header",
            ));
        }

        let tag = data[0];
        let payload_len = u32::from_be_bytes([data[1], data[2], data[3], data[4]]) as usize;

        if payload_len > MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame payload too large: {} bytes (max: {})",
                    payload_len, MAX_FRAME_SIZE
                ),
            ));
        }

        let expected_len = FRAME_HEADER_SIZE + payload_len;
        if data.len() < expected_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Incomplete frame: expected {} bytes, got {}",
                    expected_len,
                    data.len()
                ),
            ));
        }

        let payload = Bytes::copy_from_slice(&data[FRAME_HEADER_SIZE..expected_len]);

        Ok(Frame { tag, payload })
    }
}

/// Frame encoder/decoder for streaming use
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Feed data into the codec
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame
    pub fn decode_next(&mut self) -> io::Result<Option<Frame>> {
        Frame::decode(&mut self.buffer)
    }

    /// Get the current buffer length
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
