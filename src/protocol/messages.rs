//! Protocol message types for the chat system
//!
//! All message payloads that can be serialized/deserialized within frames.
//! Uses serde for JSON serialization.

use serde::{Deserialize, Serialize};

// =============================================================================
// Client -> server
// =============================================================================

/// Plain text sent by a client. The very first one on a connection is always
/// interpreted as the display name, never as chat content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

// =============================================================================
// Server -> client
// =============================================================================

/// A chat line, already prefixed with the sender's display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    pub text: String,
}

/// A system notice (connect/disconnect announcements)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNotice {
    pub text: String,
}

/// The full participant roster, in registration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub names: Vec<String>,
}

/// One item bound for every connected client.
///
/// This is the element type of the server's outbound queue; the enqueue order
/// is the single global order all clients observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    ChatLine(ChatLine),
    SystemNotice(SystemNotice),
    Roster(Roster),
}

impl Outbound {
    pub fn chat_line(text: impl Into<String>) -> Self {
        Outbound::ChatLine(ChatLine { text: text.into() })
    }

    pub fn system_notice(text: impl Into<String>) -> Self {
        Outbound::SystemNotice(SystemNotice { text: text.into() })
    }

    pub fn roster(names: Vec<String>) -> Self {
        Outbound::Roster(Roster { names })
    }

    /// Encode this item as its wire frame
    pub fn encode_frame(&self) -> std::io::Result<super::frame::Frame> {
        use super::codec::Encodable;
        match self {
            Outbound::ChatLine(m) => m.encode_frame(),
            Outbound::SystemNotice(m) => m.encode_frame(),
            Outbound::Roster(m) => m.encode_frame(),
        }
    }
}
