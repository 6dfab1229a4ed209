//! Multi-client broadcast chat over TCP
//!
//! This library provides the concurrent core of a broadcast chat service:
//! a listener accepts connections, one session per connection reads
//! length-prefixed frames, every inbound line is serialized through a single
//! FIFO queue, and one broadcaster fans each item out to all live sessions
//! together with the participant roster.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::{ChatClient, ChatClientConfig, ClientEvent};
pub use error::{ChatError, Result};
pub use protocol::Outbound;
pub use server::ChatServer;

use std::net::SocketAddr;
use std::time::Duration;

/// Chat server configuration
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Server listen address
    pub bind_addr: SocketAddr,
    /// How long a client may stay silent before its connection is treated as
    /// half-open and closed. `None` disables the timeout.
    pub read_timeout: Option<Duration>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:6667".parse().unwrap(),
            read_timeout: None,
        }
    }
}
