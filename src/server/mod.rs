//! Server side of the chat service
//!
//! This module provides:
//! - The listener/accept loop and task wiring
//! - Per-connection sessions with independent read loops
//! - The shared registry of live sessions and the participant roster
//! - The outbound queue and the single broadcaster that drains it

pub mod broadcaster;
pub mod chat_server;
pub mod queue;
pub mod registry;
pub mod session;

pub use broadcaster::Broadcaster;
pub use chat_server::ChatServer;
pub use queue::{MessageQueue, QueueReceiver};
pub use registry::Registry;
pub use session::{Session, SessionState};
