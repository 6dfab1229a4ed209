//! Chat client used by the presentation layer
//!
//! The client owns the socket and a background reader task; the UI consumes
//! a stream of [`ClientEvent`]s and calls [`ChatClient::send_message`] to
//! talk. Chat lines and system notices both surface as `LineReceived` (the
//! message board renders them the same way); roster frames surface as
//! `RosterUpdated`.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{ChatError, Result};
use crate::protocol::codec::{Decodable, Encodable};
use crate::protocol::frame::{Frame, FrameCodec, FrameKind};
use crate::protocol::messages::{ChatLine, Roster, SystemNotice, Text};

/// Chat client configuration
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    /// Server host to connect to
    pub host: String,
    /// Server TCP port
    pub port: u16,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6667,
            connect_timeout_secs: 10,
        }
    }
}

/// Events that the client surfaces to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Successfully connected and registered
    Connected,
    /// A line for the message board (chat or system notice)
    LineReceived(String),
    /// The participant panel should show these names, in this order
    RosterUpdated(Vec<String>),
    /// Connection lost; terminal
    Disconnected(String),
}

/// TCP chat client
pub struct ChatClient {
    config: ChatClientConfig,
    username: Option<String>,
    writer: Option<Arc<Mutex<OwnedWriteHalf>>>,
    reader_task: Option<JoinHandle<()>>,
    event_tx: Option<mpsc::UnboundedSender<ClientEvent>>,
}

impl ChatClient {
    /// Create a new chat client with the given configuration
    pub fn new(config: ChatClientConfig) -> Self {
        Self {
            config,
            username: None,
            writer: None,
            reader_task: None,
            event_tx: None,
        }
    }

    /// Connect to the chat server and register the given display name.
    ///
    /// The name goes out as the very first frame on the connection; whatever
    /// it contains, the server treats it as the display name.
    pub async fn connect(
        &mut self,
        username: String,
    ) -> Result<mpsc::UnboundedReceiver<ClientEvent>> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("connecting to chat server at {}", addr);

        let stream = timeout(
            Duration::from_secs(self.config.connect_timeout_secs),
            TcpStream::connect(&addr),
        )
        .await
        .map_err(|_| ChatError::timeout("connection timeout"))?
        .map_err(|e| ChatError::connection(format!("failed to connect to {}: {}", addr, e)))?;

        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(Mutex::new(write_half));

        write_frame(&writer, &Text::new(username.clone())).await?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let _ = event_tx.send(ClientEvent::Connected);

        let reader_task = tokio::spawn(read_loop(read_half, event_tx.clone()));

        self.username = Some(username);
        self.writer = Some(writer);
        self.reader_task = Some(reader_task);
        self.event_tx = Some(event_tx);

        Ok(event_rx)
    }

    /// Send one chat line to the server
    pub async fn send_message(&self, content: String) -> Result<()> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| ChatError::connection("not connected to server"))?;
        write_frame(writer, &Text::new(content)).await
    }

    /// The registered display name, if connected
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Check if connected to the server
    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    /// Disconnect deliberately. The reader is stopped first so no
    /// `Disconnected` event is emitted for a disconnect the user asked for.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(writer) = self.writer.take() {
            let mut writer = writer.lock().await;
            let _ = writer.shutdown().await;
            info!("disconnected from chat server");
        }
        self.username = None;
        self.event_tx = None;
        Ok(())
    }
}

async fn write_frame(writer: &Arc<Mutex<OwnedWriteHalf>>, msg: &Text) -> Result<()> {
    let data = msg.encode_frame()?.encode_to_bytes();
    let mut writer = writer.lock().await;
    writer.write_all(&data).await?;
    Ok(())
}

async fn read_loop(mut read_half: OwnedReadHalf, event_tx: mpsc::UnboundedSender<ClientEvent>) {
    let mut codec = FrameCodec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match read_half.read(&mut chunk).await {
            Ok(0) => {
                let _ = event_tx.send(ClientEvent::Disconnected(
                    "server closed the connection".to_string(),
                ));
                return;
            }
            Ok(n) => n,
            Err(e) => {
                let _ = event_tx.send(ClientEvent::Disconnected(format!("connection lost: {}", e)));
                return;
            }
        };

        codec.feed(&chunk[..n]);
        loop {
            match codec.decode_next() {
                Ok(Some(frame)) => dispatch_frame(frame, &event_tx),
                Ok(None) => break,
                Err(e) => {
                    let _ =
                        event_tx.send(ClientEvent::Disconnected(format!("protocol error: {}", e)));
                    return;
                }
            }
        }
    }
}

fn dispatch_frame(frame: Frame, event_tx: &mpsc::UnboundedSender<ClientEvent>) {
    match frame.kind() {
        Some(FrameKind::ChatLine) => {
            if let Ok(msg) = ChatLine::decode_payload(&frame.payload) {
                let _ = event_tx.send(ClientEvent::LineReceived(msg.text));
            }
        }
        Some(FrameKind::SystemNotice) => {
            if let Ok(msg) = SystemNotice::decode_payload(&frame.payload) {
                let _ = event_tx.send(ClientEvent::LineReceived(msg.text));
            }
        }
        Some(FrameKind::Roster) => {
            if let Ok(msg) = Roster::decode_payload(&frame.payload) {
                let _ = event_tx.send(ClientEvent::RosterUpdated(msg.names));
            }
        }
        _ => debug!(tag = frame.tag, "ignoring frame with unexpected kind"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ChatClientConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6667);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_client_creation() {
        let client = ChatClient::new(ChatClientConfig::default());
        assert!(client.username().is_none());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let client = ChatClient::new(ChatClientConfig::default());
        assert!(client.send_message("hello".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_to_dead_endpoint_fails() {
        // Bind and immediately drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = ChatClient::new(ChatClientConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            connect_timeout_secs: 1,
        });
        assert!(client.connect("alice".to_string()).await.is_err());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected() {
        let mut client = ChatClient::new(ChatClientConfig::default());
        assert!(client.disconnect().await.is_ok());
        assert!(!client.is_connected());
    }
}
