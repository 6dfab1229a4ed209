//! Per-connection session state and read loop
//!
//! A session is created for every accepted connection. Its reader task owns
//! the read half of the socket; the write half sits behind a mutex so that a
//! broadcast fan-out and a closing session never interleave bytes on the
//! wire. The first frame a client sends is always its display name; every
//! later frame is chat text routed through the outbound queue, never written
//! to any connection directly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::protocol::codec::Decodable;
use crate::protocol::frame::{Frame, FrameCodec, FrameKind};
use crate::protocol::messages::{Outbound, Text};
use crate::server::queue::MessageQueue;
use crate::server::registry::Registry;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, display name not yet received
    Connecting,
    /// Display name registered, chat frames accepted
    Active,
    /// Connection released; terminal
    Closed,
}

/// Server-side state bound to one client connection
pub struct Session {
    id: Uuid,
    peer: SocketAddr,
    state: Mutex<SessionState>,
    display_name: RwLock<Option<String>>,
    writer: Mutex<OwnedWriteHalf>,
    registry: Arc<Registry>,
    queue: MessageQueue,
    cancel: CancellationToken,
    read_timeout: Option<Duration>,
}

impl Session {
    /// Take ownership of an accepted connection: track the session in the
    /// registry and start its reader task.
    pub async fn open(
        stream: TcpStream,
        peer: SocketAddr,
        registry: Arc<Registry>,
        queue: MessageQueue,
        cancel: CancellationToken,
        read_timeout: Option<Duration>,
    ) -> Arc<Self> {
        let (read_half, write_half) = stream.into_split();

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            peer,
            state: Mutex::new(SessionState::Connecting),
            display_name: RwLock::new(None),
            writer: Mutex::new(write_half),
            registry: Arc::clone(&registry),
            queue,
            cancel,
            read_timeout,
        });

        registry.add(Arc::clone(&session)).await;
        session.spawn_reader(read_half);
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub async fn display_name(&self) -> Option<String> {
        self.display_name.read().await.clone()
    }

    /// Deliver one outbound item to this session's client.
    ///
    /// The writer lock is held for the whole frame so concurrent sends can
    /// never interleave bytes.
    pub async fn send(&self, item: &Outbound) -> Result<()> {
        if *self.state.lock().await == SessionState::Closed {
            return Err(ChatError::connection("session is closed"));
        }
        let data = item.encode_frame()?.encode_to_bytes();
        let mut writer = self.writer.lock().await;
        writer.write_all(&data).await?;
        Ok(())
    }

    /// Tear the session down. Idempotent: only the first caller has any
    /// observable effect. Removes the session from the registry (announcing
    /// the disconnect if it had registered), then releases the connection.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().await;
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }

        self.cancel.cancel();
        self.registry.remove(self.id).await;

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(peer = %self.peer, "error releasing connection: {}", e);
        }
    }

    fn spawn_reader(self: &Arc<Self>, read_half: OwnedReadHalf) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = session.read_loop(read_half).await {
                error!(peer = %session.peer, "client read failed: {}", e);
            }
            session.close().await;
        })
    }

    /// Block reading one frame at a time until EOF, an unrecoverable error,
    /// or cancellation. Malformed frames are dropped; only a desynchronized
    /// stream (oversized length prefix) or an I/O failure ends the loop.
    async fn read_loop(&self, mut read_half: OwnedReadHalf) -> Result<()> {
        let mut codec = FrameCodec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                read = async {
                    match self.read_timeout {
                        Some(limit) => timeout(limit, read_half.read(&mut chunk))
                            .await
                            .map_err(|_| ChatError::timeout("client read timed out"))?
                            .map_err(ChatError::from),
                        None => read_half.read(&mut chunk).await.map_err(ChatError::from),
                    }
                } => read?,
            };

            if n == 0 {
                // End of stream
                return Ok(());
            }

            codec.feed(&chunk[..n]);
            while let Some(frame) = codec.decode_next()? {
                self.handle_frame(frame).await;
            }
        }
    }

    async fn handle_frame(&self, frame: Frame) {
        match frame.kind() {
            Some(FrameKind::Text) => match Text::decode_payload(&frame.payload) {
                Ok(msg) => self.handle_text(msg.text).await,
                Err(e) => debug!(peer = %self.peer, "dropping malformed text frame: {}", e),
            },
            _ => debug!(peer = %self.peer, tag = frame.tag, "dropping frame with unexpected kind"),
        }
    }

    async fn handle_text(&self, text: String) {
        let registered = self.display_name.read().await.clone();

        if let Some(name) = registered {
            self.queue
                .enqueue(Outbound::chat_line(format!("{}: {}", name, text)));
            return;
        }

        // First frame is always the display name, whatever it contains
        {
            let mut state = self.state.lock().await;
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Active;
        }
        *self.display_name.write().await = Some(text.clone());
        self.registry.activate(self.id, text).await;
    }

    /// Shut the write half down without closing the session, so the next
    /// send fails deterministically.
    #[cfg(test)]
    pub(crate) async fn sever_writes(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}
