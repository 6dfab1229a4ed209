//! TCP chat server: accept loop and task wiring
//!
//! The server owns the bound listener, the registry, and the outbound queue.
//! `run` spawns the broadcaster and then accepts connections until shutdown,
//! creating one independent session per connection. Accept failures are
//! logged and never stop the loop; only failing to bind is fatal.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{ChatError, Result};
use crate::server::broadcaster::Broadcaster;
use crate::server::queue::{MessageQueue, QueueReceiver};
use crate::server::registry::Registry;
use crate::server::session::Session;
use crate::ChatConfig;

/// Multi-client broadcast chat server
pub struct ChatServer {
    config: ChatConfig,
    listener: TcpListener,
    registry: Arc<Registry>,
    queue: MessageQueue,
    receiver: Mutex<Option<QueueReceiver>>,
    cancel: CancellationToken,
}

impl ChatServer {
    /// Bind the listening endpoint. This is the only fatal startup step;
    /// callers are expected to terminate the process when it fails.
    pub async fn bind(config: ChatConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await.map_err(|e| {
            ChatError::network(format!("failed to bind {}: {}", config.bind_addr, e))
        })?;

        let (queue, receiver) = MessageQueue::new();
        let registry = Arc::new(Registry::new(queue.clone()));

        Ok(Self {
            config,
            listener,
            registry,
            queue,
            receiver: Mutex::new(Some(receiver)),
            cancel: CancellationToken::new(),
        })
    }

    /// The bound address (useful when the configured port was 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(ChatError::from)
    }

    /// Current roster, in registration order
    pub async fn participant_names(&self) -> Vec<String> {
        self.registry.participant_names().await
    }

    /// Accept connections until shutdown.
    ///
    /// Starts the broadcaster, then loops on accept. Each accepted connection
    /// gets its own session whose reader runs independently, so a slow client
    /// never blocks another accept.
    pub async fn run(&self) -> Result<()> {
        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| ChatError::internal("server is already running"))?;

        let broadcaster = Broadcaster::new(Arc::clone(&self.registry), receiver);
        let broadcast_task = tokio::spawn(broadcaster.run(self.cancel.child_token()));

        info!("chat server listening on {}", self.listener.local_addr()?);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("new connection from {}", addr);
                        Session::open(
                            stream,
                            addr,
                            Arc::clone(&self.registry),
                            self.queue.clone(),
                            self.cancel.child_token(),
                            self.config.read_timeout,
                        )
                        .await;
                    }
                    Err(e) => error!("failed to accept connection: {}", e),
                },
            }
        }

        let _ = broadcast_task.await;
        Ok(())
    }

    /// Close every live session, then stop the listener and broadcaster.
    /// No in-flight message is guaranteed delivered past this point.
    pub async fn shutdown(&self) {
        for session in self.registry.snapshot().await {
            session.close().await;
        }
        // Stops the accept loop and the broadcaster; any session accepted
        // after the snapshot above holds a child token and closes itself.
        self.cancel.cancel();
        info!("chat server shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChatClient, ChatClientConfig, ClientEvent};
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn start_server() -> (Arc<ChatServer>, SocketAddr) {
        let config = ChatConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = Arc::new(ChatServer::bind(config).await.unwrap());
        let addr = server.local_addr().unwrap();
        let runner = Arc::clone(&server);
        tokio::spawn(async move {
            runner.run().await.unwrap();
        });
        (server, addr)
    }

    async fn connect(
        addr: SocketAddr,
        name: &str,
    ) -> (ChatClient, mpsc::UnboundedReceiver<ClientEvent>) {
        let mut client = ChatClient::new(ChatClientConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..Default::default()
        });
        let events = client.connect(name.to_string()).await.unwrap();
        (client, events)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("event channel closed")
    }

    async fn wait_for_line(rx: &mut mpsc::UnboundedReceiver<ClientEvent>, expected: &str) {
        loop {
            match next_event(rx).await {
                ClientEvent::LineReceived(line) if line == expected => return,
                ClientEvent::Disconnected(reason) => {
                    panic!("disconnected while waiting for {:?}: {}", expected, reason)
                }
                _ => {}
            }
        }
    }

    async fn wait_for_roster(rx: &mut mpsc::UnboundedReceiver<ClientEvent>, expected: &[&str]) {
        loop {
            match next_event(rx).await {
                ClientEvent::RosterUpdated(names) => {
                    if names.iter().map(|n| n.as_str()).collect::<Vec<_>>() == expected {
                        return;
                    }
                }
                ClientEvent::Disconnected(reason) => {
                    panic!(
                        "disconnected while waiting for roster {:?}: {}",
                        expected, reason
                    )
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_bind_failure_is_surfaced() {
        let first = ChatServer::bind(ChatConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        })
        .await
        .unwrap();
        let taken = first.local_addr().unwrap();

        let second = ChatServer::bind(ChatConfig {
            bind_addr: taken,
            ..Default::default()
        })
        .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let (server, addr) = start_server().await;

        // A successful connect proves the first run loop is live
        let (_alice, mut alice_rx) = connect(addr, "alice").await;
        wait_for_roster(&mut alice_rx, &["alice"]).await;

        assert!(server.run().await.is_err());
    }

    #[tokio::test]
    async fn test_two_clients_see_joint_roster() {
        let (_server, addr) = start_server().await;

        let (_alice, mut alice_rx) = connect(addr, "alice").await;
        wait_for_roster(&mut alice_rx, &["alice"]).await;

        let (_bob, mut bob_rx) = connect(addr, "bob").await;
        wait_for_roster(&mut alice_rx, &["alice", "bob"]).await;
        wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;
    }

    #[tokio::test]
    async fn test_chat_line_reaches_everyone_including_sender() {
        let (_server, addr) = start_server().await;

        let (alice, mut alice_rx) = connect(addr, "alice").await;
        wait_for_roster(&mut alice_rx, &["alice"]).await;
        let (_bob, mut bob_rx) = connect(addr, "bob").await;
        wait_for_roster(&mut alice_rx, &["alice", "bob"]).await;
        wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

        alice.send_message("hello".to_string()).await.unwrap();

        wait_for_line(&mut alice_rx, "alice: hello").await;
        wait_for_line(&mut bob_rx, "alice: hello").await;
    }

    #[tokio::test]
    async fn test_messages_keep_global_order() {
        let (_server, addr) = start_server().await;

        let (alice, mut alice_rx) = connect(addr, "alice").await;
        wait_for_roster(&mut alice_rx, &["alice"]).await;
        let (_bob, mut bob_rx) = connect(addr, "bob").await;
        wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

        for i in 0..5 {
            alice.send_message(format!("msg {}", i)).await.unwrap();
        }

        let mut seen = Vec::new();
        while seen.len() < 5 {
            if let ClientEvent::LineReceived(line) = next_event(&mut bob_rx).await {
                if line.starts_with("alice:") {
                    seen.push(line);
                }
            }
        }
        let expected: Vec<String> = (0..5).map(|i| format!("alice: msg {}", i)).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_disconnect_announces_and_updates_roster() {
        let (_server, addr) = start_server().await;

        let (_alice, mut alice_rx) = connect(addr, "alice").await;
        wait_for_roster(&mut alice_rx, &["alice"]).await;
        let (bob, mut bob_rx) = connect(addr, "bob").await;
        wait_for_roster(&mut alice_rx, &["alice", "bob"]).await;
        wait_for_roster(&mut bob_rx, &["alice", "bob"]).await;

        drop(bob);
        drop(bob_rx);

        wait_for_line(&mut alice_rx, "bob disconnected").await;
        wait_for_roster(&mut alice_rx, &["alice"]).await;
    }

    #[tokio::test]
    async fn test_duplicate_names_both_kept_until_each_leaves() {
        let (_server, addr) = start_server().await;

        let (_sam1, mut sam1_rx) = connect(addr, "sam").await;
        wait_for_roster(&mut sam1_rx, &["sam"]).await;

        let (sam2, mut sam2_rx) = connect(addr, "sam").await;
        wait_for_roster(&mut sam1_rx, &["sam", "sam"]).await;
        wait_for_roster(&mut sam2_rx, &["sam", "sam"]).await;

        drop(sam2);
        drop(sam2_rx);

        wait_for_line(&mut sam1_rx, "sam disconnected").await;
        wait_for_roster(&mut sam1_rx, &["sam"]).await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_sessions() {
        let (server, addr) = start_server().await;

        let (_alice, mut alice_rx) = connect(addr, "alice").await;
        wait_for_roster(&mut alice_rx, &["alice"]).await;

        server.shutdown().await;

        loop {
            if let ClientEvent::Disconnected(_) = next_event(&mut alice_rx).await {
                break;
            }
        }
        assert_eq!(server.registry.session_count().await, 0);
    }
}
