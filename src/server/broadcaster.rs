//! The single fan-out worker
//!
//! Exactly one broadcaster runs per server. It drains the outbound queue one
//! item at a time and offers each item to every session in the registry's
//! current snapshot, so all clients observe the same global order. A failure
//! while sending to one recipient schedules that session for closure and
//! never aborts the fan-out.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::Outbound;
use crate::server::queue::QueueReceiver;
use crate::server::registry::Registry;

/// Dedicated worker draining the outbound queue
pub struct Broadcaster {
    registry: Arc<Registry>,
    receiver: QueueReceiver,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>, receiver: QueueReceiver) -> Self {
        Self { registry, receiver }
    }

    /// Run until cancelled or until every queue producer is gone
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                item = self.receiver.dequeue() => match item {
                    Some(item) => item,
                    None => break,
                },
            };
            self.fan_out(item).await;
        }
        debug!("broadcaster stopped");
    }

    /// Offer one item to every session in the current snapshot, isolating
    /// per-recipient failures.
    async fn fan_out(&self, item: Outbound) {
        for session in self.registry.snapshot().await {
            if let Err(e) = session.send(&item).await {
                warn!(peer = %session.peer_addr(), "failed to deliver to client: {}", e);
                tokio::spawn(async move { session.close().await });
            }
        }
    }
}
