//! Outbound message queue
//!
//! Every chat line, system notice, and roster update passes through this one
//! queue before it reaches any client. The enqueue order is the single global
//! order all clients observe. The queue is unbounded and producers never
//! block; the capacity risk under a slow consumer is a documented tradeoff.

use crate::protocol::Outbound;
use tokio::sync::mpsc;
use tracing::debug;

/// Producer handle, cloned into every session and the registry
#[derive(Debug, Clone)]
pub struct MessageQueue {
    tx: mpsc::UnboundedSender<Outbound>,
}

/// Consumer handle, owned by the broadcaster
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl MessageQueue {
    /// Create a queue, returning the producer and the single consumer
    pub fn new() -> (Self, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, QueueReceiver { rx })
    }

    /// Append one item; strictly FIFO, never blocks.
    ///
    /// Once the receiver is gone the item is dropped, which only happens
    /// during shutdown where no delivery is guaranteed anyway.
    pub fn enqueue(&self, item: Outbound) {
        if self.tx.send(item).is_err() {
            debug!("broadcaster stopped, dropping outbound item");
        }
    }
}

impl QueueReceiver {
    /// Wait for the next item; None once every producer is gone
    pub async fn dequeue(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }
}
