//! Packet delivery between communicators.
//!
//! A [`Transport`] moves opaque packets to the inbox a peer registered under
//! its key. [`InMemoryTransport`] is an in-process hub; every instance is an
//! isolated network, so tests can run several side by side.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::TransportError;

/// A packet handed to an inbox. The receiver answers on `receipt` once it
/// has finished handling the packet, successfully or not.
#[derive(Debug)]
pub struct Delivery {
    pub packet: Vec<u8>,
    pub receipt: oneshot::Sender<()>,
}

impl Delivery {
    pub fn new(packet: Vec<u8>) -> (Self, oneshot::Receiver<()>) {
        let (receipt, handled) = oneshot::channel();
        (Self { packet, receipt }, handled)
    }
}

pub type Inbox = mpsc::UnboundedSender<Delivery>;

#[async_trait]
pub trait Transport<K>: Send + Sync {
    /// Route packets addressed to `peer` into `inbox`, replacing any previous
    /// registration.
    async fn register(&self, peer: K, inbox: Inbox) -> Result<(), TransportError>;

    /// Deliver `packet` to `peer` and wait until its inbox has handled it.
    async fn deliver(&self, peer: &K, packet: Vec<u8>) -> Result<(), TransportError>;
}

pub struct InMemoryTransport<K> {
    inboxes: RwLock<HashMap<K, Inbox>>,
}

impl<K> InMemoryTransport<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inboxes: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_registered(&self, peer: &K) -> bool {
        self.inboxes.read().contains_key(peer)
    }

    pub fn peer_count(&self) -> usize {
        self.inboxes.read().len()
    }
}

impl<K> Default for InMemoryTransport<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K> Transport<K> for InMemoryTransport<K>
where
    K: Eq + Hash + fmt::Display + Send + Sync,
{
    async fn register(&self, peer: K, inbox: Inbox) -> Result<(), TransportError> {
        info!(peer = %peer, "Registered inbox");
        self.inboxes.write().insert(peer, inbox);
        Ok(())
    }

    async fn deliver(&self, peer: &K, packet: Vec<u8>) -> Result<(), TransportError> {
        let inbox = self
            .inboxes
            .read()
            .get(peer)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeer(peer.to_string()))?;

        let len = packet.len();
        let (delivery, handled) = Delivery::new(packet);
        inbox.send(delivery).map_err(|_| TransportError::Closed)?;
        handled.await.map_err(|_| TransportError::Closed)?;

        debug!(peer = %peer, len, "Delivered packet");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_waits_for_receipt() {
        let transport = InMemoryTransport::<String>::new();
        let (inbox, mut deliveries) = mpsc::unbounded_channel::<Delivery>();
        transport.register("alice".to_string(), inbox).await.unwrap();
        assert!(transport.is_registered(&"alice".to_string()));

        let handler = tokio::spawn(async move {
            let delivery = deliveries.recv().await.unwrap();
            let packet = delivery.packet.clone();
            delivery.receipt.send(()).unwrap();
            packet
        });

        transport
            .deliver(&"alice".to_string(), vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(handler.await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let transport = InMemoryTransport::<String>::new();
        assert_eq!(
            transport.deliver(&"nobody".to_string(), vec![]).await,
            Err(TransportError::UnknownPeer("nobody".to_string()))
        );
    }

    #[tokio::test]
    async fn test_dropped_inbox_is_closed() {
        let transport = InMemoryTransport::<String>::new();
        let (inbox, deliveries) = mpsc::unbounded_channel::<Delivery>();
        transport.register("bob".to_string(), inbox).await.unwrap();
        drop(deliveries);

        assert_eq!(
            transport.deliver(&"bob".to_string(), vec![0]).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_transports_are_isolated() {
        let first = InMemoryTransport::<String>::new();
        let second = InMemoryTransport::<String>::new();
        let (inbox, _deliveries) = mpsc::unbounded_channel::<Delivery>();
        first.register("carol".to_string(), inbox).await.unwrap();

        assert_eq!(first.peer_count(), 1);
        assert_eq!(second.peer_count(), 0);
        assert!(matches!(
            second.deliver(&"carol".to_string(), vec![]).await,
            Err(TransportError::UnknownPeer(_))
        ));
    }
}
