//! The message transport collaborator interface, and an in-memory
//! implementation for tests and simulations.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use crate::common::PeerAddress;

/// The maximum duration to block waiting on an empty transport before letting
/// the actor loop run its timers again. Lower values increase CPU usage but
/// reduce latency.
pub(crate) const MAX_THREAD_BLOCK_DURATION: Duration = Duration::from_millis(10);

/// A message-oriented transport with no delivery or ordering guarantees.
///
/// Kadline never opens a socket itself; it hands frames to this collaborator
/// and polls it for inbound frames from its single actor thread. `send` is
/// best effort: a returned error means the transport knows delivery failed,
/// silence means nothing.
pub trait Transport: Send + Debug {
    /// The address other peers can reach this node at.
    fn local_address(&self) -> &PeerAddress;

    /// Hand a payload to the transport for delivery to `to`.
    fn send(&mut self, to: &PeerAddress, payload: Bytes) -> Result<(), TransportError>;

    /// Poll for a single inbound payload and its origin. May block briefly,
    /// but must not wait for a message indefinitely.
    fn try_recv(&mut self) -> Option<(Bytes, PeerAddress)>;
}

#[derive(thiserror::Error, Debug)]
/// Delivery failures a [Transport] can report.
pub enum TransportError {
    #[error("Unknown peer address: {0}")]
    UnknownPeer(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

type Inbox = flume::Sender<(Bytes, PeerAddress)>;

#[derive(Debug, Clone, Default)]
/// An in-memory, loss-free message network connecting [SimTransport]s.
pub struct SimNetwork {
    inboxes: Arc<Mutex<HashMap<PeerAddress, Inbox>>>,
}

impl SimNetwork {
    pub fn new() -> SimNetwork {
        SimNetwork::default()
    }

    /// Attach a new endpoint to this network under the given address.
    pub fn join(&self, address: PeerAddress) -> SimTransport {
        let (sender, receiver) = flume::unbounded();

        self.inboxes
            .lock()
            .expect("poisoned SimNetwork lock")
            .insert(address.clone(), sender);

        SimTransport {
            address,
            network: self.clone(),
            inbox: receiver,
        }
    }
}

#[derive(Debug)]
/// One endpoint of a [SimNetwork].
pub struct SimTransport {
    address: PeerAddress,
    network: SimNetwork,
    inbox: flume::Receiver<(Bytes, PeerAddress)>,
}

impl Transport for SimTransport {
    fn local_address(&self) -> &PeerAddress {
        &self.address
    }

    fn send(&mut self, to: &PeerAddress, payload: Bytes) -> Result<(), TransportError> {
        let inboxes = self
            .network
            .inboxes
            .lock()
            .expect("poisoned SimNetwork lock");

        let inbox = inboxes
            .get(to)
            .ok_or_else(|| TransportError::UnknownPeer(to.to_string()))?;

        inbox
            .send((payload, self.address.clone()))
            .map_err(|_| TransportError::UnknownPeer(to.to_string()))
    }

    fn try_recv(&mut self) -> Option<(Bytes, PeerAddress)> {
        self.inbox.recv_timeout(MAX_THREAD_BLOCK_DURATION).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(s: &str) -> PeerAddress {
        PeerAddress::new(s).expect("valid address")
    }

    #[test]
    fn delivers_between_endpoints() {
        let network = SimNetwork::new();

        let mut a = network.join(address("a"));
        let mut b = network.join(address("b"));

        a.send(&address("b"), Bytes::from_static(b"hi"))
            .expect("b is attached");

        let (payload, from) = b.try_recv().expect("payload delivered");
        assert_eq!(&payload[..], b"hi");
        assert_eq!(from, address("a"));
    }

    #[test]
    fn unknown_peer_is_a_send_error() {
        let network = SimNetwork::new();
        let mut a = network.join(address("a"));

        assert!(matches!(
            a.send(&address("nowhere"), Bytes::new()),
            Err(TransportError::UnknownPeer(_))
        ));
    }
}
