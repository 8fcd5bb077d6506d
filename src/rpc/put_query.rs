//! Replication of a resource to the closest peers once its lookup converges.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::common::messages::{Message, RequestSpecific, StoreRequestArguments};
use crate::common::{Id, Peer};
use crate::transport::Transport;

use super::PutError;

#[derive(Debug)]
/// Once the FIND_NODE lookup for the key is done, we can replicate the value
/// to the closest responding peers with this PutQuery.
///
/// STORE carries no acknowledgement on the wire, so the put resolves with the
/// number of peers the frame was handed to the transport for.
pub struct PutQuery {
    pub target: Id,
    value: Bytes,
    listener: Option<flume::Sender<Result<usize, PutError>>>,
}

impl PutQuery {
    pub fn new(
        target: Id,
        value: Bytes,
        listener: Option<flume::Sender<Result<usize, PutError>>>,
    ) -> Self {
        Self {
            target,
            value,
            listener,
        }
    }

    /// Send STORE to the given closest peers and deliver the outcome to the
    /// listener, if any.
    pub fn finish(self, transport: &mut dyn Transport, closest: &[Peer]) {
        let target = self.target;
        trace!(?target, peers = closest.len(), "PutQuery finish");

        if closest.is_empty() {
            debug!(?target, "PutQuery found no peers to store at");

            if let Some(listener) = self.listener {
                let _ = listener.send(Err(PutError::NoClosestNodes));
            }
            return;
        }

        let message = Message::Request(RequestSpecific::Store(StoreRequestArguments {
            key: self.target,
            value: self.value,
        }));
        let payload = message.to_bytes();

        let mut stored_at = 0;

        for peer in closest {
            match transport.send(peer.address(), payload.clone()) {
                Ok(()) => stored_at += 1,
                Err(error) => {
                    debug!(?target, to = %peer.address(), ?error, "Error sending STORE")
                }
            }
        }

        debug!(?target, stored_at, "PutQuery done");

        if let Some(listener) = self.listener {
            let result = if stored_at == 0 {
                Err(PutError::NoClosestNodes)
            } else {
                Ok(stored_at)
            };
            let _ = listener.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PeerAddress;
    use crate::transport::{SimNetwork, Transport};

    #[test]
    fn no_closest_peers_is_an_error() {
        let network = SimNetwork::new();
        let mut transport = network.join(PeerAddress::new("local").expect("valid"));

        let (sender, receiver) = flume::bounded(1);
        let query = PutQuery::new(Id::random(), Bytes::from_static(b"v"), Some(sender));

        query.finish(&mut transport, &[]);

        assert!(matches!(
            receiver.recv(),
            Ok(Err(PutError::NoClosestNodes))
        ));
    }

    #[test]
    fn sends_store_to_every_peer() {
        let network = SimNetwork::new();
        let mut local = network.join(PeerAddress::new("local").expect("valid"));
        let mut a = network.join(PeerAddress::new("a").expect("valid"));
        let mut b = network.join(PeerAddress::new("b").expect("valid"));

        let key = Id::derive("key");
        let (sender, receiver) = flume::bounded(1);
        let query = PutQuery::new(key, Bytes::from_static(b"value"), Some(sender));

        query.finish(
            &mut local,
            &[
                Peer::from_address("a").expect("valid"),
                Peer::from_address("b").expect("valid"),
            ],
        );

        assert_eq!(receiver.recv().expect("listener notified"), Ok(2));

        for transport in [&mut a, &mut b] {
            let (payload, from) = transport.try_recv().expect("STORE delivered");
            assert_eq!(from.as_str(), "local");

            let message = Message::from_bytes(&payload).expect("valid frame");
            assert_eq!(
                message,
                Message::Request(RequestSpecific::Store(StoreRequestArguments {
                    key,
                    value: Bytes::from_static(b"value"),
                }))
            );
        }
    }
}
