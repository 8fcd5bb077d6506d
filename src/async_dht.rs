//! Async version of the node handle.

use bytes::Bytes;

use crate::common::{Id, Peer, PeerAddress};
use crate::dht::{ActorMessage, Dht, DhtGetError, DhtPutError, DhtWasShutdown};
use crate::rpc::Info;

impl Dht {
    /// Wrap this handle in an async API. All methods await on the same actor
    /// thread the blocking handle uses.
    pub fn as_async(self) -> AsyncDht {
        AsyncDht(self)
    }
}

#[derive(Debug, Clone)]
/// Async version of [Dht].
pub struct AsyncDht(Dht);

impl AsyncDht {
    // === Getters ===

    pub async fn info(&self) -> Result<Info, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::Info(sender))
            .map_err(|_| DhtWasShutdown)?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    pub async fn to_bootstrap(&self) -> Result<Vec<String>, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::ToBootstrap(sender))
            .map_err(|_| DhtWasShutdown)?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    // === Public Methods ===

    pub async fn ping(&self, address: PeerAddress) -> Result<bool, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::Ping(address, sender))
            .map_err(|_| DhtWasShutdown)?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    pub fn join(&self, address: PeerAddress) -> Result<(), DhtWasShutdown> {
        self.0.join(address)
    }

    pub async fn find_node(&self, target: Id) -> Result<Vec<Peer>, DhtGetError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::FindNode(target, sender))
            .map_err(|_| DhtWasShutdown)?;

        Ok(receiver.recv_async().await.map_err(|_| DhtWasShutdown)??)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, DhtGetError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::Get(Id::derive(key), sender))
            .map_err(|_| DhtWasShutdown)?;

        Ok(receiver.recv_async().await.map_err(|_| DhtWasShutdown)??)
    }

    pub async fn put(&self, key: &str, value: Bytes) -> Result<usize, DhtPutError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::Put(Id::derive(key), value, sender))
            .map_err(|_| DhtWasShutdown)?;

        Ok(receiver.recv_async().await.map_err(|_| DhtWasShutdown)??)
    }

    pub async fn delete(&self, key: &str) -> Result<bool, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded(1);

        self.0
             .0
            .send(ActorMessage::Delete(Id::derive(key), sender))
            .map_err(|_| DhtWasShutdown)?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    pub async fn shutdown(&mut self) {
        let (sender, receiver) = flume::bounded(1);

        let _ = self.0 .0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv_async().await;
    }
}
