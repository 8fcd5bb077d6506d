//! Dht node, the blocking client handle for the actor thread.

use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::info;

use crate::common::{Id, Peer, PeerAddress};
use crate::rpc::{Config, Info, LookupError, PutError, Rpc};
use crate::transport::{SimNetwork, Transport};

#[derive(Debug, Clone)]
/// A handle to a running node.
///
/// Cheap to clone; all clones talk to the same actor thread. The node shuts
/// down when the last clone is dropped or [Dht::shutdown] is called.
pub struct Dht(pub(crate) flume::Sender<ActorMessage>);

#[derive(Debug)]
pub(crate) enum ActorMessage {
    Info(flume::Sender<Info>),
    Ping(PeerAddress, flume::Sender<bool>),
    Join(PeerAddress),
    FindNode(Id, flume::Sender<Result<Vec<Peer>, LookupError>>),
    Get(Id, flume::Sender<Result<Option<Bytes>, LookupError>>),
    Put(Id, Bytes, flume::Sender<Result<usize, PutError>>),
    Delete(Id, flume::Sender<bool>),
    ToBootstrap(flume::Sender<Vec<String>>),
    Shutdown(flume::Sender<()>),
}

#[derive(Debug, Default)]
/// Builds a [Dht] with custom settings.
pub struct DhtBuilder(Config);

impl DhtBuilder {
    /// Name of the network this node proposes to join.
    pub fn network_name(mut self, name: &str) -> Self {
        self.0.network_name = name.to_string();
        self
    }

    /// Addresses of peers to seed lookups from while the routing table is
    /// still empty.
    pub fn bootstrap(mut self, bootstrap: &[String]) -> Self {
        self.0.bootstrap = bootstrap.to_vec();
        self
    }

    /// How long to wait for a reply before a request counts as timed out.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.0.request_timeout = timeout;
        self
    }

    /// Upper bound on a whole iterative lookup.
    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.0.lookup_timeout = timeout;
        self
    }

    /// Number of parallel requests per lookup round.
    pub fn alpha(mut self, alpha: usize) -> Self {
        self.0.alpha = alpha;
        self
    }

    pub fn refresh_period(mut self, period: Duration) -> Self {
        self.0.refresh_period = period;
        self
    }

    pub fn republish_period(mut self, period: Duration) -> Self {
        self.0.republish_period = period;
        self
    }

    pub fn build(self, transport: Box<dyn Transport>) -> Dht {
        Dht::with_config(self.0, transport)
    }
}

impl Dht {
    pub fn builder() -> DhtBuilder {
        DhtBuilder::default()
    }

    /// Spawn a node with default settings over the given transport.
    pub fn new(transport: Box<dyn Transport>) -> Dht {
        Dht::with_config(Config::default(), transport)
    }

    pub(crate) fn with_config(config: Config, transport: Box<dyn Transport>) -> Dht {
        let (sender, receiver) = flume::unbounded();

        let rpc = Rpc::new(transport, config);

        info!(id = ?rpc.id(), address = %rpc.local_address(), "Starting node");

        thread::spawn(move || run(rpc, receiver));

        Dht(sender)
    }

    // === Getters ===

    pub fn info(&self) -> Result<Info, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::Info(sender))
            .map_err(|_| DhtWasShutdown)?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    /// Addresses of this node's current peers, suitable as another node's
    /// bootstrap list.
    pub fn to_bootstrap(&self) -> Result<Vec<String>, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::ToBootstrap(sender))
            .map_err(|_| DhtWasShutdown)?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    // === Public Methods ===

    /// Block until the routing table has at least one peer, or `timeout`
    /// elapses. Returns whether the node ended up with any peers.
    pub fn bootstrapped(&self, timeout: Duration) -> Result<bool, DhtWasShutdown> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.info()?.routing_table_size() > 0 {
                return Ok(true);
            }

            if Instant::now() >= deadline {
                return Ok(false);
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Ping a peer, blocking until it answers or the request times out.
    pub fn ping(&self, address: PeerAddress) -> Result<bool, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::Ping(address, sender))
            .map_err(|_| DhtWasShutdown)?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    /// Propose joining the network through a known peer and start
    /// bootstrapping the routing table from it.
    pub fn join(&self, address: PeerAddress) -> Result<(), DhtWasShutdown> {
        self.0
            .send(ActorMessage::Join(address))
            .map_err(|_| DhtWasShutdown)
    }

    /// Find the closest peers to a target id, blocking until the lookup
    /// converges.
    pub fn find_node(&self, target: Id) -> Result<Vec<Peer>, DhtGetError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::FindNode(target, sender))
            .map_err(|_| DhtWasShutdown)?;

        Ok(receiver.recv().map_err(|_| DhtWasShutdown)??)
    }

    /// Resolve the value stored under a key, blocking until it is found or
    /// the lookup converges without it.
    pub fn get(&self, key: &str) -> Result<Option<Bytes>, DhtGetError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::Get(Id::derive(key), sender))
            .map_err(|_| DhtWasShutdown)?;

        Ok(receiver.recv().map_err(|_| DhtWasShutdown)??)
    }

    /// Store a value under a key, locally and at the closest peers found by
    /// a lookup. Returns how many peers the value was replicated to.
    pub fn put(&self, key: &str, value: Bytes) -> Result<usize, DhtPutError> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::Put(Id::derive(key), value, sender))
            .map_err(|_| DhtWasShutdown)?;

        Ok(receiver.recv().map_err(|_| DhtWasShutdown)??)
    }

    /// Remove a locally held value. Returns `false` when the key was not
    /// held here. Replicas at other nodes expire on their own.
    pub fn delete(&self, key: &str) -> Result<bool, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::Delete(Id::derive(key), sender))
            .map_err(|_| DhtWasShutdown)?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    /// Stop the actor thread, blocking until it exits. Idempotent.
    pub fn shutdown(&mut self) {
        let (sender, receiver) = flume::bounded(1);

        let _ = self.0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv();
    }
}

fn run(mut rpc: Rpc, receiver: flume::Receiver<ActorMessage>) {
    loop {
        match receiver.try_recv() {
            Ok(ActorMessage::Shutdown(sender)) => {
                info!(address = %rpc.local_address(), "Shutting down");
                drop(rpc);
                let _ = sender.send(());
                break;
            }
            Ok(ActorMessage::Info(sender)) => {
                let _ = sender.send(rpc.info());
            }
            Ok(ActorMessage::Ping(address, sender)) => {
                rpc.ping(address, sender);
            }
            Ok(ActorMessage::Join(address)) => {
                rpc.join(address);
            }
            Ok(ActorMessage::FindNode(target, sender)) => {
                rpc.find_node(target, sender);
            }
            Ok(ActorMessage::Get(key, sender)) => {
                rpc.get_value(key, sender);
            }
            Ok(ActorMessage::Put(key, value, sender)) => {
                if let Err(e) = rpc.put(key, value, Some(sender.clone())) {
                    let _ = sender.send(Err(e));
                }
            }
            Ok(ActorMessage::Delete(key, sender)) => {
                let _ = sender.send(rpc.delete(&key));
            }
            Ok(ActorMessage::ToBootstrap(sender)) => {
                let _ = sender.send(rpc.to_bootstrap());
            }
            Err(flume::TryRecvError::Empty) => {}
            Err(flume::TryRecvError::Disconnected) => break,
        }

        rpc.tick();
    }
}

#[derive(thiserror::Error, Debug)]
#[error("The node was shutdown, or never started")]
pub struct DhtWasShutdown;

#[derive(thiserror::Error, Debug)]
pub enum DhtPutError {
    #[error(transparent)]
    Put(#[from] PutError),

    #[error(transparent)]
    Shutdown(#[from] DhtWasShutdown),
}

#[derive(thiserror::Error, Debug)]
pub enum DhtGetError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Shutdown(#[from] DhtWasShutdown),
}

/// An in-process network of nodes over a [SimNetwork], for tests and
/// examples.
#[derive(Debug)]
pub struct Testnet {
    pub network: SimNetwork,
    pub nodes: Vec<Dht>,
}

impl Testnet {
    /// Spin up `count` nodes; the first one acts as the bootstrap peer for
    /// the rest.
    pub fn new(count: usize) -> Testnet {
        let network = SimNetwork::new();

        // Attach every endpoint before any node starts looking up, so early
        // sends never hit an unknown address.
        let transports: Vec<_> = (0..count)
            .map(|i| {
                let address =
                    PeerAddress::new(format!("testnet-{i}")).expect("valid testnet address");
                network.join(address)
            })
            .collect();

        let mut nodes = Vec::with_capacity(count);

        for (i, transport) in transports.into_iter().enumerate() {
            let mut builder = Dht::builder()
                .network_name("testnet")
                .request_timeout(Duration::from_millis(200));

            if i > 0 {
                builder = builder.bootstrap(&["testnet-0".to_string()]);
            }

            nodes.push(builder.build(Box::new(transport)));
        }

        Testnet { network, nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown() {
        let network = SimNetwork::new();
        let transport = network.join(PeerAddress::new("solo").expect("valid address"));

        let mut dht = Dht::new(Box::new(transport));

        dht.info().expect("node is running");
        dht.shutdown();

        assert!(matches!(dht.info(), Err(DhtWasShutdown)));
    }

    #[test]
    fn testnet_bootstraps() {
        let testnet = Testnet::new(5);

        for node in &testnet.nodes {
            assert!(node
                .bootstrapped(Duration::from_secs(5))
                .expect("node is running"));
        }
    }

    #[test]
    fn local_put_without_peers_still_serves_get() {
        let network = SimNetwork::new();
        let transport = network.join(PeerAddress::new("solo").expect("valid address"));

        let dht = Dht::new(Box::new(transport));

        // Nobody to replicate to, but the local store keeps the value.
        assert!(matches!(
            dht.put("key", Bytes::from_static(b"value")),
            Err(DhtPutError::Put(PutError::NoClosestNodes))
        ));
        assert_eq!(
            dht.get("key").expect("node is running"),
            Some(Bytes::from_static(b"value"))
        );
    }

    #[test]
    fn delete_removes_the_local_value() {
        let network = SimNetwork::new();
        let transport = network.join(PeerAddress::new("solo").expect("valid address"));

        let dht = Dht::new(Box::new(transport));

        let _ = dht.put("key", Bytes::from_static(b"value"));

        assert!(dht.delete("key").expect("node is running"));
        assert!(!dht.delete("key").expect("node is running"));
        assert_eq!(dht.get("key").expect("node is running"), None);
    }
}
