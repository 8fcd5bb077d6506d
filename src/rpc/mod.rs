//! The request/reply engine.
//!
//! One [Rpc] per node, driven by a single actor loop: every tick advances
//! active lookups, runs due maintenance, and processes at most one inbound
//! frame, so all shared state is mutated from exactly one place.

mod closest;
mod config;
mod inflight;
mod iterative_query;
mod maintenance;
mod pending;
mod put_query;

use std::collections::HashMap;

use bytes::Bytes;
use rand::Rng;
use tracing::{debug, error, trace};

use crate::common::messages::{
    FindNodeRequestArguments, FindValueRequestArguments, JoinProposalRequestArguments, Message,
    NodeFoundReplyArguments, PingEchoReplyArguments, PingRequestArguments, ReplySpecific,
    RequestSpecific, StoreRequestArguments, ValueFoundReplyArguments, ValueNotFoundReplyArguments,
};
use crate::common::{AddResult, Id, Peer, PeerAddress, RoutingTable};
use crate::store::ResourceStore;
use crate::transport::Transport;

pub use closest::{Candidate, ClosestPeers};
pub use config::{
    Config, DEFAULT_ALPHA, DEFAULT_LOOKUP_TIMEOUT, DEFAULT_NETWORK_NAME, DEFAULT_REFRESH_PERIOD,
    DEFAULT_REPUBLISH_PERIOD, DEFAULT_REQUEST_TIMEOUT,
};
pub use iterative_query::{IterativeQuery, LookupKind};
pub use pending::{PendingRequests, RequestKey};
pub use put_query::PutQuery;

pub(crate) use inflight::{Correlation, InflightRequests};

use maintenance::Maintenance;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
/// Errors starting a lookup.
pub enum LookupError {
    /// Exactly one lookup may be active per target; callers decide whether
    /// to wait or retry later.
    #[error("Lookup already in progress for target {0}")]
    AlreadyInProgress(Id),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
/// Errors publishing a resource.
pub enum PutError {
    /// The lookup found no peers to replicate the value to, usually because
    /// the routing table is empty and there are no bootstrap peers.
    #[error("Failed to find any peers to store the value at")]
    NoClosestNodes,

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

#[derive(Debug, Clone)]
/// A caller waiting for the outcome of a lookup or ping.
pub enum ResponseSender {
    Peers(flume::Sender<Result<Vec<Peer>, LookupError>>),
    Value(flume::Sender<Result<Option<Bytes>, LookupError>>),
    Pong(flume::Sender<bool>),
}

#[derive(Debug, Clone)]
/// Information about a running node.
pub struct Info {
    id: Id,
    local_address: PeerAddress,
    routing_table_size: usize,
    stored_resources: usize,
}

impl Info {
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn local_address(&self) -> &PeerAddress {
        &self.local_address
    }

    pub fn routing_table_size(&self) -> usize {
        self.routing_table_size
    }

    pub fn stored_resources(&self) -> usize {
        self.stored_resources
    }
}

#[derive(Debug)]
/// A full bucket's head being liveness checked before eviction.
struct EvictionCheck {
    bucket: u8,
    head: Peer,
    candidate: Peer,
}

#[derive(Debug)]
pub struct Rpc {
    config: Config,
    transport: Box<dyn Transport>,

    routing_table: RoutingTable,
    store: ResourceStore,

    /// Active iterative lookups by target.
    queries: HashMap<Id, IterativeQuery>,
    /// Puts waiting for their FIND_NODE lookup to converge.
    put_queries: HashMap<Id, PutQuery>,

    pending: PendingRequests,
    inflight: InflightRequests,
    /// Pending bucket-head liveness checks by ping nonce.
    evictions: HashMap<u64, EvictionCheck>,

    maintenance: Maintenance,
}

impl Rpc {
    pub fn new(transport: Box<dyn Transport>, config: Config) -> Self {
        let local = Peer::new(transport.local_address().clone());

        Rpc {
            routing_table: RoutingTable::new(local),
            store: ResourceStore::new(),
            queries: HashMap::new(),
            put_queries: HashMap::new(),
            pending: PendingRequests::new(),
            inflight: InflightRequests::new(config.request_timeout),
            evictions: HashMap::new(),
            maintenance: Maintenance::new(config.refresh_period, config.republish_period),
            transport,
            config,
        }
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        self.routing_table.id()
    }

    pub fn local_address(&self) -> &PeerAddress {
        self.transport.local_address()
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    pub fn info(&self) -> Info {
        Info {
            id: *self.routing_table.id(),
            local_address: self.transport.local_address().clone(),
            routing_table_size: self.routing_table.size(),
            stored_resources: self.store.len(),
        }
    }

    pub fn to_bootstrap(&self) -> Vec<String> {
        self.routing_table.to_bootstrap()
    }

    // === Public Methods ===

    /// One turn of the event loop: expire requests, advance and finish
    /// lookups, run due maintenance, then process at most one inbound frame.
    pub fn tick(&mut self) {
        self.handle_timeouts();
        self.advance_queries();
        self.finish_done_queries();
        self.run_maintenance();

        if let Some((payload, from)) = self.transport.try_recv() {
            self.handle_inbound(&payload, from);
        }
    }

    /// Resolve a value: the local store answers immediately, otherwise an
    /// iterative FIND_VALUE lookup reports through the listener.
    pub fn get_value(&mut self, key: Id, listener: flume::Sender<Result<Option<Bytes>, LookupError>>) {
        if let Some(value) = self.store.get(&key) {
            let _ = listener.send(Ok(Some(value.clone())));
            return;
        }

        if key == *self.routing_table.id() {
            // The local store is authoritative for this node's own id.
            let _ = listener.send(Ok(None));
            return;
        }

        if let Err(e) =
            self.start_lookup(key, LookupKind::FindValue, Some(ResponseSender::Value(listener.clone())))
        {
            let _ = listener.send(Err(e));
        }
    }

    /// Find the closest peers to a target through an iterative FIND_NODE
    /// lookup reporting through the listener.
    pub fn find_node(&mut self, target: Id, listener: flume::Sender<Result<Vec<Peer>, LookupError>>) {
        if target == *self.routing_table.id() {
            let _ = listener.send(Ok(vec![self.routing_table.local_peer().clone()]));
            return;
        }

        if let Err(e) =
            self.start_lookup(target, LookupKind::FindNode, Some(ResponseSender::Peers(listener.clone())))
        {
            let _ = listener.send(Err(e));
        }
    }

    /// Store the value locally, then replicate it to the K closest peers
    /// discovered by a FIND_NODE lookup for the key.
    ///
    /// Used both for first publication and for periodic republish.
    pub fn put(
        &mut self,
        key: Id,
        value: Bytes,
        listener: Option<flume::Sender<Result<usize, PutError>>>,
    ) -> Result<(), PutError> {
        self.store.set(key, value.clone());

        if self.put_queries.contains_key(&key) {
            return Err(LookupError::AlreadyInProgress(key).into());
        }

        self.start_lookup(key, LookupKind::FindNode, None)?;
        self.put_queries.insert(key, PutQuery::new(key, value, listener));

        Ok(())
    }

    /// Explicitly remove a locally held resource. `false` when absent.
    pub fn delete(&mut self, key: &Id) -> bool {
        self.store.delete(key)
    }

    /// Ping a peer; the listener receives `true` on PING_ECHO, `false` on
    /// timeout.
    pub fn ping(&mut self, address: PeerAddress, listener: flume::Sender<bool>) {
        let nonce = rand::thread_rng().gen();

        self.send_request(&address, RequestSpecific::Ping(PingRequestArguments { nonce }));
        self.inflight.add(address.clone(), Correlation::Ping(nonce));
        self.pending
            .register(RequestKey::Ping(address, nonce), ResponseSender::Pong(listener));
    }

    /// Propose joining the configured network through a known peer, and
    /// bootstrap the routing table from it.
    pub fn join(&mut self, address: PeerAddress) {
        debug!(to = %address, network = %self.config.network_name, "Proposing to join");

        self.send_request(
            &address,
            RequestSpecific::JoinProposal(JoinProposalRequestArguments {
                network_name: self.config.network_name.clone(),
            }),
        );

        self.add_peer(Peer::new(address));
        self.populate();
    }

    // === Private Methods ===

    /// Start an iterative lookup for a target, seeded from the routing table
    /// or, while that is empty, from the configured bootstrap peers.
    fn start_lookup(
        &mut self,
        target: Id,
        kind: LookupKind,
        listener: Option<ResponseSender>,
    ) -> Result<(), LookupError> {
        if self.queries.contains_key(&target)
            || self.pending.is_registered(&RequestKey::Lookup(target))
        {
            return Err(LookupError::AlreadyInProgress(target));
        }

        let local_id = *self.routing_table.id();

        let mut seed: Vec<Peer> = self
            .routing_table
            .closest(&target)
            .into_iter()
            .filter(|peer| *peer.id() != local_id)
            .collect();

        if seed.is_empty() {
            for address in self.config.bootstrap.clone() {
                match Peer::from_address(address) {
                    Ok(peer) => {
                        if *peer.id() != local_id {
                            seed.push(peer)
                        }
                    }
                    Err(e) => debug!(error = ?e, "Ignoring malformed bootstrap address"),
                }
            }
        }

        self.routing_table.touch(&target);

        if let Some(listener) = listener {
            self.pending.register(RequestKey::Lookup(target), listener);
        }

        let mut query = IterativeQuery::new(target, kind, seed);
        let first_round = query.next_round(self.config.alpha);

        self.queries.insert(target, query);

        for peer in first_round {
            self.send_lookup_request(&peer, target, kind);
        }

        Ok(())
    }

    fn handle_timeouts(&mut self) {
        for request in self.inflight.expired() {
            match request.correlation {
                Correlation::Lookup(target) => {
                    trace!(?target, to = %request.to, "Lookup request timed out");

                    if let Some(query) = self.queries.get_mut(&target) {
                        query.timed_out(&request.to);
                    }
                }
                Correlation::Ping(nonce) => {
                    if let Some(check) = self.evictions.remove(&nonce) {
                        debug!(
                            head = %check.head.address(),
                            "Bucket head did not answer the eviction ping"
                        );

                        self.routing_table.resolve_eviction(
                            check.bucket,
                            &check.head,
                            check.candidate,
                            false,
                        );
                    }

                    if let Some(ResponseSender::Pong(listener)) = self
                        .pending
                        .trigger(&RequestKey::Ping(request.to.clone(), nonce))
                    {
                        let _ = listener.send(false);
                    }
                }
            }
        }
    }

    fn advance_queries(&mut self) {
        let targets: Vec<Id> = self.queries.keys().copied().collect();

        for target in targets {
            let round = {
                let lookup_timeout = self.config.lookup_timeout;
                let alpha = self.config.alpha;

                let query = match self.queries.get_mut(&target) {
                    Some(query) => query,
                    None => continue,
                };

                if query.is_done()
                    || query.check_global_timeout(lookup_timeout)
                    || !query.round_complete()
                    || query.check_convergence()
                {
                    continue;
                }

                (query.next_round(alpha), query.kind())
            };

            let (peers, kind) = round;
            for peer in peers {
                self.send_lookup_request(&peer, target, kind);
            }
        }
    }

    fn finish_done_queries(&mut self) {
        let done: Vec<Id> = self
            .queries
            .iter()
            .filter(|(_, query)| query.is_done())
            .map(|(target, _)| *target)
            .collect();

        for target in done {
            let query = match self.queries.remove(&target) {
                Some(query) => query,
                None => continue,
            };

            if target == *self.routing_table.id() {
                if self.routing_table.is_empty() {
                    error!("Could not bootstrap the routing table");
                } else {
                    debug!(
                        table_size = self.routing_table.size(),
                        "Populated the routing table"
                    );
                }
            }

            // Cache the found value at the closest responder that did not
            // already have it. An optimization, not a correctness need.
            if let Some(value) = query.value() {
                let cache_at = query
                    .responders()
                    .peers()
                    .into_iter()
                    .find(|peer| Some(peer.address()) != query.value_holder());

                if let Some(peer) = cache_at {
                    trace!(?target, to = %peer.address(), "Caching value at nearby peer");
                    self.send_request(
                        peer.address(),
                        RequestSpecific::Store(StoreRequestArguments {
                            key: target,
                            value: value.clone(),
                        }),
                    );
                }
            }

            let result_peers = if query.responders().is_empty() {
                query.closest().peers()
            } else {
                query.responders().peers()
            };

            match self.pending.trigger(&RequestKey::Lookup(target)) {
                Some(ResponseSender::Peers(listener)) => {
                    let _ = listener.send(Ok(result_peers.clone()));
                }
                Some(ResponseSender::Value(listener)) => {
                    let _ = listener.send(Ok(query.value().cloned()));
                }
                Some(ResponseSender::Pong(_)) | None => {}
            }

            if let Some(put_query) = self.put_queries.remove(&target) {
                put_query.finish(self.transport.as_mut(), &result_peers);
            }
        }
    }

    fn run_maintenance(&mut self) {
        let decisions = self.maintenance.decisions();

        if decisions.should_populate {
            self.populate();
        }

        if decisions.should_refresh {
            let threshold = self.maintenance.refresh_staleness_threshold();

            for bucket in self.routing_table.buckets_needing_refresh(threshold) {
                let target = self.routing_table.id().random_in_bucket(bucket);

                trace!(bucket, ?target, "Refreshing bucket");
                let _ = self.start_lookup(target, LookupKind::FindNode, None);
            }
        }

        if decisions.should_republish {
            for (key, value) in self.store.snapshot() {
                match self.put(key, value, None) {
                    Ok(()) => self.store.mark_republished(&key),
                    Err(e) => debug!(?key, error = ?e, "Skipping republish"),
                }
            }
        }
    }

    /// Seed the routing table by looking up this node's own neighborhood.
    fn populate(&mut self) {
        let target = *self.routing_table.id();

        let _ = self.start_lookup(target, LookupKind::FindNode, None);
    }

    fn handle_inbound(&mut self, payload: &[u8], from: PeerAddress) {
        let message = match Message::from_bytes(payload) {
            Ok(message) => message,
            Err(e) => {
                debug!(%from, error = ?e, "Dropping malformed message");
                return;
            }
        };

        trace!(%from, ?message, "Received message");

        let sender = Peer::new(from);

        // Any inbound traffic is evidence the sender is alive, except a
        // proposal to join a different network; its sender does not belong
        // in this table.
        let foreign_join = matches!(
            &message,
            Message::Request(RequestSpecific::JoinProposal(JoinProposalRequestArguments {
                network_name,
            })) if *network_name != self.config.network_name
        );

        if !foreign_join {
            self.add_peer(sender.clone());
        }

        match message {
            Message::Request(request) => self.handle_request(&sender, request),
            Message::Reply(reply) => self.handle_reply(&sender, reply),
        }
    }

    fn handle_request(&mut self, from: &Peer, request: RequestSpecific) {
        match request {
            RequestSpecific::Ping(PingRequestArguments { nonce }) => {
                self.send_reply(
                    from.address(),
                    ReplySpecific::PingEcho(PingEchoReplyArguments { nonce }),
                );
            }
            RequestSpecific::FindNode(FindNodeRequestArguments { target }) => {
                let peers = self.closest_addresses(&target);

                self.send_reply(
                    from.address(),
                    ReplySpecific::NodeFound(NodeFoundReplyArguments { target, peers }),
                );
            }
            RequestSpecific::FindValue(FindValueRequestArguments { key }) => {
                let reply = if let Some(value) = self.store.get(&key) {
                    ReplySpecific::ValueFound(ValueFoundReplyArguments {
                        key,
                        value: value.clone(),
                    })
                } else {
                    // Without the value, answer with closer peers; if we know
                    // nobody besides ourselves and the requester, admit it.
                    let local = self.transport.local_address().clone();
                    let peers: Vec<PeerAddress> = self
                        .closest_addresses(&key)
                        .into_iter()
                        .filter(|address| address != from.address() && *address != local)
                        .collect();

                    if peers.is_empty() {
                        ReplySpecific::ValueNotFound(ValueNotFoundReplyArguments { key })
                    } else {
                        ReplySpecific::NodeFound(NodeFoundReplyArguments { target: key, peers })
                    }
                };

                self.send_reply(from.address(), reply);
            }
            RequestSpecific::Store(StoreRequestArguments { key, value }) => {
                trace!(from = %from.address(), ?key, "Storing replicated resource");

                self.store.set(key, value);
            }
            RequestSpecific::JoinProposal(JoinProposalRequestArguments { network_name }) => {
                if network_name == self.config.network_name {
                    self.send_reply(from.address(), ReplySpecific::JoinAgreed);
                } else {
                    debug!(
                        from = %from.address(),
                        network_name,
                        "Ignoring join proposal for another network"
                    );
                }
            }
        }
    }

    fn handle_reply(&mut self, from: &Peer, reply: ReplySpecific) {
        match reply {
            ReplySpecific::PingEcho(PingEchoReplyArguments { nonce }) => {
                if self
                    .inflight
                    .remove(from.address(), &Correlation::Ping(nonce))
                    .is_none()
                {
                    trace!(from = %from.address(), "Unexpected PING_ECHO");
                    return;
                }

                if let Some(check) = self.evictions.remove(&nonce) {
                    self.routing_table.resolve_eviction(
                        check.bucket,
                        &check.head,
                        check.candidate,
                        true,
                    );
                }

                if let Some(ResponseSender::Pong(listener)) = self
                    .pending
                    .trigger(&RequestKey::Ping(from.address().clone(), nonce))
                {
                    let _ = listener.send(true);
                }
            }
            ReplySpecific::NodeFound(NodeFoundReplyArguments { target, peers }) => {
                if self
                    .inflight
                    .remove(from.address(), &Correlation::Lookup(target))
                    .is_none()
                {
                    trace!(from = %from.address(), ?target, "Unexpected NODE_FOUND");
                    return;
                }

                let local_id = *self.routing_table.id();

                if let Some(query) = self.queries.get_mut(&target) {
                    for address in peers {
                        let peer = Peer::new(address);

                        if *peer.id() != local_id {
                            query.add_candidate(peer);
                        }
                    }

                    query.reply_received(from.clone());
                }
            }
            ReplySpecific::ValueFound(ValueFoundReplyArguments { key, value }) => {
                if self
                    .inflight
                    .remove(from.address(), &Correlation::Lookup(key))
                    .is_none()
                {
                    trace!(from = %from.address(), ?key, "Unexpected VALUE_FOUND");
                    return;
                }

                if let Some(query) = self.queries.get_mut(&key) {
                    match query.kind() {
                        LookupKind::FindValue => query.value_found(from.clone(), value),
                        LookupKind::FindNode => query.reply_received(from.clone()),
                    }
                }
            }
            ReplySpecific::ValueNotFound(ValueNotFoundReplyArguments { key }) => {
                if self
                    .inflight
                    .remove(from.address(), &Correlation::Lookup(key))
                    .is_none()
                {
                    trace!(from = %from.address(), ?key, "Unexpected VALUE_NOT_FOUND");
                    return;
                }

                if let Some(query) = self.queries.get_mut(&key) {
                    query.reply_received(from.clone());
                }
            }
            ReplySpecific::JoinAgreed => {
                debug!(from = %from.address(), "Join agreed");
            }
        }
    }

    /// Add a peer to the routing table; a full bucket starts an asynchronous
    /// liveness check of its head instead of evicting anything right away.
    fn add_peer(&mut self, peer: Peer) {
        if let AddResult::Full { bucket, head } = self.routing_table.add(peer.clone()) {
            // One liveness check per bucket at a time.
            if self.evictions.values().any(|check| check.bucket == bucket) {
                return;
            }

            let nonce = rand::thread_rng().gen();

            trace!(
                head = %head.address(),
                candidate = %peer.address(),
                bucket,
                "Pinging bucket head before eviction"
            );

            self.send_request(
                head.address(),
                RequestSpecific::Ping(PingRequestArguments { nonce }),
            );
            self.inflight
                .add(head.address().clone(), Correlation::Ping(nonce));
            self.evictions.insert(
                nonce,
                EvictionCheck {
                    bucket,
                    head,
                    candidate: peer,
                },
            );
        }
    }

    fn closest_addresses(&self, target: &Id) -> Vec<PeerAddress> {
        self.routing_table
            .closest(target)
            .into_iter()
            .map(|peer| peer.address().clone())
            .collect()
    }

    fn send_lookup_request(&mut self, peer: &Peer, target: Id, kind: LookupKind) {
        let request = match kind {
            LookupKind::FindNode => {
                RequestSpecific::FindNode(FindNodeRequestArguments { target })
            }
            LookupKind::FindValue => {
                RequestSpecific::FindValue(FindValueRequestArguments { key: target })
            }
        };

        self.send_request(peer.address(), request);
        self.inflight
            .add(peer.address().clone(), Correlation::Lookup(target));
    }

    fn send_request(&mut self, to: &PeerAddress, request: RequestSpecific) {
        self.send(to, Message::Request(request));
    }

    fn send_reply(&mut self, to: &PeerAddress, reply: ReplySpecific) {
        self.send(to, Message::Reply(reply));
    }

    fn send(&mut self, to: &PeerAddress, message: Message) {
        trace!(%to, ?message, "Sending message");

        if let Err(e) = self.transport.send(to, message.to_bytes()) {
            debug!(%to, error = ?e, "Error sending message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{SimNetwork, Transport};

    fn address(s: &str) -> PeerAddress {
        PeerAddress::new(s).expect("valid address")
    }

    fn rpc(network: &SimNetwork, addr: &str) -> Rpc {
        Rpc::new(Box::new(network.join(address(addr))), Config::default())
    }

    #[test]
    fn duplicate_lookup_is_rejected() {
        let network = SimNetwork::new();
        let mut rpc = rpc(&network, "local");

        // A known peer keeps the first lookup from converging instantly.
        rpc.add_peer(Peer::from_address("remote").expect("valid address"));

        let target = Id::derive("some-key");

        let (first, _first_rx) = flume::bounded(1);
        rpc.get_value(target, first);

        let (second, second_rx) = flume::bounded(1);
        rpc.get_value(target, second);

        assert_eq!(
            second_rx.recv().expect("rejected immediately"),
            Err(LookupError::AlreadyInProgress(target))
        );
    }

    #[test]
    fn local_value_resolves_without_a_lookup() {
        let network = SimNetwork::new();
        let mut rpc = rpc(&network, "local");

        let key = Id::derive("greeting");
        rpc.store.set(key, Bytes::from_static(b"hello"));

        let (listener, receiver) = flume::bounded(1);
        rpc.get_value(key, listener);

        assert_eq!(
            receiver.recv().expect("resolved immediately"),
            Ok(Some(Bytes::from_static(b"hello")))
        );
        assert!(rpc.queries.is_empty());
    }

    #[test]
    fn self_target_find_node_short_circuits() {
        let network = SimNetwork::new();
        let mut rpc = rpc(&network, "local");

        let (listener, receiver) = flume::bounded(1);
        let target = *rpc.id();
        rpc.find_node(target, listener);

        assert_eq!(
            receiver.recv().expect("resolved immediately"),
            Ok(vec![rpc.routing_table.local_peer().clone()])
        );
    }

    #[test]
    fn ping_round_trip() {
        let network = SimNetwork::new();
        let mut a = rpc(&network, "a");
        let mut b = rpc(&network, "b");

        let (listener, receiver) = flume::bounded(1);
        a.ping(address("b"), listener);

        b.tick();
        a.tick();

        assert!(receiver.recv().expect("pong delivered"));
        assert!(b.routing_table.contains(a.id()));
    }

    #[test]
    fn find_value_request_is_served_from_the_store() {
        let network = SimNetwork::new();
        let mut server = rpc(&network, "server");
        let mut client = network.join(address("client"));

        let key = Id::derive("k");
        server.store.set(key, Bytes::from_static(b"v"));

        let frame = Message::Request(RequestSpecific::FindValue(FindValueRequestArguments {
            key,
        }));
        client
            .send(&address("server"), frame.to_bytes())
            .expect("server attached");

        server.tick();

        let (payload, _) = client.try_recv().expect("reply delivered");
        assert_eq!(
            Message::from_bytes(&payload).expect("valid frame"),
            Message::Reply(ReplySpecific::ValueFound(ValueFoundReplyArguments {
                key,
                value: Bytes::from_static(b"v"),
            }))
        );
    }

    #[test]
    fn find_value_miss_with_no_other_peers_is_not_found() {
        let network = SimNetwork::new();
        let mut server = rpc(&network, "server");
        let mut client = network.join(address("client"));

        let key = Id::derive("missing");

        let frame = Message::Request(RequestSpecific::FindValue(FindValueRequestArguments {
            key,
        }));
        client
            .send(&address("server"), frame.to_bytes())
            .expect("server attached");

        server.tick();

        let (payload, _) = client.try_recv().expect("reply delivered");
        assert_eq!(
            Message::from_bytes(&payload).expect("valid frame"),
            Message::Reply(ReplySpecific::ValueNotFound(ValueNotFoundReplyArguments {
                key,
            }))
        );
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let network = SimNetwork::new();
        let mut server = rpc(&network, "server");
        let mut client = network.join(address("client"));

        client
            .send(&address("server"), Bytes::from_static(b"EXPLODE\x1fnow"))
            .expect("server attached");

        // Must not panic, must not reply.
        server.tick();

        assert!(client.try_recv().is_none());
    }

    #[test]
    fn mismatched_network_join_is_ignored() {
        let network = SimNetwork::new();
        let mut server = rpc(&network, "server");
        let mut client = network.join(address("client"));

        let frame = Message::Request(RequestSpecific::JoinProposal(
            JoinProposalRequestArguments {
                network_name: "some-other-network".to_string(),
            },
        ));
        client
            .send(&address("server"), frame.to_bytes())
            .expect("server attached");

        server.tick();

        assert!(client.try_recv().is_none());
        // The proposer stays out of the routing table as well.
        assert!(!server
            .routing_table
            .contains(Peer::new(address("client")).id()));
    }
}
