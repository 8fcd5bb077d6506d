//! The iterative lookup state machine.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::common::{Id, Peer, PeerAddress};

use super::closest::ClosestPeers;

#[derive(Debug, Clone, Copy, PartialEq)]
/// What a lookup is after.
pub enum LookupKind {
    /// The K closest peers to the target.
    FindNode,
    /// A stored value, falling back to closest peers while searching.
    FindValue,
}

#[derive(Debug)]
/// An iterative process of sending FIND_NODE or FIND_VALUE to the closest
/// known unqueried peers, in rounds of up to ALPHA, feeding discovered peers
/// back into the candidate set until no closer peer turns up.
///
/// The query itself never touches the transport; the engine dispatches the
/// peers [next_round](IterativeQuery::next_round) hands out and feeds
/// replies and timeouts back in.
pub struct IterativeQuery {
    target: Id,
    kind: LookupKind,
    closest: ClosestPeers,
    /// Peers that replied, candidates for STORE replication.
    responders: ClosestPeers,
    /// Peers dispatched in the current round, not yet replied or timed out.
    round_inflight: Vec<PeerAddress>,
    /// Best known distance when the current round was dispatched.
    round_best: Option<Id>,
    started_at: Instant,
    value: Option<Bytes>,
    /// The peer the value came from, excluded from the caching store.
    value_holder: Option<PeerAddress>,
    done: bool,
}

impl IterativeQuery {
    pub fn new<T: IntoIterator<Item = Peer>>(target: Id, kind: LookupKind, seed: T) -> Self {
        trace!(?target, ?kind, "New query");

        Self {
            target,
            kind,
            closest: ClosestPeers::with_peers(target, seed),
            responders: ClosestPeers::new(target),
            round_inflight: Vec::new(),
            round_best: None,
            started_at: Instant::now(),
            value: None,
            value_holder: None,
            done: false,
        }
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.target
    }

    pub fn kind(&self) -> LookupKind {
        self.kind
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    pub fn value_holder(&self) -> Option<&PeerAddress> {
        self.value_holder.as_ref()
    }

    /// Closest candidates seen so far, queried or not.
    pub fn closest(&self) -> &ClosestPeers {
        &self.closest
    }

    /// The closest peers that actually replied.
    pub fn responders(&self) -> &ClosestPeers {
        &self.responders
    }

    /// `true` when every request of the current round has been replied to or
    /// timed out.
    pub fn round_complete(&self) -> bool {
        self.round_inflight.is_empty()
    }

    // === Public Methods ===

    /// Begin the next round: take up to `alpha` unqueried candidates for the
    /// engine to dispatch to, recording the improvement baseline.
    ///
    /// Marks the query converged when there is nothing left to dispatch.
    pub fn next_round(&mut self, alpha: usize) -> Vec<Peer> {
        if self.done {
            // A value can finish the query mid-round with requests still
            // outstanding; later rounds are simply empty.
            return Vec::new();
        }

        debug_assert!(self.round_complete());

        self.round_best = self.closest.best_distance();

        let peers = self.closest.next_unqueried(alpha);

        if peers.is_empty() {
            self.converge("exhausted candidates");
            return peers;
        }

        self.round_inflight
            .extend(peers.iter().map(|peer| peer.address().clone()));

        peers
    }

    /// Add a peer discovered in a NODE_FOUND reply as a candidate for
    /// subsequent rounds.
    pub fn add_candidate(&mut self, peer: Peer) {
        self.closest.add(peer);
    }

    /// A NODE_FOUND (or VALUE_NOT_FOUND) reply from a dispatched peer.
    pub fn reply_received(&mut self, from: Peer) {
        if self.done {
            // Late reply after a value was found or the query timed out.
            return;
        }

        self.responders.add(from.clone());
        self.settle(from.address());
    }

    /// A VALUE_FOUND reply: record the value and finish immediately;
    /// outstanding replies for this round are simply ignored on arrival.
    pub fn value_found(&mut self, from: Peer, value: Bytes) {
        if self.done {
            return;
        }

        debug!(target = ?self.target, from = %from.address(), "Lookup found value");

        self.responders.add(from.clone());
        self.value_holder = Some(from.address().clone());
        self.value = Some(value);
        self.done = true;
    }

    /// A reply timeout for one peer; it contributes nothing but does not
    /// block the rest of the round.
    pub fn timed_out(&mut self, from: &PeerAddress) {
        self.settle(from);
    }

    /// Check the round for convergence; to be called when the round is
    /// complete. Returns `true` if the query just converged.
    pub fn check_convergence(&mut self) -> bool {
        if self.done || !self.round_complete() {
            return false;
        }

        let improved = match (self.closest.best_distance(), &self.round_best) {
            (Some(now), Some(before)) => now < *before,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if !improved || self.closest.all_queried() {
            self.converge("no closer peers");
            return true;
        }

        false
    }

    /// Force termination when the whole lookup exceeded its global timeout,
    /// reporting whatever the candidate set currently holds.
    pub fn check_global_timeout(&mut self, limit: Duration) -> bool {
        if !self.done && self.started_at.elapsed() >= limit {
            debug!(target = ?self.target, "Lookup timed out");
            self.done = true;
            return true;
        }

        false
    }

    // === Private Methods ===

    fn settle(&mut self, from: &PeerAddress) {
        if let Some(position) = self.round_inflight.iter().position(|to| to == from) {
            self.round_inflight.remove(position);
        }
    }

    fn converge(&mut self, reason: &str) {
        debug!(
            target = ?self.target,
            candidates = self.closest.len(),
            responders = self.responders.len(),
            reason,
            "Lookup converged"
        );
        self.done = true;
    }
}
