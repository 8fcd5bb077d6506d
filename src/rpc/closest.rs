//! Bounded accumulator of the best-known candidates for a lookup target.

use std::cmp::Ordering;

use crate::common::{Id, Peer, MAX_BUCKET_SIZE_K};

#[derive(Debug, Clone)]
/// A lookup candidate and whether it has already been sent a request.
pub struct Candidate {
    pub peer: Peer,
    pub queried: bool,
}

#[derive(Debug, Clone)]
/// At most K candidates sorted ascending by XOR distance to a fixed target.
///
/// Once full, a peer farther than the current Kth-closest is rejected.
pub struct ClosestPeers {
    target: Id,
    candidates: Vec<Candidate>,
}

impl ClosestPeers {
    pub fn new(target: Id) -> Self {
        Self {
            target,
            candidates: Vec::with_capacity(MAX_BUCKET_SIZE_K + 1),
        }
    }

    /// Seed from an initial set of peers, sorted and truncated to K.
    pub fn with_peers<T: IntoIterator<Item = Peer>>(target: Id, peers: T) -> Self {
        let mut closest = Self::new(target);

        for peer in peers {
            closest.add(peer);
        }

        closest
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.target
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// The candidate peers in ascending distance order.
    pub fn peers(&self) -> Vec<Peer> {
        self.candidates
            .iter()
            .map(|candidate| candidate.peer.clone())
            .collect()
    }

    /// Distance of the closest known candidate to the target.
    pub fn best_distance(&self) -> Option<Id> {
        self.candidates
            .first()
            .map(|candidate| candidate.peer.id().xor(&self.target))
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// `true` once every held candidate has been queried.
    pub fn all_queried(&self) -> bool {
        self.candidates.iter().all(|candidate| candidate.queried)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.candidates
            .iter()
            .any(|candidate| candidate.peer.id() == id)
    }

    // === Public Methods ===

    /// Insert a peer as an unqueried candidate. A duplicate is a no-op, and
    /// so is a peer farther than the Kth-closest when already full.
    pub fn add(&mut self, peer: Peer) {
        self.insert(peer, false)
    }

    /// Return up to `max` unqueried candidates in ascending distance order,
    /// marking them queried; the caller is expected to dispatch to them
    /// immediately.
    pub fn next_unqueried(&mut self, max: usize) -> Vec<Peer> {
        self.candidates
            .iter_mut()
            .filter(|candidate| !candidate.queried)
            .take(max)
            .map(|candidate| {
                candidate.queried = true;
                candidate.peer.clone()
            })
            .collect()
    }

    // === Private Methods ===

    fn insert(&mut self, peer: Peer, queried: bool) {
        let seek = peer.id().xor(&self.target);

        let result = self.candidates.binary_search_by(|probe| {
            if probe.peer.id() == peer.id() {
                Ordering::Equal
            } else {
                probe.peer.id().xor(&self.target).cmp(&seek)
            }
        });

        if let Err(position) = result {
            if position >= MAX_BUCKET_SIZE_K {
                return;
            }

            self.candidates.insert(position, Candidate { peer, queried });
            self.candidates.truncate(MAX_BUCKET_SIZE_K);
        }
    }
}
