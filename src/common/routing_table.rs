//! Kademlia routing table and its k-buckets.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::common::{Id, Peer};
use crate::rpc::ClosestPeers;

/// K = the maximum size of a k-bucket, and the replication factor.
pub const MAX_BUCKET_SIZE_K: usize = 20;

#[derive(Debug, Clone)]
/// Kademlia routing table.
///
/// Buckets are keyed by the bit length of the XOR between a peer's Id and
/// this node's Id (`1..=160`), so bucket `d` holds peers whose distance lies
/// in `[2^(d-1), 2^d)`.
pub struct RoutingTable {
    local: Peer,
    buckets: BTreeMap<u8, KBucket>,
}

#[derive(Debug, Clone, PartialEq)]
/// Outcome of [RoutingTable::add].
pub enum AddResult {
    /// The peer was appended to the tail of its bucket.
    Added,
    /// The peer was already present and moved to the tail (most recently
    /// seen).
    Updated,
    /// The peer is this node itself; self is never stored.
    IsSelf,
    /// The bucket is full. The head (least recently seen) should be pinged;
    /// [RoutingTable::resolve_eviction] applies the outcome. `add` itself
    /// never blocks on that ping.
    Full { bucket: u8, head: Peer },
}

impl RoutingTable {
    /// Create a new [RoutingTable] centered on the given local peer.
    pub fn new(local: Peer) -> Self {
        RoutingTable {
            local,
            buckets: BTreeMap::new(),
        }
    }

    // === Getters ===

    /// Returns the [Id] of this node, where the distance is measured from.
    pub fn id(&self) -> &Id {
        self.local.id()
    }

    /// Returns this node's own peer entry.
    pub fn local_peer(&self) -> &Peer {
        &self.local
    }

    /// The bucket index for a given Id, or `None` for this node's own Id.
    pub fn bucket_index(&self, id: &Id) -> Option<u8> {
        match self.local.id().distance(id) {
            0 => None,
            distance => Some(distance),
        }
    }

    // === Public Methods ===

    /// Attempts to add a peer to this routing table.
    ///
    /// A present peer moves to the tail of its bucket; a bucket with spare
    /// capacity appends at the tail; a full bucket surfaces its head for an
    /// asynchronous liveness check instead of mutating anything.
    pub fn add(&mut self, peer: Peer) -> AddResult {
        let bucket_index = match self.bucket_index(peer.id()) {
            Some(index) => index,
            None => return AddResult::IsSelf,
        };

        let bucket = self.buckets.entry(bucket_index).or_default();

        if let Some(position) = bucket.position(peer.id()) {
            let existing = bucket.peers.remove(position);
            bucket.peers.push(existing);

            return AddResult::Updated;
        }

        if bucket.peers.len() < MAX_BUCKET_SIZE_K {
            bucket.peers.push(peer);

            return AddResult::Added;
        }

        AddResult::Full {
            bucket: bucket_index,
            head: bucket.peers[0].clone(),
        }
    }

    /// Apply the outcome of a liveness check started after [AddResult::Full].
    ///
    /// A live head moves to the tail of its bucket and the candidate is
    /// discarded; a dead head is removed and the candidate appended.
    pub fn resolve_eviction(&mut self, bucket: u8, head: &Peer, candidate: Peer, head_alive: bool) {
        let bucket = match self.buckets.get_mut(&bucket) {
            Some(bucket) => bucket,
            None => return,
        };

        let position = match bucket.position(head.id()) {
            Some(position) => position,
            // The head left the bucket in the meantime; take the free slot.
            None => {
                if bucket.peers.len() < MAX_BUCKET_SIZE_K && !head_alive {
                    bucket.peers.push(candidate);
                }
                return;
            }
        };

        if head_alive {
            let head = bucket.peers.remove(position);
            bucket.peers.push(head);
        } else {
            bucket.peers.remove(position);
            bucket.peers.push(candidate);
        }
    }

    /// Return the closest peers to the target, this node included, ordered by
    /// XOR distance, at most [MAX_BUCKET_SIZE_K].
    pub fn closest(&self, target: &Id) -> Vec<Peer> {
        let mut closest = ClosestPeers::new(*target);

        closest.add(self.local.clone());

        for bucket in self.buckets.values() {
            for peer in &bucket.peers {
                closest.add(peer.clone());
            }
        }

        closest.peers()
    }

    /// Remove a peer from this routing table. Returns `false` when the peer
    /// is absent, or is this node itself.
    pub fn remove(&mut self, id: &Id) -> bool {
        let bucket_index = match self.bucket_index(id) {
            Some(index) => index,
            None => return false,
        };

        if let Some(bucket) = self.buckets.get_mut(&bucket_index) {
            if let Some(position) = bucket.position(id) {
                bucket.peers.remove(position);
                return true;
            }
        }

        false
    }

    /// Indices of buckets whose last lookup is older than `older_than`.
    pub fn buckets_needing_refresh(&self, older_than: Duration) -> Vec<u8> {
        self.buckets
            .iter()
            .filter(|(_, bucket)| bucket.last_refreshed.elapsed() >= older_than)
            .map(|(index, _)| *index)
            .collect()
    }

    /// Stamp the bucket covering `target` as refreshed by a lookup.
    pub fn touch(&mut self, target: &Id) {
        if let Some(index) = self.bucket_index(target) {
            if let Some(bucket) = self.buckets.get_mut(&index) {
                bucket.last_refreshed = Instant::now();
            }
        }
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|bucket| bucket.peers.is_empty())
    }

    /// Return the number of peers in this routing table.
    pub fn size(&self) -> usize {
        self.buckets
            .values()
            .fold(0, |acc, bucket| acc + bucket.peers.len())
    }

    /// Returns an iterator over the peers in this routing table, self
    /// excluded.
    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.buckets.values().flat_map(|bucket| bucket.peers.iter())
    }

    /// Turn this routing table into a list of bootstrap addresses.
    pub fn to_bootstrap(&self) -> Vec<String> {
        self.peers()
            .map(|peer| peer.address().to_string())
            .collect()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.bucket_index(id)
            .and_then(|index| self.buckets.get(&index))
            .map(|bucket| bucket.position(id).is_some())
            .unwrap_or(false)
    }
}

/// A bounded list of peers at one distance range from self, ordered by the
/// least recently seen first.
#[derive(Debug, Clone)]
pub struct KBucket {
    peers: Vec<Peer>,
    /// Last time a lookup targeted this bucket's range.
    last_refreshed: Instant,
}

impl KBucket {
    fn position(&self, id: &Id) -> Option<usize> {
        self.peers.iter().position(|peer| peer.id() == id)
    }
}

impl Default for KBucket {
    fn default() -> Self {
        KBucket {
            peers: Vec::with_capacity(MAX_BUCKET_SIZE_K),
            last_refreshed: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RoutingTable {
        RoutingTable::new(Peer::random())
    }

    #[test]
    fn never_stores_self() {
        let mut table = table();
        let local = table.local_peer().clone();

        assert_eq!(table.add(local), AddResult::IsSelf);
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn add_and_update() {
        let mut table = table();
        let peer = Peer::random();

        assert_eq!(table.add(peer.clone()), AddResult::Added);
        assert_eq!(table.add(peer.clone()), AddResult::Updated);
        assert_eq!(table.size(), 1);
        assert!(table.contains(peer.id()));
    }

    #[test]
    fn full_bucket_never_exceeds_k() {
        let mut table = table();
        let local = *table.id();

        // All targets in the same (furthest possible) bucket.
        let bucket = 160;
        let mut full_head = None;

        for i in 0.. {
            if i > 100_000 {
                panic!("never filled the bucket");
            }

            let peer = Peer::random();
            if local.distance(peer.id()) != bucket {
                continue;
            }

            match table.add(peer) {
                AddResult::Added => {}
                AddResult::Full { head, .. } => {
                    full_head = Some(head);
                    break;
                }
                other => panic!("unexpected outcome: {:?}", other),
            }
        }

        assert_eq!(table.size(), MAX_BUCKET_SIZE_K);
        assert!(full_head.is_some());
    }

    #[test]
    fn eviction_keeps_live_head() {
        let mut table = table();
        let head = Peer::random();
        let candidate = Peer::random();

        table.add(head.clone());
        let bucket = table.bucket_index(head.id()).expect("not self");

        table.resolve_eviction(bucket, &head, candidate.clone(), true);

        assert!(table.contains(head.id()));
        assert!(!table.contains(candidate.id()));
    }

    #[test]
    fn eviction_replaces_dead_head() {
        let mut table = table();
        let head = Peer::random();
        let candidate = Peer::random();

        table.add(head.clone());
        let bucket = table.bucket_index(head.id()).expect("not self");

        table.resolve_eviction(bucket, &head, candidate.clone(), false);

        assert!(!table.contains(head.id()));
        assert!(table.contains(candidate.id()));
    }

    #[test]
    fn closest_includes_self_and_sorts_by_distance() {
        let mut table = table();

        for _ in 0..50 {
            table.add(Peer::random());
        }

        let target = Id::random();
        let closest = table.closest(&target);

        assert!(closest.len() <= MAX_BUCKET_SIZE_K);

        let distances = closest
            .iter()
            .map(|peer| peer.id().xor(&target))
            .collect::<Vec<_>>();
        let mut sorted = distances.clone();
        sorted.sort();

        assert_eq!(distances, sorted);
    }

    #[test]
    fn remove_unknown_peer_reports_not_found() {
        let mut table = table();
        let peer = Peer::random();

        assert!(!table.remove(peer.id()));
        assert!(!table.remove(&table.id().clone()));

        table.add(peer.clone());
        assert!(table.remove(peer.id()));
        assert!(!table.remove(peer.id()));
    }

    #[test]
    fn touch_resets_refresh_staleness() {
        let mut table = table();
        let peer = Peer::random();

        table.add(peer.clone());

        assert_eq!(
            table.buckets_needing_refresh(Duration::from_secs(0)).len(),
            1
        );
        assert!(table
            .buckets_needing_refresh(Duration::from_secs(60))
            .is_empty());

        table.touch(peer.id());
        assert!(table
            .buckets_needing_refresh(Duration::from_secs(60))
            .is_empty());
    }
}
