//! Tracking of outstanding requests awaiting a reply or a timeout.

use std::time::{Duration, Instant};

use crate::common::{Id, PeerAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
/// What an inbound reply must carry to match an outstanding request.
///
/// The wire format has no transaction ids; replies correlate by content (the
/// lookup target or the ping nonce) plus origin address.
pub enum Correlation {
    /// A FIND_NODE or FIND_VALUE request for this target.
    Lookup(Id),
    /// A PING carrying this nonce.
    Ping(u64),
}

#[derive(Debug, Clone)]
pub struct InflightRequest {
    pub to: PeerAddress,
    pub correlation: Correlation,
    pub sent_at: Instant,
}

#[derive(Debug)]
/// Outstanding requests in insertion (and therefore expiry) order.
pub struct InflightRequests {
    request_timeout: Duration,
    requests: Vec<InflightRequest>,
}

impl InflightRequests {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            requests: Vec::new(),
        }
    }

    pub fn add(&mut self, to: PeerAddress, correlation: Correlation) {
        self.requests.push(InflightRequest {
            to,
            correlation,
            sent_at: Instant::now(),
        });
    }

    /// Remove and return the request matching a reply's origin and
    /// correlation. `None` means the reply is late, duplicated, or
    /// unsolicited.
    pub fn remove(
        &mut self,
        from: &PeerAddress,
        correlation: &Correlation,
    ) -> Option<InflightRequest> {
        self.requests
            .iter()
            .position(|request| request.to == *from && request.correlation == *correlation)
            .map(|position| self.requests.remove(position))
    }

    pub fn contains(&self, to: &PeerAddress, correlation: &Correlation) -> bool {
        self.requests
            .iter()
            .any(|request| request.to == *to && request.correlation == *correlation)
    }

    /// Drain requests older than the timeout, returning them so the caller
    /// can advance the affected lookups and eviction checks.
    ///
    /// Requests are kept in insertion order, so the expired ones are a
    /// prefix.
    pub fn expired(&mut self) -> Vec<InflightRequest> {
        let cutoff = self
            .requests
            .iter()
            .position(|request| request.sent_at.elapsed() < self.request_timeout)
            .unwrap_or(self.requests.len());

        self.requests.drain(..cutoff).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(s: &str) -> PeerAddress {
        PeerAddress::new(s).expect("valid address")
    }

    #[test]
    fn remove_matches_origin_and_correlation() {
        let mut inflight = InflightRequests::new(Duration::from_secs(2));
        let target = Id::random();

        inflight.add(address("a"), Correlation::Lookup(target));

        // Same correlation, wrong origin.
        assert!(inflight
            .remove(&address("b"), &Correlation::Lookup(target))
            .is_none());
        // Same origin, wrong correlation.
        assert!(inflight.remove(&address("a"), &Correlation::Ping(7)).is_none());

        assert!(inflight
            .remove(&address("a"), &Correlation::Lookup(target))
            .is_some());
        // A duplicate reply finds nothing.
        assert!(inflight
            .remove(&address("a"), &Correlation::Lookup(target))
            .is_none());
    }

    #[test]
    fn expired_drains_only_old_requests() {
        let mut inflight = InflightRequests::new(Duration::from_millis(20));

        inflight.add(address("a"), Correlation::Ping(1));
        std::thread::sleep(Duration::from_millis(30));
        inflight.add(address("b"), Correlation::Ping(2));

        let expired = inflight.expired();

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].to, address("a"));
        assert!(inflight.contains(&address("b"), &Correlation::Ping(2)));
    }
}
