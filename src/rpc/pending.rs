//! Registry matching asynchronous replies to waiting callers.

use std::collections::HashMap;

use crate::common::{Id, PeerAddress};

use super::ResponseSender;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Correlation key for an outstanding caller-visible request.
pub enum RequestKey {
    /// A node or value lookup for this target.
    Lookup(Id),
    /// A ping to this peer carrying this nonce.
    Ping(PeerAddress, u64),
}

#[derive(Debug, Default)]
/// At most one registered listener per [RequestKey] at any time.
pub struct PendingRequests {
    listeners: HashMap<RequestKey, ResponseSender>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for a key, returning the previously registered
    /// listener if this replaced one.
    pub fn register(
        &mut self,
        key: RequestKey,
        listener: ResponseSender,
    ) -> Option<ResponseSender> {
        self.listeners.insert(key, listener)
    }

    pub fn is_registered(&self, key: &RequestKey) -> bool {
        self.listeners.contains_key(key)
    }

    /// Remove and return the listener for a key. A key with no listener is a
    /// silent no-op, tolerating late or duplicate replies after a timeout
    /// already fired.
    pub fn trigger(&mut self, key: &RequestKey) -> Option<ResponseSender> {
        self.listeners.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pong_listener() -> (ResponseSender, flume::Receiver<bool>) {
        let (sender, receiver) = flume::bounded(1);
        (ResponseSender::Pong(sender), receiver)
    }

    #[test]
    fn register_returns_replaced_listener() {
        let mut pending = PendingRequests::new();
        let key = RequestKey::Lookup(Id::random());

        let (first, _first_rx) = pong_listener();
        let (second, _second_rx) = pong_listener();

        assert!(pending.register(key.clone(), first).is_none());
        assert!(pending.is_registered(&key));
        assert!(pending.register(key.clone(), second).is_some());
    }

    #[test]
    fn trigger_removes_and_tolerates_unknown_keys() {
        let mut pending = PendingRequests::new();
        let address = PeerAddress::new("peer-a").expect("valid address");
        let key = RequestKey::Ping(address, 42);

        assert!(pending.trigger(&key).is_none());

        let (listener, _rx) = pong_listener();
        pending.register(key.clone(), listener);

        assert!(pending.trigger(&key).is_some());
        assert!(pending.trigger(&key).is_none());
        assert!(!pending.is_registered(&key));
    }
}
