//! Peer entry in the routing table: a transport address and its derived Id.

use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

use crate::common::messages::DELIMITER;
use crate::common::Id;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// A peer's transport address.
///
/// Kadline is transport agnostic, so addresses are opaque strings (a
/// `host:port` pair, a phone number, a mailbox name). An address must be
/// non-empty and must not contain the reserved wire delimiter.
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new<T: Into<String>>(address: T) -> Result<PeerAddress, InvalidPeerAddress> {
        let address = address.into();

        if address.is_empty() {
            return Err(InvalidPeerAddress::Empty);
        }
        if address.bytes().any(|byte| byte == DELIMITER) {
            return Err(InvalidPeerAddress::ReservedDelimiter);
        }

        Ok(PeerAddress(address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PeerAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for PeerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PeerAddress {
    type Err = InvalidPeerAddress;

    fn from_str(s: &str) -> Result<PeerAddress, InvalidPeerAddress> {
        PeerAddress::new(s)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
/// Errors validating a [PeerAddress].
pub enum InvalidPeerAddress {
    #[error("Peer address is empty")]
    Empty,

    #[error("Peer address contains the reserved delimiter byte")]
    ReservedDelimiter,
}

#[derive(Debug, Clone, Eq)]
/// Peer entry in the Kademlia routing table.
///
/// Two peers are equal when their transport addresses are equal; the Id is
/// derived from the address and carried alongside it.
pub struct Peer {
    address: PeerAddress,
    id: Id,
}

impl Peer {
    /// Creates a new Peer from a transport address, deriving its [Id].
    pub fn new(address: PeerAddress) -> Peer {
        let id = Id::derive(address.as_str());

        Peer { address, id }
    }

    /// Creates a new Peer from a raw address string.
    pub fn from_address<T: Into<String>>(address: T) -> Result<Peer, InvalidPeerAddress> {
        Ok(Peer::new(PeerAddress::new(address)?))
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    #[cfg(test)]
    pub fn random() -> Peer {
        use rand::Rng;

        let suffix: u64 = rand::thread_rng().gen();

        Peer::new(PeerAddress(format!("peer-{:016x}", suffix)))
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Peer) -> bool {
        self.address == other.address
    }
}

impl Hash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}
