#![doc = include_str!("../README.md")]
//!
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

// Modules
mod common;
mod dht;
pub mod store;

#[cfg(feature = "async")]
pub mod async_dht;
pub mod rpc;
pub mod transport;

// Exports
pub use crate::common::messages;
pub use crate::common::{
    AddResult, Id, InvalidId, InvalidPeerAddress, Peer, PeerAddress, RoutingTable, ID_SIZE,
    MAX_BUCKET_SIZE_K,
};
pub use crate::dht::{
    Dht, DhtBuilder, DhtGetError, DhtPutError, DhtWasShutdown, Testnet,
};
pub use crate::rpc::{Info, LookupError, PutError};
pub use bytes::Bytes;
