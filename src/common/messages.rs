//! Wire messages and the delimiter-separated text codec.
//!
//! Frames are a command token followed by fields, separated by a single
//! reserved delimiter byte. Ids travel as fixed-width hex; a resource value
//! is always the final field of its frame and is taken verbatim to the end,
//! so it may contain any byte.

use bytes::Bytes;

use crate::common::{Id, InvalidId, InvalidPeerAddress, PeerAddress};

/// The reserved field delimiter (ASCII unit separator). Not permitted inside
/// any field except a trailing resource value.
pub const DELIMITER: u8 = 0x1f;

#[derive(Debug, Clone, PartialEq)]
/// A decoded wire frame: either a request or a reply.
pub enum Message {
    Request(RequestSpecific),
    Reply(ReplySpecific),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestSpecific {
    JoinProposal(JoinProposalRequestArguments),
    Ping(PingRequestArguments),
    Store(StoreRequestArguments),
    FindNode(FindNodeRequestArguments),
    FindValue(FindValueRequestArguments),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplySpecific {
    JoinAgreed,
    PingEcho(PingEchoReplyArguments),
    NodeFound(NodeFoundReplyArguments),
    ValueFound(ValueFoundReplyArguments),
    ValueNotFound(ValueNotFoundReplyArguments),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinProposalRequestArguments {
    pub network_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PingRequestArguments {
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreRequestArguments {
    pub key: Id,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindNodeRequestArguments {
    pub target: Id,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindValueRequestArguments {
    pub key: Id,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PingEchoReplyArguments {
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeFoundReplyArguments {
    pub target: Id,
    pub peers: Vec<PeerAddress>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueFoundReplyArguments {
    pub key: Id,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueNotFoundReplyArguments {
    pub key: Id,
}

const JOIN_PROPOSAL: &str = "JOIN_PROPOSAL";
const PING: &str = "PING";
const STORE: &str = "STORE";
const FIND_NODE: &str = "FIND_NODE";
const FIND_VALUE: &str = "FIND_VALUE";
const JOIN_AGREED: &str = "JOIN_AGREED";
const PING_ECHO: &str = "PING_ECHO";
const NODE_FOUND: &str = "NODE_FOUND";
const VALUE_FOUND: &str = "VALUE_FOUND";
const VALUE_NOT_FOUND: &str = "VALUE_NOT_FOUND";

impl Message {
    pub fn to_bytes(&self) -> Bytes {
        let mut frame = Frame::new();

        match self {
            Message::Request(RequestSpecific::JoinProposal(args)) => {
                frame.token(JOIN_PROPOSAL);
                frame.field(args.network_name.as_bytes());
            }
            Message::Request(RequestSpecific::Ping(args)) => {
                frame.token(PING);
                frame.field(args.nonce.to_string().as_bytes());
            }
            Message::Request(RequestSpecific::Store(args)) => {
                frame.token(STORE);
                frame.field(args.key.to_string().as_bytes());
                frame.field(&args.value);
            }
            Message::Request(RequestSpecific::FindNode(args)) => {
                frame.token(FIND_NODE);
                frame.field(args.target.to_string().as_bytes());
            }
            Message::Request(RequestSpecific::FindValue(args)) => {
                frame.token(FIND_VALUE);
                frame.field(args.key.to_string().as_bytes());
            }
            Message::Reply(ReplySpecific::JoinAgreed) => {
                frame.token(JOIN_AGREED);
            }
            Message::Reply(ReplySpecific::PingEcho(args)) => {
                frame.token(PING_ECHO);
                frame.field(args.nonce.to_string().as_bytes());
            }
            Message::Reply(ReplySpecific::NodeFound(args)) => {
                frame.token(NODE_FOUND);
                frame.field(args.target.to_string().as_bytes());
                for peer in &args.peers {
                    frame.field(peer.as_str().as_bytes());
                }
            }
            Message::Reply(ReplySpecific::ValueFound(args)) => {
                frame.token(VALUE_FOUND);
                frame.field(args.key.to_string().as_bytes());
                frame.field(&args.value);
            }
            Message::Reply(ReplySpecific::ValueNotFound(args)) => {
                frame.token(VALUE_NOT_FOUND);
                frame.field(args.key.to_string().as_bytes());
            }
        }

        frame.finish()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Message, DecodeError> {
        let mut parts = bytes.splitn(2, |byte| *byte == DELIMITER);

        let token = parts.next().unwrap_or_default();
        let token = std::str::from_utf8(token).map_err(|_| DecodeError::InvalidUtf8)?;
        let rest = parts.next();

        match token {
            JOIN_PROPOSAL => {
                let fields = text_fields(rest, 1, JOIN_PROPOSAL)?;

                Ok(Message::Request(RequestSpecific::JoinProposal(
                    JoinProposalRequestArguments {
                        network_name: fields[0].to_string(),
                    },
                )))
            }
            PING => {
                let fields = text_fields(rest, 1, PING)?;

                Ok(Message::Request(RequestSpecific::Ping(
                    PingRequestArguments {
                        nonce: parse_nonce(fields[0])?,
                    },
                )))
            }
            STORE => {
                let (key, value) = key_and_value(rest, STORE)?;

                Ok(Message::Request(RequestSpecific::Store(
                    StoreRequestArguments { key, value },
                )))
            }
            FIND_NODE => {
                let fields = text_fields(rest, 1, FIND_NODE)?;

                Ok(Message::Request(RequestSpecific::FindNode(
                    FindNodeRequestArguments {
                        target: fields[0].parse()?,
                    },
                )))
            }
            FIND_VALUE => {
                let fields = text_fields(rest, 1, FIND_VALUE)?;

                Ok(Message::Request(RequestSpecific::FindValue(
                    FindValueRequestArguments {
                        key: fields[0].parse()?,
                    },
                )))
            }
            JOIN_AGREED => {
                if rest.is_some() {
                    return Err(DecodeError::WrongFieldCount(JOIN_AGREED));
                }

                Ok(Message::Reply(ReplySpecific::JoinAgreed))
            }
            PING_ECHO => {
                let fields = text_fields(rest, 1, PING_ECHO)?;

                Ok(Message::Reply(ReplySpecific::PingEcho(
                    PingEchoReplyArguments {
                        nonce: parse_nonce(fields[0])?,
                    },
                )))
            }
            NODE_FOUND => {
                let rest = rest.ok_or(DecodeError::WrongFieldCount(NODE_FOUND))?;
                let rest = std::str::from_utf8(rest).map_err(|_| DecodeError::InvalidUtf8)?;

                let mut fields = rest.split(DELIMITER as char);
                let target = fields
                    .next()
                    .ok_or(DecodeError::WrongFieldCount(NODE_FOUND))?
                    .parse()?;

                let peers = fields
                    .map(PeerAddress::new)
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(Message::Reply(ReplySpecific::NodeFound(
                    NodeFoundReplyArguments { target, peers },
                )))
            }
            VALUE_FOUND => {
                let (key, value) = key_and_value(rest, VALUE_FOUND)?;

                Ok(Message::Reply(ReplySpecific::ValueFound(
                    ValueFoundReplyArguments { key, value },
                )))
            }
            VALUE_NOT_FOUND => {
                let fields = text_fields(rest, 1, VALUE_NOT_FOUND)?;

                Ok(Message::Reply(ReplySpecific::ValueNotFound(
                    ValueNotFoundReplyArguments {
                        key: fields[0].parse()?,
                    },
                )))
            }
            _ => Err(DecodeError::UnknownMessageType(token.to_string())),
        }
    }
}

/// Split the remainder into exactly `expected` UTF-8 text fields.
fn text_fields<'a>(
    rest: Option<&'a [u8]>,
    expected: usize,
    token: &'static str,
) -> Result<Vec<&'a str>, DecodeError> {
    let rest = rest.ok_or(DecodeError::WrongFieldCount(token))?;
    let rest = std::str::from_utf8(rest).map_err(|_| DecodeError::InvalidUtf8)?;

    let fields = rest.split(DELIMITER as char).collect::<Vec<_>>();

    if fields.len() != expected {
        return Err(DecodeError::WrongFieldCount(token));
    }

    Ok(fields)
}

/// Split the remainder into a fixed-width hex key and a verbatim trailing
/// value.
fn key_and_value(rest: Option<&[u8]>, token: &'static str) -> Result<(Id, Bytes), DecodeError> {
    let rest = rest.ok_or(DecodeError::WrongFieldCount(token))?;

    let mut parts = rest.splitn(2, |byte| *byte == DELIMITER);

    let key = parts.next().unwrap_or_default();
    let key = std::str::from_utf8(key).map_err(|_| DecodeError::InvalidUtf8)?;
    let value = parts.next().ok_or(DecodeError::WrongFieldCount(token))?;

    Ok((key.parse()?, Bytes::copy_from_slice(value)))
}

fn parse_nonce(field: &str) -> Result<u64, DecodeError> {
    field.parse().map_err(|_| DecodeError::InvalidNonce)
}

struct Frame(Vec<u8>);

impl Frame {
    fn new() -> Frame {
        Frame(Vec::with_capacity(64))
    }

    fn token(&mut self, token: &str) {
        self.0.extend_from_slice(token.as_bytes());
    }

    fn field(&mut self, field: &[u8]) {
        self.0.push(DELIMITER);
        self.0.extend_from_slice(field);
    }

    fn finish(self) -> Bytes {
        self.0.into()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
/// A malformed wire frame. The receive path drops these; they are never
/// fatal.
pub enum DecodeError {
    #[error("Unknown message type: {0:?}")]
    UnknownMessageType(String),

    #[error("Wrong number of fields for {0}")]
    WrongFieldCount(&'static str),

    #[error("Invalid id field: {0}")]
    InvalidId(#[from] InvalidId),

    #[error("Invalid nonce field")]
    InvalidNonce,

    #[error("Invalid peer address field: {0}")]
    InvalidPeerAddress(#[from] InvalidPeerAddress),

    #[error("Message frame is not valid UTF-8")]
    InvalidUtf8,
}
