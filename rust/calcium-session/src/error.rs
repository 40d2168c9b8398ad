//! The session error taxonomy.
//!
//! Protocol violations are data, not strings: they carry the offending
//! command and the state pair that rejected it, so callers can act on them
//! (send an ErrorResponse citing the command, tear the circuit down, drop
//! the datagram).

use calcium_codec::{Command, ValidationError, ValueError};
use calcium_dbr::TypeError;
use calcium_wire::Role;

use crate::state::{ChannelState, CircuitState};

/// The dual-view state pair in effect when a command was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatePair {
    Circuit {
        client: CircuitState,
        server: CircuitState,
    },
    Channel {
        client: ChannelState,
        server: ChannelState,
    },
    Broadcaster {
        registered: bool,
    },
}

/// An illegal command, attributed to whichever side produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolViolation {
    /// The offending command.
    pub command: Box<Command>,
    /// The role of the engine that noticed.
    pub our_role: Role,
    /// The states that rejected the command.
    pub states: StatePair,
}

/// Which id namespace an unknown id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Cid,
    Sid,
    Ioid,
    SubscriptionId,
    SearchId,
}

/// Anything a session engine can fail with.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// This side attempted an illegal send. Engine state is unchanged.
    LocalProtocol(ProtocolViolation),
    /// The peer sent something illegal.
    RemoteProtocol(ProtocolViolation),
    /// Framing error; fatal for the stream (or datagram) that produced it.
    Validation(ValidationError),
    /// A command could not be built from the given arguments.
    Value(ValueError),
    /// A payload type operation failed.
    Type(TypeError),
    /// An id was referenced that this engine never issued.
    UnknownId { kind: IdKind, id: u32 },
    /// A subscription id used through the wrong channel.
    SubscriptionMismatch {
        subscriptionid: u32,
        expected_cid: u32,
    },
    /// A channel filter that does not parse or names unknown filters.
    BadFilter(String),
    /// Engine misuse that has no wire-level meaning.
    Runtime(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::LocalProtocol(v) => {
                write!(
                    f,
                    "illegal send by {} in {:?}: {:?}",
                    v.our_role, v.states, v.command
                )
            }
            Error::RemoteProtocol(v) => {
                write!(
                    f,
                    "peer of {} sent illegal command in {:?}: {:?}",
                    v.our_role, v.states, v.command
                )
            }
            Error::Validation(e) => write!(f, "{}", e),
            Error::Value(e) => write!(f, "{}", e),
            Error::Type(e) => write!(f, "{}", e),
            Error::UnknownId { kind, id } => write!(f, "unknown {:?} {}", kind, id),
            Error::SubscriptionMismatch {
                subscriptionid,
                expected_cid,
            } => write!(
                f,
                "subscription {} belongs to channel cid={}",
                subscriptionid, expected_cid
            ),
            Error::BadFilter(msg) => write!(f, "{}", msg),
            Error::Runtime(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e)
    }
}

impl From<ValueError> for Error {
    fn from(e: ValueError) -> Self {
        Error::Value(e)
    }
}

impl From<TypeError> for Error {
    fn from(e: TypeError) -> Self {
        Error::Type(e)
    }
}
