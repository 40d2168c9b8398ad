//! Codec-level errors.

use calcium_dbr::{TypeError, UnknownDbrType};
use calcium_wire::Role;

/// A framing error. Fatal for the stream that produced it: the circuit
/// must be torn down, or the datagram dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// No command with this id exists for this sender role.
    UnknownCommand { id: u16, sender: Role },
    /// No command with this id exists at all (role-less observation).
    UnidentifiableCommand { id: u16 },
    /// `data_type` is not a DBR id.
    BadDataType(UnknownDbrType),
    /// The payload is shorter than `data_type x data_count` requires.
    PayloadTooShort { needed: usize, got: usize },
    /// This command's payload has a fixed size and this is not it.
    BadPayloadSize { expected: usize, got: usize },
    /// A datagram ended mid-command. Datagrams are atomic.
    TruncatedDatagram { needed: usize, got: usize },
    /// The payload of an ErrorResponse did not start with a valid header.
    BadErrorPayload,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::UnknownCommand { id, sender } => {
                write!(f, "unknown command id {} from {}", id, sender)
            }
            ValidationError::UnidentifiableCommand { id } => {
                write!(f, "unidentifiable command id {}", id)
            }
            ValidationError::BadDataType(e) => write!(f, "{}", e),
            ValidationError::PayloadTooShort { needed, got } => {
                write!(f, "payload too short: need {} bytes, got {}", needed, got)
            }
            ValidationError::BadPayloadSize { expected, got } => {
                write!(f, "bad payload size: expected {} bytes, got {}", expected, got)
            }
            ValidationError::TruncatedDatagram { needed, got } => {
                write!(f, "datagram truncated: need {} bytes, got {}", needed, got)
            }
            ValidationError::BadErrorPayload => {
                write!(f, "ErrorResponse payload does not start with a command header")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<UnknownDbrType> for ValidationError {
    fn from(e: UnknownDbrType) -> Self {
        ValidationError::BadDataType(e)
    }
}

/// A command could not be built from the given logical arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueError {
    /// Priorities are 0..=99.
    PriorityOutOfRange(u16),
    /// A PV name must fit in 40 bytes after NUL padding.
    NameTooLong { name: String, padded: usize },
    /// SearchRequest reply flags are DO_REPLY (10) or NO_REPLY (5).
    BadReplyFlag(u16),
    /// The payload could not be serialized.
    Type(TypeError),
}

impl std::fmt::Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueError::PriorityOutOfRange(p) => {
                write!(f, "priority {} outside 0..=99", p)
            }
            ValueError::NameTooLong { name, padded } => {
                write!(f, "name {:?} pads to {} bytes, limit is 40", name, padded)
            }
            ValueError::BadReplyFlag(flag) => write!(f, "bad search reply flag {}", flag),
            ValueError::Type(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ValueError {}

impl From<TypeError> for ValueError {
    fn from(e: TypeError) -> Self {
        ValueError::Type(e)
    }
}
