//! Type-system errors.

use crate::types::{Envelope, NativeType};

/// A payload could not be built, parsed, or converted.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeError {
    /// The requested `(native, envelope)` pair has no wire id.
    NoSuchType {
        native: NativeType,
        envelope: Envelope,
    },
    /// No reasonable conversion between these native types.
    NoConversion { from: NativeType, to: NativeType },
    /// Fewer bytes than `metadata + count * element_size`.
    ShortBuffer { needed: usize, got: usize },
    /// A string value did not fit its fixed wire width.
    StringTooLong { len: usize, max: usize },
    /// A string could not be parsed as a number.
    UnparsableString(String),
    /// An enum index is outside the table of states.
    BadEnumIndex { index: u16, states: usize },
    /// An enum string is not in the table of states.
    UnknownEnumString(String),
    /// A numeric value does not fit the target type.
    OutOfRange { value: f64, to: NativeType },
    /// The supplied metadata variant does not match the envelope.
    MetadataMismatch { envelope: Envelope },
}

impl std::fmt::Display for TypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeError::NoSuchType { native, envelope } => {
                write!(f, "no DBR id for {:?} with {:?} envelope", native, envelope)
            }
            TypeError::NoConversion { from, to } => {
                write!(f, "no reasonable conversion from {:?} to {:?}", from, to)
            }
            TypeError::ShortBuffer { needed, got } => {
                write!(f, "payload too short: need {} bytes, got {}", needed, got)
            }
            TypeError::StringTooLong { len, max } => {
                write!(f, "string of {} bytes exceeds wire width {}", len, max)
            }
            TypeError::UnparsableString(s) => write!(f, "cannot parse {:?} as a number", s),
            TypeError::BadEnumIndex { index, states } => {
                write!(f, "enum index {} outside {} states", index, states)
            }
            TypeError::UnknownEnumString(s) => write!(f, "enum string {:?} not in state table", s),
            TypeError::OutOfRange { value, to } => {
                write!(f, "value {} does not fit {:?}", value, to)
            }
            TypeError::MetadataMismatch { envelope } => {
                write!(f, "metadata does not match {:?} envelope", envelope)
            }
        }
    }
}

impl std::error::Error for TypeError {}
