#![doc = include_str!("../README.md")]

// Re-export the layer crates whole, for callers that want the full paths.
pub use calcium_codec as codec;
pub use calcium_dbr as dbr;
pub use calcium_session as session;
pub use calcium_wire as wire;

// Wire primitives and constants
pub use calcium_wire::{
    CA_REPEATER_PORT, CA_SERVER_PORT, DEFAULT_PROTOCOL_VERSION, Direction, EXTENDED_HEADER_SIZE,
    HEADER_SIZE, HeaderBytes, MAX_ENUM_STATES, MAX_ENUM_STRING_SIZE, MAX_PV_NAME_PADDED,
    MAX_STRING_SIZE, MAX_UNITS_SIZE, MIN_BEACON_PERIOD, MINIMUM_PROTOCOL_VERSION, MessageHeader,
    Role, Severity, StatusCode,
};

// The DBR type system
pub use calcium_dbr::{
    AlarmStatus, ControlMeta, ConvertCtx, DbrMetadata, DbrPayload, DbrType, DbrValue, EnumMeta,
    Envelope, EpicsString, GraphicMeta, LimitSet, NativeType, StsackMeta, TimeMeta, TimeStamp,
    TypeError,
};

// Commands and codec
pub use calcium_codec::{
    AccessRights, Command, EventMask, Parsed, SniffedCommand, SniffedParsed, ValidationError,
    ValueError, bytes_needed_for_command, read_datagram, read_from_bytestream,
    read_sniffed_bytestream, read_sniffed_datagram,
};

// Session engines
pub use calcium_session::{
    BeaconBackoff, BroadcastEvent, Broadcaster, ChannelState, CircuitState, ClientChannel,
    EpicsEnv, Error, Repeater, ServerChannel, VirtualCircuit, parse_channel_filter,
    parse_record_field,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use calcium::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Broadcaster, ClientChannel, Command, DbrPayload, DbrType, DbrValue, Error, Role,
        ServerChannel, VirtualCircuit,
    };
    pub use calcium_codec::commands::*;
}
