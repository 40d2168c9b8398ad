//! Commands and codec for the EPICS Channel Access protocol.
//!
//! One immutable value type per command, a stream codec that yields
//! commands incrementally with zero-copy payloads, a datagram codec with
//! atomic-datagram semantics, and a role-less sniffing mode for observers
//! (packet captures, the repeater) that must infer direction from header
//! shape.

pub mod codec;
pub mod commands;
pub mod error;
pub mod sniff;

pub use codec::{Parsed, bytes_needed_for_command, read_datagram, read_from_bytestream};
pub use commands::{
    AccessRights, AccessRightsResponse, Beacon, ClearChannelRequest, ClearChannelResponse,
    ClientNameRequest, Command, CreateChFailResponse, CreateChanRequest, CreateChanResponse,
    EchoRequest, EchoResponse, ErrorResponse, EventAddRequest, EventAddResponse,
    EventCancelRequest, EventCancelResponse, EventMask, EventsOffRequest, EventsOnRequest,
    HostNameRequest, NotFoundResponse, ReadNotifyRequest, ReadNotifyResponse, ReadRequest,
    ReadResponse, ReadSyncRequest, RepeaterConfirmResponse, RepeaterRegisterRequest,
    SearchRequest, SearchResponse, ServerDisconnResponse, VersionRequest, VersionResponse,
    WriteNotifyRequest, WriteNotifyResponse, WriteRequest, command_id,
};
pub use error::{ValidationError, ValueError};
pub use sniff::{SniffedCommand, SniffedParsed, read_sniffed_bytestream, read_sniffed_datagram};
