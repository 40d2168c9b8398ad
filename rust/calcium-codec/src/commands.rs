//! One value type per CA command.
//!
//! Each command is a small immutable record with named logical fields.
//! [`Command::wire`] maps a command onto its header and payload;
//! [`Command::from_wire`] is its inverse, keyed by the sender's role for
//! the command ids shared between requests and responses.

use std::net::{Ipv4Addr, SocketAddr};

use bitflags::bitflags;
use bytes::{Bytes, BytesMut};

use calcium_dbr::{DbrPayload, DbrType, TypeError};
use calcium_wire::{
    Direction, MAX_PV_NAME_PADDED, MessageHeader, Role, SEARCH_DO_REPLY, SEARCH_NO_REPLY,
    string::{padded_len, padded_string_payload, trim_string},
};

use crate::error::{ValidationError, ValueError};

/// Command ids of CA v13.
pub mod command_id {
    pub const VERSION: u16 = 0;
    pub const EVENT_ADD: u16 = 1;
    pub const EVENT_CANCEL: u16 = 2;
    pub const READ: u16 = 3;
    pub const WRITE: u16 = 4;
    pub const SEARCH: u16 = 6;
    pub const EVENTS_OFF: u16 = 8;
    pub const EVENTS_ON: u16 = 9;
    pub const READ_SYNC: u16 = 10;
    pub const ERROR: u16 = 11;
    pub const CLEAR_CHANNEL: u16 = 12;
    pub const BEACON: u16 = 13;
    pub const NOT_FOUND: u16 = 14;
    pub const READ_NOTIFY: u16 = 15;
    pub const REPEATER_CONFIRM: u16 = 17;
    pub const CREATE_CHAN: u16 = 18;
    pub const WRITE_NOTIFY: u16 = 19;
    pub const CLIENT_NAME: u16 = 20;
    pub const HOST_NAME: u16 = 21;
    pub const ACCESS_RIGHTS: u16 = 22;
    pub const ECHO: u16 = 23;
    pub const REPEATER_REGISTER: u16 = 24;
    pub const CREATE_CH_FAIL: u16 = 25;
    pub const SERVER_DISCONN: u16 = 26;
}

bitflags! {
    /// Subscription event selection mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u16 {
        const VALUE = 0x01;
        const LOG = 0x02;
        const ALARM = 0x04;
        const PROPERTY = 0x08;
    }
}

bitflags! {
    /// Channel access rights as granted by the server.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct AccessRights: u32 {
        const READ = 0x01;
        const WRITE = 0x02;
    }
}

fn validate_pv_name(name: &str) -> Result<(), ValueError> {
    let padded = padded_len(name.len() + 1);
    if padded > MAX_PV_NAME_PADDED {
        return Err(ValueError::NameTooLong {
            name: name.to_string(),
            padded,
        });
    }
    Ok(())
}

// =============================================================================
// UDP commands
// =============================================================================

/// Version handshake, also the mandatory head of a search datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRequest {
    pub priority: u16,
    pub version: u16,
}

impl VersionRequest {
    pub fn new(priority: u16, version: u16) -> Result<VersionRequest, ValueError> {
        if priority > 99 {
            return Err(ValueError::PriorityOutOfRange(priority));
        }
        Ok(VersionRequest { priority, version })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionResponse {
    pub version: u16,
}

impl VersionResponse {
    pub fn new(version: u16) -> VersionResponse {
        VersionResponse { version }
    }
}

/// Name resolution request, broadcast after a VersionRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub name: String,
    pub cid: u32,
    pub version: u16,
    /// `SEARCH_NO_REPLY` (answer only on success) or `SEARCH_DO_REPLY`.
    pub reply: u16,
}

impl SearchRequest {
    pub fn new(name: &str, cid: u32, version: u16) -> Result<SearchRequest, ValueError> {
        SearchRequest::with_reply_flag(name, cid, version, SEARCH_NO_REPLY)
    }

    pub fn with_reply_flag(
        name: &str,
        cid: u32,
        version: u16,
        reply: u16,
    ) -> Result<SearchRequest, ValueError> {
        validate_pv_name(name)?;
        if reply != SEARCH_NO_REPLY && reply != SEARCH_DO_REPLY {
            return Err(ValueError::BadReplyFlag(reply));
        }
        Ok(SearchRequest {
            name: name.to_string(),
            cid,
            version,
            reply,
        })
    }
}

/// A positive search answer.
///
/// `ip == None` encodes the `0xFFFFFFFF` sentinel: the client must use the
/// datagram's source address. `sender_address` is attached when parsed off
/// the wire and ignored by equality.
#[derive(Debug, Clone, Copy, Eq)]
pub struct SearchResponse {
    pub port: u16,
    pub ip: Option<Ipv4Addr>,
    pub cid: u32,
    pub version: u16,
    pub sender_address: Option<SocketAddr>,
}

impl SearchResponse {
    pub fn new(port: u16, ip: Option<Ipv4Addr>, cid: u32, version: u16) -> SearchResponse {
        SearchResponse {
            port,
            ip,
            cid,
            version,
            sender_address: None,
        }
    }

    /// The server address this response points at.
    pub fn server_address(&self) -> Option<SocketAddr> {
        match self.ip {
            Some(ip) => Some(SocketAddr::new(ip.into(), self.port)),
            None => self
                .sender_address
                .map(|source| SocketAddr::new(source.ip(), self.port)),
        }
    }
}

impl PartialEq for SearchResponse {
    fn eq(&self, other: &Self) -> bool {
        (self.port, self.ip, self.cid, self.version)
            == (other.port, other.ip, other.cid, other.version)
    }
}

/// Negative search answer, only sent when the request had DO_REPLY set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotFoundResponse {
    pub version: u16,
    pub cid: u32,
}

/// Server heartbeat. `sender_address` is attached when parsed off the wire
/// and ignored by equality.
#[derive(Debug, Clone, Copy, Eq)]
pub struct Beacon {
    pub version: u16,
    pub server_port: u16,
    pub beacon_id: u32,
    pub address: Ipv4Addr,
    pub sender_address: Option<SocketAddr>,
}

impl Beacon {
    pub fn new(version: u16, server_port: u16, beacon_id: u32, address: Ipv4Addr) -> Beacon {
        Beacon {
            version,
            server_port,
            beacon_id,
            address,
            sender_address: None,
        }
    }

    /// The host the beacon speaks for: the encoded address, unless it is
    /// unspecified, then the datagram source.
    pub fn server_ip(&self) -> Option<Ipv4Addr> {
        if !self.address.is_unspecified() {
            return Some(self.address);
        }
        match self.sender_address {
            Some(SocketAddr::V4(v4)) => Some(*v4.ip()),
            _ => None,
        }
    }
}

impl PartialEq for Beacon {
    fn eq(&self, other: &Self) -> bool {
        (self.version, self.server_port, self.beacon_id, self.address)
            == (other.version, other.server_port, other.beacon_id, other.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeaterRegisterRequest {
    pub client_address: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeaterConfirmResponse {
    pub repeater_address: Ipv4Addr,
}

// =============================================================================
// TCP commands
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventsOffRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventsOnRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSyncRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostNameRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientNameRequest {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRightsResponse {
    pub cid: u32,
    pub access_rights: AccessRights,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateChanRequest {
    pub name: String,
    pub cid: u32,
    pub version: u16,
}

impl CreateChanRequest {
    pub fn new(name: &str, cid: u32, version: u16) -> Result<CreateChanRequest, ValueError> {
        validate_pv_name(name)?;
        Ok(CreateChanRequest {
            name: name.to_string(),
            cid,
            version,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateChanResponse {
    pub data_type: DbrType,
    pub data_count: u32,
    pub cid: u32,
    pub sid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateChFailResponse {
    pub cid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerDisconnResponse {
    pub cid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearChannelRequest {
    pub sid: u32,
    pub cid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearChannelResponse {
    pub sid: u32,
    pub cid: u32,
}

/// The server's report of a protocol-level problem, citing the request
/// that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub original_request: MessageHeader,
    pub cid: u32,
    /// Status value with severity bits.
    pub status: u16,
    pub error_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub data_type: DbrType,
    pub data_count: u32,
    pub sid: u32,
    pub ioid: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadResponse {
    pub data: Bytes,
    pub data_type: DbrType,
    pub data_count: u32,
    pub sid: u32,
    pub ioid: u32,
}

impl ReadResponse {
    pub fn new(payload: &DbrPayload, sid: u32, ioid: u32) -> Result<ReadResponse, ValueError> {
        Ok(ReadResponse {
            data: payload.to_bytes()?,
            data_type: payload.dbr_type,
            data_count: payload.data_count(),
            sid,
            ioid,
        })
    }

    pub fn dbr_payload(&self) -> Result<DbrPayload, TypeError> {
        DbrPayload::parse(self.data_type, self.data_count, &self.data)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub data: Bytes,
    pub data_type: DbrType,
    pub data_count: u32,
    pub sid: u32,
    pub ioid: u32,
}

impl WriteRequest {
    pub fn new(payload: &DbrPayload, sid: u32, ioid: u32) -> Result<WriteRequest, ValueError> {
        Ok(WriteRequest {
            data: payload.to_bytes()?,
            data_type: payload.dbr_type,
            data_count: payload.data_count(),
            sid,
            ioid,
        })
    }

    pub fn dbr_payload(&self) -> Result<DbrPayload, TypeError> {
        DbrPayload::parse(self.data_type, self.data_count, &self.data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadNotifyRequest {
    pub data_type: DbrType,
    pub data_count: u32,
    pub sid: u32,
    pub ioid: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadNotifyResponse {
    pub data: Bytes,
    pub data_type: DbrType,
    pub data_count: u32,
    /// Status value with severity bits.
    pub status: u32,
    pub ioid: u32,
}

impl ReadNotifyResponse {
    pub fn new(
        payload: &DbrPayload,
        status: u32,
        ioid: u32,
    ) -> Result<ReadNotifyResponse, ValueError> {
        Ok(ReadNotifyResponse {
            data: payload.to_bytes()?,
            data_type: payload.dbr_type,
            data_count: payload.data_count(),
            status,
            ioid,
        })
    }

    pub fn dbr_payload(&self) -> Result<DbrPayload, TypeError> {
        DbrPayload::parse(self.data_type, self.data_count, &self.data)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteNotifyRequest {
    pub data: Bytes,
    pub data_type: DbrType,
    pub data_count: u32,
    pub sid: u32,
    pub ioid: u32,
}

impl WriteNotifyRequest {
    pub fn new(
        payload: &DbrPayload,
        sid: u32,
        ioid: u32,
    ) -> Result<WriteNotifyRequest, ValueError> {
        Ok(WriteNotifyRequest {
            data: payload.to_bytes()?,
            data_type: payload.dbr_type,
            data_count: payload.data_count(),
            sid,
            ioid,
        })
    }

    pub fn dbr_payload(&self) -> Result<DbrPayload, TypeError> {
        DbrPayload::parse(self.data_type, self.data_count, &self.data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteNotifyResponse {
    pub data_type: DbrType,
    pub data_count: u32,
    /// Status value with severity bits.
    pub status: u32,
    pub ioid: u32,
}

/// Open a subscription. The deadband floats and the mask travel in a
/// fixed 16-byte payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventAddRequest {
    pub data_type: DbrType,
    pub data_count: u32,
    pub sid: u32,
    pub subscriptionid: u32,
    pub low: f32,
    pub high: f32,
    pub to: f32,
    pub mask: EventMask,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventAddResponse {
    pub data: Bytes,
    pub data_type: DbrType,
    pub data_count: u32,
    /// Status value with severity bits.
    pub status: u32,
    pub subscriptionid: u32,
}

impl EventAddResponse {
    pub fn new(
        payload: &DbrPayload,
        status: u32,
        subscriptionid: u32,
    ) -> Result<EventAddResponse, ValueError> {
        Ok(EventAddResponse {
            data: payload.to_bytes()?,
            data_type: payload.dbr_type,
            data_count: payload.data_count(),
            status,
            subscriptionid,
        })
    }

    pub fn dbr_payload(&self) -> Result<DbrPayload, TypeError> {
        DbrPayload::parse(self.data_type, self.data_count, &self.data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventCancelRequest {
    pub data_type: DbrType,
    pub data_count: u32,
    pub sid: u32,
    pub subscriptionid: u32,
}

/// Subscription-cancel confirmation. Coded on the wire with the EventAdd
/// id and an empty payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventCancelResponse {
    pub data_type: DbrType,
    pub sid: u32,
    pub subscriptionid: u32,
}

// =============================================================================
// The command sum type
// =============================================================================

/// Any CA command, plus the local `Disconnected` sentinel yielded by
/// `recv()` after peer close (never serialized to the wire).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    VersionRequest(VersionRequest),
    VersionResponse(VersionResponse),
    SearchRequest(SearchRequest),
    SearchResponse(SearchResponse),
    NotFoundResponse(NotFoundResponse),
    Beacon(Beacon),
    RepeaterRegisterRequest(RepeaterRegisterRequest),
    RepeaterConfirmResponse(RepeaterConfirmResponse),
    EchoRequest(EchoRequest),
    EchoResponse(EchoResponse),
    EventsOffRequest(EventsOffRequest),
    EventsOnRequest(EventsOnRequest),
    ReadSyncRequest(ReadSyncRequest),
    HostNameRequest(HostNameRequest),
    ClientNameRequest(ClientNameRequest),
    AccessRightsResponse(AccessRightsResponse),
    CreateChanRequest(CreateChanRequest),
    CreateChanResponse(CreateChanResponse),
    CreateChFailResponse(CreateChFailResponse),
    ServerDisconnResponse(ServerDisconnResponse),
    ClearChannelRequest(ClearChannelRequest),
    ClearChannelResponse(ClearChannelResponse),
    ErrorResponse(ErrorResponse),
    ReadRequest(ReadRequest),
    ReadResponse(ReadResponse),
    WriteRequest(WriteRequest),
    ReadNotifyRequest(ReadNotifyRequest),
    ReadNotifyResponse(ReadNotifyResponse),
    WriteNotifyRequest(WriteNotifyRequest),
    WriteNotifyResponse(WriteNotifyResponse),
    EventAddRequest(EventAddRequest),
    EventAddResponse(EventAddResponse),
    EventCancelRequest(EventCancelRequest),
    EventCancelResponse(EventCancelResponse),
    Disconnected,
}

macro_rules! command_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Command {
                fn from(c: $variant) -> Command {
                    Command::$variant(c)
                }
            }
        )*
    };
}

command_from!(
    VersionRequest,
    VersionResponse,
    SearchRequest,
    SearchResponse,
    NotFoundResponse,
    Beacon,
    RepeaterRegisterRequest,
    RepeaterConfirmResponse,
    EchoRequest,
    EchoResponse,
    EventsOffRequest,
    EventsOnRequest,
    ReadSyncRequest,
    HostNameRequest,
    ClientNameRequest,
    AccessRightsResponse,
    CreateChanRequest,
    CreateChanResponse,
    CreateChFailResponse,
    ServerDisconnResponse,
    ClearChannelRequest,
    ClearChannelResponse,
    ErrorResponse,
    ReadRequest,
    ReadResponse,
    WriteRequest,
    ReadNotifyRequest,
    ReadNotifyResponse,
    WriteNotifyRequest,
    WriteNotifyResponse,
    EventAddRequest,
    EventAddResponse,
    EventCancelRequest,
    EventCancelResponse,
);

impl Command {
    /// REQUEST or RESPONSE. The Disconnected sentinel reads as a response
    /// (it stands in for something the peer did).
    pub fn direction(&self) -> Direction {
        match self {
            Command::VersionRequest(_)
            | Command::SearchRequest(_)
            | Command::RepeaterRegisterRequest(_)
            | Command::EchoRequest(_)
            | Command::EventsOffRequest(_)
            | Command::EventsOnRequest(_)
            | Command::ReadSyncRequest(_)
            | Command::HostNameRequest(_)
            | Command::ClientNameRequest(_)
            | Command::CreateChanRequest(_)
            | Command::ClearChannelRequest(_)
            | Command::ReadRequest(_)
            | Command::WriteRequest(_)
            | Command::ReadNotifyRequest(_)
            | Command::WriteNotifyRequest(_)
            | Command::EventAddRequest(_)
            | Command::EventCancelRequest(_) => Direction::Request,
            _ => Direction::Response,
        }
    }

    /// The role that sends this command. `None` for EchoRequest, which is
    /// legal from either side.
    pub fn sender_role(&self) -> Option<Role> {
        match self {
            Command::EchoRequest(_) | Command::EchoResponse(_) => None,
            _ => match self.direction() {
                Direction::Request => Some(Role::Client),
                Direction::Response => Some(Role::Server),
            },
        }
    }

    pub fn has_payload(&self) -> bool {
        matches!(
            self,
            Command::SearchRequest(_)
                | Command::SearchResponse(_)
                | Command::HostNameRequest(_)
                | Command::ClientNameRequest(_)
                | Command::CreateChanRequest(_)
                | Command::ErrorResponse(_)
                | Command::ReadResponse(_)
                | Command::WriteRequest(_)
                | Command::ReadNotifyResponse(_)
                | Command::WriteNotifyRequest(_)
                | Command::EventAddRequest(_)
                | Command::EventAddResponse(_)
        )
    }

    /// Header and payload for the wire. `None` for the Disconnected
    /// sentinel, which has no wire form.
    pub fn wire(&self) -> Option<(MessageHeader, Option<Bytes>)> {
        use command_id::*;
        let (header, payload) = match self {
            Command::VersionRequest(c) => (
                MessageHeader::new(VERSION, 0, c.priority, c.version as u32, 0, 0),
                None,
            ),
            Command::VersionResponse(c) => (
                MessageHeader::new(VERSION, 0, 1, c.version as u32, 0, 0),
                None,
            ),
            Command::SearchRequest(c) => {
                let payload = padded_string_payload(c.name.as_bytes());
                (
                    MessageHeader::new(
                        SEARCH,
                        payload.len() as u32,
                        c.reply,
                        c.version as u32,
                        c.cid,
                        c.cid,
                    ),
                    Some(payload),
                )
            }
            Command::SearchResponse(c) => {
                let mut payload = BytesMut::zeroed(8);
                payload[0..2].copy_from_slice(&c.version.to_be_bytes());
                let ip = c.ip.map(u32::from).unwrap_or(0xFFFF_FFFF);
                (
                    MessageHeader::new(SEARCH, 8, c.port, 0, ip, c.cid),
                    Some(payload.freeze()),
                )
            }
            Command::NotFoundResponse(c) => (
                MessageHeader::new(
                    NOT_FOUND,
                    0,
                    SEARCH_DO_REPLY,
                    c.version as u32,
                    c.cid,
                    c.cid,
                ),
                None,
            ),
            Command::Beacon(c) => (
                MessageHeader::new(
                    BEACON,
                    0,
                    c.version,
                    c.server_port as u32,
                    c.beacon_id,
                    c.address.into(),
                ),
                None,
            ),
            Command::RepeaterRegisterRequest(c) => (
                MessageHeader::new(REPEATER_REGISTER, 0, 0, 0, 0, c.client_address.into()),
                None,
            ),
            Command::RepeaterConfirmResponse(c) => (
                MessageHeader::new(REPEATER_CONFIRM, 0, 0, 0, 0, c.repeater_address.into()),
                None,
            ),
            Command::EchoRequest(_) | Command::EchoResponse(_) => {
                (MessageHeader::new(ECHO, 0, 0, 0, 0, 0), None)
            }
            Command::EventsOffRequest(_) => (MessageHeader::new(EVENTS_OFF, 0, 0, 0, 0, 0), None),
            Command::EventsOnRequest(_) => (MessageHeader::new(EVENTS_ON, 0, 0, 0, 0, 0), None),
            Command::ReadSyncRequest(_) => (MessageHeader::new(READ_SYNC, 0, 0, 0, 0, 0), None),
            Command::HostNameRequest(c) => {
                let payload = padded_string_payload(c.name.as_bytes());
                (
                    MessageHeader::new(HOST_NAME, payload.len() as u32, 0, 0, 0, 0),
                    Some(payload),
                )
            }
            Command::ClientNameRequest(c) => {
                let payload = padded_string_payload(c.name.as_bytes());
                (
                    MessageHeader::new(CLIENT_NAME, payload.len() as u32, 0, 0, 0, 0),
                    Some(payload),
                )
            }
            Command::AccessRightsResponse(c) => (
                MessageHeader::new(ACCESS_RIGHTS, 0, 0, 0, c.cid, c.access_rights.bits()),
                None,
            ),
            Command::CreateChanRequest(c) => {
                let payload = padded_string_payload(c.name.as_bytes());
                (
                    MessageHeader::new(
                        CREATE_CHAN,
                        payload.len() as u32,
                        0,
                        0,
                        c.cid,
                        c.version as u32,
                    ),
                    Some(payload),
                )
            }
            Command::CreateChanResponse(c) => (
                MessageHeader::new(
                    CREATE_CHAN,
                    0,
                    c.data_type.into(),
                    c.data_count,
                    c.cid,
                    c.sid,
                ),
                None,
            ),
            Command::CreateChFailResponse(c) => {
                (MessageHeader::new(CREATE_CH_FAIL, 0, 0, 0, c.cid, 0), None)
            }
            Command::ServerDisconnResponse(c) => {
                (MessageHeader::new(SERVER_DISCONN, 0, 0, 0, c.cid, 0), None)
            }
            Command::ClearChannelRequest(c) => (
                MessageHeader::new(CLEAR_CHANNEL, 0, 0, 0, c.sid, c.cid),
                None,
            ),
            Command::ClearChannelResponse(c) => (
                MessageHeader::new(CLEAR_CHANNEL, 0, 0, 0, c.sid, c.cid),
                None,
            ),
            Command::ErrorResponse(c) => {
                let header_bytes = c.original_request.to_wire();
                let message = padded_string_payload(c.error_message.as_bytes());
                let mut payload = BytesMut::with_capacity(header_bytes.len() + message.len());
                payload.extend_from_slice(header_bytes.as_slice());
                payload.extend_from_slice(&message);
                (
                    MessageHeader::new(
                        ERROR,
                        payload.len() as u32,
                        0,
                        0,
                        c.cid,
                        c.status as u32,
                    ),
                    Some(payload.freeze()),
                )
            }
            Command::ReadRequest(c) => (
                MessageHeader::new(
                    READ,
                    0,
                    c.data_type.into(),
                    c.data_count,
                    c.sid,
                    c.ioid,
                ),
                None,
            ),
            Command::ReadResponse(c) => (
                MessageHeader::new(
                    READ,
                    c.data.len() as u32,
                    c.data_type.into(),
                    c.data_count,
                    c.sid,
                    c.ioid,
                ),
                Some(c.data.clone()),
            ),
            Command::WriteRequest(c) => (
                MessageHeader::new(
                    WRITE,
                    c.data.len() as u32,
                    c.data_type.into(),
                    c.data_count,
                    c.sid,
                    c.ioid,
                ),
                Some(c.data.clone()),
            ),
            Command::ReadNotifyRequest(c) => (
                MessageHeader::new(
                    READ_NOTIFY,
                    0,
                    c.data_type.into(),
                    c.data_count,
                    c.sid,
                    c.ioid,
                ),
                None,
            ),
            Command::ReadNotifyResponse(c) => (
                MessageHeader::new(
                    READ_NOTIFY,
                    c.data.len() as u32,
                    c.data_type.into(),
                    c.data_count,
                    c.status,
                    c.ioid,
                ),
                Some(c.data.clone()),
            ),
            Command::WriteNotifyRequest(c) => (
                MessageHeader::new(
                    WRITE_NOTIFY,
                    c.data.len() as u32,
                    c.data_type.into(),
                    c.data_count,
                    c.sid,
                    c.ioid,
                ),
                Some(c.data.clone()),
            ),
            Command::WriteNotifyResponse(c) => (
                MessageHeader::new(
                    WRITE_NOTIFY,
                    0,
                    c.data_type.into(),
                    c.data_count,
                    c.status,
                    c.ioid,
                ),
                None,
            ),
            Command::EventAddRequest(c) => {
                let mut payload = BytesMut::with_capacity(16);
                payload.extend_from_slice(&c.low.to_be_bytes());
                payload.extend_from_slice(&c.high.to_be_bytes());
                payload.extend_from_slice(&c.to.to_be_bytes());
                payload.extend_from_slice(&c.mask.bits().to_be_bytes());
                payload.extend_from_slice(&[0, 0]);
                (
                    MessageHeader::new(
                        EVENT_ADD,
                        16,
                        c.data_type.into(),
                        c.data_count,
                        c.sid,
                        c.subscriptionid,
                    ),
                    Some(payload.freeze()),
                )
            }
            Command::EventAddResponse(c) => (
                MessageHeader::new(
                    EVENT_ADD,
                    c.data.len() as u32,
                    c.data_type.into(),
                    c.data_count,
                    c.status,
                    c.subscriptionid,
                ),
                Some(c.data.clone()),
            ),
            Command::EventCancelRequest(c) => (
                MessageHeader::new(
                    EVENT_CANCEL,
                    0,
                    c.data_type.into(),
                    c.data_count,
                    c.sid,
                    c.subscriptionid,
                ),
                None,
            ),
            Command::EventCancelResponse(c) => (
                MessageHeader::new(
                    EVENT_ADD,
                    0,
                    c.data_type.into(),
                    0,
                    c.sid,
                    c.subscriptionid,
                ),
                None,
            ),
            Command::Disconnected => return None,
        };
        Some((header, payload))
    }

    /// One contiguous buffer of header plus payload. Empty for the
    /// Disconnected sentinel.
    pub fn to_bytes(&self) -> Bytes {
        match self.wire() {
            Some((header, payload)) => {
                let wire = header.to_wire();
                let payload = payload.unwrap_or_default();
                let mut buf = BytesMut::with_capacity(wire.len() + payload.len());
                buf.extend_from_slice(wire.as_slice());
                buf.extend_from_slice(&payload);
                buf.freeze()
            }
            None => Bytes::new(),
        }
    }

    /// Decode a command from its parsed header and exactly
    /// `header.payload_size` bytes of payload, as sent by `sender`.
    pub fn from_wire(
        header: &MessageHeader,
        payload: Bytes,
        sender: Role,
        sender_address: Option<SocketAddr>,
    ) -> Result<Command, ValidationError> {
        use command_id::*;

        let dbr_type = || DbrType::try_from(header.data_type).map_err(ValidationError::from);
        // The payload must hold what data_type x data_count promises.
        let check_data = |dbr: DbrType| {
            let needed = dbr.metadata_size() + dbr.element_size() * header.data_count as usize;
            if payload.len() < needed {
                Err(ValidationError::PayloadTooShort {
                    needed,
                    got: payload.len(),
                })
            } else {
                Ok(())
            }
        };
        let payload_string = || String::from_utf8_lossy(trim_string(&payload)).into_owned();

        let command = match (header.command, sender) {
            (VERSION, Role::Client) => Command::VersionRequest(VersionRequest {
                priority: header.data_type,
                version: header.data_count as u16,
            }),
            (VERSION, Role::Server) => Command::VersionResponse(VersionResponse {
                version: header.data_count as u16,
            }),
            (SEARCH, Role::Client) => Command::SearchRequest(SearchRequest {
                name: payload_string(),
                cid: header.parameter1,
                version: header.data_count as u16,
                reply: header.data_type,
            }),
            (SEARCH, Role::Server) => {
                let version = if payload.len() >= 2 {
                    u16::from_be_bytes([payload[0], payload[1]])
                } else {
                    0
                };
                Command::SearchResponse(SearchResponse {
                    port: header.data_type,
                    ip: (header.parameter1 != 0xFFFF_FFFF)
                        .then(|| Ipv4Addr::from(header.parameter1)),
                    cid: header.parameter2,
                    version,
                    sender_address,
                })
            }
            (NOT_FOUND, Role::Server) => Command::NotFoundResponse(NotFoundResponse {
                version: header.data_count as u16,
                cid: header.parameter1,
            }),
            (BEACON, Role::Server) => Command::Beacon(Beacon {
                version: header.data_type,
                server_port: header.data_count as u16,
                beacon_id: header.parameter1,
                address: Ipv4Addr::from(header.parameter2),
                sender_address,
            }),
            (REPEATER_REGISTER, Role::Client) => {
                Command::RepeaterRegisterRequest(RepeaterRegisterRequest {
                    client_address: Ipv4Addr::from(header.parameter2),
                })
            }
            (REPEATER_CONFIRM, Role::Server) => {
                Command::RepeaterConfirmResponse(RepeaterConfirmResponse {
                    repeater_address: Ipv4Addr::from(header.parameter2),
                })
            }
            (ECHO, Role::Client) => Command::EchoRequest(EchoRequest),
            (ECHO, Role::Server) => Command::EchoResponse(EchoResponse),
            (EVENTS_OFF, Role::Client) => Command::EventsOffRequest(EventsOffRequest),
            (EVENTS_ON, Role::Client) => Command::EventsOnRequest(EventsOnRequest),
            (READ_SYNC, Role::Client) => Command::ReadSyncRequest(ReadSyncRequest),
            (HOST_NAME, Role::Client) => Command::HostNameRequest(HostNameRequest {
                name: payload_string(),
            }),
            (CLIENT_NAME, Role::Client) => Command::ClientNameRequest(ClientNameRequest {
                name: payload_string(),
            }),
            (ACCESS_RIGHTS, Role::Server) => Command::AccessRightsResponse(AccessRightsResponse {
                cid: header.parameter1,
                access_rights: AccessRights::from_bits_truncate(header.parameter2),
            }),
            (CREATE_CHAN, Role::Client) => Command::CreateChanRequest(CreateChanRequest {
                name: payload_string(),
                cid: header.parameter1,
                version: header.parameter2 as u16,
            }),
            (CREATE_CHAN, Role::Server) => Command::CreateChanResponse(CreateChanResponse {
                data_type: dbr_type()?,
                data_count: header.data_count,
                cid: header.parameter1,
                sid: header.parameter2,
            }),
            (CREATE_CH_FAIL, Role::Server) => {
                Command::CreateChFailResponse(CreateChFailResponse {
                    cid: header.parameter1,
                })
            }
            (SERVER_DISCONN, Role::Server) => {
                Command::ServerDisconnResponse(ServerDisconnResponse {
                    cid: header.parameter1,
                })
            }
            (CLEAR_CHANNEL, Role::Client) => Command::ClearChannelRequest(ClearChannelRequest {
                sid: header.parameter1,
                cid: header.parameter2,
            }),
            (CLEAR_CHANNEL, Role::Server) => {
                Command::ClearChannelResponse(ClearChannelResponse {
                    sid: header.parameter1,
                    cid: header.parameter2,
                })
            }
            (ERROR, Role::Server) => {
                let (original, used) =
                    MessageHeader::parse(&payload).map_err(|_| ValidationError::BadErrorPayload)?;
                let message =
                    String::from_utf8_lossy(trim_string(&payload[used..])).into_owned();
                Command::ErrorResponse(ErrorResponse {
                    original_request: original,
                    cid: header.parameter1,
                    status: header.parameter2 as u16,
                    error_message: message,
                })
            }
            (READ, Role::Client) => Command::ReadRequest(ReadRequest {
                data_type: dbr_type()?,
                data_count: header.data_count,
                sid: header.parameter1,
                ioid: header.parameter2,
            }),
            (READ, Role::Server) => {
                let dbr = dbr_type()?;
                check_data(dbr)?;
                Command::ReadResponse(ReadResponse {
                    data: payload.clone(),
                    data_type: dbr,
                    data_count: header.data_count,
                    sid: header.parameter1,
                    ioid: header.parameter2,
                })
            }
            (WRITE, Role::Client) => {
                let dbr = dbr_type()?;
                check_data(dbr)?;
                Command::WriteRequest(WriteRequest {
                    data: payload.clone(),
                    data_type: dbr,
                    data_count: header.data_count,
                    sid: header.parameter1,
                    ioid: header.parameter2,
                })
            }
            (READ_NOTIFY, Role::Client) => Command::ReadNotifyRequest(ReadNotifyRequest {
                data_type: dbr_type()?,
                data_count: header.data_count,
                sid: header.parameter1,
                ioid: header.parameter2,
            }),
            (READ_NOTIFY, Role::Server) => {
                let dbr = dbr_type()?;
                check_data(dbr)?;
                Command::ReadNotifyResponse(ReadNotifyResponse {
                    data: payload.clone(),
                    data_type: dbr,
                    data_count: header.data_count,
                    status: header.parameter1,
                    ioid: header.parameter2,
                })
            }
            (WRITE_NOTIFY, Role::Client) => {
                let dbr = dbr_type()?;
                check_data(dbr)?;
                Command::WriteNotifyRequest(WriteNotifyRequest {
                    data: payload.clone(),
                    data_type: dbr,
                    data_count: header.data_count,
                    sid: header.parameter1,
                    ioid: header.parameter2,
                })
            }
            (WRITE_NOTIFY, Role::Server) => {
                Command::WriteNotifyResponse(WriteNotifyResponse {
                    data_type: dbr_type()?,
                    data_count: header.data_count,
                    status: header.parameter1,
                    ioid: header.parameter2,
                })
            }
            (EVENT_ADD, Role::Client) => {
                if payload.len() != 16 {
                    return Err(ValidationError::BadPayloadSize {
                        expected: 16,
                        got: payload.len(),
                    });
                }
                Command::EventAddRequest(EventAddRequest {
                    data_type: dbr_type()?,
                    data_count: header.data_count,
                    sid: header.parameter1,
                    subscriptionid: header.parameter2,
                    low: f32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                    high: f32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
                    to: f32::from_be_bytes([payload[8], payload[9], payload[10], payload[11]]),
                    mask: EventMask::from_bits_truncate(u16::from_be_bytes([
                        payload[12],
                        payload[13],
                    ])),
                })
            }
            (EVENT_ADD, Role::Server) => {
                // An empty EventAdd from the server confirms a cancel.
                if header.payload_size == 0 && header.data_count == 0 {
                    Command::EventCancelResponse(EventCancelResponse {
                        data_type: dbr_type()?,
                        sid: header.parameter1,
                        subscriptionid: header.parameter2,
                    })
                } else {
                    let dbr = dbr_type()?;
                    check_data(dbr)?;
                    Command::EventAddResponse(EventAddResponse {
                        data: payload.clone(),
                        data_type: dbr,
                        data_count: header.data_count,
                        status: header.parameter1,
                        subscriptionid: header.parameter2,
                    })
                }
            }
            (EVENT_CANCEL, Role::Client) => Command::EventCancelRequest(EventCancelRequest {
                data_type: dbr_type()?,
                data_count: header.data_count,
                sid: header.parameter1,
                subscriptionid: header.parameter2,
            }),
            (id, sender) => return Err(ValidationError::UnknownCommand { id, sender }),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcium_dbr::DbrValue;
    use calcium_wire::DEFAULT_PROTOCOL_VERSION;

    #[test]
    fn priority_range_enforced() {
        assert!(VersionRequest::new(99, DEFAULT_PROTOCOL_VERSION).is_ok());
        assert!(matches!(
            VersionRequest::new(100, DEFAULT_PROTOCOL_VERSION),
            Err(ValueError::PriorityOutOfRange(100))
        ));
    }

    #[test]
    fn pv_name_limit_enforced() {
        // 39 chars pad to 40: fine. 40 chars pad to 48: too long.
        assert!(SearchRequest::new(&"a".repeat(39), 0, 13).is_ok());
        assert!(SearchRequest::new(&"a".repeat(40), 0, 13).is_err());
        assert!(CreateChanRequest::new(&"a".repeat(40), 0, 13).is_err());
    }

    #[test]
    fn search_response_address_resolution() {
        let mut explicit = SearchResponse::new(5064, Some(Ipv4Addr::new(1, 2, 3, 4)), 0, 13);
        explicit.sender_address = Some("5.6.7.8:5064".parse().unwrap());
        assert_eq!(
            explicit.server_address(),
            Some("1.2.3.4:5064".parse().unwrap())
        );

        let mut sentinel = SearchResponse::new(5064, None, 0, 13);
        sentinel.sender_address = Some("5.6.7.8:5064".parse().unwrap());
        assert_eq!(
            sentinel.server_address(),
            Some("5.6.7.8:5064".parse().unwrap())
        );
    }

    #[test]
    fn echo_is_all_zero() {
        let bytes = Command::EchoRequest(EchoRequest).to_bytes();
        assert_eq!(bytes.as_ref(), &[0u8; 16]);
    }

    #[test]
    fn event_cancel_response_uses_the_event_add_id() {
        let cancel = Command::EventCancelResponse(EventCancelResponse {
            data_type: DbrType::Double,
            sid: 1,
            subscriptionid: 7,
        });
        let (header, payload) = cancel.wire().unwrap();
        assert_eq!(header.command, command_id::EVENT_ADD);
        assert_eq!(header.payload_size, 0);
        assert_eq!(header.data_count, 0);
        assert!(payload.is_none());
    }

    #[test]
    fn payload_consistency_checked_on_parse() {
        // Claims two doubles but carries eight bytes.
        let header = MessageHeader::new(command_id::READ_NOTIFY, 8, 6, 2, 1, 0);
        let err =
            Command::from_wire(&header, Bytes::from_static(&[0u8; 8]), Role::Server, None)
                .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::PayloadTooShort { needed: 16, got: 8 }
        ));
    }

    #[test]
    fn disconnected_has_no_wire_form() {
        assert!(Command::Disconnected.wire().is_none());
        assert!(Command::Disconnected.to_bytes().is_empty());
    }

    #[test]
    fn write_request_payload_roundtrip() {
        let payload = DbrPayload::plain(DbrValue::Long(vec![4])).unwrap();
        let req = WriteRequest::new(&payload, 42, 13).unwrap();
        assert_eq!(req.data_count, 1);
        assert_eq!(req.dbr_payload().unwrap(), payload);
    }
}
