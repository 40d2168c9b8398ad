//! Role-less command inference, for observers that see traffic without
//! knowing which endpoint is which (packet captures, the repeater).
//!
//! Most ids only ever travel one way and identify their sender outright.
//! The shared ids are told apart by header shape. Three observations stay
//! honestly ambiguous and get dedicated variants instead of a guess.

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};

use calcium_wire::{MessageHeader, Role};

use crate::commands::{Command, command_id};
use crate::error::ValidationError;

/// Outcome of inferring a command without role knowledge.
#[derive(Debug, Clone, PartialEq)]
pub enum SniffedCommand {
    Known(Command),
    /// EventAdd with a 16-byte payload and a small parameter1: a request's
    /// deadband block and a response carrying 16 data bytes look alike.
    EventAddRequestOrResponse {
        header: MessageHeader,
        payload: Bytes,
    },
    /// Echo bytes are identical in both directions.
    EchoRequestOrResponse,
    /// ClearChannel bytes are identical in both directions.
    ClearChannelRequestOrResponse { sid: u32, cid: u32 },
}

/// Result of one attempt to pull a sniffed command off a stream buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum SniffedParsed {
    Command(SniffedCommand),
    NeedData(usize),
}

enum Inference {
    From(Role),
    EventAddAmbiguous,
    EchoAmbiguous,
    ClearChannelAmbiguous,
}

/// The exhaustive inference table.
fn infer_sender(header: &MessageHeader) -> Result<Inference, ValidationError> {
    use Inference::*;
    use command_id::*;
    Ok(match header.command {
        VERSION => match header.parameter1 {
            0 => From(Role::Client),
            1 => From(Role::Server),
            _ => {
                return Err(ValidationError::UnidentifiableCommand {
                    id: header.command,
                });
            }
        },
        SEARCH => {
            if header.payload_size == 0 || (header.payload_size == 8 && header.data_count == 0) {
                From(Role::Server)
            } else {
                From(Role::Client)
            }
        }
        EVENT_ADD => {
            if header.payload_size == 0 && header.data_count == 0 {
                // EventCancelResponse, coded with this id.
                From(Role::Server)
            } else if header.payload_size == 16 {
                if header.parameter1 > 60 {
                    From(Role::Client)
                } else {
                    EventAddAmbiguous
                }
            } else {
                From(Role::Server)
            }
        }
        EVENT_CANCEL => From(Role::Client),
        READ => {
            if header.payload_size == 0 {
                From(Role::Client)
            } else {
                From(Role::Server)
            }
        }
        READ_NOTIFY => {
            if header.payload_size == 0 {
                From(Role::Client)
            } else {
                From(Role::Server)
            }
        }
        WRITE_NOTIFY => {
            if header.payload_size == 0 {
                From(Role::Server)
            } else {
                From(Role::Client)
            }
        }
        CREATE_CHAN => {
            if header.payload_size == 0 {
                From(Role::Server)
            } else {
                From(Role::Client)
            }
        }
        WRITE | EVENTS_OFF | EVENTS_ON | READ_SYNC | CLIENT_NAME | HOST_NAME
        | REPEATER_REGISTER => From(Role::Client),
        ERROR | BEACON | NOT_FOUND | REPEATER_CONFIRM | ACCESS_RIGHTS | CREATE_CH_FAIL
        | SERVER_DISCONN => From(Role::Server),
        ECHO => EchoAmbiguous,
        CLEAR_CHANNEL => ClearChannelAmbiguous,
        id => return Err(ValidationError::UnidentifiableCommand { id }),
    })
}

fn sniff_command(
    header: &MessageHeader,
    payload: Bytes,
    source: Option<SocketAddr>,
) -> Result<SniffedCommand, ValidationError> {
    Ok(match infer_sender(header)? {
        Inference::From(role) => {
            SniffedCommand::Known(Command::from_wire(header, payload, role, source)?)
        }
        Inference::EventAddAmbiguous => SniffedCommand::EventAddRequestOrResponse {
            header: *header,
            payload,
        },
        Inference::EchoAmbiguous => SniffedCommand::EchoRequestOrResponse,
        Inference::ClearChannelAmbiguous => SniffedCommand::ClearChannelRequestOrResponse {
            sid: header.parameter1,
            cid: header.parameter2,
        },
    })
}

/// Parse one sniffed command from the head of a stream buffer.
pub fn read_sniffed_bytestream(buf: &mut BytesMut) -> Result<SniffedParsed, ValidationError> {
    let (header, header_size) = match MessageHeader::parse(buf) {
        Err(needed) => return Ok(SniffedParsed::NeedData(needed)),
        Ok(parsed) => parsed,
    };
    let total = header_size + header.payload_size as usize;
    if buf.len() < total {
        return Ok(SniffedParsed::NeedData(total - buf.len()));
    }
    let frame = buf.split_to(total).freeze();
    let payload = frame.slice(header_size..);
    Ok(SniffedParsed::Command(sniff_command(&header, payload, None)?))
}

/// Parse a whole observed datagram.
pub fn read_sniffed_datagram(
    data: &[u8],
    source: SocketAddr,
) -> Result<Vec<SniffedCommand>, ValidationError> {
    let buf = Bytes::copy_from_slice(data);
    let mut commands = Vec::new();
    let mut at = 0;
    while at < buf.len() {
        let rest = &buf[at..];
        let (header, header_size) = MessageHeader::parse(rest).map_err(|needed| {
            ValidationError::TruncatedDatagram {
                needed: rest.len() + needed,
                got: rest.len(),
            }
        })?;
        let total = header_size + header.payload_size as usize;
        if rest.len() < total {
            return Err(ValidationError::TruncatedDatagram {
                needed: total,
                got: rest.len(),
            });
        }
        let payload = buf.slice(at + header_size..at + total);
        commands.push(sniff_command(&header, payload, Some(source))?);
        at += total;
    }
    Ok(commands)
}
