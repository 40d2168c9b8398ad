//! Incremental parsing of command streams and datagrams.
//!
//! Stream buffers accumulate across `recv` calls and commands are split
//! off the front; a command's payload is a zero-copy slice of the same
//! allocation. Datagrams are atomic: a datagram that ends mid-command is
//! invalid as a whole.

use std::net::SocketAddr;

use bytes::BytesMut;

use calcium_wire::{MessageHeader, Role};

use crate::commands::Command;
use crate::error::ValidationError;

/// Result of one attempt to pull a command off a stream buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Command(Command),
    /// Not enough buffered bytes; at least this many more are needed.
    NeedData(usize),
}

/// Peek at `buf` and report whether a full command is buffered.
///
/// Returns the parsed header (once enough bytes exist for it) and the
/// number of additional bytes required for the complete command; zero
/// means one full command is available.
pub fn bytes_needed_for_command(buf: &[u8]) -> (Option<MessageHeader>, usize) {
    match MessageHeader::parse(buf) {
        Err(needed) => (None, needed),
        Ok((header, header_size)) => {
            let total = header_size + header.payload_size as usize;
            (Some(header), total.saturating_sub(buf.len()))
        }
    }
}

/// Parse one command from the head of `buf` as sent by `sender`,
/// consuming its bytes on success.
pub fn read_from_bytestream(buf: &mut BytesMut, sender: Role) -> Result<Parsed, ValidationError> {
    let (header, header_size) = match MessageHeader::parse(buf) {
        Err(needed) => return Ok(Parsed::NeedData(needed)),
        Ok(parsed) => parsed,
    };
    let total = header_size + header.payload_size as usize;
    if buf.len() < total {
        return Ok(Parsed::NeedData(total - buf.len()));
    }
    let frame = buf.split_to(total).freeze();
    let payload = frame.slice(header_size..);
    let command = Command::from_wire(&header, payload, sender, None)?;
    Ok(Parsed::Command(command))
}

/// Parse a whole datagram of concatenated commands sent by `sender` from
/// `source`. Every command must be complete.
pub fn read_datagram(
    data: &[u8],
    source: SocketAddr,
    sender: Role,
) -> Result<Vec<Command>, ValidationError> {
    let buf = bytes::Bytes::copy_from_slice(data);
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
        commands.push(Command::from_wire(&header, payload, sender, Some(source))?);
        at += total;
    }
    Ok(commands)
}
