//! The two fixed CA header layouts.
//!
//! Every command starts with a 16-byte header of big-endian unsigned
//! integers. When a payload is too large for the 16-bit size field, the
//! header grows by 8 bytes carrying the true 32-bit payload size and
//! element count. The extension is invisible to callers: [`MessageHeader`]
//! always holds the logical 32-bit values and picks the wire form itself.

/// Size of the standard header.
pub const HEADER_SIZE: usize = 16;

/// Size of the extended header.
pub const EXTENDED_HEADER_SIZE: usize = 24;

/// `payload_size` value that (together with `data_count == 0`) marks an
/// extended header on the wire.
pub const EXTENSION_SENTINEL: u16 = 0xFFFF;

/// Logical view of a command header.
///
/// `payload_size` and `data_count` are the true values whether or not the
/// extended form was used on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub command: u16,
    pub payload_size: u32,
    pub data_type: u16,
    pub data_count: u32,
    pub parameter1: u32,
    pub parameter2: u32,
}

/// Serialized header bytes, standard or extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderBytes {
    Standard([u8; HEADER_SIZE]),
    Extended([u8; EXTENDED_HEADER_SIZE]),
}

impl HeaderBytes {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            HeaderBytes::Standard(b) => b,
            HeaderBytes::Extended(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

const _: () = assert!(HEADER_SIZE == 16);
const _: () = assert!(EXTENDED_HEADER_SIZE == 24);

impl MessageHeader {
    pub fn new(
        command: u16,
        payload_size: u32,
        data_type: u16,
        data_count: u32,
        parameter1: u32,
        parameter2: u32,
    ) -> Self {
        MessageHeader {
            command,
            payload_size,
            data_type,
            data_count,
            parameter1,
            parameter2,
        }
    }

    /// True when the standard 16-byte form cannot represent this header.
    ///
    /// A payload of exactly 0xFFFF bytes with a zero count would collide
    /// with the extension sentinel, so it forces the extended form too.
    pub fn requires_extension(&self) -> bool {
        self.payload_size >= EXTENSION_SENTINEL as u32 || self.data_count > u16::MAX as u32
    }

    /// Number of bytes this header occupies on the wire.
    pub fn wire_size(&self) -> usize {
        if self.requires_extension() {
            EXTENDED_HEADER_SIZE
        } else {
            HEADER_SIZE
        }
    }

    /// Encode to wire bytes, choosing the standard or extended form.
    pub fn to_wire(&self) -> HeaderBytes {
        if self.requires_extension() {
            let mut buf = [0u8; EXTENDED_HEADER_SIZE];
            buf[0..2].copy_from_slice(&self.command.to_be_bytes());
            buf[2..4].copy_from_slice(&EXTENSION_SENTINEL.to_be_bytes());
            buf[4..6].copy_from_slice(&self.data_type.to_be_bytes());
            // data_count reads 0 in the short fields
            buf[8..12].copy_from_slice(&self.parameter1.to_be_bytes());
            buf[12..16].copy_from_slice(&self.parameter2.to_be_bytes());
            buf[16..20].copy_from_slice(&self.payload_size.to_be_bytes());
            buf[20..24].copy_from_slice(&self.data_count.to_be_bytes());
            HeaderBytes::Extended(buf)
        } else {
            let mut buf = [0u8; HEADER_SIZE];
            buf[0..2].copy_from_slice(&self.command.to_be_bytes());
            buf[2..4].copy_from_slice(&(self.payload_size as u16).to_be_bytes());
            buf[4..6].copy_from_slice(&self.data_type.to_be_bytes());
            buf[6..8].copy_from_slice(&(self.data_count as u16).to_be_bytes());
            buf[8..12].copy_from_slice(&self.parameter1.to_be_bytes());
            buf[12..16].copy_from_slice(&self.parameter2.to_be_bytes());
            HeaderBytes::Standard(buf)
        }
    }

    /// Decode a header from the front of `buf`.
    ///
    /// Returns the logical header and the number of wire bytes it occupied,
    /// or `Err(n)` with the number of additional bytes needed to decide.
    pub fn parse(buf: &[u8]) -> Result<(MessageHeader, usize), usize> {
        if buf.len() < HEADER_SIZE {
            return Err(HEADER_SIZE - buf.len());
        }
        let command = u16::from_be_bytes([buf[0], buf[1]]);
        let short_size = u16::from_be_bytes([buf[2], buf[3]]);
        let data_type = u16::from_be_bytes([buf[4], buf[5]]);
        let short_count = u16::from_be_bytes([buf[6], buf[7]]);
        let parameter1 = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let parameter2 = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);

        if short_size == EXTENSION_SENTINEL && short_count == 0 {
            if buf.len() < EXTENDED_HEADER_SIZE {
                return Err(EXTENDED_HEADER_SIZE - buf.len());
            }
            let payload_size = u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]);
            let data_count = u32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]);
            Ok((
                MessageHeader {
                    command,
                    payload_size,
                    data_type,
                    data_count,
                    parameter1,
                    parameter2,
                },
                EXTENDED_HEADER_SIZE,
            ))
        } else {
            Ok((
                MessageHeader {
                    command,
                    payload_size: short_size as u32,
                    data_type,
                    data_count: short_count as u32,
                    parameter1,
                    parameter2,
                },
                HEADER_SIZE,
            ))
        }
    }
}
