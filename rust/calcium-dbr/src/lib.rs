//! The DBR ("Data Base Record") type system of Channel Access.
//!
//! A DBR type id is the sole on-the-wire type discriminator. It encodes a
//! native element type (string, 16-bit int, float, enum, char, 32-bit int,
//! double) and a metadata envelope (plain, status, time, graphic, control,
//! plus a few sparse extension forms). This crate owns the id registry, the
//! packed big-endian envelope layouts, the native value arrays, and the
//! conversions among compatible shapes.

pub mod envelope;
pub mod error;
pub mod timestamp;
pub mod types;
pub mod value;

pub use envelope::{
    AlarmStatus, ControlMeta, DbrMetadata, EnumMeta, GraphicMeta, LimitSet, StsackMeta, TimeMeta,
};
pub use error::TypeError;
pub use timestamp::{EPICS_EPOCH_UNIX_OFFSET, TimeStamp};
pub use types::{DbrType, Envelope, NativeType, UnknownDbrType};
pub use value::{ConvertCtx, DbrValue, EpicsString};

use bytes::{BufMut, Bytes, BytesMut};

/// A fully decoded DBR payload: envelope metadata plus the native array.
#[derive(Debug, Clone, PartialEq)]
pub struct DbrPayload {
    pub dbr_type: DbrType,
    pub metadata: DbrMetadata,
    pub value: DbrValue,
}

impl DbrPayload {
    /// Wrap a plain native array with no envelope.
    pub fn plain(value: DbrValue) -> Result<DbrPayload, TypeError> {
        let dbr_type = DbrType::from_parts(value.native_type(), Envelope::Plain)?;
        Ok(DbrPayload {
            dbr_type,
            metadata: DbrMetadata::None,
            value,
        })
    }

    /// Parse a payload of `count` elements of `dbr_type` from wire bytes.
    ///
    /// Trailing padding (payloads are 8-byte aligned) is ignored.
    pub fn parse(dbr_type: DbrType, count: u32, data: &[u8]) -> Result<DbrPayload, TypeError> {
        let meta_size = dbr_type.metadata_size();
        let value_size = dbr_type.element_size() * count as usize;
        if data.len() < meta_size + value_size {
            return Err(TypeError::ShortBuffer {
                needed: meta_size + value_size,
                got: data.len(),
            });
        }
        let metadata = envelope::parse_metadata(dbr_type, &data[..meta_size])?;
        let value = DbrValue::parse(
            dbr_type.value_type(),
            count,
            &data[meta_size..meta_size + value_size],
        )?;
        Ok(DbrPayload {
            dbr_type,
            metadata,
            value,
        })
    }

    /// Serialize to wire bytes, zero-padded to a multiple of 8.
    pub fn to_bytes(&self) -> Result<Bytes, TypeError> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        envelope::write_metadata(self.dbr_type, &self.metadata, &mut buf)?;
        self.value.write_to(&mut buf);
        while buf.len() % 8 != 0 {
            buf.put_u8(0);
        }
        Ok(buf.freeze())
    }

    pub fn data_count(&self) -> u32 {
        self.value.len() as u32
    }

    /// Padded on-wire payload size.
    pub fn wire_size(&self) -> usize {
        self.dbr_type.payload_size(self.data_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_double_roundtrip() {
        let payload = DbrPayload::plain(DbrValue::Double(vec![3.14])).unwrap();
        assert_eq!(payload.dbr_type, DbrType::Double);
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(bytes.len(), 8);
        let parsed = DbrPayload::parse(DbrType::Double, 1, &bytes).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn short_int_payload_is_padded() {
        let payload = DbrPayload::plain(DbrValue::Int(vec![7])).unwrap();
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..2], &[0, 7]);
        let parsed = DbrPayload::parse(DbrType::Int, 1, &bytes).unwrap();
        assert_eq!(parsed.value, DbrValue::Int(vec![7]));
    }

    #[test]
    fn time_double_roundtrip() {
        let payload = DbrPayload {
            dbr_type: DbrType::TimeDouble,
            metadata: DbrMetadata::Time(TimeMeta {
                status: AlarmStatus {
                    status: 0,
                    severity: 0,
                },
                stamp: TimeStamp {
                    secs_past_epoch: 1_000_000,
                    nanoseconds: 500,
                },
            }),
            value: DbrValue::Double(vec![1.5, -2.5]),
        };
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(bytes.len(), 16 + 16);
        let parsed = DbrPayload::parse(DbrType::TimeDouble, 2, &bytes).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let err = DbrPayload::parse(DbrType::Double, 2, &[0u8; 8]).unwrap_err();
        assert!(matches!(err, TypeError::ShortBuffer { needed: 16, got: 8 }));
    }
}
