//! Packed metadata envelope layouts.
//!
//! These mirror the C layouts of `db_access.h`, big-endian on the wire,
//! including the RISC alignment padding. Limits are held as `f64` in memory
//! (every native limit width embeds exactly) and written back in the native
//! width of the value type.

use bytes::BufMut;

use calcium_wire::{MAX_ENUM_STATES, MAX_ENUM_STRING_SIZE, MAX_UNITS_SIZE, string::trim_string};

use crate::error::TypeError;
use crate::timestamp::TimeStamp;
use crate::types::{DbrType, Envelope, NativeType};

/// Alarm status and severity, the head of every non-plain envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmStatus {
    pub status: i16,
    pub severity: i16,
}

/// Status plus timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeMeta {
    pub status: AlarmStatus,
    pub stamp: TimeStamp,
}

/// The six display/alarm/warning limits, in wire order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LimitSet {
    pub upper_disp_limit: f64,
    pub lower_disp_limit: f64,
    pub upper_alarm_limit: f64,
    pub upper_warning_limit: f64,
    pub lower_warning_limit: f64,
    pub lower_alarm_limit: f64,
}

/// Graphic metadata for numeric types.
///
/// `precision` only exists on the wire for FLOAT and DOUBLE; it parses as 0
/// and is not written for the integer widths.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GraphicMeta {
    pub status: AlarmStatus,
    pub precision: i16,
    pub units: [u8; MAX_UNITS_SIZE],
    pub limits: LimitSet,
}

/// Control metadata: graphic plus the control limits.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlMeta {
    pub graphic: GraphicMeta,
    pub upper_ctrl_limit: f64,
    pub lower_ctrl_limit: f64,
}

/// Graphic metadata for enums: the table of state strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumMeta {
    pub status: AlarmStatus,
    /// Up to 16 states of up to 25 chars each.
    pub strings: Vec<String>,
}

/// Status/ack metadata of the STSACK_STRING form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StsackMeta {
    pub status: u16,
    pub severity: u16,
    pub ackt: u16,
    pub acks: u16,
}

/// Decoded envelope metadata of any DBR form.
#[derive(Debug, Clone, PartialEq)]
pub enum DbrMetadata {
    None,
    Status(AlarmStatus),
    Time(TimeMeta),
    Graphic(GraphicMeta),
    Control(ControlMeta),
    GraphicEnum(EnumMeta),
    Stsack(StsackMeta),
}

impl AlarmStatus {
    fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_i16(self.status);
        buf.put_i16(self.severity);
    }

    fn parse(data: &[u8]) -> AlarmStatus {
        AlarmStatus {
            status: i16::from_be_bytes([data[0], data[1]]),
            severity: i16::from_be_bytes([data[2], data[3]]),
        }
    }
}

fn put_limit(buf: &mut impl BufMut, native: NativeType, v: f64) {
    match native {
        NativeType::Int => buf.put_i16(v as i16),
        NativeType::Float => buf.put_f32(v as f32),
        NativeType::Char => buf.put_u8(v as u8),
        NativeType::Long => buf.put_i32(v as i32),
        NativeType::Double => buf.put_f64(v),
        NativeType::String | NativeType::Enum => unreachable!("no numeric limits"),
    }
}

fn get_limit(data: &[u8], native: NativeType) -> (f64, usize) {
    match native {
        NativeType::Int => (i16::from_be_bytes([data[0], data[1]]) as f64, 2),
        NativeType::Float => (
            f32::from_be_bytes([data[0], data[1], data[2], data[3]]) as f64,
            4,
        ),
        NativeType::Char => (data[0] as f64, 1),
        NativeType::Long => (
            i32::from_be_bytes([data[0], data[1], data[2], data[3]]) as f64,
            4,
        ),
        NativeType::Double => (
            f64::from_be_bytes([
                data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
            ]),
            8,
        ),
        NativeType::String | NativeType::Enum => unreachable!("no numeric limits"),
    }
}

fn write_graphic_body(
    buf: &mut impl BufMut,
    native: NativeType,
    meta: &GraphicMeta,
    ctrl: Option<(f64, f64)>,
) {
    meta.status.write_to(buf);
    if native.is_float() {
        buf.put_i16(meta.precision);
        buf.put_i16(0); // RISC_pad
    }
    buf.put_slice(&meta.units);
    let l = &meta.limits;
    for v in [
        l.upper_disp_limit,
        l.lower_disp_limit,
        l.upper_alarm_limit,
        l.upper_warning_limit,
        l.lower_warning_limit,
        l.lower_alarm_limit,
    ] {
        put_limit(buf, native, v);
    }
    if let Some((upper, lower)) = ctrl {
        put_limit(buf, native, upper);
        put_limit(buf, native, lower);
    }
    if native == NativeType::Char {
        buf.put_u8(0); // RISC_pad
    }
}

fn parse_graphic_body(data: &[u8], native: NativeType, ctrl: bool) -> (GraphicMeta, Option<(f64, f64)>) {
    let status = AlarmStatus::parse(data);
    let mut at = 4;
    let precision = if native.is_float() {
        let p = i16::from_be_bytes([data[at], data[at + 1]]);
        at += 4; // precision + RISC_pad
        p
    } else {
        0
    };
    let mut units = [0u8; MAX_UNITS_SIZE];
    units.copy_from_slice(&data[at..at + MAX_UNITS_SIZE]);
    at += MAX_UNITS_SIZE;

    let mut read = || {
        let (v, n) = get_limit(&data[at..], native);
        at += n;
        v
    };
    let limits = LimitSet {
        upper_disp_limit: read(),
        lower_disp_limit: read(),
        upper_alarm_limit: read(),
        upper_warning_limit: read(),
        lower_warning_limit: read(),
        lower_alarm_limit: read(),
    };
    let ctrl_limits = ctrl.then(|| {
        let upper = read();
        let lower = read();
        (upper, lower)
    });
    (
        GraphicMeta {
            status,
            precision,
            units,
            limits,
        },
        ctrl_limits,
    )
}

fn write_enum_meta(buf: &mut impl BufMut, meta: &EnumMeta) -> Result<(), TypeError> {
    if meta.strings.len() > MAX_ENUM_STATES {
        return Err(TypeError::BadEnumIndex {
            index: meta.strings.len() as u16,
            states: MAX_ENUM_STATES,
        });
    }
    meta.status.write_to(buf);
    buf.put_i16(meta.strings.len() as i16);
    for slot in 0..MAX_ENUM_STATES {
        let mut bytes = [0u8; MAX_ENUM_STRING_SIZE];
        if let Some(s) = meta.strings.get(slot) {
            if s.len() >= MAX_ENUM_STRING_SIZE {
                return Err(TypeError::StringTooLong {
                    len: s.len(),
                    max: MAX_ENUM_STRING_SIZE - 1,
                });
            }
            bytes[..s.len()].copy_from_slice(s.as_bytes());
        }
        buf.put_slice(&bytes);
    }
    Ok(())
}

fn parse_enum_meta(data: &[u8]) -> EnumMeta {
    let status = AlarmStatus::parse(data);
    let count = i16::from_be_bytes([data[4], data[5]]).clamp(0, MAX_ENUM_STATES as i16) as usize;
    let mut strings = Vec::with_capacity(count);
    for slot in 0..count {
        let start = 6 + slot * MAX_ENUM_STRING_SIZE;
        let raw = trim_string(&data[start..start + MAX_ENUM_STRING_SIZE]);
        strings.push(String::from_utf8_lossy(raw).into_owned());
    }
    EnumMeta { status, strings }
}

/// Serialize `meta` as the envelope of `dbr_type`.
pub fn write_metadata(
    dbr_type: DbrType,
    meta: &DbrMetadata,
    buf: &mut impl BufMut,
) -> Result<(), TypeError> {
    let native = dbr_type.native();
    match (dbr_type.envelope(), meta) {
        (Envelope::Plain, DbrMetadata::None)
        | (Envelope::PutAckt, DbrMetadata::None)
        | (Envelope::PutAcks, DbrMetadata::None)
        | (Envelope::ClassName, DbrMetadata::None) => Ok(()),
        (Envelope::Status, DbrMetadata::Status(status)) => {
            status.write_to(buf);
            match native {
                NativeType::Char => buf.put_u8(0),
                NativeType::Double => buf.put_i32(0),
                _ => {}
            }
            Ok(())
        }
        (Envelope::Time, DbrMetadata::Time(time)) => {
            time.status.write_to(buf);
            time.stamp.write_to(buf);
            match native {
                NativeType::Int | NativeType::Enum => buf.put_i16(0),
                NativeType::Char => {
                    buf.put_i16(0);
                    buf.put_u8(0);
                }
                NativeType::Double => buf.put_i32(0),
                _ => {}
            }
            Ok(())
        }
        // The string forms of graphic/control alias the status layout.
        (Envelope::Graphic | Envelope::Control, DbrMetadata::Status(status))
            if native == NativeType::String =>
        {
            status.write_to(buf);
            Ok(())
        }
        (Envelope::Graphic | Envelope::Control, DbrMetadata::GraphicEnum(meta))
            if native == NativeType::Enum =>
        {
            write_enum_meta(buf, meta)
        }
        (Envelope::Graphic, DbrMetadata::Graphic(meta))
            if !native.is_enum() && !native.is_string() =>
        {
            write_graphic_body(buf, native, meta, None);
            Ok(())
        }
        (Envelope::Control, DbrMetadata::Control(meta))
            if !native.is_enum() && !native.is_string() =>
        {
            write_graphic_body(
                buf,
                native,
                &meta.graphic,
                Some((meta.upper_ctrl_limit, meta.lower_ctrl_limit)),
            );
            Ok(())
        }
        (Envelope::StsackString, DbrMetadata::Stsack(meta)) => {
            buf.put_u16(meta.status);
            buf.put_u16(meta.severity);
            buf.put_u16(meta.ackt);
            buf.put_u16(meta.acks);
            Ok(())
        }
        (envelope, _) => Err(TypeError::MetadataMismatch { envelope }),
    }
}

/// Parse the envelope of `dbr_type` from exactly `metadata_size` bytes.
pub fn parse_metadata(dbr_type: DbrType, data: &[u8]) -> Result<DbrMetadata, TypeError> {
    debug_assert_eq!(data.len(), dbr_type.metadata_size());
    let native = dbr_type.native();
    Ok(match dbr_type.envelope() {
        Envelope::Plain | Envelope::PutAckt | Envelope::PutAcks | Envelope::ClassName => {
            DbrMetadata::None
        }
        Envelope::Status => DbrMetadata::Status(AlarmStatus::parse(data)),
        Envelope::Time => DbrMetadata::Time(TimeMeta {
            status: AlarmStatus::parse(data),
            stamp: TimeStamp::from_bytes(&data[4..12].try_into().expect("stamp width")),
        }),
        Envelope::Graphic | Envelope::Control if native == NativeType::String => {
            DbrMetadata::Status(AlarmStatus::parse(data))
        }
        Envelope::Graphic | Envelope::Control if native == NativeType::Enum => {
            DbrMetadata::GraphicEnum(parse_enum_meta(data))
        }
        Envelope::Graphic => {
            let (meta, _) = parse_graphic_body(data, native, false);
            DbrMetadata::Graphic(meta)
        }
        Envelope::Control => {
            let (graphic, ctrl) = parse_graphic_body(data, native, true);
            let (upper_ctrl_limit, lower_ctrl_limit) = ctrl.expect("control limits");
            DbrMetadata::Control(ControlMeta {
                graphic,
                upper_ctrl_limit,
                lower_ctrl_limit,
            })
        }
        Envelope::StsackString => DbrMetadata::Stsack(StsackMeta {
            status: u16::from_be_bytes([data[0], data[1]]),
            severity: u16::from_be_bytes([data[2], data[3]]),
            ackt: u16::from_be_bytes([data[4], data[5]]),
            acks: u16::from_be_bytes([data[6], data[7]]),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn roundtrip(dbr_type: DbrType, meta: DbrMetadata) {
        let mut buf = BytesMut::new();
        write_metadata(dbr_type, &meta, &mut buf).unwrap();
        assert_eq!(buf.len(), dbr_type.metadata_size(), "{:?}", dbr_type);
        let parsed = parse_metadata(dbr_type, &buf).unwrap();
        assert_eq!(parsed, meta, "{:?}", dbr_type);
    }

    #[test]
    fn status_layouts() {
        let status = AlarmStatus {
            status: 3,
            severity: 2,
        };
        for t in [
            DbrType::StsString,
            DbrType::StsInt,
            DbrType::StsFloat,
            DbrType::StsEnum,
            DbrType::StsChar,
            DbrType::StsLong,
            DbrType::StsDouble,
            DbrType::GrString,
            DbrType::CtrlString,
        ] {
            roundtrip(t, DbrMetadata::Status(status));
        }
    }

    #[test]
    fn time_layouts() {
        let time = TimeMeta {
            status: AlarmStatus {
                status: 1,
                severity: 0,
            },
            stamp: TimeStamp::new(123_456, 789),
        };
        for t in [
            DbrType::TimeString,
            DbrType::TimeInt,
            DbrType::TimeFloat,
            DbrType::TimeEnum,
            DbrType::TimeChar,
            DbrType::TimeLong,
            DbrType::TimeDouble,
        ] {
            roundtrip(t, DbrMetadata::Time(time));
        }
    }

    #[test]
    fn graphic_and_control_layouts() {
        let graphic = GraphicMeta {
            status: AlarmStatus {
                status: 0,
                severity: 0,
            },
            precision: 0,
            units: *b"mA\0\0\0\0\0\0",
            limits: LimitSet {
                upper_disp_limit: 100.0,
                lower_disp_limit: -100.0,
                upper_alarm_limit: 90.0,
                upper_warning_limit: 80.0,
                lower_warning_limit: -80.0,
                lower_alarm_limit: -90.0,
            },
        };
        for t in [DbrType::GrInt, DbrType::GrChar, DbrType::GrLong] {
            // Char limits are unsigned on the wire.
            let meta = if t == DbrType::GrChar {
                let mut m = graphic;
                m.limits = LimitSet {
                    upper_disp_limit: 200.0,
                    lower_disp_limit: 0.0,
                    upper_alarm_limit: 180.0,
                    upper_warning_limit: 160.0,
                    lower_warning_limit: 20.0,
                    lower_alarm_limit: 10.0,
                };
                m
            } else {
                graphic
            };
            roundtrip(t, DbrMetadata::Graphic(meta));
        }

        let mut with_precision = graphic;
        with_precision.precision = 4;
        for t in [DbrType::GrFloat, DbrType::GrDouble] {
            roundtrip(t, DbrMetadata::Graphic(with_precision));
        }

        let control = ControlMeta {
            graphic: with_precision,
            upper_ctrl_limit: 95.0,
            lower_ctrl_limit: -95.0,
        };
        for t in [DbrType::CtrlFloat, DbrType::CtrlDouble] {
            roundtrip(t, DbrMetadata::Control(control));
        }
    }

    #[test]
    fn enum_meta_roundtrip() {
        let meta = EnumMeta {
            status: AlarmStatus {
                status: 0,
                severity: 0,
            },
            strings: vec!["OFF".into(), "ON".into(), "FAULT".into()],
        };
        for t in [DbrType::GrEnum, DbrType::CtrlEnum] {
            roundtrip(t, DbrMetadata::GraphicEnum(meta.clone()));
        }
    }

    #[test]
    fn enum_string_width_enforced() {
        let meta = EnumMeta {
            status: AlarmStatus::default(),
            strings: vec!["a string far too long for an enum slot".into()],
        };
        let mut buf = BytesMut::new();
        assert!(write_metadata(DbrType::GrEnum, &DbrMetadata::GraphicEnum(meta), &mut buf).is_err());
    }

    #[test]
    fn stsack_roundtrip() {
        roundtrip(
            DbrType::StsackString,
            DbrMetadata::Stsack(StsackMeta {
                status: 1,
                severity: 2,
                ackt: 1,
                acks: 3,
            }),
        );
    }

    #[test]
    fn mismatched_metadata_rejected() {
        let mut buf = BytesMut::new();
        let err = write_metadata(DbrType::TimeInt, &DbrMetadata::None, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            TypeError::MetadataMismatch {
                envelope: Envelope::Time
            }
        ));
    }
}
