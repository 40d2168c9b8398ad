//! The DBR id registry.
//!
//! Ids 0..=38 tile a 7x5 lattice of native types and envelopes, with four
//! sparse extension forms at the top. The id is the sole on-the-wire type
//! discriminator.

use crate::error::TypeError;

/// Native element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// 40-byte fixed-width string.
    String,
    /// 16-bit signed integer (DBR "short").
    Int,
    /// 32-bit float.
    Float,
    /// 16-bit enumeration index.
    Enum,
    /// 8-bit byte.
    Char,
    /// 32-bit signed integer.
    Long,
    /// 64-bit float.
    Double,
}

impl NativeType {
    pub const fn element_size(self) -> usize {
        match self {
            NativeType::String => 40,
            NativeType::Int => 2,
            NativeType::Float => 4,
            NativeType::Enum => 2,
            NativeType::Char => 1,
            NativeType::Long => 4,
            NativeType::Double => 8,
        }
    }

    pub const fn is_int(self) -> bool {
        matches!(self, NativeType::Int | NativeType::Long)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, NativeType::Float | NativeType::Double)
    }

    pub const fn is_string(self) -> bool {
        matches!(self, NativeType::String)
    }

    pub const fn is_char(self) -> bool {
        matches!(self, NativeType::Char)
    }

    pub const fn is_enum(self) -> bool {
        matches!(self, NativeType::Enum)
    }
}

/// Metadata envelopes prefixed to the native array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Envelope {
    Plain,
    Status,
    Time,
    Graphic,
    Control,
    /// Write acknowledgment transient setting (sparse form).
    PutAckt,
    /// Write acknowledgment severity setting (sparse form).
    PutAcks,
    /// Status/ack string form.
    StsackString,
    /// Class-name string form.
    ClassName,
}

/// The full set of wire type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DbrType {
    String = 0,
    Int = 1,
    Float = 2,
    Enum = 3,
    Char = 4,
    Long = 5,
    Double = 6,
    StsString = 7,
    StsInt = 8,
    StsFloat = 9,
    StsEnum = 10,
    StsChar = 11,
    StsLong = 12,
    StsDouble = 13,
    TimeString = 14,
    TimeInt = 15,
    TimeFloat = 16,
    TimeEnum = 17,
    TimeChar = 18,
    TimeLong = 19,
    TimeDouble = 20,
    GrString = 21,
    GrInt = 22,
    GrFloat = 23,
    GrEnum = 24,
    GrChar = 25,
    GrLong = 26,
    GrDouble = 27,
    CtrlString = 28,
    CtrlInt = 29,
    CtrlFloat = 30,
    CtrlEnum = 31,
    CtrlChar = 32,
    CtrlLong = 33,
    CtrlDouble = 34,
    PutAckt = 35,
    PutAcks = 36,
    StsackString = 37,
    ClassName = 38,
}

/// Error when converting from an unknown u16 id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownDbrType(pub u16);

impl std::fmt::Display for UnknownDbrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown DBR type id: {}", self.0)
    }
}

impl std::error::Error for UnknownDbrType {}

impl TryFrom<u16> for DbrType {
    type Error = UnknownDbrType;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        use DbrType::*;
        Ok(match v {
            0 => String,
            1 => Int,
            2 => Float,
            3 => Enum,
            4 => Char,
            5 => Long,
            6 => Double,
            7 => StsString,
            8 => StsInt,
            9 => StsFloat,
            10 => StsEnum,
            11 => StsChar,
            12 => StsLong,
            13 => StsDouble,
            14 => TimeString,
            15 => TimeInt,
            16 => TimeFloat,
            17 => TimeEnum,
            18 => TimeChar,
            19 => TimeLong,
            20 => TimeDouble,
            21 => GrString,
            22 => GrInt,
            23 => GrFloat,
            24 => GrEnum,
            25 => GrChar,
            26 => GrLong,
            27 => GrDouble,
            28 => CtrlString,
            29 => CtrlInt,
            30 => CtrlFloat,
            31 => CtrlEnum,
            32 => CtrlChar,
            33 => CtrlLong,
            34 => CtrlDouble,
            35 => PutAckt,
            36 => PutAcks,
            37 => StsackString,
            38 => ClassName,
            other => return Err(UnknownDbrType(other)),
        })
    }
}

impl From<DbrType> for u16 {
    fn from(t: DbrType) -> u16 {
        t as u16
    }
}

impl DbrType {
    /// The native element type encoded in the id.
    pub const fn native(self) -> NativeType {
        use DbrType::*;
        match self {
            String | StsString | TimeString | GrString | CtrlString | StsackString | ClassName => {
                NativeType::String
            }
            Int | StsInt | TimeInt | GrInt | CtrlInt => NativeType::Int,
            Float | StsFloat | TimeFloat | GrFloat | CtrlFloat => NativeType::Float,
            Enum | StsEnum | TimeEnum | GrEnum | CtrlEnum | PutAckt | PutAcks => NativeType::Enum,
            Char | StsChar | TimeChar | GrChar | CtrlChar => NativeType::Char,
            Long | StsLong | TimeLong | GrLong | CtrlLong => NativeType::Long,
            Double | StsDouble | TimeDouble | GrDouble | CtrlDouble => NativeType::Double,
        }
    }

    /// The envelope encoded in the id.
    pub const fn envelope(self) -> Envelope {
        use DbrType::*;
        match self {
            String | Int | Float | Enum | Char | Long | Double => Envelope::Plain,
            StsString | StsInt | StsFloat | StsEnum | StsChar | StsLong | StsDouble => {
                Envelope::Status
            }
            TimeString | TimeInt | TimeFloat | TimeEnum | TimeChar | TimeLong | TimeDouble => {
                Envelope::Time
            }
            GrString | GrInt | GrFloat | GrEnum | GrChar | GrLong | GrDouble => Envelope::Graphic,
            CtrlString | CtrlInt | CtrlFloat | CtrlEnum | CtrlChar | CtrlLong | CtrlDouble => {
                Envelope::Control
            }
            PutAckt => Envelope::PutAckt,
            PutAcks => Envelope::PutAcks,
            StsackString => Envelope::StsackString,
            ClassName => Envelope::ClassName,
        }
    }

    /// Promote a native type into an envelope, erroring on pairs with no
    /// wire id.
    pub fn from_parts(native: NativeType, envelope: Envelope) -> Result<DbrType, TypeError> {
        use DbrType::*;
        let t = match (envelope, native) {
            (Envelope::Plain, NativeType::String) => String,
            (Envelope::Plain, NativeType::Int) => Int,
            (Envelope::Plain, NativeType::Float) => Float,
            (Envelope::Plain, NativeType::Enum) => Enum,
            (Envelope::Plain, NativeType::Char) => Char,
            (Envelope::Plain, NativeType::Long) => Long,
            (Envelope::Plain, NativeType::Double) => Double,
            (Envelope::Status, NativeType::String) => StsString,
            (Envelope::Status, NativeType::Int) => StsInt,
            (Envelope::Status, NativeType::Float) => StsFloat,
            (Envelope::Status, NativeType::Enum) => StsEnum,
            (Envelope::Status, NativeType::Char) => StsChar,
            (Envelope::Status, NativeType::Long) => StsLong,
            (Envelope::Status, NativeType::Double) => StsDouble,
            (Envelope::Time, NativeType::String) => TimeString,
            (Envelope::Time, NativeType::Int) => TimeInt,
            (Envelope::Time, NativeType::Float) => TimeFloat,
            (Envelope::Time, NativeType::Enum) => TimeEnum,
            (Envelope::Time, NativeType::Char) => TimeChar,
            (Envelope::Time, NativeType::Long) => TimeLong,
            (Envelope::Time, NativeType::Double) => TimeDouble,
            (Envelope::Graphic, NativeType::String) => GrString,
            (Envelope::Graphic, NativeType::Int) => GrInt,
            (Envelope::Graphic, NativeType::Float) => GrFloat,
            (Envelope::Graphic, NativeType::Enum) => GrEnum,
            (Envelope::Graphic, NativeType::Char) => GrChar,
            (Envelope::Graphic, NativeType::Long) => GrLong,
            (Envelope::Graphic, NativeType::Double) => GrDouble,
            (Envelope::Control, NativeType::String) => CtrlString,
            (Envelope::Control, NativeType::Int) => CtrlInt,
            (Envelope::Control, NativeType::Float) => CtrlFloat,
            (Envelope::Control, NativeType::Enum) => CtrlEnum,
            (Envelope::Control, NativeType::Char) => CtrlChar,
            (Envelope::Control, NativeType::Long) => CtrlLong,
            (Envelope::Control, NativeType::Double) => CtrlDouble,
            // The sparse forms are not reachable by promotion.
            (_, native) => return Err(TypeError::NoSuchType { native, envelope }),
        };
        Ok(t)
    }

    /// The native type of the value array that follows the metadata.
    ///
    /// Differs from [`native`](Self::native) only for the sparse forms:
    /// PutAckt/PutAcks carry one 16-bit setting, StsackString and ClassName
    /// carry 40-byte strings.
    pub const fn value_type(self) -> NativeType {
        match self {
            DbrType::PutAckt | DbrType::PutAcks => NativeType::Enum,
            DbrType::StsackString | DbrType::ClassName => NativeType::String,
            other => other.native(),
        }
    }

    /// Bytes of one value element.
    pub const fn element_size(self) -> usize {
        self.value_type().element_size()
    }

    /// Bytes of envelope metadata preceding the value array, including the
    /// RISC alignment padding of the C layouts.
    pub const fn metadata_size(self) -> usize {
        use DbrType::*;
        match self {
            String | Int | Float | Enum | Char | Long | Double => 0,
            StsString | StsInt | StsFloat | StsEnum | StsLong => 4,
            StsChar => 5,
            StsDouble => 8,
            TimeString | TimeFloat | TimeLong => 12,
            TimeInt | TimeEnum => 14,
            TimeChar => 15,
            TimeDouble => 16,
            GrString | CtrlString => 4,
            GrInt => 24,
            GrFloat => 40,
            GrEnum | CtrlEnum => 422,
            GrChar => 19,
            GrLong => 36,
            GrDouble => 64,
            CtrlInt => 28,
            CtrlFloat => 48,
            CtrlChar => 21,
            CtrlLong => 44,
            CtrlDouble => 80,
            PutAckt | PutAcks => 0,
            StsackString => 8,
            ClassName => 0,
        }
    }

    /// On-wire payload size for `count` elements, 8-byte aligned.
    pub const fn payload_size(self, count: u32) -> usize {
        let raw = self.metadata_size() + self.element_size() * count as usize;
        raw.div_ceil(8) * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrip() {
        for id in 0u16..=38 {
            let t = DbrType::try_from(id).unwrap();
            assert_eq!(u16::from(t), id);
        }
        assert_eq!(DbrType::try_from(39), Err(UnknownDbrType(39)));
    }

    #[test]
    fn parts_roundtrip_over_the_lattice() {
        for id in 0u16..=34 {
            let t = DbrType::try_from(id).unwrap();
            assert_eq!(DbrType::from_parts(t.native(), t.envelope()).unwrap(), t);
        }
    }

    #[test]
    fn sparse_forms_not_reachable_by_promotion() {
        assert!(DbrType::from_parts(NativeType::Enum, Envelope::PutAckt).is_err());
        assert!(DbrType::from_parts(NativeType::String, Envelope::ClassName).is_err());
    }

    #[test]
    fn metadata_sizes_match_db_access_layouts() {
        assert_eq!(DbrType::Double.metadata_size(), 0);
        assert_eq!(DbrType::StsDouble.metadata_size(), 8);
        assert_eq!(DbrType::StsChar.metadata_size(), 5);
        assert_eq!(DbrType::TimeDouble.metadata_size(), 16);
        assert_eq!(DbrType::TimeChar.metadata_size(), 15);
        assert_eq!(DbrType::GrEnum.metadata_size(), 422);
        assert_eq!(DbrType::GrDouble.metadata_size(), 64);
        assert_eq!(DbrType::CtrlDouble.metadata_size(), 80);
        assert_eq!(DbrType::CtrlChar.metadata_size(), 21);
    }

    #[test]
    fn payload_sizes_are_aligned() {
        assert_eq!(DbrType::Int.payload_size(1), 8);
        assert_eq!(DbrType::Int.payload_size(5), 16);
        assert_eq!(DbrType::Double.payload_size(1), 8);
        assert_eq!(DbrType::StsChar.payload_size(1), 8);
        assert_eq!(DbrType::CtrlDouble.payload_size(2), 96);
        assert_eq!(DbrType::Long.payload_size(20_000), 80_000);
    }

    #[test]
    fn native_classification() {
        assert!(NativeType::Int.is_int());
        assert!(NativeType::Long.is_int());
        assert!(NativeType::Float.is_float());
        assert!(NativeType::Double.is_float());
        assert!(NativeType::String.is_string());
        assert!(NativeType::Char.is_char());
        assert!(NativeType::Enum.is_enum());
        assert!(!NativeType::Enum.is_int());
    }
}
