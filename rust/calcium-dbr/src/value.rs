//! Native value arrays and conversions between compatible shapes.

use std::borrow::Cow;

use bytes::BufMut;

use calcium_wire::{MAX_STRING_SIZE, string::trim_string};

use crate::error::TypeError;
use crate::types::NativeType;

/// A 40-byte fixed-width wire string.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EpicsString(pub [u8; MAX_STRING_SIZE]);

impl EpicsString {
    /// Build from text. The value must leave room for a terminating NUL.
    pub fn new(s: &str) -> Result<EpicsString, TypeError> {
        if s.len() >= MAX_STRING_SIZE {
            return Err(TypeError::StringTooLong {
                len: s.len(),
                max: MAX_STRING_SIZE - 1,
            });
        }
        let mut bytes = [0u8; MAX_STRING_SIZE];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Ok(EpicsString(bytes))
    }

    /// The bytes up to the first NUL.
    pub fn as_bytes(&self) -> &[u8] {
        trim_string(&self.0)
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl Default for EpicsString {
    fn default() -> Self {
        EpicsString([0u8; MAX_STRING_SIZE])
    }
}

impl std::fmt::Debug for EpicsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EpicsString({:?})", self.to_string_lossy())
    }
}

impl std::fmt::Display for EpicsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

/// Context for conversions that need envelope information.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertCtx<'a> {
    /// Display precision from graphic/control metadata.
    pub precision: Option<i16>,
    /// Enum state table from graphic/control metadata.
    pub enum_strings: Option<&'a [String]>,
}

/// An owned native array, one variant per native type.
#[derive(Debug, Clone, PartialEq)]
pub enum DbrValue {
    String(Vec<EpicsString>),
    Int(Vec<i16>),
    Float(Vec<f32>),
    Enum(Vec<u16>),
    Char(Vec<u8>),
    Long(Vec<i32>),
    Double(Vec<f64>),
}

impl DbrValue {
    pub fn native_type(&self) -> NativeType {
        match self {
            DbrValue::String(_) => NativeType::String,
            DbrValue::Int(_) => NativeType::Int,
            DbrValue::Float(_) => NativeType::Float,
            DbrValue::Enum(_) => NativeType::Enum,
            DbrValue::Char(_) => NativeType::Char,
            DbrValue::Long(_) => NativeType::Long,
            DbrValue::Double(_) => NativeType::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DbrValue::String(v) => v.len(),
            DbrValue::Int(v) => v.len(),
            DbrValue::Float(v) => v.len(),
            DbrValue::Enum(v) => v.len(),
            DbrValue::Char(v) => v.len(),
            DbrValue::Long(v) => v.len(),
            DbrValue::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse `count` big-endian elements of `native` from exactly
    /// `count * element_size` bytes.
    pub fn parse(native: NativeType, count: u32, data: &[u8]) -> Result<DbrValue, TypeError> {
        let count = count as usize;
        let needed = count * native.element_size();
        if data.len() < needed {
            return Err(TypeError::ShortBuffer {
                needed,
                got: data.len(),
            });
        }
        Ok(match native {
            NativeType::String => DbrValue::String(
                data.chunks_exact(MAX_STRING_SIZE)
                    .take(count)
                    .map(|c| EpicsString(c.try_into().expect("chunk width")))
                    .collect(),
            ),
            NativeType::Int => DbrValue::Int(
                data.chunks_exact(2)
                    .take(count)
                    .map(|c| i16::from_be_bytes([c[0], c[1]]))
                    .collect(),
            ),
            NativeType::Float => DbrValue::Float(
                data.chunks_exact(4)
                    .take(count)
                    .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            NativeType::Enum => DbrValue::Enum(
                data.chunks_exact(2)
                    .take(count)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect(),
            ),
            NativeType::Char => DbrValue::Char(data[..count].to_vec()),
            NativeType::Long => DbrValue::Long(
                data.chunks_exact(4)
                    .take(count)
                    .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            NativeType::Double => DbrValue::Double(
                data.chunks_exact(8)
                    .take(count)
                    .map(|c| {
                        f64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                    })
                    .collect(),
            ),
        })
    }

    /// Serialize big-endian, unpadded.
    pub fn write_to(&self, buf: &mut impl BufMut) {
        match self {
            DbrValue::String(v) => {
                for s in v {
                    buf.put_slice(&s.0);
                }
            }
            DbrValue::Int(v) => {
                for &x in v {
                    buf.put_i16(x);
                }
            }
            DbrValue::Float(v) => {
                for &x in v {
                    buf.put_f32(x);
                }
            }
            DbrValue::Enum(v) => {
                for &x in v {
                    buf.put_u16(x);
                }
            }
            DbrValue::Char(v) => buf.put_slice(v),
            DbrValue::Long(v) => {
                for &x in v {
                    buf.put_i32(x);
                }
            }
            DbrValue::Double(v) => {
                for &x in v {
                    buf.put_f64(x);
                }
            }
        }
    }

    /// Convert element-wise to another native type.
    ///
    /// Float to int truncates toward zero. Numeric to string formats with
    /// the context's precision when the source is floating. String to
    /// number parses whole tokens only. Enum/string conversions use the
    /// context's state table.
    pub fn convert_to(&self, to: NativeType, ctx: &ConvertCtx<'_>) -> Result<DbrValue, TypeError> {
        let from = self.native_type();
        if from == to {
            return Ok(self.clone());
        }

        match (self, to) {
            // Enum to string goes through the state table.
            (DbrValue::Enum(v), NativeType::String) => {
                let strings = ctx.enum_strings.ok_or(TypeError::NoConversion { from, to })?;
                let mut out = Vec::with_capacity(v.len());
                for &index in v {
                    let s = strings
                        .get(index as usize)
                        .ok_or(TypeError::BadEnumIndex {
                            index,
                            states: strings.len(),
                        })?;
                    out.push(EpicsString::new(s)?);
                }
                Ok(DbrValue::String(out))
            }
            // String to enum looks states up by name.
            (DbrValue::String(v), NativeType::Enum) => {
                let strings = ctx.enum_strings.ok_or(TypeError::NoConversion { from, to })?;
                let mut out = Vec::with_capacity(v.len());
                for s in v {
                    let text = s.to_string_lossy();
                    let index = strings
                        .iter()
                        .position(|candidate| candidate == text.as_ref())
                        .ok_or_else(|| TypeError::UnknownEnumString(text.into_owned()))?;
                    out.push(index as u16);
                }
                Ok(DbrValue::Enum(out))
            }
            (DbrValue::String(v), _) => {
                let mut out = Vec::with_capacity(v.len());
                for s in v {
                    out.push(parse_number(&s.to_string_lossy())?);
                }
                from_f64s(&out, to, /* truncate */ false)
            }
            (_, NativeType::String) => {
                let vals = self.to_f64s();
                let mut out = Vec::with_capacity(vals.len());
                let precision = ctx.precision.filter(|&p| p >= 0 && from.is_float());
                for v in vals {
                    let text = match precision {
                        Some(p) => format!("{:.*}", p as usize, v),
                        None => format_number(v, from),
                    };
                    out.push(EpicsString::new(&text)?);
                }
                Ok(DbrValue::String(out))
            }
            (_, NativeType::Enum) => {
                let vals = self.to_f64s();
                if let Some(strings) = ctx.enum_strings {
                    for &v in &vals {
                        if v < 0.0 || v as usize >= strings.len() {
                            return Err(TypeError::BadEnumIndex {
                                index: v as u16,
                                states: strings.len(),
                            });
                        }
                    }
                }
                from_f64s(&vals, to, from.is_float())
            }
            _ => {
                let vals = self.to_f64s();
                from_f64s(&vals, to, from.is_float())
            }
        }
    }

    fn to_f64s(&self) -> Vec<f64> {
        match self {
            DbrValue::Int(v) => v.iter().map(|&x| x as f64).collect(),
            DbrValue::Float(v) => v.iter().map(|&x| x as f64).collect(),
            DbrValue::Enum(v) => v.iter().map(|&x| x as f64).collect(),
            DbrValue::Char(v) => v.iter().map(|&x| x as f64).collect(),
            DbrValue::Long(v) => v.iter().map(|&x| x as f64).collect(),
            DbrValue::Double(v) => v.clone(),
            DbrValue::String(_) => unreachable!("string handled by caller"),
        }
    }
}

/// Format a number the way its source type reads: integers without a
/// decimal point, floats with shortest-exact formatting.
fn format_number(v: f64, from: NativeType) -> String {
    if from.is_float() {
        format!("{}", v)
    } else {
        format!("{}", v as i64)
    }
}

/// Parse one whole numeric token. Integers and floats both accepted.
fn parse_number(s: &str) -> Result<f64, TypeError> {
    let token = s.trim();
    if token.is_empty() {
        return Err(TypeError::UnparsableString(s.to_string()));
    }
    token
        .parse::<f64>()
        .map_err(|_| TypeError::UnparsableString(s.to_string()))
}

fn from_f64s(vals: &[f64], to: NativeType, truncate: bool) -> Result<DbrValue, TypeError> {
    fn to_integral(v: f64, truncate: bool, lo: f64, hi: f64, to: NativeType) -> Result<f64, TypeError> {
        let v = if truncate { v.trunc() } else { v };
        if v.is_nan() || v < lo || v > hi || v.fract() != 0.0 {
            return Err(TypeError::OutOfRange { value: v, to });
        }
        Ok(v)
    }

    Ok(match to {
        NativeType::Int => DbrValue::Int(
            vals.iter()
                .map(|&v| to_integral(v, truncate, i16::MIN as f64, i16::MAX as f64, to).map(|v| v as i16))
                .collect::<Result<_, _>>()?,
        ),
        NativeType::Long => DbrValue::Long(
            vals.iter()
                .map(|&v| to_integral(v, truncate, i32::MIN as f64, i32::MAX as f64, to).map(|v| v as i32))
                .collect::<Result<_, _>>()?,
        ),
        NativeType::Char => DbrValue::Char(
            vals.iter()
                .map(|&v| to_integral(v, truncate, 0.0, u8::MAX as f64, to).map(|v| v as u8))
                .collect::<Result<_, _>>()?,
        ),
        NativeType::Enum => DbrValue::Enum(
            vals.iter()
                .map(|&v| to_integral(v, truncate, 0.0, u16::MAX as f64, to).map(|v| v as u16))
                .collect::<Result<_, _>>()?,
        ),
        NativeType::Float => DbrValue::Float(vals.iter().map(|&v| v as f32).collect()),
        NativeType::Double => DbrValue::Double(vals.to_vec()),
        NativeType::String => unreachable!("string handled by caller"),
    })
}
