//! XISF properties: typed key/value records attached to units and images.
//!
//! A property is tagged by value shape: scalar, complex, string, time point,
//! vector, matrix or table. Scalar-like values travel in the `value`
//! attribute; strings in element text; vector and matrix payloads as
//! little-endian packed data blocks.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::error::{Error, Result};

/// Canonical property identifier grammar (single-colon namespacing).
static PROPERTY_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[_A-Za-z][_A-Za-z0-9]*(:[_A-Za-z][_A-Za-z0-9]*)*$").unwrap()
});

/// Core-element unique identifier grammar.
static UID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[_A-Za-z][_A-Za-z0-9]*$").unwrap());

pub fn is_valid_property_id(id: &str) -> bool {
    PROPERTY_ID.is_match(id)
}

pub fn is_valid_uid(uid: &str) -> bool {
    UID.is_match(uid)
}

/// The `value` attribute emit format for time points.
const TIME_POINT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

// ── Scalars ───────────────────────────────────────────────────────────────────

/// A scalar property value, tagged by its XISF type name.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    Boolean(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "Boolean",
            Self::Int8(_) => "Int8",
            Self::UInt8(_) => "UInt8",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float32(_) => "Float32",
            Self::Float64(_) => "Float64",
        }
    }

    /// Locale-invariant text form. Rust's float `Display` is shortest-exact,
    /// which stays within 9 (f32) / 17 (f64) significant digits.
    pub fn to_value_string(&self) -> String {
        match self {
            Self::Boolean(v) => v.to_string(),
            Self::Int8(v) => v.to_string(),
            Self::UInt8(v) => v.to_string(),
            Self::Int16(v) => v.to_string(),
            Self::UInt16(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::UInt32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::UInt64(v) => v.to_string(),
            Self::Float32(v) => v.to_string(),
            Self::Float64(v) => v.to_string(),
        }
    }

    pub(crate) fn parse(type_name: &str, text: &str) -> Result<Self> {
        let text = text.trim();
        let bad = || Error::MalformedXml(format!("'{text}' is not a valid {type_name}"));
        Ok(match type_name {
            "Boolean" => match text {
                "true" | "1" => Self::Boolean(true),
                "false" | "0" => Self::Boolean(false),
                _ => return Err(bad()),
            },
            "Int8" => Self::Int8(text.parse().map_err(|_| bad())?),
            "UInt8" => Self::UInt8(text.parse().map_err(|_| bad())?),
            "Int16" => Self::Int16(text.parse().map_err(|_| bad())?),
            "UInt16" => Self::UInt16(text.parse().map_err(|_| bad())?),
            "Int32" => Self::Int32(text.parse().map_err(|_| bad())?),
            "UInt32" => Self::UInt32(text.parse().map_err(|_| bad())?),
            "Int64" => Self::Int64(text.parse().map_err(|_| bad())?),
            "UInt64" => Self::UInt64(text.parse().map_err(|_| bad())?),
            "Float32" => Self::Float32(text.parse().map_err(|_| bad())?),
            "Float64" => Self::Float64(text.parse().map_err(|_| bad())?),
            other => {
                return Err(Error::UnknownEnumValue {
                    attribute: "type",
                    value: other.to_string(),
                })
            }
        })
    }
}

// ── Vector / matrix element kinds ─────────────────────────────────────────────

/// Element type of a packed vector or matrix payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    I8,
    UI8,
    I16,
    UI16,
    I32,
    UI32,
    I64,
    UI64,
    F32,
    F64,
    C32,
    C64,
}

impl ElementKind {
    /// Byte width of one element.
    pub fn item_size(self) -> u64 {
        match self {
            Self::I8 | Self::UI8 => 1,
            Self::I16 | Self::UI16 => 2,
            Self::I32 | Self::UI32 | Self::F32 => 4,
            Self::I64 | Self::UI64 | Self::F64 | Self::C32 => 8,
            Self::C64 => 16,
        }
    }

    fn short_name(self) -> &'static str {
        match self {
            Self::I8 => "I8",
            Self::UI8 => "UI8",
            Self::I16 => "I16",
            Self::UI16 => "UI16",
            Self::I32 => "I32",
            Self::UI32 => "UI32",
            Self::I64 => "I64",
            Self::UI64 => "UI64",
            Self::F32 => "F32",
            Self::F64 => "F64",
            Self::C32 => "C32",
            Self::C64 => "C64",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        // Canonical short names plus the long spellings some writers use.
        Some(match prefix {
            "I8" | "Int8" => Self::I8,
            "UI8" | "UInt8" | "Byte" => Self::UI8,
            "I16" | "Int16" => Self::I16,
            "UI16" | "UInt16" => Self::UI16,
            "I32" | "Int32" => Self::I32,
            "UI32" | "UInt32" => Self::UI32,
            "I64" | "Int64" => Self::I64,
            "UI64" | "UInt64" => Self::UI64,
            "F32" | "Float32" => Self::F32,
            "F64" | "Float64" => Self::F64,
            "C32" | "Complex32" => Self::C32,
            "C64" | "Complex64" => Self::C64,
            _ => return None,
        })
    }

    pub(crate) fn from_vector_type(type_name: &str) -> Option<Self> {
        if type_name == "ByteArray" {
            return Some(Self::UI8);
        }
        type_name
            .strip_suffix("Vector")
            .and_then(Self::from_prefix)
    }

    pub(crate) fn from_matrix_type(type_name: &str) -> Option<Self> {
        type_name
            .strip_suffix("Matrix")
            .and_then(Self::from_prefix)
    }
}

/// Packed numeric data of a vector or matrix property.
#[derive(Clone, Debug, PartialEq)]
pub enum VectorData {
    I8(Vec<i8>),
    UI8(Vec<u8>),
    I16(Vec<i16>),
    UI16(Vec<u16>),
    I32(Vec<i32>),
    UI32(Vec<u32>),
    I64(Vec<i64>),
    UI64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// `(re, im)` pairs.
    C32(Vec<(f32, f32)>),
    C64(Vec<(f64, f64)>),
}

impl VectorData {
    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::UI8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::UI16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::UI32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::UI64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::C32(v) => v.len(),
            Self::C64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Self::I8(_) => ElementKind::I8,
            Self::UI8(_) => ElementKind::UI8,
            Self::I16(_) => ElementKind::I16,
            Self::UI16(_) => ElementKind::UI16,
            Self::I32(_) => ElementKind::I32,
            Self::UI32(_) => ElementKind::UI32,
            Self::I64(_) => ElementKind::I64,
            Self::UI64(_) => ElementKind::UI64,
            Self::F32(_) => ElementKind::F32,
            Self::F64(_) => ElementKind::F64,
            Self::C32(_) => ElementKind::C32,
            Self::C64(_) => ElementKind::C64,
        }
    }

    /// Pack elements little-endian for block storage.
    pub(crate) fn to_le_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len() * self.kind().item_size() as usize);
        match self {
            Self::I8(v) => buf.extend(v.iter().map(|x| *x as u8)),
            Self::UI8(v) => buf.extend_from_slice(v),
            Self::I16(v) => v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes())),
            Self::UI16(v) => v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes())),
            Self::I32(v) => v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes())),
            Self::UI32(v) => v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes())),
            Self::I64(v) => v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes())),
            Self::UI64(v) => v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes())),
            Self::F32(v) => v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes())),
            Self::F64(v) => v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes())),
            Self::C32(v) => v.iter().for_each(|(re, im)| {
                buf.extend_from_slice(&re.to_le_bytes());
                buf.extend_from_slice(&im.to_le_bytes());
            }),
            Self::C64(v) => v.iter().for_each(|(re, im)| {
                buf.extend_from_slice(&re.to_le_bytes());
                buf.extend_from_slice(&im.to_le_bytes());
            }),
        }
        buf
    }

    /// Unpack a little-endian payload of `kind` elements.
    pub(crate) fn from_le_bytes(kind: ElementKind, bytes: &[u8]) -> Result<Self> {
        let item = kind.item_size() as usize;
        if bytes.len() % item != 0 {
            return Err(Error::CorruptBlock(format!(
                "vector payload of {} bytes is not a whole number of {item}-byte elements",
                bytes.len()
            )));
        }
        fn array<const N: usize>(chunk: &[u8]) -> [u8; N] {
            let mut a = [0u8; N];
            a.copy_from_slice(chunk);
            a
        }
        let chunks = bytes.chunks_exact(item);
        Ok(match kind {
            ElementKind::I8 => Self::I8(bytes.iter().map(|b| *b as i8).collect()),
            ElementKind::UI8 => Self::UI8(bytes.to_vec()),
            ElementKind::I16 => Self::I16(chunks.map(|c| i16::from_le_bytes(array(c))).collect()),
            ElementKind::UI16 => Self::UI16(chunks.map(|c| u16::from_le_bytes(array(c))).collect()),
            ElementKind::I32 => Self::I32(chunks.map(|c| i32::from_le_bytes(array(c))).collect()),
            ElementKind::UI32 => Self::UI32(chunks.map(|c| u32::from_le_bytes(array(c))).collect()),
            ElementKind::I64 => Self::I64(chunks.map(|c| i64::from_le_bytes(array(c))).collect()),
            ElementKind::UI64 => Self::UI64(chunks.map(|c| u64::from_le_bytes(array(c))).collect()),
            ElementKind::F32 => Self::F32(chunks.map(|c| f32::from_le_bytes(array(c))).collect()),
            ElementKind::F64 => Self::F64(chunks.map(|c| f64::from_le_bytes(array(c))).collect()),
            ElementKind::C32 => Self::C32(
                chunks
                    .map(|c| {
                        (
                            f32::from_le_bytes(array(&c[..4])),
                            f32::from_le_bytes(array(&c[4..])),
                        )
                    })
                    .collect(),
            ),
            ElementKind::C64 => Self::C64(
                chunks
                    .map(|c| {
                        (
                            f64::from_le_bytes(array(&c[..8])),
                            f64::from_le_bytes(array(&c[8..])),
                        )
                    })
                    .collect(),
            ),
        })
    }
}

// ── Table ─────────────────────────────────────────────────────────────────────

/// A rows × columns table of string cells.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

// ── PropertyValue ─────────────────────────────────────────────────────────────

/// A property value, tagged by shape.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Scalar(Scalar),
    Complex32(f32, f32),
    Complex64(f64, f64),
    String(String),
    TimePoint(DateTime<FixedOffset>),
    Vector(VectorData),
    Matrix {
        rows: u64,
        columns: u64,
        data: VectorData,
    },
    Table(Table),
}

impl PropertyValue {
    /// XISF `type` attribute value for this shape.
    pub fn type_name(&self) -> String {
        match self {
            Self::Scalar(s) => s.type_name().to_string(),
            Self::Complex32(..) => "Complex32".to_string(),
            Self::Complex64(..) => "Complex64".to_string(),
            Self::String(_) => "String".to_string(),
            Self::TimePoint(_) => "TimePoint".to_string(),
            Self::Vector(data) => format!("{}Vector", data.kind().short_name()),
            Self::Matrix { data, .. } => format!("{}Matrix", data.kind().short_name()),
            Self::Table(_) => "Table".to_string(),
        }
    }

    /// The `value` attribute content for scalar-like shapes; `None` for
    /// strings (element text) and block-backed shapes.
    pub(crate) fn attr_value(&self) -> Option<String> {
        match self {
            Self::Scalar(s) => Some(s.to_value_string()),
            Self::Complex32(re, im) => Some(format!("({re},{im})")),
            Self::Complex64(re, im) => Some(format!("({re},{im})")),
            Self::TimePoint(t) => Some(t.format(TIME_POINT_FORMAT).to_string()),
            Self::String(_) | Self::Vector(_) | Self::Matrix { .. } | Self::Table(_) => None,
        }
    }
}

/// Parse a `(re,im)` complex literal.
pub(crate) fn parse_complex(text: &str) -> Result<(f64, f64)> {
    let inner = text
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| Error::MalformedXml(format!("'{text}' is not a (re,im) pair")))?;
    let (re, im) = inner
        .split_once(',')
        .ok_or_else(|| Error::MalformedXml(format!("'{text}' is not a (re,im) pair")))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|_| Error::MalformedXml(format!("'{s}' is not a number")))
    };
    Ok((parse(re)?, parse(im)?))
}

/// Parse an ISO-8601 time point. Stamps without an offset are taken as UTC.
pub fn parse_time_point(text: &str) -> Result<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t);
    }
    // Offset-free stamps occur in the wild; read them as UTC.
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            tracing::warn!("time point '{text}' carries no offset, assuming UTC");
            return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }
    Err(Error::MalformedXml(format!(
        "'{text}' is not an ISO-8601 time point"
    )))
}

// ── Property ──────────────────────────────────────────────────────────────────

/// A named property record.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub id: String,
    pub value: PropertyValue,
    pub comment: Option<String>,
    pub format: Option<String>,
}

impl Property {
    pub fn new(id: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            id: id.into(),
            value,
            comment: None,
            format: None,
        }
    }

    /// Shorthand for free-text properties.
    pub fn string(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(id, PropertyValue::String(value.into()))
    }
}
