//! Image records: geometry, sample format, color space and pixel storage.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::core_element::CoreElement;
use crate::data_block::DataBlock;
use crate::error::{Error, Result};
use crate::property::Property;

// ── Geometry ──────────────────────────────────────────────────────────────────

/// Ordered image dimensions plus the channel count, wire form
/// `d1:d2:…:channels` (at least one dimension, all fields positive).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub dimensions: Vec<u64>,
    pub channels: u64,
}

impl Geometry {
    pub fn new(dimensions: Vec<u64>, channels: u64) -> Self {
        Self {
            dimensions,
            channels,
        }
    }

    /// Samples per channel (product of the dimensions).
    pub fn pixels_per_channel(&self) -> u64 {
        self.dimensions.iter().product()
    }

    /// Total sample count across channels.
    pub fn sample_count(&self) -> u64 {
        self.pixels_per_channel() * self.channels
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.dimensions {
            write!(f, "{d}:")?;
        }
        write!(f, "{}", self.channels)
    }
}

impl FromStr for Geometry {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split(':').collect();
        if fields.len() < 2 {
            return Err(Error::MalformedXml(format!(
                "geometry '{s}' needs at least one dimension and a channel count"
            )));
        }
        let mut values = Vec::with_capacity(fields.len());
        for field in &fields {
            let v: u64 = field.trim().parse().map_err(|_| {
                Error::MalformedXml(format!("geometry field '{field}' is not a positive integer"))
            })?;
            if v == 0 {
                return Err(Error::MalformedXml(format!(
                    "geometry '{s}' contains a zero field"
                )));
            }
            values.push(v);
        }
        let channels = values.pop().unwrap_or(1);
        Ok(Self {
            dimensions: values,
            channels,
        })
    }
}

// ── Sample format ─────────────────────────────────────────────────────────────

/// Pixel sample representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Complex32,
    Complex64,
}

impl SampleFormat {
    /// Byte width of one sample.
    pub fn item_size(self) -> u64 {
        match self {
            Self::UInt8 => 1,
            Self::UInt16 => 2,
            Self::UInt32 | Self::Float32 => 4,
            Self::UInt64 | Self::Float64 | Self::Complex32 => 8,
            Self::Complex64 => 16,
        }
    }

    /// Floating-point and complex images require explicit sample bounds.
    pub fn requires_bounds(self) -> bool {
        matches!(
            self,
            Self::Float32 | Self::Float64 | Self::Complex32 | Self::Complex64
        )
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::Complex32 => "Complex32",
            Self::Complex64 => "Complex64",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UInt8" => Ok(Self::UInt8),
            "UInt16" => Ok(Self::UInt16),
            "UInt32" => Ok(Self::UInt32),
            "UInt64" => Ok(Self::UInt64),
            "Float32" => Ok(Self::Float32),
            "Float64" => Ok(Self::Float64),
            "Complex32" => Ok(Self::Complex32),
            "Complex64" => Ok(Self::Complex64),
            other => Err(Error::UnknownEnumValue {
                attribute: "sampleFormat",
                value: other.to_string(),
            }),
        }
    }
}

// ── Color space / pixel storage ───────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorSpace {
    #[default]
    Gray,
    Rgb,
    CieLab,
}

impl ColorSpace {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Gray => "Gray",
            Self::Rgb => "RGB",
            Self::CieLab => "CIELab",
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for ColorSpace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Gray" => Ok(Self::Gray),
            "RGB" => Ok(Self::Rgb),
            "CIELab" => Ok(Self::CieLab),
            other => Err(Error::UnknownEnumValue {
                attribute: "colorSpace",
                value: other.to_string(),
            }),
        }
    }
}

/// Channel layout of the pixel payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelStorage {
    /// One contiguous plane per channel.
    #[default]
    Planar,
    /// Channel-interleaved samples.
    Normal,
}

impl PixelStorage {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Planar => "Planar",
            Self::Normal => "Normal",
        }
    }
}

impl fmt::Display for PixelStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for PixelStorage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Planar" => Ok(Self::Planar),
            "Normal" => Ok(Self::Normal),
            other => Err(Error::UnknownEnumValue {
                attribute: "pixelStorage",
                value: other.to_string(),
            }),
        }
    }
}

// ── Image type ────────────────────────────────────────────────────────────────

/// Calibration role of an image within the unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageType {
    Bias,
    Dark,
    Flat,
    Light,
    MasterBias,
    MasterDark,
    MasterFlat,
    MasterLight,
    DefectMap,
    RejectionMapHigh,
    RejectionMapLow,
    BinaryRejectionMapHigh,
    BinaryRejectionMapLow,
    SlopeMap,
    WeightMap,
}

impl ImageType {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Bias => "Bias",
            Self::Dark => "Dark",
            Self::Flat => "Flat",
            Self::Light => "Light",
            Self::MasterBias => "MasterBias",
            Self::MasterDark => "MasterDark",
            Self::MasterFlat => "MasterFlat",
            Self::MasterLight => "MasterLight",
            Self::DefectMap => "DefectMap",
            Self::RejectionMapHigh => "RejectionMapHigh",
            Self::RejectionMapLow => "RejectionMapLow",
            Self::BinaryRejectionMapHigh => "BinaryRejectionMapHigh",
            Self::BinaryRejectionMapLow => "BinaryRejectionMapLow",
            Self::SlopeMap => "SlopeMap",
            Self::WeightMap => "WeightMap",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for ImageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Bias" => Ok(Self::Bias),
            "Dark" => Ok(Self::Dark),
            "Flat" => Ok(Self::Flat),
            "Light" => Ok(Self::Light),
            "MasterBias" => Ok(Self::MasterBias),
            "MasterDark" => Ok(Self::MasterDark),
            "MasterFlat" => Ok(Self::MasterFlat),
            "MasterLight" => Ok(Self::MasterLight),
            "DefectMap" => Ok(Self::DefectMap),
            "RejectionMapHigh" => Ok(Self::RejectionMapHigh),
            "RejectionMapLow" => Ok(Self::RejectionMapLow),
            "BinaryRejectionMapHigh" => Ok(Self::BinaryRejectionMapHigh),
            "BinaryRejectionMapLow" => Ok(Self::BinaryRejectionMapLow),
            "SlopeMap" => Ok(Self::SlopeMap),
            "WeightMap" => Ok(Self::WeightMap),
            other => Err(Error::UnknownEnumValue {
                attribute: "imageType",
                value: other.to_string(),
            }),
        }
    }
}

// ── Orientation ───────────────────────────────────────────────────────────────

/// Display rotation in degrees. A quarter turn clockwise is spelled `-90` on
/// the wire; `270` is accepted as a synonym on parse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Ccw90,
    Half,
    Cw90,
}

/// Display orientation: a rotation plus an optional horizontal flip, wire
/// form `<rotation>[;flip]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Orientation {
    pub rotation: Rotation,
    pub flip: bool,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rotation = match self.rotation {
            Rotation::None => "0",
            Rotation::Ccw90 => "90",
            Rotation::Half => "180",
            Rotation::Cw90 => "-90",
        };
        if self.flip {
            write!(f, "{rotation};flip")
        } else {
            f.write_str(rotation)
        }
    }
}

impl FromStr for Orientation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (rotation, flip) = match s.split_once(';') {
            Some((r, "flip")) => (r, true),
            Some(_) => {
                return Err(Error::UnknownEnumValue {
                    attribute: "orientation",
                    value: s.to_string(),
                })
            }
            None => (s, false),
        };
        let rotation = match rotation.trim() {
            "0" => Rotation::None,
            "90" => Rotation::Ccw90,
            "180" => Rotation::Half,
            "-90" | "270" => Rotation::Cw90,
            _ => {
                return Err(Error::UnknownEnumValue {
                    attribute: "orientation",
                    value: s.to_string(),
                })
            }
        };
        Ok(Self { rotation, flip })
    }
}

// ── Bounds ────────────────────────────────────────────────────────────────────

/// Representable sample range, wire form `lower:upper` with `lower < upper`.
/// Mandatory for floating-point and complex sample formats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub fn is_well_formed(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite() && self.lower < self.upper
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lower, self.upper)
    }
}

impl FromStr for Bounds {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (lower, upper) = s
            .split_once(':')
            .ok_or_else(|| Error::MalformedXml(format!("bounds '{s}' is not 'lower:upper'")))?;
        let parse = |field: &str| {
            field
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::MalformedXml(format!("bounds field '{field}' is not a number")))
        };
        Ok(Self {
            lower: parse(lower)?,
            upper: parse(upper)?,
        })
    }
}

// ── Image ─────────────────────────────────────────────────────────────────────

/// One multidimensional pixel array with its metadata.
///
/// `pixels` holds the materialized (decompressed) payload in the block's
/// stored byte order; it is `None` after a header-only read or when external
/// references were left unresolved. `block` records how the payload was (or
/// will be) stored; attachment positions are recomputed on every write.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub geometry: Geometry,
    pub sample_format: SampleFormat,
    pub color_space: ColorSpace,
    pub bounds: Option<Bounds>,
    pub pixel_storage: PixelStorage,
    pub image_type: Option<ImageType>,
    pub offset: Option<f64>,
    pub orientation: Option<Orientation>,
    pub id: Option<String>,
    pub uuid: Option<Uuid>,
    pub properties: Vec<Property>,
    pub elements: Vec<CoreElement>,
    pub block: DataBlock,
    pub pixels: Option<Vec<u8>>,
}

impl Image {
    /// An image whose pixel payload will be stored as an attached block.
    pub fn new(
        geometry: Geometry,
        sample_format: SampleFormat,
        color_space: ColorSpace,
        pixels: Vec<u8>,
    ) -> Self {
        Self {
            geometry,
            sample_format,
            color_space,
            bounds: None,
            pixel_storage: PixelStorage::default(),
            image_type: None,
            offset: None,
            orientation: None,
            id: None,
            uuid: None,
            properties: Vec::new(),
            elements: Vec::new(),
            block: DataBlock::attachment(0, 0),
            pixels: Some(pixels),
        }
    }

    /// Byte length the pixel payload must have for this geometry and format.
    pub fn expected_pixel_bytes(&self) -> u64 {
        self.geometry.sample_count() * self.sample_format.item_size()
    }
}
