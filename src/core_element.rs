//! Core elements: the top-level XISF elements other than `<Image>`,
//! `<Property>` and `<Metadata>`.
//!
//! Each core element may carry a `uid` attribute; `<Reference>` elements
//! point back at those UIDs so color profiles, display functions and the
//! like can be shared between images and the unit header.

use std::fmt;
use std::str::FromStr;

use crate::data_block::DataBlock;
use crate::error::{Error, Result};
use crate::image::{ColorSpace, Geometry, PixelStorage, SampleFormat};

// ── Resolution ────────────────────────────────────────────────────────────────

/// Physical unit of a `<Resolution>` element, wire form `inch`/`cm`/`m`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolutionUnit {
    #[default]
    Inch,
    Centimeter,
    Meter,
}

impl ResolutionUnit {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Inch => "inch",
            Self::Centimeter => "cm",
            Self::Meter => "m",
        }
    }
}

impl fmt::Display for ResolutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for ResolutionUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inch" => Ok(Self::Inch),
            "cm" => Ok(Self::Centimeter),
            "m" => Ok(Self::Meter),
            other => Err(Error::UnknownEnumValue {
                attribute: "unit",
                value: other.to_string(),
            }),
        }
    }
}

// ── RGB working space gamma ───────────────────────────────────────────────────

/// Gamma of an RGB working space: a plain exponent or the sRGB curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Gamma {
    Value(f64),
    Srgb,
}

impl fmt::Display for Gamma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Srgb => f.write_str("sRGB"),
        }
    }
}

impl FromStr for Gamma {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("srgb") {
            return Ok(Self::Srgb);
        }
        s.trim()
            .parse::<f64>()
            .map(Self::Value)
            .map_err(|_| Error::MalformedXml(format!("gamma '{s}' is neither a number nor sRGB")))
    }
}

// ── Thumbnail ─────────────────────────────────────────────────────────────────

/// A reduced preview image carried alongside the unit or an image.
#[derive(Clone, Debug, PartialEq)]
pub struct Thumbnail {
    pub geometry: Geometry,
    pub sample_format: SampleFormat,
    pub color_space: ColorSpace,
    pub pixel_storage: PixelStorage,
    pub block: DataBlock,
    /// Materialized pixel bytes; `None` when thumbnail loading is disabled.
    pub pixels: Option<Vec<u8>>,
}

// ── Core elements ─────────────────────────────────────────────────────────────

/// Payload of a core element, tagged by its XML element name.
#[derive(Clone, Debug, PartialEq)]
pub enum CoreElementKind {
    /// `<Reference ref="…"/>` — points at another element's `uid`.
    Reference { reference: String },
    /// `<ColorFilterArray>` — sensor mosaic pattern, e.g. `RGGB`.
    ColorFilterArray {
        pattern: String,
        width: u32,
        height: u32,
        name: Option<String>,
    },
    /// `<Resolution>` — display density in pixels per unit.
    Resolution {
        horizontal: f64,
        vertical: f64,
        unit: ResolutionUnit,
    },
    /// `<FITSKeyword>` — a legacy FITS header card carried verbatim.
    FitsKeyword {
        name: String,
        value: String,
        comment: String,
    },
    /// `<ICCProfile>` — an ICC color profile data block.
    IccProfile {
        block: DataBlock,
        /// Materialized profile bytes.
        data: Option<Vec<u8>>,
    },
    /// `<RGBWorkingSpace>` — colorimetric definition of the RGB space.
    RgbWorkingSpace {
        gamma: Gamma,
        /// Chromaticity x coordinates of the R, G, B primaries.
        x: [f64; 3],
        /// Chromaticity y coordinates of the R, G, B primaries.
        y: [f64; 3],
        /// Relative luminances of the R, G, B primaries.
        luminance: [f64; 3],
        name: Option<String>,
    },
    /// `<DisplayFunction>` — screen-stretch parameters per channel (R, G, B
    /// and luminance).
    DisplayFunction {
        midtones: [f64; 4],
        shadows: [f64; 4],
        highlights: [f64; 4],
        low_range: [f64; 4],
        high_range: [f64; 4],
        name: Option<String>,
    },
    /// `<Thumbnail>` — preview image.
    Thumbnail(Thumbnail),
}

/// A core element plus its optional unique ID.
#[derive(Clone, Debug, PartialEq)]
pub struct CoreElement {
    pub uid: Option<String>,
    pub kind: CoreElementKind,
}

impl CoreElement {
    pub fn new(kind: CoreElementKind) -> Self {
        Self { uid: None, kind }
    }

    pub fn with_uid(uid: impl Into<String>, kind: CoreElementKind) -> Self {
        Self {
            uid: Some(uid.into()),
            kind,
        }
    }

    /// The XML element name this kind serializes to.
    pub fn tag_name(&self) -> &'static str {
        match &self.kind {
            CoreElementKind::Reference { .. } => "Reference",
            CoreElementKind::ColorFilterArray { .. } => "ColorFilterArray",
            CoreElementKind::Resolution { .. } => "Resolution",
            CoreElementKind::FitsKeyword { .. } => "FITSKeyword",
            CoreElementKind::IccProfile { .. } => "ICCProfile",
            CoreElementKind::RgbWorkingSpace { .. } => "RGBWorkingSpace",
            CoreElementKind::DisplayFunction { .. } => "DisplayFunction",
            CoreElementKind::Thumbnail(_) => "Thumbnail",
        }
    }
}

// ── Colon-separated float lists ───────────────────────────────────────────────

/// Parse a colon-separated list of exactly `N` floats, as used by
/// `RGBWorkingSpace` and `DisplayFunction` attributes.
pub(crate) fn parse_f64_array<const N: usize>(attr: &'static str, s: &str) -> Result<[f64; N]> {
    let mut out = [0f64; N];
    let mut count = 0;
    for field in s.split(':') {
        if count == N {
            return Err(Error::MalformedXml(format!(
                "{attr} expects {N} values, found more in '{s}'"
            )));
        }
        out[count] = field.trim().parse::<f64>().map_err(|_| {
            Error::MalformedXml(format!("{attr} field '{field}' is not a number"))
        })?;
        count += 1;
    }
    if count != N {
        return Err(Error::MalformedXml(format!(
            "{attr} expects {N} values, found {count} in '{s}'"
        )));
    }
    Ok(out)
}

/// Emit a colon-separated float list.
pub(crate) fn format_f64_list(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_unit_roundtrip() {
        for unit in [
            ResolutionUnit::Inch,
            ResolutionUnit::Centimeter,
            ResolutionUnit::Meter,
        ] {
            assert_eq!(unit.wire_name().parse::<ResolutionUnit>().unwrap(), unit);
        }
        assert!("furlong".parse::<ResolutionUnit>().is_err());
    }

    #[test]
    fn gamma_parse_and_emit() {
        assert_eq!("2.2".parse::<Gamma>().unwrap(), Gamma::Value(2.2));
        assert_eq!("sRGB".parse::<Gamma>().unwrap(), Gamma::Srgb);
        assert_eq!("SRGB".parse::<Gamma>().unwrap(), Gamma::Srgb);
        assert_eq!(Gamma::Srgb.to_string(), "sRGB");
        assert_eq!(Gamma::Value(1.8).to_string(), "1.8");
        assert!("soft".parse::<Gamma>().is_err());
    }

    #[test]
    fn f64_list_roundtrip() {
        let values = parse_f64_array::<3>("x", "0.64:0.3:0.15").unwrap();
        assert_eq!(values, [0.64, 0.3, 0.15]);
        assert_eq!(format_f64_list(&values), "0.64:0.3:0.15");
    }

    #[test]
    fn f64_list_arity_is_enforced() {
        assert!(parse_f64_array::<3>("x", "1:2").is_err());
        assert!(parse_f64_array::<3>("x", "1:2:3:4").is_err());
        assert!(parse_f64_array::<3>("x", "1:two:3").is_err());
    }

    #[test]
    fn tag_names() {
        let element = CoreElement::new(CoreElementKind::Reference {
            reference: "icc0".into(),
        });
        assert_eq!(element.tag_name(), "Reference");
        let element = CoreElement::with_uid(
            "k1",
            CoreElementKind::FitsKeyword {
                name: "EXPTIME".into(),
                value: "300.0".into(),
                comment: "exposure seconds".into(),
            },
        );
        assert_eq!(element.tag_name(), "FITSKeyword");
        assert_eq!(element.uid.as_deref(), Some("k1"));
    }
}
