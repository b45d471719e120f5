//! Structural validation of units before they are written.
//!
//! Checks are pure (no I/O): mandatory metadata, identifier grammar, UID
//! uniqueness, reference integrity, geometry sanity and bounds requirements.
//! Errors block publication; warnings are reported and logged but never do.

use std::collections::HashSet;

use crate::core_element::{CoreElementKind, Thumbnail};
use crate::image::Image;
use crate::property::{is_valid_property_id, is_valid_uid, Property};
use crate::unit::Unit;

/// Outcome of a validation pass.
#[derive(Clone, Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// True when nothing blocks writing the unit.
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Validate a unit's structure.
pub fn validate_unit(unit: &Unit) -> ValidationResult {
    let mut result = ValidationResult::default();
    let header = &unit.header;

    // Metadata.
    if header.metadata.creator_application.trim().is_empty() {
        result.error("metadata is missing a creator application");
    }
    check_properties(&header.metadata.extra, "metadata", &mut result);
    check_properties(&header.properties, "unit", &mut result);

    // UIDs: grammar and uniqueness across the whole header.
    let mut seen_uids = HashSet::new();
    for element in header.all_core_elements() {
        if let Some(uid) = &element.uid {
            if !is_valid_uid(uid) {
                result.error(format!(
                    "<{}> uid '{uid}' is not a valid identifier",
                    element.tag_name()
                ));
            } else if !seen_uids.insert(uid.as_str()) {
                result.error(format!("uid '{uid}' is used by more than one element"));
            }
        }
    }

    // Reference targets.
    for element in header.all_core_elements() {
        if let CoreElementKind::Reference { reference } = &element.kind {
            if header.element_by_uid(reference).is_none() {
                result.error(format!("<Reference> points at unknown uid '{reference}'"));
            }
        }
        if let CoreElementKind::Thumbnail(thumbnail) = &element.kind {
            check_thumbnail(thumbnail, &mut result);
        }
    }

    // Images.
    for (index, image) in header.images.iter().enumerate() {
        check_image(image, index, &mut result);
    }

    for warning in &result.warnings {
        tracing::warn!("validation: {warning}");
    }
    result
}

fn check_image(image: &Image, index: usize, result: &mut ValidationResult) {
    let label = image
        .id
        .clone()
        .unwrap_or_else(|| format!("image #{index}"));

    if image.geometry.dimensions.is_empty() {
        result.error(format!("{label}: geometry has no dimensions"));
    }
    if image.geometry.dimensions.iter().any(|&d| d == 0) {
        result.error(format!("{label}: geometry contains a zero dimension"));
    }
    if image.geometry.channels == 0 {
        result.error(format!("{label}: channel count must be at least 1"));
    }

    if image.sample_format.requires_bounds() {
        match &image.bounds {
            None => result.error(format!(
                "{label}: {} images require a bounds attribute",
                image.sample_format
            )),
            Some(bounds) if !bounds.is_well_formed() => result.error(format!(
                "{label}: bounds {bounds} are not an increasing finite range"
            )),
            Some(_) => {}
        }
    }

    if let Some(offset) = image.offset {
        if !(offset >= 0.0) {
            result.error(format!("{label}: offset {offset} must be non-negative"));
        }
    }

    if let Some(id) = &image.id {
        if !is_valid_uid(id) {
            result.error(format!("image id '{id}' is not a valid identifier"));
        }
    }

    if let Some(pixels) = &image.pixels {
        let expected = image.expected_pixel_bytes();
        if pixels.len() as u64 != expected {
            result.warn(format!(
                "{label}: pixel payload is {} bytes, geometry calls for {expected}",
                pixels.len()
            ));
        }
    }

    check_properties(&image.properties, &label, result);
}

fn check_thumbnail(thumbnail: &Thumbnail, result: &mut ValidationResult) {
    use crate::image::SampleFormat;
    if !matches!(
        thumbnail.sample_format,
        SampleFormat::UInt8 | SampleFormat::UInt16
    ) {
        result.warn(format!(
            "thumbnail uses sample format {}, expected UInt8 or UInt16",
            thumbnail.sample_format
        ));
    }
}

fn check_properties(properties: &[Property], owner: &str, result: &mut ValidationResult) {
    for property in properties {
        let id = &property.id;
        if is_valid_property_id(id) {
            continue;
        }
        // The double-colon namespacing some writers emit is tolerated.
        if id.contains("::") && is_valid_property_id(&id.replace("::", ":")) {
            result.warn(format!(
                "{owner}: property id '{id}' uses double-colon namespacing"
            ));
        } else {
            result.error(format!("{owner}: property id '{id}' is invalid"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_element::{CoreElement, CoreElementKind, ResolutionUnit};
    use crate::image::{Bounds, ColorSpace, Geometry, Image, SampleFormat};
    use crate::property::{Property, PropertyValue, Scalar};
    use crate::unit::{Header, Metadata, Unit};

    fn unit_with_image(image: Image) -> Unit {
        let mut header = Header::new(Metadata::new("validator tests"));
        header.images.push(image);
        Unit::monolithic(header)
    }

    fn gray_u8() -> Image {
        Image::new(
            Geometry::new(vec![2, 2], 1),
            SampleFormat::UInt8,
            ColorSpace::Gray,
            vec![0; 4],
        )
    }

    #[test]
    fn minimal_unit_passes() {
        let result = validate_unit(&unit_with_image(gray_u8()));
        assert!(result.ok(), "{:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn missing_creator_application_is_an_error() {
        let mut unit = unit_with_image(gray_u8());
        unit.header.metadata.creator_application = "  ".into();
        let result = validate_unit(&unit);
        assert!(!result.ok());
    }

    #[test]
    fn float_image_without_bounds_is_rejected() {
        let mut image = gray_u8();
        image.sample_format = SampleFormat::Float32;
        image.pixels = Some(vec![0; 16]);
        let result = validate_unit(&unit_with_image(image));
        assert!(!result.ok());
        assert!(
            result.errors.iter().any(|e| e.contains("bounds")),
            "{:?}",
            result.errors
        );
    }

    #[test]
    fn float_image_with_bounds_passes() {
        let mut image = gray_u8();
        image.sample_format = SampleFormat::Float32;
        image.pixels = Some(vec![0; 16]);
        image.bounds = Some(Bounds {
            lower: 0.0,
            upper: 1.0,
        });
        assert!(validate_unit(&unit_with_image(image)).ok());
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let mut image = gray_u8();
        image.sample_format = SampleFormat::Float64;
        image.pixels = Some(vec![0; 32]);
        image.bounds = Some(Bounds {
            lower: 1.0,
            upper: 0.0,
        });
        assert!(!validate_unit(&unit_with_image(image)).ok());
    }

    #[test]
    fn duplicate_uids_are_rejected() {
        let mut unit = unit_with_image(gray_u8());
        for _ in 0..2 {
            unit.header.core_elements.push(CoreElement::with_uid(
                "res",
                CoreElementKind::Resolution {
                    horizontal: 72.0,
                    vertical: 72.0,
                    unit: ResolutionUnit::Inch,
                },
            ));
        }
        let result = validate_unit(&unit);
        assert!(result.errors.iter().any(|e| e.contains("more than one")));
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let mut unit = unit_with_image(gray_u8());
        unit.header
            .core_elements
            .push(CoreElement::new(CoreElementKind::Reference {
                reference: "ghost".into(),
            }));
        let result = validate_unit(&unit);
        assert!(result.errors.iter().any(|e| e.contains("ghost")));
    }

    #[test]
    fn bad_property_id_is_rejected_and_double_colon_warns() {
        let mut unit = unit_with_image(gray_u8());
        unit.header
            .properties
            .push(Property::string("9bad id", "value"));
        unit.header.properties.push(Property::new(
            "Observation::Object",
            PropertyValue::Scalar(Scalar::Float64(1.0)),
        ));
        let result = validate_unit(&unit);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn negative_offset_is_rejected() {
        let mut image = gray_u8();
        image.offset = Some(-0.5);
        assert!(!validate_unit(&unit_with_image(image)).ok());
    }

    #[test]
    fn pixel_size_mismatch_warns_but_passes() {
        let mut image = gray_u8();
        image.pixels = Some(vec![0; 3]);
        let result = validate_unit(&unit_with_image(image));
        assert!(result.ok());
        assert_eq!(result.warnings.len(), 1);
    }
}
