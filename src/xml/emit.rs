//! Mapping from the data model to XML elements.

use super::{serialize_document, XmlDocument, XmlElement, XISF_NAMESPACE, XISF_SCHEMA_LOCATION};
use crate::byte_order::ByteOrder;
use crate::core_element::{format_f64_list, CoreElement, CoreElementKind, Thumbnail};
use crate::data_block::{encode_text, DataBlock, Location};
use crate::image::{Image, PixelStorage};
use crate::property::{Property, PropertyValue};
use crate::unit::{metadata_ids, Header, Metadata};

/// Emit a header as UTF-8 XML bytes (no BOM, declaration included).
///
/// Emission is deterministic: the same header always serializes to the same
/// bytes, which the monolithic layout loop relies on.
pub(crate) fn emit_header(header: &Header, pretty: bool) -> Vec<u8> {
    let mut root = XmlElement::new("xisf");
    root.set_attr("version", "1.0");
    root.set_attr("xmlns", XISF_NAMESPACE);
    root.set_attr("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance");
    root.set_attr("xsi:schemaLocation", XISF_SCHEMA_LOCATION);

    root.push_element(metadata_element(&header.metadata));
    for image in &header.images {
        root.push_element(image_element(image));
    }
    for property in &header.properties {
        root.push_element(property_element(property));
    }
    for element in &header.core_elements {
        root.push_element(core_element_node(element));
    }

    let doc = XmlDocument {
        initial_comment: header.initial_comment.clone(),
        root,
    };
    serialize_document(&doc, pretty)
}

// ── Metadata ──────────────────────────────────────────────────────────────────

fn metadata_element(metadata: &Metadata) -> XmlElement {
    let mut e = XmlElement::new("Metadata");

    let mut time = XmlElement::new("Property");
    time.set_attr("id", metadata_ids::CREATION_TIME);
    time.set_attr("type", "TimePoint");
    time.set_attr(
        "value",
        PropertyValue::TimePoint(metadata.creation_time)
            .attr_value()
            .unwrap_or_default(),
    );
    e.push_element(time);

    push_string_property(
        &mut e,
        metadata_ids::CREATOR_APPLICATION,
        Some(metadata.creator_application.as_str()),
    );
    push_string_property(&mut e, metadata_ids::CREATOR_MODULE, metadata.creator_module.as_deref());
    push_string_property(&mut e, metadata_ids::CREATOR_OS, metadata.creator_os.as_deref());
    push_string_property(&mut e, metadata_ids::TITLE, metadata.title.as_deref());
    push_string_property(&mut e, metadata_ids::AUTHORS, metadata.authors.as_deref());
    push_string_property(&mut e, metadata_ids::DESCRIPTION, metadata.description.as_deref());
    push_string_property(&mut e, metadata_ids::COPYRIGHT, metadata.copyright.as_deref());
    push_string_property(&mut e, metadata_ids::KEYWORDS, metadata.keywords.as_deref());

    for property in &metadata.extra {
        e.push_element(property_element(property));
    }
    e
}

fn push_string_property(parent: &mut XmlElement, id: &str, value: Option<&str>) {
    if let Some(value) = value {
        let mut e = XmlElement::new("Property");
        e.set_attr("id", id);
        e.set_attr("type", "String");
        if !value.is_empty() {
            e.push_text(value);
        }
        parent.push_element(e);
    }
}

// ── Properties ────────────────────────────────────────────────────────────────

fn property_element(property: &Property) -> XmlElement {
    let mut e = XmlElement::new("Property");
    e.set_attr("id", &property.id);
    e.set_attr("type", property.value.type_name());

    match &property.value {
        PropertyValue::String(s) => {
            if !s.is_empty() {
                e.push_text(s);
            }
        }
        PropertyValue::Vector(data) => {
            e.set_attr("length", data.len().to_string());
            e.set_attr("location", "inline:base64");
            e.push_text(encode_text(&data.to_le_bytes(), Default::default()));
        }
        PropertyValue::Matrix {
            rows,
            columns,
            data,
        } => {
            e.set_attr("rows", rows.to_string());
            e.set_attr("columns", columns.to_string());
            e.set_attr("location", "inline:base64");
            e.push_text(encode_text(&data.to_le_bytes(), Default::default()));
        }
        PropertyValue::Table(table) => {
            e.set_attr("rows", table.row_count().to_string());
            e.set_attr("columns", table.column_count().to_string());
            for row in &table.rows {
                let mut row_elem = XmlElement::new("Row");
                for cell in row {
                    let mut cell_elem = XmlElement::new("Cell");
                    cell_elem.set_attr("value", cell);
                    row_elem.push_element(cell_elem);
                }
                e.push_element(row_elem);
            }
        }
        other => {
            if let Some(value) = other.attr_value() {
                e.set_attr("value", value);
            }
        }
    }

    if let Some(comment) = &property.comment {
        e.set_attr("comment", comment);
    }
    if let Some(format) = &property.format {
        e.set_attr("format", format);
    }
    e
}

// ── Data blocks ───────────────────────────────────────────────────────────────

fn apply_block(e: &mut XmlElement, block: &DataBlock) {
    e.set_attr("location", block.location_attr());
    if block.byte_order == ByteOrder::Big {
        e.set_attr("byteOrder", "big");
    }
    if let Some(compression) = &block.compression {
        e.set_attr("compression", compression.to_attr());
    }
    if let Some(checksum) = &block.checksum {
        e.set_attr("checksum", checksum.to_attr());
    }
    match &block.location {
        Location::Inline { encoding, data } => {
            e.push_text(encode_text(data, *encoding));
        }
        Location::Embedded { encoding, data } => {
            let mut data_elem = XmlElement::new("Data");
            data_elem.set_attr("encoding", encoding.to_string());
            data_elem.push_text(encode_text(data, *encoding));
            e.push_element(data_elem);
        }
        _ => {}
    }
}

// ── Images ────────────────────────────────────────────────────────────────────

fn image_element(image: &Image) -> XmlElement {
    let mut e = XmlElement::new("Image");
    e.set_attr("geometry", image.geometry.to_string());
    e.set_attr("sampleFormat", image.sample_format.to_string());
    e.set_attr("colorSpace", image.color_space.to_string());
    if let Some(bounds) = &image.bounds {
        e.set_attr("bounds", bounds.to_string());
    }
    if image.pixel_storage != PixelStorage::default() {
        e.set_attr("pixelStorage", image.pixel_storage.to_string());
    }
    if let Some(image_type) = image.image_type {
        e.set_attr("imageType", image_type.to_string());
    }
    if let Some(offset) = image.offset {
        e.set_attr("offset", offset.to_string());
    }
    if let Some(orientation) = image.orientation {
        e.set_attr("orientation", orientation.to_string());
    }
    if let Some(id) = &image.id {
        e.set_attr("id", id);
    }
    if let Some(uuid) = &image.uuid {
        e.set_attr("uuid", uuid.to_string());
    }
    apply_block(&mut e, &image.block);

    for property in &image.properties {
        e.push_element(property_element(property));
    }
    for element in &image.elements {
        e.push_element(core_element_node(element));
    }
    e
}

// ── Core elements ─────────────────────────────────────────────────────────────

fn core_element_node(element: &CoreElement) -> XmlElement {
    let mut e = XmlElement::new(element.tag_name());
    if let Some(uid) = &element.uid {
        e.set_attr("uid", uid);
    }
    match &element.kind {
        CoreElementKind::Reference { reference } => {
            e.set_attr("ref", reference);
        }
        CoreElementKind::ColorFilterArray {
            pattern,
            width,
            height,
            name,
        } => {
            e.set_attr("pattern", pattern);
            e.set_attr("width", width.to_string());
            e.set_attr("height", height.to_string());
            if let Some(name) = name {
                e.set_attr("name", name);
            }
        }
        CoreElementKind::Resolution {
            horizontal,
            vertical,
            unit,
        } => {
            e.set_attr("horizontal", horizontal.to_string());
            e.set_attr("vertical", vertical.to_string());
            e.set_attr("unit", unit.to_string());
        }
        CoreElementKind::FitsKeyword {
            name,
            value,
            comment,
        } => {
            e.set_attr("name", name);
            e.set_attr("value", value);
            e.set_attr("comment", comment);
        }
        CoreElementKind::IccProfile { block, .. } => {
            apply_block(&mut e, block);
        }
        CoreElementKind::RgbWorkingSpace {
            gamma,
            x,
            y,
            luminance,
            name,
        } => {
            e.set_attr("gamma", gamma.to_string());
            e.set_attr("x", format_f64_list(x));
            e.set_attr("y", format_f64_list(y));
            e.set_attr("Y", format_f64_list(luminance));
            if let Some(name) = name {
                e.set_attr("name", name);
            }
        }
        CoreElementKind::DisplayFunction {
            midtones,
            shadows,
            highlights,
            low_range,
            high_range,
            name,
        } => {
            e.set_attr("m", format_f64_list(midtones));
            e.set_attr("s", format_f64_list(shadows));
            e.set_attr("h", format_f64_list(highlights));
            e.set_attr("l", format_f64_list(low_range));
            e.set_attr("r", format_f64_list(high_range));
            if let Some(name) = name {
                e.set_attr("name", name);
            }
        }
        CoreElementKind::Thumbnail(thumbnail) => {
            apply_thumbnail(&mut e, thumbnail);
        }
    }
    e
}

fn apply_thumbnail(e: &mut XmlElement, thumbnail: &Thumbnail) {
    e.set_attr("geometry", thumbnail.geometry.to_string());
    e.set_attr("sampleFormat", thumbnail.sample_format.to_string());
    e.set_attr("colorSpace", thumbnail.color_space.to_string());
    if thumbnail.pixel_storage != PixelStorage::default() {
        e.set_attr("pixelStorage", thumbnail.pixel_storage.to_string());
    }
    apply_block(e, &thumbnail.block);
}

#[cfg(test)]
mod tests {
    use super::super::parse_header;
    use super::*;
    use crate::core_element::{Gamma, ResolutionUnit};
    use crate::data_block::TextEncoding;
    use crate::image::{Bounds, ColorSpace, Geometry, SampleFormat};
    use crate::property::{parse_time_point, Scalar, Table, VectorData};
    use crate::unit::Metadata;

    fn test_metadata() -> Metadata {
        let mut metadata = Metadata::new("xisfio emit tests");
        // Millisecond precision so the emitted form reparses identically.
        metadata.creation_time = parse_time_point("2025-06-01T10:20:30.125+02:00").unwrap();
        metadata.creator_os = Some("Linux".into());
        metadata
    }

    #[test]
    fn emit_then_parse_is_identity_on_the_header() {
        let mut header = Header::new(test_metadata());
        header.initial_comment = Some(" demo unit ".into());
        header
            .properties
            .push(Property::new("Session:Frames", PropertyValue::Scalar(Scalar::UInt32(48))));
        header.properties.push(Property::new(
            "Cal:Gains",
            PropertyValue::Vector(VectorData::F32(vec![1.0, 2.5])),
        ));
        header.properties.push(Property::new(
            "Cal:Kernel",
            PropertyValue::Matrix {
                rows: 2,
                columns: 2,
                data: VectorData::I16(vec![1, -2, 3, -4]),
            },
        ));
        header.properties.push(Property::new(
            "Run:Phase",
            PropertyValue::Complex64(0.5, -1.5),
        ));
        header.properties.push(Property::new(
            "Run:Started",
            PropertyValue::TimePoint(parse_time_point("2025-06-01T08:00:00.000+00:00").unwrap()),
        ));
        header.properties.push(Property::new(
            "Run:Log",
            PropertyValue::Table(Table {
                rows: vec![vec!["frame".into(), "ok".into()], vec!["1".into(), "yes".into()]],
            }),
        ));
        header.core_elements.push(CoreElement::with_uid(
            "res0",
            CoreElementKind::Resolution {
                horizontal: 72.0,
                vertical: 72.0,
                unit: ResolutionUnit::Inch,
            },
        ));
        header.core_elements.push(CoreElement::new(
            CoreElementKind::RgbWorkingSpace {
                gamma: Gamma::Srgb,
                x: [0.64, 0.3, 0.15],
                y: [0.33, 0.6, 0.06],
                luminance: [0.2126, 0.7152, 0.0722],
                name: Some("sRGB".into()),
            },
        ));

        let mut image = Image::new(
            Geometry::new(vec![2, 2], 1),
            SampleFormat::Float32,
            ColorSpace::Gray,
            vec![],
        );
        image.bounds = Some(Bounds {
            lower: 0.0,
            upper: 1.0,
        });
        image.id = Some("light1".into());
        image.block = DataBlock::inline(TextEncoding::Base64, vec![0u8; 16]);
        image.pixels = None;
        header.images.push(image);

        for pretty in [false, true] {
            let bytes = emit_header(&header, pretty);
            let text = std::str::from_utf8(&bytes).unwrap();
            assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
            let reparsed = parse_header(text).unwrap();
            assert_eq!(reparsed, header, "pretty={pretty}");
        }
    }

    #[test]
    fn big_endian_blocks_carry_the_attribute() {
        let mut header = Header::new(test_metadata());
        let mut image = Image::new(
            Geometry::new(vec![1, 1], 1),
            SampleFormat::UInt16,
            ColorSpace::Gray,
            vec![],
        );
        image.block = DataBlock::attachment(128, 2);
        image.block.byte_order = ByteOrder::Big;
        image.pixels = None;
        header.images.push(image);

        let text = String::from_utf8(emit_header(&header, false)).unwrap();
        assert!(text.contains("byteOrder=\"big\""));
        assert!(text.contains("location=\"attachment:128:2\""));
    }

    #[test]
    fn default_pixel_storage_is_omitted() {
        let mut header = Header::new(test_metadata());
        let mut image = Image::new(
            Geometry::new(vec![1, 1], 1),
            SampleFormat::UInt8,
            ColorSpace::Gray,
            vec![],
        );
        image.block = DataBlock::inline(TextEncoding::Hex, vec![7]);
        image.pixels = None;
        header.images.push(image);

        let text = String::from_utf8(emit_header(&header, false)).unwrap();
        assert!(!text.contains("pixelStorage"));
        assert!(text.contains(">07</Image>"));
    }
}
