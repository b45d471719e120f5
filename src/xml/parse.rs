//! Mapping from parsed XML elements to the data model.

use uuid::Uuid;

use super::{parse_document, XmlElement, XISF_NAMESPACE};
use crate::byte_order::{self, ByteOrder};
use crate::core_element::{
    parse_f64_array, CoreElement, CoreElementKind, Thumbnail,
};
use crate::data_block::{decode_text, DataBlock, Location, LocationAttr, TextEncoding};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::options::CancelToken;
use crate::property::{
    parse_complex, parse_time_point, ElementKind, Property, PropertyValue, Scalar, Table,
    VectorData,
};
use crate::unit::{metadata_ids, Header, Metadata};

/// Parse a complete XML header into the data model. Data blocks keep their
/// parsed locations; attached and external payloads are materialized later
/// by the storage engines.
pub(crate) fn parse_header(xml: &str) -> Result<Header> {
    let doc = parse_document(xml)?;
    check_root(&doc.root)?;

    let mut metadata = None;
    let mut images = Vec::new();
    let mut properties = Vec::new();
    let mut core_elements = Vec::new();

    for child in doc.root.child_elements() {
        match child.name.as_str() {
            "Metadata" => {
                if metadata.is_some() {
                    return Err(Error::MalformedXml(
                        "header carries more than one <Metadata> element".into(),
                    ));
                }
                metadata = Some(parse_metadata(child)?);
            }
            "Image" => images.push(parse_image(child)?),
            "Property" => properties.push(parse_property(child)?),
            "Signature" => {
                tracing::warn!("skipping <Signature> element: signatures are not supported");
            }
            name if is_core_element_name(name) => {
                core_elements.push(parse_core_element(child)?);
            }
            other => tracing::warn!("ignoring unknown element <{other}>"),
        }
    }

    Ok(Header {
        metadata: metadata
            .ok_or_else(|| Error::MalformedXml("header lacks a <Metadata> element".into()))?,
        images,
        properties,
        core_elements,
        initial_comment: doc.initial_comment,
    })
}

fn check_root(root: &XmlElement) -> Result<()> {
    if root.name != "xisf" {
        return Err(Error::MalformedXml(format!(
            "root element is <{}>, expected <xisf>",
            root.name
        )));
    }
    let version = root.require_attr("version", "xisf")?;
    if version != "1.0" {
        return Err(Error::UnsupportedVersion(version.to_string()));
    }
    let ns_key = match &root.prefix {
        Some(prefix) => format!("xmlns:{prefix}"),
        None => "xmlns".to_string(),
    };
    match root.attr(&ns_key) {
        Some(XISF_NAMESPACE) => Ok(()),
        Some(other) => Err(Error::MalformedXml(format!(
            "unexpected root namespace '{other}'"
        ))),
        None => {
            tracing::warn!("root element declares no namespace");
            Ok(())
        }
    }
}

fn is_core_element_name(name: &str) -> bool {
    matches!(
        name,
        "Reference"
            | "ColorFilterArray"
            | "Resolution"
            | "FITSKeyword"
            | "ICCProfile"
            | "RGBWorkingSpace"
            | "DisplayFunction"
            | "Thumbnail"
    )
}

// ── Metadata ──────────────────────────────────────────────────────────────────

fn parse_metadata(elem: &XmlElement) -> Result<Metadata> {
    let mut creation_time = None;
    let mut creator_application = None;
    let mut creator_module = None;
    let mut creator_os = None;
    let mut title = None;
    let mut authors = None;
    let mut description = None;
    let mut copyright = None;
    let mut keywords = None;
    let mut extra = Vec::new();

    for child in elem.child_elements() {
        if child.name != "Property" {
            tracing::warn!("ignoring <{}> inside <Metadata>", child.name);
            continue;
        }
        let property = parse_property(child)?;
        let id = property.id.clone();
        match id.as_str() {
            metadata_ids::CREATION_TIME => {
                creation_time = Some(match property.value {
                    PropertyValue::TimePoint(t) => t,
                    PropertyValue::String(s) => parse_time_point(&s)?,
                    _ => {
                        return Err(Error::MalformedXml(
                            "XISF:CreationTime must be a TimePoint".into(),
                        ))
                    }
                });
            }
            metadata_ids::CREATOR_APPLICATION => {
                take_string(property, &mut creator_application, &mut extra)
            }
            metadata_ids::CREATOR_MODULE => take_string(property, &mut creator_module, &mut extra),
            metadata_ids::CREATOR_OS => take_string(property, &mut creator_os, &mut extra),
            metadata_ids::TITLE => take_string(property, &mut title, &mut extra),
            metadata_ids::AUTHORS => take_string(property, &mut authors, &mut extra),
            metadata_ids::DESCRIPTION => take_string(property, &mut description, &mut extra),
            metadata_ids::COPYRIGHT => take_string(property, &mut copyright, &mut extra),
            metadata_ids::KEYWORDS => take_string(property, &mut keywords, &mut extra),
            _ => extra.push(property),
        }
    }

    Ok(Metadata {
        creation_time: creation_time.ok_or_else(|| {
            Error::MalformedXml("<Metadata> lacks the XISF:CreationTime property".into())
        })?,
        creator_application: creator_application.ok_or_else(|| {
            Error::MalformedXml("<Metadata> lacks the XISF:CreatorApplication property".into())
        })?,
        creator_module,
        creator_os,
        title,
        authors,
        description,
        copyright,
        keywords,
        extra,
    })
}

fn take_string(property: Property, slot: &mut Option<String>, extra: &mut Vec<Property>) {
    match property.value {
        PropertyValue::String(s) => *slot = Some(s),
        _ => {
            tracing::warn!(
                "metadata property '{}' is not a String, keeping it verbatim",
                property.id
            );
            extra.push(property);
        }
    }
}

// ── Properties ────────────────────────────────────────────────────────────────

fn parse_property(elem: &XmlElement) -> Result<Property> {
    let id = elem.require_attr("id", "Property")?.to_string();
    let type_name = elem.require_attr("type", "Property")?;
    let comment = elem.attr("comment").map(String::from);
    let format = elem.attr("format").map(String::from);

    // Scalar-like values live in the `value` attribute, with element text as
    // the fallback location.
    let scalar_text = || -> Result<String> {
        if let Some(value) = elem.attr("value") {
            return Ok(value.to_string());
        }
        let text = elem.text();
        if text.trim().is_empty() {
            Err(Error::MissingRequiredAttribute {
                element: "Property",
                attribute: "value",
            })
        } else {
            Ok(text)
        }
    };

    let value = match type_name {
        "String" => PropertyValue::String(match elem.attr("value") {
            Some(value) => value.to_string(),
            None => elem.text(),
        }),
        "TimePoint" => PropertyValue::TimePoint(parse_time_point(&scalar_text()?)?),
        "Complex32" => {
            let (re, im) = parse_complex(&scalar_text()?)?;
            PropertyValue::Complex32(re as f32, im as f32)
        }
        "Complex64" => {
            let (re, im) = parse_complex(&scalar_text()?)?;
            PropertyValue::Complex64(re, im)
        }
        "Table" => PropertyValue::Table(parse_table(elem)?),
        _ => {
            if let Some(kind) = ElementKind::from_vector_type(type_name) {
                let data = vector_payload(elem, kind)?;
                if let Some(length) = elem.attr("length") {
                    let declared: usize = length.trim().parse().map_err(|_| {
                        Error::MalformedXml(format!("'{length}' is not a vector length"))
                    })?;
                    if declared != data.len() {
                        return Err(Error::MalformedXml(format!(
                            "vector property '{id}' declares {declared} elements, payload has {}",
                            data.len()
                        )));
                    }
                }
                PropertyValue::Vector(data)
            } else if let Some(kind) = ElementKind::from_matrix_type(type_name) {
                let rows: u64 = parse_count(elem.require_attr("rows", "Property")?)?;
                let columns: u64 = parse_count(elem.require_attr("columns", "Property")?)?;
                let data = vector_payload(elem, kind)?;
                if rows * columns != data.len() as u64 {
                    return Err(Error::MalformedXml(format!(
                        "matrix property '{id}' declares {rows}x{columns} elements, payload has {}",
                        data.len()
                    )));
                }
                PropertyValue::Matrix {
                    rows,
                    columns,
                    data,
                }
            } else {
                PropertyValue::Scalar(Scalar::parse(type_name, &scalar_text()?)?)
            }
        }
    };

    Ok(Property {
        id,
        value,
        comment,
        format,
    })
}

fn parse_count(s: &str) -> Result<u64> {
    s.trim()
        .parse::<u64>()
        .map_err(|_| Error::MalformedXml(format!("'{s}' is not a count")))
}

/// Materialize the packed payload of a vector or matrix property. Property
/// payloads must be inline or embedded; attached property blocks are not
/// supported.
fn vector_payload(elem: &XmlElement, kind: ElementKind) -> Result<VectorData> {
    let block = parse_block(elem, "Property")?.ok_or(Error::MissingRequiredAttribute {
        element: "Property",
        attribute: "location",
    })?;
    let raw = match &block.location {
        Location::Inline { data, .. } | Location::Embedded { data, .. } => data.clone(),
        _ => {
            return Err(Error::MalformedXml(
                "vector property payloads must be inline or embedded".into(),
            ))
        }
    };
    let mut bytes = match &block.compression {
        Some(compression) => {
            crate::compression::decompress(&raw, compression, &CancelToken::new())?
        }
        None => raw,
    };
    if block.byte_order == ByteOrder::Big {
        // Complex elements swap per scalar component, not per pair.
        let width = match kind {
            ElementKind::C32 => 4,
            ElementKind::C64 => 8,
            other => other.item_size(),
        };
        byte_order::convert(&mut bytes, ByteOrder::Big, ByteOrder::Little, width)?;
    }
    VectorData::from_le_bytes(kind, &bytes)
}

fn parse_table(elem: &XmlElement) -> Result<Table> {
    let mut rows = Vec::new();
    for row in elem.children_named("Row") {
        let mut cells = Vec::new();
        for cell in row.children_named("Cell") {
            cells.push(match cell.attr("value") {
                Some(value) => value.to_string(),
                None => cell.text(),
            });
        }
        rows.push(cells);
    }
    let table = Table { rows };
    if let Some(declared) = elem.attr("rows") {
        if parse_count(declared)? != table.row_count() as u64 {
            return Err(Error::MalformedXml(format!(
                "table declares {declared} rows, found {}",
                table.row_count()
            )));
        }
    }
    Ok(table)
}

// ── Data blocks ───────────────────────────────────────────────────────────────

/// Parse a data block off an element: `location` attribute plus byte order,
/// compression and checksum. Returns `Ok(None)` when the element carries no
/// block at all. An element with a `<Data>` child but no `location`
/// attribute is treated as embedded.
fn parse_block(elem: &XmlElement, tag: &'static str) -> Result<Option<DataBlock>> {
    let location = match elem.attr("location") {
        Some(attr) => match LocationAttr::parse(attr)? {
            LocationAttr::Inline(encoding) => Location::Inline {
                encoding,
                data: decode_text(&elem.text(), encoding)?,
            },
            LocationAttr::Embedded => parse_embedded_data(elem, tag)?,
            LocationAttr::Attachment { position, size } => Location::Attachment { position, size },
            LocationAttr::External { target, index_id } => Location::External {
                target,
                position: None,
                size: None,
                index_id,
            },
        },
        None => {
            if elem.children_named("Data").next().is_some() {
                parse_embedded_data(elem, tag)?
            } else {
                return Ok(None);
            }
        }
    };

    Ok(Some(DataBlock {
        location,
        byte_order: elem
            .attr("byteOrder")
            .map(str::parse)
            .transpose()?
            .unwrap_or_default(),
        compression: elem.attr("compression").map(str::parse).transpose()?,
        checksum: elem.attr("checksum").map(str::parse).transpose()?,
    }))
}

fn parse_embedded_data(elem: &XmlElement, tag: &'static str) -> Result<Location> {
    let mut children = elem.children_named("Data");
    let data_elem = children.next().ok_or_else(|| {
        Error::MalformedXml(format!("<{tag}> embedded block lacks a <Data> child"))
    })?;
    if children.next().is_some() {
        return Err(Error::MalformedXml(format!(
            "<{tag}> carries more than one <Data> child"
        )));
    }
    let encoding: TextEncoding = data_elem
        .attr("encoding")
        .map(str::parse)
        .transpose()?
        .unwrap_or_default();
    Ok(Location::Embedded {
        encoding,
        data: decode_text(&data_elem.text(), encoding)?,
    })
}

// ── Images ────────────────────────────────────────────────────────────────────

fn parse_image(elem: &XmlElement) -> Result<Image> {
    let geometry = elem.require_attr("geometry", "Image")?.parse()?;
    let sample_format = elem.require_attr("sampleFormat", "Image")?.parse()?;
    let color_space = elem.require_attr("colorSpace", "Image")?.parse()?;
    let block = parse_block(elem, "Image")?.ok_or(Error::MissingRequiredAttribute {
        element: "Image",
        attribute: "location",
    })?;

    let mut properties = Vec::new();
    let mut elements = Vec::new();
    for child in elem.child_elements() {
        match child.name.as_str() {
            "Property" => properties.push(parse_property(child)?),
            "Data" => {}
            name if is_core_element_name(name) => elements.push(parse_core_element(child)?),
            other => tracing::warn!("ignoring unknown element <{other}> inside <Image>"),
        }
    }

    Ok(Image {
        geometry,
        sample_format,
        color_space,
        bounds: elem.attr("bounds").map(str::parse).transpose()?,
        pixel_storage: elem
            .attr("pixelStorage")
            .map(str::parse)
            .transpose()?
            .unwrap_or_default(),
        image_type: elem.attr("imageType").map(str::parse).transpose()?,
        offset: elem
            .attr("offset")
            .map(|s| {
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| Error::MalformedXml(format!("offset '{s}' is not a number")))
            })
            .transpose()?,
        orientation: elem.attr("orientation").map(str::parse).transpose()?,
        id: elem.attr("id").map(String::from),
        uuid: elem
            .attr("uuid")
            .map(|s| {
                Uuid::parse_str(s)
                    .map_err(|e| Error::MalformedXml(format!("uuid '{s}' is invalid: {e}")))
            })
            .transpose()?,
        properties,
        elements,
        block,
        pixels: None,
    })
}

// ── Core elements ─────────────────────────────────────────────────────────────

fn parse_core_element(elem: &XmlElement) -> Result<CoreElement> {
    let uid = elem.attr("uid").map(String::from);
    let kind = match elem.name.as_str() {
        "Reference" => CoreElementKind::Reference {
            reference: elem.require_attr("ref", "Reference")?.to_string(),
        },
        "ColorFilterArray" => CoreElementKind::ColorFilterArray {
            pattern: elem.require_attr("pattern", "ColorFilterArray")?.to_string(),
            width: parse_count(elem.require_attr("width", "ColorFilterArray")?)? as u32,
            height: parse_count(elem.require_attr("height", "ColorFilterArray")?)? as u32,
            name: elem.attr("name").map(String::from),
        },
        "Resolution" => CoreElementKind::Resolution {
            horizontal: parse_f64(elem.require_attr("horizontal", "Resolution")?)?,
            vertical: parse_f64(elem.require_attr("vertical", "Resolution")?)?,
            unit: elem
                .attr("unit")
                .map(str::parse)
                .transpose()?
                .unwrap_or_default(),
        },
        "FITSKeyword" => CoreElementKind::FitsKeyword {
            name: elem.require_attr("name", "FITSKeyword")?.to_string(),
            value: elem.attr("value").unwrap_or_default().to_string(),
            comment: elem.attr("comment").unwrap_or_default().to_string(),
        },
        "ICCProfile" => CoreElementKind::IccProfile {
            block: parse_block(elem, "ICCProfile")?.ok_or(Error::MissingRequiredAttribute {
                element: "ICCProfile",
                attribute: "location",
            })?,
            data: None,
        },
        "RGBWorkingSpace" => CoreElementKind::RgbWorkingSpace {
            gamma: elem.require_attr("gamma", "RGBWorkingSpace")?.parse()?,
            x: parse_f64_array::<3>("x", elem.require_attr("x", "RGBWorkingSpace")?)?,
            y: parse_f64_array::<3>("y", elem.require_attr("y", "RGBWorkingSpace")?)?,
            luminance: parse_f64_array::<3>("Y", elem.require_attr("Y", "RGBWorkingSpace")?)?,
            name: elem.attr("name").map(String::from),
        },
        "DisplayFunction" => CoreElementKind::DisplayFunction {
            midtones: parse_f64_array::<4>("m", elem.require_attr("m", "DisplayFunction")?)?,
            shadows: parse_f64_array::<4>("s", elem.require_attr("s", "DisplayFunction")?)?,
            highlights: parse_f64_array::<4>("h", elem.require_attr("h", "DisplayFunction")?)?,
            low_range: parse_f64_array::<4>("l", elem.require_attr("l", "DisplayFunction")?)?,
            high_range: parse_f64_array::<4>("r", elem.require_attr("r", "DisplayFunction")?)?,
            name: elem.attr("name").map(String::from),
        },
        "Thumbnail" => CoreElementKind::Thumbnail(Thumbnail {
            geometry: elem.require_attr("geometry", "Thumbnail")?.parse()?,
            sample_format: elem.require_attr("sampleFormat", "Thumbnail")?.parse()?,
            color_space: elem.require_attr("colorSpace", "Thumbnail")?.parse()?,
            pixel_storage: elem
                .attr("pixelStorage")
                .map(str::parse)
                .transpose()?
                .unwrap_or_default(),
            block: parse_block(elem, "Thumbnail")?.ok_or(Error::MissingRequiredAttribute {
                element: "Thumbnail",
                attribute: "location",
            })?,
            pixels: None,
        }),
        other => {
            return Err(Error::MalformedXml(format!(
                "<{other}> is not a core element"
            )))
        }
    };
    Ok(CoreElement { uid, kind })
}

fn parse_f64(s: &str) -> Result<f64> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| Error::MalformedXml(format!("'{s}' is not a number")))
}
