//! Monolithic `.xisf` storage: 16-byte binary framing, the XML header, and
//! attached data blocks.
//!
//! Writing is a fixed-point computation: each attached block's position
//! depends on the XML header's length, while the header's length depends on
//! the decimal width of every position. The layout loop starts from
//! placeholder positions and re-emits until the length stabilizes, which
//! takes at most a handful of passes because positions only ever grow.

use std::io::{self, Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::core_element::{CoreElement, CoreElementKind};
use crate::data_block::{self, BlockContext, DataBlock, Location};
use crate::error::{Error, Result};
use crate::options::{ReaderOptions, WriterOptions};
use crate::unit::{Header, StorageModel, Unit};
use crate::xml;

/// Monolithic file signature.
pub(crate) const SIGNATURE: &[u8; 8] = b"XISF0100";

/// Size of the binary file header preceding the XML.
pub(crate) const FILE_HEADER_LEN: u64 = 16;

/// Shortest well-formed XML header the format permits.
const MIN_XML_LENGTH: u64 = 65;

/// Upper bound on layout passes; the length is monotonic, so convergence is
/// expected well before this.
const MAX_LAYOUT_PASSES: usize = 5;

fn map_eof(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::EndOfStream
    } else {
        Error::StreamIo(e)
    }
}

// ── Read ──────────────────────────────────────────────────────────────────────

/// Read the binary framing and XML header only; data blocks keep their
/// parsed locations.
pub(crate) fn read_header_from<R: Read + Seek>(carrier: &mut R) -> Result<Header> {
    let mut signature = [0u8; 8];
    carrier.read_exact(&mut signature).map_err(map_eof)?;
    if &signature != SIGNATURE {
        return Err(Error::InvalidSignature);
    }
    let xml_length = carrier.read_u32::<LittleEndian>().map_err(map_eof)? as u64;
    let reserved = carrier.read_u32::<LittleEndian>().map_err(map_eof)?;
    if reserved != 0 {
        tracing::warn!("reserved field of the file header is {reserved}, expected 0");
    }
    if xml_length < MIN_XML_LENGTH {
        return Err(Error::MalformedXml(format!(
            "XML header length {xml_length} is below the minimum of {MIN_XML_LENGTH}"
        )));
    }

    let mut xml = vec![0u8; xml_length as usize];
    carrier.read_exact(&mut xml).map_err(map_eof)?;
    let xml = String::from_utf8(xml)
        .map_err(|e| Error::MalformedXml(format!("XML header is not UTF-8: {e}")))?;
    xml::parse_header(&xml)
}

/// Read a full monolithic unit, materializing image pixels, ICC profiles and
/// (per options) thumbnails.
pub(crate) fn read_unit_from<R: Read + Seek>(
    carrier: &mut R,
    options: &ReaderOptions,
) -> Result<Unit> {
    let mut header = read_header_from(carrier)?;

    for image in &mut header.images {
        options.cancel.check()?;
        let mut ctx = BlockContext::Monolithic(carrier);
        image.pixels = Some(data_block::read_data(&image.block, &mut ctx, options)?);
        materialize_elements(&mut image.elements, carrier, options)?;
    }
    materialize_elements(&mut header.core_elements, carrier, options)?;

    Ok(Unit {
        storage: StorageModel::Monolithic,
        header,
        signature: None,
    })
}

fn materialize_elements<R: Read + Seek>(
    elements: &mut [CoreElement],
    carrier: &mut R,
    options: &ReaderOptions,
) -> Result<()> {
    for element in elements {
        match &mut element.kind {
            CoreElementKind::IccProfile { block, data } => {
                let mut ctx = BlockContext::Monolithic(carrier);
                *data = Some(data_block::read_data(block, &mut ctx, options)?);
            }
            CoreElementKind::Thumbnail(thumbnail) if options.load_thumbnails => {
                let mut ctx = BlockContext::Monolithic(carrier);
                thumbnail.pixels = Some(data_block::read_data(&thumbnail.block, &mut ctx, options)?);
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Write ─────────────────────────────────────────────────────────────────────

/// Write a unit monolithically. The caller (the façade) has already
/// validated the unit.
pub(crate) fn write_unit_to<W: Write>(
    unit: &Unit,
    writer: &mut W,
    options: &WriterOptions,
) -> Result<()> {
    let mut header = unit.header.clone();

    // Fix every payload first: compression settles each attached block's
    // final length, which the layout below depends on.
    let mut payloads: Vec<Option<Vec<u8>>> = Vec::with_capacity(header.images.len());
    for image in &mut header.images {
        options.cancel.check()?;
        let item_size = image.sample_format.item_size();
        let payload = stage_block(&mut image.block, image.pixels.as_deref(), item_size, options)
            .map_err(|e| match e {
                Error::ValidationFailed(mut msgs) => {
                    for msg in &mut msgs {
                        *msg = format!("image: {msg}");
                    }
                    Error::ValidationFailed(msgs)
                }
                other => other,
            })?;
        payloads.push(payload);
        stage_aux_elements(&mut image.elements, options)?;
    }
    stage_aux_elements(&mut header.core_elements, options)?;

    let sizes: Vec<u64> = payloads
        .iter()
        .map(|p| p.as_ref().map_or(0, |p| p.len() as u64))
        .collect();

    // Fixed-point layout: emit with candidate positions until the XML length
    // stops changing. Positions are monotonically non-decreasing across
    // passes, so the loop converges.
    let mut xml_length = xml::emit_header(&header, options.pretty_print_xml).len() as u64;
    let mut xml = None;
    for _ in 0..MAX_LAYOUT_PASSES {
        assign_positions(&mut header, &payloads, &sizes, xml_length);
        let candidate = xml::emit_header(&header, options.pretty_print_xml);
        let candidate_length = candidate.len() as u64;
        if candidate_length == xml_length {
            xml = Some(candidate);
            break;
        }
        xml_length = candidate_length;
    }
    let xml = xml.ok_or_else(|| {
        Error::CorruptBlock("attached-block layout did not reach a fixed point".into())
    })?;

    if (xml.len() as u64) < MIN_XML_LENGTH {
        return Err(Error::MalformedXml(format!(
            "emitted XML header is {} bytes, below the minimum of {MIN_XML_LENGTH}",
            xml.len()
        )));
    }
    let xml_length = u32::try_from(xml.len())
        .map_err(|_| Error::MalformedXml("XML header exceeds 4 GiB".into()))?;

    writer.write_all(SIGNATURE)?;
    writer.write_u32::<LittleEndian>(xml_length)?;
    writer.write_u32::<LittleEndian>(0)?;
    writer.write_all(&xml)?;
    for payload in payloads.iter().flatten() {
        options.cancel.check()?;
        writer.write_all(payload)?;
    }
    Ok(())
}

/// Run a block's payload through the write pipeline and place it.
///
/// Inline and embedded blocks keep their storage shape with refreshed bytes;
/// everything else becomes an attachment whose bytes are returned for the
/// layout loop. Returns `None` when no attached payload is produced.
fn stage_block(
    block: &mut DataBlock,
    pixels: Option<&[u8]>,
    item_size: u64,
    options: &WriterOptions,
) -> Result<Option<Vec<u8>>> {
    let Some(payload) = pixels else {
        // Blocks that still carry their stored text payload pass through.
        return match &block.location {
            Location::Inline { .. } | Location::Embedded { .. } => Ok(None),
            _ => Err(Error::ValidationFailed(vec![
                "pixel data is not materialized".into(),
            ])),
        };
    };

    let stored = data_block::prepare_payload(payload, item_size, block, options)?;
    match block.location.clone() {
        Location::Inline { encoding, .. } => {
            block.location = Location::Inline {
                encoding,
                data: stored,
            };
            Ok(None)
        }
        Location::Embedded { encoding, .. } => {
            block.location = Location::Embedded {
                encoding,
                data: stored,
            };
            Ok(None)
        }
        _ => {
            block.location = Location::Attachment {
                position: 0,
                size: stored.len() as u64,
            };
            Ok(Some(stored))
        }
    }
}

/// ICC profiles and thumbnails are stored embedded on write; only image
/// pixel blocks participate in attachment layout.
fn stage_aux_elements(elements: &mut [CoreElement], options: &WriterOptions) -> Result<()> {
    for element in elements {
        match &mut element.kind {
            CoreElementKind::IccProfile { block, data } => {
                if let Some(bytes) = data.clone() {
                    make_embedded(block);
                    stage_block(block, Some(&bytes), 1, options)?;
                } else if !matches!(
                    block.location,
                    Location::Inline { .. } | Location::Embedded { .. }
                ) {
                    return Err(Error::ValidationFailed(vec![
                        "ICC profile data is not materialized".into(),
                    ]));
                }
            }
            CoreElementKind::Thumbnail(thumbnail) => {
                if let Some(bytes) = thumbnail.pixels.clone() {
                    make_embedded(&mut thumbnail.block);
                    stage_block(
                        &mut thumbnail.block,
                        Some(&bytes),
                        thumbnail.sample_format.item_size(),
                        options,
                    )?;
                } else if !matches!(
                    thumbnail.block.location,
                    Location::Inline { .. } | Location::Embedded { .. }
                ) {
                    return Err(Error::ValidationFailed(vec![
                        "thumbnail pixel data is not materialized".into(),
                    ]));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn make_embedded(block: &mut DataBlock) {
    if !matches!(
        block.location,
        Location::Inline { .. } | Location::Embedded { .. }
    ) {
        block.location = Location::Embedded {
            encoding: Default::default(),
            data: Vec::new(),
        };
    }
}

fn assign_positions(
    header: &mut Header,
    payloads: &[Option<Vec<u8>>],
    sizes: &[u64],
    xml_length: u64,
) {
    let mut position = FILE_HEADER_LEN + xml_length;
    for (index, image) in header.images.iter_mut().enumerate() {
        if payloads[index].is_some() {
            image.block.location = Location::Attachment {
                position,
                size: sizes[index],
            };
            position += sizes[index];
        }
    }
}
