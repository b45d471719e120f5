//! Distributed storage: `.xish` XML-only headers and `.xisb` data-blocks
//! files.
//!
//! A `.xish` header is plain UTF-8 XML with no binary preamble; its data
//! blocks point at external resources. A `.xisb` blocks file carries a
//! 16-byte header followed by a linked list of index nodes whose elements
//! map unique IDs to `(position, length)` ranges. Writing blocks files is
//! not supported; the reader honors the on-disk node format exactly so a
//! future writer can share these types.

use std::collections::HashSet;
use std::io::{Read, Seek, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::core_element::{CoreElement, CoreElementKind};
use crate::data_block::{self, BlockContext, DataBlock, ExternalTarget, Location};
use crate::error::{Error, Result};
use crate::options::{ReaderOptions, WriterOptions};
use crate::unit::{Header, StorageModel, Unit};
use crate::xml;

/// Data-blocks file signature.
pub const XISB_SIGNATURE: &[u8; 8] = b"XISB0100";

/// First index node starts right after the 16-byte file header.
const FIRST_NODE_OFFSET: u64 = 16;

// ── Blocks-file index ─────────────────────────────────────────────────────────

/// One live element of a `.xisb` index: a unique ID mapped to a stored byte
/// range. The on-disk form is 40 bytes
/// `(unique_id, position, size, uncompressed_size, reserved)`, all
/// little-endian; free slots have `position == 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexElement {
    pub unique_id: u64,
    pub position: u64,
    pub size: u64,
    pub uncompressed_size: u64,
}

/// An opened `.xisb` data-blocks file: the carrier stream plus its index,
/// loaded once at open. Owns the carrier; dropping the value releases it.
pub struct BlocksFile<R> {
    carrier: R,
    index: Vec<IndexElement>,
}

impl<R: Read + Seek> BlocksFile<R> {
    /// Verify the file header and walk the index-node list into memory.
    pub fn open(mut carrier: R) -> Result<Self> {
        let mut signature = [0u8; 8];
        carrier.read_exact(&mut signature).map_err(eof)?;
        if &signature != XISB_SIGNATURE {
            return Err(Error::InvalidSignature);
        }
        let reserved = carrier.read_u64::<LittleEndian>().map_err(eof)?;
        if reserved != 0 {
            tracing::warn!("reserved field of the blocks-file header is {reserved}, expected 0");
        }

        let mut index = Vec::new();
        let mut offset = FIRST_NODE_OFFSET;
        let mut visited = HashSet::new();
        while offset != 0 {
            if !visited.insert(offset) {
                return Err(Error::CorruptBlock(format!(
                    "index node at {offset} links back into the list"
                )));
            }
            carrier.seek(std::io::SeekFrom::Start(offset))?;
            let length = carrier.read_u32::<LittleEndian>().map_err(eof)?;
            let _reserved = carrier.read_u32::<LittleEndian>().map_err(eof)?;
            let next = carrier.read_u64::<LittleEndian>().map_err(eof)?;
            for _ in 0..length {
                let unique_id = carrier.read_u64::<LittleEndian>().map_err(eof)?;
                let position = carrier.read_u64::<LittleEndian>().map_err(eof)?;
                let size = carrier.read_u64::<LittleEndian>().map_err(eof)?;
                let uncompressed_size = carrier.read_u64::<LittleEndian>().map_err(eof)?;
                let _reserved = carrier.read_u64::<LittleEndian>().map_err(eof)?;
                if position == 0 {
                    continue; // free slot
                }
                index.push(IndexElement {
                    unique_id,
                    position,
                    size,
                    uncompressed_size,
                });
            }
            offset = next;
        }

        Ok(Self { carrier, index })
    }

    /// Live index elements in traversal order.
    pub fn index(&self) -> &[IndexElement] {
        &self.index
    }

    pub fn find(&self, unique_id: u64) -> Option<IndexElement> {
        self.index
            .iter()
            .copied()
            .find(|e| e.unique_id == unique_id)
    }

    /// Read the stored bytes of the block with the given unique ID.
    pub fn read_block(&mut self, unique_id: u64) -> Result<Vec<u8>> {
        let element = self
            .find(unique_id)
            .ok_or(Error::BlockNotFound(unique_id))?;
        let mut view =
            crate::substream::SubStream::new(&mut self.carrier, element.position, element.size)?;
        let mut buf = Vec::with_capacity(element.size as usize);
        view.read_to_end(&mut buf)?;
        if buf.len() as u64 != element.size {
            return Err(Error::EndOfStream);
        }
        Ok(buf)
    }
}

fn eof(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::EndOfStream
    } else {
        Error::StreamIo(e)
    }
}

// ── .xish read ────────────────────────────────────────────────────────────────

/// Read a distributed unit from an XML header stream.
///
/// `header_dir` anchors `@header_dir/` path references; `header_filename`
/// seeds the storage model. External payloads are only fetched when
/// `options.load_external_references` is set.
pub(crate) fn read_unit_from<R: Read>(
    carrier: &mut R,
    header_dir: Option<&Path>,
    header_filename: &str,
    options: &ReaderOptions,
) -> Result<Unit> {
    let mut bytes = Vec::new();
    carrier.read_to_end(&mut bytes)?;
    let xml = String::from_utf8(bytes)
        .map_err(|e| Error::MalformedXml(format!("header is not UTF-8 XML: {e}")))?;
    let mut header = xml::parse_header(&xml)?;

    let data_block_filenames = collect_block_filenames(&header);

    for image in &mut header.images {
        options.cancel.check()?;
        if should_materialize(&image.block, options) {
            let mut ctx = BlockContext::Distributed { header_dir };
            image.pixels = Some(data_block::read_data(&image.block, &mut ctx, options)?);
        }
        materialize_elements(&mut image.elements, header_dir, options)?;
    }
    materialize_elements(&mut header.core_elements, header_dir, options)?;

    Ok(Unit {
        storage: StorageModel::Distributed {
            header_filename: header_filename.to_string(),
            data_block_filenames,
        },
        header,
        signature: None,
    })
}

fn should_materialize(block: &DataBlock, options: &ReaderOptions) -> bool {
    match &block.location {
        Location::Inline { .. } | Location::Embedded { .. } => true,
        Location::External { .. } => options.load_external_references,
        Location::Attachment { .. } => true, // read_data reports the fault
    }
}

fn materialize_elements(
    elements: &mut [CoreElement],
    header_dir: Option<&Path>,
    options: &ReaderOptions,
) -> Result<()> {
    for element in elements {
        match &mut element.kind {
            CoreElementKind::IccProfile { block, data } => {
                if should_materialize(block, options) {
                    let mut ctx = BlockContext::Distributed { header_dir };
                    *data = Some(data_block::read_data(block, &mut ctx, options)?);
                }
            }
            CoreElementKind::Thumbnail(thumbnail) if options.load_thumbnails => {
                if should_materialize(&thumbnail.block, options) {
                    let mut ctx = BlockContext::Distributed { header_dir };
                    thumbnail.pixels =
                        Some(data_block::read_data(&thumbnail.block, &mut ctx, options)?);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Distinct referenced path targets, for the storage model's bookkeeping.
fn collect_block_filenames(header: &Header) -> Vec<String> {
    let mut names = Vec::new();
    let mut push = |block: &DataBlock| {
        if let Location::External {
            target: ExternalTarget::Path(path),
            ..
        } = &block.location
        {
            if !names.contains(path) {
                names.push(path.clone());
            }
        }
    };
    for image in &header.images {
        push(&image.block);
    }
    names
}

// ── .xish write ───────────────────────────────────────────────────────────────

/// Write a distributed unit's XML header.
///
/// External payloads are not written here; blocks with materialized pixels
/// and a non-external location are embedded into the header so the emitted
/// file is self-describing.
pub(crate) fn write_unit_to<W: Write>(
    unit: &Unit,
    writer: &mut W,
    options: &WriterOptions,
) -> Result<()> {
    let mut header = unit.header.clone();

    for image in &mut header.images {
        options.cancel.check()?;
        stage_distributed_block(
            &mut image.block,
            image.pixels.as_deref(),
            image.sample_format.item_size(),
            options,
        )?;
        stage_elements(&mut image.elements, options)?;
    }
    stage_elements(&mut header.core_elements, options)?;

    let xml = xml::emit_header(&header, options.pretty_print_xml);
    writer.write_all(&xml)?;
    Ok(())
}

fn stage_distributed_block(
    block: &mut DataBlock,
    payload: Option<&[u8]>,
    item_size: u64,
    options: &WriterOptions,
) -> Result<()> {
    if matches!(block.location, Location::External { .. }) {
        return Ok(()); // stays a reference
    }
    let Some(payload) = payload else {
        return match &block.location {
            Location::Inline { .. } | Location::Embedded { .. } => Ok(()),
            _ => Err(Error::ValidationFailed(vec![
                "pixel data is not materialized".into(),
            ])),
        };
    };
    let stored = data_block::prepare_payload(payload, item_size, block, options)?;
    block.location = match &block.location {
        Location::Inline { encoding, .. } => Location::Inline {
            encoding: *encoding,
            data: stored,
        },
        _ => Location::Embedded {
            encoding: Default::default(),
            data: stored,
        },
    };
    Ok(())
}

fn stage_elements(elements: &mut [CoreElement], options: &WriterOptions) -> Result<()> {
    for element in elements {
        match &mut element.kind {
            CoreElementKind::IccProfile { block, data } => {
                let bytes = data.clone();
                stage_distributed_block(block, bytes.as_deref(), 1, options)?;
            }
            CoreElementKind::Thumbnail(thumbnail) => {
                let bytes = thumbnail.pixels.clone();
                let item_size = thumbnail.sample_format.item_size();
                stage_distributed_block(&mut thumbnail.block, bytes.as_deref(), item_size, options)?;
            }
            _ => {}
        }
    }
    Ok(())
}
