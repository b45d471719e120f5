//! Data blocks: XISF's representation of bulk binary payloads.
//!
//! A block's `location` attribute names one of four storage shapes: inline
//! text, an embedded `<Data>` child, an attachment range inside the
//! monolithic file, or an external resource (URL or path, optionally indexed
//! through a `.xisb` blocks file). Every block additionally carries byte
//! order, optional compression and an optional checksum.
//!
//! Materializing a block runs raw acquisition → checksum verification →
//! decompression. Byte-order conversion is left to the consumer: the item
//! size belongs to the enclosing image or property, not to the block.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use url::Url;

use crate::byte_order::ByteOrder;
use crate::checksum::{self, Checksum};
use crate::compression::{self, Compression};
use crate::distributed::BlocksFile;
use crate::error::{Error, Result};
use crate::options::{ReaderOptions, WriterOptions};
use crate::stream::{resolve_header_relative, ReadSeek};
use crate::substream::SubStream;

// ── Text encodings ────────────────────────────────────────────────────────────

/// Encoding of an inline or embedded payload, wire form `base64`/`hex`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Base64,
    Hex,
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Base64 => "base64",
            Self::Hex => "hex",
        })
    }
}

impl FromStr for TextEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base64" => Ok(Self::Base64),
            "hex" => Ok(Self::Hex),
            other => Err(Error::UnknownEnumValue {
                attribute: "encoding",
                value: other.to_string(),
            }),
        }
    }
}

/// Decode inline/embedded text. Whitespace (SP, TAB, CR, LF) is stripped
/// first; hex accepts either case.
pub fn decode_text(text: &str, encoding: TextEncoding) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match encoding {
        TextEncoding::Base64 => {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| Error::CorruptBlock(format!("bad base64 payload: {e}")))
        }
        TextEncoding::Hex => {
            hex::decode(compact.as_bytes())
                .map_err(|e| Error::CorruptBlock(format!("bad hex payload: {e}")))
        }
    }
}

/// Encode a payload for inline/embedded storage. Hex is emitted lowercase.
pub fn encode_text(data: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Base64 => {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode(data)
        }
        TextEncoding::Hex => hex::encode(data),
    }
}

// ── Location ──────────────────────────────────────────────────────────────────

/// Target of an external block reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExternalTarget {
    Url(Url),
    /// A filesystem path, possibly `@header_dir/`-relative.
    Path(String),
}

/// Where a block's stored bytes live.
///
/// Inline and embedded payloads are held decoded-from-text but otherwise as
/// stored (still compressed when a `compression` attribute is present).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    /// Payload travels in the element's own text content.
    Inline {
        encoding: TextEncoding,
        data: Vec<u8>,
    },
    /// Payload travels in a `<Data>` child element.
    Embedded {
        encoding: TextEncoding,
        data: Vec<u8>,
    },
    /// Payload lives at an absolute range of the monolithic file.
    Attachment { position: u64, size: u64 },
    /// Payload lives outside the unit header, addressed by URL or path and
    /// optionally by a unique ID inside a `.xisb` blocks file.
    External {
        target: ExternalTarget,
        /// Byte range inside the resource, when known.
        position: Option<u64>,
        size: Option<u64>,
        /// Index element ID when the resource is a `.xisb` blocks file.
        index_id: Option<u64>,
    },
}

/// `location` attribute with the payload text not yet attached; produced by
/// the XML parser, which owns the element text and `<Data>` children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum LocationAttr {
    Inline(TextEncoding),
    Embedded,
    Attachment { position: u64, size: u64 },
    External {
        target: ExternalTarget,
        index_id: Option<u64>,
    },
}

impl LocationAttr {
    pub(crate) fn parse(attr: &str) -> Result<Self> {
        // URL and path forms first: their bodies may themselves contain ':'.
        for (prefix, is_url) in [("url(", true), ("path(", false)] {
            if let Some(rest) = attr.strip_prefix(prefix) {
                let close = rest.rfind(')').ok_or_else(|| {
                    Error::MalformedXml(format!("location '{attr}' lacks a closing parenthesis"))
                })?;
                let body = &rest[..close];
                let index_id = match &rest[close + 1..] {
                    "" => None,
                    tail => {
                        let id = tail.strip_prefix(':').ok_or_else(|| {
                            Error::MalformedXml(format!("unexpected trailer in location '{attr}'"))
                        })?;
                        Some(id.trim().parse::<u64>().map_err(|_| {
                            Error::MalformedXml(format!("bad index-id in location '{attr}'"))
                        })?)
                    }
                };
                let target = if is_url {
                    ExternalTarget::Url(Url::parse(body).map_err(|e| {
                        Error::MalformedXml(format!("bad URL in location '{attr}': {e}"))
                    })?)
                } else {
                    ExternalTarget::Path(body.to_string())
                };
                return Ok(Self::External { target, index_id });
            }
        }

        match attr.split(':').collect::<Vec<_>>().as_slice() {
            ["inline", encoding] => Ok(Self::Inline(encoding.parse()?)),
            ["embedded"] => Ok(Self::Embedded),
            ["attachment", position, size] => Ok(Self::Attachment {
                position: parse_u64(position, attr)?,
                size: parse_u64(size, attr)?,
            }),
            _ => Err(Error::MalformedXml(format!(
                "unrecognized location attribute '{attr}'"
            ))),
        }
    }
}

fn parse_u64(field: &str, attr: &str) -> Result<u64> {
    field
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::MalformedXml(format!("bad integer in location '{attr}'")))
}

// ── DataBlock ─────────────────────────────────────────────────────────────────

/// A block location plus its storage metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct DataBlock {
    pub location: Location,
    pub byte_order: ByteOrder,
    pub compression: Option<Compression>,
    pub checksum: Option<Checksum>,
}

impl DataBlock {
    pub fn inline(encoding: TextEncoding, data: Vec<u8>) -> Self {
        Self::with_location(Location::Inline { encoding, data })
    }

    pub fn embedded(encoding: TextEncoding, data: Vec<u8>) -> Self {
        Self::with_location(Location::Embedded { encoding, data })
    }

    pub fn attachment(position: u64, size: u64) -> Self {
        Self::with_location(Location::Attachment { position, size })
    }

    pub fn external(target: ExternalTarget, index_id: Option<u64>) -> Self {
        Self::with_location(Location::External {
            target,
            position: None,
            size: None,
            index_id,
        })
    }

    fn with_location(location: Location) -> Self {
        Self {
            location,
            byte_order: ByteOrder::default(),
            compression: None,
            checksum: None,
        }
    }

    /// Value of the `location` attribute for this block.
    pub(crate) fn location_attr(&self) -> String {
        match &self.location {
            Location::Inline { encoding, .. } => format!("inline:{encoding}"),
            Location::Embedded { .. } => "embedded".to_string(),
            Location::Attachment { position, size } => format!("attachment:{position}:{size}"),
            Location::External {
                target, index_id, ..
            } => {
                let mut s = match target {
                    ExternalTarget::Url(url) => format!("url({url})"),
                    ExternalTarget::Path(path) => format!("path({path})"),
                };
                if let Some(id) = index_id {
                    s.push_str(&format!(":{id}"));
                }
                s
            }
        }
    }
}

// ── Materialization pipeline ──────────────────────────────────────────────────

/// Where a block's carrier bytes come from, mirroring the unit's storage
/// shape: the monolithic file itself, or the distributed header's directory
/// plus the configured stream providers.
pub(crate) enum BlockContext<'a> {
    Monolithic(&'a mut dyn ReadSeek),
    Distributed { header_dir: Option<&'a Path> },
}

/// Materialize a block: acquire raw bytes, verify the checksum when asked,
/// then decompress. The result is in the block's stored byte order.
pub(crate) fn read_data(
    block: &DataBlock,
    ctx: &mut BlockContext<'_>,
    options: &ReaderOptions,
) -> Result<Vec<u8>> {
    options.cancel.check()?;
    let raw = raw_bytes(block, ctx, options)?;

    if options.validate_checksums {
        if let Some(expected) = &block.checksum {
            checksum::verify(&raw, expected, &options.cancel)?;
        }
    }

    match &block.compression {
        Some(compression) => compression::decompress(&raw, compression, &options.cancel),
        None => Ok(raw),
    }
}

fn raw_bytes(
    block: &DataBlock,
    ctx: &mut BlockContext<'_>,
    options: &ReaderOptions,
) -> Result<Vec<u8>> {
    match &block.location {
        Location::Inline { data, .. } | Location::Embedded { data, .. } => Ok(data.clone()),

        Location::Attachment { position, size } => match ctx {
            BlockContext::Monolithic(carrier) => {
                let mut view = SubStream::new(&mut **carrier, *position, *size)?;
                let mut buf = Vec::with_capacity(*size as usize);
                view.read_to_end(&mut buf)?;
                if buf.len() as u64 != *size {
                    return Err(Error::EndOfStream);
                }
                Ok(buf)
            }
            BlockContext::Distributed { .. } => Err(Error::MalformedXml(
                "attachment location is only valid inside a monolithic unit".into(),
            )),
        },

        Location::External {
            target,
            position,
            size,
            index_id,
        } => match ctx {
            BlockContext::Monolithic(_) => Err(Error::MalformedXml(
                "external location is only valid inside a distributed unit".into(),
            )),
            BlockContext::Distributed { header_dir } => match target {
                ExternalTarget::Path(path) => {
                    let resolved = resolve_header_relative(path, *header_dir);
                    let stream = options.file_provider.open(&resolved)?;
                    read_external(stream, *position, *size, *index_id, options)
                }
                ExternalTarget::Url(url) => {
                    let mut stream = options.uri_provider.open(url)?;
                    // Remote streams are sequential; buffer before windowing.
                    let mut buf = Vec::new();
                    stream.read_to_end(&mut buf)?;
                    read_external(
                        Box::new(std::io::Cursor::new(buf)),
                        *position,
                        *size,
                        *index_id,
                        options,
                    )
                }
            },
        },
    }
}

fn read_external(
    mut stream: Box<dyn ReadSeek>,
    position: Option<u64>,
    size: Option<u64>,
    index_id: Option<u64>,
    options: &ReaderOptions,
) -> Result<Vec<u8>> {
    options.cancel.check()?;
    if let Some(id) = index_id {
        let mut blocks = BlocksFile::open(stream)?;
        return blocks.read_block(id);
    }
    match (position, size) {
        (Some(position), Some(size)) => {
            let mut view = SubStream::new(&mut stream, position, size)?;
            let mut buf = Vec::with_capacity(size as usize);
            view.read_to_end(&mut buf)?;
            if buf.len() as u64 != size {
                return Err(Error::EndOfStream);
            }
            Ok(buf)
        }
        _ => {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

// ── Persist pipeline ──────────────────────────────────────────────────────────

/// Run the write-side pipeline over a payload: compress (per the block's own
/// codec, falling back to the writer default), then checksum the
/// post-compression bytes. Updates the block's metadata in place and returns
/// the bytes to store; placement is the storage engine's job.
pub(crate) fn prepare_payload(
    payload: &[u8],
    item_size: u64,
    block: &mut DataBlock,
    options: &WriterOptions,
) -> Result<Vec<u8>> {
    options.cancel.check()?;

    let codec = block
        .compression
        .as_ref()
        .map(|c| c.codec)
        .or(options.default_compression);

    let stored = match codec {
        Some(codec) => {
            let (stored, compression) =
                compression::compress(payload, codec, item_size, &options.cancel)?;
            block.compression = Some(compression);
            stored
        }
        None => {
            block.compression = None;
            payload.to_vec()
        }
    };

    block.checksum = if options.calculate_checksums {
        Some(Checksum::compute(
            &stored,
            options.checksum_algorithm,
            &options.cancel,
        )?)
    } else {
        None
    };

    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumAlgorithm;
    use crate::compression::CompressionCodec;
    use crate::options::CancelToken;
    use std::io::Cursor;

    #[test]
    fn text_decode_strips_whitespace() {
        let data = decode_text("AAEC\n  AwQF\t\r", TextEncoding::Base64).unwrap();
        assert_eq!(data, [0, 1, 2, 3, 4, 5]);
        let data = decode_text("00 01 0a FF", TextEncoding::Hex).unwrap();
        assert_eq!(data, [0x00, 0x01, 0x0A, 0xFF]);
    }

    #[test]
    fn text_encode_roundtrip() {
        let payload: Vec<u8> = (0u8..=255).collect();
        for encoding in [TextEncoding::Base64, TextEncoding::Hex] {
            let text = encode_text(&payload, encoding);
            assert_eq!(decode_text(&text, encoding).unwrap(), payload);
        }
    }

    #[test]
    fn hex_emit_is_lowercase() {
        assert_eq!(encode_text(&[0xAB, 0xCD], TextEncoding::Hex), "abcd");
    }

    #[test]
    fn location_attr_parse_forms() {
        assert_eq!(
            LocationAttr::parse("inline:hex").unwrap(),
            LocationAttr::Inline(TextEncoding::Hex)
        );
        assert_eq!(LocationAttr::parse("embedded").unwrap(), LocationAttr::Embedded);
        assert_eq!(
            LocationAttr::parse("attachment:4096:32").unwrap(),
            LocationAttr::Attachment {
                position: 4096,
                size: 32
            }
        );
    }

    #[test]
    fn location_attr_parse_url_with_scheme_colon() {
        let parsed = LocationAttr::parse("url(http://example.org/cal/flat.bin)").unwrap();
        match parsed {
            LocationAttr::External {
                target: ExternalTarget::Url(url),
                index_id: None,
            } => assert_eq!(url.as_str(), "http://example.org/cal/flat.bin"),
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn location_attr_parse_path_with_index_id() {
        let parsed = LocationAttr::parse("path(@header_dir/blocks.xisb):7").unwrap();
        assert_eq!(
            parsed,
            LocationAttr::External {
                target: ExternalTarget::Path("@header_dir/blocks.xisb".into()),
                index_id: Some(7),
            }
        );
    }

    #[test]
    fn location_attr_rejects_noise() {
        assert!(LocationAttr::parse("inline").is_err());
        assert!(LocationAttr::parse("attachment:12").is_err());
        assert!(LocationAttr::parse("carrier:12:34").is_err());
        assert!(LocationAttr::parse("url(http://x/y").is_err());
    }

    #[test]
    fn location_attr_emit_roundtrip() {
        let blocks = [
            DataBlock::inline(TextEncoding::Hex, vec![]),
            DataBlock::embedded(TextEncoding::Base64, vec![]),
            DataBlock::attachment(128, 64),
            DataBlock::external(ExternalTarget::Path("@header_dir/b.xisb".into()), Some(3)),
        ];
        let expected = [
            "inline:hex",
            "embedded",
            "attachment:128:64",
            "path(@header_dir/b.xisb):3",
        ];
        for (block, want) in blocks.iter().zip(expected) {
            assert_eq!(block.location_attr(), want);
        }
    }

    #[test]
    fn read_attached_block() {
        let mut carrier = Cursor::new({
            let mut bytes = vec![0u8; 16];
            bytes.extend_from_slice(b"pixeldata");
            bytes
        });
        let block = DataBlock::attachment(16, 9);
        let mut ctx = BlockContext::Monolithic(&mut carrier);
        let data = read_data(&block, &mut ctx, &ReaderOptions::default()).unwrap();
        assert_eq!(data, b"pixeldata");
    }

    #[test]
    fn short_attachment_is_rejected() {
        let mut carrier = Cursor::new(vec![0u8; 20]);
        let block = DataBlock::attachment(16, 32);
        let mut ctx = BlockContext::Monolithic(&mut carrier);
        assert!(matches!(
            read_data(&block, &mut ctx, &ReaderOptions::default()),
            Err(Error::InvalidRange { .. })
        ));
    }

    #[test]
    fn pipeline_checksum_and_compression() {
        let payload = vec![0x11u8; 512];
        let options = WriterOptions {
            default_compression: Some(CompressionCodec::ZlibSh),
            calculate_checksums: true,
            checksum_algorithm: ChecksumAlgorithm::Sha1,
            ..Default::default()
        };

        let mut block = DataBlock::attachment(0, 0);
        let stored = prepare_payload(&payload, 2, &mut block, &options).unwrap();
        let compression = block.compression.clone().unwrap();
        assert_eq!(compression.codec, CompressionCodec::ZlibSh);
        assert_eq!(compression.uncompressed_size, 512);
        assert_eq!(compression.item_size, Some(2));
        assert!(block.checksum.is_some());

        // Round-trip through the read pipeline over an in-memory carrier.
        let mut file = vec![0u8; 100];
        file.extend_from_slice(&stored);
        block.location = Location::Attachment {
            position: 100,
            size: stored.len() as u64,
        };
        let mut carrier = Cursor::new(file);
        let mut ctx = BlockContext::Monolithic(&mut carrier);
        let restored = read_data(&block, &mut ctx, &ReaderOptions::default()).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn pipeline_detects_checksum_mismatch() {
        let options = WriterOptions {
            calculate_checksums: true,
            ..Default::default()
        };
        let mut block = DataBlock::attachment(0, 0);
        let mut stored = prepare_payload(b"sensor frame", 1, &mut block, &options).unwrap();
        stored[0] ^= 0xFF;

        block.location = Location::Attachment {
            position: 0,
            size: stored.len() as u64,
        };
        let mut carrier = Cursor::new(stored);
        let mut ctx = BlockContext::Monolithic(&mut carrier);
        assert!(matches!(
            read_data(&block, &mut ctx, &ReaderOptions::default()),
            Err(Error::ChecksumMismatch { .. })
        ));

        // Verification can be opted out of.
        let lax = ReaderOptions {
            validate_checksums: false,
            ..Default::default()
        };
        let mut carrier = Cursor::new({
            let mut v = b"sensor frame".to_vec();
            v[0] ^= 0xFF;
            v
        });
        let mut ctx = BlockContext::Monolithic(&mut carrier);
        assert!(read_data(&block, &mut ctx, &lax).is_ok());
    }

    #[test]
    fn inline_blocks_ignore_the_carrier() {
        let block = DataBlock::inline(TextEncoding::Base64, vec![1, 2, 3]);
        let mut ctx = BlockContext::Distributed { header_dir: None };
        let data = read_data(&block, &mut ctx, &ReaderOptions::default()).unwrap();
        assert_eq!(data, [1, 2, 3]);
    }

    #[test]
    fn cancelled_read_aborts() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let options = ReaderOptions {
            cancel,
            ..Default::default()
        };
        let block = DataBlock::inline(TextEncoding::Base64, vec![1]);
        let mut ctx = BlockContext::Distributed { header_dir: None };
        assert!(matches!(
            read_data(&block, &mut ctx, &options),
            Err(Error::Cancelled)
        ));
    }
}
