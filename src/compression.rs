//! Data-block compression: zlib, LZ4 and LZ4-HC, with optional byte-shuffle
//! preconditioning.
//!
//! The `compression` attribute travels as
//! `<codec>:<uncompressed-size>[:<item-size>][:<sub-blocks…>]` where the item
//! size appears exactly for the `+sh` codec variants and sub-blocks are
//! `compressed,uncompressed` pairs for payloads split past a codec's
//! single-block limit. Encoding always shuffles before compressing and
//! decoding unshuffles after, so `uncompressed_size` is the length of the
//! original, unshuffled payload.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression as ZlibLevel;

use crate::error::{Error, Result};
use crate::options::CancelToken;

/// Bytes pushed through a codec between cancellation checks.
const CODEC_CHUNK: usize = 80 * 1024;

/// Largest payload a single zlib or LZ4 block may carry.
const MAX_BLOCK: usize = u32::MAX as usize;

// ── Codec identifiers ─────────────────────────────────────────────────────────

/// A compression codec named by the `compression` attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionCodec {
    Zlib,
    ZlibSh,
    Lz4,
    Lz4Sh,
    Lz4Hc,
    Lz4HcSh,
}

impl CompressionCodec {
    /// Canonical attribute spelling.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Zlib => "zlib",
            Self::ZlibSh => "zlib+sh",
            Self::Lz4 => "lz4",
            Self::Lz4Sh => "lz4+sh",
            Self::Lz4Hc => "lz4hc",
            Self::Lz4HcSh => "lz4hc+sh",
        }
    }

    /// Whether this codec byte-shuffles before encoding.
    pub fn shuffled(self) -> bool {
        matches!(self, Self::ZlibSh | Self::Lz4Sh | Self::Lz4HcSh)
    }

    /// The same codec without the shuffle stage.
    pub fn without_shuffle(self) -> Self {
        match self {
            Self::ZlibSh => Self::Zlib,
            Self::Lz4Sh => Self::Lz4,
            Self::Lz4HcSh => Self::Lz4Hc,
            plain => plain,
        }
    }

    /// Shuffling single-byte items is pointless, so `+sh` codecs degrade to
    /// their plain variant when the sample item size is below 2.
    pub fn for_item_size(self, item_size: u64) -> Self {
        if item_size < 2 {
            self.without_shuffle()
        } else {
            self
        }
    }
}

impl fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for CompressionCodec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zlib" => Ok(Self::Zlib),
            "zlib+sh" => Ok(Self::ZlibSh),
            "lz4" => Ok(Self::Lz4),
            "lz4+sh" => Ok(Self::Lz4Sh),
            "lz4hc" => Ok(Self::Lz4Hc),
            "lz4hc+sh" => Ok(Self::Lz4HcSh),
            other => Err(Error::UnsupportedCodec(other.to_string())),
        }
    }
}

// ── Compression record ────────────────────────────────────────────────────────

/// Parsed form of a data block's `compression` attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Compression {
    pub codec: CompressionCodec,
    /// Length in bytes of the original (unshuffled) payload.
    pub uncompressed_size: u64,
    /// Shuffle item size; present exactly for `+sh` codecs.
    pub item_size: Option<u64>,
    /// `(compressed, uncompressed)` sizes when the payload was split into
    /// sub-blocks. Empty for the common single-block form.
    pub sub_blocks: Vec<(u64, u64)>,
}

impl Compression {
    /// Serialize to the attribute wire form.
    pub fn to_attr(&self) -> String {
        let mut s = format!("{}:{}", self.codec, self.uncompressed_size);
        if let Some(item_size) = self.item_size {
            s.push_str(&format!(":{item_size}"));
        }
        for (compressed, uncompressed) in &self.sub_blocks {
            s.push_str(&format!(":{compressed},{uncompressed}"));
        }
        s
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_attr())
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = s.split(':');
        let codec: CompressionCodec = fields
            .next()
            .unwrap_or_default()
            .parse()?;
        let uncompressed_size = parse_size(
            fields
                .next()
                .ok_or_else(|| Error::MalformedXml(format!("compression '{s}' lacks a size")))?,
        )?;

        let item_size = if codec.shuffled() {
            let field = fields.next().ok_or_else(|| {
                Error::MalformedXml(format!("compression '{s}' lacks a shuffle item size"))
            })?;
            let size = parse_size(field)?;
            if size == 0 {
                return Err(Error::MalformedXml(
                    "shuffle item size cannot be zero".into(),
                ));
            }
            if size == 1 {
                tracing::warn!("shuffle item size 1 makes byte shuffling a no-op");
            }
            Some(size)
        } else {
            None
        };

        let mut sub_blocks = Vec::new();
        let mut sub_total = 0u64;
        for field in fields {
            let (compressed, uncompressed) = field.split_once(',').ok_or_else(|| {
                Error::MalformedXml(format!("sub-block '{field}' is not a size pair"))
            })?;
            let pair = (parse_size(compressed)?, parse_size(uncompressed)?);
            sub_total += pair.1;
            sub_blocks.push(pair);
        }
        if !sub_blocks.is_empty() && sub_total != uncompressed_size {
            return Err(Error::MalformedXml(format!(
                "sub-block uncompressed sizes sum to {sub_total}, expected {uncompressed_size}"
            )));
        }

        Ok(Self {
            codec,
            uncompressed_size,
            item_size,
            sub_blocks,
        })
    }
}

fn parse_size(s: &str) -> Result<u64> {
    s.trim()
        .parse::<u64>()
        .map_err(|_| Error::MalformedXml(format!("'{s}' is not an unsigned size")))
}

// ── Byte shuffle ──────────────────────────────────────────────────────────────

/// Group like-positioned bytes of `item_size`-wide items together.
///
/// For `N` whole items, output byte `j*N + i` is input byte `i*item_size + j`;
/// the `len % item_size` tail bytes are copied verbatim to the end.
pub fn shuffle(data: &[u8], item_size: u64) -> Vec<u8> {
    let s = item_size as usize;
    if s < 2 {
        return data.to_vec();
    }
    let n = data.len() / s;
    let mut out = vec![0u8; data.len()];
    for i in 0..n {
        for j in 0..s {
            out[j * n + i] = data[i * s + j];
        }
    }
    out[n * s..].copy_from_slice(&data[n * s..]);
    out
}

/// Exact inverse of [`shuffle`].
pub fn unshuffle(data: &[u8], item_size: u64) -> Vec<u8> {
    let s = item_size as usize;
    if s < 2 {
        return data.to_vec();
    }
    let n = data.len() / s;
    let mut out = vec![0u8; data.len()];
    for i in 0..n {
        for j in 0..s {
            out[i * s + j] = data[j * n + i];
        }
    }
    out[n * s..].copy_from_slice(&data[n * s..]);
    out
}

// ── Encode / decode ───────────────────────────────────────────────────────────

/// Compress `data` under `codec`, returning the stored bytes and the
/// [`Compression`] record describing them.
///
/// `item_size` is the sample width used for `+sh` preconditioning (ignored by
/// the plain codecs). Inputs past the single-block limit are split into
/// sub-blocks.
pub fn compress(
    data: &[u8],
    codec: CompressionCodec,
    item_size: u64,
    cancel: &CancelToken,
) -> Result<(Vec<u8>, Compression)> {
    cancel.check()?;
    let codec = codec.for_item_size(item_size);

    let shuffled;
    let input: &[u8] = if codec.shuffled() {
        shuffled = shuffle(data, item_size);
        &shuffled
    } else {
        data
    };

    // An empty payload still encodes as one (empty) block so the stored
    // stream is well formed for the decoder.
    let chunks: Vec<&[u8]> = if input.is_empty() {
        vec![input]
    } else {
        input.chunks(MAX_BLOCK).collect()
    };

    let mut out = Vec::new();
    let mut sub_blocks = Vec::new();
    for chunk in chunks {
        let encoded = encode_one(chunk, codec, cancel)?;
        sub_blocks.push((encoded.len() as u64, chunk.len() as u64));
        out.extend_from_slice(&encoded);
    }
    if sub_blocks.len() == 1 {
        sub_blocks.clear();
    }

    let compression = Compression {
        codec,
        uncompressed_size: data.len() as u64,
        item_size: codec.shuffled().then_some(item_size),
        sub_blocks,
    };
    Ok((out, compression))
}

fn encode_one(chunk: &[u8], codec: CompressionCodec, cancel: &CancelToken) -> Result<Vec<u8>> {
    match codec.without_shuffle() {
        CompressionCodec::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), ZlibLevel::default());
            for piece in chunk.chunks(CODEC_CHUNK) {
                cancel.check()?;
                encoder.write_all(piece)?;
            }
            Ok(encoder.finish()?)
        }
        // An LZ4-HC stream is format-compatible with plain LZ4; both encode
        // through the block compressor and decode through the same path.
        CompressionCodec::Lz4 | CompressionCodec::Lz4Hc => {
            cancel.check()?;
            Ok(lz4_flex::compress(chunk))
        }
        _ => unreachable!("shuffle variants are mapped to their plain codec"),
    }
}

/// Decompress `data` as described by `compression`.
///
/// Decodes to exactly `compression.uncompressed_size` bytes (anything else is
/// [`Error::CorruptBlock`]), then reverses the byte shuffle for `+sh` codecs.
pub fn decompress(data: &[u8], compression: &Compression, cancel: &CancelToken) -> Result<Vec<u8>> {
    cancel.check()?;
    let expected = compression.uncompressed_size;

    let mut out = Vec::with_capacity(expected.min(MAX_BLOCK as u64) as usize);
    if compression.sub_blocks.is_empty() {
        decode_one(data, compression.codec, expected, &mut out, cancel)?;
    } else {
        let mut offset = 0usize;
        for &(compressed, uncompressed) in &compression.sub_blocks {
            let end = offset
                .checked_add(compressed as usize)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| {
                    Error::CorruptBlock("sub-block sizes exceed stored payload".into())
                })?;
            decode_one(&data[offset..end], compression.codec, uncompressed, &mut out, cancel)?;
            offset = end;
        }
    }

    if out.len() as u64 != expected {
        return Err(Error::CorruptBlock(format!(
            "decompressed to {} bytes, header declares {expected}",
            out.len()
        )));
    }

    if let Some(item_size) = compression.item_size.filter(|&s| s >= 2) {
        out = unshuffle(&out, item_size);
    }
    Ok(out)
}

fn decode_one(
    data: &[u8],
    codec: CompressionCodec,
    uncompressed: u64,
    out: &mut Vec<u8>,
    cancel: &CancelToken,
) -> Result<()> {
    match codec.without_shuffle() {
        CompressionCodec::Zlib => {
            let start = out.len();
            let mut decoder = ZlibDecoder::new(data);
            let mut buf = [0u8; CODEC_CHUNK];
            loop {
                cancel.check()?;
                let n = decoder
                    .read(&mut buf)
                    .map_err(|e| Error::CorruptBlock(format!("zlib stream: {e}")))?;
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
                // Bound memory before the final length check would catch it.
                if (out.len() - start) as u64 > uncompressed {
                    return Err(Error::CorruptBlock("zlib stream overruns declared size".into()));
                }
            }
            Ok(())
        }
        CompressionCodec::Lz4 | CompressionCodec::Lz4Hc => {
            cancel.check()?;
            let decoded = lz4_flex::decompress(data, uncompressed as usize)
                .map_err(|e| Error::CorruptBlock(format!("lz4 stream: {e}")))?;
            out.extend_from_slice(&decoded);
            Ok(())
        }
        _ => unreachable!("shuffle variants are mapped to their plain codec"),
    }
}
