//! Byte-order normalization for pixel and property payloads.
//!
//! XISF data blocks default to little-endian storage but may declare
//! big-endian. The engine never converts implicitly: the item size depends on
//! the enclosing image's sample format (or a property's element type), so
//! conversion happens only when the consumer asks for it.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Endianness of a stored data block, wire form `little`/`big`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Little => "little",
            Self::Big => "big",
        })
    }
}

impl FromStr for ByteOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "little" => Ok(Self::Little),
            "big" => Ok(Self::Big),
            other => Err(Error::UnknownEnumValue {
                attribute: "byteOrder",
                value: other.to_string(),
            }),
        }
    }
}

/// Convert `data` from `from`-endian to `to`-endian items of `item_size`
/// bytes, in place.
///
/// A no-op when the orders match or items are single bytes. Otherwise the
/// item size must be one of 2, 4, 8 or 16 and the buffer a whole number of
/// items, or the call fails with [`Error::InvalidItemSize`].
pub fn convert(data: &mut [u8], from: ByteOrder, to: ByteOrder, item_size: u64) -> Result<()> {
    if from == to || item_size == 1 {
        return Ok(());
    }
    if !matches!(item_size, 2 | 4 | 8 | 16) || data.len() as u64 % item_size != 0 {
        return Err(Error::InvalidItemSize(item_size));
    }
    for item in data.chunks_exact_mut(item_size as usize) {
        item.reverse();
    }
    Ok(())
}
