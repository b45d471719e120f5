//! Error types used throughout the crate.

use std::io;

use thiserror::Error;

/// All faults an XISF read or write operation can surface.
///
/// Nothing is silently recovered: every fault propagates to the caller of the
/// top-level [`read_unit`](crate::read_unit) / [`write_unit`](crate::write_unit)
/// entry points. After a read fault the carrier's position is unspecified.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The first 8 bytes of a monolithic file are not `"XISF0100"`.
    #[error("invalid XISF signature")]
    InvalidSignature,

    /// The root element declares a version other than 1.0.
    #[error("unsupported XISF version: {0}")]
    UnsupportedVersion(String),

    /// A `.xisb` data-blocks file was handed to the unit reader. Blocks files
    /// can only be read through their owning unit's external references.
    #[error("cannot read a XISB data-blocks file as a unit")]
    DirectXisbRead,

    /// The XML header is not well-formed or violates the XISF grammar.
    #[error("malformed XML header: {0}")]
    MalformedXml(String),

    /// A mandatory attribute is absent from an element.
    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingRequiredAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    /// An attribute carries a value outside its enumeration.
    #[error("unknown {attribute} value: '{value}'")]
    UnknownEnumValue {
        attribute: &'static str,
        value: String,
    },

    /// Structural validation rejected the unit before any output was produced.
    #[error("unit failed validation: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// A compression codec outside the XISF 1.0 set.
    #[error("unsupported compression codec: '{0}'")]
    UnsupportedCodec(String),

    /// A checksum algorithm that is recognized but not implemented (SHA-3),
    /// or not recognized at all.
    #[error("unsupported checksum algorithm: '{0}'")]
    UnsupportedAlgorithm(String),

    /// A data block's stored form contradicts its declared metadata.
    #[error("corrupt data block: {0}")]
    CorruptBlock(String),

    /// A data block's bytes do not hash to the declared digest.
    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Byte-order conversion over an item size outside {1, 2, 4, 8, 16},
    /// or a buffer that is not a whole number of items.
    #[error("invalid item size {0} for byte-order conversion")]
    InvalidItemSize(u64),

    /// A substream window or block range falls outside its carrier.
    #[error("range [{position}, +{size}) exceeds available {available} bytes")]
    InvalidRange {
        position: u64,
        size: u64,
        available: u64,
    },

    /// No live `.xisb` index element carries the requested unique ID.
    #[error("no data block with unique ID {0} in blocks file index")]
    BlockNotFound(u64),

    /// An I/O fault from the carrier or a stream provider.
    #[error("stream I/O error: {0}")]
    StreamIo(#[from] io::Error),

    /// The carrier ended before a declared byte count was read.
    #[error("unexpected end of stream")]
    EndOfStream,

    /// The operation observed its cancellation token and stopped.
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::MalformedXml(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_framing_faults() {
        assert_eq!(Error::InvalidSignature.to_string(), "invalid XISF signature");
        assert_eq!(
            Error::UnsupportedVersion("2.0".into()).to_string(),
            "unsupported XISF version: 2.0"
        );
    }

    #[test]
    fn display_missing_attribute() {
        let e = Error::MissingRequiredAttribute {
            element: "Image",
            attribute: "geometry",
        };
        assert_eq!(
            e.to_string(),
            "<Image> is missing required attribute 'geometry'"
        );
    }

    #[test]
    fn display_validation_joins_messages() {
        let e = Error::ValidationFailed(vec!["first".into(), "second".into()]);
        assert_eq!(e.to_string(), "unit failed validation: first; second");
    }

    #[test]
    fn io_error_converts() {
        let e: Error = io::Error::other("boom").into();
        assert!(matches!(e, Error::StreamIo(_)));
    }
}
