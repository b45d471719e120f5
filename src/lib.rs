//! Reader/writer for the XISF 1.0 astronomical image serialization format.
//!
//! An XISF *unit* bundles one or more multidimensional pixel arrays with
//! typed properties, FITS keywords, color-management data, thumbnails and
//! more. Units come in two storage shapes: monolithic `.xisf` files (binary
//! framing, XML header, attached data blocks) and distributed `.xish`
//! headers whose blocks live in external resources such as `.xisb`
//! data-blocks files.
//!
//! ```no_run
//! use xisfio::{read_unit, write_unit, ReaderOptions, WriterOptions};
//! use xisfio::image::{ColorSpace, Geometry, Image, SampleFormat};
//! use xisfio::unit::{Header, Metadata, Unit};
//!
//! // Write a one-image unit.
//! let mut header = Header::new(Metadata::new("my-app 1.0"));
//! let pixels = vec![0u8; 4 * 4 * 2];
//! header.images.push(Image::new(
//!     Geometry::new(vec![4, 4], 1),
//!     SampleFormat::UInt16,
//!     ColorSpace::Gray,
//!     pixels,
//! ));
//! write_unit(&Unit::monolithic(header), "out.xisf", &WriterOptions::default())?;
//!
//! // Read it back.
//! let unit = read_unit("out.xisf", &ReaderOptions::default())?;
//! assert_eq!(unit.header.images.len(), 1);
//! # Ok::<(), xisfio::Error>(())
//! ```

/// Endian swap over fixed item sizes.
pub mod byte_order;
/// SHA digests and the `checksum` attribute wire form.
pub mod checksum;
/// zlib/LZ4/LZ4-HC codecs and byte-shuffle preconditioning.
pub mod compression;
/// Core elements: resolution, FITS keywords, ICC profiles, thumbnails…
pub mod core_element;
/// Data-block locations and the materialize/persist pipeline.
pub mod data_block;
/// `.xish` headers and `.xisb` data-blocks files.
pub mod distributed;
/// Error types used throughout the crate.
pub mod error;
/// Image records: geometry, sample format, color space.
pub mod image;
mod monolithic;
/// Reader/writer option records and cancellation.
pub mod options;
/// Typed property records and their value wire forms.
pub mod property;
/// Read façade: format sniffing and routing.
pub mod reader;
/// Stream-provider traits for path and URI resolution.
pub mod stream;
/// Bounded read-only views over seekable carriers.
pub mod substream;
/// Unit, header and metadata records.
pub mod unit;
/// Structural validation of units before writing.
pub mod validator;
/// Write façade: validation and routing.
pub mod writer;
mod xml;

pub use error::{Error, Result};
pub use options::{CancelToken, ReaderOptions, WriterOptions};
pub use reader::{read_header, read_header_from, read_unit, read_unit_from, FormatHint};
pub use unit::{Header, Metadata, StorageModel, Unit};
pub use validator::{validate_unit, ValidationResult};
pub use writer::{write_unit, write_unit_to};
pub use xml::XISF_NAMESPACE;
