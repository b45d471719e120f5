//! Read façade: format sniffing, option plumbing, and routing to the
//! storage engines.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::distributed;
use crate::error::{Error, Result};
use crate::monolithic;
use crate::options::ReaderOptions;
use crate::unit::{Header, Unit};

/// Storage shape of a unit on its carrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatHint {
    /// `.xisf`: binary framing plus attached blocks.
    Monolithic,
    /// `.xish`: XML only.
    Distributed,
}

/// Read a unit from a file, sniffing the format from the extension and the
/// leading signature bytes.
pub fn read_unit(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Unit> {
    let path = path.as_ref();
    let mut carrier = BufReader::new(File::open(path)?);
    let header_filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    read_routed(
        &mut carrier,
        hint_from_extension(path),
        path.parent(),
        &header_filename,
        options,
    )
}

/// Read a unit from an open carrier. With no hint the format is detected
/// from the first 8 bytes.
pub fn read_unit_from<R: Read + Seek>(
    carrier: &mut R,
    hint: Option<FormatHint>,
    options: &ReaderOptions,
) -> Result<Unit> {
    read_routed(carrier, hint, None, "", options)
}

/// Read the header of a unit without materializing any pixel data. Fast path
/// for inspection and validation tooling.
pub fn read_header(path: impl AsRef<Path>) -> Result<Header> {
    let path = path.as_ref();
    let mut carrier = BufReader::new(File::open(path)?);
    read_header_from(&mut carrier, hint_from_extension(path))
}

/// Header-only read from an open carrier.
pub fn read_header_from<R: Read + Seek>(
    carrier: &mut R,
    hint: Option<FormatHint>,
) -> Result<Header> {
    match detect(carrier, hint)? {
        FormatHint::Monolithic => monolithic::read_header_from(carrier),
        FormatHint::Distributed => {
            let mut bytes = Vec::new();
            carrier.read_to_end(&mut bytes)?;
            let xml = String::from_utf8(bytes)
                .map_err(|e| Error::MalformedXml(format!("header is not UTF-8 XML: {e}")))?;
            crate::xml::parse_header(&xml)
        }
    }
}

fn read_routed<R: Read + Seek>(
    carrier: &mut R,
    hint: Option<FormatHint>,
    header_dir: Option<&Path>,
    header_filename: &str,
    options: &ReaderOptions,
) -> Result<Unit> {
    match detect(carrier, hint)? {
        FormatHint::Monolithic => monolithic::read_unit_from(carrier, options),
        FormatHint::Distributed => {
            distributed::read_unit_from(carrier, header_dir, header_filename, options)
        }
    }
}

fn hint_from_extension(path: &Path) -> Option<FormatHint> {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("xisf") => Some(FormatHint::Monolithic),
        Some("xish") => Some(FormatHint::Distributed),
        _ => None,
    }
}

/// Resolve the storage shape: take the hint when one is supplied, otherwise
/// peek the first 8 bytes. A blocks-file signature is refused outright —
/// `.xisb` content is only reachable through a referring unit.
fn detect<R: Read + Seek>(carrier: &mut R, hint: Option<FormatHint>) -> Result<FormatHint> {
    if let Some(hint) = hint {
        return Ok(hint);
    }
    let start = carrier.stream_position()?;
    let mut magic = [0u8; 8];
    let mut filled = 0;
    while filled < magic.len() {
        let n = carrier.read(&mut magic[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    carrier.seek(SeekFrom::Start(start))?;

    if &magic[..filled] == monolithic::SIGNATURE {
        Ok(FormatHint::Monolithic)
    } else if &magic[..filled] == distributed::XISB_SIGNATURE {
        Err(Error::DirectXisbRead)
    } else {
        // Anything else is taken for a distributed XML header.
        Ok(FormatHint::Distributed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn xisb_signature_is_refused() {
        let mut bytes = b"XISB0100".to_vec();
        bytes.extend_from_slice(&[0u8; 24]);
        assert!(matches!(
            read_unit_from(&mut Cursor::new(bytes), None, &ReaderOptions::default()),
            Err(Error::DirectXisbRead)
        ));
    }

    #[test]
    fn xml_content_is_detected_as_distributed() {
        let mut carrier = Cursor::new(b"<?xml version=\"1.0\"?><not-xisf/>".to_vec());
        assert_eq!(
            detect(&mut carrier, None).unwrap(),
            FormatHint::Distributed
        );
        // Detection must leave the carrier where it found it.
        assert_eq!(carrier.position(), 0);
    }

    #[test]
    fn monolithic_signature_is_detected() {
        let mut carrier = Cursor::new(b"XISF0100\x41\x00\x00\x00\x00\x00\x00\x00".to_vec());
        assert_eq!(
            detect(&mut carrier, None).unwrap(),
            FormatHint::Monolithic
        );
    }

    #[test]
    fn explicit_hint_wins() {
        let mut carrier = Cursor::new(b"XISF0100".to_vec());
        assert_eq!(
            detect(&mut carrier, Some(FormatHint::Distributed)).unwrap(),
            FormatHint::Distributed
        );
    }

    #[test]
    fn extension_hints() {
        assert_eq!(
            hint_from_extension(Path::new("/a/session.XISF")),
            Some(FormatHint::Monolithic)
        );
        assert_eq!(
            hint_from_extension(Path::new("unit.xish")),
            Some(FormatHint::Distributed)
        );
        assert_eq!(hint_from_extension(Path::new("blocks.xisb")), None);
        assert_eq!(hint_from_extension(Path::new("noext")), None);
    }
}
