//! Write façade: fail-fast validation, then routing to the storage engines.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::distributed;
use crate::error::{Error, Result};
use crate::monolithic;
use crate::options::WriterOptions;
use crate::unit::{StorageModel, Unit};
use crate::validator::validate_unit;

/// Write a unit to a file.
///
/// Validation runs before any byte is produced; a unit with validation
/// errors aborts with [`Error::ValidationFailed`]. A recognized extension
/// (`.xisf`/`.xish`) picks the storage engine, otherwise the unit's storage
/// model decides.
pub fn write_unit(unit: &Unit, path: impl AsRef<Path>, options: &WriterOptions) -> Result<()> {
    let path = path.as_ref();
    check(unit)?;

    let mut writer = BufWriter::new(File::create(path)?);
    match route(unit, path) {
        FormatChoice::Monolithic => monolithic::write_unit_to(unit, &mut writer, options)?,
        FormatChoice::Distributed => distributed::write_unit_to(unit, &mut writer, options)?,
    }
    writer.flush()?;
    Ok(())
}

/// Write a unit to an open stream, routed by its storage model.
pub fn write_unit_to<W: Write>(unit: &Unit, writer: &mut W, options: &WriterOptions) -> Result<()> {
    check(unit)?;
    match unit.storage {
        StorageModel::Monolithic => monolithic::write_unit_to(unit, writer, options),
        StorageModel::Distributed { .. } => distributed::write_unit_to(unit, writer, options),
    }
}

fn check(unit: &Unit) -> Result<()> {
    let result = validate_unit(unit);
    if result.ok() {
        Ok(())
    } else {
        Err(Error::ValidationFailed(result.errors))
    }
}

enum FormatChoice {
    Monolithic,
    Distributed,
}

fn route(unit: &Unit, path: &Path) -> FormatChoice {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("xisf") => FormatChoice::Monolithic,
        Some("xish") => FormatChoice::Distributed,
        _ => match unit.storage {
            StorageModel::Monolithic => FormatChoice::Monolithic,
            StorageModel::Distributed { .. } => FormatChoice::Distributed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ColorSpace, Geometry, Image, SampleFormat};
    use crate::unit::{Header, Metadata};

    #[test]
    fn invalid_unit_produces_no_output() {
        let mut header = Header::new(Metadata::new("writer tests"));
        let mut image = Image::new(
            Geometry::new(vec![2, 2], 1),
            SampleFormat::Float32, // missing mandatory bounds
            ColorSpace::Gray,
            vec![0; 16],
        );
        image.bounds = None;
        header.images.push(image);
        let unit = Unit::monolithic(header);

        let mut out = Vec::new();
        let err = write_unit_to(&unit, &mut out, &WriterOptions::default()).unwrap_err();
        match err {
            Error::ValidationFailed(errors) => {
                assert!(errors.iter().any(|e| e.contains("bounds")), "{errors:?}")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(out.is_empty());
    }
}
