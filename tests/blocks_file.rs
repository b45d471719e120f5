use std::fs::File;
use std::io::Write as _;

use tempfile::tempdir;

use xisfio::data_block::{DataBlock, ExternalTarget};
use xisfio::distributed::{BlocksFile, XISB_SIGNATURE};
use xisfio::image::{ColorSpace, Geometry, Image, SampleFormat};
use xisfio::property::parse_time_point;
use xisfio::unit::{Header, Metadata, StorageModel, Unit};
use xisfio::{read_unit, write_unit, ReaderOptions, WriterOptions};

/// Lay out a `.xisb` file: 16-byte header, one index node, block payloads.
fn write_blocks_file(path: &std::path::Path, blocks: &[(u64, &[u8])]) {
    let node_len = 16 + blocks.len() * 40;
    let mut payload_pos = (16 + node_len) as u64;

    let mut bytes = Vec::new();
    bytes.extend_from_slice(XISB_SIGNATURE);
    bytes.extend_from_slice(&0u64.to_le_bytes());

    bytes.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes());
    for (unique_id, data) in blocks {
        bytes.extend_from_slice(&unique_id.to_le_bytes());
        bytes.extend_from_slice(&payload_pos.to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        payload_pos += data.len() as u64;
    }
    for (_, data) in blocks {
        bytes.extend_from_slice(data);
    }

    File::create(path).unwrap().write_all(&bytes).unwrap();
}

fn test_metadata() -> Metadata {
    let mut metadata = Metadata::new("xisfio blocks-file tests");
    metadata.creation_time = parse_time_point("2025-07-15T21:05:42.000+00:00").unwrap();
    metadata
}

#[test]
fn external_pixels_resolve_through_the_blocks_file() {
    let dir = tempdir().unwrap();
    let pixels: Vec<u8> = (0u8..16).collect();
    write_blocks_file(&dir.path().join("pixels.xisb"), &[(7, &pixels)]);

    let mut header = Header::new(test_metadata());
    let mut image = Image::new(
        Geometry::new(vec![4, 4], 1),
        SampleFormat::UInt8,
        ColorSpace::Gray,
        Vec::new(),
    );
    image.pixels = None;
    image.block = DataBlock::external(
        ExternalTarget::Path("@header_dir/pixels.xisb".into()),
        Some(7),
    );
    header.images.push(image);

    let header_path = dir.path().join("unit.xish");
    write_unit(
        &Unit::distributed(header, "unit.xish"),
        &header_path,
        &WriterOptions::default(),
    )
    .unwrap();

    // Without the flag the reference stays unresolved.
    let unit = read_unit(&header_path, &ReaderOptions::default()).unwrap();
    assert_eq!(unit.header.images[0].pixels, None);

    // With it, pixels materialize through the blocks-file index.
    let options = ReaderOptions {
        load_external_references: true,
        ..Default::default()
    };
    let unit = read_unit(&header_path, &options).unwrap();
    assert_eq!(unit.header.images[0].pixels.as_deref(), Some(&pixels[..]));
    match &unit.storage {
        StorageModel::Distributed {
            data_block_filenames,
            ..
        } => assert_eq!(
            data_block_filenames,
            &["@header_dir/pixels.xisb".to_string()]
        ),
        other => panic!("unexpected storage model: {other:?}"),
    }
}

#[test]
fn whole_file_external_reference_reads_to_end() {
    let dir = tempdir().unwrap();
    let raw = b"raw external pixel bytes";
    File::create(dir.path().join("frame.bin"))
        .unwrap()
        .write_all(raw)
        .unwrap();

    let mut header = Header::new(test_metadata());
    let mut image = Image::new(
        Geometry::new(vec![raw.len() as u64, 1], 1),
        SampleFormat::UInt8,
        ColorSpace::Gray,
        Vec::new(),
    );
    image.pixels = None;
    image.block = DataBlock::external(
        ExternalTarget::Path("@header_dir/frame.bin".into()),
        None,
    );
    header.images.push(image);

    let header_path = dir.path().join("unit.xish");
    write_unit(
        &Unit::distributed(header, "unit.xish"),
        &header_path,
        &WriterOptions::default(),
    )
    .unwrap();

    let options = ReaderOptions {
        load_external_references: true,
        ..Default::default()
    };
    let unit = read_unit(&header_path, &options).unwrap();
    assert_eq!(unit.header.images[0].pixels.as_deref(), Some(&raw[..]));
}

#[test]
fn blocks_file_navigation_over_a_real_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.xisb");
    write_blocks_file(&path, &[(1, b"dark"), (2, b"flat frame")]);

    let mut blocks = BlocksFile::open(File::open(&path).unwrap()).unwrap();
    assert_eq!(blocks.index().len(), 2);
    assert_eq!(blocks.read_block(2).unwrap(), b"flat frame");
    assert_eq!(blocks.read_block(1).unwrap(), b"dark");
    assert!(blocks.read_block(3).is_err());
}

#[test]
fn monolithic_unit_rewrites_as_distributed_header() {
    // Extension routing: a monolithic unit written to `.xish` embeds its
    // pixels in the XML header.
    let dir = tempdir().unwrap();
    let mut header = Header::new(test_metadata());
    header.images.push(Image::new(
        Geometry::new(vec![2, 2], 1),
        SampleFormat::UInt8,
        ColorSpace::Gray,
        vec![1, 2, 3, 4],
    ));
    let unit = Unit::monolithic(header);

    let path = dir.path().join("unit.xish");
    write_unit(&unit, &path, &WriterOptions::default()).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"<?xml"));

    let restored = read_unit(&path, &ReaderOptions::default()).unwrap();
    assert_eq!(restored.header.images[0].pixels.as_deref(), Some(&[1, 2, 3, 4][..]));
}
