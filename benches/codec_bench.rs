use criterion::{black_box, criterion_group, criterion_main, Criterion};

use xisfio::compression::{compress, decompress, shuffle, unshuffle, CompressionCodec};
use xisfio::CancelToken;

fn synthetic_pixels() -> Vec<u8> {
    // 1 MiB of 16-bit gradient samples, the shape byte shuffling thrives on.
    let mut data = Vec::with_capacity(1024 * 1024);
    for i in 0u32..(512 * 1024) {
        data.extend_from_slice(&((i % 4096) as u16).to_le_bytes());
    }
    data
}

fn bench_shuffle(c: &mut Criterion) {
    let data = synthetic_pixels();
    c.bench_function("shuffle_1mb_u16", |b| {
        b.iter(|| shuffle(black_box(&data), 2))
    });
    let shuffled = shuffle(&data, 2);
    c.bench_function("unshuffle_1mb_u16", |b| {
        b.iter(|| unshuffle(black_box(&shuffled), 2))
    });
}

fn bench_codecs(c: &mut Criterion) {
    let data = synthetic_pixels();
    let cancel = CancelToken::new();

    for codec in [
        CompressionCodec::Zlib,
        CompressionCodec::ZlibSh,
        CompressionCodec::Lz4,
        CompressionCodec::Lz4Sh,
    ] {
        c.bench_function(&format!("compress_1mb_{codec}"), |b| {
            b.iter(|| compress(black_box(&data), codec, 2, &cancel).unwrap())
        });
        let (stored, compression) = compress(&data, codec, 2, &cancel).unwrap();
        c.bench_function(&format!("decompress_1mb_{codec}"), |b| {
            b.iter(|| decompress(black_box(&stored), &compression, &cancel).unwrap())
        });
    }
}

criterion_group!(benches, bench_shuffle, bench_codecs);
criterion_main!(benches);
