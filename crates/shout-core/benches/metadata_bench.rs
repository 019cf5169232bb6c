//! Criterion benchmarks for metadata encoding and connection throughput.
//!
//! Run with:
//! ```bash
//! cargo bench --package shout-core --bench metadata_bench
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use shout_core::source::PlaylistProvider;
use shout_core::{encode_metadata, Connection, ExhaustionPolicy, NoTags, StreamConfig};
use uuid::Uuid;

/// Encodes titles of increasing length, including one that is truncated.
fn bench_encode_metadata(c: &mut Criterion) {
    let titles = [
        ("empty", String::new()),
        ("short", "Artist - Title".to_string()),
        ("long", "x".repeat(200)),
        ("truncated", "y".repeat(8000)),
    ];

    let mut group = c.benchmark_group("encode_metadata");
    for (name, title) in &titles {
        group.bench_with_input(BenchmarkId::new("title", name), title, |b, title| {
            b.iter(|| encode_metadata(black_box(title)))
        });
    }
    group.finish();
}

/// Streams one megabyte of audio through a connection into a `Vec` sink.
fn bench_stream_megabyte(c: &mut Criterion) {
    let path: PathBuf = std::env::temp_dir().join(format!("shout_bench_{}.mp3", Uuid::new_v4()));
    std::fs::write(&path, vec![0xAAu8; 256 * 1024]).expect("bench fixture must be writable");
    let config = Arc::new(StreamConfig::default());

    c.bench_function("stream_1MiB_with_metadata", |b| {
        b.iter(|| {
            let provider = PlaylistProvider::new(vec![path.clone()], ExhaustionPolicy::Restart);
            let mut conn = Connection::new(
                Uuid::new_v4(),
                config.clone(),
                Box::new(provider),
                Arc::new(NoTags),
            );
            conn.on_readable(b"GET / HTTP/1.0\r\nIcy-MetaData: 1\r\n\r\n");
            let mut sink: Vec<u8> = Vec::with_capacity(1100 * 1024);
            while conn.audio_bytes_sent() < 1024 * 1024 {
                conn.on_writable(&mut sink);
            }
            black_box(sink.len())
        })
    });

    std::fs::remove_file(&path).ok();
}

criterion_group!(benches, bench_encode_metadata, bench_stream_megabyte);
criterion_main!(benches);
