//! Benchmarks for the Nickel wire codec.
//!
//! Run with: cargo bench -p nickel-codec

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nickel_codec::{peek_status, NickelCodec};
use nickel_types::{Nickel, NickelOrigin, NickelType};
use serde_json::json;

fn create_nickel(payload_size: usize) -> Nickel {
    let mut nickel = Nickel::create_with(
        "0000-0002-1825-0097",
        NickelType::NewDocument,
        NickelOrigin::DocumentService,
    );
    nickel.pack_bytes(vec![0u8; payload_size]);
    nickel
        .response_headers_mut()
        .insert("Content-Type".into(), json!("application/octet-stream"));
    nickel.tracing_carrier_mut().insert(
        "traceparent".into(),
        "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".into(),
    );
    nickel
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [64, 1024, 8192, 65536].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let codec = NickelCodec::new();
            let nickel = create_nickel(size);

            b.iter(|| {
                let frame = codec.encode(black_box(&nickel));
                black_box(frame.unwrap().len())
            });
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [64, 1024, 8192, 65536].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let codec = NickelCodec::new();
            let frame = codec.encode(&create_nickel(size)).unwrap();

            b.iter(|| {
                let nickel = codec.decode(black_box(&frame)).unwrap();
                black_box(nickel)
            });
        });
    }

    group.finish();
}

fn bench_peek(c: &mut Criterion) {
    let codec = NickelCodec::new();
    let frame = codec.encode(&create_nickel(65536)).unwrap();

    c.bench_function("peek_status", |b| {
        b.iter(|| black_box(peek_status(black_box(&frame)).unwrap()))
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_peek);
criterion_main!(benches);
