//! Benchmarks for the Compotastic wire format
//!
//! Measures performance of:
//! - Step word encode/decode
//! - Envelope construction
//! - Envelope parsing

use compotastic_wire::{
    build_envelope, codec, Envelope, GridPosition, NodeAddress, SequenceNumber, Transition,
    DEFAULT_MAX_FRAME_SIZE,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn sample_transition(i: u16) -> Transition {
    let x = i % 1024;
    let y = (i / 7) % 1024;
    Transition::new(
        GridPosition::new(x, y),
        (i % 8) as u8,
        (i % 256) as i16 - 128,
        GridPosition::new(x, y.saturating_sub(1)),
        i % 17 == 0,
    )
}

/// Benchmark step word packing
fn bench_step_word(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_word");
    group.throughput(Throughput::Elements(1));

    group.bench_function("encode", |b| {
        b.iter(|| codec::encode(black_box(513), black_box(77), black_box(3), true, black_box(-42)))
    });

    for &word in &[0u32, 0x8000_0000, 0xdead_beef, u32::MAX] {
        group.bench_with_input(BenchmarkId::new("decode", word), &word, |b, &w| {
            b.iter(|| codec::decode(black_box(w)))
        });
    }
    group.finish();
}

/// Benchmark envelope building and parsing
fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");
    group.throughput(Throughput::Elements(1));

    let t = sample_transition(12_345);
    group.bench_function("build", |b| {
        b.iter(|| {
            build_envelope(
                NodeAddress::new(1),
                NodeAddress::BROADCAST,
                SequenceNumber::new(black_box(99)),
                black_box(&t),
                DEFAULT_MAX_FRAME_SIZE,
            )
        })
    });

    let frame = build_envelope(
        NodeAddress::new(1),
        NodeAddress::BROADCAST,
        SequenceNumber::new(99),
        &t,
        DEFAULT_MAX_FRAME_SIZE,
    )
    .expect("valid transition");
    group.bench_function("decode", |b| b.iter(|| Envelope::decode(black_box(&frame))));
    group.finish();
}

criterion_group!(benches, bench_step_word, bench_envelope);
criterion_main!(benches);
