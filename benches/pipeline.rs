//! Message pipeline benchmark suite.
//!
//! Benchmarks the default JSON codec at different payload sizes:
//! - Outbound: `Json` value to text frame
//! - Inbound: text frame to `Json` value
//!
//! Run with: cargo bench --bench pipeline
//! Results saved to: target/criterion/

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::{Value, json};
use tenacious_ws::Payload;
use tenacious_ws::pipeline::Pipeline;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const FIELD_COUNTS: &[usize] = &[1, 16, 256];

fn message(fields: usize) -> Value {
    let entries = (0..fields)
        .map(|i| (format!("field_{i}"), json!({ "id": i, "name": "value", "tags": [1, 2, 3] })))
        .collect::<serde_json::Map<_, _>>();
    Value::Object(entries)
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let pipeline = Pipeline::json();
    let mut group = c.benchmark_group("encode");

    for &fields in FIELD_COUNTS {
        let payload = Payload::Json(message(fields));
        group.throughput(Throughput::Elements(fields as u64));
        group.bench_with_input(BenchmarkId::new("json", fields), &payload, |b, payload| {
            b.iter(|| pipeline.encode(std::hint::black_box(payload)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let pipeline = Pipeline::json();
    let mut group = c.benchmark_group("decode");

    for &fields in FIELD_COUNTS {
        let frame = Payload::Text(message(fields).to_string());
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new("json", fields), &frame, |b, frame| {
            b.iter(|| pipeline.decode(std::hint::black_box(frame.clone())));
        });
    }

    group.bench_function("passthrough", |b| {
        let pipeline = Pipeline::passthrough();
        let frame = Payload::Binary(vec![0; 1024]);
        b.iter(|| pipeline.decode(std::hint::black_box(frame.clone())));
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
