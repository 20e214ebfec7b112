//! Benchmarks for telemetry data processing
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use probescope::config::ViewportConfig;
use probescope::telemetry::protocol::decode;
use probescope::waveform::{decimate, export_csv};
use probescope::{Sample, SampleRingBuffer, WaveformEngine, WatchedVariable};

fn sine(count: usize, step_ms: f64) -> Vec<Sample> {
    (0..count)
        .map(|i| Sample::new(i as f64 * step_ms, (i as f64 * 0.01).sin()))
        .collect()
}

fn bench_ring_buffer_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer");

    for size in [1_000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("push_at_capacity", size), size, |b, &size| {
            let mut buffer = SampleRingBuffer::new(size);
            for sample in sine(size, 1.0) {
                buffer.push(sample);
            }
            let mut t = size as f64;
            b.iter(|| {
                buffer.push(black_box(Sample::new(t, t.sin())));
                t += 1.0;
            });
        });
    }

    let mut buffer = SampleRingBuffer::new(10_000);
    for sample in sine(10_000, 1.0) {
        buffer.push(sample);
    }
    group.bench_function("range_query", |b| {
        b.iter(|| black_box(buffer.range(2_500.0, 7_500.0).count()));
    });
    group.bench_function("recalculate_statistics", |b| {
        b.iter(|| black_box(buffer.recalculate_statistics()));
    });

    group.finish();
}

fn bench_engine_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_ingest");

    for batch in [10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(*batch as u64 * 4));
        group.bench_with_input(BenchmarkId::new("four_variables", batch), batch, |b, &batch| {
            let mut engine = WaveformEngine::new(&ViewportConfig::default(), 10_000, true);
            let names = ["motor.speed", "motor.current", "pid.error", "adc.raw"];
            for name in names {
                engine.add_variable(name).unwrap();
            }
            let mut t0 = 0.0;
            b.iter(|| {
                let samples: Vec<Sample> = (0..batch)
                    .map(|i| Sample::new(t0 + i as f64, i as f64))
                    .collect();
                t0 += batch as f64;
                let outcome = engine.ingest(names.iter().map(|n| (*n, samples.as_slice())));
                black_box(outcome.stored)
            });
        });
    }

    group.finish();
}

fn bench_decode_sample_frame(c: &mut Criterion) {
    let samples: Vec<serde_json::Value> = (0..100)
        .map(|i| serde_json::json!({ "timestamp": i * 10, "value": i as f64 * 0.5 }))
        .collect();
    let frame = serde_json::json!({
        "type": "variable.sample",
        "payload": { "samples": [{ "variable": "motor.speed", "samples": samples }] }
    })
    .to_string();

    c.bench_function("decode_sample_frame", |b| {
        b.iter(|| black_box(decode(black_box(&frame)).unwrap()));
    });
}

fn bench_decimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("decimate");
    let source = sine(100_000, 1.0);

    for target in [500, 2_000].iter() {
        group.bench_with_input(BenchmarkId::new("min_max", target), target, |b, &target| {
            b.iter(|| black_box(decimate(&source, target)));
        });
    }

    group.finish();
}

fn bench_export_csv(c: &mut Criterion) {
    let mut group = c.benchmark_group("export_csv");

    for size in [1_000, 10_000].iter() {
        let variables: Vec<WatchedVariable> = (0..4)
            .map(|v| {
                let mut var = WatchedVariable::new(format!("var{}", v), "#ffffff", *size);
                // Offset clocks so rows have empty cells
                var.ingest(&sine(*size, 1.0 + v as f64 * 0.5));
                var
            })
            .collect();

        group.throughput(Throughput::Elements(*size as u64 * 4));
        group.bench_with_input(BenchmarkId::new("four_variables", size), &variables, |b, vars| {
            b.iter(|| black_box(export_csv(vars)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_ring_buffer_push,
    bench_engine_ingest,
    bench_decode_sample_frame,
    bench_decimate,
    bench_export_csv,
);

criterion_main!(benches);
