//! Benchmarks for synthesis primitives and whole voice chains.
//!
//! Run with: cargo bench
//!
//! Everything here must complete well inside real-time deadlines at
//! 44.1kHz:
//!   - 256 samples  = 5.8ms deadline
//!   - 512 samples  = 11.6ms deadline
//!   - 1024 samples = 23.2ms deadline

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use oscine::voices;
use oscine::{Envelope, GatedSound, Oscillator, Shape, Sound};

/// Common audio callback buffer sizes.
const BLOCK_SIZES: &[usize] = &[256, 512, 1024];

fn bench_oscillator(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/oscillator");

    for &size in BLOCK_SIZES {
        // Sine - transcendental per sample
        let mut osc = Oscillator::new(Shape::Sine).with_freq(440.0);
        group.bench_with_input(BenchmarkId::new("sine", size), &size, |b, &size| {
            b.iter(|| black_box(osc.consume_raw(black_box(size))))
        });

        // Sawtooth - band-limited table lookup
        let mut osc = Oscillator::new(Shape::Sawtooth).with_freq(440.0);
        group.bench_with_input(BenchmarkId::new("sawtooth", size), &size, |b, &size| {
            b.iter(|| black_box(osc.consume_raw(black_box(size))))
        });

        // Square with duty modulation - table lookup across 64 duty tables
        let mut osc = Oscillator::new(Shape::Square).with_freq(440.0);
        let duty: Vec<f64> = (0..size).map(|i| 0.2 + 0.6 * (i as f64 / size as f64)).collect();
        group.bench_with_input(BenchmarkId::new("square_pwm", size), &size, |b, &size| {
            b.iter(|| {
                osc.set_duty_modulation(duty.clone());
                black_box(osc.consume_raw(black_box(size)))
            })
        });
    }

    group.finish();
}

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/envelope");

    for &size in BLOCK_SIZES {
        let gate = vec![1.0f32; size];

        let mut linear = Envelope::new(0.5, 0.2, 0.7, 0.3);
        linear.set_required_frames(size, false);
        group.bench_with_input(BenchmarkId::new("linear", size), &size, |b, _| {
            b.iter(|| black_box(linear.process(black_box(&gate))))
        });

        let mut exp = Envelope::new(0.5, 0.2, 0.7, 0.3).exponential();
        exp.set_required_frames(size, false);
        group.bench_with_input(BenchmarkId::new("exponential", size), &size, |b, _| {
            b.iter(|| black_box(exp.process(black_box(&gate))))
        });
    }

    group.finish();
}

fn bench_voice(c: &mut Criterion) {
    let mut group = c.benchmark_group("voices");

    for &size in BLOCK_SIZES {
        let mut lead = voices::saw_lead();
        lead.play_note(Some(64.0), None);
        group.bench_with_input(BenchmarkId::new("saw_lead", size), &size, |b, &size| {
            b.iter(|| black_box(lead.consume(black_box(size))))
        });

        let mut drum = voices::kick();
        drum.play_note(None, None);
        group.bench_with_input(BenchmarkId::new("kick", size), &size, |b, &size| {
            b.iter(|| black_box(drum.consume(black_box(size))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_oscillator, bench_envelope, bench_voice);
criterion_main!(benches);
