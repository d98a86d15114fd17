//! Performance benchmarks for the full analysis pipeline

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loopgrid::{analyze, EngineConfig};

/// 30 seconds of clicky material at 120 BPM with a tonal bed
fn synthetic_track(seconds: usize) -> Vec<f32> {
    let sr = 44100usize;
    let mut samples: Vec<f32> = (0..sr * seconds)
        .map(|i| {
            let t = i as f32 / sr as f32;
            0.3 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
        })
        .collect();
    let beat = sr / 2;
    let mut pos = 0;
    while pos < samples.len() {
        for i in 0..400.min(samples.len() - pos) {
            let t = i as f32 / sr as f32;
            let decay = 1.0 - i as f32 / 400.0;
            samples[pos + i] += 0.7 * decay * (2.0 * std::f32::consts::PI * 3000.0 * t).sin();
        }
        pos += beat;
    }
    samples
}

fn bench_analyze(c: &mut Criterion) {
    let samples = synthetic_track(30);
    let config = EngineConfig::default();

    c.bench_function("analyze_30s", |b| {
        b.iter(|| {
            let _ = analyze(black_box(&samples), black_box(44100), black_box(&config));
        });
    });
}

criterion_group!(benches, bench_analyze);
criterion_main!(benches);
