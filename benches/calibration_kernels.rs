/// Smoothing, fitting and spectral kernel benchmarks
///
/// Sizes follow the study data: ~20 minutes of 10 Hz temperature samples per
/// participant and a few hundred RR intervals per phase.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use earstudy::calibration::{fit, select_best, FitKind};
use earstudy::smoothing::{rolling_mean, WindowSpec};
use earstudy::statistics::spectral_ratio;
use std::time::Duration;

/// Slowly drifting temperature trace with a dropped sample every 97 readings
fn temperature_trace(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            if i % 97 == 0 {
                f64::NAN
            } else {
                36.0 + (i as f64 / 600.0).sin() * 0.4 + (i % 7) as f64 * 0.01
            }
        })
        .collect()
}

fn bench_rolling_mean(c: &mut Criterion) {
    let mut group = c.benchmark_group("rolling_mean");
    group.measurement_time(Duration::from_secs(5));

    let values = temperature_trace(12_000);
    group.throughput(Throughput::Elements(values.len() as u64));

    for size in [1usize, 120, 1_200].iter() {
        group.bench_with_input(BenchmarkId::new("trailing", size), size, |b, &size| {
            let spec = WindowSpec::trailing(size).with_min_periods(1);
            b.iter(|| black_box(rolling_mean(black_box(&values), &spec)));
        });
        group.bench_with_input(BenchmarkId::new("centered", size), size, |b, &size| {
            let spec = WindowSpec::centered(size).with_min_periods(1);
            b.iter(|| black_box(rolling_mean(black_box(&values), &spec)));
        });
    }

    group.finish();
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("calibration_fit");
    group.measurement_time(Duration::from_secs(5));

    let raw = temperature_trace(12_000);
    let reference: Vec<f64> = raw.iter().map(|x| 0.98 * x + 0.9).collect();

    for kind in [FitKind::Constant, FitKind::Linear, FitKind::Polynomial(8)].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(kind), kind, |b, &kind| {
            b.iter(|| black_box(fit(black_box(&raw), black_box(&reference), kind)));
        });
    }

    group.sample_size(20);
    group.bench_function("select_best_study_candidates", |b| {
        let kinds = FitKind::study_candidates();
        b.iter(|| black_box(select_best(&raw, &reference, &kinds)));
    });

    group.finish();
}

fn bench_spectral_ratio(c: &mut Criterion) {
    let mut group = c.benchmark_group("spectral_ratio");
    group.measurement_time(Duration::from_secs(5));

    for len in [256usize, 1_000, 4_096].iter() {
        let rr: Vec<f64> = (0..*len)
            .map(|i| 800.0 + 40.0 * (i as f64 * 0.6).sin() + 25.0 * (i as f64 * 1.7).sin())
            .collect();
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &rr, |b, rr| {
            b.iter(|| black_box(spectral_ratio(black_box(rr))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_rolling_mean, bench_fit, bench_spectral_ratio);
criterion_main!(benches);
